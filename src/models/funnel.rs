// src/models/funnel.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

// --- ENUMS DE DOMÍNIO ---

// O status vive como TEXT no banco (dados legados contêm valores fora da lista).
// O enum cobre os valores conhecidos; o resto é tratado na classificação.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum ClientStatus {
    NewRegistration,
    ContactAttempt,
    EffectiveContact,
    AppointmentScheduled,
    Negotiation,
    Enrolled,
    Lost,
    AttendanceCompleted,
}

impl ClientStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClientStatus::NewRegistration => "new-registration",
            ClientStatus::ContactAttempt => "contact-attempt",
            ClientStatus::EffectiveContact => "effective-contact",
            ClientStatus::AppointmentScheduled => "appointment-scheduled",
            ClientStatus::Negotiation => "negotiation",
            ClientStatus::Enrolled => "enrolled",
            ClientStatus::Lost => "lost",
            ClientStatus::AttendanceCompleted => "attendance-completed",
        }
    }

    // Enrolled/Lost/AttendanceCompleted saem do quadro vivo, mas continuam
    // contando no histórico de métricas.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ClientStatus::Enrolled | ClientStatus::Lost | ClientStatus::AttendanceCompleted
        )
    }
}

impl FromStr for ClientStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new-registration" => Ok(ClientStatus::NewRegistration),
            "contact-attempt" => Ok(ClientStatus::ContactAttempt),
            "effective-contact" => Ok(ClientStatus::EffectiveContact),
            "appointment-scheduled" => Ok(ClientStatus::AppointmentScheduled),
            "negotiation" => Ok(ClientStatus::Negotiation),
            "enrolled" => Ok(ClientStatus::Enrolled),
            "lost" => Ok(ClientStatus::Lost),
            "attendance-completed" => Ok(ClientStatus::AttendanceCompleted),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum ActivityType {
    ContactAttempt,
    EffectiveContact,
    Scheduling,
    Attendance,
    Enrollment,
}

impl ActivityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityType::ContactAttempt => "contact-attempt",
            ActivityType::EffectiveContact => "effective-contact",
            ActivityType::Scheduling => "scheduling",
            ActivityType::Attendance => "attendance",
            ActivityType::Enrollment => "enrollment",
        }
    }

    // Para qual status do cliente essa atividade empurra o funil.
    pub fn next_status(&self) -> ClientStatus {
        match self {
            ActivityType::ContactAttempt => ClientStatus::ContactAttempt,
            ActivityType::EffectiveContact => ClientStatus::EffectiveContact,
            ActivityType::Scheduling => ClientStatus::AppointmentScheduled,
            ActivityType::Attendance => ClientStatus::AttendanceCompleted,
            ActivityType::Enrollment => ClientStatus::Enrolled,
        }
    }
}

impl FromStr for ActivityType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "contact-attempt" => Ok(ActivityType::ContactAttempt),
            "effective-contact" => Ok(ActivityType::EffectiveContact),
            "scheduling" => Ok(ActivityType::Scheduling),
            "attendance" => Ok(ActivityType::Attendance),
            "enrollment" => Ok(ActivityType::Enrollment),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum ContactType {
    Phone,
    WhatsappMessage,
    WhatsappCall,
    InPerson,
}

impl ContactType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContactType::Phone => "phone",
            ContactType::WhatsappMessage => "whatsapp-message",
            ContactType::WhatsappCall => "whatsapp-call",
            ContactType::InPerson => "in-person",
        }
    }
}

// --- CLIENTE (O Lead) ---

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    pub id: Uuid,
    pub unit_id: Uuid,

    pub name: String,
    pub phone_number: String,
    pub email: Option<String>,

    // Ex: "Instagram", "Indicação", "Google"
    pub lead_source: String,

    // TEXT no banco de propósito: valores desconhecidos precisam sobreviver
    // à leitura para serem tratados (e logados) na classificação.
    pub status: String,

    pub next_contact_date: Option<DateTime<Utc>>,
    pub scheduled_date: Option<DateTime<Utc>>,
    pub valorization_confirmed: bool,

    // Controle de recadastro (o mesmo lead se inscrevendo de novo)
    pub duplicate_registration_count: Option<i32>,
    pub duplicate_registration_history: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Client {
    pub fn parsed_status(&self) -> Option<ClientStatus> {
        ClientStatus::from_str(&self.status).ok()
    }
}

// --- ATIVIDADE (O Evento) ---
// Imutável: nunca é apagada, só marcada como inativa (soft delete).

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: Uuid,
    pub client_id: Uuid,

    pub activity_type: String,
    pub contact_type: String,

    // created_at = quando o evento foi registrado.
    // scheduled_date = quando a visita agendada deve acontecer.
    // Uma agregação usa um OU outro, nunca os dois.
    pub created_at: DateTime<Utc>,
    pub scheduled_date: Option<DateTime<Utc>>,
    pub next_contact_date: Option<DateTime<Utc>>,

    pub notes: Option<String>,
    pub active: bool,
}

// --- MOTIVO DE PERDA ---

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LossReason {
    pub id: Uuid,
    pub name: String,
}

// Registro tipado da perda: um por motivo apontado, com o status anterior.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClientLossRecord {
    pub id: Uuid,
    pub client_id: Uuid,
    pub loss_reason_id: Uuid,
    pub previous_status: String,
    pub total_reasons_at_loss: i32,
    pub observations: Option<String>,
    pub created_at: DateTime<Utc>,
}

// --- COLUNAS DO QUADRO (derivado, nunca persistido) ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum ColumnId {
    NewRegistration,
    ContactAttempt,
    EffectiveContact,
    AppointmentScheduled,
    Negotiation,
}

impl ColumnId {
    // Ordem fixa de exibição do quadro.
    pub const ALL: [ColumnId; 5] = [
        ColumnId::NewRegistration,
        ColumnId::ContactAttempt,
        ColumnId::EffectiveContact,
        ColumnId::AppointmentScheduled,
        ColumnId::Negotiation,
    ];

    pub fn title(&self) -> &'static str {
        match self {
            ColumnId::NewRegistration => "Novo Cadastro",
            ColumnId::ContactAttempt => "Tentativa de Contato",
            ColumnId::EffectiveContact => "Contato Efetivo",
            ColumnId::AppointmentScheduled => "Atendimento Agendado",
            ColumnId::Negotiation => "Negociação",
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FunnelColumn {
    pub id: ColumnId,
    pub title: String,
    pub clients: Vec<Client>,
}
