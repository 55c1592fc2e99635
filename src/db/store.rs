// src/db/store.rs

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::{
        funnel::{Activity, ActivityType, Client, ClientLossRecord, ContactType, LossReason},
        stats::DailyCountRow,
    },
};

// Parâmetros de uma página do quadro.
#[derive(Debug, Clone, PartialEq)]
pub struct BoardQuery {
    pub unit_ids: Vec<Uuid>,
    // Busca livre por nome ou telefone
    pub search: Option<String>,
    // Só clientes com retorno pendente (next_contact_date nula ou vencida)
    pub pending_only: bool,
    // Limite superior do "pendente": fim do dia corrente
    pub pending_until: DateTime<Utc>,
    pub offset: i64,
    pub limit: i64,
}

// Parâmetros das consultas de faixa das estatísticas: [start, end).
#[derive(Debug, Clone)]
pub struct RangeQuery {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub unit_ids: Vec<Uuid>,
    pub lead_source: Option<String>,
}

impl RangeQuery {
    pub fn start_utc(&self) -> DateTime<Utc> {
        self.start.and_time(NaiveTime::MIN).and_utc()
    }

    pub fn end_utc(&self) -> DateTime<Utc> {
        self.end.and_time(NaiveTime::MIN).and_utc()
    }
}

// Dados de uma atividade nova. O status do cliente acompanha o tipo registrado.
#[derive(Debug, Clone)]
pub struct NewActivity {
    pub client_id: Uuid,
    pub activity_type: ActivityType,
    pub contact_type: ContactType,
    pub scheduled_date: Option<DateTime<Utc>>,
    pub next_contact_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

// A costura entre os serviços e o armazenamento. A implementação de produção
// fala Postgres (FunnelRepository); os testes usam um store em memória.
#[async_trait]
pub trait FunnelStore: Send + Sync {
    // Uma página do quadro: ordenada por created_at DESC, sem os status
    // terminais (enrolled/lost/attendance-completed).
    async fn fetch_board_page(&self, query: &BoardQuery) -> Result<Vec<Client>, AppError>;

    // Atividades ativas de um cliente, mais recente primeiro.
    async fn fetch_client_activities(&self, client_id: Uuid) -> Result<Vec<Activity>, AppError>;

    // --- As três consultas independentes da agregação mensal ---

    // Clientes novos por dia de criação (category = "new_clients").
    async fn new_clients_per_day(&self, range: &RangeQuery)
        -> Result<Vec<DailyCountRow>, AppError>;

    // Atividades por dia de CRIAÇÃO (category = activity_type).
    async fn activities_created_per_day(
        &self,
        range: &RangeQuery,
    ) -> Result<Vec<DailyCountRow>, AppError>;

    // Atividades por dia AGENDADO (só linhas com scheduled_date).
    // Nunca mistura com created_at: são eixos de tempo diferentes.
    async fn activities_scheduled_per_day(
        &self,
        range: &RangeQuery,
    ) -> Result<Vec<DailyCountRow>, AppError>;

    // --- Caminho pré-agregado no servidor (opcional) ---

    fn supports_aggregated_funnel(&self) -> bool {
        false
    }

    // Quando suportado: uma consulta só, devolvendo as métricas finais por dia
    // (categories new_clients/contact_attempts/.../awaiting_visits).
    async fn aggregated_funnel_per_day(
        &self,
        _range: &RangeQuery,
    ) -> Result<Vec<DailyCountRow>, AppError> {
        Err(AppError::InternalServerError(anyhow::anyhow!(
            "store não suporta agregação no servidor"
        )))
    }

    // --- Mutações ---

    // Insere a atividade e move o status do cliente na mesma transação.
    async fn register_activity(&self, input: &NewActivity) -> Result<Activity, AppError>;

    // Soft delete: marca active = false, nunca remove a linha. Devolve a
    // linha atualizada (o chamador precisa do cliente dono para invalidar).
    async fn deactivate_activity(&self, activity_id: Uuid) -> Result<Activity, AppError>;

    // Catálogo de motivos de perda.
    async fn list_loss_reasons(&self) -> Result<Vec<LossReason>, AppError>;

    // Marca o cliente como perdido: um registro tipado por motivo, guardando
    // o status anterior e quantos motivos foram apontados de uma vez.
    async fn register_loss(
        &self,
        client_id: Uuid,
        reason_ids: &[Uuid],
        observations: Option<&str>,
    ) -> Result<Vec<ClientLossRecord>, AppError>;
}
