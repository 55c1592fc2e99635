// src/models/stats.rs

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

// Linha crua das consultas de contagem diária.
// O banco devolve o dia como texto ('YYYY-MM-DD' via to_char); dado legado pode
// vir nulo ou quebrado, por isso tudo aqui é Option.
#[derive(Debug, Clone, FromRow)]
pub struct DailyCountRow {
    pub day: Option<String>,
    pub category: Option<String>,
    pub total: Option<i64>,
}

impl DailyCountRow {
    pub fn new(day: impl Into<String>, category: impl Into<String>, total: i64) -> Self {
        Self {
            day: Some(day.into()),
            category: Some(category.into()),
            total: Some(total),
        }
    }
}

// Uma linha do relatório diário do funil. Calculada sob demanda, nunca persistida.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DailyFunnelSnapshot {
    #[schema(value_type = String, format = Date)]
    pub date: NaiveDate,

    pub new_clients: i64,
    pub contact_attempts: i64,
    pub effective_contacts: i64,
    // Agendamentos REGISTRADOS no dia (data de criação)
    pub scheduled_visits: i64,
    // Visitas PREVISTAS para o dia (data agendada) — conjunto diferente do de cima
    pub awaiting_visits: i64,
    pub completed_visits: i64,
    pub enrollments: i64,

    // Taxas de conversão (%), sempre 0 quando o denominador é 0
    pub ce_rate: f64,
    pub ag_rate: f64,
    pub at_rate: f64,
    pub ma_rate: f64,
}

// Linha de totais: contagens somadas, taxas recalculadas a partir das somas
// (nunca média das taxas diárias, que enviesaria para dias de baixo volume).
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FunnelTotals {
    pub new_clients: i64,
    pub contact_attempts: i64,
    pub effective_contacts: i64,
    pub scheduled_visits: i64,
    pub awaiting_visits: i64,
    pub completed_visits: i64,
    pub enrollments: i64,

    pub ce_rate: f64,
    pub ag_rate: f64,
    pub at_rate: f64,
    pub ma_rate: f64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FunnelReport {
    pub days: Vec<DailyFunnelSnapshot>,
    pub totals: FunnelTotals,
}

impl FunnelReport {
    // Relatório vazio: a resposta fail-closed quando não há escopo de unidade.
    pub fn empty() -> Self {
        Self {
            days: Vec::new(),
            totals: FunnelTotals {
                new_clients: 0,
                contact_attempts: 0,
                effective_contacts: 0,
                scheduled_visits: 0,
                awaiting_visits: 0,
                completed_visits: 0,
                enrollments: 0,
                ce_rate: 0.0,
                ag_rate: 0.0,
                at_rate: 0.0,
                ma_rate: 0.0,
            },
        }
    }
}

// Filtro do relatório mensal.
#[derive(Debug, Clone, Deserialize)]
pub struct StatsFilter {
    pub year: i32,
    pub month: u32,
    // Vazio = sem escopo resolvível = relatório vazio (nunca consulta sem filtro)
    pub unit_ids: Vec<Uuid>,
    // None = todas as origens
    pub lead_source: Option<String>,
}

impl StatsFilter {
    // [início, fim) do mês no calendário. None para ano/mês sem sentido.
    pub fn month_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        let start = NaiveDate::from_ymd_opt(self.year, self.month, 1)?;
        let end = if self.month == 12 {
            NaiveDate::from_ymd_opt(self.year + 1, 1, 1)?
        } else {
            NaiveDate::from_ymd_opt(self.year, self.month + 1, 1)?
        };
        Some((start, end))
    }
}
