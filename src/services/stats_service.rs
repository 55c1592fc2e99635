// src/services/stats_service.rs
//
// O agregador mensal do funil. Duas estratégias de execução para a MESMA
// computação: pré-agregado no servidor (uma consulta) ou merge no cliente
// (três consultas independentes + junção por dia). A escolha vem da
// capacidade do store; o preenchimento de dias, os totais e as taxas são
// compartilhados, então os caminhos não podem divergir.

use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Arc;

use crate::{
    common::error::AppError,
    db::store::{FunnelStore, RangeQuery},
    models::{
        funnel::ActivityType,
        stats::{DailyFunnelSnapshot, FunnelReport, FunnelTotals, StatsFilter},
    },
    services::{
        bucketizer::{bucketize, day_span},
        rates::rate,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationStrategy {
    // O banco devolve as métricas finais por dia
    ServerSide,
    // Três consultas cruas, junção aqui
    ClientMerge,
}

#[derive(Clone)]
pub struct StatsService {
    store: Arc<dyn FunnelStore>,
    strategy: AggregationStrategy,
}

impl StatsService {
    pub fn new(store: Arc<dyn FunnelStore>) -> Self {
        let strategy = if store.supports_aggregated_funnel() {
            AggregationStrategy::ServerSide
        } else {
            AggregationStrategy::ClientMerge
        };
        Self::with_strategy(store, strategy)
    }

    pub fn with_strategy(store: Arc<dyn FunnelStore>, strategy: AggregationStrategy) -> Self {
        Self { store, strategy }
    }

    pub async fn monthly_report(&self, filter: &StatsFilter) -> Result<FunnelReport, AppError> {
        // Fail-closed: sem unidade resolvível NÃO se consulta nada. Uma
        // consulta sem escopo vazaria dados de outras unidades no painel.
        if filter.unit_ids.is_empty() {
            tracing::warn!("Relatório pedido sem unidades; devolvendo vazio");
            return Ok(FunnelReport::empty());
        }

        // Mês inválido também é configuração ausente, não chute de padrão
        let Some((start, end)) = filter.month_range() else {
            tracing::warn!(
                "Mês inválido {}/{}; devolvendo vazio",
                filter.month,
                filter.year
            );
            return Ok(FunnelReport::empty());
        };

        let range = RangeQuery {
            start,
            end,
            unit_ids: filter.unit_ids.clone(),
            lead_source: filter.lead_source.clone(),
        };

        let days = match self.strategy {
            AggregationStrategy::ServerSide => self.server_side(&range).await?,
            AggregationStrategy::ClientMerge => self.client_merge(&range).await?,
        };

        let totals = totals_of(&days);
        Ok(FunnelReport { days, totals })
    }

    async fn server_side(&self, range: &RangeQuery) -> Result<Vec<DailyFunnelSnapshot>, AppError> {
        let rows = self.store.aggregated_funnel_per_day(range).await?;
        let buckets = bucketize(range.start, range.end, &rows);

        let days = buckets
            .into_iter()
            .map(|(date, counts)| {
                let get = |key: &str| counts.get(key).copied().unwrap_or(0);
                snapshot(
                    date,
                    get("new_clients"),
                    get("contact_attempts"),
                    get("effective_contacts"),
                    get("scheduled_visits"),
                    get("awaiting_visits"),
                    get("completed_visits"),
                    get("enrollments"),
                )
            })
            .collect();

        Ok(days)
    }

    async fn client_merge(&self, range: &RangeQuery) -> Result<Vec<DailyFunnelSnapshot>, AppError> {
        // As três consultas são independentes: fan-out concorrente, o merge
        // espera as três (fan-in).
        let (new_rows, created_rows, scheduled_rows) = tokio::try_join!(
            self.store.new_clients_per_day(range),
            self.store.activities_created_per_day(range),
            self.store.activities_scheduled_per_day(range),
        )?;

        let new_buckets = bucketize(range.start, range.end, &new_rows);
        let created_buckets = bucketize(range.start, range.end, &created_rows);
        let scheduled_buckets = bucketize(range.start, range.end, &scheduled_rows);

        let empty = HashMap::new();
        let days = day_span(range.start, range.end)
            .into_iter()
            .map(|date| {
                let created = created_buckets.get(&date).unwrap_or(&empty);
                let scheduled = scheduled_buckets.get(&date).unwrap_or(&empty);

                let of = |t: ActivityType| created.get(t.as_str()).copied().unwrap_or(0);

                // Agendamento e contato efetivo implicam uma tentativa de
                // contato por baixo, então contam também rio acima no funil.
                let contact_attempts = of(ActivityType::ContactAttempt)
                    + of(ActivityType::EffectiveContact)
                    + of(ActivityType::Scheduling);
                let effective_contacts =
                    of(ActivityType::EffectiveContact) + of(ActivityType::Scheduling);

                snapshot(
                    date,
                    new_buckets
                        .get(&date)
                        .and_then(|b| b.get("new_clients"))
                        .copied()
                        .unwrap_or(0),
                    contact_attempts,
                    effective_contacts,
                    of(ActivityType::Scheduling),
                    // "previsto para hoje" vem do eixo scheduled_date,
                    // um conjunto diferente de "agendado hoje"
                    scheduled
                        .get(ActivityType::Scheduling.as_str())
                        .copied()
                        .unwrap_or(0),
                    of(ActivityType::Attendance),
                    of(ActivityType::Enrollment),
                )
            })
            .collect();

        Ok(days)
    }
}

fn snapshot(
    date: NaiveDate,
    new_clients: i64,
    contact_attempts: i64,
    effective_contacts: i64,
    scheduled_visits: i64,
    awaiting_visits: i64,
    completed_visits: i64,
    enrollments: i64,
) -> DailyFunnelSnapshot {
    DailyFunnelSnapshot {
        date,
        new_clients,
        contact_attempts,
        effective_contacts,
        scheduled_visits,
        awaiting_visits,
        completed_visits,
        enrollments,
        ce_rate: rate(effective_contacts, contact_attempts),
        ag_rate: rate(scheduled_visits, effective_contacts),
        at_rate: rate(completed_visits, awaiting_visits),
        ma_rate: rate(enrollments, completed_visits),
    }
}

// Totais: soma das contagens, taxas recalculadas das somas. Média de taxas
// diárias daria peso demais a dias de baixo volume.
fn totals_of(days: &[DailyFunnelSnapshot]) -> FunnelTotals {
    let mut t = FunnelTotals {
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
    };

    for day in days {
        t.new_clients += day.new_clients;
        t.contact_attempts += day.contact_attempts;
        t.effective_contacts += day.effective_contacts;
        t.scheduled_visits += day.scheduled_visits;
        t.awaiting_visits += day.awaiting_visits;
        t.completed_visits += day.completed_visits;
        t.enrollments += day.enrollments;
    }

    t.ce_rate = rate(t.effective_contacts, t.contact_attempts);
    t.ag_rate = rate(t.scheduled_visits, t.effective_contacts);
    t.at_rate = rate(t.completed_visits, t.awaiting_visits);
    t.ma_rate = rate(t.enrollments, t.completed_visits);
    t
}
