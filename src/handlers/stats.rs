// src/handlers/stats.rs

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::{
    common::error::AppError,
    config::AppState,
    handlers::parse_units,
    models::stats::{FunnelReport, StatsFilter},
};

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct StatsParams {
    pub year: i32,
    pub month: u32,
    // Ids de unidade separados por vírgula. Sem unidade = relatório vazio
    // (fail-closed), nunca uma consulta sem escopo.
    pub units: Option<String>,
    // Origem do lead; ausente ou "all" = todas
    pub lead_source: Option<String>,
}

// GET /api/funnel/stats
#[utoipa::path(
    get,
    path = "/api/funnel/stats",
    tag = "Funil",
    params(StatsParams),
    responses(
        (status = 200, description = "Relatório diário do funil no mês, com totais", body = FunnelReport)
    )
)]
pub async fn get_funnel_stats(
    State(app_state): State<AppState>,
    Query(params): Query<StatsParams>,
) -> Result<impl IntoResponse, AppError> {
    let lead_source = params
        .lead_source
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty() && s != "all");

    let filter = StatsFilter {
        year: params.year,
        month: params.month,
        unit_ids: parse_units(params.units.as_deref()),
        lead_source,
    };

    let report = app_state.stats.monthly_report(&filter).await?;
    Ok((StatusCode::OK, Json(report)))
}
