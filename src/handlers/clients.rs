// src/handlers/clients.rs

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    common::error::AppError,
    config::AppState,
    db::notify::{ChangeEvent, ChangeKind, StoreTable},
    models::funnel::{ClientLossRecord, LossReason},
};

// GET /api/loss-reasons
#[utoipa::path(
    get,
    path = "/api/loss-reasons",
    tag = "Clientes",
    responses(
        (status = 200, description = "Catálogo de motivos de perda", body = Vec<LossReason>)
    )
)]
pub async fn list_loss_reasons(
    State(app_state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let reasons = app_state.store.list_loss_reasons().await?;
    Ok((StatusCode::OK, Json(reasons)))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterLossPayload {
    #[validate(length(min = 1, message = "required"))]
    pub loss_reason_ids: Vec<Uuid>,

    #[validate(length(max = 2000, message = "too_long"))]
    pub observations: Option<String>,
}

// POST /api/clients/{client_id}/loss
#[utoipa::path(
    post,
    path = "/api/clients/{client_id}/loss",
    tag = "Clientes",
    params(("client_id" = Uuid, Path, description = "Id do cliente")),
    request_body = RegisterLossPayload,
    responses(
        (status = 201, description = "Cliente marcado como perdido", body = Vec<ClientLossRecord>),
        (status = 202, description = "Submissão idêntica já em andamento; descartada"),
        (status = 404, description = "Cliente não encontrado")
    )
)]
pub async fn register_loss(
    State(app_state): State<AppState>,
    Path(client_id): Path<Uuid>,
    Json(payload): Json<RegisterLossPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let guard_key = format!("loss:{}", client_id);
    if !app_state.guard.try_begin(&guard_key).await {
        return Ok((StatusCode::ACCEPTED, Json(json!({ "status": "em-andamento" })))
            .into_response());
    }

    let result = app_state
        .store
        .register_loss(
            client_id,
            &payload.loss_reason_ids,
            payload.observations.as_deref(),
        )
        .await;

    match result {
        Ok(records) => {
            app_state.guard.finish(&guard_key).await;
            // O cliente virou 'lost': some do quadro na próxima rebusca
            app_state.hub.publish(ChangeEvent {
                table: StoreTable::Clients,
                kind: ChangeKind::Update,
                row_id: Some(client_id),
                client_id: Some(client_id),
            });
            app_state.feed.invalidate_current().await;
            app_state.activities.invalidate(client_id).await;
            Ok((StatusCode::CREATED, Json(records)).into_response())
        }
        Err(e) => {
            app_state.guard.abort(&guard_key).await;
            Err(e)
        }
    }
}
