// src/handlers/activities.rs

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    common::error::AppError,
    config::AppState,
    db::{
        notify::{ChangeEvent, ChangeKind, StoreTable},
        store::NewActivity,
    },
    models::funnel::{Activity, ActivityType, ContactType},
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterActivityPayload {
    #[schema(example = "scheduling")]
    pub activity_type: ActivityType,

    #[schema(example = "whatsapp-message")]
    pub contact_type: ContactType,

    // Obrigatória quando activity_type = scheduling
    #[schema(value_type = Option<String>, format = DateTime)]
    pub scheduled_date: Option<DateTime<Utc>>,

    #[schema(value_type = Option<String>, format = DateTime)]
    pub next_contact_date: Option<DateTime<Utc>>,

    #[validate(length(max = 2000, message = "too_long"))]
    pub notes: Option<String>,
}

// GET /api/clients/{client_id}/activities
#[utoipa::path(
    get,
    path = "/api/clients/{client_id}/activities",
    tag = "Atividades",
    params(("client_id" = Uuid, Path, description = "Id do cliente")),
    responses(
        (status = 200, description = "Atividades ativas do cliente", body = Vec<Activity>)
    )
)]
pub async fn list_activities(
    State(app_state): State<AppState>,
    Path(client_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    // Marca a visão de detalhe como aberta: é ela que o realtime invalida
    let activities = app_state.activities.view(client_id).await?;
    Ok((StatusCode::OK, Json(activities)))
}

// POST /api/clients/{client_id}/activities/close
#[utoipa::path(
    post,
    path = "/api/clients/{client_id}/activities/close",
    tag = "Atividades",
    params(("client_id" = Uuid, Path, description = "Id do cliente")),
    responses((status = 204, description = "Visão de detalhe fechada"))
)]
pub async fn close_activity_view(
    State(app_state): State<AppState>,
    Path(_client_id): Path<Uuid>,
) -> impl IntoResponse {
    app_state.activities.close().await;
    StatusCode::NO_CONTENT
}

// POST /api/clients/{client_id}/activities
#[utoipa::path(
    post,
    path = "/api/clients/{client_id}/activities",
    tag = "Atividades",
    params(("client_id" = Uuid, Path, description = "Id do cliente")),
    request_body = RegisterActivityPayload,
    responses(
        (status = 201, description = "Atividade registrada e status do cliente movido", body = Activity),
        (status = 202, description = "Submissão idêntica já em andamento; descartada"),
        (status = 400, description = "Dados inválidos"),
        (status = 404, description = "Cliente não encontrado")
    )
)]
pub async fn register_activity(
    State(app_state): State<AppState>,
    Path(client_id): Path<Uuid>,
    Json(payload): Json<RegisterActivityPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    if payload.activity_type == ActivityType::Scheduling && payload.scheduled_date.is_none() {
        return Err(AppError::MissingScheduledDate);
    }

    // Trava anti clique duplo: a mesma ação no mesmo cliente só passa uma vez
    let guard_key = format!("{}:{}", payload.activity_type.as_str(), client_id);
    if !app_state.guard.try_begin(&guard_key).await {
        // Do ponto de vista do usuário a ação já está em andamento;
        // a duplicata morre em silêncio, sem erro
        return Ok((StatusCode::ACCEPTED, Json(json!({ "status": "em-andamento" })))
            .into_response());
    }

    let input = NewActivity {
        client_id,
        activity_type: payload.activity_type,
        contact_type: payload.contact_type,
        scheduled_date: payload.scheduled_date,
        next_contact_date: payload.next_contact_date,
        notes: payload.notes,
    };

    match app_state.store.register_activity(&input).await {
        Ok(activity) => {
            // O resfriamento começa na conclusão, não na resposta
            app_state.guard.finish(&guard_key).await;
            after_mutation(
                &app_state,
                ChangeEvent {
                    table: StoreTable::Activities,
                    kind: ChangeKind::Insert,
                    row_id: Some(activity.id),
                    client_id: Some(client_id),
                },
                client_id,
            )
            .await;
            Ok((StatusCode::CREATED, Json(activity)).into_response())
        }
        Err(e) => {
            // Falha solta a trava na hora: o usuário pode tentar de novo
            app_state.guard.abort(&guard_key).await;
            Err(e)
        }
    }
}

// DELETE /api/activities/{activity_id}
#[utoipa::path(
    delete,
    path = "/api/activities/{activity_id}",
    tag = "Atividades",
    params(("activity_id" = Uuid, Path, description = "Id da atividade")),
    responses(
        (status = 200, description = "Atividade marcada como inativa (soft delete)", body = Activity),
        (status = 404, description = "Atividade não encontrada")
    )
)]
pub async fn remove_activity(
    State(app_state): State<AppState>,
    Path(activity_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    // Nunca apaga a linha: só marca active = false
    let activity = app_state.store.deactivate_activity(activity_id).await?;
    after_mutation(
        &app_state,
        ChangeEvent {
            table: StoreTable::Activities,
            kind: ChangeKind::Update,
            row_id: Some(activity.id),
            client_id: Some(activity.client_id),
        },
        activity.client_id,
    )
    .await;
    Ok((StatusCode::OK, Json(activity)))
}

// Contrato de toda mutação bem-sucedida: publica a mudança e invalida o feed
// corrente e a lista de atividades do cliente. O evento no hub ainda passa
// pelo debounce do bridge; a invalidação direta dá a resposta imediata.
async fn after_mutation(app_state: &AppState, event: ChangeEvent, client_id: Uuid) {
    app_state.hub.publish(event);
    app_state.feed.invalidate_current().await;
    app_state.activities.invalidate(client_id).await;
    app_state.activities.invalidate_open().await;
}
