// src/handlers/board.rs

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
    services::board_service::{BoardView, FeedKey},
};

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct BoardParams {
    // Ids de unidade separados por vírgula
    pub units: Option<String>,
    // Busca livre por nome ou telefone
    pub search: Option<String>,
    // Só clientes com retorno pendente
    #[serde(default)]
    pub pending_only: bool,
}

impl BoardParams {
    fn feed_key(&self) -> FeedKey {
        FeedKey::new(
            parse_units(self.units.as_deref()),
            self.search.clone(),
            self.pending_only,
        )
    }
}

// GET /api/funnel/board
#[utoipa::path(
    get,
    path = "/api/funnel/board",
    tag = "Funil",
    params(BoardParams),
    responses(
        (status = 200, description = "Colunas do quadro com clientes vivos", body = BoardView)
    )
)]
pub async fn get_board(
    State(app_state): State<AppState>,
    Query(params): Query<BoardParams>,
) -> Result<impl IntoResponse, AppError> {
    // board() puxa páginas até toda coluna visível ter o mínimo ou esgotar
    let view = app_state.feed.board(params.feed_key()).await?;
    Ok((StatusCode::OK, Json(view)))
}

// POST /api/funnel/board/load-more
#[utoipa::path(
    post,
    path = "/api/funnel/board/load-more",
    tag = "Funil",
    params(BoardParams),
    responses(
        (status = 200, description = "Quadro após buscar mais uma página", body = BoardView)
    )
)]
pub async fn load_more(
    State(app_state): State<AppState>,
    Query(params): Query<BoardParams>,
) -> Result<impl IntoResponse, AppError> {
    let key = params.feed_key();
    // Uma página só; requisição duplicada com busca em voo vira no-op
    app_state.feed.fetch_next(&key).await?;
    let view = app_state.feed.view(key).await;
    Ok((StatusCode::OK, Json(view)))
}
