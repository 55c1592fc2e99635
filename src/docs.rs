// src/docs.rs

use crate::handlers;
use crate::models;
use crate::services;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        // --- Quadro do funil ---
        handlers::board::get_board,
        handlers::board::load_more,

        // --- Estatísticas ---
        handlers::stats::get_funnel_stats,

        // --- Atividades ---
        handlers::activities::list_activities,
        handlers::activities::close_activity_view,
        handlers::activities::register_activity,
        handlers::activities::remove_activity,

        // --- Clientes ---
        handlers::clients::list_loss_reasons,
        handlers::clients::register_loss,
    ),
    components(
        schemas(
            models::funnel::Client,
            models::funnel::Activity,
            models::funnel::LossReason,
            models::funnel::ClientLossRecord,
            models::funnel::ClientStatus,
            models::funnel::ActivityType,
            models::funnel::ContactType,
            models::funnel::ColumnId,
            models::funnel::FunnelColumn,
            models::stats::DailyFunnelSnapshot,
            models::stats::FunnelTotals,
            models::stats::FunnelReport,
            services::board_service::BoardView,
            handlers::activities::RegisterActivityPayload,
            handlers::clients::RegisterLossPayload,
        )
    ),
    tags(
        (name = "Funil", description = "Quadro vivo e métricas diárias do funil de vendas"),
        (name = "Atividades", description = "Histórico de interações com o cliente (soft delete)")
    )
)]
pub struct ApiDoc;
