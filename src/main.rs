// src/main.rs

use axum::{
    Router,
    routing::{delete, get, post},
};
use tokio::net::TcpListener;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use funil_backend::{config::AppState, db, docs, handlers, services::SyncBridge};

#[tokio::main]
async fn main() {
    // Inicializa o logger.
    tracing_subscriber::fmt().with_target(false).compact().init();

    // .expect() é bom aqui: se a configuração falhar, a aplicação não deve iniciar.
    let app_state = AppState::new()
        .await
        .expect("Falha ao inicializar o estado da aplicação.");

    // Roda as migrações do SQLx na inicialização
    sqlx::migrate!()
        .run(&app_state.db_pool)
        .await
        .expect("Falha ao rodar as migrações do banco de dados.");

    tracing::info!("✅ Migrações do banco de dados executadas com sucesso!");

    // Gatilhos do Postgres -> hub de mudanças em processo (reconecta sozinho)
    db::notify::spawn_pg_forwarder(app_state.db_pool.clone(), app_state.hub.clone());

    // UMA assinatura de longa duração para o realtime; trocar o filtro do
    // quadro NÃO reassina: o bridge lê a chave corrente na hora de invalidar
    let bridge = SyncBridge::new(
        app_state.hub.clone(),
        app_state.feed.clone(),
        app_state.activities.clone(),
        app_state.sync_debounce,
    );
    tokio::spawn(bridge.run());

    // Rotas do quadro e das estatísticas do funil
    let funnel_routes = Router::new()
        .route("/board", get(handlers::board::get_board))
        .route("/board/load-more", post(handlers::board::load_more))
        .route("/stats", get(handlers::stats::get_funnel_stats));

    // Rotas de atividades por cliente
    let client_routes = Router::new()
        .route(
            "/{client_id}/activities",
            get(handlers::activities::list_activities)
                .post(handlers::activities::register_activity),
        )
        .route(
            "/{client_id}/activities/close",
            post(handlers::activities::close_activity_view),
        )
        .route("/{client_id}/loss", post(handlers::clients::register_loss));

    let activity_routes =
        Router::new().route("/{activity_id}", delete(handlers::activities::remove_activity));

    // Combina tudo no router principal
    let app = Router::new()
        .route("/api/health", get(|| async { "OK" }))
        .route("/api/loss-reasons", get(handlers::clients::list_loss_reasons))
        .nest("/api/funnel", funnel_routes)
        .nest("/api/clients", client_routes)
        .nest("/api/activities", activity_routes)
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", docs::ApiDoc::openapi()))
        .with_state(app_state);

    // Inicia o servidor
    let addr = "0.0.0.0:3000";
    let listener = TcpListener::bind(addr)
        .await
        .expect("Falha ao iniciar o listener TCP");
    tracing::info!("🚀 Servidor escutando em {}", listener.local_addr().unwrap());
    axum::serve(listener, app).await.expect("Erro no servidor Axum");
}
