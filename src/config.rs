// src/config.rs

use sqlx::{PgPool, postgres::PgPoolOptions};
use std::sync::Arc;
use std::{env, str::FromStr, time::Duration};

use crate::{
    db::{ChangeHub, FunnelRepository, FunnelStore},
    services::{ActivityCache, FeedManager, StatsService, SubmissionGuard},
};

#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    // O store por trás de uma trait: produção fala Postgres, teste fala memória
    pub store: Arc<dyn FunnelStore>,
    pub hub: ChangeHub,
    pub feed: Arc<FeedManager>,
    pub activities: Arc<ActivityCache>,
    pub stats: StatsService,
    pub guard: Arc<SubmissionGuard>,
    pub sync_debounce: Duration,
}

impl AppState {
    // A assinatura retorna um Result: se a configuração falhar, quem decide
    // morrer é o main.
    pub async fn new() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL").expect("DATABASE_URL deve ser definida");

        // Conecta ao banco de dados, usando '?' para propagar erros
        let db_pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect(&database_url)
            .await?;

        tracing::info!("✅ Conexão com o banco de dados estabelecida com sucesso!");

        // Ajustes finos, todos com padrão sensato
        let page_size: i64 = env_or("BOARD_PAGE_SIZE", 50);
        let min_per_column: usize = env_or("BOARD_MIN_PER_COLUMN", 5);
        let sync_debounce = Duration::from_millis(env_or("SYNC_DEBOUNCE_MS", 1000));
        let submit_cooldown = Duration::from_millis(env_or("SUBMIT_COOLDOWN_MS", 3000));

        // --- Monta o gráfico de dependências ---
        let store: Arc<dyn FunnelStore> = Arc::new(FunnelRepository::new(db_pool.clone()));
        let hub = ChangeHub::new(256);
        let feed = Arc::new(FeedManager::new(store.clone(), page_size, min_per_column));
        let activities = Arc::new(ActivityCache::new(store.clone()));
        let stats = StatsService::new(store.clone());
        let guard = Arc::new(SubmissionGuard::new(submit_cooldown));

        Ok(Self {
            db_pool,
            store,
            hub,
            feed,
            activities,
            stats,
            guard,
            sync_debounce,
        })
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
