// src/services/board_service.rs
//
// O quadro vivo do funil: classificação dos clientes em colunas, decisão de
// "buscar mais uma página?" e o feed incremental com deduplicação, chaveado
// pelos filtros ativos. O RealtimeSyncBridge invalida o feed lendo a chave
// CORRENTE na hora do disparo, por isso o manager guarda essa chave aqui.

use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::store::{BoardQuery, FunnelStore},
    models::funnel::{Activity, Client, ClientStatus, ColumnId, FunnelColumn},
};

// --- CLASSIFICADOR ---

// Mapeia um status de cliente para a coluna do quadro.
// Status terminais (enrolled/lost/attendance-completed) ficam fora de TODAS
// as colunas; status desconhecido idem, mas com warn para o dado não sumir
// em silêncio.
pub fn column_for_status(status: &str) -> Option<ColumnId> {
    match ClientStatus::from_str(status) {
        Ok(ClientStatus::NewRegistration) => Some(ColumnId::NewRegistration),
        Ok(ClientStatus::ContactAttempt) => Some(ColumnId::ContactAttempt),
        Ok(ClientStatus::EffectiveContact) => Some(ColumnId::EffectiveContact),
        Ok(ClientStatus::AppointmentScheduled) => Some(ColumnId::AppointmentScheduled),
        Ok(ClientStatus::Negotiation) => Some(ColumnId::Negotiation),
        Ok(_) => None,
        Err(()) => {
            tracing::warn!("Status de cliente não reconhecido '{}', fora do quadro", status);
            None
        }
    }
}

// Monta as colunas na ordem fixa. Cada cliente cai em no máximo uma coluna.
pub fn build_columns(clients: &[Client]) -> Vec<FunnelColumn> {
    let mut by_column: HashMap<ColumnId, Vec<Client>> = HashMap::new();

    for client in clients {
        if let Some(column) = column_for_status(&client.status) {
            by_column.entry(column).or_default().push(client.clone());
        }
    }

    ColumnId::ALL
        .into_iter()
        .map(|id| FunnelColumn {
            id,
            title: id.title().to_string(),
            clients: by_column.remove(&id).unwrap_or_default(),
        })
        .collect()
}

// --- CONSELHEIRO DE PAGINAÇÃO ---

// true quando vale buscar mais uma página: quadro totalmente vazio (partida
// fria, precisa descobrir se existe dado) ou alguma coluna não-vazia abaixo
// do mínimo visível. A convergência vem do chamador: ele para quando isto
// devolve false OU o feed esgota.
pub fn should_load_more(columns: &[FunnelColumn], min_per_column: usize) -> bool {
    let non_empty: Vec<_> = columns.iter().filter(|c| !c.clients.is_empty()).collect();

    if non_empty.is_empty() {
        return true;
    }

    non_empty.iter().any(|c| c.clients.len() < min_per_column)
}

// --- FEED INCREMENTAL ---

// A identidade de um feed: os filtros ativos do quadro.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FeedKey {
    pub unit_ids: Vec<Uuid>,
    pub search: Option<String>,
    pub pending_only: bool,
}

impl FeedKey {
    // Normaliza para que a mesma seleção gere sempre a mesma chave.
    pub fn new(mut unit_ids: Vec<Uuid>, search: Option<String>, pending_only: bool) -> Self {
        unit_ids.sort();
        unit_ids.dedup();
        let search = search
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        Self {
            unit_ids,
            search,
            pending_only,
        }
    }
}

#[derive(Debug, Default)]
struct FeedState {
    pages: Vec<Vec<Client>>,
    // Dedup entre páginas (o mesmo cliente pode reaparecer quando a ordenação
    // desliza entre duas buscas)
    seen: HashSet<Uuid>,
    // Linhas cruas já buscadas, ANTES do dedup: é esse o offset da próxima página
    fetched_rows: i64,
    // Página curta = última página, não existe próxima
    exhausted: bool,
    // No máximo uma busca em voo por chave
    in_flight: bool,
    // Invalidação incrementa; resultado que chega com geração velha é descartado
    generation: u64,
}

#[derive(Debug, Clone, serde::Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BoardView {
    pub columns: Vec<FunnelColumn>,
    pub has_more: bool,
}

pub struct FeedManager {
    store: Arc<dyn FunnelStore>,
    page_size: i64,
    min_per_column: usize,
    feeds: Mutex<HashMap<FeedKey, FeedState>>,
    // A chave ativa AGORA; o bridge lê isto na hora de invalidar, nunca uma
    // chave capturada na assinatura
    current: RwLock<Option<FeedKey>>,
}

impl FeedManager {
    pub fn new(store: Arc<dyn FunnelStore>, page_size: i64, min_per_column: usize) -> Self {
        Self {
            store,
            page_size,
            min_per_column,
            feeds: Mutex::new(HashMap::new()),
            current: RwLock::new(None),
        }
    }

    pub async fn current_key(&self) -> Option<FeedKey> {
        self.current.read().await.clone()
    }

    // Monta o quadro para a chave dada, puxando páginas até toda coluna
    // visível ter o mínimo ou o feed esgotar.
    pub async fn board(&self, key: FeedKey) -> Result<BoardView, AppError> {
        *self.current.write().await = Some(key.clone());

        loop {
            let (clients, exhausted) = self.accumulated(&key).await;
            let columns = build_columns(&clients);

            if !should_load_more(&columns, self.min_per_column) || exhausted {
                return Ok(BoardView {
                    columns,
                    has_more: !exhausted,
                });
            }

            // Se nada avançou (busca já em voo em outra requisição), devolve
            // o que há em vez de girar em vazio
            if !self.fetch_next(&key).await? {
                return Ok(BoardView {
                    columns,
                    has_more: !exhausted,
                });
            }
        }
    }

    // Foto do estado atual do feed, sem disparar buscas. Também marca a
    // chave como corrente (é o quadro que o usuário está olhando).
    pub async fn view(&self, key: FeedKey) -> BoardView {
        *self.current.write().await = Some(key.clone());
        let (clients, exhausted) = self.accumulated(&key).await;
        BoardView {
            columns: build_columns(&clients),
            has_more: !exhausted,
        }
    }

    // Busca a próxima página do feed. Devolve true se uma página nova foi
    // incorporada. Idempotente sob requisições duplicadas: com uma busca em
    // voo para a chave, as demais viram no-op.
    pub async fn fetch_next(&self, key: &FeedKey) -> Result<bool, AppError> {
        let (generation, offset) = {
            let mut feeds = self.feeds.lock().await;
            let state = feeds.entry(key.clone()).or_default();

            if state.exhausted || state.in_flight {
                return Ok(false);
            }

            state.in_flight = true;
            (state.generation, state.fetched_rows)
        };

        let query = self.board_query(key, offset);
        let result = self.store.fetch_board_page(&query).await;

        let mut feeds = self.feeds.lock().await;
        let state = feeds.entry(key.clone()).or_default();

        // A chave foi invalidada enquanto a busca estava em voo: o resultado
        // pertence à geração anterior e é descartado na chegada
        if state.generation != generation {
            return Ok(false);
        }

        state.in_flight = false;
        let page = result?;

        state.exhausted = (page.len() as i64) < self.page_size;
        state.fetched_rows += page.len() as i64;

        let fresh: Vec<Client> = page
            .into_iter()
            .filter(|c| state.seen.insert(c.id))
            .collect();
        state.pages.push(fresh);

        Ok(true)
    }

    // Invalida e rebusca o feed da chave CORRENTE. Chamado pelo bridge de
    // realtime e após cada mutação bem-sucedida. Em caso de falha na
    // rebusca, as páginas antigas ficam de pé (last-known-good) e o erro
    // vira log, não tela vazia.
    pub async fn invalidate_current(&self) {
        let Some(key) = self.current_key().await else {
            return;
        };

        let generation = {
            let mut feeds = self.feeds.lock().await;
            let state = feeds.entry(key.clone()).or_default();
            state.generation += 1;
            state.in_flight = false;
            state.generation
        };

        // Rebusca ansiosa da primeira página com os dados novos
        let query = self.board_query(&key, 0);
        match self.store.fetch_board_page(&query).await {
            Ok(page) => {
                let mut feeds = self.feeds.lock().await;
                let state = feeds.entry(key.clone()).or_default();

                // Outra invalidação passou na frente; descarta
                if state.generation != generation {
                    return;
                }

                state.exhausted = (page.len() as i64) < self.page_size;
                state.fetched_rows = page.len() as i64;
                state.seen = page.iter().map(|c| c.id).collect();
                state.pages = vec![page];
            }
            Err(e) => {
                tracing::warn!("Rebusca pós-invalidação falhou: {}; mantendo dados antigos", e);
            }
        }
    }

    async fn accumulated(&self, key: &FeedKey) -> (Vec<Client>, bool) {
        let feeds = self.feeds.lock().await;
        match feeds.get(key) {
            Some(state) => (
                state.pages.iter().flatten().cloned().collect(),
                state.exhausted,
            ),
            None => (Vec::new(), false),
        }
    }

    fn board_query(&self, key: &FeedKey, offset: i64) -> BoardQuery {
        // Fim do dia corrente em UTC: limite do "retorno pendente"
        let pending_until = chrono::Utc::now()
            .date_naive()
            .succ_opt()
            .expect("data fora do alcance do chrono")
            .and_time(chrono::NaiveTime::MIN)
            .and_utc();

        BoardQuery {
            unit_ids: key.unit_ids.clone(),
            search: key.search.clone(),
            pending_only: key.pending_only,
            pending_until,
            offset,
            limit: self.page_size,
        }
    }
}

// --- CACHE DA LISTA DE ATIVIDADES ABERTA ---

// A visão de detalhe de um cliente mantém a lista de atividades em cache;
// o bridge invalida a lista do cliente ABERTO quando algo muda.
pub struct ActivityCache {
    store: Arc<dyn FunnelStore>,
    open: RwLock<Option<Uuid>>,
    cache: Mutex<HashMap<Uuid, Vec<Activity>>>,
}

impl ActivityCache {
    pub fn new(store: Arc<dyn FunnelStore>) -> Self {
        Self {
            store,
            open: RwLock::new(None),
            cache: Mutex::new(HashMap::new()),
        }
    }

    // Abre (ou reusa) a lista de atividades de um cliente.
    pub async fn view(&self, client_id: Uuid) -> Result<Vec<Activity>, AppError> {
        *self.open.write().await = Some(client_id);

        if let Some(cached) = self.cache.lock().await.get(&client_id) {
            return Ok(cached.clone());
        }

        let activities = self.store.fetch_client_activities(client_id).await?;
        self.cache
            .lock()
            .await
            .insert(client_id, activities.clone());
        Ok(activities)
    }

    pub async fn close(&self) {
        *self.open.write().await = None;
    }

    // Derruba o cache de um cliente específico (após mutação nele).
    pub async fn invalidate(&self, client_id: Uuid) {
        self.cache.lock().await.remove(&client_id);
    }

    // Derruba e rebusca a lista do cliente aberto, se houver.
    pub async fn invalidate_open(&self) {
        let Some(client_id) = *self.open.read().await else {
            return;
        };

        self.cache.lock().await.remove(&client_id);

        match self.store.fetch_client_activities(client_id).await {
            Ok(activities) => {
                self.cache.lock().await.insert(client_id, activities);
            }
            Err(e) => {
                tracing::warn!("Rebusca de atividades do cliente {} falhou: {}", client_id, e);
            }
        }
    }
}
