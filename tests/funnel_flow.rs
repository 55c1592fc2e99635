// tests/funnel_flow.rs
//
// Testes de integração do subsistema de funil sobre um store em memória:
// o mesmo contrato (FunnelStore) da implementação Postgres, sem banco.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use uuid::Uuid;

use funil_backend::{
    common::error::AppError,
    db::{
        notify::{ChangeEvent, ChangeHub, ChangeKind, StoreTable},
        store::{BoardQuery, FunnelStore, NewActivity, RangeQuery},
    },
    models::{
        funnel::{Activity, Client, ClientLossRecord, ClientStatus, LossReason},
        stats::{DailyCountRow, StatsFilter},
    },
    services::{
        ActivityCache, FeedKey, FeedManager, StatsService, SyncBridge,
        stats_service::AggregationStrategy,
    },
};

// --- STORE EM MEMÓRIA ---

#[derive(Default)]
struct MemStore {
    clients: Mutex<Vec<Client>>,
    activities: Mutex<Vec<Activity>>,
    loss_reasons: Mutex<Vec<LossReason>>,
    loss_records: Mutex<Vec<ClientLossRecord>>,
    // Quantas páginas do quadro já foram servidas (para medir coalescimento)
    board_fetches: AtomicUsize,
    // Atraso de uma única próxima busca de página (para testar corrida)
    delay_next_fetch: Mutex<Option<Duration>>,
}

impl MemStore {
    fn push_client(&self, client: Client) {
        self.clients.lock().unwrap().push(client);
    }

    fn push_activity(&self, activity: Activity) {
        self.activities.lock().unwrap().push(activity);
    }

    fn owner(&self, client_id: Uuid) -> Option<Client> {
        self.clients
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == client_id)
            .cloned()
    }

    fn in_scope(&self, activity: &Activity, range: &RangeQuery) -> bool {
        let Some(owner) = self.owner(activity.client_id) else {
            return false;
        };
        if !range.unit_ids.contains(&owner.unit_id) {
            return false;
        }
        match &range.lead_source {
            Some(source) => owner.lead_source == *source,
            None => true,
        }
    }
}

fn day_key(ts: DateTime<Utc>) -> String {
    ts.date_naive().format("%Y-%m-%d").to_string()
}

fn in_range(ts: DateTime<Utc>, range: &RangeQuery) -> bool {
    ts >= range.start_utc() && ts < range.end_utc()
}

fn group_rows(entries: Vec<(String, String)>) -> Vec<DailyCountRow> {
    let mut counts: HashMap<(String, String), i64> = HashMap::new();
    for (day, category) in entries {
        *counts.entry((day, category)).or_insert(0) += 1;
    }
    counts
        .into_iter()
        .map(|((day, category), total)| DailyCountRow::new(day, category, total))
        .collect()
}

#[async_trait]
impl FunnelStore for MemStore {
    async fn fetch_board_page(&self, query: &BoardQuery) -> Result<Vec<Client>, AppError> {
        let delay = self.delay_next_fetch.lock().unwrap().take();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.board_fetches.fetch_add(1, Ordering::SeqCst);

        let mut rows: Vec<Client> = self
            .clients
            .lock()
            .unwrap()
            .iter()
            .filter(|c| query.unit_ids.contains(&c.unit_id))
            .filter(|c| {
                ClientStatus::from_str(&c.status)
                    .map(|s| !s.is_terminal())
                    .unwrap_or(true)
            })
            .filter(|c| match &query.search {
                Some(term) => {
                    let t = term.to_lowercase();
                    c.name.to_lowercase().contains(&t) || c.phone_number.contains(&t)
                }
                None => true,
            })
            .filter(|c| {
                !query.pending_only
                    || c.next_contact_date.is_none_or(|d| d <= query.pending_until)
            })
            .cloned()
            .collect();

        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(rows
            .into_iter()
            .skip(query.offset as usize)
            .take(query.limit as usize)
            .collect())
    }

    async fn fetch_client_activities(&self, client_id: Uuid) -> Result<Vec<Activity>, AppError> {
        let mut rows: Vec<Activity> = self
            .activities
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.client_id == client_id && a.active)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn new_clients_per_day(
        &self,
        range: &RangeQuery,
    ) -> Result<Vec<DailyCountRow>, AppError> {
        let entries = self
            .clients
            .lock()
            .unwrap()
            .iter()
            .filter(|c| range.unit_ids.contains(&c.unit_id))
            .filter(|c| match &range.lead_source {
                Some(source) => c.lead_source == *source,
                None => true,
            })
            .filter(|c| in_range(c.created_at, range))
            .map(|c| (day_key(c.created_at), "new_clients".to_string()))
            .collect();
        Ok(group_rows(entries))
    }

    async fn activities_created_per_day(
        &self,
        range: &RangeQuery,
    ) -> Result<Vec<DailyCountRow>, AppError> {
        let activities = self.activities.lock().unwrap().clone();
        let entries = activities
            .iter()
            .filter(|a| a.active && in_range(a.created_at, range))
            .filter(|a| self.in_scope(a, range))
            .map(|a| (day_key(a.created_at), a.activity_type.clone()))
            .collect();
        Ok(group_rows(entries))
    }

    async fn activities_scheduled_per_day(
        &self,
        range: &RangeQuery,
    ) -> Result<Vec<DailyCountRow>, AppError> {
        let activities = self.activities.lock().unwrap().clone();
        let entries = activities
            .iter()
            .filter(|a| a.active)
            .filter_map(|a| a.scheduled_date.map(|d| (a, d)))
            .filter(|(_, d)| in_range(*d, range))
            .filter(|(a, _)| self.in_scope(a, range))
            .map(|(a, d)| (day_key(d), a.activity_type.clone()))
            .collect();
        Ok(group_rows(entries))
    }

    // Implementação independente do caminho pré-agregado, para comparar as
    // duas estratégias: deriva as métricas finais direto do dado cru.
    async fn aggregated_funnel_per_day(
        &self,
        range: &RangeQuery,
    ) -> Result<Vec<DailyCountRow>, AppError> {
        let mut entries: Vec<(String, String)> = Vec::new();

        for c in self.clients.lock().unwrap().iter() {
            if range.unit_ids.contains(&c.unit_id)
                && range
                    .lead_source
                    .as_ref()
                    .is_none_or(|s| c.lead_source == *s)
                && in_range(c.created_at, range)
            {
                entries.push((day_key(c.created_at), "new_clients".into()));
            }
        }

        let activities = self.activities.lock().unwrap().clone();
        for a in activities.iter().filter(|a| a.active) {
            if !self.in_scope(a, range) {
                continue;
            }
            if in_range(a.created_at, range) {
                let day = day_key(a.created_at);
                match a.activity_type.as_str() {
                    "contact-attempt" => entries.push((day, "contact_attempts".into())),
                    "effective-contact" => {
                        entries.push((day.clone(), "contact_attempts".into()));
                        entries.push((day, "effective_contacts".into()));
                    }
                    "scheduling" => {
                        entries.push((day.clone(), "contact_attempts".into()));
                        entries.push((day.clone(), "effective_contacts".into()));
                        entries.push((day, "scheduled_visits".into()));
                    }
                    "attendance" => entries.push((day, "completed_visits".into())),
                    "enrollment" => entries.push((day, "enrollments".into())),
                    _ => {}
                }
            }
            if a.activity_type == "scheduling" {
                if let Some(d) = a.scheduled_date {
                    if in_range(d, range) {
                        entries.push((day_key(d), "awaiting_visits".into()));
                    }
                }
            }
        }

        Ok(group_rows(entries))
    }

    async fn register_activity(&self, input: &NewActivity) -> Result<Activity, AppError> {
        if self.owner(input.client_id).is_none() {
            return Err(AppError::ClientNotFound);
        }

        let activity = Activity {
            id: Uuid::new_v4(),
            client_id: input.client_id,
            activity_type: input.activity_type.as_str().to_string(),
            contact_type: input.contact_type.as_str().to_string(),
            created_at: Utc::now(),
            scheduled_date: input.scheduled_date,
            next_contact_date: input.next_contact_date,
            notes: input.notes.clone(),
            active: true,
        };
        self.push_activity(activity.clone());

        let mut clients = self.clients.lock().unwrap();
        if let Some(c) = clients.iter_mut().find(|c| c.id == input.client_id) {
            c.status = input.activity_type.next_status().as_str().to_string();
        }

        Ok(activity)
    }

    async fn deactivate_activity(&self, activity_id: Uuid) -> Result<Activity, AppError> {
        let mut activities = self.activities.lock().unwrap();
        let Some(a) = activities.iter_mut().find(|a| a.id == activity_id) else {
            return Err(AppError::ActivityNotFound);
        };
        a.active = false;
        Ok(a.clone())
    }

    async fn list_loss_reasons(&self) -> Result<Vec<LossReason>, AppError> {
        Ok(self.loss_reasons.lock().unwrap().clone())
    }

    async fn register_loss(
        &self,
        client_id: Uuid,
        reason_ids: &[Uuid],
        observations: Option<&str>,
    ) -> Result<Vec<ClientLossRecord>, AppError> {
        let previous_status = self
            .owner(client_id)
            .map(|c| c.status)
            .ok_or(AppError::ClientNotFound)?;

        let records: Vec<ClientLossRecord> = reason_ids
            .iter()
            .map(|reason_id| ClientLossRecord {
                id: Uuid::new_v4(),
                client_id,
                loss_reason_id: *reason_id,
                previous_status: previous_status.clone(),
                total_reasons_at_loss: reason_ids.len() as i32,
                observations: observations.map(str::to_string),
                created_at: Utc::now(),
            })
            .collect();
        self.loss_records.lock().unwrap().extend(records.clone());

        let mut clients = self.clients.lock().unwrap();
        if let Some(c) = clients.iter_mut().find(|c| c.id == client_id) {
            c.status = ClientStatus::Lost.as_str().to_string();
        }

        Ok(records)
    }
}

// --- FÁBRICAS ---

fn at(date: &str) -> DateTime<Utc> {
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .unwrap()
        .and_time(NaiveTime::from_hms_opt(12, 0, 0).unwrap())
        .and_utc()
}

fn client(unit_id: Uuid, status: &str, lead_source: &str, created: &str) -> Client {
    Client {
        id: Uuid::new_v4(),
        unit_id,
        name: "Maria da Silva".into(),
        phone_number: "+5511988887777".into(),
        email: None,
        lead_source: lead_source.into(),
        status: status.into(),
        next_contact_date: None,
        scheduled_date: None,
        valorization_confirmed: false,
        duplicate_registration_count: None,
        duplicate_registration_history: None,
        created_at: at(created),
        updated_at: at(created),
    }
}

fn activity(client_id: Uuid, kind: &str, created: &str, scheduled: Option<&str>) -> Activity {
    Activity {
        id: Uuid::new_v4(),
        client_id,
        activity_type: kind.into(),
        contact_type: "whatsapp-message".into(),
        created_at: at(created),
        scheduled_date: scheduled.map(at),
        next_contact_date: None,
        notes: None,
        active: true,
    }
}

fn march_filter(unit_id: Uuid) -> StatsFilter {
    StatsFilter {
        year: 2025,
        month: 3,
        unit_ids: vec![unit_id],
        lead_source: None,
    }
}

// --- AGREGAÇÃO MENSAL ---

// O cenário de referência: um lead de Instagram criado em 5 de março, com
// tentativa de contato no dia 5 e agendamento no dia 6 para visita no dia 10.
fn seed_march_scenario(store: &MemStore, unit_id: Uuid) {
    let lead = client(unit_id, "appointment-scheduled", "Instagram", "2025-03-05");
    let lead_id = lead.id;
    store.push_client(lead);
    store.push_activity(activity(lead_id, "contact-attempt", "2025-03-05", None));
    store.push_activity(activity(
        lead_id,
        "scheduling",
        "2025-03-06",
        Some("2025-03-10"),
    ));
}

#[tokio::test]
async fn relatorio_de_marco_dia_a_dia() {
    let unit_id = Uuid::new_v4();
    let store = Arc::new(MemStore::default());
    seed_march_scenario(&store, unit_id);

    let stats = StatsService::new(store.clone());
    let report = stats.monthly_report(&march_filter(unit_id)).await.unwrap();

    // Um snapshot por dia do mês, em ordem, sem buracos
    assert_eq!(report.days.len(), 31);
    assert!(report.days.windows(2).all(|w| w[0].date < w[1].date));

    let by_day: HashMap<u32, _> = report
        .days
        .iter()
        .map(|d| (chrono::Datelike::day(&d.date), d.clone()))
        .collect();

    let d5 = &by_day[&5];
    assert_eq!(d5.new_clients, 1);
    assert_eq!(d5.contact_attempts, 1);
    assert_eq!(d5.effective_contacts, 0);

    // Agendamento implica tentativa e contato efetivo no mesmo dia
    let d6 = &by_day[&6];
    assert_eq!(d6.new_clients, 0);
    assert_eq!(d6.contact_attempts, 1);
    assert_eq!(d6.effective_contacts, 1);
    assert_eq!(d6.scheduled_visits, 1);
    assert_eq!(d6.awaiting_visits, 0);
    assert_eq!(d6.ag_rate, 100.0);

    // A visita é esperada no dia 10: outro conjunto de eventos, outro eixo
    let d10 = &by_day[&10];
    assert_eq!(d10.awaiting_visits, 1);
    assert_eq!(d10.scheduled_visits, 0);

    // Todos os outros dias zerados
    for (day, snap) in &by_day {
        if ![5, 6, 10].contains(day) {
            assert_eq!(snap.new_clients + snap.contact_attempts + snap.awaiting_visits, 0);
        }
    }

    // Totais somam exatamente os dias; taxas saem das somas
    assert_eq!(report.totals.new_clients, 1);
    assert_eq!(report.totals.contact_attempts, 2);
    assert_eq!(report.totals.effective_contacts, 1);
    assert_eq!(report.totals.scheduled_visits, 1);
    assert_eq!(report.totals.awaiting_visits, 1);
    assert_eq!(report.totals.ce_rate, 50.0);
}

#[tokio::test]
async fn totais_vem_das_somas_nao_da_media_das_taxas() {
    let unit_id = Uuid::new_v4();
    let store = Arc::new(MemStore::default());

    let lead = client(unit_id, "contact-attempt", "Instagram", "2025-03-01");
    let lead_id = lead.id;
    store.push_client(lead);

    // Dia 1: 10 tentativas, 1 efetivo (10%). Dia 2: 1 tentativa, 1 efetivo (100%).
    for _ in 0..9 {
        store.push_activity(activity(lead_id, "contact-attempt", "2025-03-01", None));
    }
    store.push_activity(activity(lead_id, "effective-contact", "2025-03-01", None));
    store.push_activity(activity(lead_id, "effective-contact", "2025-03-02", None));

    let stats = StatsService::new(store.clone());
    let report = stats.monthly_report(&march_filter(unit_id)).await.unwrap();

    let sum_ca: i64 = report.days.iter().map(|d| d.contact_attempts).sum();
    let sum_ec: i64 = report.days.iter().map(|d| d.effective_contacts).sum();
    assert_eq!(report.totals.contact_attempts, sum_ca);
    assert_eq!(report.totals.effective_contacts, sum_ec);

    // 2 efetivos / 11 tentativas, e não (10% + 100%) / 2
    assert_eq!(report.totals.ce_rate, 2.0 / 11.0 * 100.0);
}

#[tokio::test]
async fn as_duas_estrategias_produzem_o_mesmo_relatorio() {
    let unit_id = Uuid::new_v4();
    let store = Arc::new(MemStore::default());
    seed_march_scenario(&store, unit_id);

    let lead = client(unit_id, "enrolled", "Facebook", "2025-03-12");
    let lead_id = lead.id;
    store.push_client(lead);
    store.push_activity(activity(lead_id, "attendance", "2025-03-14", None));
    store.push_activity(activity(lead_id, "enrollment", "2025-03-15", None));

    let merge = StatsService::with_strategy(store.clone(), AggregationStrategy::ClientMerge);
    let server = StatsService::with_strategy(store.clone(), AggregationStrategy::ServerSide);

    let a = merge.monthly_report(&march_filter(unit_id)).await.unwrap();
    let b = server.monthly_report(&march_filter(unit_id)).await.unwrap();

    assert_eq!(a.days, b.days);
    assert_eq!(a.totals, b.totals);
}

#[tokio::test]
async fn filtro_de_origem_restringe_o_relatorio() {
    let unit_id = Uuid::new_v4();
    let store = Arc::new(MemStore::default());
    seed_march_scenario(&store, unit_id);

    let mut filter = march_filter(unit_id);
    filter.lead_source = Some("Facebook".into());

    let stats = StatsService::new(store.clone());
    let report = stats.monthly_report(&filter).await.unwrap();
    assert_eq!(report.totals.new_clients, 0);
    assert_eq!(report.totals.contact_attempts, 0);
}

#[tokio::test]
async fn sem_unidade_resolvida_o_relatorio_fecha_vazio() {
    let unit_id = Uuid::new_v4();
    let store = Arc::new(MemStore::default());
    seed_march_scenario(&store, unit_id);

    let mut filter = march_filter(unit_id);
    filter.unit_ids = Vec::new();

    // Fail-closed: nada de consultar o mundo inteiro por falta de filtro
    let stats = StatsService::new(store.clone());
    let report = stats.monthly_report(&filter).await.unwrap();
    assert!(report.days.is_empty());
    assert_eq!(store.board_fetches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn atividade_desativada_sai_da_agregacao() {
    let unit_id = Uuid::new_v4();
    let store = Arc::new(MemStore::default());

    let lead = client(unit_id, "contact-attempt", "Instagram", "2025-03-01");
    let lead_id = lead.id;
    store.push_client(lead);
    let a = activity(lead_id, "contact-attempt", "2025-03-03", None);
    let a_id = a.id;
    store.push_activity(a);

    let stats = StatsService::new(store.clone());
    let before = stats.monthly_report(&march_filter(unit_id)).await.unwrap();
    assert_eq!(before.totals.contact_attempts, 1);

    store.deactivate_activity(a_id).await.unwrap();

    let after = stats.monthly_report(&march_filter(unit_id)).await.unwrap();
    assert_eq!(after.totals.contact_attempts, 0);
}

// --- FEED INCREMENTAL ---

fn feed_with(store: Arc<MemStore>, page_size: i64, min_per_column: usize) -> FeedManager {
    FeedManager::new(store, page_size, min_per_column)
}

#[tokio::test]
async fn paginacao_serial_ate_a_pagina_terminal() {
    let unit_id = Uuid::new_v4();
    let store = Arc::new(MemStore::default());
    for i in 0..7 {
        store.push_client(client(
            unit_id,
            "new-registration",
            "Instagram",
            &format!("2025-03-{:02}", i + 1),
        ));
    }

    let feed = feed_with(store.clone(), 3, 100);
    let key = FeedKey::new(vec![unit_id], None, false);

    assert!(feed.fetch_next(&key).await.unwrap());
    assert!(feed.fetch_next(&key).await.unwrap());
    // Terceira página vem curta (1 de 3): é a terminal
    assert!(feed.fetch_next(&key).await.unwrap());
    let view = feed.view(key.clone()).await;
    assert!(!view.has_more);
    assert_eq!(view.columns[0].clients.len(), 7);

    // Esgotado: mais nenhuma busca acontece
    let fetches = store.board_fetches.load(Ordering::SeqCst);
    assert!(!feed.fetch_next(&key).await.unwrap());
    assert_eq!(store.board_fetches.load(Ordering::SeqCst), fetches);
}

#[tokio::test]
async fn cliente_repetido_entre_paginas_e_deduplicado() {
    let unit_id = Uuid::new_v4();
    let store = Arc::new(MemStore::default());
    for i in 0..4 {
        store.push_client(client(
            unit_id,
            "new-registration",
            "Instagram",
            &format!("2025-03-{:02}", i + 1),
        ));
    }

    let feed = feed_with(store.clone(), 2, 100);
    let key = FeedKey::new(vec![unit_id], None, false);
    assert!(feed.fetch_next(&key).await.unwrap());

    // Um cliente novo entra no topo: o offset desliza e a página 2 re-serve
    // alguém da página 1
    store.push_client(client(unit_id, "new-registration", "Instagram", "2025-03-20"));
    assert!(feed.fetch_next(&key).await.unwrap());
    assert!(feed.fetch_next(&key).await.unwrap());

    let view = feed.view(key).await;
    let mut ids: Vec<Uuid> = view.columns[0].clients.iter().map(|c| c.id).collect();
    let before = ids.len();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), before, "quadro não pode ter cliente duplicado");
}

#[tokio::test]
async fn quadro_converge_com_dataset_pequeno() {
    let unit_id = Uuid::new_v4();
    let store = Arc::new(MemStore::default());
    // Bem menos que 5 colunas x 5 por coluna
    for i in 0..4 {
        store.push_client(client(
            unit_id,
            "contact-attempt",
            "Instagram",
            &format!("2025-03-{:02}", i + 1),
        ));
    }

    let feed = feed_with(store.clone(), 2, 5);
    let key = FeedKey::new(vec![unit_id], None, false);

    // Se a convergência quebrar, isto trava em loop infinito de buscas
    let view = feed.board(key).await.unwrap();
    assert!(!view.has_more);
    let total: usize = view.columns.iter().map(|c| c.clients.len()).sum();
    assert_eq!(total, 4);
}

#[tokio::test]
async fn trocar_de_filtro_nao_mistura_paginas() {
    let unit_a = Uuid::new_v4();
    let unit_b = Uuid::new_v4();
    let store = Arc::new(MemStore::default());
    store.push_client(client(unit_a, "new-registration", "Instagram", "2025-03-01"));
    store.push_client(client(unit_b, "negotiation", "Facebook", "2025-03-02"));

    let feed = feed_with(store.clone(), 10, 1);
    let key_a = FeedKey::new(vec![unit_a], None, false);
    let key_b = FeedKey::new(vec![unit_b], None, false);

    let view_a = feed.board(key_a.clone()).await.unwrap();
    assert_eq!(view_a.columns[0].clients.len(), 1);
    assert_eq!(view_a.columns[4].clients.len(), 0);

    // Chave nova = estado novo; nada da chave antiga vaza
    let view_b = feed.board(key_b).await.unwrap();
    assert_eq!(view_b.columns[0].clients.len(), 0);
    assert_eq!(view_b.columns[4].clients.len(), 1);

    // E o estado da chave antiga continua íntegro
    let view_a2 = feed.view(key_a).await;
    assert_eq!(view_a2.columns[0].clients.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn busca_duplicada_para_a_mesma_chave_vira_noop() {
    let unit_id = Uuid::new_v4();
    let store = Arc::new(MemStore::default());
    store.push_client(client(unit_id, "new-registration", "Instagram", "2025-03-01"));

    let feed = Arc::new(feed_with(store.clone(), 10, 1));
    let key = FeedKey::new(vec![unit_id], None, false);

    *store.delay_next_fetch.lock().unwrap() = Some(Duration::from_secs(5));

    let feed2 = feed.clone();
    let key2 = key.clone();
    let slow = tokio::spawn(async move { feed2.fetch_next(&key2).await });
    tokio::task::yield_now().await;

    // Enquanto a primeira está em voo, a segunda nem chega no store
    assert!(!feed.fetch_next(&key).await.unwrap());
    assert_eq!(store.board_fetches.load(Ordering::SeqCst), 0);

    assert!(slow.await.unwrap().unwrap());
    assert_eq!(store.board_fetches.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn resultado_de_geracao_velha_e_descartado() {
    let unit_id = Uuid::new_v4();
    let store = Arc::new(MemStore::default());
    // Dez clientes: a primeira página sai cheia e o feed NÃO se declara esgotado
    for i in 0..10 {
        store.push_client(client(
            unit_id,
            "new-registration",
            "Instagram",
            &format!("2025-03-{:02}", i + 1),
        ));
    }

    let feed = Arc::new(feed_with(store.clone(), 10, 1));
    let key = FeedKey::new(vec![unit_id], None, false);

    // A chave precisa estar corrente para a invalidação mirar nela
    feed.board(key.clone()).await.unwrap();

    // Dispara a busca da página 2, lenta, e invalida no meio do voo
    *store.delay_next_fetch.lock().unwrap() = Some(Duration::from_secs(5));
    let feed2 = feed.clone();
    let key2 = key.clone();
    let stale = tokio::spawn(async move { feed2.fetch_next(&key2).await });
    tokio::task::yield_now().await;

    store.push_client(client(unit_id, "negotiation", "Instagram", "2025-03-20"));
    feed.invalidate_current().await;

    // A busca velha resolve, mas o resultado chega com geração vencida
    assert!(!stale.await.unwrap().unwrap());

    // O estado é só o da rebusca pós-invalidação: a primeira página nova,
    // encabeçada pelo cliente recém-chegado; nada da página velha vazou
    let view = feed.view(key).await;
    let total: usize = view.columns.iter().map(|c| c.clients.len()).sum();
    assert_eq!(total, 10);
    assert_eq!(view.columns[4].clients.len(), 1);
}

#[tokio::test]
async fn perda_tira_o_cliente_do_quadro_e_guarda_o_status_anterior() {
    let unit_id = Uuid::new_v4();
    let store = Arc::new(MemStore::default());
    let lead = client(unit_id, "negotiation", "Instagram", "2025-03-01");
    let lead_id = lead.id;
    store.push_client(lead);

    let feed = feed_with(store.clone(), 10, 1);
    let key = FeedKey::new(vec![unit_id], None, false);
    let before = feed.board(key.clone()).await.unwrap();
    assert_eq!(before.columns[4].clients.len(), 1);

    let reasons = [Uuid::new_v4(), Uuid::new_v4()];
    let records = store
        .register_loss(lead_id, &reasons, Some("mudou de cidade"))
        .await
        .unwrap();

    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.previous_status == "negotiation"));
    assert!(records.iter().all(|r| r.total_reasons_at_loss == 2));

    // Perdido: fora de todas as colunas após a invalidação
    feed.invalidate_current().await;
    let after = feed.view(key).await;
    let total: usize = after.columns.iter().map(|c| c.clients.len()).sum();
    assert_eq!(total, 0);
}

// --- REALTIME ---

fn change(kind: ChangeKind) -> ChangeEvent {
    ChangeEvent {
        table: StoreTable::Activities,
        kind,
        row_id: Some(Uuid::new_v4()),
        client_id: Some(Uuid::new_v4()),
    }
}

#[tokio::test(start_paused = true)]
async fn dez_eventos_na_janela_geram_uma_rebusca() {
    let unit_id = Uuid::new_v4();
    let store = Arc::new(MemStore::default());
    store.push_client(client(unit_id, "new-registration", "Instagram", "2025-03-01"));

    let feed = Arc::new(feed_with(store.clone(), 10, 1));
    let activities = Arc::new(ActivityCache::new(store.clone() as Arc<dyn FunnelStore>));
    let hub = ChangeHub::new(64);

    let bridge = SyncBridge::new(
        hub.clone(),
        feed.clone(),
        activities.clone(),
        Duration::from_secs(1),
    );
    tokio::spawn(bridge.run());
    tokio::task::yield_now().await;

    // O quadro aberto define a chave corrente
    feed.board(FeedKey::new(vec![unit_id], None, false)).await.unwrap();
    let base = store.board_fetches.load(Ordering::SeqCst);

    // Rajada: dez mudanças dentro da mesma janela de debounce
    for _ in 0..10 {
        hub.publish(change(ChangeKind::Update));
    }

    // Deixa o debounce vencer e a rebusca acontecer
    tokio::time::sleep(Duration::from_secs(3)).await;

    assert_eq!(
        store.board_fetches.load(Ordering::SeqCst),
        base + 1,
        "dez eventos coalescem em exatamente UMA rebusca"
    );

    // Uma segunda rajada gera a segunda rebusca (a ponte continua assinada)
    for _ in 0..3 {
        hub.publish(change(ChangeKind::Insert));
    }
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(store.board_fetches.load(Ordering::SeqCst), base + 2);
}

#[tokio::test(start_paused = true)]
async fn realtime_invalida_a_lista_de_atividades_aberta() {
    let unit_id = Uuid::new_v4();
    let store = Arc::new(MemStore::default());
    let lead = client(unit_id, "contact-attempt", "Instagram", "2025-03-01");
    let lead_id = lead.id;
    store.push_client(lead);
    store.push_activity(activity(lead_id, "contact-attempt", "2025-03-02", None));

    let feed = Arc::new(feed_with(store.clone(), 10, 1));
    let activities = Arc::new(ActivityCache::new(store.clone() as Arc<dyn FunnelStore>));
    let hub = ChangeHub::new(64);

    let bridge = SyncBridge::new(
        hub.clone(),
        feed.clone(),
        activities.clone(),
        Duration::from_secs(1),
    );
    tokio::spawn(bridge.run());
    tokio::task::yield_now().await;

    // Abre a visão de detalhe: 1 atividade em cache
    assert_eq!(activities.view(lead_id).await.unwrap().len(), 1);

    // Chega uma atividade nova por fora e o evento correspondente
    store.push_activity(activity(lead_id, "scheduling", "2025-03-03", Some("2025-03-08")));
    hub.publish(ChangeEvent {
        table: StoreTable::Activities,
        kind: ChangeKind::Insert,
        row_id: None,
        client_id: Some(lead_id),
    });
    tokio::time::sleep(Duration::from_secs(3)).await;

    // A visão aberta foi rebuscada e enxerga a atividade nova
    assert_eq!(activities.view(lead_id).await.unwrap().len(), 2);
}
