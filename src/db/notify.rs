// src/db/notify.rs
//
// Canal de notificação de mudanças. Os gatilhos do Postgres publicam um JSON
// em 'funil_changes' via pg_notify; o forwarder repassa para um canal
// broadcast em processo, que o RealtimeSyncBridge consome. Mutações feitas
// pelo próprio processo também publicam direto no hub (o coalescimento do
// bridge absorve o eco do gatilho).

use serde::{Deserialize, Serialize};
use sqlx::{PgPool, postgres::PgListener};
use std::time::Duration;
use tokio::sync::broadcast;
use uuid::Uuid;

pub const CHANGE_CHANNEL: &str = "funil_changes";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreTable {
    Clients,
    Activities,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub table: StoreTable,
    pub kind: ChangeKind,
    pub row_id: Option<Uuid>,
    // Para mudanças em activities: o cliente dono, para invalidar a lista aberta
    pub client_id: Option<Uuid>,
}

// Hub de eventos de mudança. Receivers lentos podem sofrer Lagged; para o
// consumidor isso significa apenas "algo mudou", o que já basta.
#[derive(Clone)]
pub struct ChangeHub {
    tx: broadcast::Sender<ChangeEvent>,
}

impl ChangeHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.tx.subscribe()
    }

    // Publicar sem assinantes não é erro
    pub fn publish(&self, event: ChangeEvent) {
        let _ = self.tx.send(event);
    }
}

// Escuta o canal do Postgres e repassa para o hub. Queda de conexão gera
// reconexão com backoff; nunca vira erro para o usuário final.
pub fn spawn_pg_forwarder(pool: PgPool, hub: ChangeHub) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut backoff = Duration::from_secs(1);

        loop {
            match PgListener::connect_with(&pool).await {
                Ok(mut listener) => match listener.listen(CHANGE_CHANNEL).await {
                    Ok(()) => {
                        tracing::info!("Escutando notificações em '{}'", CHANGE_CHANNEL);
                        backoff = Duration::from_secs(1);

                        loop {
                            match listener.recv().await {
                                Ok(notification) => {
                                    match serde_json::from_str::<ChangeEvent>(
                                        notification.payload(),
                                    ) {
                                        Ok(event) => hub.publish(event),
                                        Err(e) => {
                                            // Payload quebrado: descarta e segue
                                            tracing::warn!(
                                                "Payload de notificação inválido ({}): {}",
                                                e,
                                                notification.payload()
                                            );
                                        }
                                    }
                                }
                                Err(e) => {
                                    tracing::warn!("Conexão LISTEN caiu: {}. Reconectando...", e);
                                    break;
                                }
                            }
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Falha ao executar LISTEN: {}", e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Falha ao conectar o listener: {}", e);
                }
            }

            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(Duration::from_secs(30));
        }
    })
}
