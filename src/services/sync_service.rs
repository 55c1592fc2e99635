// src/services/sync_service.rs
//
// A ponte de realtime: UMA assinatura de longa duração no hub de mudanças
// (nunca reassina a cada troca de filtro) que invalida o feed corrente e a
// lista de atividades aberta. Rajadas de eventos são coalescidas numa janela
// de debounce: dez mudanças em um segundo viram UMA rebusca.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, broadcast};
use tokio::time::Instant;

use crate::{
    db::notify::{ChangeEvent, ChangeHub, StoreTable},
    services::board_service::{ActivityCache, FeedManager},
};

pub struct SyncBridge {
    hub: ChangeHub,
    feed: Arc<FeedManager>,
    activities: Arc<ActivityCache>,
    debounce: Duration,
}

impl SyncBridge {
    pub fn new(
        hub: ChangeHub,
        feed: Arc<FeedManager>,
        activities: Arc<ActivityCache>,
        debounce: Duration,
    ) -> Self {
        Self {
            hub,
            feed,
            activities,
            debounce,
        }
    }

    // Ciclo: Assinado -> (evento) -> coalescendo -> invalidando/rebuscando ->
    // Assinado. Encerra quando o hub é derrubado junto com a sessão.
    pub async fn run(self) {
        let mut rx = self.hub.subscribe();
        tracing::info!("Ponte de realtime assinada");

        loop {
            match rx.recv().await {
                Ok(event) if is_relevant(&event) => {
                    self.absorb_burst(&mut rx).await;
                    self.invalidate().await;
                }
                Ok(_) => {}
                // Receiver atrasado: eventos se perderam, mas "algo mudou"
                // é tudo que precisamos saber
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Receiver atrasado ({} eventos pulados); rebuscando", skipped);
                    self.absorb_burst(&mut rx).await;
                    self.invalidate().await;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Hub de mudanças encerrado; ponte desligando");
                    return;
                }
            }
        }
    }

    // Janela de debounce: segura a rebusca e engole os eventos que chegarem
    // até o prazo, para uma atualização em massa não virar N idas à rede.
    async fn absorb_burst(&self, rx: &mut broadcast::Receiver<ChangeEvent>) {
        let deadline = tokio::time::sleep(self.debounce);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = &mut deadline => break,
                more = rx.recv() => match more {
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    async fn invalidate(&self) {
        // A chave corrente é lida AGORA, dentro do manager, não capturada
        // na hora da assinatura
        self.feed.invalidate_current().await;
        self.activities.invalidate_open().await;
    }
}

fn is_relevant(event: &ChangeEvent) -> bool {
    matches!(event.table, StoreTable::Clients | StoreTable::Activities)
}

// --- TRAVA DE SUBMISSÃO ---

// Suprime a MESMA ação mutadora disparada duas vezes seguidas (clique duplo,
// reenvio nervoso). A trava segura enquanto a primeira está em voo e ainda
// por um período de resfriamento após concluir; a segunda tentativa é
// descartada em silêncio, sem erro para o usuário. Componente com dono e
// ciclo de vida (vive no AppState), não um mapa global de módulo.
enum GuardState {
    InFlight,
    CoolingUntil(Instant),
}

pub struct SubmissionGuard {
    cooldown: Duration,
    entries: Mutex<HashMap<String, GuardState>>,
}

impl SubmissionGuard {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            entries: Mutex::new(HashMap::new()),
        }
    }

    // true = pode seguir; false = idêntica em andamento ou esfriando.
    pub async fn try_begin(&self, key: &str) -> bool {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();

        // Limpa resfriamentos vencidos de passagem
        entries.retain(|_, state| match state {
            GuardState::InFlight => true,
            GuardState::CoolingUntil(until) => *until > now,
        });

        if entries.contains_key(key) {
            return false;
        }

        entries.insert(key.to_string(), GuardState::InFlight);
        true
    }

    // Conclusão com sucesso: inicia o resfriamento em vez de soltar na hora,
    // para absorver o clique duplicado que chega logo depois da resposta.
    pub async fn finish(&self, key: &str) {
        let mut entries = self.entries.lock().await;
        entries.insert(
            key.to_string(),
            GuardState::CoolingUntil(Instant::now() + self.cooldown),
        );
    }

    // Falha: solta imediatamente para o usuário poder tentar de novo.
    pub async fn abort(&self, key: &str) {
        self.entries.lock().await.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn segunda_identica_e_descartada_em_voo() {
        let guard = SubmissionGuard::new(Duration::from_secs(3));

        assert!(guard.try_begin("attendance:abc").await);
        assert!(!guard.try_begin("attendance:abc").await);
        // Chave diferente não é afetada
        assert!(guard.try_begin("attendance:xyz").await);
    }

    #[tokio::test(start_paused = true)]
    async fn resfriamento_segura_apos_concluir() {
        let guard = SubmissionGuard::new(Duration::from_secs(3));

        assert!(guard.try_begin("k").await);
        guard.finish("k").await;

        // Logo após concluir: ainda travado
        assert!(!guard.try_begin("k").await);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(!guard.try_begin("k").await);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(guard.try_begin("k").await);
    }

    #[tokio::test(start_paused = true)]
    async fn falha_solta_na_hora() {
        let guard = SubmissionGuard::new(Duration::from_secs(3));

        assert!(guard.try_begin("k").await);
        guard.abort("k").await;
        assert!(guard.try_begin("k").await);
    }
}
