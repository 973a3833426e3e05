use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::info;

use crate::backend::HybridClient;
use crate::models::BackendHealth;
use crate::scheduler::Poller;

/// Periodic health check of both backends.
///
/// Runs on its own timer and never feeds the data hooks: a host reported
/// down is still tried by every call.
pub struct HealthMonitor {
    client: Arc<HybridClient>,
    state: Arc<watch::Sender<Option<BackendHealth>>>,
    poller: Option<Poller>,
}

impl HealthMonitor {
    pub fn new(client: Arc<HybridClient>) -> Self {
        let (state, _) = watch::channel(None);
        Self {
            client,
            state: Arc::new(state),
            poller: None,
        }
    }

    pub fn start(&mut self, interval: Duration) {
        let client = self.client.clone();
        let state = self.state.clone();
        self.poller = Some(Poller::spawn("backend-health", interval, move || {
            let client = client.clone();
            let state = state.clone();
            async move {
                let health = client.health_check().await;
                info!(nodejs = health.nodejs, python = health.python, "backend health");
                state.send_replace(Some(health));
            }
        }));
    }

    pub async fn check_now(&self) -> BackendHealth {
        let health = self.client.health_check().await;
        self.state.send_replace(Some(health));
        health
    }

    pub fn latest(&self) -> Option<BackendHealth> {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<BackendHealth>> {
        self.state.subscribe()
    }

    pub fn stop(&mut self) {
        if let Some(poller) = self.poller.take() {
            poller.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{client_for, ScriptedFetcher, NODE, PYTHON};
    use serde_json::json;

    #[tokio::test(start_paused = true)]
    async fn checks_on_start_and_every_interval() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.respond(&format!("{PYTHON}/getSystemHealth"), Ok(json!({"ok": true})));
        let mut monitor = HealthMonitor::new(client_for(fetcher.clone()));
        assert!(monitor.latest().is_none());

        monitor.start(Duration::from_secs(30));
        tokio::time::sleep(Duration::from_millis(1)).await;
        let health = monitor.latest().unwrap();
        assert!(!health.nodejs);
        assert!(health.python);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(fetcher.urls().len(), 4);

        monitor.stop();
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(fetcher.urls().len(), 4);
    }

    #[tokio::test]
    async fn check_now_publishes_to_subscribers() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.respond(&format!("{NODE}/getHealth"), Ok(json!({})));
        let monitor = HealthMonitor::new(client_for(fetcher));
        let mut rx = monitor.subscribe();

        let health = monitor.check_now().await;
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().as_ref(), Some(&health));
        assert!(health.nodejs);
    }
}
