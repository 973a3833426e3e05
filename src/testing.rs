//! Scripted fetcher used by router and hook tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::backend::HybridClient;
use crate::error::FetchError;
use crate::http::{ApiRequest, Fetcher};
use crate::settings::Settings;

pub const NODE: &str = "http://node.test";
pub const PYTHON: &str = "http://python.test";

#[derive(Default)]
pub struct ScriptedFetcher {
    responses: Mutex<HashMap<String, Result<Value, FetchError>>>,
    calls: Mutex<Vec<ApiRequest>>,
    delay: Option<Duration>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    /// Unscripted URLs answer with a network failure.
    pub fn respond(&self, url: &str, result: Result<Value, FetchError>) {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), result);
    }

    pub fn urls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.url.clone())
            .collect()
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, request: &ApiRequest) -> Result<Value, FetchError> {
        self.calls.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.responses
            .lock()
            .unwrap()
            .get(&request.url)
            .cloned()
            .unwrap_or_else(|| Err(FetchError::Network("connection refused".to_string())))
    }
}

/// Router over the scripted hosts with a single attempt per host.
pub fn client_for(fetcher: Arc<ScriptedFetcher>) -> Arc<HybridClient> {
    let settings = Settings {
        node_url: NODE.to_string(),
        python_url: PYTHON.to_string(),
        retry_attempts: 1,
        ..Settings::default()
    };
    Arc::new(HybridClient::new(fetcher, &settings))
}
