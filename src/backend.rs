//! Routing between the Node and Python backends.
//!
//! Every data call tries the preferred host first and the other host
//! second. The health check is advisory only: it never gates a call.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tracing::{info, warn};

use crate::error::FetchError;
use crate::http::{ApiRequest, Fetcher, RetryPolicy};
use crate::models::BackendHealth;
use crate::settings::Settings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    Node,
    Python,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Node => "node",
            Backend::Python => "python",
        }
    }
}

/// The primary backend is Node; the secondary is Python.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendPreference {
    PreferPrimary,
    PreferSecondary,
}

pub fn host_order(preference: BackendPreference) -> [Backend; 2] {
    match preference {
        BackendPreference::PreferPrimary => [Backend::Node, Backend::Python],
        BackendPreference::PreferSecondary => [Backend::Python, Backend::Node],
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Countries,
    Regime,
    Allocations,
    Backtesting,
    MarketStress,
    MarketData,
    IndicatorsBreakdown,
    MultiRegime,
    Health,
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Countries => "getCountries",
            Operation::Regime => "getRegime",
            Operation::Allocations => "getAllocations",
            Operation::Backtesting => "getBacktesting",
            Operation::MarketStress => "getMarketStress",
            Operation::MarketData => "getMarketData",
            Operation::IndicatorsBreakdown => "getIndicatorsBreakdown",
            Operation::MultiRegime => "getMultiRegime",
            Operation::Health => "getHealth",
        }
    }

    /// Relative path of the operation on `backend`, if that host serves it.
    pub fn path(&self, backend: Backend) -> Option<&'static str> {
        match (backend, self) {
            (Backend::Node, Operation::Countries) => Some("/getCountries"),
            (Backend::Node, Operation::Regime) => Some("/getRegime"),
            (Backend::Node, Operation::Allocations) => Some("/getAllocations"),
            (Backend::Node, Operation::Backtesting) => Some("/getBacktesting"),
            (Backend::Node, Operation::MarketStress) => Some("/getMarketStress"),
            (Backend::Node, Operation::MarketData) => Some("/getMarketData"),
            (Backend::Node, Operation::Health) => Some("/getHealth"),
            (Backend::Python, Operation::Regime) => Some("/getRegimePython"),
            (Backend::Python, Operation::Allocations) => Some("/getAllocationsPython"),
            (Backend::Python, Operation::IndicatorsBreakdown) => Some("/getIndicatorsBreakdown"),
            (Backend::Python, Operation::MultiRegime) => Some("/getMultiRegime"),
            (Backend::Python, Operation::Health) => Some("/getSystemHealth"),
            _ => None,
        }
    }

    /// AI-backed capabilities live on the Python host.
    pub fn preference(&self) -> BackendPreference {
        match self {
            Operation::Regime
            | Operation::Allocations
            | Operation::IndicatorsBreakdown
            | Operation::MultiRegime
            | Operation::Health => BackendPreference::PreferSecondary,
            Operation::Countries
            | Operation::Backtesting
            | Operation::MarketStress
            | Operation::MarketData => BackendPreference::PreferPrimary,
        }
    }
}

pub struct HybridClient {
    fetcher: Arc<dyn Fetcher>,
    node_url: String,
    python_url: String,
    timeout: Duration,
    retry: RetryPolicy,
}

impl HybridClient {
    pub fn new(fetcher: Arc<dyn Fetcher>, settings: &Settings) -> Self {
        Self {
            fetcher,
            node_url: settings.node_url.clone(),
            python_url: settings.python_url.clone(),
            timeout: settings.timeout,
            retry: RetryPolicy {
                max_attempts: settings.retry_attempts,
                delay: settings.retry_delay,
            },
        }
    }

    pub fn base_url(&self, backend: Backend) -> &str {
        match backend {
            Backend::Node => &self.node_url,
            Backend::Python => &self.python_url,
        }
    }

    pub async fn call(
        &self,
        operation: Operation,
        query: &[(String, String)],
    ) -> Result<Value, FetchError> {
        self.call_with(operation, operation.preference(), query).await
    }

    pub async fn call_with(
        &self,
        operation: Operation,
        preference: BackendPreference,
        query: &[(String, String)],
    ) -> Result<Value, FetchError> {
        self.route(operation, preference, query, None).await
    }

    /// Routes like [`call`](Self::call) but sends `body` as a JSON POST.
    pub async fn post(
        &self,
        operation: Operation,
        query: &[(String, String)],
        body: Value,
    ) -> Result<Value, FetchError> {
        self.route(operation, operation.preference(), query, Some(body))
            .await
    }

    async fn route(
        &self,
        operation: Operation,
        preference: BackendPreference,
        query: &[(String, String)],
        body: Option<Value>,
    ) -> Result<Value, FetchError> {
        let mut last = None;
        for backend in host_order(preference) {
            let Some(path) = operation.path(backend) else {
                continue;
            };
            let url = format!("{}{}", self.base_url(backend), path);
            let request = match &body {
                Some(body) => ApiRequest::post(url, body.clone(), self.timeout),
                None => ApiRequest::get(url, self.timeout),
            }
            .with_query(query);
            let label = format!("{}:{}", backend.as_str(), operation.name());

            match self
                .retry
                .run(&label, |_| self.fetcher.fetch(&request))
                .await
            {
                Ok(value) => {
                    info!(operation = operation.name(), backend = backend.as_str(), "served");
                    return Ok(value);
                }
                Err(err) => {
                    warn!(
                        operation = operation.name(),
                        backend = backend.as_str(),
                        error = %err,
                        "backend failed"
                    );
                    last = Some(Box::new(err));
                }
            }
        }

        Err(FetchError::AllBackendsFailed {
            operation: operation.name().to_string(),
            last,
        })
    }

    /// Checks both hosts once each. A host is up when it answers with a
    /// success status, whatever the body.
    pub async fn health_check(&self) -> BackendHealth {
        let (nodejs, python) = tokio::join!(
            self.check_host(Backend::Node),
            self.check_host(Backend::Python)
        );
        BackendHealth {
            nodejs,
            python,
            timestamp: Utc::now(),
        }
    }

    async fn check_host(&self, backend: Backend) -> bool {
        let Some(path) = Operation::Health.path(backend) else {
            return false;
        };
        let request = ApiRequest::get(format!("{}{}", self.base_url(backend), path), self.timeout);
        match self.fetcher.fetch(&request).await {
            Ok(_) | Err(FetchError::Parse(_)) => true,
            Err(err) => {
                warn!(backend = backend.as_str(), error = %err, "health check failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Method;
    use crate::testing::{ScriptedFetcher, NODE, PYTHON};
    use serde_json::json;

    fn client(fetcher: Arc<ScriptedFetcher>) -> HybridClient {
        let settings = Settings {
            node_url: NODE.to_string(),
            python_url: PYTHON.to_string(),
            retry_attempts: 2,
            retry_delay: Duration::from_millis(10),
            ..Settings::default()
        };
        HybridClient::new(fetcher, &settings)
    }

    #[test]
    fn preference_maps_to_host_order() {
        assert_eq!(
            host_order(BackendPreference::PreferPrimary),
            [Backend::Node, Backend::Python]
        );
        assert_eq!(
            host_order(BackendPreference::PreferSecondary),
            [Backend::Python, Backend::Node]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn node_is_tried_first_and_python_answers_on_failure() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.respond(
            &format!("{NODE}/getRegime"),
            Err(FetchError::HttpStatus(500)),
        );
        fetcher.respond(
            &format!("{PYTHON}/getRegimePython"),
            Ok(json!({"from": "python"})),
        );
        let client = client(fetcher.clone());

        let value = client
            .call_with(Operation::Regime, BackendPreference::PreferPrimary, &[])
            .await
            .unwrap();

        assert_eq!(value["from"], "python");
        let urls = fetcher.urls();
        assert_eq!(
            urls,
            vec![
                format!("{NODE}/getRegime"),
                format!("{NODE}/getRegime"),
                format!("{PYTHON}/getRegimePython"),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn preferred_host_success_skips_the_other() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.respond(
            &format!("{PYTHON}/getAllocationsPython"),
            Ok(json!({"allocations": []})),
        );
        let client = client(fetcher.clone());

        client.call(Operation::Allocations, &[]).await.unwrap();
        assert_eq!(fetcher.urls(), vec![format!("{PYTHON}/getAllocationsPython")]);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausting_both_hosts_names_the_operation() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        let client = client(fetcher.clone());

        let err = client
            .call(Operation::Countries, &[])
            .await
            .unwrap_err();
        // getCountries only exists on the Node host
        assert_eq!(
            err,
            FetchError::AllBackendsFailed {
                operation: "getCountries".to_string(),
                last: Some(Box::new(FetchError::Network(
                    "connection refused".to_string()
                ))),
            }
        );
        assert_eq!(fetcher.urls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn query_parameters_are_forwarded() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.respond(&format!("{NODE}/getMarketStress"), Ok(json!({})));
        let client = client(fetcher.clone());

        let query = vec![("country".to_string(), "USA".to_string())];
        client.call(Operation::MarketStress, &query).await.unwrap();
        assert_eq!(fetcher.requests()[0].query, query);
    }

    #[tokio::test(start_paused = true)]
    async fn post_carries_the_body_to_each_host() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.respond(&format!("{NODE}/getRegime"), Ok(json!({"regime": "EXPANSION"})));
        let client = client(fetcher.clone());

        let body = json!({"countries": ["FRA", "DEU"]});
        client
            .post(Operation::Regime, &[], body.clone())
            .await
            .unwrap();

        let requests = fetcher.requests();
        // Python fails twice, then Node answers
        assert_eq!(requests.len(), 3);
        assert!(requests.iter().all(|r| r.method == Method::Post));
        assert!(requests.iter().all(|r| r.body.as_ref() == Some(&body)));
        assert_eq!(requests[2].url, format!("{NODE}/getRegime"));
    }

    #[tokio::test]
    async fn health_check_reports_each_host() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.respond(&format!("{NODE}/getHealth"), Ok(json!({"status": "ok"})));
        fetcher.respond(
            &format!("{PYTHON}/getSystemHealth"),
            Err(FetchError::Network("unreachable".to_string())),
        );
        let client = client(fetcher.clone());

        let health = client.health_check().await;
        assert!(health.nodejs);
        assert!(!health.python);
        // one request per host, no retries
        assert_eq!(fetcher.urls().len(), 2);
    }
}
