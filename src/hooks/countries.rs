use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::Resource;
use crate::backend::{HybridClient, Operation};
use crate::countries;
use crate::decode;
use crate::error::FetchError;
use crate::models::CountrySummary;

/// Country list shown by the selector. No static tier: the list is always
/// asked of the backend, the reference table only backs the fallback.
#[derive(Default)]
pub struct CountriesResource;

#[async_trait]
impl Resource for CountriesResource {
    type Output = Vec<CountrySummary>;

    fn name(&self) -> &'static str {
        "countries"
    }

    async fn remote(&self, client: &HybridClient) -> Result<Self::Output, FetchError> {
        let body = client.call(Operation::Countries, &[]).await?;
        decode::countries(body)
    }

    fn fallback(&self, _now: DateTime<Utc>) -> Option<Self::Output> {
        Some(countries::country_summaries())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::DataHook;
    use crate::testing::{client_for, ScriptedFetcher, NODE};
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn non_array_payload_falls_back_to_reference_list() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.respond(&format!("{NODE}/getCountries"), Ok(json!({"error": "quota"})));
        let hook = DataHook::new(CountriesResource, client_for(fetcher));
        hook.refetch().await;

        let state = hook.state();
        assert!(state.is_fallback());
        let codes: Vec<String> = state.data.unwrap().into_iter().map(|c| c.code).collect();
        assert_eq!(codes, vec!["FRA", "DEU", "USA", "GBR"]);
    }
}
