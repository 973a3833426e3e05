use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{Resource, Scope};
use crate::backend::{HybridClient, Operation};
use crate::countries::{self, DEFAULT_COUNTRY};
use crate::decode;
use crate::error::FetchError;
use crate::models::{EtfQuote, MarketStress};

/// Stress score published by the backend when its inputs are unavailable.
const NEUTRAL_STRESS_LEVEL: f64 = 25.0;

pub struct MarketStressResource {
    pub scope: Scope,
}

#[async_trait]
impl Resource for MarketStressResource {
    type Output = MarketStress;

    fn name(&self) -> &'static str {
        "market-stress"
    }

    async fn remote(&self, client: &HybridClient) -> Result<MarketStress, FetchError> {
        let body = client.call(Operation::MarketStress, &self.scope.query()).await?;
        decode::market_stress(body)
    }

    fn fallback(&self, _now: DateTime<Utc>) -> Option<MarketStress> {
        let indicators = countries::indicators(DEFAULT_COUNTRY);
        let mut other_metrics = BTreeMap::new();
        other_metrics.insert("sovereign_spread_bps".to_string(), indicators.spreads.value);
        other_metrics.insert("pmi".to_string(), indicators.pmi.value);
        Some(MarketStress {
            stress_level: NEUTRAL_STRESS_LEVEL,
            vix: Some(indicators.vix.value),
            high_yield_spread: None,
            other_metrics,
            sources: vec![
                indicators.vix.source.to_string(),
                indicators.pmi.source.to_string(),
            ],
        })
    }
}

pub struct MarketDataResource {
    pub scope: Scope,
}

#[async_trait]
impl Resource for MarketDataResource {
    type Output = Vec<EtfQuote>;

    fn name(&self) -> &'static str {
        "market-data"
    }

    async fn remote(&self, client: &HybridClient) -> Result<Vec<EtfQuote>, FetchError> {
        let body = client.call(Operation::MarketData, &self.scope.query()).await?;
        decode::market_data(body)
    }

    /// No quote is better than a stale one.
    fn fallback(&self, _now: DateTime<Utc>) -> Option<Vec<EtfQuote>> {
        Some(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::{DataHook, Origin};
    use crate::models::CountryCode;
    use crate::testing::{client_for, ScriptedFetcher, NODE};
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn stress_is_fetched_for_the_selected_country() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.respond(
            &format!("{NODE}/getMarketStress"),
            Ok(json!({"stressLevel": 61, "metrics": {"vix": 27.5}, "sources": ["FRED"]})),
        );
        let hook = DataHook::new(
            MarketStressResource {
                scope: Scope::country(CountryCode::Gbr),
            },
            client_for(fetcher.clone()),
        );
        hook.refetch().await;

        let state = hook.state();
        assert_eq!(state.origin, Some(Origin::Remote));
        assert_eq!(state.data.unwrap().stress_level, 61.0);
        assert_eq!(
            fetcher.requests()[0].query,
            vec![("country".to_string(), "GBR".to_string())]
        );
    }

    #[tokio::test]
    async fn stress_fallback_uses_reference_indicators() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        let hook = DataHook::new(
            MarketStressResource {
                scope: Scope::default(),
            },
            client_for(fetcher),
        );
        hook.refetch().await;

        let state = hook.state();
        assert!(state.is_fallback());
        let stress = state.data.unwrap();
        assert_eq!(stress.stress_level, 25.0);
        assert_eq!(stress.vix, Some(18.5));
    }

    #[tokio::test]
    async fn market_data_failure_leaves_an_empty_list() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.respond(&format!("{NODE}/getMarketData"), Err(FetchError::HttpStatus(404)));
        let hook = DataHook::new(
            MarketDataResource {
                scope: Scope::country(CountryCode::Fra),
            },
            client_for(fetcher),
        );
        hook.refetch().await;

        let state = hook.state();
        assert_eq!(state.data, Some(Vec::new()));
        assert!(state.error.is_some());
    }
}
