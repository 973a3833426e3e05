use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use super::{Resource, Scope};
use crate::backend::{HybridClient, Operation};
use crate::countries::{self, DEFAULT_COUNTRY};
use crate::decode;
use crate::error::FetchError;
use crate::models::RegimeRecord;

/// Data older than this is flagged as stale.
pub const STALE_AFTER_MINUTES: i64 = 30;

pub struct RegimeResource {
    pub scope: Scope,
}

impl RegimeResource {
    pub fn new(scope: Scope) -> Self {
        Self { scope }
    }
}

#[async_trait]
impl Resource for RegimeResource {
    type Output = RegimeRecord;

    fn name(&self) -> &'static str {
        "regime"
    }

    fn local(&self, now: DateTime<Utc>) -> Option<RegimeRecord> {
        self.scope
            .static_country()
            .map(|code| countries::regime_record(code, now))
    }

    async fn remote(&self, client: &HybridClient) -> Result<RegimeRecord, FetchError> {
        let body = client.call(Operation::Regime, &self.scope.query()).await?;
        decode::regime(body, Utc::now())
    }

    fn fallback(&self, now: DateTime<Utc>) -> Option<RegimeRecord> {
        Some(countries::regime_record(DEFAULT_COUNTRY, now))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Freshness {
    pub is_healthy: bool,
    pub last_update_age_minutes: i64,
}

pub fn freshness(record: &RegimeRecord, now: DateTime<Utc>) -> Freshness {
    let age = now - record.last_updated;
    Freshness {
        is_healthy: age < Duration::minutes(STALE_AFTER_MINUTES),
        last_update_age_minutes: age.num_minutes().max(0),
    }
}
