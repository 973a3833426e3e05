use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{Resource, Scope};
use crate::backend::{HybridClient, Operation};
use crate::countries::{self, DEFAULT_COUNTRY};
use crate::decode;
use crate::error::FetchError;
use crate::models::{RegimeKind, SectorAllocationRecord};

pub struct AllocationsResource {
    pub scope: Scope,
    pub regime: Option<RegimeKind>,
}

impl AllocationsResource {
    pub fn new(scope: Scope) -> Self {
        Self {
            scope,
            regime: None,
        }
    }

    pub fn for_regime(mut self, regime: RegimeKind) -> Self {
        self.regime = Some(regime);
        self
    }

    fn query(&self) -> Vec<(String, String)> {
        let mut query = self.scope.query();
        if let Some(regime) = self.regime {
            query.push(("regime".to_string(), regime.as_str().to_string()));
        }
        query
    }
}

#[async_trait]
impl Resource for AllocationsResource {
    type Output = Vec<SectorAllocationRecord>;

    fn name(&self) -> &'static str {
        "allocations"
    }

    fn local(&self, now: DateTime<Utc>) -> Option<Self::Output> {
        self.scope
            .static_country()
            .map(|code| countries::allocation_records(code, now))
    }

    async fn remote(&self, client: &HybridClient) -> Result<Self::Output, FetchError> {
        let body = client.call(Operation::Allocations, &self.query()).await?;
        decode::allocations(body, Utc::now())
    }

    fn fallback(&self, now: DateTime<Utc>) -> Option<Self::Output> {
        Some(countries::allocation_records(DEFAULT_COUNTRY, now))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AllocationSummary {
    pub total_allocation: f64,
    pub average_performance: f64,
    pub average_risk_score: f64,
}

/// Plain sum and means; the total is reported as-is, not normalised.
pub fn summarize(records: &[SectorAllocationRecord]) -> AllocationSummary {
    if records.is_empty() {
        return AllocationSummary::default();
    }
    let count = records.len() as f64;
    AllocationSummary {
        total_allocation: records.iter().map(|r| r.allocation).sum(),
        average_performance: records.iter().map(|r| r.performance).sum::<f64>() / count,
        average_risk_score: records.iter().map(|r| r.risk_score).sum::<f64>() / count,
    }
}
