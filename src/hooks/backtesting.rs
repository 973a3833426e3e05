use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use super::Resource;
use crate::backend::{HybridClient, Operation};
use crate::decode;
use crate::error::FetchError;
use crate::models::{
    BacktestPeriod, BacktestingResult, BenchmarkMetrics, CountryCode, PortfolioMetrics,
};

pub struct BacktestingResource {
    pub country: Option<CountryCode>,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl BacktestingResource {
    pub fn new(country: Option<CountryCode>, start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            country,
            start,
            end,
        }
    }

    fn query(&self) -> Vec<(String, String)> {
        let mut query = Vec::with_capacity(3);
        if let Some(code) = self.country {
            query.push(("country".to_string(), code.as_str().to_string()));
        }
        query.push(("startDate".to_string(), self.start.format("%Y-%m-%d").to_string()));
        query.push(("endDate".to_string(), self.end.format("%Y-%m-%d").to_string()));
        query
    }
}

#[async_trait]
impl Resource for BacktestingResource {
    type Output = BacktestingResult;

    fn name(&self) -> &'static str {
        "backtesting"
    }

    async fn remote(&self, client: &HybridClient) -> Result<BacktestingResult, FetchError> {
        if self.start > self.end {
            return Err(FetchError::validation(format!(
                "start date {} is after end date {}",
                self.start, self.end
            )));
        }
        let body = client.call(Operation::Backtesting, &self.query()).await?;
        decode::backtesting(body)
    }

    fn fallback(&self, _now: DateTime<Utc>) -> Option<BacktestingResult> {
        fallback_backtesting()
    }
}

/// Last published five-year comparison, 2020 through 2024.
fn fallback_backtesting() -> Option<BacktestingResult> {
    let portfolio = PortfolioMetrics {
        annualized_return: 1.13,
        sharpe_ratio: -0.17,
        max_drawdown: 7.12,
        win_rate: 48.33,
    };
    let benchmark = BenchmarkMetrics {
        annualized_return: 1.61,
        sharpe_ratio: 0.83,
        max_drawdown: 11.2,
    };
    Some(BacktestingResult {
        period: BacktestPeriod {
            start: NaiveDate::from_ymd_opt(2020, 1, 1)?,
            end: NaiveDate::from_ymd_opt(2024, 12, 31)?,
            total_months: 60,
        },
        outperformance: portfolio.annualized_return - benchmark.annualized_return,
        portfolio_metrics: portfolio,
        benchmark_metrics: benchmark,
        monthly_series: Vec::new(),
    })
}
