//! Payload decoders, one per endpoint.
//!
//! Each decoder turns a raw JSON body into a domain record or rejects it
//! with [`FetchError::Validation`]. Nothing malformed reaches hook state.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::countries::DEFAULT_COUNTRY;
use crate::error::FetchError;
use crate::models::{
    AssetAllocations, BacktestPeriod, BacktestingResult, BenchmarkMetrics, CountrySummary,
    EtfQuote, MarketStress, MonthlyReturn, PortfolioMetrics, RegimeKind, RegimeRecord, Sector,
    SectorAllocationRecord, Trend,
};

/// Unwraps `{success, data, error}` envelopes used by some functions.
fn unwrap_envelope(value: Value) -> Result<Value, FetchError> {
    let Value::Object(mut map) = value else {
        return Ok(value);
    };
    match map.get("success").and_then(Value::as_bool) {
        Some(false) => {
            let reason = map
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("backend reported failure");
            Err(FetchError::validation(reason))
        }
        Some(true) => Ok(map.remove("data").unwrap_or(Value::Object(map))),
        None => Ok(Value::Object(map)),
    }
}

fn from_value<T: DeserializeOwned>(value: Value, what: &str) -> Result<T, FetchError> {
    serde_json::from_value(value).map_err(|e| FetchError::validation(format!("{what}: {e}")))
}

/// Confidence assumed when a payload omits it.
const DEFAULT_CONFIDENCE: f64 = 85.0;

fn check_percent(value: f64, field: &str) -> Result<f64, FetchError> {
    if value.is_finite() && (0.0..=100.0).contains(&value) {
        Ok(value)
    } else {
        Err(FetchError::validation(format!("Invalid {field} value: {value}")))
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRegime {
    country: Option<String>,
    regime: Option<String>,
    confidence: Option<f64>,
    #[serde(alias = "growth_score")]
    growth_score: Option<f64>,
    #[serde(alias = "inflation_score")]
    inflation_score: Option<f64>,
    #[serde(alias = "unemployment_score")]
    unemployment_score: Option<f64>,
    #[serde(alias = "detected_at")]
    detected_at: Option<DateTime<Utc>>,
    #[serde(alias = "last_updated", alias = "lastUpdated")]
    timestamp: Option<DateTime<Utc>>,
}

pub fn regime(value: Value, now: DateTime<Utc>) -> Result<RegimeRecord, FetchError> {
    let raw: RawRegime = from_value(unwrap_envelope(value)?, "regime payload")?;

    let regime: RegimeKind = raw
        .regime
        .ok_or_else(|| FetchError::validation("Invalid data format: regime field expected"))?
        .parse()
        .map_err(FetchError::Validation)?;
    let confidence = raw.confidence.unwrap_or(DEFAULT_CONFIDENCE);

    Ok(RegimeRecord {
        country: raw
            .country
            .unwrap_or_else(|| DEFAULT_COUNTRY.as_str().to_string()),
        regime,
        confidence: check_percent(confidence, "confidence")?,
        growth_score: raw.growth_score.unwrap_or(0.0),
        inflation_score: raw.inflation_score.unwrap_or(0.0),
        unemployment_score: raw.unemployment_score,
        detected_at: raw.detected_at.unwrap_or(now),
        last_updated: raw.timestamp.unwrap_or(now),
    })
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAllocation {
    sector: String,
    allocation: f64,
    performance: Option<f64>,
    confidence: Option<f64>,
    trend: Option<Trend>,
    #[serde(alias = "risk_score")]
    risk_score: Option<f64>,
}

fn allocation_item(
    item: Value,
    last_updated: DateTime<Utc>,
) -> Result<SectorAllocationRecord, FetchError> {
    let raw: RawAllocation = from_value(item, "allocation")?;
    let sector: Sector = raw.sector.parse().map_err(FetchError::Validation)?;
    Ok(SectorAllocationRecord {
        sector,
        allocation: check_percent(raw.allocation, "allocation")?,
        performance: raw.performance.unwrap_or(0.0),
        confidence: check_percent(raw.confidence.unwrap_or(DEFAULT_CONFIDENCE), "confidence")?,
        trend: raw.trend.unwrap_or(Trend::Stable),
        risk_score: check_percent(raw.risk_score.unwrap_or(50.0), "riskScore")?,
        last_updated,
    })
}

/// Invalid rows are dropped; the payload is rejected only when no row
/// survives. Totals are not required to reach 100.
pub fn allocations(
    value: Value,
    now: DateTime<Utc>,
) -> Result<Vec<SectorAllocationRecord>, FetchError> {
    let mut body = unwrap_envelope(value)?;
    let last_updated = body
        .get("timestamp")
        .cloned()
        .and_then(|t| serde_json::from_value::<DateTime<Utc>>(t).ok())
        .unwrap_or(now);
    let Some(Value::Array(items)) = body.get_mut("allocations").map(Value::take) else {
        return Err(FetchError::validation(
            "Invalid data format: allocations array expected",
        ));
    };

    let mut records = Vec::with_capacity(items.len());
    for item in items {
        match allocation_item(item, last_updated) {
            Ok(record) => records.push(record),
            Err(err) => debug!(error = %err, "dropping allocation row"),
        }
    }

    if records.is_empty() {
        return Err(FetchError::validation("No valid allocations found"));
    }
    Ok(records)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPeriod {
    #[serde(alias = "start_date")]
    start: NaiveDate,
    #[serde(alias = "end_date")]
    end: NaiveDate,
    #[serde(alias = "total_months")]
    total_months: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPortfolioMetrics {
    #[serde(alias = "annualized_return")]
    annualized_return: f64,
    #[serde(alias = "sharpe_ratio")]
    sharpe_ratio: f64,
    #[serde(alias = "max_drawdown")]
    max_drawdown: f64,
    #[serde(alias = "win_rate")]
    win_rate: f64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBenchmarkMetrics {
    #[serde(alias = "annualized_return")]
    annualized_return: f64,
    #[serde(alias = "sharpe_ratio")]
    sharpe_ratio: f64,
    #[serde(alias = "max_drawdown")]
    max_drawdown: f64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMonthly {
    date: NaiveDate,
    #[serde(alias = "portfolio_return", alias = "oracle_return")]
    portfolio_return: f64,
    #[serde(alias = "benchmark_return")]
    benchmark_return: f64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBacktesting {
    period: RawPeriod,
    #[serde(alias = "portfolio_metrics", alias = "oraclePortfolio")]
    portfolio_metrics: RawPortfolioMetrics,
    #[serde(alias = "benchmark_metrics", alias = "benchmark")]
    benchmark_metrics: RawBenchmarkMetrics,
    outperformance: Option<f64>,
    #[serde(default, alias = "monthly_series", alias = "monthlyReturns")]
    monthly_series: Vec<RawMonthly>,
}

pub fn backtesting(value: Value) -> Result<BacktestingResult, FetchError> {
    let raw: RawBacktesting = from_value(unwrap_envelope(value)?, "backtesting payload")?;

    if raw.period.start > raw.period.end {
        return Err(FetchError::validation(format!(
            "backtesting period starts after it ends ({} > {})",
            raw.period.start, raw.period.end
        )));
    }
    let win_rate = check_percent(raw.portfolio_metrics.win_rate, "winRate")?;
    if raw
        .monthly_series
        .windows(2)
        .any(|pair| pair[0].date >= pair[1].date)
    {
        return Err(FetchError::validation(
            "monthly series is not in ascending date order",
        ));
    }

    let outperformance = raw.outperformance.unwrap_or(
        raw.portfolio_metrics.annualized_return - raw.benchmark_metrics.annualized_return,
    );

    Ok(BacktestingResult {
        period: BacktestPeriod {
            start: raw.period.start,
            end: raw.period.end,
            total_months: raw.period.total_months,
        },
        portfolio_metrics: PortfolioMetrics {
            annualized_return: raw.portfolio_metrics.annualized_return,
            sharpe_ratio: raw.portfolio_metrics.sharpe_ratio,
            max_drawdown: raw.portfolio_metrics.max_drawdown,
            win_rate,
        },
        benchmark_metrics: BenchmarkMetrics {
            annualized_return: raw.benchmark_metrics.annualized_return,
            sharpe_ratio: raw.benchmark_metrics.sharpe_ratio,
            max_drawdown: raw.benchmark_metrics.max_drawdown,
        },
        outperformance,
        monthly_series: raw
            .monthly_series
            .into_iter()
            .map(|m| MonthlyReturn {
                date: m.date,
                portfolio_return: m.portfolio_return,
                benchmark_return: m.benchmark_return,
            })
            .collect(),
    })
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawStress {
    #[serde(alias = "stress_level")]
    stress_level: f64,
    #[serde(default)]
    metrics: BTreeMap<String, Value>,
    #[serde(default)]
    sources: Vec<Value>,
}

pub fn market_stress(value: Value) -> Result<MarketStress, FetchError> {
    let raw: RawStress = from_value(unwrap_envelope(value)?, "market stress payload")?;
    let stress_level = check_percent(raw.stress_level, "stressLevel")?;

    let mut vix = None;
    let mut high_yield_spread = None;
    let mut other_metrics = BTreeMap::new();
    for (name, metric) in raw.metrics {
        let Some(number) = metric.as_f64() else {
            continue;
        };
        match name.as_str() {
            "vix" => vix = Some(number),
            "high_yield_spread" | "highYieldSpread" => high_yield_spread = Some(number),
            _ => {
                other_metrics.insert(name, number);
            }
        }
    }

    // sources are either plain names or objects carrying a name
    let sources = raw
        .sources
        .into_iter()
        .filter_map(|source| match source {
            Value::String(name) => Some(name),
            Value::Object(map) => map.get("name").and_then(Value::as_str).map(str::to_string),
            _ => None,
        })
        .collect();

    Ok(MarketStress {
        stress_level,
        vix,
        high_yield_spread,
        other_metrics,
        sources,
    })
}

#[derive(Deserialize)]
struct RawMarketData {
    etfs: Vec<EtfQuote>,
}

pub fn market_data(value: Value) -> Result<Vec<EtfQuote>, FetchError> {
    let raw: RawMarketData = from_value(unwrap_envelope(value)?, "market data payload")?;
    Ok(raw.etfs)
}

#[derive(Deserialize)]
struct RawCountry {
    code: String,
    name: String,
    regime: Option<String>,
    confidence: Option<f64>,
    allocations: Option<AssetAllocations>,
    #[serde(alias = "lastUpdate")]
    last_update: Option<String>,
}

pub fn countries(value: Value) -> Result<Vec<CountrySummary>, FetchError> {
    let body = match unwrap_envelope(value)? {
        Value::Object(mut map) if map.contains_key("countries") => map
            .remove("countries")
            .unwrap_or(Value::Null),
        other => other,
    };
    if !body.is_array() {
        return Err(FetchError::validation(
            "Invalid data format: countries array expected",
        ));
    }
    let raw: Vec<RawCountry> = from_value(body, "countries payload")?;

    raw.into_iter()
        .map(|country| {
            let regime = country
                .regime
                .map(|r| r.parse::<RegimeKind>())
                .transpose()
                .map_err(FetchError::Validation)?;
            let confidence = country
                .confidence
                .map(|c| check_percent(c, "confidence"))
                .transpose()?;
            Ok(CountrySummary {
                code: country.code,
                name: country.name,
                regime,
                confidence,
                allocations: country.allocations,
                last_update: country.last_update,
            })
        })
        .collect()
}
