use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CountryCode {
    Fra,
    Deu,
    Usa,
    Gbr,
}

impl CountryCode {
    pub const ALL: [CountryCode; 4] = [
        CountryCode::Fra,
        CountryCode::Deu,
        CountryCode::Usa,
        CountryCode::Gbr,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CountryCode::Fra => "FRA",
            CountryCode::Deu => "DEU",
            CountryCode::Usa => "USA",
            CountryCode::Gbr => "GBR",
        }
    }
}

impl fmt::Display for CountryCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CountryCode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        CountryCode::ALL
            .into_iter()
            .find(|code| code.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| format!("unsupported country code '{value}' (expected FRA, DEU, USA or GBR)"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RegimeKind {
    Expansion,
    Recovery,
    Stagflation,
    Recession,
}

impl RegimeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegimeKind::Expansion => "EXPANSION",
            RegimeKind::Recovery => "RECOVERY",
            RegimeKind::Stagflation => "STAGFLATION",
            RegimeKind::Recession => "RECESSION",
        }
    }
}

impl FromStr for RegimeKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "EXPANSION" => Ok(RegimeKind::Expansion),
            "RECOVERY" => Ok(RegimeKind::Recovery),
            "STAGFLATION" => Ok(RegimeKind::Stagflation),
            "RECESSION" => Ok(RegimeKind::Recession),
            _ => Err(format!("Invalid regime type: {value}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Sector {
    Technology,
    Healthcare,
    Financials,
    Energy,
    ConsumerDiscretionary,
    ConsumerStaples,
    Industrials,
    Materials,
    Utilities,
    RealEstate,
    CommunicationServices,
}

impl Sector {
    pub const ALL: [Sector; 11] = [
        Sector::Technology,
        Sector::Healthcare,
        Sector::Financials,
        Sector::Energy,
        Sector::ConsumerDiscretionary,
        Sector::ConsumerStaples,
        Sector::Industrials,
        Sector::Materials,
        Sector::Utilities,
        Sector::RealEstate,
        Sector::CommunicationServices,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Sector::Technology => "TECHNOLOGY",
            Sector::Healthcare => "HEALTHCARE",
            Sector::Financials => "FINANCIALS",
            Sector::Energy => "ENERGY",
            Sector::ConsumerDiscretionary => "CONSUMER_DISCRETIONARY",
            Sector::ConsumerStaples => "CONSUMER_STAPLES",
            Sector::Industrials => "INDUSTRIALS",
            Sector::Materials => "MATERIALS",
            Sector::Utilities => "UTILITIES",
            Sector::RealEstate => "REAL_ESTATE",
            Sector::CommunicationServices => "COMMUNICATION_SERVICES",
        }
    }
}

impl FromStr for Sector {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Sector::ALL
            .into_iter()
            .find(|sector| sector.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| format!("unknown sector '{value}'"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Trend {
    Up,
    Down,
    Stable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Extreme,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegimeRecord {
    pub country: String,
    pub regime: RegimeKind,
    pub confidence: f64,
    pub growth_score: f64,
    pub inflation_score: f64,
    pub unemployment_score: Option<f64>,
    pub detected_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectorAllocationRecord {
    pub sector: Sector,
    pub allocation: f64,
    pub performance: f64,
    pub confidence: f64,
    pub trend: Trend,
    pub risk_score: f64,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BacktestPeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub total_months: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioMetrics {
    pub annualized_return: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
    pub win_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkMetrics {
    pub annualized_return: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyReturn {
    pub date: NaiveDate,
    pub portfolio_return: f64,
    pub benchmark_return: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BacktestingResult {
    pub period: BacktestPeriod,
    pub portfolio_metrics: PortfolioMetrics,
    pub benchmark_metrics: BenchmarkMetrics,
    pub outperformance: f64,
    pub monthly_series: Vec<MonthlyReturn>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendHealth {
    pub nodejs: bool,
    pub python: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketStress {
    pub stress_level: f64,
    pub vix: Option<f64>,
    pub high_yield_spread: Option<f64>,
    /// Metrics other than the two named ones, kept for display.
    pub other_metrics: BTreeMap<String, f64>,
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EtfQuote {
    pub symbol: String,
    pub name: String,
    pub price: f64,
    pub change: f64,
    pub change_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetAllocations {
    pub stocks: f64,
    pub bonds: f64,
    pub commodities: f64,
    pub cash: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountrySummary {
    pub code: String,
    pub name: String,
    pub regime: Option<RegimeKind>,
    pub confidence: Option<f64>,
    pub allocations: Option<AssetAllocations>,
    pub last_update: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn country_codes_parse_case_insensitively() {
        assert_eq!("fra".parse::<CountryCode>(), Ok(CountryCode::Fra));
        assert_eq!(" GBR ".parse::<CountryCode>(), Ok(CountryCode::Gbr));
        assert!("ITA".parse::<CountryCode>().is_err());
    }

    #[test]
    fn unknown_regime_is_rejected() {
        assert_eq!("recovery".parse::<RegimeKind>(), Ok(RegimeKind::Recovery));
        let err = "BOOM".parse::<RegimeKind>().unwrap_err();
        assert_eq!(err, "Invalid regime type: BOOM");
    }

    #[test]
    fn sectors_use_screaming_snake_names() {
        let json = serde_json::to_string(&Sector::ConsumerDiscretionary).unwrap();
        assert_eq!(json, "\"CONSUMER_DISCRETIONARY\"");
        assert_eq!("real_estate".parse::<Sector>(), Ok(Sector::RealEstate));
    }
}
