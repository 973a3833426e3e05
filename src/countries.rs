//! Static reference data for the supported countries.
//!
//! Everything here is a compile-time table; lookups never fail for a
//! [`CountryCode`] and never touch the network.

use chrono::{DateTime, Utc};

use crate::models::{
    CountryCode, CountrySummary, RegimeKind, RegimeRecord, RiskLevel, Sector,
    SectorAllocationRecord, Trend,
};

/// Country served when live resolution fails.
pub const DEFAULT_COUNTRY: CountryCode = CountryCode::Fra;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Country {
    pub code: CountryCode,
    pub name: &'static str,
    pub currency: &'static str,
    pub timezone: &'static str,
    pub market: &'static str,
    pub language: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegimeDefaults {
    pub regime: RegimeKind,
    pub growth_score: f64,
    pub inflation_score: f64,
    /// Percentage in [0, 100].
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Indicator {
    pub value: f64,
    pub source: &'static str,
    pub unit: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CountryIndicators {
    pub electricity: Indicator,
    pub pmi: Indicator,
    pub maritime: Indicator,
    pub energy: Indicator,
    pub yields: Indicator,
    pub spreads: Indicator,
    pub vix: Indicator,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegimeCharacteristics {
    pub name: &'static str,
    pub description: &'static str,
    pub risk_level: RiskLevel,
    pub optimal_sectors: [&'static str; 3],
}

const fn ind(value: f64, source: &'static str, unit: &'static str) -> Indicator {
    Indicator {
        value,
        source,
        unit,
    }
}

pub fn country(code: CountryCode) -> Country {
    match code {
        CountryCode::Fra => Country {
            code,
            name: "France",
            currency: "EUR",
            timezone: "Europe/Paris",
            market: "CAC 40",
            language: "fr",
        },
        CountryCode::Deu => Country {
            code,
            name: "Germany",
            currency: "EUR",
            timezone: "Europe/Berlin",
            market: "DAX",
            language: "de",
        },
        CountryCode::Usa => Country {
            code,
            name: "United States",
            currency: "USD",
            timezone: "America/New_York",
            market: "S&P 500",
            language: "en",
        },
        CountryCode::Gbr => Country {
            code,
            name: "United Kingdom",
            currency: "GBP",
            timezone: "Europe/London",
            market: "FTSE 100",
            language: "en",
        },
    }
}

pub fn regime_defaults(code: CountryCode) -> RegimeDefaults {
    let (regime, growth_score, inflation_score, confidence) = match code {
        CountryCode::Fra => (RegimeKind::Expansion, 2.5, 1.8, 85.0),
        CountryCode::Deu => (RegimeKind::Recovery, 1.2, 1.5, 78.0),
        CountryCode::Usa => (RegimeKind::Stagflation, 0.8, 4.2, 92.0),
        CountryCode::Gbr => (RegimeKind::Recession, -0.5, 1.2, 88.0),
    };
    RegimeDefaults {
        regime,
        growth_score,
        inflation_score,
        confidence,
    }
}

/// Recommended sector weights, in percent, largest first.
pub fn sector_allocations(code: CountryCode) -> &'static [(Sector, f64); 11] {
    use Sector::*;

    const FRA: [(Sector, f64); 11] = [
        (Financials, 20.0),
        (Technology, 18.0),
        (Healthcare, 15.0),
        (Energy, 12.0),
        (ConsumerDiscretionary, 10.0),
        (ConsumerStaples, 8.0),
        (Industrials, 7.0),
        (Materials, 4.0),
        (Utilities, 3.0),
        (RealEstate, 2.0),
        (CommunicationServices, 1.0),
    ];
    const DEU: [(Sector, f64); 11] = [
        (Industrials, 28.0),
        (Technology, 18.0),
        (Financials, 15.0),
        (Healthcare, 12.0),
        (Materials, 10.0),
        (Energy, 8.0),
        (ConsumerDiscretionary, 5.0),
        (Utilities, 2.0),
        (ConsumerStaples, 1.0),
        (RealEstate, 1.0),
        (CommunicationServices, 0.0),
    ];
    const USA: [(Sector, f64); 11] = [
        (Technology, 25.0),
        (Healthcare, 15.0),
        (Financials, 13.0),
        (ConsumerDiscretionary, 12.0),
        (CommunicationServices, 10.0),
        (Industrials, 8.0),
        (ConsumerStaples, 7.0),
        (Energy, 4.0),
        (Utilities, 3.0),
        (RealEstate, 2.0),
        (Materials, 1.0),
    ];
    const GBR: [(Sector, f64); 11] = [
        (Financials, 25.0),
        (ConsumerStaples, 15.0),
        (Energy, 12.0),
        (Healthcare, 12.0),
        (Industrials, 10.0),
        (Materials, 8.0),
        (Technology, 8.0),
        (Utilities, 5.0),
        (ConsumerDiscretionary, 3.0),
        (RealEstate, 2.0),
        (CommunicationServices, 0.0),
    ];

    match code {
        CountryCode::Fra => &FRA,
        CountryCode::Deu => &DEU,
        CountryCode::Usa => &USA,
        CountryCode::Gbr => &GBR,
    }
}

pub fn indicators(code: CountryCode) -> CountryIndicators {
    match code {
        CountryCode::Fra => CountryIndicators {
            electricity: ind(2.3, "RTE France", "% change"),
            pmi: ind(52.1, "Markit France", "index"),
            maritime: ind(1.8, "Port of Le Havre", "% change"),
            energy: ind(85.2, "Brent", "$/barrel"),
            yields: ind(2.85, "OAT 10Y", "%"),
            spreads: ind(45.0, "vs Bund", "bps"),
            vix: ind(18.5, "CBOE", "index"),
        },
        CountryCode::Deu => CountryIndicators {
            electricity: ind(1.9, "Bundesnetzagentur", "% change"),
            pmi: ind(48.7, "Markit Germany", "index"),
            maritime: ind(-0.5, "Port of Hamburg", "% change"),
            energy: ind(85.2, "Brent", "$/barrel"),
            yields: ind(2.40, "Bund 10Y", "%"),
            spreads: ind(0.0, "Reference", "bps"),
            vix: ind(18.5, "CBOE", "index"),
        },
        CountryCode::Usa => CountryIndicators {
            electricity: ind(3.1, "EIA", "% change"),
            pmi: ind(49.2, "ISM Manufacturing", "index"),
            maritime: ind(2.7, "Port of Los Angeles", "% change"),
            energy: ind(82.1, "WTI", "$/barrel"),
            yields: ind(4.25, "Treasury 10Y", "%"),
            spreads: ind(185.0, "vs Treasury", "bps"),
            vix: ind(22.3, "CBOE VIX", "index"),
        },
        CountryCode::Gbr => CountryIndicators {
            electricity: ind(-1.2, "National Grid", "% change"),
            pmi: ind(47.8, "Markit UK", "index"),
            maritime: ind(-2.1, "Port of Felixstowe", "% change"),
            energy: ind(85.2, "Brent", "$/barrel"),
            yields: ind(3.95, "Gilt 10Y", "%"),
            spreads: ind(155.0, "vs Bund", "bps"),
            vix: ind(18.5, "CBOE", "index"),
        },
    }
}

pub fn regime_characteristics(kind: RegimeKind) -> RegimeCharacteristics {
    match kind {
        RegimeKind::Expansion => RegimeCharacteristics {
            name: "Expansion",
            description: "Strong growth, contained inflation",
            risk_level: RiskLevel::Low,
            optimal_sectors: ["Technology", "Consumer Discretionary", "Industrials"],
        },
        RegimeKind::Recovery => RegimeCharacteristics {
            name: "Recovery",
            description: "Moderate growth, economy picking up",
            risk_level: RiskLevel::Medium,
            optimal_sectors: ["Financials", "Materials", "Consumer Services"],
        },
        RegimeKind::Stagflation => RegimeCharacteristics {
            name: "Stagflation",
            description: "Weak growth, high inflation",
            risk_level: RiskLevel::High,
            optimal_sectors: ["Energy", "Utilities", "Healthcare"],
        },
        RegimeKind::Recession => RegimeCharacteristics {
            name: "Recession",
            description: "Economic contraction, possible deflation",
            risk_level: RiskLevel::Extreme,
            optimal_sectors: ["Consumer Staples", "Healthcare", "Utilities"],
        },
    }
}

pub fn sector_risk_level(sector: Sector) -> RiskLevel {
    match sector {
        Sector::Healthcare | Sector::ConsumerStaples | Sector::Utilities => RiskLevel::Low,
        Sector::Technology | Sector::Energy | Sector::Materials => RiskLevel::High,
        _ => RiskLevel::Medium,
    }
}

fn risk_score(level: RiskLevel) -> f64 {
    match level {
        RiskLevel::Low => 25.0,
        RiskLevel::Medium => 50.0,
        RiskLevel::High => 75.0,
        RiskLevel::Extreme => 90.0,
    }
}

pub fn regime_record(code: CountryCode, now: DateTime<Utc>) -> RegimeRecord {
    let defaults = regime_defaults(code);
    RegimeRecord {
        country: code.as_str().to_string(),
        regime: defaults.regime,
        confidence: defaults.confidence,
        growth_score: defaults.growth_score,
        inflation_score: defaults.inflation_score,
        unemployment_score: None,
        detected_at: now,
        last_updated: now,
    }
}

/// Static allocations carry no live performance; confidence follows the
/// country's regime confidence and risk follows the sector's risk level.
pub fn allocation_records(code: CountryCode, now: DateTime<Utc>) -> Vec<SectorAllocationRecord> {
    let confidence = regime_defaults(code).confidence;
    sector_allocations(code)
        .iter()
        .map(|(sector, allocation)| SectorAllocationRecord {
            sector: *sector,
            allocation: *allocation,
            performance: 0.0,
            confidence,
            trend: Trend::Stable,
            risk_score: risk_score(sector_risk_level(*sector)),
            last_updated: now,
        })
        .collect()
}

pub fn country_summaries() -> Vec<CountrySummary> {
    CountryCode::ALL
        .into_iter()
        .map(|code| {
            let defaults = regime_defaults(code);
            CountrySummary {
                code: code.as_str().to_string(),
                name: country(code).name.to_string(),
                regime: Some(defaults.regime),
                confidence: Some(defaults.confidence),
                allocations: None,
                last_update: None,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_country_has_eleven_distinct_sectors() {
        for code in CountryCode::ALL {
            let mut sectors: Vec<Sector> =
                sector_allocations(code).iter().map(|(s, _)| *s).collect();
            sectors.sort();
            sectors.dedup();
            assert_eq!(sectors.len(), 11, "{code}");
        }
    }

    #[test]
    fn france_defaults_match_reference_table() {
        let record = regime_record(CountryCode::Fra, Utc::now());
        assert_eq!(record.regime, RegimeKind::Expansion);
        assert_eq!(record.confidence, 85.0);
        assert_eq!(record.country, "FRA");
        assert_eq!(country(CountryCode::Fra).market, "CAC 40");
    }

    #[test]
    fn reference_confidences_are_exact_percentages() {
        let now = Utc::now();
        let expected = [
            (CountryCode::Fra, 85.0),
            (CountryCode::Deu, 78.0),
            (CountryCode::Usa, 92.0),
            (CountryCode::Gbr, 88.0),
        ];
        for (code, confidence) in expected {
            assert_eq!(regime_record(code, now).confidence, confidence);
            assert!(allocation_records(code, now)
                .iter()
                .all(|record| record.confidence == confidence));
        }
        let summaries: Vec<Option<f64>> =
            country_summaries().iter().map(|c| c.confidence).collect();
        assert_eq!(summaries, vec![Some(85.0), Some(78.0), Some(92.0), Some(88.0)]);
    }

    #[test]
    fn reference_tables_happen_to_total_one_hundred() {
        let total = |code| -> f64 { sector_allocations(code).iter().map(|(_, v)| v).sum() };
        assert_eq!(total(CountryCode::Fra), 100.0);
        assert_eq!(total(CountryCode::Usa), 100.0);
        assert_eq!(total(CountryCode::Gbr), 100.0);
        assert_eq!(total(CountryCode::Deu), 100.0);
    }

    #[test]
    fn static_allocations_are_deterministic() {
        let now = Utc::now();
        let first = allocation_records(CountryCode::Deu, now);
        let second = allocation_records(CountryCode::Deu, now);
        assert_eq!(first, second);
        let industrials = first
            .iter()
            .find(|r| r.sector == Sector::Industrials)
            .unwrap();
        assert_eq!(industrials.allocation, 28.0);
        assert_eq!(industrials.risk_score, 50.0);
    }
}
