use std::fmt::Write;
use std::path::Path;

use crate::countries;
use crate::dashboard::DashboardSnapshot;
use crate::hooks::{freshness, summarize, HookState, Origin};
use crate::models::{BacktestingResult, MonthlyReturn};

fn origin_label<T>(state: &HookState<T>) -> &'static str {
    match state.origin {
        Some(Origin::Static) => "reference data",
        Some(Origin::Remote) => "live",
        Some(Origin::Fallback) => "fallback",
        None => "unavailable",
    }
}

pub fn build_report(snapshot: &DashboardSnapshot) -> String {
    let country = countries::country(snapshot.country);
    let mut output = String::new();

    let _ = writeln!(output, "# Oracle Portfolio Dashboard");
    let _ = writeln!(
        output,
        "Generated for {} ({}, {}) at {}",
        country.name,
        country.code,
        country.market,
        snapshot.generated_at.format("%Y-%m-%d %H:%M UTC")
    );

    let banners = snapshot.banners();
    if !banners.is_empty() {
        let _ = writeln!(output);
        for banner in banners {
            let suffix = if banner.fallback { " (showing fallback data)" } else { "" };
            let _ = writeln!(output, "> **{}**: {}{suffix}", banner.section, banner.message);
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Economic Regime");
    match &snapshot.regime.data {
        Some(record) => {
            let traits = countries::regime_characteristics(record.regime);
            let fresh = freshness(record, snapshot.generated_at);
            let _ = writeln!(
                output,
                "- {} ({}), confidence {:.0}%",
                traits.name,
                origin_label(&snapshot.regime),
                record.confidence
            );
            let _ = writeln!(
                output,
                "- Growth {:.1}, inflation {:.1}",
                record.growth_score, record.inflation_score
            );
            let _ = writeln!(output, "- {}; risk {:?}", traits.description, traits.risk_level);
            let _ = writeln!(output, "- Favoured sectors: {}", traits.optimal_sectors.join(", "));
            let _ = writeln!(
                output,
                "- Updated {} min ago{}",
                fresh.last_update_age_minutes,
                if fresh.is_healthy { "" } else { " (stale)" }
            );
        }
        None => {
            let _ = writeln!(output, "No regime available.");
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Sector Allocations");
    match snapshot.allocations.data.as_deref() {
        Some(records) if !records.is_empty() => {
            let summary = summarize(records);
            let _ = writeln!(
                output,
                "Total {:.1}%, average performance {:+.2}%, average risk {:.0} ({})",
                summary.total_allocation,
                summary.average_performance,
                summary.average_risk_score,
                origin_label(&snapshot.allocations)
            );
            let _ = writeln!(output);
            let _ = writeln!(output, "| Sector | Allocation | Risk | Trend |");
            let _ = writeln!(output, "|---|---:|---:|---|");
            for record in records {
                let _ = writeln!(
                    output,
                    "| {} | {:.1}% | {:.0} | {:?} |",
                    record.sector.as_str(),
                    record.allocation,
                    record.risk_score,
                    record.trend
                );
            }
        }
        _ => {
            let _ = writeln!(output, "No allocations available.");
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Market Stress");
    match &snapshot.stress.data {
        Some(stress) => {
            let _ = writeln!(
                output,
                "- Stress level {:.0}/100 ({})",
                stress.stress_level,
                origin_label(&snapshot.stress)
            );
            if let Some(vix) = stress.vix {
                let _ = writeln!(output, "- VIX {vix:.1}");
            }
            if let Some(spread) = stress.high_yield_spread {
                let _ = writeln!(output, "- High yield spread {spread:.2}");
            }
            for (name, value) in &stress.other_metrics {
                let _ = writeln!(output, "- {name}: {value:.2}");
            }
            if !stress.sources.is_empty() {
                let _ = writeln!(output, "- Sources: {}", stress.sources.join(", "));
            }
        }
        None => {
            let _ = writeln!(output, "No stress reading available.");
        }
    }

    if let Some(quotes) = snapshot.market.data.as_deref().filter(|q| !q.is_empty()) {
        let _ = writeln!(output);
        let _ = writeln!(output, "## ETF Quotes");
        for quote in quotes {
            let _ = writeln!(
                output,
                "- {} ({}): {:.2} ({:+.2}%)",
                quote.symbol, quote.name, quote.price, quote.change_percent
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Backtesting");
    match &snapshot.backtesting.data {
        Some(result) => write_backtesting(&mut output, result),
        None => {
            let _ = writeln!(output, "No backtesting result available.");
        }
    }

    if let Some(countries) = snapshot.countries.data.as_deref() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Countries");
        let _ = writeln!(
            output,
            "{} available ({})",
            countries.len(),
            origin_label(&snapshot.countries)
        );
        for country in countries {
            match (country.regime, country.confidence) {
                (Some(regime), Some(confidence)) => {
                    let _ = writeln!(
                        output,
                        "- {} {}: {} ({confidence:.0}%)",
                        country.code,
                        country.name,
                        regime.as_str()
                    );
                }
                _ => {
                    let _ = writeln!(output, "- {} {}", country.code, country.name);
                }
            }
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Backends");
    match &snapshot.health {
        Some(health) => {
            let status = |up: bool| if up { "up" } else { "down" };
            let _ = writeln!(output, "- Node: {}", status(health.nodejs));
            let _ = writeln!(output, "- Python: {}", status(health.python));
        }
        None => {
            let _ = writeln!(output, "Backend health not checked.");
        }
    }

    output
}

fn write_backtesting(output: &mut String, result: &BacktestingResult) {
    let _ = writeln!(
        output,
        "Period {} to {} ({} months)",
        result.period.start, result.period.end, result.period.total_months
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "| | Annualized | Sharpe | Max drawdown |");
    let _ = writeln!(output, "|---|---:|---:|---:|");
    let _ = writeln!(
        output,
        "| Portfolio | {:.2}% | {:.2} | {:.2}% |",
        result.portfolio_metrics.annualized_return,
        result.portfolio_metrics.sharpe_ratio,
        result.portfolio_metrics.max_drawdown
    );
    let _ = writeln!(
        output,
        "| Benchmark | {:.2}% | {:.2} | {:.2}% |",
        result.benchmark_metrics.annualized_return,
        result.benchmark_metrics.sharpe_ratio,
        result.benchmark_metrics.max_drawdown
    );
    let _ = writeln!(output);
    let _ = writeln!(
        output,
        "Win rate {:.1}%, outperformance {:+.2}%",
        result.portfolio_metrics.win_rate, result.outperformance
    );
}

/// Writes the monthly series as CSV; returns the number of rows.
pub fn write_series_csv<W: std::io::Write>(
    writer: W,
    series: &[MonthlyReturn],
) -> anyhow::Result<usize> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(["date", "portfolio_return", "benchmark_return", "excess_return"])?;
    for month in series {
        csv.write_record([
            month.date.format("%Y-%m-%d").to_string(),
            format!("{:.4}", month.portfolio_return),
            format!("{:.4}", month.benchmark_return),
            format!("{:.4}", month.portfolio_return - month.benchmark_return),
        ])?;
    }
    csv.flush()?;
    Ok(series.len())
}

pub fn export_series_csv(path: &Path, series: &[MonthlyReturn]) -> anyhow::Result<usize> {
    let file = std::fs::File::create(path)?;
    write_series_csv(file, series)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::countries::{allocation_records, country_summaries, regime_record};
    use crate::hooks::{BacktestingResource, Phase, Resource};
    use crate::models::{BackendHealth, CountryCode};
    use chrono::{NaiveDate, Utc};

    fn state<T>(data: T, origin: Origin, error: Option<&str>) -> HookState<T> {
        HookState {
            phase: Phase::Resolved,
            data: Some(data),
            loading: false,
            error: error.map(str::to_string),
            origin: Some(origin),
        }
    }

    fn snapshot() -> DashboardSnapshot {
        let now = Utc::now();
        DashboardSnapshot {
            country: CountryCode::Usa,
            generated_at: now,
            regime: state(regime_record(CountryCode::Usa, now), Origin::Static, None),
            allocations: state(allocation_records(CountryCode::Usa, now), Origin::Static, None),
            stress: HookState::idle(),
            market: state(Vec::new(), Origin::Fallback, Some("Loading error: HTTP status 502")),
            backtesting: state(
                BacktestingResource::new(None, now.date_naive(), now.date_naive())
                    .fallback(now)
                    .unwrap(),
                Origin::Fallback,
                Some("Timeout: API not responding"),
            ),
            countries: state(country_summaries(), Origin::Static, None),
            health: Some(BackendHealth {
                nodejs: true,
                python: false,
                timestamp: now,
            }),
        }
    }

    #[test]
    fn report_covers_every_section() {
        let report = build_report(&snapshot());

        assert!(report.starts_with("# Oracle Portfolio Dashboard"));
        assert!(report.contains("Generated for United States (USA, S&P 500)"));
        assert!(report.contains("> **backtesting**: Timeout: API not responding"));
        assert!(report.contains("> **market data**: Loading error: HTTP status 502"));
        assert!(report.contains("- Stagflation (reference data), confidence 92%"));
        assert!(report.contains("Favoured sectors: Energy, Utilities, Healthcare"));
        assert!(report.contains("Total 100.0%"));
        assert!(report.contains("| TECHNOLOGY | 25.0% | 75 | Stable |"));
        assert!(report.contains("No stress reading available."));
        assert!(!report.contains("## ETF Quotes"));
        assert!(report.contains("Period 2020-01-01 to 2024-12-31 (60 months)"));
        assert!(report.contains("outperformance -0.48%"));
        assert!(report.contains("- Python: down"));
        assert!(report.contains("4 available (reference data)"));
        assert!(report.contains("- FRA France: EXPANSION (85%)"));
    }

    #[test]
    fn failed_section_banner_does_not_claim_fallback() {
        let mut snapshot = snapshot();
        snapshot.stress = HookState {
            phase: Phase::Failed,
            data: None,
            loading: false,
            error: Some("Loading error: HTTP status 500".to_string()),
            origin: None,
        };
        let report = build_report(&snapshot);

        assert!(report.contains("> **market stress**: Loading error: HTTP status 500\n"));
        assert!(report.contains("> **backtesting**: Timeout: API not responding (showing fallback data)"));
    }

    #[test]
    fn series_csv_has_header_and_excess_column() {
        let series = vec![
            MonthlyReturn {
                date: NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
                portfolio_return: 1.5,
                benchmark_return: 0.5,
            },
            MonthlyReturn {
                date: NaiveDate::from_ymd_opt(2024, 2, 29).unwrap(),
                portfolio_return: -0.25,
                benchmark_return: 0.25,
            },
        ];
        let mut buffer = Vec::new();
        let rows = write_series_csv(&mut buffer, &series).unwrap();

        assert_eq!(rows, 2);
        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "date,portfolio_return,benchmark_return,excess_return");
        assert_eq!(lines[1], "2024-01-31,1.5000,0.5000,1.0000");
        assert_eq!(lines[2], "2024-02-29,-0.2500,0.2500,-0.5000");
    }

    #[test]
    fn series_csv_can_be_written_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("series.csv");
        assert_eq!(export_series_csv(&path, &[]).unwrap(), 0);
        assert!(std::fs::read_to_string(path).unwrap().starts_with("date,"));
    }
}
