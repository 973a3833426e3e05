use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;

mod backend;
mod configuration;
mod countries;
mod dashboard;
mod decode;
mod error;
mod hooks;
mod http;
mod models;
mod report;
mod scheduler;
mod settings;
mod store;
#[cfg(test)]
mod testing;

use backend::{HybridClient, Operation};
use configuration::{ConfigImport, Configuration, Formula};
use dashboard::{BacktestWindow, Dashboard, DashboardRequest, DashboardSnapshot};
use hooks::{BacktestingResource, CountriesResource, DataHook, HookState};
use models::{CountryCode, RegimeKind};
use settings::Settings;
use store::{ConfigStore, FileStore, PgStore};

#[derive(Parser)]
#[command(name = "oracle-portfolio")]
#[command(about = "Regime, allocation and backtesting dashboard over the Oracle Portfolio backends", long_about = None)]
struct Cli {
    /// Where configuration and the selected country are persisted
    #[arg(long, value_enum, default_value_t = StoreKind::File, global = true)]
    store: StoreKind,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StoreKind {
    File,
    Postgres,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve every dashboard section once and print a summary
    Dashboard {
        #[arg(long)]
        country: Option<CountryCode>,
        /// Ask the backends even when reference data exists
        #[arg(long)]
        remote: bool,
        /// Only show allocations recommended for this regime
        #[arg(long)]
        regime: Option<RegimeKind>,
    },
    /// Keep the dashboard mounted and print each change
    Watch {
        #[arg(long)]
        country: Option<CountryCode>,
        /// Stop after this many changes
        #[arg(long)]
        ticks: Option<usize>,
    },
    /// Check both backends once
    Health,
    /// List the countries known to the backends
    Countries,
    /// Run a backtest for one country
    Backtest {
        #[arg(long)]
        country: CountryCode,
        #[arg(long)]
        start: Option<NaiveDate>,
        #[arg(long)]
        end: Option<NaiveDate>,
        /// Also write the monthly series to this CSV file
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Write a markdown snapshot of the dashboard
    Report {
        #[arg(long)]
        country: Option<CountryCode>,
        #[arg(long, default_value = "oracle-report.md")]
        out: PathBuf,
    },
    /// Call one backend operation and print the raw payload
    Call {
        #[arg(value_enum)]
        operation: ApiOperation,
        #[arg(long)]
        country: Option<CountryCode>,
        /// JSON body; sends the call as a POST
        #[arg(long)]
        body: Option<String>,
    },
    /// Persist the country used when none is given
    SelectCountry { code: String },
    /// Inspect or change the stored configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Create or upgrade the database schema
    InitDb,
}

#[derive(Subcommand)]
enum ConfigAction {
    Show,
    /// Write every section back to the store, filling in defaults
    Save,
    Reset,
    Export { path: PathBuf },
    Import { path: PathBuf },
    /// Append a formula and save the formula list
    AddFormula {
        name: String,
        expression: String,
        #[arg(long = "var")]
        variables: Vec<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ApiOperation {
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

impl From<ApiOperation> for Operation {
    fn from(value: ApiOperation) -> Self {
        match value {
            ApiOperation::Countries => Operation::Countries,
            ApiOperation::Regime => Operation::Regime,
            ApiOperation::Allocations => Operation::Allocations,
            ApiOperation::Backtesting => Operation::Backtesting,
            ApiOperation::MarketStress => Operation::MarketStress,
            ApiOperation::MarketData => Operation::MarketData,
            ApiOperation::IndicatorsBreakdown => Operation::IndicatorsBreakdown,
            ApiOperation::MultiRegime => Operation::MultiRegime,
            ApiOperation::Health => Operation::Health,
        }
    }
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("oracle_portfolio=info"));
    let json = std::env::var("ORACLE_LOG_JSON").is_ok_and(|v| v == "1");
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn connect(settings: &Settings) -> anyhow::Result<sqlx::PgPool> {
    let database_url = settings
        .database_url
        .as_deref()
        .context("DATABASE_URL must be set to use the Postgres store")?;
    PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .context("failed to connect to Postgres")
}

async fn open_store(kind: StoreKind, settings: &Settings) -> anyhow::Result<Box<dyn ConfigStore>> {
    Ok(match kind {
        StoreKind::File => Box::new(FileStore::new(settings.config_dir.clone())),
        StoreKind::Postgres => Box::new(PgStore::new(connect(settings).await?)),
    })
}

fn print_snapshot(snapshot: &DashboardSnapshot) {
    println!("Dashboard for {}", snapshot.country);
    if let Some(regime) = &snapshot.regime.data {
        println!(
            "  regime       {} ({:.0}% confidence)",
            regime.regime.as_str(),
            regime.confidence
        );
    }
    if let Some(records) = snapshot.allocations.data.as_deref() {
        let summary = hooks::summarize(records);
        println!(
            "  allocations  {} sectors, total {:.1}%, avg risk {:.0}",
            records.len(),
            summary.total_allocation,
            summary.average_risk_score
        );
    }
    if let Some(stress) = &snapshot.stress.data {
        println!("  stress       {:.0}/100", stress.stress_level);
    }
    if let Some(quotes) = &snapshot.market.data {
        println!("  etf quotes   {}", quotes.len());
    }
    if let Some(result) = &snapshot.backtesting.data {
        println!(
            "  backtest     {:+.2}% vs benchmark over {} months",
            result.outperformance, result.period.total_months
        );
    }
    if let Some(health) = &snapshot.health {
        println!("  backends     node={} python={}", health.nodejs, health.python);
    }
    if let Some(countries) = &snapshot.countries.data {
        println!("  countries    {}", countries.len());
    }
    for banner in snapshot.banners() {
        println!("  ! {}: {}", banner.section, banner.message);
    }
}

fn describe<T>(state: &HookState<T>) -> String {
    match (&state.error, state.origin) {
        (Some(error), _) => format!("{:?} with error: {error}", state.phase),
        (None, Some(origin)) => format!("{:?} from {origin:?}", state.phase),
        (None, None) => format!("{:?}", state.phase),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let settings = Settings::from_env()?;
    let fetcher = http::HttpFetcher::new().context("failed to build HTTP client")?;
    let client = Arc::new(HybridClient::new(Arc::new(fetcher), &settings));
    let today = Utc::now().date_naive();

    match cli.command {
        Commands::Dashboard {
            country,
            remote,
            regime,
        } => {
            let store = open_store(cli.store, &settings).await?;
            let country = match country {
                Some(code) => code,
                None => configuration::load_selected_country(store.as_ref()).await,
            };
            let dashboard = Dashboard::new(
                client,
                DashboardRequest {
                    country,
                    live: remote,
                    regime,
                    window: BacktestWindow::trailing(today),
                },
            );
            print_snapshot(&dashboard.resolve_once().await);
        }
        Commands::Watch { country, ticks } => {
            let store = open_store(cli.store, &settings).await?;
            let country = match country {
                Some(code) => code,
                None => configuration::load_selected_country(store.as_ref()).await,
            };
            let mut dashboard = Dashboard::new(
                client,
                DashboardRequest {
                    country,
                    live: false,
                    regime: None,
                    window: BacktestWindow::trailing(today),
                },
            );
            let mut feed = dashboard.watch();
            dashboard.mount(&settings.intervals);

            let mut seen = 0usize;
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    changed = feed.changed() => {
                        let Some(section) = changed else { break };
                        let snapshot = dashboard.snapshot();
                        let line = match section {
                            "regime" => describe(&snapshot.regime),
                            "allocations" => describe(&snapshot.allocations),
                            "market stress" => describe(&snapshot.stress),
                            "market data" => describe(&snapshot.market),
                            "backtesting" => describe(&snapshot.backtesting),
                            "countries" => describe(&snapshot.countries),
                            _ => format!("{:?}", snapshot.health),
                        };
                        println!("[{}] {section}: {line}", snapshot.generated_at.format("%H:%M:%S"));
                        seen += 1;
                        if ticks.is_some_and(|limit| seen >= limit) {
                            break;
                        }
                    }
                }
            }
            dashboard.unmount();
        }
        Commands::Health => {
            let health = client.health_check().await;
            println!("{}", serde_json::to_string_pretty(&health)?);
        }
        Commands::Countries => {
            let hook = DataHook::new(CountriesResource, client);
            hook.refetch().await;
            let state = hook.state();
            if let Some(error) = &state.error {
                eprintln!("warning: {error}");
            }
            for country in state.data.unwrap_or_default() {
                let regime = country.regime.map(|r| r.as_str()).unwrap_or("-");
                println!("{} {} {regime}", country.code, country.name);
            }
        }
        Commands::Backtest {
            country,
            start,
            end,
            csv,
        } => {
            let trailing = BacktestWindow::trailing(today);
            let window = BacktestWindow::clamped(
                start.unwrap_or(trailing.start),
                end.unwrap_or(trailing.end),
                today,
            );
            println!(
                "Backtesting {country} from {} to {} ({} months).",
                window.start,
                window.end,
                window.months()
            );
            let hook = DataHook::new(
                BacktestingResource::new(Some(country), window.start, window.end),
                client,
            );
            hook.refetch().await;
            let state = hook.state();
            if let Some(error) = &state.error {
                eprintln!("warning: {error}");
            }
            let result = state
                .data
                .context("no backtesting result available")?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            if let Some(path) = csv {
                let rows = report::export_series_csv(&path, &result.monthly_series)
                    .with_context(|| format!("failed to write {}", path.display()))?;
                println!("Wrote {rows} months to {}.", path.display());
            }
        }
        Commands::Report { country, out } => {
            let store = open_store(cli.store, &settings).await?;
            let country = match country {
                Some(code) => code,
                None => configuration::load_selected_country(store.as_ref()).await,
            };
            let dashboard = Dashboard::new(
                client,
                DashboardRequest {
                    country,
                    live: false,
                    regime: None,
                    window: BacktestWindow::trailing(today),
                },
            );
            let snapshot = dashboard.resolve_once().await;
            std::fs::write(&out, report::build_report(&snapshot))?;
            println!("Report written to {}.", out.display());
        }
        Commands::Call {
            operation,
            country,
            body,
        } => {
            let query: Vec<(String, String)> = country
                .map(|code| vec![("country".to_string(), code.as_str().to_string())])
                .unwrap_or_default();
            let response = match body {
                Some(raw) => {
                    let body = serde_json::from_str(&raw).context("--body is not valid JSON")?;
                    client.post(operation.into(), &query, body).await?
                }
                None => client.call(operation.into(), &query).await?,
            };
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Commands::SelectCountry { code } => {
            let store = open_store(cli.store, &settings).await?;
            let country = configuration::select_country(store.as_ref(), &code).await?;
            println!("Selected {} ({}).", countries::country(country).name, country);
        }
        Commands::Config { action } => {
            let store = open_store(cli.store, &settings).await?;
            let mut config = Configuration::load(store.as_ref()).await;
            if let Some(error) = config.error() {
                eprintln!("warning: {error}");
            }
            match action {
                ConfigAction::Show => {
                    println!("{}", serde_json::to_string_pretty(&config.export(Utc::now()))?);
                }
                ConfigAction::Save => {
                    config.save_all(store.as_ref()).await?;
                    println!("Configuration saved.");
                }
                ConfigAction::Reset => {
                    config.reset_all(store.as_ref()).await?;
                    println!("Configuration reset to defaults.");
                }
                ConfigAction::Export { path } => {
                    let doc = serde_json::to_string_pretty(&config.export(Utc::now()))?;
                    std::fs::write(&path, doc)?;
                    println!("Configuration exported to {}.", path.display());
                }
                ConfigAction::Import { path } => {
                    let raw = std::fs::read_to_string(&path)
                        .with_context(|| format!("failed to read {}", path.display()))?;
                    let doc: ConfigImport = serde_json::from_str(&raw)
                        .with_context(|| format!("{} is not a configuration export", path.display()))?;
                    let imported = config.import(store.as_ref(), doc).await?;
                    println!(
                        "Imported {}; skipped {}.",
                        imported.imported.join(", "),
                        imported.skipped.join(", ")
                    );
                }
                ConfigAction::AddFormula {
                    name,
                    expression,
                    variables,
                } => {
                    let formula = Formula::new(name, expression, variables);
                    let id = formula.id.clone();
                    config.formulas.add(formula);
                    config.formulas.save(store.as_ref()).await?;
                    println!("Formula {id} saved.");
                }
            }
        }
        Commands::InitDb => {
            let pool = connect(&settings).await?;
            store::init_db(&pool).await?;
            println!("Schema ready.");
        }
    }

    Ok(())
}
