//! One country's dashboard: every data hook plus the backend monitor.

use std::sync::Arc;

use chrono::{DateTime, Datelike, Months, NaiveDate, Utc};
use tokio::sync::watch;

use crate::backend::HybridClient;
use crate::hooks::{
    AllocationsResource, BacktestingResource, CountriesResource, DataHook, HealthMonitor,
    HookState, MarketDataResource, MarketStressResource, RegimeResource, Scope,
};
use crate::models::{
    BackendHealth, BacktestingResult, CountryCode, CountrySummary, EtfQuote, MarketStress,
    RegimeKind, RegimeRecord, SectorAllocationRecord,
};
use crate::settings::RefreshIntervals;

/// Earliest date the backtesting service covers.
pub fn earliest_backtest_date() -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(2020, 1, 1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BacktestWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl BacktestWindow {
    /// Two years up to `today`.
    pub fn trailing(today: NaiveDate) -> Self {
        let start = today.checked_sub_months(Months::new(24)).unwrap_or(today);
        Self::clamped(start, today, today)
    }

    /// Keeps both dates within [2020-01-01, today]; an end before the
    /// start is moved up to the start.
    pub fn clamped(start: NaiveDate, end: NaiveDate, today: NaiveDate) -> Self {
        let floor = earliest_backtest_date().unwrap_or(NaiveDate::MIN).min(today);
        let start = start.clamp(floor, today);
        let end = end.clamp(floor, today).max(start);
        Self { start, end }
    }

    pub fn months(&self) -> u32 {
        let years = self.end.year() - self.start.year();
        let months = years * 12 + self.end.month() as i32 - self.start.month() as i32;
        months.max(0) as u32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DashboardRequest {
    pub country: CountryCode,
    /// Ask the backends even for countries with reference data.
    pub live: bool,
    /// Restrict allocations to the ones recommended for this regime.
    pub regime: Option<RegimeKind>,
    pub window: BacktestWindow,
}

#[derive(Debug, Clone)]
pub struct DashboardSnapshot {
    pub country: CountryCode,
    pub generated_at: DateTime<Utc>,
    pub regime: HookState<RegimeRecord>,
    pub allocations: HookState<Vec<SectorAllocationRecord>>,
    pub stress: HookState<MarketStress>,
    pub market: HookState<Vec<EtfQuote>>,
    pub backtesting: HookState<BacktestingResult>,
    pub countries: HookState<Vec<CountrySummary>>,
    pub health: Option<BackendHealth>,
}

/// Error line shown above a section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Banner<'a> {
    pub section: &'static str,
    pub message: &'a str,
    /// The section shows substituted data rather than nothing.
    pub fallback: bool,
}

fn banner<'a, T>(section: &'static str, state: &'a HookState<T>) -> Option<Banner<'a>> {
    state.error.as_deref().map(|message| Banner {
        section,
        message,
        fallback: state.is_fallback(),
    })
}

impl DashboardSnapshot {
    /// Sections currently flagged with an error, in display order.
    pub fn banners(&self) -> Vec<Banner<'_>> {
        [
            banner("regime", &self.regime),
            banner("allocations", &self.allocations),
            banner("market stress", &self.stress),
            banner("market data", &self.market),
            banner("backtesting", &self.backtesting),
            banner("countries", &self.countries),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

pub struct Dashboard {
    country: CountryCode,
    regime: DataHook<RegimeResource>,
    allocations: DataHook<AllocationsResource>,
    stress: DataHook<MarketStressResource>,
    market: DataHook<MarketDataResource>,
    backtesting: DataHook<BacktestingResource>,
    countries: DataHook<CountriesResource>,
    health: HealthMonitor,
}

impl Dashboard {
    pub fn new(client: Arc<HybridClient>, request: DashboardRequest) -> Self {
        let scope = if request.live {
            Scope::country(request.country).live()
        } else {
            Scope::country(request.country)
        };
        let allocations = match request.regime {
            Some(regime) => AllocationsResource::new(scope).for_regime(regime),
            None => AllocationsResource::new(scope),
        };
        Self {
            country: request.country,
            regime: DataHook::new(RegimeResource::new(scope), client.clone()),
            allocations: DataHook::new(allocations, client.clone()),
            stress: DataHook::new(MarketStressResource { scope }, client.clone()),
            market: DataHook::new(MarketDataResource { scope }, client.clone()),
            backtesting: DataHook::new(
                BacktestingResource::new(
                    Some(request.country),
                    request.window.start,
                    request.window.end,
                ),
                client.clone(),
            ),
            countries: DataHook::new(CountriesResource, client.clone()),
            health: HealthMonitor::new(client),
        }
    }

    /// Resolves every section once, concurrently.
    pub async fn resolve_once(&self) -> DashboardSnapshot {
        tokio::join!(
            self.regime.refetch(),
            self.allocations.refetch(),
            self.stress.refetch(),
            self.market.refetch(),
            self.backtesting.refetch(),
            self.countries.refetch(),
            self.health.check_now(),
        );
        self.snapshot()
    }

    pub fn mount(&mut self, intervals: &RefreshIntervals) {
        self.regime.mount(intervals.regime);
        self.allocations.mount(intervals.allocations);
        self.stress.mount(intervals.market);
        self.market.mount(intervals.market);
        self.backtesting.mount(intervals.backtesting);
        self.countries.mount(intervals.countries);
        self.health.start(intervals.health);
    }

    /// Stops every refresh timer; open change feeds end.
    pub fn unmount(mut self) {
        self.health.stop();
        let Dashboard {
            regime,
            allocations,
            stress,
            market,
            backtesting,
            countries,
            ..
        } = self;
        regime.unmount();
        allocations.unmount();
        stress.unmount();
        market.unmount();
        backtesting.unmount();
        countries.unmount();
    }

    pub fn snapshot(&self) -> DashboardSnapshot {
        DashboardSnapshot {
            country: self.country,
            generated_at: Utc::now(),
            regime: self.regime.state(),
            allocations: self.allocations.state(),
            stress: self.stress.state(),
            market: self.market.state(),
            backtesting: self.backtesting.state(),
            countries: self.countries.state(),
            health: self.health.latest(),
        }
    }

    pub fn watch(&self) -> DashboardWatch {
        DashboardWatch {
            regime: self.regime.subscribe(),
            allocations: self.allocations.subscribe(),
            stress: self.stress.subscribe(),
            market: self.market.subscribe(),
            backtesting: self.backtesting.subscribe(),
            countries: self.countries.subscribe(),
            health: self.health.subscribe(),
        }
    }
}

/// Change feed over every section of a mounted dashboard.
pub struct DashboardWatch {
    regime: watch::Receiver<HookState<RegimeRecord>>,
    allocations: watch::Receiver<HookState<Vec<SectorAllocationRecord>>>,
    stress: watch::Receiver<HookState<MarketStress>>,
    market: watch::Receiver<HookState<Vec<EtfQuote>>>,
    backtesting: watch::Receiver<HookState<BacktestingResult>>,
    countries: watch::Receiver<HookState<Vec<CountrySummary>>>,
    health: watch::Receiver<Option<BackendHealth>>,
}

impl DashboardWatch {
    /// Name of the next section to change, or `None` once the dashboard
    /// is gone.
    pub async fn changed(&mut self) -> Option<&'static str> {
        let (section, result) = tokio::select! {
            r = self.regime.changed() => ("regime", r),
            r = self.allocations.changed() => ("allocations", r),
            r = self.stress.changed() => ("market stress", r),
            r = self.market.changed() => ("market data", r),
            r = self.backtesting.changed() => ("backtesting", r),
            r = self.countries.changed() => ("countries", r),
            r = self.health.changed() => ("health", r),
        };
        result.ok().map(|_| section)
    }
}
