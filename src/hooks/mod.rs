//! Data hooks: per-consumer state resolved from static tables, the remote
//! backends, or a fallback constant, in that order.

mod allocations;
mod backtesting;
mod countries;
mod health;
mod market;
mod regime;

pub use allocations::{summarize, AllocationsResource};
pub use backtesting::BacktestingResource;
pub use countries::CountriesResource;
pub use health::HealthMonitor;
pub use market::{MarketDataResource, MarketStressResource};
pub use regime::{freshness, RegimeResource};

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::backend::HybridClient;
use crate::error::FetchError;
use crate::models::CountryCode;
use crate::scheduler::Poller;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Loading,
    Resolved,
    Failed,
}

/// Where the current data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Static,
    Remote,
    Fallback,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HookState<T> {
    pub phase: Phase,
    pub data: Option<T>,
    pub loading: bool,
    pub error: Option<String>,
    pub origin: Option<Origin>,
}

impl<T> HookState<T> {
    pub fn idle() -> Self {
        Self {
            phase: Phase::Idle,
            data: None,
            loading: false,
            error: None,
            origin: None,
        }
    }

    fn resolved(data: T, origin: Origin, error: Option<String>) -> Self {
        Self {
            phase: Phase::Resolved,
            data: Some(data),
            loading: false,
            error,
            origin: Some(origin),
        }
    }

    fn failed(error: String) -> Self {
        Self {
            phase: Phase::Failed,
            data: None,
            loading: false,
            error: Some(error),
            origin: None,
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.origin == Some(Origin::Fallback)
    }
}

/// Country selector shared by the domain resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Scope {
    pub country: Option<CountryCode>,
    /// Skip the static tier even when the country has reference data.
    pub live_only: bool,
}

impl Scope {
    pub fn country(code: CountryCode) -> Self {
        Self {
            country: Some(code),
            live_only: false,
        }
    }

    pub fn live(mut self) -> Self {
        self.live_only = true;
        self
    }

    pub fn static_country(&self) -> Option<CountryCode> {
        if self.live_only {
            None
        } else {
            self.country
        }
    }

    pub fn query(&self) -> Vec<(String, String)> {
        self.country
            .map(|code| vec![("country".to_string(), code.as_str().to_string())])
            .unwrap_or_default()
    }
}

/// One domain concept resolved by a [`DataHook`].
#[async_trait]
pub trait Resource: Send + Sync + 'static {
    type Output: Clone + Send + Sync + 'static;

    fn name(&self) -> &'static str;

    /// Reference data answered without a network call.
    fn local(&self, _now: DateTime<Utc>) -> Option<Self::Output> {
        None
    }

    async fn remote(&self, client: &HybridClient) -> Result<Self::Output, FetchError>;

    /// Data substituted when the remote tier fails.
    fn fallback(&self, now: DateTime<Utc>) -> Option<Self::Output>;
}

struct HookInner<R: Resource> {
    resource: R,
    client: Arc<HybridClient>,
    state: watch::Sender<HookState<R::Output>>,
    generation: AtomicU64,
    alive: AtomicBool,
}

impl<R: Resource> HookInner<R> {
    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    async fn resolve(&self) {
        if let Some(data) = self.resource.local(Utc::now()) {
            self.state.send_if_modified(|state| {
                if !self.alive.load(Ordering::SeqCst) {
                    return false;
                }
                self.next_generation();
                *state = HookState::resolved(data, Origin::Static, None);
                true
            });
            return;
        }

        let mut generation = 0;
        let mut previous = (Phase::Idle, None);
        let started = self.state.send_if_modified(|state| {
            if !self.alive.load(Ordering::SeqCst) {
                return false;
            }
            generation = self.next_generation();
            previous = (settled_phase(state), state.error.take());
            state.phase = Phase::Loading;
            state.loading = true;
            true
        });
        if !started {
            return;
        }
        let mut guard = LoadingGuard {
            inner: self,
            generation,
            phase: previous.0,
            error: previous.1,
            armed: true,
        };

        let next = match self.resource.remote(&self.client).await {
            Ok(data) => HookState::resolved(data, Origin::Remote, None),
            Err(err) => {
                let message = err.user_message();
                match self.resource.fallback(Utc::now()) {
                    Some(data) => {
                        warn!(hook = self.resource.name(), error = %err, "serving fallback data");
                        HookState::resolved(data, Origin::Fallback, Some(message))
                    }
                    None => {
                        warn!(hook = self.resource.name(), error = %err, "no fallback available");
                        HookState::failed(message)
                    }
                }
            }
        };

        self.state.send_if_modified(|state| {
            if !self.alive.load(Ordering::SeqCst) {
                return false;
            }
            if self.generation.load(Ordering::SeqCst) != generation {
                debug!(hook = self.resource.name(), generation, "superseded result dropped");
                return false;
            }
            *state = next;
            true
        });
        guard.armed = false;
    }
}

/// Phase to fall back to if a refresh started from `state` is abandoned.
fn settled_phase<T>(state: &HookState<T>) -> Phase {
    match state.phase {
        Phase::Loading if state.data.is_some() => Phase::Resolved,
        Phase::Loading => Phase::Idle,
        phase => phase,
    }
}

/// Clears `loading` when a resolution is dropped before it applies.
struct LoadingGuard<'a, R: Resource> {
    inner: &'a HookInner<R>,
    generation: u64,
    phase: Phase,
    error: Option<String>,
    armed: bool,
}

impl<R: Resource> Drop for LoadingGuard<'_, R> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let inner = self.inner;
        let generation = self.generation;
        let phase = self.phase;
        let error = self.error.take();
        inner.state.send_if_modified(|state| {
            if !inner.alive.load(Ordering::SeqCst)
                || inner.generation.load(Ordering::SeqCst) != generation
                || !state.loading
            {
                return false;
            }
            debug!(hook = inner.resource.name(), generation, "refresh cancelled");
            state.phase = phase;
            state.loading = false;
            state.error = error;
            true
        });
    }
}

/// Owns the state of one resource for one consumer.
///
/// Dropping the hook stops its refresh timer, aborts the in-flight
/// refresh and blocks any later state write.
pub struct DataHook<R: Resource> {
    inner: Arc<HookInner<R>>,
    poller: Option<Poller>,
}

impl<R: Resource> DataHook<R> {
    pub fn new(resource: R, client: Arc<HybridClient>) -> Self {
        let (state, _) = watch::channel(HookState::idle());
        Self {
            inner: Arc::new(HookInner {
                resource,
                client,
                state,
                generation: AtomicU64::new(0),
                alive: AtomicBool::new(true),
            }),
            poller: None,
        }
    }

    /// Resolves now and then every `interval` until unmounted.
    pub fn mount(&mut self, interval: Duration) {
        let inner = self.inner.clone();
        self.poller = Some(Poller::spawn(
            self.inner.resource.name(),
            interval,
            move || {
                let inner = inner.clone();
                async move { inner.resolve().await }
            },
        ));
    }

    pub async fn refetch(&self) {
        self.inner.resolve().await;
    }

    pub fn state(&self) -> HookState<R::Output> {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<HookState<R::Output>> {
        self.inner.state.subscribe()
    }

    pub fn unmount(self) {}
}

impl<R: Resource> Drop for DataHook<R> {
    fn drop(&mut self) {
        self.inner.alive.store(false, Ordering::SeqCst);
        self.poller.take();
    }
}
