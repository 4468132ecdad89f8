//! Refresh coordinator.
//!
//! The single authority for *when* a vendor's catalog is re-fetched:
//!
//! - on demand, via [`RefreshCoordinator::refresh`];
//! - on an external change signal, via [`RefreshCoordinator::notify_changed`];
//! - on a timer, for vendors registered with [`RefreshCoordinator::subscribe`].
//!
//! Concurrent requests for the same vendor share one fetch. The fetch runs
//! in its own task and its result fans out to every waiter through a
//! `watch` channel held in the pending registry. The coordinator lock is
//! never held across an `.await`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use garden_market_core::VendorId;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, info, instrument, warn};

use crate::catalog::{CatalogCache, CatalogFetcher, FetchError};
use crate::config::RefreshConfig;
use crate::error::add_breadcrumb;

/// Shortest timer cadence accepted.
const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Options for a single refresh request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshOptions {
    /// Fetch even if the cached entry is still fresh.
    pub force: bool,
}

impl RefreshOptions {
    pub const FORCE: Self = Self { force: true };
}

/// How a successful refresh request was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The cached entry was fresh; nothing was fetched.
    Fresh,
    /// A fetch completed and stored this generation.
    Refreshed { generation: u64 },
}

/// Errors delivered to refresh waiters.
#[derive(Debug, Clone, Error)]
pub enum RefreshError {
    /// The fetch failed. The previous snapshot and its staleness are kept.
    #[error("Refresh of vendor {vendor_id} failed: {source}")]
    Failed {
        vendor_id: VendorId,
        source: Arc<FetchError>,
    },

    /// The fetch task ended without reporting a result.
    #[error("Refresh of vendor {vendor_id} was abandoned")]
    Abandoned { vendor_id: VendorId },
}

impl RefreshError {
    #[must_use]
    pub const fn vendor_id(&self) -> &VendorId {
        match self {
            Self::Failed { vendor_id, .. } | Self::Abandoned { vendor_id } => vendor_id,
        }
    }
}

/// Per-vendor timer state. Unsubscribed vendors have none.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Idle,
    Refreshing,
    /// The last fetch failed; the timer keeps running.
    Failed,
}

type FetchResult = Result<u64, Arc<FetchError>>;

/// A pending fetch. Resolves exactly once.
struct InFlight {
    attempt: u64,
    done: watch::Receiver<Option<FetchResult>>,
}

struct Subscription {
    timer: JoinHandle<()>,
    state: SubscriptionState,
}

#[derive(Default)]
struct CoordinatorState {
    in_flight: HashMap<VendorId, InFlight>,
    subscriptions: HashMap<VendorId, Subscription>,
    next_attempt: u64,
}

/// Decision taken under the coordinator lock.
enum Start {
    Fresh,
    Wait(watch::Receiver<Option<FetchResult>>),
    /// A timer tick for a vendor that is no longer subscribed.
    Unsubscribed,
}

// =============================================================================
// RefreshCoordinator
// =============================================================================

/// Decides when catalog entries are re-fetched and de-duplicates fetches.
pub struct RefreshCoordinator<F> {
    inner: Arc<CoordinatorInner<F>>,
}

impl<F> Clone for RefreshCoordinator<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct CoordinatorInner<F> {
    fetcher: F,
    catalog: CatalogCache,
    interval: Duration,
    state: Mutex<CoordinatorState>,
    fetches: AtomicU64,
}

impl<F: CatalogFetcher> RefreshCoordinator<F> {
    /// Create a coordinator that stores fetched catalogs in `catalog`.
    #[must_use]
    pub fn new(fetcher: F, catalog: CatalogCache, config: &RefreshConfig) -> Self {
        Self {
            inner: Arc::new(CoordinatorInner {
                fetcher,
                catalog,
                interval: config.interval.max(MIN_INTERVAL),
                state: Mutex::new(CoordinatorState::default()),
                fetches: AtomicU64::new(0),
            }),
        }
    }

    #[must_use]
    pub fn catalog(&self) -> &CatalogCache {
        &self.inner.catalog
    }

    /// Timer cadence for subscribed vendors.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.inner.interval
    }

    /// Refresh `vendor_id` if needed.
    ///
    /// Joins a fetch already in flight for the vendor. Otherwise returns
    /// [`RefreshOutcome::Fresh`] when the entry is fresh and `force` is not
    /// set, or starts a fetch and waits for it.
    ///
    /// # Errors
    ///
    /// Returns [`RefreshError::Failed`] if the fetch fails, and
    /// [`RefreshError::Abandoned`] if the fetch task dies without a result.
    #[instrument(skip(self, vendor_id, options), fields(vendor_id = %vendor_id, force = options.force))]
    pub async fn refresh(
        &self,
        vendor_id: &VendorId,
        options: RefreshOptions,
    ) -> Result<RefreshOutcome, RefreshError> {
        match self.inner.start_or_join(vendor_id, options.force, false) {
            Start::Wait(done) => wait(vendor_id, done).await,
            Start::Fresh | Start::Unsubscribed => Ok(RefreshOutcome::Fresh),
        }
    }

    /// Handle an external "this vendor changed" signal: mark the entry
    /// stale, then refresh it.
    ///
    /// # Errors
    ///
    /// Same as [`RefreshCoordinator::refresh`].
    #[instrument(skip(self, vendor_id), fields(vendor_id = %vendor_id))]
    pub async fn notify_changed(
        &self,
        vendor_id: &VendorId,
    ) -> Result<RefreshOutcome, RefreshError> {
        self.inner.catalog.invalidate(vendor_id);
        self.refresh(vendor_id, RefreshOptions::default()).await
    }

    /// Start the periodic timer for `vendor_id`. Returns `false` if it was
    /// already subscribed.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn subscribe(&self, vendor_id: &VendorId) -> bool {
        let mut state = self.inner.lock();
        if state.subscriptions.contains_key(vendor_id) {
            debug!(vendor_id = %vendor_id, "Already subscribed");
            return false;
        }

        let timer = tokio::spawn(run_timer(
            Arc::downgrade(&self.inner),
            vendor_id.clone(),
            self.inner.interval,
        ));
        let initial = if state.in_flight.contains_key(vendor_id) {
            SubscriptionState::Refreshing
        } else {
            SubscriptionState::Idle
        };
        state.subscriptions.insert(
            vendor_id.clone(),
            Subscription {
                timer,
                state: initial,
            },
        );

        info!(
            vendor_id = %vendor_id,
            interval_secs = self.inner.interval.as_secs(),
            "Subscribed to catalog refresh"
        );
        true
    }

    /// Stop the timer for `vendor_id`. Returns whether it was subscribed.
    pub fn unsubscribe(&self, vendor_id: &VendorId) -> bool {
        let removed = self.inner.lock().subscriptions.remove(vendor_id);
        removed.is_some_and(|subscription| {
            subscription.timer.abort();
            info!(vendor_id = %vendor_id, "Unsubscribed from catalog refresh");
            true
        })
    }

    /// Cancel every timer and drop every subscription.
    ///
    /// Idempotent. Fetches already in flight run to completion and update
    /// the cache; no scheduled fetch starts after this returns.
    pub fn cleanup(&self) {
        let drained: Vec<(VendorId, Subscription)> =
            self.inner.lock().subscriptions.drain().collect();

        for (_, subscription) in &drained {
            subscription.timer.abort();
        }
        if !drained.is_empty() {
            info!(subscriptions = drained.len(), "Refresh timers cancelled");
        }
    }

    /// `None` when `vendor_id` is not subscribed.
    #[must_use]
    pub fn subscription_state(&self, vendor_id: &VendorId) -> Option<SubscriptionState> {
        self.inner
            .lock()
            .subscriptions
            .get(vendor_id)
            .map(|subscription| subscription.state)
    }

    /// Vendors with a running timer.
    #[must_use]
    pub fn subscribed(&self) -> Vec<VendorId> {
        self.inner.lock().subscriptions.keys().cloned().collect()
    }

    /// Whether a fetch for `vendor_id` is currently in flight.
    #[must_use]
    pub fn is_refreshing(&self, vendor_id: &VendorId) -> bool {
        self.inner.lock().in_flight.contains_key(vendor_id)
    }

    /// Number of fetches started since creation.
    #[must_use]
    pub fn fetch_count(&self) -> u64 {
        self.inner.fetches.load(Ordering::Acquire)
    }
}

impl<F: CatalogFetcher> CoordinatorInner<F> {
    fn lock(&self) -> MutexGuard<'_, CoordinatorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Join the in-flight fetch, report the entry fresh, or start a fetch.
    ///
    /// `scheduled` requests come from a timer and are dropped once the
    /// vendor is unsubscribed; the check happens under the same lock that
    /// `cleanup` takes.
    fn start_or_join(self: &Arc<Self>, vendor_id: &VendorId, force: bool, scheduled: bool) -> Start {
        let mut state = self.lock();

        if scheduled && !state.subscriptions.contains_key(vendor_id) {
            return Start::Unsubscribed;
        }

        if let Some(in_flight) = state.in_flight.get(vendor_id) {
            debug!(vendor_id = %vendor_id, attempt = in_flight.attempt, "Joining in-flight refresh");
            return Start::Wait(in_flight.done.clone());
        }

        if !force && !self.catalog.is_stale(vendor_id) {
            debug!(vendor_id = %vendor_id, "Catalog fresh, skipping refresh");
            return Start::Fresh;
        }

        state.next_attempt += 1;
        let attempt = state.next_attempt;
        let (tx, rx) = watch::channel(None);
        state.in_flight.insert(
            vendor_id.clone(),
            InFlight {
                attempt,
                done: rx.clone(),
            },
        );
        if let Some(subscription) = state.subscriptions.get_mut(vendor_id) {
            subscription.state = SubscriptionState::Refreshing;
        }
        let fetches = self.fetches.fetch_add(1, Ordering::AcqRel) + 1;

        tokio::spawn(run_fetch(Arc::clone(self), vendor_id.clone(), attempt, tx));
        drop(state);

        info!(vendor_id = %vendor_id, attempt, fetches, scheduled, "Catalog refresh started");
        Start::Wait(rx)
    }

    async fn fetch_and_store(&self, vendor_id: &VendorId) -> FetchResult {
        match self.fetcher.fetch(vendor_id).await {
            Ok(fetched) => {
                let snapshot = self
                    .catalog
                    .replace(vendor_id, fetched.vendor, fetched.products);
                Ok(snapshot.generation)
            }
            Err(e) => {
                warn!(
                    vendor_id = %vendor_id,
                    error = %e,
                    "Catalog refresh failed, keeping last known data"
                );
                add_breadcrumb(
                    "refresh",
                    "Catalog refresh failed",
                    Some(&[("vendor_id", vendor_id.as_str())]),
                );
                Err(Arc::new(e))
            }
        }
    }

    /// Clear the in-flight marker and record the outcome on the
    /// subscription.
    fn finish(&self, vendor_id: &VendorId, attempt: u64, succeeded: bool) {
        let mut state = self.lock();
        if state
            .in_flight
            .get(vendor_id)
            .is_some_and(|in_flight| in_flight.attempt == attempt)
        {
            state.in_flight.remove(vendor_id);
        }
        if let Some(subscription) = state.subscriptions.get_mut(vendor_id) {
            subscription.state = if succeeded {
                SubscriptionState::Idle
            } else {
                SubscriptionState::Failed
            };
        }
    }
}

impl<F> Drop for CoordinatorInner<F> {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        for subscription in state.subscriptions.values() {
            subscription.timer.abort();
        }
    }
}

/// Clears the in-flight marker when the fetch task ends, including by
/// panic.
struct InFlightGuard<F: CatalogFetcher> {
    inner: Arc<CoordinatorInner<F>>,
    vendor_id: VendorId,
    attempt: u64,
    succeeded: bool,
}

impl<F: CatalogFetcher> Drop for InFlightGuard<F> {
    fn drop(&mut self) {
        self.inner
            .finish(&self.vendor_id, self.attempt, self.succeeded);
    }
}

async fn run_fetch<F: CatalogFetcher>(
    inner: Arc<CoordinatorInner<F>>,
    vendor_id: VendorId,
    attempt: u64,
    done: watch::Sender<Option<FetchResult>>,
) {
    let mut guard = InFlightGuard {
        inner,
        vendor_id,
        attempt,
        succeeded: false,
    };

    let result = guard.inner.fetch_and_store(&guard.vendor_id).await;
    guard.succeeded = result.is_ok();

    // Marker goes first so a waiter that retries starts a new attempt
    drop(guard);
    done.send_replace(Some(result));
}

async fn wait(
    vendor_id: &VendorId,
    mut done: watch::Receiver<Option<FetchResult>>,
) -> Result<RefreshOutcome, RefreshError> {
    let result = match done.wait_for(Option::is_some).await {
        Ok(value) => value.clone(),
        Err(_) => None,
    };

    match result {
        Some(Ok(generation)) => Ok(RefreshOutcome::Refreshed { generation }),
        Some(Err(source)) => Err(RefreshError::Failed {
            vendor_id: vendor_id.clone(),
            source,
        }),
        None => Err(RefreshError::Abandoned {
            vendor_id: vendor_id.clone(),
        }),
    }
}

async fn run_timer<F: CatalogFetcher>(
    inner: Weak<CoordinatorInner<F>>,
    vendor_id: VendorId,
    period: Duration,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;

        let Some(coordinator) = inner.upgrade() else {
            break;
        };
        let done = match coordinator.start_or_join(&vendor_id, false, true) {
            Start::Unsubscribed => break,
            Start::Fresh => continue,
            Start::Wait(done) => done,
        };
        drop(coordinator);

        if let Err(e) = wait(&vendor_id, done).await {
            debug!(vendor_id = %vendor_id, error = %e, "Scheduled refresh failed");
        }
    }

    debug!(vendor_id = %vendor_id, "Refresh timer stopped");
}
