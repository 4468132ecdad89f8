//! Vendor catalog cache and the fetch collaborator that fills it.
//!
//! # Architecture
//!
//! - [`CatalogCache`] keeps the last fetched [`CatalogSnapshot`] per vendor in
//!   a bounded `moka` cache. Entries never expire on their own: staleness is
//!   computed on read (TTL or explicit invalidation) so consumers can keep
//!   showing last-known-good data while a refresh is running.
//! - The cache never performs network I/O. Fetching is delegated to a
//!   [`CatalogFetcher`]; [`HttpCatalogClient`] is the production one.
//! - Every [`CatalogCache::replace`] bumps a process-wide generation counter,
//!   runs registered [`CatalogObserver`]s synchronously and broadcasts a
//!   [`CatalogEvent`].

mod cache;
mod client;
mod conversions;

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use chrono::Utc;
use garden_market_core::{ProductsByCategory, Vendor, VendorId};
use moka::sync::Cache;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::config::CatalogConfig;

pub use cache::{CatalogEvent, CatalogObserver, CatalogSnapshot, CatalogView, FetchedCatalog};
pub use client::HttpCatalogClient;

use cache::CacheEntry;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Errors that can occur when fetching a vendor catalog.
#[derive(Debug, Error)]
pub enum FetchError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The catalog API answered with a non-success status.
    #[error("Catalog API returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Vendor not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rate limited by the catalog API.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// The configured base URL cannot have path segments appended.
    #[error("Invalid catalog base URL: {0}")]
    InvalidBaseUrl(String),

    /// The backend is unreachable for some other reason.
    #[error("Catalog unavailable: {0}")]
    Unavailable(String),
}

/// Source of vendor catalogs.
///
/// Timeouts, transport and error mapping belong to the implementation; the
/// refresh coordinator imposes none.
pub trait CatalogFetcher: Send + Sync + 'static {
    /// Fetch the vendor record and its full product collection.
    fn fetch(
        &self,
        vendor_id: &VendorId,
    ) -> impl Future<Output = Result<FetchedCatalog, FetchError>> + Send;
}

// =============================================================================
// CatalogCache
// =============================================================================

/// Last known catalog per vendor, with staleness tracking.
#[derive(Clone)]
pub struct CatalogCache {
    inner: Arc<CatalogCacheInner>,
}

struct CatalogCacheInner {
    entries: Cache<VendorId, CacheEntry>,
    /// Serializes writes so a replace and an invalidate never interleave.
    write_lock: Mutex<()>,
    ttl: Duration,
    generation: AtomicU64,
    observers: RwLock<Vec<Arc<dyn CatalogObserver>>>,
    events: broadcast::Sender<CatalogEvent>,
}

impl CatalogCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new(config: &CatalogConfig) -> Self {
        let entries = Cache::builder().max_capacity(config.max_vendors).build();
        let (events, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            inner: Arc::new(CatalogCacheInner {
                entries,
                write_lock: Mutex::new(()),
                ttl: config.ttl,
                generation: AtomicU64::new(0),
                observers: RwLock::new(Vec::new()),
                events,
            }),
        }
    }

    /// Staleness TTL.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.inner.ttl
    }

    /// Highest generation handed out so far (0 before the first replace).
    #[must_use]
    pub fn current_generation(&self) -> u64 {
        self.inner.generation.load(Ordering::Acquire)
    }

    /// The last known snapshot for `vendor_id`, or `None` if it was never
    /// fetched.
    #[must_use]
    pub fn get(&self, vendor_id: &VendorId) -> Option<CatalogView> {
        let entry = self.inner.entries.get(vendor_id)?;
        let is_stale = self.entry_is_stale(&entry);
        debug!(vendor_id = %vendor_id, generation = entry.snapshot.generation, is_stale, "Catalog cache hit");
        Some(CatalogView {
            snapshot: entry.snapshot,
            is_stale,
        })
    }

    /// Whether `vendor_id` needs a refresh. Unknown vendors are stale.
    #[must_use]
    pub fn is_stale(&self, vendor_id: &VendorId) -> bool {
        self.inner
            .entries
            .get(vendor_id)
            .is_none_or(|entry| self.entry_is_stale(&entry))
    }

    fn entry_is_stale(&self, entry: &CacheEntry) -> bool {
        entry.invalidated || entry.stored_at.elapsed() > self.inner.ttl
    }

    /// Mark an entry stale without dropping its data.
    ///
    /// Returns `false` if nothing is cached for `vendor_id`.
    pub fn invalidate(&self, vendor_id: &VendorId) -> bool {
        let guard = self.lock_writes();
        let Some(mut entry) = self.inner.entries.get(vendor_id) else {
            return false;
        };
        entry.invalidated = true;
        self.inner.entries.insert(vendor_id.clone(), entry);
        drop(guard);

        debug!(vendor_id = %vendor_id, "Catalog entry invalidated");
        self.publish(CatalogEvent::Invalidated {
            vendor_id: vendor_id.clone(),
        });
        true
    }

    /// Swap in a freshly fetched catalog.
    ///
    /// Bumps the generation, clears staleness, then runs every observer
    /// before returning. Observers see replaces in generation order.
    pub fn replace(
        &self,
        vendor_id: &VendorId,
        vendor: Vendor,
        products: ProductsByCategory,
    ) -> Arc<CatalogSnapshot> {
        let guard = self.lock_writes();

        let generation = self.inner.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let snapshot = Arc::new(CatalogSnapshot {
            vendor_id: vendor_id.clone(),
            vendor,
            products,
            generation,
            fetched_at: Utc::now(),
        });
        self.inner.entries.insert(
            vendor_id.clone(),
            CacheEntry {
                snapshot: Arc::clone(&snapshot),
                stored_at: Instant::now(),
                invalidated: false,
            },
        );

        info!(
            vendor_id = %vendor_id,
            generation,
            products = snapshot.products.len(),
            "Catalog replaced"
        );

        let observers = self
            .inner
            .observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for observer in &observers {
            observer.on_replace(&snapshot);
        }
        drop(guard);

        self.publish(CatalogEvent::Replaced {
            vendor_id: vendor_id.clone(),
            generation,
        });
        snapshot
    }

    /// Drop the entry for `vendor_id`. Returns whether one existed.
    pub fn remove(&self, vendor_id: &VendorId) -> bool {
        let guard = self.lock_writes();
        let existed = self.inner.entries.remove(vendor_id).is_some();
        drop(guard);

        if existed {
            self.publish(CatalogEvent::Removed {
                vendor_id: vendor_id.clone(),
            });
        }
        existed
    }

    /// Drop every entry. Generations keep increasing afterwards.
    pub fn clear(&self) {
        let guard = self.lock_writes();
        self.inner.entries.invalidate_all();
        drop(guard);

        info!("Catalog cache cleared");
        self.publish(CatalogEvent::Cleared);
    }

    /// Register a hook that runs synchronously on every replace.
    pub fn observe(&self, observer: Arc<dyn CatalogObserver>) {
        self.inner
            .observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }

    /// Subscribe to cache events.
    ///
    /// The receiver must be polled to avoid lagging.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<CatalogEvent> {
        self.inner.events.subscribe()
    }

    fn lock_writes(&self) -> std::sync::MutexGuard<'_, ()> {
        self.inner
            .write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, event: CatalogEvent) {
        if self.inner.events.send(event).is_err() {
            // No subscribers - this is fine
            debug!("No receivers for catalog event");
        }
    }
}
