//! Cache entry and snapshot types for vendor catalogs.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use garden_market_core::{Product, ProductKey, ProductsByCategory, Vendor, VendorId};
use tokio::time::Instant;
use url::Url;

/// An immutable, fully-fetched view of one vendor's catalog.
///
/// Snapshots are never edited; a refresh produces a new one with a higher
/// `generation`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogSnapshot {
    pub vendor_id: VendorId,
    pub vendor: Vendor,
    pub products: ProductsByCategory,
    /// Strictly increasing across replaces.
    pub generation: u64,
    /// Wall-clock time the data was stored.
    pub fetched_at: DateTime<Utc>,
}

impl CatalogSnapshot {
    /// Look up a product by key.
    #[must_use]
    pub fn product(&self, key: &ProductKey) -> Option<&Product> {
        self.products.find(key)
    }

    /// A value that changes with every refresh, for cache-busting images.
    #[must_use]
    pub fn refresh_key(&self) -> i64 {
        self.fetched_at.timestamp_millis()
    }

    /// Append the refresh key to an image URL so a refreshed catalog does
    /// not keep showing an image the browser cached earlier.
    ///
    /// # Errors
    ///
    /// Returns an error if `image_url` is not an absolute URL.
    pub fn cache_busted_url(&self, image_url: &str) -> Result<Url, url::ParseError> {
        let mut url = Url::parse(image_url)?;
        url.query_pairs_mut()
            .append_pair("t", &self.refresh_key().to_string());
        Ok(url)
    }
}

/// What the cache hands out on a read: the last known snapshot plus
/// whether it should be refreshed.
#[derive(Debug, Clone)]
pub struct CatalogView {
    pub snapshot: Arc<CatalogSnapshot>,
    pub is_stale: bool,
}

impl CatalogView {
    #[must_use]
    pub fn vendor(&self) -> &Vendor {
        &self.snapshot.vendor
    }

    #[must_use]
    pub fn products(&self) -> &ProductsByCategory {
        &self.snapshot.products
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.snapshot.generation
    }
}

/// Result of a successful fetch, before it is stored.
#[derive(Debug, Clone)]
pub struct FetchedCatalog {
    pub vendor: Vendor,
    pub products: ProductsByCategory,
}

/// Stored per vendor.
#[derive(Debug, Clone)]
pub(super) struct CacheEntry {
    pub(super) snapshot: Arc<CatalogSnapshot>,
    /// Monotonic clock used for TTL checks.
    pub(super) stored_at: Instant,
    pub(super) invalidated: bool,
}

/// Notifications published by the catalog cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogEvent {
    Replaced { vendor_id: VendorId, generation: u64 },
    Invalidated { vendor_id: VendorId },
    Removed { vendor_id: VendorId },
    Cleared,
}

/// Synchronous hook run on every replace, before the replace returns.
///
/// Implementations must not call back into the cache's write operations.
pub trait CatalogObserver: Send + Sync {
    fn on_replace(&self, snapshot: &Arc<CatalogSnapshot>);
}
