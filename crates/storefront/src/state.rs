//! Application context owning the catalog cache, refresh coordinator and
//! cart.

use std::sync::Arc;

use garden_market_core::VendorId;
use tracing::{info, instrument, warn};

use crate::cart::CartStore;
use crate::catalog::{CatalogCache, CatalogFetcher, CatalogView, HttpCatalogClient};
use crate::config::{CartConfig, CatalogConfig, RefreshConfig, StorefrontConfig};
use crate::error::{Result, StorefrontError};
use crate::refresh::{RefreshCoordinator, RefreshOptions};

/// Application state shared across the storefront.
///
/// This struct is cheaply cloneable via `Arc`. Constructing it wires the
/// cart to catalog replaces; [`AppState::shutdown`] tears everything down.
pub struct AppState<F = HttpCatalogClient> {
    inner: Arc<AppStateInner<F>>,
}

impl<F> Clone for AppState<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct AppStateInner<F> {
    catalog: CatalogCache,
    refresh: RefreshCoordinator<F>,
    cart: CartStore,
}

impl<F: CatalogFetcher> AppState<F> {
    /// Create a new application state.
    ///
    /// # Arguments
    ///
    /// * `config` - Storefront configuration
    /// * `fetcher` - Source of vendor catalogs
    #[must_use]
    pub fn from_config(config: &StorefrontConfig, fetcher: F) -> Self {
        Self::new(fetcher, &config.catalog, &config.refresh, &config.cart)
    }

    /// Create a new application state from the individual component
    /// settings.
    #[must_use]
    pub fn new(
        fetcher: F,
        catalog: &CatalogConfig,
        refresh: &RefreshConfig,
        cart: &CartConfig,
    ) -> Self {
        let catalog = CatalogCache::new(catalog);
        let cart = CartStore::new(catalog.clone(), cart);
        let refresh = RefreshCoordinator::new(fetcher, catalog.clone(), refresh);

        Self {
            inner: Arc::new(AppStateInner {
                catalog,
                refresh,
                cart,
            }),
        }
    }

    /// Get a reference to the catalog cache.
    #[must_use]
    pub fn catalog(&self) -> &CatalogCache {
        &self.inner.catalog
    }

    /// Get a reference to the refresh coordinator.
    #[must_use]
    pub fn refresh(&self) -> &RefreshCoordinator<F> {
        &self.inner.refresh
    }

    /// Get a reference to the cart.
    #[must_use]
    pub fn cart(&self) -> &CartStore {
        &self.inner.cart
    }

    /// Start showing a vendor: refresh it if stale and keep it fresh on the
    /// timer.
    ///
    /// When the refresh fails but an older snapshot exists, the stale
    /// snapshot is returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the refresh fails and nothing is cached for the
    /// vendor.
    #[instrument(skip(self, vendor_id), fields(vendor_id = %vendor_id))]
    pub async fn open_vendor(&self, vendor_id: &VendorId) -> Result<CatalogView> {
        if let Err(e) = self
            .inner
            .refresh
            .refresh(vendor_id, RefreshOptions::default())
            .await
        {
            if self.inner.catalog.get(vendor_id).is_none() {
                return Err(e.into());
            }
            warn!(vendor_id = %vendor_id, error = %e, "Serving stale catalog");
        }

        let view = self
            .inner
            .catalog
            .get(vendor_id)
            .ok_or_else(|| StorefrontError::NotFound(format!("vendor {vendor_id}")))?;
        self.inner.refresh.subscribe(vendor_id);
        Ok(view)
    }

    /// Stop the timer for a vendor. Cached data and cart lines are kept.
    pub fn close_vendor(&self, vendor_id: &VendorId) -> bool {
        self.inner.refresh.unsubscribe(vendor_id)
    }

    /// Cancel every refresh timer, then empty the cart and the cache.
    ///
    /// Idempotent. Fetches already in flight may still land in the cache
    /// afterwards.
    pub fn shutdown(&self) {
        self.inner.refresh.cleanup();
        self.inner.cart.clear();
        self.inner.catalog.clear();
        info!("Storefront state shut down");
    }
}
