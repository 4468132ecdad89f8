//! Integration tests for Garden Market.
//!
//! Cross-component scenarios for the catalog cache, refresh coordinator and
//! cart, driven through [`AppState`] with an in-memory [`ScriptedFetcher`].
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p garden-market-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `cart_scenarios` - Cart behaviour against a live catalog
//! - `refresh_scenarios` - Refresh de-duplication, timers and failures
//! - `http_catalog` - End-to-end against a mocked catalog API

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use garden_market_core::{Category, Price, Product, Vendor, VendorId};
use garden_market_storefront::AppState;
use garden_market_storefront::cart::VendorPolicy;
use garden_market_storefront::catalog::{CatalogFetcher, FetchError, FetchedCatalog};
use garden_market_storefront::config::{CartConfig, CatalogConfig, RefreshConfig};

// =============================================================================
// Fixtures
// =============================================================================

/// A vendor with no delivery.
#[must_use]
pub fn vendor(id: &str) -> Vendor {
    Vendor {
        id: VendorId::new(id),
        name: format!("Garden {id}"),
        owner_name: "Owner".to_string(),
        address: None,
        phone_number: None,
        email_address: None,
        operation_hours: None,
        has_delivery: false,
        delivery_cost: None,
        island_wide_delivery_cost: None,
        delivery_area: None,
        profile_picture_url: None,
    }
}

/// A product priced in cents.
#[must_use]
pub fn product(name: &str, category: Category, cents: u32, in_stock: bool) -> Product {
    Product {
        name: name.to_string(),
        description: format!("{name} from the garden"),
        category,
        price: Price::from_cents(i64::from(cents)).unwrap_or(Price::ZERO),
        in_stock,
        image_url: format!("https://img.example/{}.jpg", name.to_lowercase()),
    }
}

// =============================================================================
// ScriptedFetcher
// =============================================================================

/// In-memory catalog backend.
///
/// Clones share state, so a test can keep a handle after moving one into
/// [`AppState`].
#[derive(Clone, Default)]
pub struct ScriptedFetcher {
    inner: Arc<ScriptedFetcherInner>,
}

#[derive(Default)]
struct ScriptedFetcherInner {
    calls: AtomicUsize,
    delay: Mutex<Duration>,
    catalogs: Mutex<HashMap<VendorId, Vec<Product>>>,
    failures: Mutex<VecDeque<FetchError>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ScriptedFetcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every fetch take `delay` (on the Tokio clock).
    pub fn set_delay(&self, delay: Duration) {
        *lock(&self.inner.delay) = delay;
    }

    /// Replace the vendor's product list on the backend.
    pub fn set_products(&self, vendor_id: &VendorId, products: Vec<Product>) {
        lock(&self.inner.catalogs).insert(vendor_id.clone(), products);
    }

    /// Remove one product from the vendor's list on the backend.
    pub fn remove_product(&self, vendor_id: &VendorId, name: &str) {
        if let Some(products) = lock(&self.inner.catalogs).get_mut(vendor_id) {
            products.retain(|p| p.name != name);
        }
    }

    /// Set the stock flag of one product on the backend.
    pub fn set_in_stock(&self, vendor_id: &VendorId, name: &str, in_stock: bool) {
        if let Some(products) = lock(&self.inner.catalogs).get_mut(vendor_id) {
            for product in products.iter_mut().filter(|p| p.name == name) {
                product.in_stock = in_stock;
            }
        }
    }

    /// Fail the next fetch with `error`.
    pub fn fail_next(&self, error: FetchError) {
        lock(&self.inner.failures).push_back(error);
    }

    /// Number of fetches received.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.inner.calls.load(Ordering::SeqCst)
    }
}

impl CatalogFetcher for ScriptedFetcher {
    async fn fetch(&self, vendor_id: &VendorId) -> Result<FetchedCatalog, FetchError> {
        self.inner.calls.fetch_add(1, Ordering::SeqCst);

        let delay = *lock(&self.inner.delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let failure = lock(&self.inner.failures).pop_front();
        if let Some(error) = failure {
            return Err(error);
        }

        let products = lock(&self.inner.catalogs).get(vendor_id).cloned();
        products
            .map(|products| FetchedCatalog {
                vendor: vendor(vendor_id.as_str()),
                products: products.into_iter().collect(),
            })
            .ok_or_else(|| FetchError::NotFound(format!("vendor {vendor_id}")))
    }
}

// =============================================================================
// TestContext
// =============================================================================

/// Application state wired to a [`ScriptedFetcher`].
pub struct TestContext {
    pub state: AppState<ScriptedFetcher>,
    pub fetcher: ScriptedFetcher,
}

impl TestContext {
    /// Default settings: 300 s TTL, 60 s timer, `Reject` vendor policy.
    #[must_use]
    pub fn new() -> Self {
        Self::with_policy(VendorPolicy::Reject)
    }

    #[must_use]
    pub fn with_policy(vendor_policy: VendorPolicy) -> Self {
        let fetcher = ScriptedFetcher::new();
        let state = AppState::new(
            fetcher.clone(),
            &CatalogConfig::default(),
            &RefreshConfig::default(),
            &CartConfig { vendor_policy },
        );
        Self { state, fetcher }
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}
