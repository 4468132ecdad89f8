//! Fixtures shared by unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use garden_market_core::{Category, Price, Product, ProductsByCategory, Vendor, VendorId};

use crate::catalog::{CatalogFetcher, FetchError, FetchedCatalog};

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

#[allow(clippy::unwrap_used)]
pub fn product(name: &str, cents: i64, in_stock: bool) -> Product {
    Product {
        name: name.to_string(),
        description: String::new(),
        category: Category::Flowers,
        price: Price::from_cents(cents).unwrap(),
        in_stock,
        image_url: String::new(),
    }
}

/// In-memory fetcher with scripted failures and an optional delay.
#[derive(Clone, Default)]
pub struct FakeFetcher {
    inner: Arc<FakeFetcherInner>,
}

#[derive(Default)]
struct FakeFetcherInner {
    calls: AtomicUsize,
    delay: Duration,
    catalogs: Mutex<HashMap<VendorId, ProductsByCategory>>,
    failures: Mutex<VecDeque<FetchError>>,
}

#[allow(clippy::unwrap_used)]
impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep for `delay` inside every fetch.
    pub fn with_delay(self, delay: Duration) -> Self {
        Self {
            inner: Arc::new(FakeFetcherInner {
                delay,
                ..FakeFetcherInner::default()
            }),
        }
    }

    pub fn set_products(&self, vendor_id: &VendorId, products: Vec<Product>) {
        self.inner
            .catalogs
            .lock()
            .unwrap()
            .insert(vendor_id.clone(), products.into_iter().collect());
    }

    /// Fail the next fetch with `error`.
    pub fn fail_next(&self, error: FetchError) {
        self.inner.failures.lock().unwrap().push_back(error);
    }

    pub fn calls(&self) -> usize {
        self.inner.calls.load(Ordering::SeqCst)
    }
}

#[allow(clippy::unwrap_used)]
impl CatalogFetcher for FakeFetcher {
    async fn fetch(&self, vendor_id: &VendorId) -> Result<FetchedCatalog, FetchError> {
        self.inner.calls.fetch_add(1, Ordering::SeqCst);
        if !self.inner.delay.is_zero() {
            tokio::time::sleep(self.inner.delay).await;
        }

        if let Some(error) = self.inner.failures.lock().unwrap().pop_front() {
            return Err(error);
        }

        let products = self.inner.catalogs.lock().unwrap().get(vendor_id).cloned();
        products
            .map(|products| FetchedCatalog {
                vendor: vendor(vendor_id.as_str()),
                products,
            })
            .ok_or_else(|| FetchError::NotFound(vendor_id.to_string()))
    }
}
