//! Cart store.
//!
//! Holds the shopper's selected lines and derives item count and subtotal
//! from them. Every mutation is checked against the catalog cache's current
//! view of availability, and the store registers itself as a
//! [`CatalogObserver`] so lines are re-checked whenever a vendor's catalog
//! is replaced.
//!
//! Mutations are synchronous and run entirely under one lock; each one
//! publishes the new [`CartSnapshot`] on a `watch` channel and also
//! returns it.

mod line;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use garden_market_core::{LineIssue, Product, ProductKey, Vendor, VendorId};
use rust_decimal::Decimal;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::catalog::{CatalogCache, CatalogObserver, CatalogSnapshot};
use crate::config::CartConfig;
use crate::error::add_breadcrumb;

pub use line::{CartLine, CartSnapshot, PriceSource, PricedLine};

/// Errors returned by cart mutations. A rejected mutation changes nothing.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CartError {
    #[error("Invalid quantity: {0} (must be a positive integer)")]
    InvalidQuantity(i64),

    #[error("{product} is out of stock")]
    OutOfStock { product: ProductKey },

    #[error("Cart already holds items from {active}; cannot add items from {requested}")]
    VendorMismatch {
        active: VendorId,
        requested: VendorId,
    },
}

/// What happens when an item from a second vendor is added.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum VendorPolicy {
    /// Refuse the add with [`CartError::VendorMismatch`].
    #[default]
    Reject,
    /// Empty the cart, then add the item.
    Replace,
}

impl std::fmt::Display for VendorPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reject => write!(f, "reject"),
            Self::Replace => write!(f, "replace"),
        }
    }
}

impl std::str::FromStr for VendorPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "reject" => Ok(Self::Reject),
            "replace" => Ok(Self::Replace),
            _ => Err(format!("invalid vendor policy: {s} (expected reject or replace)")),
        }
    }
}

// =============================================================================
// CartStore
// =============================================================================

/// The shopper's cart.
#[derive(Clone)]
pub struct CartStore {
    inner: Arc<CartStoreInner>,
}

struct CartStoreInner {
    catalog: CatalogCache,
    policy: VendorPolicy,
    state: Mutex<CartState>,
    snapshots: watch::Sender<Arc<CartSnapshot>>,
}

#[derive(Default)]
struct CartState {
    lines: Vec<CartLine>,
    /// Last catalog generation reconciled, per vendor.
    reconciled: HashMap<VendorId, u64>,
}

/// Availability of a product according to the cached catalog.
enum Availability {
    /// The vendor's catalog has never been fetched.
    Unknown,
    Available,
    Unavailable,
}

impl CartStore {
    /// Create an empty cart and register it for catalog replaces.
    #[must_use]
    pub fn new(catalog: CatalogCache, config: &CartConfig) -> Self {
        let (snapshots, _rx) = watch::channel(CartSnapshot::empty());
        let inner = Arc::new(CartStoreInner {
            catalog,
            policy: config.vendor_policy,
            state: Mutex::new(CartState::default()),
            snapshots,
        });

        inner.catalog.observe(Arc::new(Reconciler {
            cart: Arc::downgrade(&inner),
        }));

        Self { inner }
    }

    #[must_use]
    pub fn policy(&self) -> VendorPolicy {
        self.inner.policy
    }

    /// Add `quantity` of `product` from `vendor`.
    ///
    /// Merges into the existing line for the same product, otherwise
    /// appends a new line that captures the current price.
    ///
    /// # Errors
    ///
    /// - [`CartError::InvalidQuantity`] if `quantity` is below 1 or the
    ///   merged quantity overflows.
    /// - [`CartError::OutOfStock`] if the product, or the cached catalog's
    ///   copy of it, is unavailable.
    /// - [`CartError::VendorMismatch`] if the cart holds another vendor's
    ///   items and the policy is [`VendorPolicy::Reject`].
    pub fn add_to_cart(
        &self,
        product: &Product,
        vendor: &Vendor,
        quantity: i64,
    ) -> Result<Arc<CartSnapshot>, CartError> {
        let key = product.key();
        let result = self.try_add(product, vendor, &key, quantity);

        match &result {
            Ok(snapshot) => {
                info!(
                    vendor_id = %vendor.id,
                    product = %key,
                    quantity,
                    item_count = snapshot.item_count,
                    "Added to cart"
                );
                add_breadcrumb(
                    "cart",
                    "Added to cart",
                    Some(&[
                        ("vendor_id", vendor.id.as_str()),
                        ("product", key.to_string().as_str()),
                        ("quantity", quantity.to_string().as_str()),
                    ]),
                );
            }
            Err(e) => warn!(vendor_id = %vendor.id, product = %key, error = %e, "Add to cart rejected"),
        }
        result
    }

    fn try_add(
        &self,
        product: &Product,
        vendor: &Vendor,
        key: &ProductKey,
        quantity: i64,
    ) -> Result<Arc<CartSnapshot>, CartError> {
        let requested = quantity;
        let quantity = positive_quantity(quantity)?;
        let mut state = self.inner.lock();

        if !product.in_stock
            || matches!(
                self.inner.availability(&vendor.id, key),
                Availability::Unavailable
            )
        {
            return Err(CartError::OutOfStock {
                product: key.clone(),
            });
        }

        let mut lines = state.lines.clone();
        let mut replaced = None;
        if let Some(active) = lines.first().map(|line| line.vendor_id.clone())
            && active != vendor.id
        {
            match self.inner.policy {
                VendorPolicy::Reject => {
                    return Err(CartError::VendorMismatch {
                        active,
                        requested: vendor.id.clone(),
                    });
                }
                VendorPolicy::Replace => {
                    lines.clear();
                    replaced = Some(active);
                }
            }
        }

        if let Some(line) = lines
            .iter_mut()
            .find(|line| line.matches(&vendor.id, key))
        {
            line.quantity = line
                .quantity
                .checked_add(quantity)
                .ok_or(CartError::InvalidQuantity(requested))?;
        } else {
            lines.push(CartLine {
                vendor_id: vendor.id.clone(),
                key: key.clone(),
                quantity,
                captured_price: product.price,
                issue: None,
            });
        }

        let snapshot = self
            .inner
            .price_lines(&lines)
            .ok_or(CartError::InvalidQuantity(requested))?;

        if let Some(active) = replaced {
            info!(from = %active, to = %vendor.id, "Replaced cart contents with new vendor");
        }
        state.lines = lines;
        Ok(self.inner.send(snapshot))
    }

    /// Set a line's quantity. Zero or less removes the line; a missing line
    /// is left alone.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::OutOfStock`] when increasing the quantity of a
    /// product the cached catalog reports as unavailable, and
    /// [`CartError::InvalidQuantity`] when the quantity or the resulting
    /// totals do not fit.
    pub fn update_quantity(
        &self,
        vendor_id: &VendorId,
        key: &ProductKey,
        quantity: i64,
    ) -> Result<Arc<CartSnapshot>, CartError> {
        if quantity <= 0 {
            return Ok(self.remove_from_cart(vendor_id, key));
        }
        let requested = quantity;
        let quantity = positive_quantity(quantity)?;

        let mut state = self.inner.lock();
        let Some((current, flagged)) = state
            .lines
            .iter()
            .find(|line| line.matches(vendor_id, key))
            .map(|line| (line.quantity, line.needs_attention()))
        else {
            debug!(vendor_id = %vendor_id, product = %key, "Quantity update for missing line ignored");
            return Ok(Arc::new(self.inner.build_snapshot(&state.lines)));
        };

        if quantity > current {
            let unavailable = match self.inner.availability(vendor_id, key) {
                Availability::Unavailable => true,
                Availability::Available => false,
                Availability::Unknown => flagged,
            };
            if unavailable {
                warn!(vendor_id = %vendor_id, product = %key, "Quantity increase rejected");
                return Err(CartError::OutOfStock {
                    product: key.clone(),
                });
            }
        }

        let mut lines = state.lines.clone();
        for line in lines
            .iter_mut()
            .filter(|line| line.matches(vendor_id, key))
        {
            line.quantity = quantity;
        }
        let snapshot = self
            .inner
            .price_lines(&lines)
            .ok_or(CartError::InvalidQuantity(requested))?;

        state.lines = lines;
        add_breadcrumb(
            "cart",
            "Updated quantity",
            Some(&[
                ("vendor_id", vendor_id.as_str()),
                ("product", key.to_string().as_str()),
                ("quantity", quantity.to_string().as_str()),
            ]),
        );
        Ok(self.inner.send(snapshot))
    }

    /// Remove a line. A missing line is left alone.
    pub fn remove_from_cart(&self, vendor_id: &VendorId, key: &ProductKey) -> Arc<CartSnapshot> {
        let mut state = self.inner.lock();
        let before = state.lines.len();
        state.lines.retain(|line| !line.matches(vendor_id, key));

        if state.lines.len() == before {
            return Arc::new(self.inner.build_snapshot(&state.lines));
        }
        add_breadcrumb(
            "cart",
            "Removed from cart",
            Some(&[
                ("vendor_id", vendor_id.as_str()),
                ("product", key.to_string().as_str()),
            ]),
        );
        self.inner.publish(&state)
    }

    /// Empty the cart.
    pub fn clear(&self) -> Arc<CartSnapshot> {
        let mut state = self.inner.lock();
        state.lines.clear();
        add_breadcrumb("cart", "Cleared cart", None);
        self.inner.publish(&state)
    }

    /// Sum of quantities across all lines.
    #[must_use]
    pub fn item_count(&self) -> u64 {
        item_count(&self.inner.lock().lines)
    }

    /// Sum of `unit_price * quantity`, using live catalog prices where
    /// available.
    #[must_use]
    pub fn subtotal(&self) -> Decimal {
        self.snapshot().subtotal
    }

    /// The current lines.
    #[must_use]
    pub fn lines(&self) -> Vec<CartLine> {
        self.inner.lock().lines.clone()
    }

    /// A freshly priced view of the cart.
    #[must_use]
    pub fn snapshot(&self) -> Arc<CartSnapshot> {
        let state = self.inner.lock();
        Arc::new(self.inner.build_snapshot(&state.lines))
    }

    /// Receive every snapshot published by a mutation or reconciliation.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Arc<CartSnapshot>> {
        self.inner.snapshots.subscribe()
    }
}

impl CartStoreInner {
    fn lock(&self) -> MutexGuard<'_, CartState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn availability(&self, vendor_id: &VendorId, key: &ProductKey) -> Availability {
        let Some(view) = self.catalog.get(vendor_id) else {
            return Availability::Unknown;
        };
        match issue_for(&view.snapshot, key) {
            Some(_) => Availability::Unavailable,
            None => Availability::Available,
        }
    }

    /// Price `lines` against the cached catalog. Totals that do not fit in a
    /// [`Decimal`] are capped at [`Decimal::MAX`] and reported through
    /// `overflowed`.
    fn price(&self, lines: &[CartLine]) -> Priced {
        let mut catalogs: HashMap<&VendorId, Option<Arc<CatalogSnapshot>>> = HashMap::new();
        let mut priced = Vec::with_capacity(lines.len());
        let mut subtotal = Decimal::ZERO;
        let mut overflowed = false;

        for line in lines {
            let catalog = catalogs
                .entry(&line.vendor_id)
                .or_insert_with(|| self.catalog.get(&line.vendor_id).map(|view| view.snapshot));
            let live = catalog
                .as_ref()
                .and_then(|snapshot| snapshot.product(&line.key))
                .map(|product| product.price);

            let (unit_price, price_source) = match live {
                Some(price) => (price, PriceSource::Live),
                None => (line.captured_price, PriceSource::Captured),
            };
            let line_total = unit_price.checked_times(line.quantity).unwrap_or_else(|| {
                overflowed = true;
                Decimal::MAX
            });
            subtotal = subtotal.checked_add(line_total).unwrap_or_else(|| {
                overflowed = true;
                Decimal::MAX
            });

            priced.push(PricedLine {
                line: line.clone(),
                unit_price,
                price_source,
                line_total,
            });
        }

        Priced {
            snapshot: CartSnapshot {
                vendor_id: lines.first().map(|line| line.vendor_id.clone()),
                item_count: item_count(lines),
                subtotal,
                lines: priced,
            },
            overflowed,
        }
    }

    /// Like [`Self::build_snapshot`], but `None` when a total overflows.
    fn price_lines(&self, lines: &[CartLine]) -> Option<CartSnapshot> {
        let priced = self.price(lines);
        (!priced.overflowed).then_some(priced.snapshot)
    }

    fn build_snapshot(&self, lines: &[CartLine]) -> CartSnapshot {
        let priced = self.price(lines);
        if priced.overflowed {
            warn!(
                vendor_id = ?priced.snapshot.vendor_id,
                "Cart total out of range, capped at the largest representable amount"
            );
        }
        priced.snapshot
    }

    fn send(&self, snapshot: CartSnapshot) -> Arc<CartSnapshot> {
        let snapshot = Arc::new(snapshot);
        self.snapshots.send_replace(Arc::clone(&snapshot));
        snapshot
    }

    fn publish(&self, state: &CartState) -> Arc<CartSnapshot> {
        self.send(self.build_snapshot(&state.lines))
    }

    /// Re-check every line of the replaced vendor. Lines are flagged, never
    /// deleted.
    fn reconcile(&self, catalog: &CatalogSnapshot) {
        let mut state = self.lock();

        let last = state.reconciled.get(&catalog.vendor_id).copied().unwrap_or(0);
        if catalog.generation <= last {
            debug!(
                vendor_id = %catalog.vendor_id,
                generation = catalog.generation,
                last,
                "Ignoring out-of-date catalog for reconciliation"
            );
            return;
        }
        state
            .reconciled
            .insert(catalog.vendor_id.clone(), catalog.generation);

        let mut changed = false;
        for line in state
            .lines
            .iter_mut()
            .filter(|line| line.vendor_id == catalog.vendor_id)
        {
            let issue = issue_for(catalog, &line.key);
            if issue != line.issue {
                if let Some(issue) = issue {
                    warn!(
                        vendor_id = %line.vendor_id,
                        product = %line.key,
                        %issue,
                        "Cart line flagged by catalog refresh"
                    );
                } else {
                    info!(vendor_id = %line.vendor_id, product = %line.key, "Cart line available again");
                }
                line.issue = issue;
                changed = true;
            }
        }

        let has_lines = state
            .lines
            .iter()
            .any(|line| line.vendor_id == catalog.vendor_id);
        if has_lines {
            // Prices may have moved even when no flag changed
            self.publish(&state);
        }
        if changed {
            debug!(vendor_id = %catalog.vendor_id, generation = catalog.generation, "Cart reconciled");
        }
    }
}

struct Priced {
    snapshot: CartSnapshot,
    overflowed: bool,
}

/// Catalog observer that keeps cart line flags in step with replaces.
struct Reconciler {
    cart: Weak<CartStoreInner>,
}

impl CatalogObserver for Reconciler {
    fn on_replace(&self, snapshot: &Arc<CatalogSnapshot>) {
        if let Some(cart) = self.cart.upgrade() {
            cart.reconcile(snapshot);
        }
    }
}

fn issue_for(catalog: &CatalogSnapshot, key: &ProductKey) -> Option<LineIssue> {
    match catalog.product(key) {
        None => Some(LineIssue::Discontinued),
        Some(product) if !product.in_stock => Some(LineIssue::OutOfStock),
        Some(_) => None,
    }
}

fn positive_quantity(quantity: i64) -> Result<u32, CartError> {
    u32::try_from(quantity)
        .ok()
        .filter(|q| *q > 0)
        .ok_or(CartError::InvalidQuantity(quantity))
}

fn item_count(lines: &[CartLine]) -> u64 {
    lines.iter().map(|line| u64::from(line.quantity)).sum()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use garden_market_core::{Category, Price, ProductsByCategory};

    use super::*;
    use crate::catalog::CatalogEvent;
    use crate::config::CatalogConfig;
    use crate::test_support::{product, vendor};

    fn catalog() -> CatalogCache {
        CatalogCache::new(&CatalogConfig {
            ttl: Duration::from_secs(300),
            max_vendors: 16,
        })
    }

    fn cart(policy: VendorPolicy) -> (CatalogCache, CartStore) {
        let catalog = catalog();
        let cart = CartStore::new(
            catalog.clone(),
            &CartConfig {
                vendor_policy: policy,
            },
        );
        (catalog, cart)
    }

    #[test]
    fn test_repeated_add_merges() {
        let (_, cart) = cart(VendorPolicy::Reject);
        let rose = product("Rose", 500, true);
        let g1 = vendor("g1");

        cart.add_to_cart(&rose, &g1, 2).unwrap();
        let snapshot = cart.add_to_cart(&rose, &g1, 1).unwrap();

        assert_eq!(snapshot.lines.len(), 1);
        assert_eq!(snapshot.lines[0].line.quantity(), 3);
        assert_eq!(snapshot.item_count, 3);
        assert_eq!(snapshot.subtotal, Decimal::new(1500, 2));
        assert_eq!(snapshot.vendor_id, Some(VendorId::new("g1")));
    }

    #[test]
    fn test_invalid_quantity_rejected() {
        let (_, cart) = cart(VendorPolicy::Reject);
        let rose = product("Rose", 500, true);
        let g1 = vendor("g1");

        assert_eq!(
            cart.add_to_cart(&rose, &g1, 0).unwrap_err(),
            CartError::InvalidQuantity(0)
        );
        assert_eq!(
            cart.add_to_cart(&rose, &g1, -3).unwrap_err(),
            CartError::InvalidQuantity(-3)
        );
        assert!(cart.snapshot().is_empty());
    }

    #[test]
    fn test_quantity_overflow_rejected() {
        let (_, cart) = cart(VendorPolicy::Reject);
        let rose = product("Rose", 500, true);
        let g1 = vendor("g1");

        cart.add_to_cart(&rose, &g1, i64::from(u32::MAX)).unwrap();
        assert!(matches!(
            cart.add_to_cart(&rose, &g1, 1),
            Err(CartError::InvalidQuantity(_))
        ));
        assert_eq!(cart.item_count(), u64::from(u32::MAX));
    }

    #[test]
    fn test_total_overflow_rejected_without_change() {
        let (_, cart) = cart(VendorPolicy::Reject);
        let g1 = vendor("g1");
        let orchid = Product {
            price: Price::new(Decimal::MAX).unwrap(),
            ..product("Orchid", 0, true)
        };

        assert_eq!(
            cart.add_to_cart(&orchid, &g1, 2).unwrap_err(),
            CartError::InvalidQuantity(2)
        );
        assert!(cart.snapshot().is_empty());

        cart.add_to_cart(&orchid, &g1, 1).unwrap();
        assert_eq!(
            cart.add_to_cart(&orchid, &g1, 1).unwrap_err(),
            CartError::InvalidQuantity(1)
        );
        assert_eq!(
            cart.update_quantity(&g1.id, &orchid.key(), 3).unwrap_err(),
            CartError::InvalidQuantity(3)
        );
        assert!(matches!(
            cart.add_to_cart(&product("Rose", 500, true), &g1, 1),
            Err(CartError::InvalidQuantity(1))
        ));

        let snapshot = cart.snapshot();
        assert_eq!(snapshot.lines.len(), 1);
        assert_eq!(snapshot.item_count, 1);
        assert_eq!(snapshot.subtotal, Decimal::MAX);
    }

    #[test]
    fn test_live_price_overflow_is_capped() {
        let (catalog, cart) = cart(VendorPolicy::Reject);
        let g1 = vendor("g1");
        let rose = product("Rose", 500, true);
        catalog.replace(&g1.id, g1.clone(), std::iter::once(rose.clone()).collect());
        cart.add_to_cart(&rose, &g1, 2).unwrap();
        let mut events = catalog.subscribe();

        let repriced = Product {
            price: Price::new(Decimal::MAX).unwrap(),
            ..rose
        };
        let replaced = catalog.replace(&g1.id, g1.clone(), std::iter::once(repriced).collect());

        assert!(matches!(
            events.try_recv(),
            Ok(CatalogEvent::Replaced { generation, .. }) if generation == replaced.generation
        ));
        let snapshot = cart.snapshot();
        assert_eq!(snapshot.item_count, 2);
        assert_eq!(snapshot.lines[0].line_total, Decimal::MAX);
        assert_eq!(snapshot.subtotal, Decimal::MAX);
    }

    #[test]
    fn test_out_of_stock_add_is_noop() {
        let (_, cart) = cart(VendorPolicy::Reject);
        let mut updates = cart.subscribe();
        updates.mark_unchanged();

        let err = cart
            .add_to_cart(&product("Rose", 500, false), &vendor("g1"), 1)
            .unwrap_err();

        assert!(matches!(err, CartError::OutOfStock { .. }));
        assert!(cart.lines().is_empty());
        assert!(!updates.has_changed().unwrap());
    }

    #[test]
    fn test_add_checks_cached_catalog() {
        let (catalog, cart) = cart(VendorPolicy::Reject);
        let g1 = vendor("g1");
        let stale_copy = product("Rose", 500, true);

        let products: ProductsByCategory =
            std::iter::once(product("Rose", 500, false)).collect();
        catalog.replace(&g1.id, g1.clone(), products);

        assert!(matches!(
            cart.add_to_cart(&stale_copy, &g1, 1),
            Err(CartError::OutOfStock { .. })
        ));

        // Gone from the catalog entirely
        let tulip = product("Tulip", 300, true);
        assert!(matches!(
            cart.add_to_cart(&tulip, &g1, 1),
            Err(CartError::OutOfStock { .. })
        ));
    }

    #[test]
    fn test_update_quantity() {
        let (_, cart) = cart(VendorPolicy::Reject);
        let rose = product("Rose", 500, true);
        let g1 = vendor("g1");
        cart.add_to_cart(&rose, &g1, 2).unwrap();

        let snapshot = cart.update_quantity(&g1.id, &rose.key(), 5).unwrap();
        assert_eq!(snapshot.item_count, 5);

        let snapshot = cart.update_quantity(&g1.id, &rose.key(), 0).unwrap();
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.vendor_id, None);
    }

    #[test]
    fn test_update_missing_line_is_noop() {
        let (_, cart) = cart(VendorPolicy::Reject);
        let snapshot = cart
            .update_quantity(&VendorId::new("g1"), &ProductKey::new("Rose", Category::Flowers), 4)
            .unwrap();
        assert!(snapshot.is_empty());
    }

    #[test]
    fn test_noop_changes_do_not_notify() {
        let (_, cart) = cart(VendorPolicy::Reject);
        let rose = product("Rose", 500, true);
        let g1 = vendor("g1");
        cart.add_to_cart(&rose, &g1, 1).unwrap();
        let updates = cart.subscribe();

        let tulip = ProductKey::new("Tulip", Category::Flowers);
        cart.update_quantity(&g1.id, &tulip, 3).unwrap();
        cart.remove_from_cart(&g1.id, &tulip);
        assert!(!updates.has_changed().unwrap());

        cart.remove_from_cart(&g1.id, &rose.key());
        assert!(updates.has_changed().unwrap());
    }

    #[test]
    fn test_update_increase_rejected_when_unavailable() {
        let (catalog, cart) = cart(VendorPolicy::Reject);
        let rose = product("Rose", 500, true);
        let g1 = vendor("g1");
        catalog.replace(&g1.id, g1.clone(), std::iter::once(rose.clone()).collect());
        cart.add_to_cart(&rose, &g1, 3).unwrap();

        catalog.replace(
            &g1.id,
            g1.clone(),
            std::iter::once(product("Rose", 500, false)).collect(),
        );

        assert!(matches!(
            cart.update_quantity(&g1.id, &rose.key(), 4),
            Err(CartError::OutOfStock { .. })
        ));
        let snapshot = cart.update_quantity(&g1.id, &rose.key(), 1).unwrap();
        assert_eq!(snapshot.item_count, 1);
    }

    #[test]
    fn test_remove_missing_line_is_noop() {
        let (_, cart) = cart(VendorPolicy::Reject);
        let rose = product("Rose", 500, true);
        let g1 = vendor("g1");
        cart.add_to_cart(&rose, &g1, 1).unwrap();

        let snapshot =
            cart.remove_from_cart(&g1.id, &ProductKey::new("Tulip", Category::Flowers));
        assert_eq!(snapshot.item_count, 1);

        let snapshot = cart.remove_from_cart(&g1.id, &rose.key());
        assert!(snapshot.is_empty());
    }

    #[test]
    fn test_reject_policy() {
        let (_, cart) = cart(VendorPolicy::Reject);
        cart.add_to_cart(&product("Rose", 500, true), &vendor("g1"), 1)
            .unwrap();

        let err = cart
            .add_to_cart(&product("Basil", 200, true), &vendor("g2"), 1)
            .unwrap_err();
        assert_eq!(
            err,
            CartError::VendorMismatch {
                active: VendorId::new("g1"),
                requested: VendorId::new("g2"),
            }
        );
        assert_eq!(cart.lines().len(), 1);
    }

    #[test]
    fn test_replace_policy() {
        let (_, cart) = cart(VendorPolicy::Replace);
        cart.add_to_cart(&product("Rose", 500, true), &vendor("g1"), 2)
            .unwrap();

        let snapshot = cart
            .add_to_cart(&product("Basil", 200, true), &vendor("g2"), 1)
            .unwrap();
        assert_eq!(snapshot.vendor_id, Some(VendorId::new("g2")));
        assert_eq!(snapshot.item_count, 1);
        assert_eq!(snapshot.subtotal, Decimal::new(200, 2));
    }

    #[test]
    fn test_subtotal_uses_live_price() {
        let (catalog, cart) = cart(VendorPolicy::Reject);
        let g1 = vendor("g1");
        let rose = product("Rose", 500, true);
        catalog.replace(&g1.id, g1.clone(), std::iter::once(rose.clone()).collect());
        cart.add_to_cart(&rose, &g1, 2).unwrap();

        catalog.replace(
            &g1.id,
            g1.clone(),
            std::iter::once(product("Rose", 650, true)).collect(),
        );

        let snapshot = cart.snapshot();
        assert_eq!(snapshot.subtotal, Decimal::new(1300, 2));
        assert_eq!(cart.subtotal(), Decimal::new(1300, 2));
        assert_eq!(snapshot.lines[0].price_source, PriceSource::Live);
        assert_eq!(
            snapshot.lines[0].line.captured_price(),
            Price::from_cents(500).unwrap()
        );
        assert!(!snapshot.price_may_have_changed());
    }

    #[test]
    fn test_discontinued_line_is_flagged_and_kept() {
        let (catalog, cart) = cart(VendorPolicy::Reject);
        let g1 = vendor("g1");
        let rose = product("Rose", 500, true);
        catalog.replace(&g1.id, g1.clone(), std::iter::once(rose.clone()).collect());
        cart.add_to_cart(&rose, &g1, 2).unwrap();
        let mut updates = cart.subscribe();
        updates.mark_unchanged();

        catalog.replace(&g1.id, g1.clone(), ProductsByCategory::new());

        assert!(updates.has_changed().unwrap());
        let snapshot = updates.borrow_and_update().clone();
        assert_eq!(snapshot.lines.len(), 1);
        let line = &snapshot.lines[0];
        assert_eq!(line.line.issue(), Some(LineIssue::Discontinued));
        assert_eq!(line.price_source, PriceSource::Captured);
        assert_eq!(snapshot.subtotal, Decimal::new(1000, 2));
        assert!(snapshot.price_may_have_changed());
        assert_eq!(snapshot.flagged().count(), 1);
    }

    #[test]
    fn test_flag_clears_when_back_in_stock() {
        let (catalog, cart) = cart(VendorPolicy::Reject);
        let g1 = vendor("g1");
        let rose = product("Rose", 500, true);
        cart.add_to_cart(&rose, &g1, 1).unwrap();

        catalog.replace(
            &g1.id,
            g1.clone(),
            std::iter::once(product("Rose", 500, false)).collect(),
        );
        assert_eq!(cart.lines()[0].issue(), Some(LineIssue::OutOfStock));

        catalog.replace(&g1.id, g1.clone(), std::iter::once(rose).collect());
        assert_eq!(cart.lines()[0].issue(), None);
    }

    #[test]
    fn test_older_generation_is_ignored() {
        let (catalog, cart) = cart(VendorPolicy::Reject);
        let g1 = vendor("g1");
        let rose = product("Rose", 500, true);
        cart.add_to_cart(&rose, &g1, 1).unwrap();

        let old = catalog.replace(
            &g1.id,
            g1.clone(),
            std::iter::once(product("Rose", 500, false)).collect(),
        );
        catalog.replace(&g1.id, g1.clone(), std::iter::once(rose).collect());
        assert_eq!(cart.lines()[0].issue(), None);

        cart.inner.reconcile(&old);
        assert_eq!(cart.lines()[0].issue(), None);
    }

    #[test]
    fn test_clear() {
        let (_, cart) = cart(VendorPolicy::Reject);
        cart.add_to_cart(&product("Rose", 500, true), &vendor("g1"), 2)
            .unwrap();
        let snapshot = cart.clear();
        assert!(snapshot.is_empty());
        assert_eq!(cart.item_count(), 0);
        assert_eq!(cart.subtotal(), Decimal::ZERO);
    }

    #[test]
    fn test_vendor_policy_parse() {
        assert_eq!("Replace".parse::<VendorPolicy>().unwrap(), VendorPolicy::Replace);
        assert_eq!("reject".parse::<VendorPolicy>().unwrap(), VendorPolicy::Reject);
        assert!("merge".parse::<VendorPolicy>().is_err());
        assert_eq!(VendorPolicy::default(), VendorPolicy::Reject);
    }
}
