//! Cart lines and the priced snapshot derived from them.

use std::sync::Arc;

use garden_market_core::{LineIssue, Price, ProductKey, VendorId};
use rust_decimal::Decimal;
use serde::Serialize;

/// One product in the cart.
///
/// At most one line exists per `(vendor_id, key)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartLine {
    pub(super) vendor_id: VendorId,
    pub(super) key: ProductKey,
    pub(super) quantity: u32,
    /// Unit price when the line was first added.
    pub(super) captured_price: Price,
    pub(super) issue: Option<LineIssue>,
}

impl CartLine {
    #[must_use]
    pub const fn vendor_id(&self) -> &VendorId {
        &self.vendor_id
    }

    #[must_use]
    pub const fn key(&self) -> &ProductKey {
        &self.key
    }

    #[must_use]
    pub const fn quantity(&self) -> u32 {
        self.quantity
    }

    #[must_use]
    pub const fn captured_price(&self) -> Price {
        self.captured_price
    }

    /// Set by catalog reconciliation; cleared once the product is available
    /// again.
    #[must_use]
    pub const fn issue(&self) -> Option<LineIssue> {
        self.issue
    }

    #[must_use]
    pub const fn needs_attention(&self) -> bool {
        self.issue.is_some()
    }

    pub(super) fn matches(&self, vendor_id: &VendorId, key: &ProductKey) -> bool {
        self.vendor_id == *vendor_id && self.key == *key
    }
}

/// Where a line's unit price came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    /// Current price from the cached catalog.
    Live,
    /// The product is no longer in the cached catalog; the price captured
    /// at add time is used and may be out of date.
    Captured,
}

/// A line with its resolved unit price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PricedLine {
    pub line: CartLine,
    pub unit_price: Price,
    pub price_source: PriceSource,
    pub line_total: Decimal,
}

/// Immutable view of the cart published after every change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartSnapshot {
    /// Vendor every line belongs to, `None` when the cart is empty.
    pub vendor_id: Option<VendorId>,
    pub lines: Vec<PricedLine>,
    /// Sum of line quantities.
    pub item_count: u64,
    pub subtotal: Decimal,
}

impl CartSnapshot {
    pub(super) fn empty() -> Arc<Self> {
        Arc::new(Self {
            vendor_id: None,
            lines: Vec::new(),
            item_count: 0,
            subtotal: Decimal::ZERO,
        })
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Find the line for a product.
    #[must_use]
    pub fn line(&self, key: &ProductKey) -> Option<&PricedLine> {
        self.lines.iter().find(|priced| priced.line.key == *key)
    }

    /// True when any line is priced from its captured price, so the
    /// subtotal should be shown as "price may have changed".
    #[must_use]
    pub fn price_may_have_changed(&self) -> bool {
        self.lines
            .iter()
            .any(|priced| priced.price_source == PriceSource::Captured)
    }

    /// Lines flagged by the last catalog refresh.
    pub fn flagged(&self) -> impl Iterator<Item = &CartLine> {
        self.lines
            .iter()
            .map(|priced| &priced.line)
            .filter(|line| line.needs_attention())
    }
}
