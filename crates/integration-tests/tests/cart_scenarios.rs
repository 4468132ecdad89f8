//! Cart behaviour against a catalog kept by the refresh coordinator.

#![allow(clippy::unwrap_used)]

use garden_market_core::{Category, LineIssue, Price, Product, ProductKey, VendorId};
use garden_market_integration_tests::{TestContext, product, vendor};
use garden_market_storefront::cart::{CartError, PriceSource, VendorPolicy};
use garden_market_storefront::catalog::CatalogEvent;
use garden_market_storefront::refresh::{RefreshOptions, RefreshOutcome};
use rust_decimal::Decimal;

fn rose_key() -> ProductKey {
    ProductKey::new("Rose", Category::Flowers)
}

async fn open_g1(ctx: &TestContext) -> VendorId {
    let g1 = VendorId::new("g1");
    ctx.fetcher.set_products(
        &g1,
        vec![
            product("Rose", Category::Flowers, 500, true),
            product("Mango", Category::FruitTrees, 2500, true),
            product("Mint", Category::Herbs, 150, false),
        ],
    );
    ctx.state.open_vendor(&g1).await.unwrap();
    g1
}

// =============================================================================
// Adding
// =============================================================================

#[tokio::test]
async fn test_rose_two_plus_one() {
    let ctx = TestContext::new();
    let g1 = open_g1(&ctx).await;
    let view = ctx.state.catalog().get(&g1).unwrap();
    let rose = view.snapshot.product(&rose_key()).unwrap().clone();

    let cart = ctx.state.cart();
    cart.add_to_cart(&rose, view.vendor(), 2).unwrap();
    cart.add_to_cart(&rose, view.vendor(), 1).unwrap();

    let snapshot = cart.snapshot();
    assert_eq!(snapshot.lines.len(), 1);
    assert_eq!(snapshot.lines[0].line.quantity(), 3);
    assert_eq!(cart.item_count(), 3);
    assert_eq!(cart.subtotal(), Decimal::new(1500, 2));
}

#[tokio::test]
async fn test_out_of_stock_add_changes_nothing() {
    let ctx = TestContext::new();
    let g1 = open_g1(&ctx).await;
    let view = ctx.state.catalog().get(&g1).unwrap();
    let mint = view
        .snapshot
        .product(&ProductKey::new("Mint", Category::Herbs))
        .unwrap()
        .clone();

    let before = ctx.state.cart().snapshot();
    let err = ctx
        .state
        .cart()
        .add_to_cart(&mint, view.vendor(), 1)
        .unwrap_err();

    assert_eq!(
        err,
        CartError::OutOfStock {
            product: mint.key()
        }
    );
    assert_eq!(ctx.state.cart().snapshot(), before);
}

#[tokio::test]
async fn test_add_rejected_once_catalog_reports_out_of_stock() {
    let ctx = TestContext::new();
    let g1 = open_g1(&ctx).await;
    // Product as the page showed it before the refresh
    let shown = ctx
        .state
        .catalog()
        .get(&g1)
        .unwrap()
        .snapshot
        .product(&rose_key())
        .unwrap()
        .clone();

    ctx.fetcher.set_in_stock(&g1, "Rose", false);
    ctx.state.refresh().notify_changed(&g1).await.unwrap();

    let err = ctx
        .state
        .cart()
        .add_to_cart(&shown, &vendor("g1"), 1)
        .unwrap_err();
    assert!(matches!(err, CartError::OutOfStock { .. }));
}

// =============================================================================
// Updating and removing
// =============================================================================

#[tokio::test]
async fn test_update_to_zero_removes_line() {
    let ctx = TestContext::new();
    let g1 = open_g1(&ctx).await;
    let cart = ctx.state.cart();
    cart.add_to_cart(&product("Rose", Category::Flowers, 500, true), &vendor("g1"), 2)
        .unwrap();

    let snapshot = cart.update_quantity(&g1, &rose_key(), 0).unwrap();
    assert!(snapshot.is_empty());
    assert_eq!(snapshot.vendor_id, None);
}

#[tokio::test]
async fn test_remove_missing_line_is_noop() {
    let ctx = TestContext::new();
    let g1 = open_g1(&ctx).await;
    let cart = ctx.state.cart();
    cart.add_to_cart(&product("Rose", Category::Flowers, 500, true), &vendor("g1"), 2)
        .unwrap();
    let before = cart.snapshot();

    let after = cart.remove_from_cart(&g1, &ProductKey::new("Tulip", Category::Flowers));
    assert_eq!(after, before);
}

// =============================================================================
// Pricing
// =============================================================================

#[tokio::test]
async fn test_subtotal_follows_live_prices() {
    let ctx = TestContext::new();
    let g1 = open_g1(&ctx).await;
    let cart = ctx.state.cart();
    cart.add_to_cart(&product("Rose", Category::Flowers, 500, true), &vendor("g1"), 2)
        .unwrap();
    cart.add_to_cart(&product("Mango", Category::FruitTrees, 2500, true), &vendor("g1"), 1)
        .unwrap();
    assert_eq!(cart.subtotal(), Decimal::new(3500, 2));

    ctx.fetcher.set_products(
        &g1,
        vec![
            product("Rose", Category::Flowers, 600, true),
            product("Mango", Category::FruitTrees, 2500, true),
        ],
    );
    ctx.state
        .refresh()
        .refresh(&g1, RefreshOptions::FORCE)
        .await
        .unwrap();

    let snapshot = cart.snapshot();
    assert_eq!(snapshot.subtotal, Decimal::new(3700, 2));
    assert!(!snapshot.price_may_have_changed());
}

#[tokio::test]
async fn test_removed_product_is_flagged_not_deleted() {
    let ctx = TestContext::new();
    let g1 = open_g1(&ctx).await;
    let cart = ctx.state.cart();
    cart.add_to_cart(&product("Rose", Category::Flowers, 500, true), &vendor("g1"), 2)
        .unwrap();
    let mut updates = cart.subscribe();
    updates.mark_unchanged();

    ctx.fetcher.remove_product(&g1, "Rose");
    ctx.state.refresh().notify_changed(&g1).await.unwrap();

    assert!(updates.has_changed().unwrap());
    let snapshot = updates.borrow_and_update().clone();
    let line = snapshot.line(&rose_key()).unwrap();
    assert_eq!(line.line.quantity(), 2);
    assert_eq!(line.line.issue(), Some(LineIssue::Discontinued));
    assert_eq!(line.price_source, PriceSource::Captured);
    assert_eq!(snapshot.subtotal, Decimal::new(1000, 2));
    assert!(snapshot.price_may_have_changed());

    // Restocked under the same key
    ctx.fetcher
        .set_products(&g1, vec![product("Rose", Category::Flowers, 500, true)]);
    ctx.state.refresh().notify_changed(&g1).await.unwrap();
    assert_eq!(cart.lines()[0].issue(), None);
}

#[tokio::test]
async fn test_refresh_with_oversized_price_still_succeeds() {
    let ctx = TestContext::new();
    let g1 = open_g1(&ctx).await;
    let cart = ctx.state.cart();
    cart.add_to_cart(&product("Rose", Category::Flowers, 500, true), &vendor("g1"), 2)
        .unwrap();
    let mut events = ctx.state.catalog().subscribe();

    ctx.fetcher.set_products(
        &g1,
        vec![Product {
            price: Price::new(Decimal::MAX).unwrap(),
            ..product("Rose", Category::Flowers, 0, true)
        }],
    );
    let outcome = ctx
        .state
        .refresh()
        .refresh(&g1, RefreshOptions::FORCE)
        .await
        .unwrap();

    let RefreshOutcome::Refreshed { generation } = outcome else {
        panic!("expected a refresh, got {outcome:?}");
    };
    assert!(matches!(
        events.try_recv(),
        Ok(CatalogEvent::Replaced { generation: g, .. }) if g == generation
    ));
    assert_eq!(ctx.state.catalog().get(&g1).unwrap().generation(), generation);

    let snapshot = cart.snapshot();
    assert_eq!(snapshot.item_count, 2);
    assert_eq!(snapshot.subtotal, Decimal::MAX);

    // A further add that cannot be priced is refused
    assert!(matches!(
        cart.add_to_cart(&product("Rose", Category::Flowers, 500, true), &vendor("g1"), 1),
        Err(CartError::InvalidQuantity(1))
    ));
    assert_eq!(cart.item_count(), 2);
}

// =============================================================================
// Vendor policies
// =============================================================================

#[tokio::test]
async fn test_reject_policy_keeps_first_vendor() {
    let ctx = TestContext::with_policy(VendorPolicy::Reject);
    let cart = ctx.state.cart();
    cart.add_to_cart(&product("Rose", Category::Flowers, 500, true), &vendor("g1"), 1)
        .unwrap();

    let err = cart
        .add_to_cart(&product("Basil", Category::Herbs, 200, true), &vendor("g2"), 1)
        .unwrap_err();

    assert!(matches!(err, CartError::VendorMismatch { .. }));
    assert_eq!(cart.snapshot().vendor_id, Some(VendorId::new("g1")));
}

#[tokio::test]
async fn test_replace_policy_switches_vendor() {
    let ctx = TestContext::with_policy(VendorPolicy::Replace);
    let cart = ctx.state.cart();
    cart.add_to_cart(&product("Rose", Category::Flowers, 500, true), &vendor("g1"), 3)
        .unwrap();

    let snapshot = cart
        .add_to_cart(&product("Basil", Category::Herbs, 200, true), &vendor("g2"), 1)
        .unwrap();

    assert_eq!(snapshot.vendor_id, Some(VendorId::new("g2")));
    assert_eq!(snapshot.item_count, 1);
    assert!(snapshot.line(&rose_key()).is_none());
}
