//! Wire records returned by the catalog API and their conversion into
//! domain types.
//!
//! The API is lenient about what it sends; conversion is where bad prices
//! and unknown categories are handled so the cache only ever stores valid
//! domain values.

use garden_market_core::{Category, Price, Product, ProductsByCategory, Vendor, VendorId};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::warn;

/// `GET /businesses/{id}` response body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct VendorRecord {
    pub name: String,
    #[serde(default)]
    pub owner_name: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub email_address: Option<String>,
    #[serde(default)]
    pub operation_hours: Option<String>,
    #[serde(default)]
    pub has_delivery: bool,
    #[serde(default)]
    pub delivery_cost: Option<Decimal>,
    #[serde(default)]
    pub island_wide_delivery_cost: Option<Decimal>,
    #[serde(default)]
    pub delivery_area: Option<String>,
    #[serde(default)]
    pub profile_picture_url: Option<String>,
}

/// One element of the `GET /businesses/{id}/products` response body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct ProductRecord {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    pub price: Decimal,
    #[serde(default)]
    pub in_stock: bool,
    #[serde(default)]
    pub image_url: Option<String>,
}

/// Convert a vendor record, keyed by the id it was requested under.
pub(super) fn convert_vendor(vendor_id: &VendorId, record: VendorRecord) -> Vendor {
    Vendor {
        id: vendor_id.clone(),
        name: record.name,
        owner_name: record.owner_name.unwrap_or_default(),
        address: non_empty(record.address),
        phone_number: non_empty(record.phone_number),
        email_address: non_empty(record.email_address),
        operation_hours: non_empty(record.operation_hours),
        has_delivery: record.has_delivery,
        delivery_cost: convert_cost(vendor_id, "deliveryCost", record.delivery_cost),
        island_wide_delivery_cost: convert_cost(
            vendor_id,
            "islandWideDeliveryCost",
            record.island_wide_delivery_cost,
        ),
        delivery_area: non_empty(record.delivery_area),
        profile_picture_url: non_empty(record.profile_picture_url),
    }
}

/// Convert a product list, dropping records with an invalid price.
pub(super) fn convert_products(
    vendor_id: &VendorId,
    records: Vec<ProductRecord>,
) -> ProductsByCategory {
    records
        .into_iter()
        .filter_map(|record| convert_product(vendor_id, record))
        .collect()
}

fn convert_product(vendor_id: &VendorId, record: ProductRecord) -> Option<Product> {
    let price = match Price::new(record.price) {
        Ok(price) => price,
        Err(e) => {
            warn!(
                vendor_id = %vendor_id,
                product = %record.name,
                error = %e,
                "Dropping product with invalid price"
            );
            return None;
        }
    };

    let category = record
        .category
        .as_deref()
        .map_or(Category::Others, Category::from_label_lossy);

    Some(Product {
        name: record.name,
        description: record.description.unwrap_or_default(),
        category,
        price,
        in_stock: record.in_stock,
        image_url: record.image_url.unwrap_or_default(),
    })
}

fn convert_cost(vendor_id: &VendorId, field: &str, cost: Option<Decimal>) -> Option<Price> {
    let amount = cost?;
    match Price::new(amount) {
        Ok(price) => Some(price),
        Err(e) => {
            warn!(vendor_id = %vendor_id, field, error = %e, "Ignoring invalid delivery cost");
            None
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
