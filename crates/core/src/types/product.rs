//! Catalog products ("plants") and their per-category grouping.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::category::Category;
use super::price::Price;

/// A purchasable catalog entry, scoped to one vendor and one category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    /// Display name, unique within a vendor's category.
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Catalog category.
    pub category: Category,
    /// Unit price.
    pub price: Price,
    /// Whether the vendor currently has stock.
    pub in_stock: bool,
    /// Product photo reference.
    #[serde(default)]
    pub image_url: String,
}

impl Product {
    /// The key identifying this product within its vendor.
    #[must_use]
    pub fn key(&self) -> ProductKey {
        ProductKey::new(self.name.clone(), self.category)
    }
}

/// Identity of a product within a vendor: `(name, category)`.
///
/// The catalog backend does not guarantee numeric product ids, so names are
/// only unique inside a category.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProductKey {
    pub name: String,
    pub category: Category,
}

impl ProductKey {
    /// Create a new product key.
    #[must_use]
    pub fn new(name: impl Into<String>, category: Category) -> Self {
        Self {
            name: name.into(),
            category,
        }
    }
}

impl std::fmt::Display for ProductKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.category)
    }
}

/// A vendor's products grouped by category.
///
/// Always replaced wholesale on refresh; nothing mutates it in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductsByCategory(BTreeMap<Category, Vec<Product>>);

impl ProductsByCategory {
    /// Create an empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Products in `category`, in backend order.
    #[must_use]
    pub fn category(&self, category: Category) -> &[Product] {
        self.0.get(&category).map_or(&[], Vec::as_slice)
    }

    /// Look up a product by key.
    #[must_use]
    pub fn find(&self, key: &ProductKey) -> Option<&Product> {
        self.category(key.category)
            .iter()
            .find(|p| p.name == key.name)
    }

    /// Iterate over every product across all categories.
    pub fn iter(&self) -> impl Iterator<Item = &Product> {
        self.0.values().flatten()
    }

    /// Total number of products.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    /// Whether the collection has no products.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FromIterator<Product> for ProductsByCategory {
    fn from_iter<I: IntoIterator<Item = Product>>(iter: I) -> Self {
        let mut grouped: BTreeMap<Category, Vec<Product>> = BTreeMap::new();
        for product in iter {
            grouped.entry(product.category).or_default().push(product);
        }
        Self(grouped)
    }
}
