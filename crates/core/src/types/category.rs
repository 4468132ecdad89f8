//! Product categories.

use serde::{Deserialize, Serialize};

/// Error returned when a category label is not recognised.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid category: {0}")]
pub struct CategoryError(pub String);

/// The fixed set of product categories a vendor catalog is grouped by.
///
/// Serialized with the display labels used by the catalog backend
/// (`"Fruit Trees"`, not `"fruit_trees"`).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub enum Category {
    #[default]
    #[serde(rename = "Flowers")]
    Flowers,
    #[serde(rename = "Fruit Trees")]
    FruitTrees,
    #[serde(rename = "Herbs")]
    Herbs,
    #[serde(rename = "Others")]
    Others,
}

impl Category {
    /// Every category, in catalog display order.
    pub const ALL: [Self; 4] = [Self::Flowers, Self::FruitTrees, Self::Herbs, Self::Others];

    /// The backend label for this category.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Flowers => "Flowers",
            Self::FruitTrees => "Fruit Trees",
            Self::Herbs => "Herbs",
            Self::Others => "Others",
        }
    }

    /// Parse a label, filing anything unrecognised under [`Category::Others`].
    #[must_use]
    pub fn from_label_lossy(label: &str) -> Self {
        label.parse().unwrap_or(Self::Others)
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for Category {
    type Err = CategoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.label().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| CategoryError(s.to_string()))
    }
}
