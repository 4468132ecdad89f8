//! Status enums for cart lines.

use serde::{Deserialize, Serialize};

/// Why a cart line needs the shopper's attention after a catalog refresh.
///
/// Lines carrying an issue are kept in the cart; the issue is only a flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineIssue {
    /// The product is still listed but the vendor has no stock.
    OutOfStock,
    /// The product no longer appears in the vendor's catalog.
    Discontinued,
}

impl std::fmt::Display for LineIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OutOfStock => write!(f, "out_of_stock"),
            Self::Discontinued => write!(f, "discontinued"),
        }
    }
}

impl std::str::FromStr for LineIssue {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "out_of_stock" => Ok(Self::OutOfStock),
            "discontinued" => Ok(Self::Discontinued),
            _ => Err(format!("invalid line issue: {s}")),
        }
    }
}
