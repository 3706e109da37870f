//! Product catalog types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use zentro_core::ProductId;

/// Product category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    Electronics,
    Jewelry,
    Clothings,
}

impl Category {
    /// Stable string form, used for storage and filtering.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Electronics => "ELECTRONICS",
            Self::Jewelry => "JEWELRY",
            Self::Clothings => "CLOTHINGS",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ELECTRONICS" => Ok(Self::Electronics),
            "JEWELRY" => Ok(Self::Jewelry),
            "CLOTHINGS" => Ok(Self::Clothings),
            _ => Err(format!("invalid category: {s}")),
        }
    }
}

/// A catalog product.
///
/// Prices are read live when computing cart totals; orders copy the price
/// into their snapshot at settlement time instead of referencing it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub title: String,
    /// URL-safe identifier, generated from the title. Unique.
    pub slug: String,
    pub price: Decimal,
    pub image: Option<String>,
    pub category: Option<Category>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Fields for creating a product. The slug is derived from the title.
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub title: String,
    pub price: Decimal,
    pub image: Option<String>,
    pub category: Option<Category>,
    pub description: Option<String>,
}

/// Catalog listing filter.
#[derive(Debug, Clone, Default)]
pub struct ProductFilter {
    pub category: Option<Category>,
    /// Case-insensitive title substring.
    pub search: Option<String>,
}

/// Derive a URL-safe slug from a product title.
///
/// Lowercases, maps runs of non-alphanumeric characters to single hyphens,
/// and trims leading/trailing hyphens.
#[must_use]
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_hyphen = false;
    for ch in title.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_hyphen = true;
        }
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_collapses_separators() {
        assert_eq!(slugify("Wireless  Headphones"), "wireless-headphones");
        assert_eq!(slugify("  Gold Ring! "), "gold-ring");
        assert_eq!(slugify("USB-C Cable 2m"), "usb-c-cable-2m");
    }
}
