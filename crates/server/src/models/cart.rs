//! Cart aggregate types and totals.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use zentro_core::{CartId, LineId, OwnerKey, ProductId};

use super::product::Product;

/// A shopping cart.
///
/// Exactly one unpaid cart exists per owner; `paid` flips false to true once
/// at settlement and never reverts, after which the next lookup opens a fresh
/// cart and this one becomes archival.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub id: CartId,
    pub owner: OwnerKey,
    pub paid: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One product line in a cart. Unique per (cart, product).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub id: LineId,
    pub cart_id: CartId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub created_at: DateTime<Utc>,
}

/// A cart line joined with its live product.
#[derive(Debug, Clone, PartialEq)]
pub struct CartEntry {
    pub line: CartLine,
    pub product: Product,
}

/// How an upsert interprets the requested quantity for an existing line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuantityMode {
    /// Add to the current quantity.
    #[default]
    Increment,
    /// Replace the current quantity.
    Set,
}

/// Result of a line upsert: the written line plus how many pending
/// transactions the mutation superseded.
#[derive(Debug, Clone, PartialEq)]
pub struct LineMutation {
    pub line: CartLine,
    pub superseded: u32,
}

/// Cart totals at live catalog prices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CartTotals {
    pub item_count: u32,
    pub subtotal: Decimal,
}

impl CartTotals {
    /// Sum quantities and extended prices over the cart's entries.
    #[must_use]
    pub fn compute(entries: &[CartEntry]) -> Self {
        let mut item_count = 0u32;
        let mut subtotal = Decimal::ZERO;
        for entry in entries {
            item_count += entry.line.quantity;
            subtotal += entry.product.price * Decimal::from(entry.line.quantity);
        }
        Self {
            item_count,
            subtotal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(quantity: u32, price: &str) -> CartEntry {
        CartEntry {
            line: CartLine {
                id: LineId::new(1),
                cart_id: CartId::new(1),
                product_id: ProductId::new(1),
                quantity,
                created_at: Utc::now(),
            },
            product: Product {
                id: ProductId::new(1),
                title: "p".to_owned(),
                slug: "p".to_owned(),
                price: price.parse().unwrap(),
                image: None,
                category: None,
                description: None,
                created_at: Utc::now(),
            },
        }
    }

    #[test]
    fn totals_use_extended_prices() {
        let totals = CartTotals::compute(&[entry(2, "50.00"), entry(3, "1.25")]);
        assert_eq!(totals.item_count, 5);
        assert_eq!(totals.subtotal, "103.75".parse::<Decimal>().unwrap());
    }

    #[test]
    fn totals_of_empty_cart_are_zero() {
        let totals = CartTotals::compute(&[]);
        assert_eq!(totals.item_count, 0);
        assert_eq!(totals.subtotal, Decimal::ZERO);
    }
}
