//! Immutable order snapshots.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use zentro_core::{CartId, OrderId, PaymentStatus, ProductId};

use super::cart::{Cart, CartEntry};
use super::shipping::ShippingAddress;

/// One line of an order snapshot.
///
/// Product name, price, and image are copied at settlement time; later
/// catalog edits do not reach back into historical orders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: ProductId,
    pub name: String,
    pub unit_price: Decimal,
    pub quantity: u32,
    pub image: Option<String>,
}

/// A materialized order. Unique per (cart, tx_ref); immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub cart_id: CartId,
    pub tx_ref: String,
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip_code: Option<String>,
    pub country: Option<String>,
    pub lines: Vec<OrderLine>,
    /// The settled transaction amount, tax inclusive.
    pub total_amount: Decimal,
    pub external_transaction_id: String,
    pub payment_status: PaymentStatus,
    pub created_at: DateTime<Utc>,
}

/// An order snapshot awaiting insertion.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderDraft {
    pub cart_id: CartId,
    pub tx_ref: String,
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip_code: Option<String>,
    pub country: Option<String>,
    pub lines: Vec<OrderLine>,
    pub total_amount: Decimal,
    pub external_transaction_id: String,
    pub payment_status: PaymentStatus,
}

impl OrderDraft {
    /// Freeze a point-in-time snapshot of a cart, its lines, and the buyer's
    /// shipping address into an order draft.
    ///
    /// Pure: the store's settlement unit calls this and pairs it with the
    /// (cart, tx_ref) uniqueness check that makes re-invocation a no-op.
    #[must_use]
    pub fn materialize(
        cart: &Cart,
        entries: &[CartEntry],
        shipping: &ShippingAddress,
        tx_ref: &str,
        external_transaction_id: &str,
        total_amount: Decimal,
    ) -> Self {
        let lines = entries
            .iter()
            .map(|entry| OrderLine {
                product_id: entry.product.id,
                name: entry.product.title.clone(),
                unit_price: entry.product.price,
                quantity: entry.line.quantity,
                image: entry.product.image.clone(),
            })
            .collect();

        Self {
            cart_id: cart.id,
            tx_ref: tx_ref.to_owned(),
            full_name: shipping.name.clone().unwrap_or_default(),
            email: shipping.email.clone().unwrap_or_default(),
            phone: shipping.phone.clone().unwrap_or_default(),
            address: shipping.address.clone().unwrap_or_default(),
            city: shipping.city.clone().unwrap_or_default(),
            state: shipping.state.clone().unwrap_or_default(),
            zip_code: shipping.zip_code.clone(),
            country: shipping.country.clone(),
            lines,
            total_amount,
            external_transaction_id: external_transaction_id.to_owned(),
            payment_status: PaymentStatus::Completed,
        }
    }
}
