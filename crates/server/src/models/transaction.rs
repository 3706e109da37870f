//! Gateway transaction ledger types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use zentro_core::{CartId, CurrencyCode, Gateway, TransactionId, TransactionStatus};

/// A ledger row for one gateway transaction.
///
/// `external_ref` is the reference we generate and hand to the gateway
/// (Flutterwave `tx_ref`, Paystack `reference`); it is globally unique.
/// `external_transaction_id` is the gateway's own id, unknown until a
/// confirmation is verified. At most one transaction per cart is pending at
/// any time, across both gateways.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayTransaction {
    pub id: TransactionId,
    pub cart_id: CartId,
    pub gateway: Gateway,
    pub external_ref: String,
    pub external_transaction_id: Option<String>,
    /// Hosted checkout link (Flutterwave).
    pub checkout_link: Option<String>,
    /// Checkout access code (Paystack).
    pub access_code: Option<String>,
    pub amount: Decimal,
    pub currency: CurrencyCode,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for opening a transaction. The external reference is generated by
/// the ledger; the row always starts out pending.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub gateway: Gateway,
    pub amount: Decimal,
    pub currency: CurrencyCode,
}
