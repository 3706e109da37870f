//! Checkout orchestration.
//!
//! Ledger first, gateway second: the pending transaction is opened (which
//! supersedes any prior pending row for the cart) before the gateway call,
//! so the freshly generated external reference is what the gateway quotes
//! back in every later confirmation. A rejected initiate marks the row
//! failed; an unreachable gateway surfaces as a retryable error with the row
//! left pending for a later attempt.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::instrument;

use zentro_core::{CurrencyCode, Gateway, OwnerKey, TransactionId};

use crate::error::AppError;
use crate::gateway::{CustomerInfo, Gateways};
use crate::models::{CartTotals, NewTransaction};
use crate::store::CommerceStore;

/// Fixed additive checkout tax.
#[must_use]
pub fn checkout_tax() -> Decimal {
    Decimal::new(400, 2)
}

/// Everything a client needs to resume or complete a checkout.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutHandle {
    pub transaction_id: TransactionId,
    pub external_ref: String,
    pub amount: Decimal,
    pub currency: CurrencyCode,
    pub checkout_link: Option<String>,
    pub access_code: Option<String>,
}

/// Opens ledger transactions and gateway checkouts.
#[derive(Clone)]
pub struct CheckoutService {
    store: Arc<dyn CommerceStore>,
    gateways: Gateways,
}

impl CheckoutService {
    #[must_use]
    pub const fn new(store: Arc<dyn CommerceStore>, gateways: Gateways) -> Self {
        Self { store, gateways }
    }

    /// Open a transaction for the owner's cart and a hosted checkout for it.
    ///
    /// # Errors
    ///
    /// Returns `BadRequest` for an empty cart and `Gateway` when the gateway
    /// rejects or cannot be reached (the ledger row is marked failed on
    /// rejection).
    #[instrument(skip(self))]
    pub async fn initiate(
        &self,
        owner: &OwnerKey,
        gateway: Gateway,
    ) -> Result<CheckoutHandle, AppError> {
        let cart = self.store.open_cart(owner).await?;
        let entries = self.store.cart_contents(cart.id).await?;
        if entries.is_empty() {
            return Err(AppError::BadRequest("cart is empty".to_owned()));
        }

        let totals = CartTotals::compute(&entries);
        let amount = totals.subtotal + checkout_tax();
        let currency = CurrencyCode::NGN;

        let profile = self.store.get_or_create_profile(owner).await?;
        let customer = self
            .store
            .selected_address(profile.id)
            .await?
            .map(|a| CustomerInfo {
                name: a.name.unwrap_or_default(),
                email: a.email.unwrap_or_default(),
            })
            .unwrap_or_default();

        let transaction = self
            .store
            .open_transaction(
                cart.id,
                NewTransaction {
                    gateway,
                    amount,
                    currency,
                },
            )
            .await?;

        let session = match self
            .gateways
            .get(gateway)
            .initiate(&transaction.external_ref, amount, currency, &customer)
            .await
        {
            Ok(session) => session,
            Err(err) => {
                if matches!(err, crate::gateway::GatewayError::Api { .. }) {
                    self.store.fail_if_pending(transaction.id).await?;
                }
                tracing::warn!(
                    external_ref = %transaction.external_ref,
                    error = %err,
                    "gateway initiate failed"
                );
                return Err(AppError::Gateway(err));
            }
        };

        self.store
            .attach_checkout_session(
                transaction.id,
                session.checkout_link.clone(),
                session.access_code.clone(),
            )
            .await?;

        tracing::info!(
            cart_id = %cart.id,
            external_ref = %transaction.external_ref,
            amount = %amount,
            "checkout opened"
        );

        Ok(CheckoutHandle {
            transaction_id: transaction.id,
            external_ref: transaction.external_ref,
            amount,
            currency,
            checkout_link: session.checkout_link,
            access_code: session.access_code,
        })
    }
}
