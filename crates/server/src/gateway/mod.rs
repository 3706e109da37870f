//! Payment gateway clients.
//!
//! One contract, two variants. The reconciliation engine never trusts a
//! caller-supplied confirmation: it re-verifies against the gateway's own
//! verification endpoint through [`PaymentGateway::verify`], and only the
//! fixed [`VerifiedTransaction`] shape reaches the core — any
//! gateway-specific field beyond it is dropped at the client boundary, as is
//! each gateway's minor-unit convention (Paystack kobo never leave
//! [`paystack`]).

pub mod flutterwave;
pub mod paystack;

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

use zentro_core::CurrencyCode;

pub use flutterwave::FlutterwaveGateway;
pub use paystack::PaystackGateway;

/// Timeout for every outbound gateway call.
pub(crate) const GATEWAY_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

/// Errors from a gateway client.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Network failure or timeout reaching the gateway. Retryable: the
    /// caller is expected to redeliver, and no state may change on this.
    #[error("gateway unreachable: {0}")]
    Unreachable(String),

    /// The gateway answered with an error response.
    #[error("gateway error: {status} - {message}")]
    Api { status: u16, message: String },

    /// The gateway's response did not have the expected shape.
    #[error("gateway response parse error: {0}")]
    Parse(String),

    /// Verification needs the gateway transaction id but none was supplied.
    #[error("missing gateway transaction id")]
    MissingTransactionId,
}

impl GatewayError {
    /// Classify a transport error: timeouts and connection failures are
    /// retryable, anything else is a protocol-level failure.
    pub(crate) fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            Self::Unreachable(err.to_string())
        } else {
            Self::Parse(err.to_string())
        }
    }
}

/// Buyer details forwarded to the hosted checkout page.
#[derive(Debug, Clone, Default)]
pub struct CustomerInfo {
    pub name: String,
    pub email: String,
}

/// Handle to a gateway-hosted checkout.
#[derive(Debug, Clone)]
pub struct CheckoutSession {
    /// Hosted payment page URL (Flutterwave).
    pub checkout_link: Option<String>,
    /// Inline checkout access code (Paystack).
    pub access_code: Option<String>,
}

/// The gateway's authoritative record of a transaction, reduced to the
/// fields the reconciliation engine compares.
#[derive(Debug, Clone)]
pub struct VerifiedTransaction {
    /// Whether the gateway reports the charge as successful.
    pub succeeded: bool,
    /// Settled amount in major units.
    pub amount: Decimal,
    pub currency: CurrencyCode,
    /// The gateway's own transaction id.
    pub external_transaction_id: String,
}

/// A hosted-checkout payment gateway.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Open a checkout for `reference` and return its handle.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Unreachable`] on network failure/timeout and
    /// [`GatewayError::Api`] when the gateway rejects the request.
    async fn initiate(
        &self,
        reference: &str,
        amount: Decimal,
        currency: CurrencyCode,
        customer: &CustomerInfo,
    ) -> Result<CheckoutSession, GatewayError>;

    /// Fetch the gateway's authoritative record of a transaction.
    ///
    /// `reference` is the external reference we generated at initiation;
    /// `transaction_id` is the gateway's id as claimed by the confirmation,
    /// which some gateways verify by instead.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Unreachable`] on network failure/timeout —
    /// the caller must treat this as retryable and change no state.
    async fn verify(
        &self,
        reference: &str,
        transaction_id: Option<&str>,
    ) -> Result<VerifiedTransaction, GatewayError>;
}

/// The configured gateway clients, resolvable by discriminant.
#[derive(Clone)]
pub struct Gateways {
    pub flutterwave: std::sync::Arc<dyn PaymentGateway>,
    pub paystack: std::sync::Arc<dyn PaymentGateway>,
}

impl Gateways {
    /// The client for a gateway discriminant.
    #[must_use]
    pub fn get(&self, gateway: zentro_core::Gateway) -> &dyn PaymentGateway {
        match gateway {
            zentro_core::Gateway::Flutterwave => self.flutterwave.as_ref(),
            zentro_core::Gateway::Paystack => self.paystack.as_ref(),
        }
    }
}
