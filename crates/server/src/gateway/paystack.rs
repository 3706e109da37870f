//! Paystack API client.
//!
//! Initiates checkouts via `POST /transaction/initialize` and verifies via
//! `GET /transaction/verify/{reference}`. Paystack amounts are integer kobo;
//! the conversion happens here, at the boundary, so the core only ever
//! compares major-unit decimals.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use secrecy::ExposeSecret;
use serde::Deserialize;

use zentro_core::CurrencyCode;

use crate::config::PaystackConfig;

use super::{
    CheckoutSession, CustomerInfo, GATEWAY_TIMEOUT, GatewayError, PaymentGateway,
    VerifiedTransaction,
};

const BASE_URL: &str = "https://api.paystack.co";

/// Paystack client.
#[derive(Clone)]
pub struct PaystackGateway {
    client: reqwest::Client,
    callback_url: String,
}

impl PaystackGateway {
    /// Create a new Paystack client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client fails to build.
    pub fn new(config: &PaystackConfig) -> Result<Self, GatewayError> {
        let mut headers = HeaderMap::new();
        let auth_value = format!("Bearer {}", config.secret_key.expose_secret());
        headers.insert(
            "Authorization",
            HeaderValue::from_str(&auth_value)
                .map_err(|e| GatewayError::Parse(format!("invalid secret key format: {e}")))?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(GATEWAY_TIMEOUT)
            .build()
            .map_err(GatewayError::from_transport)?;

        Ok(Self {
            client,
            callback_url: config.callback_url.clone(),
        })
    }
}

/// Convert a major-unit amount to integer kobo.
fn to_kobo(amount: Decimal) -> Result<i64, GatewayError> {
    (amount * Decimal::from(100))
        .round()
        .to_i64()
        .ok_or_else(|| GatewayError::Parse(format!("unrepresentable amount: {amount}")))
}

#[async_trait]
impl PaymentGateway for PaystackGateway {
    async fn initiate(
        &self,
        reference: &str,
        amount: Decimal,
        currency: CurrencyCode,
        customer: &CustomerInfo,
    ) -> Result<CheckoutSession, GatewayError> {
        let url = format!("{BASE_URL}/transaction/initialize");
        let body = serde_json::json!({
            "reference": reference,
            "email": customer.email,
            "amount": to_kobo(amount)?,
            "currency": currency.as_str(),
            "callback_url": self.callback_url,
        });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(GatewayError::from_transport)?;
        let status = response.status();

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(GatewayError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let payload: InitializeResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Parse(e.to_string()))?;
        let data = payload
            .data
            .ok_or_else(|| GatewayError::Parse("initialize response carried no data".to_owned()))?;

        Ok(CheckoutSession {
            checkout_link: Some(data.authorization_url),
            access_code: Some(data.access_code),
        })
    }

    async fn verify(
        &self,
        reference: &str,
        _transaction_id: Option<&str>,
    ) -> Result<VerifiedTransaction, GatewayError> {
        let url = format!("{BASE_URL}/transaction/verify/{reference}");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(GatewayError::from_transport)?;
        let status = response.status();

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(GatewayError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let payload: VerifyResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Parse(e.to_string()))?;

        if !payload.status {
            return Err(GatewayError::Api {
                status: status.as_u16(),
                message: "verification endpoint reported failure".to_owned(),
            });
        }
        let data = payload
            .data
            .ok_or_else(|| GatewayError::Parse("verify response carried no data".to_owned()))?;

        let currency = data
            .currency
            .parse::<CurrencyCode>()
            .map_err(|e| GatewayError::Parse(e.to_string()))?;

        Ok(VerifiedTransaction {
            succeeded: data.status == "success",
            // Kobo back to major units.
            amount: Decimal::new(data.amount, 2),
            currency,
            external_transaction_id: data.id.to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct InitializeResponse {
    data: Option<InitializeData>,
}

#[derive(Debug, Deserialize)]
struct InitializeData {
    authorization_url: String,
    access_code: String,
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    status: bool,
    data: Option<VerifyData>,
}

#[derive(Debug, Deserialize)]
struct VerifyData {
    id: i64,
    status: String,
    amount: i64,
    currency: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kobo_conversion_is_exact_for_two_decimal_places() {
        assert_eq!(to_kobo("104.00".parse().unwrap()).unwrap(), 10400);
        assert_eq!(to_kobo("0.01".parse().unwrap()).unwrap(), 1);
        assert_eq!(Decimal::new(10400, 2), "104.00".parse().unwrap());
    }
}
