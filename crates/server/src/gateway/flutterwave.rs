//! Flutterwave API client.
//!
//! Initiates hosted checkouts via `POST /v3/payments` and verifies
//! transactions via `GET /v3/transactions/{id}/verify`. Flutterwave
//! verification is keyed by the gateway's numeric transaction id, which only
//! confirmations carry — verify therefore requires the claimed id.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use secrecy::ExposeSecret;
use serde::Deserialize;

use zentro_core::CurrencyCode;

use crate::config::FlutterwaveConfig;

use super::{
    CheckoutSession, CustomerInfo, GATEWAY_TIMEOUT, GatewayError, PaymentGateway,
    VerifiedTransaction,
};

const BASE_URL: &str = "https://api.flutterwave.com/v3";

/// Flutterwave client.
#[derive(Clone)]
pub struct FlutterwaveGateway {
    client: reqwest::Client,
    redirect_url: String,
}

impl FlutterwaveGateway {
    /// Create a new Flutterwave client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client fails to build.
    pub fn new(config: &FlutterwaveConfig) -> Result<Self, GatewayError> {
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
            redirect_url: config.redirect_url.clone(),
        })
    }
}

#[async_trait]
impl PaymentGateway for FlutterwaveGateway {
    async fn initiate(
        &self,
        reference: &str,
        amount: Decimal,
        currency: CurrencyCode,
        customer: &CustomerInfo,
    ) -> Result<CheckoutSession, GatewayError> {
        let url = format!("{BASE_URL}/payments");
        let body = serde_json::json!({
            "tx_ref": reference,
            "amount": amount.to_f64(),
            "currency": currency.as_str(),
            "redirect_url": self.redirect_url,
            "customer": {
                "email": customer.email,
                "name": customer.name,
            },
            "customizations": {
                "title": "Zentro",
            },
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

        let payload: InitiateResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Parse(e.to_string()))?;

        let link = payload
            .data
            .and_then(|d| d.link)
            .ok_or_else(|| GatewayError::Parse("payment response carried no link".to_owned()))?;

        Ok(CheckoutSession {
            checkout_link: Some(link),
            access_code: None,
        })
    }

    async fn verify(
        &self,
        _reference: &str,
        transaction_id: Option<&str>,
    ) -> Result<VerifiedTransaction, GatewayError> {
        let transaction_id = transaction_id.ok_or(GatewayError::MissingTransactionId)?;
        let url = format!("{BASE_URL}/transactions/{transaction_id}/verify");

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

        if payload.status != "success" {
            return Err(GatewayError::Api {
                status: status.as_u16(),
                message: format!("verification endpoint reported {}", payload.status),
            });
        }
        let data = payload
            .data
            .ok_or_else(|| GatewayError::Parse("verify response carried no data".to_owned()))?;

        let amount = Decimal::try_from(data.amount)
            .map_err(|e| GatewayError::Parse(format!("unrepresentable amount: {e}")))?
            .round_dp(2);
        let currency = data
            .currency
            .parse::<CurrencyCode>()
            .map_err(|e| GatewayError::Parse(e.to_string()))?;

        Ok(VerifiedTransaction {
            succeeded: data.status == "successful",
            amount,
            currency,
            external_transaction_id: data.id.to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct InitiateResponse {
    data: Option<InitiateData>,
}

#[derive(Debug, Deserialize)]
struct InitiateData {
    link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    status: String,
    data: Option<VerifyData>,
}

#[derive(Debug, Deserialize)]
struct VerifyData {
    id: i64,
    status: String,
    amount: f64,
    currency: String,
}
