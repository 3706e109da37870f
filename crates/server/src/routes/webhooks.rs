//! Gateway webhook handlers.
//!
//! The server-push confirmation channel. Authenticity is checked here, at
//! the collaborator layer, before the reconciliation engine is invoked: the
//! `verif-hash` header must match the shared secret from the gateway
//! dashboard. The engine itself re-verifies the transaction either way.

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use secrecy::ExposeSecret;
use serde::Deserialize;
use tracing::instrument;

use zentro_core::Gateway;

use crate::error::{AppError, Result};
use crate::state::AppState;

use super::checkout::outcome_response;

/// Flutterwave webhook event, reduced to the fields reconciliation needs.
#[derive(Debug, Deserialize)]
pub struct FlutterwaveEvent {
    #[serde(rename = "txRef", alias = "tx_ref")]
    pub tx_ref: Option<String>,
    pub id: Option<i64>,
    pub status: Option<String>,
}

/// Handle a Flutterwave webhook delivery.
///
/// Successful events are reconciled; everything else is acknowledged so the
/// gateway stops redelivering. A retryable reconciliation outcome answers
/// 502, which makes the gateway redeliver later.
#[instrument(skip(state, headers, event))]
pub async fn flutterwave(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(event): Json<FlutterwaveEvent>,
) -> Result<Response> {
    let expected = state.config().flutterwave.webhook_hash.expose_secret();
    let provided = headers.get("verif-hash").and_then(|v| v.to_str().ok());
    if provided != Some(expected) {
        tracing::warn!("webhook with missing or invalid signature");
        return Err(AppError::Unauthorized("invalid webhook signature".to_owned()));
    }

    if event.status.as_deref() == Some("successful")
        && let Some(tx_ref) = event.tx_ref.as_deref()
    {
        let claimed_id = event.id.map(|id| id.to_string());
        let outcome = state
            .reconciler()
            .reconcile(Gateway::Flutterwave, tx_ref, claimed_id.as_deref())
            .await?;
        return Ok(outcome_response(&outcome));
    }

    Ok((
        StatusCode::OK,
        Json(serde_json::json!({ "message": "webhook received" })),
    )
        .into_response())
}
