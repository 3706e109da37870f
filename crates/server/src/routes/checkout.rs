//! Checkout and confirmation handlers.
//!
//! The two confirmation endpoints here carry the user-redirect channel;
//! the server-push channel lives in [`super::webhooks`]. All of them funnel
//! into the reconciliation engine, and the response code mirrors the
//! outcome: retryable verification failures answer 502 so the deliverer
//! redelivers, permanent rejections answer 400, settled confirmations 200.

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::instrument;

use zentro_core::Gateway;

use crate::error::Result;
use crate::middleware::OptionalAuth;
use crate::services::checkout::CheckoutHandle;
use crate::services::identity;
use crate::services::reconcile::ReconcileOutcome;
use crate::state::AppState;

/// Owner identification for POST bodies.
#[derive(Debug, Deserialize)]
pub struct InitiateRequest {
    pub session_id: Option<String>,
}

/// Map a reconciliation outcome to its HTTP response.
pub(crate) fn outcome_response(outcome: &ReconcileOutcome) -> Response {
    match outcome {
        ReconcileOutcome::Completed {
            already_processed, ..
        } => {
            let message = if *already_processed {
                "already processed"
            } else {
                "order created"
            };
            (
                StatusCode::OK,
                Json(serde_json::json!({ "message": message })),
            )
                .into_response()
        }
        ReconcileOutcome::Retryable { reason } => (
            StatusCode::BAD_GATEWAY,
            Json(serde_json::json!({ "error": reason })),
        )
            .into_response(),
        ReconcileOutcome::Rejected { reason } => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": reason })),
        )
            .into_response(),
    }
}

/// Open a Flutterwave checkout for the owner's cart.
#[instrument(skip(state, auth, body))]
pub async fn flutterwave(
    State(state): State<AppState>,
    OptionalAuth(auth): OptionalAuth,
    Json(body): Json<InitiateRequest>,
) -> Result<Json<CheckoutHandle>> {
    let owner = identity::resolve_owner(auth.map(|u| u.id), body.session_id.as_deref())?;
    let handle = state
        .checkout()
        .initiate(&owner, Gateway::Flutterwave)
        .await?;
    Ok(Json(handle))
}

/// Open a Paystack checkout for the owner's cart.
#[instrument(skip(state, auth, body))]
pub async fn paystack(
    State(state): State<AppState>,
    OptionalAuth(auth): OptionalAuth,
    Json(body): Json<InitiateRequest>,
) -> Result<Json<CheckoutHandle>> {
    let owner = identity::resolve_owner(auth.map(|u| u.id), body.session_id.as_deref())?;
    let handle = state.checkout().initiate(&owner, Gateway::Paystack).await?;
    Ok(Json(handle))
}

/// Flutterwave redirect-callback confirmation.
#[derive(Debug, Deserialize)]
pub struct FlutterwaveCallbackRequest {
    pub tx_ref: String,
    pub transaction_id: String,
    pub status: String,
}

/// Reconcile a Flutterwave redirect callback.
///
/// The claimed status is untrusted; it only gates whether verification is
/// attempted at all, never what gets applied.
#[instrument(skip(state, body), fields(tx_ref = %body.tx_ref))]
pub async fn flutterwave_callback(
    State(state): State<AppState>,
    Json(body): Json<FlutterwaveCallbackRequest>,
) -> Result<Response> {
    if body.status != "completed" && body.status != "successful" {
        return Ok((
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "payment not completed" })),
        )
            .into_response());
    }

    let outcome = state
        .reconciler()
        .reconcile(
            Gateway::Flutterwave,
            &body.tx_ref,
            Some(&body.transaction_id),
        )
        .await?;
    Ok(outcome_response(&outcome))
}

/// Paystack redirect-callback confirmation.
#[derive(Debug, Deserialize)]
pub struct PaystackVerifyRequest {
    pub reference: String,
}

/// Reconcile a Paystack redirect callback.
#[instrument(skip(state, body), fields(reference = %body.reference))]
pub async fn paystack_verify(
    State(state): State<AppState>,
    Json(body): Json<PaystackVerifyRequest>,
) -> Result<Response> {
    let outcome = state
        .reconciler()
        .reconcile(Gateway::Paystack, &body.reference, None)
        .await?;
    Ok(outcome_response(&outcome))
}
