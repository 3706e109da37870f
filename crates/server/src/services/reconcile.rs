//! The reconciliation engine.
//!
//! Both confirmation channels — the user-redirect callback and the
//! asynchronous webhook — funnel into [`Reconciler::reconcile`]. Neither is
//! trusted: the transaction is re-verified against the gateway's own
//! verification endpoint first, and only a corroborated, exactly-matching
//! confirmation reaches the settlement unit. The settlement itself is a
//! single atomic store operation, so however many times and in whatever
//! order confirmations arrive, at most one order is ever materialized per
//! transaction.

use std::sync::Arc;

use tracing::instrument;

use zentro_core::{Gateway, OrderId, TransactionStatus};

use crate::error::AppError;
use crate::gateway::{GatewayError, Gateways};
use crate::store::{CommerceStore, Settlement, StoreError};

/// What a reconciliation attempt amounted to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The confirmation was corroborated and settled — either by this call
    /// or, for a duplicate delivery, by an earlier one.
    Completed {
        order_id: OrderId,
        already_processed: bool,
    },
    /// Verification could not be performed; nothing changed and the
    /// deliverer should retry.
    Retryable { reason: &'static str },
    /// The confirmation can never settle (unknown reference, mismatch,
    /// superseded transaction, missing shipping). Nothing changed.
    Rejected { reason: &'static str },
}

/// Corroborates gateway confirmations and applies their effects exactly once.
#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn CommerceStore>,
    gateways: Gateways,
}

impl Reconciler {
    #[must_use]
    pub const fn new(store: Arc<dyn CommerceStore>, gateways: Gateways) -> Self {
        Self { store, gateways }
    }

    /// Reconcile one confirmation signal.
    ///
    /// `claimed_transaction_id` is whatever the untrusted confirmation
    /// carried; gateways that verify by transaction id need it, and the
    /// settled id is always taken from the gateway's verified record, never
    /// from the claim.
    ///
    /// # Errors
    ///
    /// Only infrastructure failures (storage) surface as errors; every
    /// business-level result, including permanent rejections, is an
    /// [`ReconcileOutcome`].
    #[instrument(skip(self))]
    pub async fn reconcile(
        &self,
        gateway: Gateway,
        external_ref: &str,
        claimed_transaction_id: Option<&str>,
    ) -> Result<ReconcileOutcome, AppError> {
        // Corroborate first. No state may change while this is in flight,
        // and no lock is held across it.
        let verified = match self
            .gateways
            .get(gateway)
            .verify(external_ref, claimed_transaction_id)
            .await
        {
            Ok(verified) => verified,
            Err(GatewayError::Unreachable(err)) => {
                tracing::warn!(error = %err, "gateway verification unreachable");
                return Ok(ReconcileOutcome::Retryable {
                    reason: "gateway verification unreachable",
                });
            }
            Err(err) => {
                tracing::warn!(error = %err, "gateway verification failed");
                return Ok(ReconcileOutcome::Rejected {
                    reason: "gateway verification failed",
                });
            }
        };

        let Some(transaction) = self.store.find_transaction_by_ref(external_ref).await? else {
            tracing::warn!("confirmation for unknown transaction");
            return Ok(ReconcileOutcome::Rejected {
                reason: "unknown transaction",
            });
        };

        // Exact comparison on amount and currency, for transactions still
        // awaiting settlement: a terminal transaction takes the idempotency
        // fast path (or the superseded rejection) inside the settlement unit
        // instead of being re-validated. A mismatch leaves the transaction
        // pending for manual review rather than failing it.
        if transaction.status == TransactionStatus::Pending
            && (!verified.succeeded
                || verified.amount != transaction.amount
                || verified.currency != transaction.currency)
        {
            tracing::warn!(
                verified_succeeded = verified.succeeded,
                verified_amount = %verified.amount,
                ledger_amount = %transaction.amount,
                verified_currency = %verified.currency,
                ledger_currency = %transaction.currency,
                "verification mismatch; transaction left pending"
            );
            return Ok(ReconcileOutcome::Rejected {
                reason: "verification mismatch",
            });
        }

        match self
            .store
            .apply_settlement(external_ref, &verified.external_transaction_id)
            .await
        {
            Ok(Settlement::Applied { order }) => {
                tracing::info!(order_id = %order.id, "order created");
                Ok(ReconcileOutcome::Completed {
                    order_id: order.id,
                    already_processed: false,
                })
            }
            Ok(Settlement::AlreadyApplied { order }) => {
                tracing::info!(order_id = %order.id, "confirmation already processed");
                Ok(ReconcileOutcome::Completed {
                    order_id: order.id,
                    already_processed: true,
                })
            }
            Ok(Settlement::Superseded { status }) => {
                tracing::warn!(status = %status, "confirmation for superseded transaction");
                Ok(ReconcileOutcome::Rejected {
                    reason: "transaction superseded",
                })
            }
            Err(StoreError::NoSelectedShipping) => {
                tracing::warn!("no selected shipping address; transaction left pending");
                Ok(ReconcileOutcome::Rejected {
                    reason: "no selected shipping address",
                })
            }
            Err(StoreError::NotFound) => Ok(ReconcileOutcome::Rejected {
                reason: "unknown transaction",
            }),
            Err(err) => Err(err.into()),
        }
    }
}
