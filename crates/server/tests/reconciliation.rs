//! Reconciliation engine integration tests.
//!
//! Exercises the exactly-once settlement guarantees over the in-memory
//! store with a scripted gateway: duplicate and concurrent confirmations,
//! mismatched verifications, unreachable gateways, superseded transactions,
//! and the missing-shipping policy.

mod support;

use zentro_core::{Gateway, TransactionStatus};
use zentro_server::models::QuantityMode;
use zentro_server::services::reconcile::ReconcileOutcome;

use support::{MockVerify, harness, seed_product, seed_selected_address, session_owner, verified};

#[tokio::test]
async fn paid_checkout_creates_exactly_one_order() {
    let h = harness();
    let owner = session_owner("s1");
    let product = seed_product(&h.store, "P1", "50.00").await;
    seed_selected_address(&h.store, &owner).await;

    let cart = h.store.open_cart(&owner).await.unwrap();
    h.store
        .upsert_line(cart.id, product.id, 2, QuantityMode::Increment)
        .await
        .unwrap();

    let handle = h.checkout.initiate(&owner, Gateway::Flutterwave).await.unwrap();
    assert_eq!(handle.amount, "104.00".parse().unwrap());
    assert!(handle.checkout_link.is_some());

    h.gateway.set_fallback(verified("104.00", "T1")).await;

    let outcome = h
        .reconciler
        .reconcile(Gateway::Flutterwave, &handle.external_ref, Some("T1"))
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        ReconcileOutcome::Completed {
            already_processed: false,
            ..
        }
    ));

    // Cart flipped to paid; the next open_cart starts a fresh one.
    let next_cart = h.store.open_cart(&owner).await.unwrap();
    assert_ne!(next_cart.id, cart.id);

    let orders = h.store.list_orders(&owner).await.unwrap();
    assert_eq!(orders.len(), 1);
    let order = &orders[0];
    assert_eq!(order.total_amount, "104.00".parse().unwrap());
    assert_eq!(order.external_transaction_id, "T1");
    assert_eq!(order.lines.len(), 1);
    assert_eq!(order.lines[0].quantity, 2);
    assert_eq!(order.lines[0].unit_price, "50.00".parse().unwrap());
    assert_eq!(order.full_name, "Ada Obi");

    // Duplicate delivery: same success, no second order.
    let again = h
        .reconciler
        .reconcile(Gateway::Flutterwave, &handle.external_ref, Some("T1"))
        .await
        .unwrap();
    assert!(matches!(
        again,
        ReconcileOutcome::Completed {
            already_processed: true,
            ..
        }
    ));
    assert_eq!(h.store.list_orders(&owner).await.unwrap().len(), 1);
}

#[tokio::test]
async fn concurrent_confirmations_settle_once() {
    let h = harness();
    let owner = session_owner("s-concurrent");
    let product = seed_product(&h.store, "P1", "50.00").await;
    seed_selected_address(&h.store, &owner).await;

    let cart = h.store.open_cart(&owner).await.unwrap();
    h.store
        .upsert_line(cart.id, product.id, 2, QuantityMode::Increment)
        .await
        .unwrap();
    let handle = h.checkout.initiate(&owner, Gateway::Flutterwave).await.unwrap();

    h.gateway.set_fallback(verified("104.00", "T1")).await;

    // Callback and webhook racing for the same reference.
    let (a, b) = tokio::join!(
        h.reconciler
            .reconcile(Gateway::Flutterwave, &handle.external_ref, Some("T1")),
        h.reconciler
            .reconcile(Gateway::Flutterwave, &handle.external_ref, Some("T1")),
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    let already = [&a, &b]
        .iter()
        .filter(|o| {
            matches!(
                o,
                ReconcileOutcome::Completed {
                    already_processed: true,
                    ..
                }
            )
        })
        .count();
    let fresh = [&a, &b]
        .iter()
        .filter(|o| {
            matches!(
                o,
                ReconcileOutcome::Completed {
                    already_processed: false,
                    ..
                }
            )
        })
        .count();
    assert_eq!(fresh, 1, "exactly one settlement applies");
    assert_eq!(already, 1, "the loser collapses into already-processed");
    assert_eq!(h.store.list_orders(&owner).await.unwrap().len(), 1);
}

#[tokio::test]
async fn amount_mismatch_leaves_transaction_pending() {
    let h = harness();
    let owner = session_owner("s-mismatch");
    let product = seed_product(&h.store, "P1", "50.00").await;
    seed_selected_address(&h.store, &owner).await;

    let cart = h.store.open_cart(&owner).await.unwrap();
    h.store
        .upsert_line(cart.id, product.id, 2, QuantityMode::Increment)
        .await
        .unwrap();
    let handle = h.checkout.initiate(&owner, Gateway::Flutterwave).await.unwrap();

    // Ledger says 104.00 (4.00 tax); the gateway settled 100.00.
    h.gateway.set_fallback(verified("100.00", "T1")).await;

    let outcome = h
        .reconciler
        .reconcile(Gateway::Flutterwave, &handle.external_ref, Some("T1"))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        ReconcileOutcome::Rejected {
            reason: "verification mismatch"
        }
    );

    // Left pending for manual review, never auto-failed; no order.
    let tx = h
        .store
        .find_transaction_by_ref(&handle.external_ref)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(tx.status, TransactionStatus::Pending);
    assert!(h.store.list_orders(&owner).await.unwrap().is_empty());
}

#[tokio::test]
async fn failed_gateway_status_is_a_mismatch() {
    let h = harness();
    let owner = session_owner("s-failed");
    let product = seed_product(&h.store, "P1", "50.00").await;
    seed_selected_address(&h.store, &owner).await;

    let cart = h.store.open_cart(&owner).await.unwrap();
    h.store
        .upsert_line(cart.id, product.id, 2, QuantityMode::Increment)
        .await
        .unwrap();
    let handle = h.checkout.initiate(&owner, Gateway::Flutterwave).await.unwrap();

    let mut failed = verified("104.00", "T1");
    failed.succeeded = false;
    h.gateway.set_fallback(failed).await;

    let outcome = h
        .reconciler
        .reconcile(Gateway::Flutterwave, &handle.external_ref, Some("T1"))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        ReconcileOutcome::Rejected {
            reason: "verification mismatch"
        }
    );
    assert!(h.store.list_orders(&owner).await.unwrap().is_empty());
}

#[tokio::test]
async fn unreachable_gateway_is_retryable_and_mutates_nothing() {
    let h = harness();
    let owner = session_owner("s-retry");
    let product = seed_product(&h.store, "P1", "50.00").await;
    seed_selected_address(&h.store, &owner).await;

    let cart = h.store.open_cart(&owner).await.unwrap();
    h.store
        .upsert_line(cart.id, product.id, 2, QuantityMode::Increment)
        .await
        .unwrap();
    let handle = h.checkout.initiate(&owner, Gateway::Flutterwave).await.unwrap();

    h.gateway.push(MockVerify::Unreachable).await;
    let outcome = h
        .reconciler
        .reconcile(Gateway::Flutterwave, &handle.external_ref, Some("T1"))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        ReconcileOutcome::Retryable {
            reason: "gateway verification unreachable"
        }
    );

    let tx = h
        .store
        .find_transaction_by_ref(&handle.external_ref)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(tx.status, TransactionStatus::Pending);

    // Redelivery after the outage succeeds.
    h.gateway.set_fallback(verified("104.00", "T1")).await;
    let outcome = h
        .reconciler
        .reconcile(Gateway::Flutterwave, &handle.external_ref, Some("T1"))
        .await
        .unwrap();
    assert!(matches!(outcome, ReconcileOutcome::Completed { .. }));
}

#[tokio::test]
async fn unknown_reference_is_rejected() {
    let h = harness();
    h.gateway.set_fallback(verified("104.00", "T1")).await;

    let outcome = h
        .reconciler
        .reconcile(Gateway::Flutterwave, "no-such-ref", Some("T1"))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        ReconcileOutcome::Rejected {
            reason: "unknown transaction"
        }
    );
}

#[tokio::test]
async fn superseded_transaction_never_settles() {
    let h = harness();
    let owner = session_owner("s-superseded");
    let product = seed_product(&h.store, "P1", "50.00").await;
    seed_selected_address(&h.store, &owner).await;

    let cart = h.store.open_cart(&owner).await.unwrap();
    h.store
        .upsert_line(cart.id, product.id, 2, QuantityMode::Increment)
        .await
        .unwrap();
    let handle = h.checkout.initiate(&owner, Gateway::Flutterwave).await.unwrap();

    // Cart mutated after checkout: the pending row is canceled.
    h.store
        .upsert_line(cart.id, product.id, 5, QuantityMode::Set)
        .await
        .unwrap();

    h.gateway.set_fallback(verified("104.00", "T1")).await;
    let outcome = h
        .reconciler
        .reconcile(Gateway::Flutterwave, &handle.external_ref, Some("T1"))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        ReconcileOutcome::Rejected {
            reason: "transaction superseded"
        }
    );

    let cart = h.store.open_cart(&owner).await.unwrap();
    assert!(!cart.paid);
    assert!(h.store.list_orders(&owner).await.unwrap().is_empty());
}

#[tokio::test]
async fn settlement_without_selected_shipping_stays_pending() {
    let h = harness();
    let owner = session_owner("s-no-ship");
    let product = seed_product(&h.store, "P1", "50.00").await;
    // No address at all for this owner.

    let cart = h.store.open_cart(&owner).await.unwrap();
    h.store
        .upsert_line(cart.id, product.id, 2, QuantityMode::Increment)
        .await
        .unwrap();
    let handle = h.checkout.initiate(&owner, Gateway::Flutterwave).await.unwrap();

    h.gateway.set_fallback(verified("104.00", "T1")).await;
    let outcome = h
        .reconciler
        .reconcile(Gateway::Flutterwave, &handle.external_ref, Some("T1"))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        ReconcileOutcome::Rejected {
            reason: "no selected shipping address"
        }
    );

    // Recoverable: the transaction is still pending, so fixing the profile
    // and redelivering settles normally.
    let tx = h
        .store
        .find_transaction_by_ref(&handle.external_ref)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(tx.status, TransactionStatus::Pending);

    seed_selected_address(&h.store, &owner).await;
    let outcome = h
        .reconciler
        .reconcile(Gateway::Flutterwave, &handle.external_ref, Some("T1"))
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        ReconcileOutcome::Completed {
            already_processed: false,
            ..
        }
    ));
    assert_eq!(h.store.list_orders(&owner).await.unwrap().len(), 1);
}

#[tokio::test]
async fn paystack_confirmations_flow_through_the_same_engine() {
    let h = harness();
    let owner = session_owner("s-paystack");
    let product = seed_product(&h.store, "P1", "50.00").await;
    seed_selected_address(&h.store, &owner).await;

    let cart = h.store.open_cart(&owner).await.unwrap();
    h.store
        .upsert_line(cart.id, product.id, 2, QuantityMode::Increment)
        .await
        .unwrap();
    let handle = h.checkout.initiate(&owner, Gateway::Paystack).await.unwrap();
    assert!(handle.access_code.is_some());

    h.gateway.set_fallback(verified("104.00", "PS-9")).await;
    let outcome = h
        .reconciler
        .reconcile(Gateway::Paystack, &handle.external_ref, None)
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        ReconcileOutcome::Completed {
            already_processed: false,
            ..
        }
    ));

    let orders = h.store.list_orders(&owner).await.unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].external_transaction_id, "PS-9");
}
