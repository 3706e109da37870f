//! Cart aggregate and transaction ledger integration tests.

mod support;

use zentro_core::{Gateway, TransactionStatus};
use zentro_server::models::{CartTotals, ProductFilter, QuantityMode};
use zentro_server::store::StoreError;

use support::{harness, seed_product, session_owner};

#[tokio::test]
async fn one_unpaid_cart_per_owner() {
    let h = harness();
    let a = session_owner("owner-a");
    let b = session_owner("owner-b");

    let cart_a1 = h.store.open_cart(&a).await.unwrap();
    let cart_a2 = h.store.open_cart(&a).await.unwrap();
    let cart_b = h.store.open_cart(&b).await.unwrap();

    assert_eq!(cart_a1.id, cart_a2.id);
    assert_ne!(cart_a1.id, cart_b.id);
}

#[tokio::test]
async fn totals_reflect_live_prices() {
    let h = harness();
    let owner = session_owner("totals");
    let p1 = seed_product(&h.store, "P1", "50.00").await;
    let p2 = seed_product(&h.store, "P2", "1.25").await;

    let cart = h.store.open_cart(&owner).await.unwrap();
    h.store
        .upsert_line(cart.id, p1.id, 2, QuantityMode::Increment)
        .await
        .unwrap();
    h.store
        .upsert_line(cart.id, p2.id, 4, QuantityMode::Increment)
        .await
        .unwrap();

    let entries = h.store.cart_contents(cart.id).await.unwrap();
    let totals = CartTotals::compute(&entries);
    assert_eq!(totals.item_count, 6);
    assert_eq!(totals.subtotal, "105.00".parse().unwrap());
}

#[tokio::test]
async fn repeated_checkouts_leave_one_pending_transaction() {
    let h = harness();
    let owner = session_owner("repeat-checkout");
    let product = seed_product(&h.store, "P1", "50.00").await;

    let cart = h.store.open_cart(&owner).await.unwrap();
    h.store
        .upsert_line(cart.id, product.id, 1, QuantityMode::Increment)
        .await
        .unwrap();

    let first = h.checkout.initiate(&owner, Gateway::Flutterwave).await.unwrap();
    let second = h.checkout.initiate(&owner, Gateway::Paystack).await.unwrap();
    assert_ne!(first.external_ref, second.external_ref);

    // The first row was superseded across gateways.
    let first_tx = h
        .store
        .find_transaction_by_ref(&first.external_ref)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first_tx.status, TransactionStatus::Canceled);

    let active = h
        .store
        .find_active_transaction(cart.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(active.external_ref, second.external_ref);
}

#[tokio::test]
async fn cart_mutation_cancels_pending_checkout() {
    let h = harness();
    let owner = session_owner("stale-on-mutate");
    let product = seed_product(&h.store, "P1", "50.00").await;

    let cart = h.store.open_cart(&owner).await.unwrap();
    h.store
        .upsert_line(cart.id, product.id, 2, QuantityMode::Increment)
        .await
        .unwrap();
    h.checkout.initiate(&owner, Gateway::Flutterwave).await.unwrap();

    let mutation = h
        .store
        .upsert_line(cart.id, product.id, 3, QuantityMode::Set)
        .await
        .unwrap();
    assert_eq!(mutation.superseded, 1);
    assert!(
        h.store
            .find_active_transaction(cart.id)
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn unchanged_quantity_does_not_supersede() {
    let h = harness();
    let owner = session_owner("same-quantity");
    let product = seed_product(&h.store, "P1", "50.00").await;

    let cart = h.store.open_cart(&owner).await.unwrap();
    h.store
        .upsert_line(cart.id, product.id, 2, QuantityMode::Increment)
        .await
        .unwrap();
    h.checkout.initiate(&owner, Gateway::Flutterwave).await.unwrap();

    // Setting the same quantity is a no-op mutation.
    let mutation = h
        .store
        .upsert_line(cart.id, product.id, 2, QuantityMode::Set)
        .await
        .unwrap();
    assert_eq!(mutation.superseded, 0);
    assert!(
        h.store
            .find_active_transaction(cart.id)
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn empty_cart_cannot_open_a_checkout() {
    let h = harness();
    let owner = session_owner("empty-cart");
    h.store.open_cart(&owner).await.unwrap();

    let err = h
        .checkout
        .initiate(&owner, Gateway::Flutterwave)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("cart is empty"));
}

#[tokio::test]
async fn zero_quantity_upsert_is_rejected() {
    let h = harness();
    let owner = session_owner("zero-quantity");
    let product = seed_product(&h.store, "P1", "50.00").await;
    let cart = h.store.open_cart(&owner).await.unwrap();

    let err = h
        .store
        .upsert_line(cart.id, product.id, 0, QuantityMode::Set)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));
}

#[tokio::test]
async fn line_operations_on_missing_lines_answer_not_found() {
    let h = harness();
    let owner = session_owner("missing-lines");
    let product = seed_product(&h.store, "P1", "50.00").await;
    let cart = h.store.open_cart(&owner).await.unwrap();

    assert!(matches!(
        h.store.remove_units(cart.id, product.id, 1).await,
        Err(StoreError::NotFound)
    ));
    assert!(matches!(
        h.store.delete_line(cart.id, product.id).await,
        Err(StoreError::NotFound)
    ));
}

#[tokio::test]
async fn catalog_filters_by_category_and_title() {
    let h = harness();
    seed_product(&h.store, "Wireless Headphones", "149.99").await;
    seed_product(&h.store, "Gold Ring", "82.50").await;

    let all = h
        .store
        .list_products(&ProductFilter::default())
        .await
        .unwrap();
    assert_eq!(all.len(), 2);

    let hits = h
        .store
        .list_products(&ProductFilter {
            category: None,
            search: Some("headph".to_owned()),
        })
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].slug, "wireless-headphones");

    let found = h
        .store
        .find_product_by_slug("gold-ring")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.title, "Gold Ring");
}
