//! Shipping profile manager integration tests.
//!
//! The exclusivity invariant under test: after every mutating operation,
//! exactly one address per profile is default and exactly one is selected
//! (once the profile is non-empty).

mod support;

use zentro_core::{AddressId, OwnerKey};
use zentro_server::models::{AddressFlag, AddressPatch, NewAddress, ShippingAddress};
use zentro_server::store::StoreError;

use support::{harness, session_owner};

fn named(name: &str) -> NewAddress {
    NewAddress {
        name: Some(name.to_owned()),
        email: Some(format!("{name}@example.com")),
        ..NewAddress::default()
    }
}

fn assert_exclusive(addresses: &[ShippingAddress]) {
    assert_eq!(
        addresses.iter().filter(|a| a.is_default).count(),
        1,
        "exactly one default"
    );
    assert_eq!(
        addresses.iter().filter(|a| a.selected).count(),
        1,
        "exactly one selected"
    );
}

async fn profile_of(
    h: &support::Harness,
    owner: &OwnerKey,
) -> zentro_core::ProfileId {
    h.store.get_or_create_profile(owner).await.unwrap().id
}

#[tokio::test]
async fn get_or_create_profile_is_idempotent() {
    let h = harness();
    let owner = session_owner("profile");
    let first = h.store.get_or_create_profile(&owner).await.unwrap();
    let second = h.store.get_or_create_profile(&owner).await.unwrap();
    assert_eq!(first.id, second.id);
}

#[tokio::test]
async fn first_address_becomes_default_and_selected() {
    let h = harness();
    let owner = session_owner("first-address");
    let profile = profile_of(&h, &owner).await;

    let address = h
        .store
        .add_address(profile, named("home"), false)
        .await
        .unwrap();
    assert!(address.is_default, "backfilled as the only address");
    assert!(address.selected, "new addresses are always selected");

    assert_exclusive(&h.store.list_addresses(profile).await.unwrap());
}

#[tokio::test]
async fn every_mutation_preserves_exclusivity() {
    let h = harness();
    let owner = session_owner("mutations");
    let profile = profile_of(&h, &owner).await;

    let home = h
        .store
        .add_address(profile, named("home"), false)
        .await
        .unwrap();
    assert_exclusive(&h.store.list_addresses(profile).await.unwrap());

    // A second address takes selection but not the default.
    let office = h
        .store
        .add_address(profile, named("office"), false)
        .await
        .unwrap();
    assert!(office.selected);
    assert!(!office.is_default);
    let addresses = h.store.list_addresses(profile).await.unwrap();
    assert_exclusive(&addresses);
    assert!(
        addresses
            .iter()
            .any(|a| a.id == home.id && a.is_default && !a.selected)
    );

    // Requesting default clears the previous holder.
    let warehouse = h
        .store
        .add_address(profile, named("warehouse"), true)
        .await
        .unwrap();
    assert!(warehouse.is_default && warehouse.selected);
    assert_exclusive(&h.store.list_addresses(profile).await.unwrap());

    // Flag writes move exclusivity, never duplicate it.
    let moved = h
        .store
        .set_address_flag(profile, home.id, AddressFlag::Selected, true)
        .await
        .unwrap();
    assert!(moved.selected);
    assert_exclusive(&h.store.list_addresses(profile).await.unwrap());

    let defaulted = h
        .store
        .set_address_flag(profile, office.id, AddressFlag::Default, true)
        .await
        .unwrap();
    assert!(defaulted.is_default);
    assert_exclusive(&h.store.list_addresses(profile).await.unwrap());
}

#[tokio::test]
async fn clearing_a_flag_promotes_the_newest_address() {
    let h = harness();
    let owner = session_owner("backfill");
    let profile = profile_of(&h, &owner).await;

    h.store
        .add_address(profile, named("old"), true)
        .await
        .unwrap();
    let newest = h
        .store
        .add_address(profile, named("new"), false)
        .await
        .unwrap();

    // Clear selection on the only selected address: the newest one wins the
    // backfill (which here is itself).
    let cleared = h
        .store
        .set_address_flag(profile, newest.id, AddressFlag::Selected, false)
        .await
        .unwrap();
    assert!(cleared.selected, "backfill re-selected the newest address");
    assert_exclusive(&h.store.list_addresses(profile).await.unwrap());
}

#[tokio::test]
async fn partial_update_can_move_flags() {
    let h = harness();
    let owner = session_owner("patch");
    let profile = profile_of(&h, &owner).await;

    let home = h
        .store
        .add_address(profile, named("home"), true)
        .await
        .unwrap();
    let office = h
        .store
        .add_address(profile, named("office"), false)
        .await
        .unwrap();

    let updated = h
        .store
        .update_address(
            profile,
            office.id,
            AddressPatch {
                city: Some("Abuja".to_owned()),
                is_default: Some(true),
                ..AddressPatch::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.city.as_deref(), Some("Abuja"));
    assert!(updated.is_default);

    let addresses = h.store.list_addresses(profile).await.unwrap();
    assert_exclusive(&addresses);
    assert!(
        addresses
            .iter()
            .any(|a| a.id == home.id && !a.is_default)
    );
}

#[tokio::test]
async fn cross_profile_access_answers_not_found() {
    let h = harness();
    let alice = session_owner("alice");
    let bob = session_owner("bob");

    let alice_profile = profile_of(&h, &alice).await;
    let bob_profile = profile_of(&h, &bob).await;
    let alice_home = h
        .store
        .add_address(alice_profile, named("home"), false)
        .await
        .unwrap();

    // Bob cannot see, update, or flag Alice's address.
    assert!(
        h.store
            .find_address(bob_profile, alice_home.id)
            .await
            .unwrap()
            .is_none()
    );
    assert!(matches!(
        h.store
            .update_address(bob_profile, alice_home.id, AddressPatch::default())
            .await,
        Err(StoreError::NotFound)
    ));
    assert!(matches!(
        h.store
            .set_address_flag(bob_profile, alice_home.id, AddressFlag::Selected, true)
            .await,
        Err(StoreError::NotFound)
    ));

    // And an id that exists nowhere behaves the same.
    assert!(matches!(
        h.store
            .update_address(bob_profile, AddressId::new(9999), AddressPatch::default())
            .await,
        Err(StoreError::NotFound)
    ));
}

#[tokio::test]
async fn selected_address_is_surfaced() {
    let h = harness();
    let owner = session_owner("selected");
    let profile = profile_of(&h, &owner).await;

    assert!(h.store.selected_address(profile).await.unwrap().is_none());

    h.store
        .add_address(profile, named("home"), false)
        .await
        .unwrap();
    let selected = h
        .store
        .selected_address(profile)
        .await
        .unwrap()
        .expect("an address is selected");
    assert_eq!(selected.name.as_deref(), Some("home"));
}
