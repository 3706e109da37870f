//! Storage for the commerce aggregates.
//!
//! [`CommerceStore`] is the persistence seam: one async method per aggregate
//! operation, grouped by the component that owns it (cart aggregate,
//! shipping profile manager, transaction ledger, settlement). Every method
//! is a single atomic unit — the in-memory backend holds its writer lock
//! across the operation, the Postgres backend wraps it in a SQL transaction
//! — so multi-step semantics like pending-transaction supersession and
//! settlement can never be observed half-applied.
//!
//! Two implementations:
//!
//! - [`memory::MemoryStore`] — authoritative for tests; no external service.
//! - [`postgres::PgStore`] — production backend over sqlx/`PostgreSQL`.

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use thiserror::Error;

use zentro_core::{
    AddressId, CartId, OwnerKey, ProductId, ProfileId, TransactionId, TransactionStatus,
};

use crate::models::{
    AddressFlag, AddressPatch, Cart, CartEntry, GatewayTransaction, LineMutation, NewAddress,
    NewProduct, NewTransaction, NewUser, Order, Product, ProductFilter, QuantityMode,
    ShippingAddress, ShippingProfile, User,
};

/// Storage-layer errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The referenced row does not exist for the resolved owner. Cross-owner
    /// lookups produce this too, never a hint that the row exists elsewhere.
    #[error("not found")]
    NotFound,

    /// A write conflicted with existing data (duplicate slug, zero quantity).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Settlement found no selected shipping address for the cart's owner.
    /// Nothing was written; the transaction stays pending.
    #[error("no selected shipping address")]
    NoSelectedShipping,

    /// A state the invariant enforcement should make unreachable was
    /// observed. Treated as fatal for the operation rather than silently
    /// repaired, since silent repair could mask a concurrency bug.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// Database operation failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored value could not be interpreted (bad status string, broken
    /// snapshot JSON).
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Stored snapshot data failed to (de)serialize.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Outcome of [`CommerceStore::apply_settlement`].
#[derive(Debug, Clone)]
pub enum Settlement {
    /// The transaction completed, the cart was marked paid, and the order
    /// was materialized — all in this call.
    Applied { order: Order },
    /// A previous settlement already did the work; this is the idempotency
    /// fast path and the existing order is returned unchanged.
    AlreadyApplied { order: Order },
    /// The transaction is in a terminal non-completed state (superseded or
    /// failed). Nothing was written.
    Superseded { status: TransactionStatus },
}

/// Persistence operations for the commerce aggregates.
///
/// Implementations must be thread-safe and make each method atomic. Methods
/// taking a `CartId`/`ProfileId` trust the caller to have resolved it via
/// the owning `open_cart`/`get_or_create_profile` for the request's owner;
/// address operations additionally re-check profile membership and answer
/// `NotFound` for cross-profile ids.
#[async_trait]
pub trait CommerceStore: Send + Sync {
    // ------------------------------------------------------------------
    // Users (identity resolution only)
    // ------------------------------------------------------------------

    /// Create a user with an out-of-band bearer token.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if the email or token already exists.
    async fn create_user(&self, new: NewUser) -> Result<User, StoreError>;

    /// Resolve a bearer token to its user.
    async fn find_user_by_token(&self, token: &str) -> Result<Option<User>, StoreError>;

    // ------------------------------------------------------------------
    // Product catalog
    // ------------------------------------------------------------------

    /// Insert a product, deriving its slug from the title.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if the derived slug already exists.
    async fn create_product(&self, new: NewProduct) -> Result<Product, StoreError>;

    /// List products, optionally filtered by category and title substring,
    /// newest first.
    async fn list_products(&self, filter: &ProductFilter) -> Result<Vec<Product>, StoreError>;

    async fn find_product_by_slug(&self, slug: &str) -> Result<Option<Product>, StoreError>;

    // ------------------------------------------------------------------
    // Cart aggregate
    // ------------------------------------------------------------------

    /// Get or create the owner's single unpaid cart.
    ///
    /// `paid = false` is part of the lookup key: once a cart is settled the
    /// next call opens a fresh one and the paid cart becomes archival.
    async fn open_cart(&self, owner: &OwnerKey) -> Result<Cart, StoreError>;

    /// The cart's lines joined with their live products, oldest line first.
    async fn cart_contents(&self, cart_id: CartId) -> Result<Vec<CartEntry>, StoreError>;

    /// Insert or mutate a line as one read-modify-write unit.
    ///
    /// A first insertion takes the requested quantity as-is. On an existing
    /// line, `Increment` adds and `Set` replaces. Any resulting quantity
    /// change cancels the cart's pending transactions in the same unit — a
    /// pending amount quotes a cart snapshot that no longer exists — and the
    /// returned [`LineMutation`] reports how many were canceled.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if the quantity would not be positive, `NotFound`
    /// if the cart or product does not exist.
    async fn upsert_line(
        &self,
        cart_id: CartId,
        product_id: ProductId,
        quantity: u32,
        mode: QuantityMode,
    ) -> Result<LineMutation, StoreError>;

    /// Remove `quantity` units from a line, deleting it when the result
    /// would be zero or less. A surviving decrement supersedes pending
    /// transactions like any other quantity change; removal of the whole
    /// line does not.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the line does not exist.
    async fn remove_units(
        &self,
        cart_id: CartId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<(), StoreError>;

    /// Delete a line outright.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the line does not exist.
    async fn delete_line(&self, cart_id: CartId, product_id: ProductId) -> Result<(), StoreError>;

    /// Delete all lines. Returns how many were removed.
    async fn clear_cart(&self, cart_id: CartId) -> Result<u64, StoreError>;

    /// The owner's settled carts, newest first.
    async fn paid_carts(&self, owner: &OwnerKey) -> Result<Vec<Cart>, StoreError>;

    // ------------------------------------------------------------------
    // Shipping profile manager
    // ------------------------------------------------------------------

    /// Get or create the owner's shipping profile. Idempotent.
    async fn get_or_create_profile(&self, owner: &OwnerKey) -> Result<ShippingProfile, StoreError>;

    /// The profile's addresses: default first, then selected, then newest.
    async fn list_addresses(&self, profile_id: ProfileId)
    -> Result<Vec<ShippingAddress>, StoreError>;

    /// Insert an address.
    ///
    /// The new address always becomes the selected one. With
    /// `requested_default`, sibling defaults are cleared first so commit
    /// order decides races between competing "set default" writes. The
    /// backfill rule (no default/selected exists → promote newest) is
    /// re-applied before returning.
    async fn add_address(
        &self,
        profile_id: ProfileId,
        new: NewAddress,
        requested_default: bool,
    ) -> Result<ShippingAddress, StoreError>;

    /// Partially update an address; flag changes go through the same
    /// exclusivity enforcement as [`set_address_flag`](Self::set_address_flag).
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the address is not in this profile.
    async fn update_address(
        &self,
        profile_id: ProfileId,
        address_id: AddressId,
        patch: AddressPatch,
    ) -> Result<ShippingAddress, StoreError>;

    /// Set or clear one of the exclusive flags. Setting a flag true clears
    /// it on all siblings in the same atomic unit; clearing one triggers the
    /// backfill rule.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the address is not in this profile.
    async fn set_address_flag(
        &self,
        profile_id: ProfileId,
        address_id: AddressId,
        flag: AddressFlag,
        value: bool,
    ) -> Result<ShippingAddress, StoreError>;

    async fn find_address(
        &self,
        profile_id: ProfileId,
        address_id: AddressId,
    ) -> Result<Option<ShippingAddress>, StoreError>;

    /// The currently selected address, if any.
    async fn selected_address(
        &self,
        profile_id: ProfileId,
    ) -> Result<Option<ShippingAddress>, StoreError>;

    // ------------------------------------------------------------------
    // Transaction ledger
    // ------------------------------------------------------------------

    /// Open a pending transaction for a cart.
    ///
    /// Cancels every pending transaction for the cart — any gateway — before
    /// inserting the new row with a freshly generated unique external
    /// reference, atomically. Two simultaneously valid checkout links for
    /// one cart can therefore never exist.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the cart does not exist.
    async fn open_transaction(
        &self,
        cart_id: CartId,
        new: NewTransaction,
    ) -> Result<GatewayTransaction, StoreError>;

    /// Record the gateway's checkout handle after a successful initiate.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the transaction does not exist.
    async fn attach_checkout_session(
        &self,
        id: TransactionId,
        checkout_link: Option<String>,
        access_code: Option<String>,
    ) -> Result<(), StoreError>;

    /// The cart's most recent pending transaction, used to surface a
    /// resumable checkout link.
    async fn find_active_transaction(
        &self,
        cart_id: CartId,
    ) -> Result<Option<GatewayTransaction>, StoreError>;

    async fn find_transaction_by_ref(
        &self,
        external_ref: &str,
    ) -> Result<Option<GatewayTransaction>, StoreError>;

    /// Cancel a transaction if it is still pending. Terminal states are left
    /// untouched — the silent no-op that makes duplicate signals safe.
    /// Returns whether a transition happened.
    async fn cancel_if_pending(&self, id: TransactionId) -> Result<bool, StoreError>;

    /// Mark a transaction failed if it is still pending (gateway rejected
    /// the initiate). Terminal states are left untouched.
    async fn fail_if_pending(&self, id: TransactionId) -> Result<bool, StoreError>;

    // ------------------------------------------------------------------
    // Settlement
    // ------------------------------------------------------------------

    /// Apply a verified confirmation as one atomic unit: transaction →
    /// completed, cart → paid, order materialized from the cart + selected
    /// shipping snapshot. The (cart, tx_ref) uniqueness on orders is the
    /// final arbiter under concurrent invocations — the loser's create
    /// collapses into [`Settlement::AlreadyApplied`].
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown reference and `NoSelectedShipping`
    /// (nothing written) when the owner has no selected address.
    async fn apply_settlement(
        &self,
        external_ref: &str,
        external_transaction_id: &str,
    ) -> Result<Settlement, StoreError>;

    // ------------------------------------------------------------------
    // Orders
    // ------------------------------------------------------------------

    /// The owner's materialized orders, newest first.
    async fn list_orders(&self, owner: &OwnerKey) -> Result<Vec<Order>, StoreError>;
}
