//! In-memory store implementation.
//!
//! Authoritative for tests and local development: every trait operation
//! takes the single writer lock (or reader lock for queries), so each call
//! is one atomic unit and all per-cart / per-profile / per-reference
//! read-modify-write sequences are serialized.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use zentro_core::{
    AddressId, CartId, LineId, OrderId, OwnerKey, ProductId, ProfileId, TransactionId,
    TransactionStatus, UserId,
};

use crate::models::{
    AddressFlag, AddressPatch, Cart, CartEntry, CartLine, GatewayTransaction, LineMutation,
    NewAddress, NewProduct, NewTransaction, NewUser, Order, OrderDraft, Product, ProductFilter,
    QuantityMode, ShippingAddress, ShippingProfile, User, product::slugify,
};

use super::{CommerceStore, Settlement, StoreError};

#[derive(Default)]
struct Tables {
    seq: i32,
    users: BTreeMap<i32, User>,
    tokens: BTreeMap<String, UserId>,
    products: BTreeMap<i32, Product>,
    carts: BTreeMap<i32, Cart>,
    lines: BTreeMap<i32, CartLine>,
    profiles: BTreeMap<i32, ShippingProfile>,
    addresses: BTreeMap<i32, ShippingAddress>,
    transactions: BTreeMap<i32, GatewayTransaction>,
    orders: BTreeMap<i32, Order>,
}

impl Tables {
    fn next_id(&mut self) -> i32 {
        self.seq += 1;
        self.seq
    }

    fn line_entry(&self, cart_id: CartId, product_id: ProductId) -> Option<i32> {
        self.lines
            .iter()
            .find(|(_, line)| line.cart_id == cart_id && line.product_id == product_id)
            .map(|(id, _)| *id)
    }

    /// Cancel every pending transaction for a cart, any gateway.
    fn cancel_pending_for_cart(&mut self, cart_id: CartId) -> u32 {
        let now = Utc::now();
        let mut canceled = 0;
        for tx in self.transactions.values_mut() {
            if tx.cart_id == cart_id && tx.status == TransactionStatus::Pending {
                tx.status = TransactionStatus::Canceled;
                tx.updated_at = now;
                canceled += 1;
            }
        }
        canceled
    }

    /// Profile address ids, most recently created first.
    fn profile_addresses_desc(&self, profile_id: ProfileId) -> Vec<i32> {
        let mut ids: Vec<i32> = self
            .addresses
            .iter()
            .filter(|(_, a)| a.profile_id == profile_id)
            .map(|(id, _)| *id)
            .collect();
        ids.sort_by_key(|id| {
            let a = &self.addresses[id];
            (a.created_at, a.id)
        });
        ids.reverse();
        ids
    }

    /// Re-establish "a default and a selected address exist" after a write,
    /// promoting the most recently created address when a flag is vacant.
    fn backfill_address_flags(&mut self, profile_id: ProfileId) {
        let ids = self.profile_addresses_desc(profile_id);
        let Some(newest) = ids.first().copied() else {
            return;
        };
        if !ids.iter().any(|id| self.addresses[id].is_default) {
            if let Some(a) = self.addresses.get_mut(&newest) {
                a.is_default = true;
            }
        }
        if !ids.iter().any(|id| self.addresses[id].selected) {
            if let Some(a) = self.addresses.get_mut(&newest) {
                a.selected = true;
            }
        }
    }

    /// Reject (rather than silently repair) a double default/selected.
    fn check_address_flags(&self, profile_id: ProfileId) -> Result<(), StoreError> {
        let addresses: Vec<&ShippingAddress> = self
            .addresses
            .values()
            .filter(|a| a.profile_id == profile_id)
            .collect();
        let defaults = addresses.iter().filter(|a| a.is_default).count();
        let selected = addresses.iter().filter(|a| a.selected).count();
        if defaults > 1 || selected > 1 {
            return Err(StoreError::InvariantViolation(format!(
                "profile {profile_id} has {defaults} defaults and {selected} selected addresses"
            )));
        }
        Ok(())
    }

    fn address_in_profile(
        &mut self,
        profile_id: ProfileId,
        address_id: AddressId,
    ) -> Result<i32, StoreError> {
        let key = address_id.as_i32();
        match self.addresses.get(&key) {
            Some(a) if a.profile_id == profile_id => Ok(key),
            _ => Err(StoreError::NotFound),
        }
    }

    fn contents(&self, cart_id: CartId) -> Result<Vec<CartEntry>, StoreError> {
        let mut entries = Vec::new();
        for line in self.lines.values().filter(|l| l.cart_id == cart_id) {
            let product = self
                .products
                .get(&line.product_id.as_i32())
                .ok_or_else(|| {
                    StoreError::InvariantViolation(format!(
                        "cart line {} references missing product {}",
                        line.id, line.product_id
                    ))
                })?;
            entries.push(CartEntry {
                line: line.clone(),
                product: product.clone(),
            });
        }
        entries.sort_by_key(|e| (e.line.created_at, e.line.id));
        Ok(entries)
    }
}

/// In-memory [`CommerceStore`].
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CommerceStore for MemoryStore {
    async fn create_user(&self, new: NewUser) -> Result<User, StoreError> {
        let mut t = self.tables.write().await;
        if t.users.values().any(|u| u.email == new.email) {
            return Err(StoreError::Conflict("email already exists".to_owned()));
        }
        if t.tokens.contains_key(&new.api_token) {
            return Err(StoreError::Conflict("token already exists".to_owned()));
        }
        let id = t.next_id();
        let user = User {
            id: UserId::new(id),
            email: new.email,
            created_at: Utc::now(),
        };
        t.users.insert(id, user.clone());
        t.tokens.insert(new.api_token, user.id);
        Ok(user)
    }

    async fn find_user_by_token(&self, token: &str) -> Result<Option<User>, StoreError> {
        let t = self.tables.read().await;
        Ok(t.tokens
            .get(token)
            .and_then(|id| t.users.get(&id.as_i32()))
            .cloned())
    }

    async fn create_product(&self, new: NewProduct) -> Result<Product, StoreError> {
        let mut t = self.tables.write().await;
        let slug = slugify(&new.title);
        if t.products.values().any(|p| p.slug == slug) {
            return Err(StoreError::Conflict(format!("slug already exists: {slug}")));
        }
        let id = t.next_id();
        let product = Product {
            id: ProductId::new(id),
            title: new.title,
            slug,
            price: new.price,
            image: new.image,
            category: new.category,
            description: new.description,
            created_at: Utc::now(),
        };
        t.products.insert(id, product.clone());
        Ok(product)
    }

    async fn list_products(&self, filter: &ProductFilter) -> Result<Vec<Product>, StoreError> {
        let t = self.tables.read().await;
        let search = filter.search.as_ref().map(|s| s.to_lowercase());
        let mut products: Vec<Product> = t
            .products
            .values()
            .filter(|p| filter.category.is_none_or(|c| p.category == Some(c)))
            .filter(|p| {
                search
                    .as_ref()
                    .is_none_or(|s| p.title.to_lowercase().contains(s))
            })
            .cloned()
            .collect();
        products.sort_by_key(|p| std::cmp::Reverse((p.created_at, p.id)));
        Ok(products)
    }

    async fn find_product_by_slug(&self, slug: &str) -> Result<Option<Product>, StoreError> {
        let t = self.tables.read().await;
        Ok(t.products.values().find(|p| p.slug == slug).cloned())
    }

    async fn open_cart(&self, owner: &OwnerKey) -> Result<Cart, StoreError> {
        let mut t = self.tables.write().await;
        if let Some(cart) = t.carts.values().find(|c| &c.owner == owner && !c.paid) {
            return Ok(cart.clone());
        }
        let id = t.next_id();
        let now = Utc::now();
        let cart = Cart {
            id: CartId::new(id),
            owner: owner.clone(),
            paid: false,
            created_at: now,
            updated_at: now,
        };
        t.carts.insert(id, cart.clone());
        Ok(cart)
    }

    async fn cart_contents(&self, cart_id: CartId) -> Result<Vec<CartEntry>, StoreError> {
        let t = self.tables.read().await;
        if !t.carts.contains_key(&cart_id.as_i32()) {
            return Err(StoreError::NotFound);
        }
        t.contents(cart_id)
    }

    async fn upsert_line(
        &self,
        cart_id: CartId,
        product_id: ProductId,
        quantity: u32,
        mode: QuantityMode,
    ) -> Result<LineMutation, StoreError> {
        if quantity == 0 {
            return Err(StoreError::Conflict("quantity must be positive".to_owned()));
        }
        let mut t = self.tables.write().await;
        if !t.carts.contains_key(&cart_id.as_i32()) {
            return Err(StoreError::NotFound);
        }
        if !t.products.contains_key(&product_id.as_i32()) {
            return Err(StoreError::NotFound);
        }

        match t.line_entry(cart_id, product_id) {
            None => {
                let id = t.next_id();
                let line = CartLine {
                    id: LineId::new(id),
                    cart_id,
                    product_id,
                    quantity,
                    created_at: Utc::now(),
                };
                t.lines.insert(id, line.clone());
                Ok(LineMutation {
                    line,
                    superseded: 0,
                })
            }
            Some(key) => {
                let current = t.lines[&key].quantity;
                let next = match mode {
                    QuantityMode::Increment => current + quantity,
                    QuantityMode::Set => quantity,
                };
                if next == current {
                    return Ok(LineMutation {
                        line: t.lines[&key].clone(),
                        superseded: 0,
                    });
                }
                // The pending amount quotes the old snapshot; cancel in the
                // same unit as the quantity write.
                let superseded = t.cancel_pending_for_cart(cart_id);
                let line = t
                    .lines
                    .get_mut(&key)
                    .ok_or(StoreError::NotFound)?;
                line.quantity = next;
                let line = line.clone();
                Ok(LineMutation { line, superseded })
            }
        }
    }

    async fn remove_units(
        &self,
        cart_id: CartId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<(), StoreError> {
        let mut t = self.tables.write().await;
        let key = t
            .line_entry(cart_id, product_id)
            .ok_or(StoreError::NotFound)?;
        let current = t.lines[&key].quantity;
        if current > quantity {
            let superseded = t.cancel_pending_for_cart(cart_id);
            if superseded > 0 {
                tracing::debug!(cart_id = %cart_id, superseded, "canceled pending transactions");
            }
            if let Some(line) = t.lines.get_mut(&key) {
                line.quantity = current - quantity;
            }
        } else {
            t.lines.remove(&key);
        }
        Ok(())
    }

    async fn delete_line(&self, cart_id: CartId, product_id: ProductId) -> Result<(), StoreError> {
        let mut t = self.tables.write().await;
        let key = t
            .line_entry(cart_id, product_id)
            .ok_or(StoreError::NotFound)?;
        t.lines.remove(&key);
        Ok(())
    }

    async fn clear_cart(&self, cart_id: CartId) -> Result<u64, StoreError> {
        let mut t = self.tables.write().await;
        let keys: Vec<i32> = t
            .lines
            .iter()
            .filter(|(_, l)| l.cart_id == cart_id)
            .map(|(id, _)| *id)
            .collect();
        for key in &keys {
            t.lines.remove(key);
        }
        Ok(keys.len() as u64)
    }

    async fn paid_carts(&self, owner: &OwnerKey) -> Result<Vec<Cart>, StoreError> {
        let t = self.tables.read().await;
        let mut carts: Vec<Cart> = t
            .carts
            .values()
            .filter(|c| &c.owner == owner && c.paid)
            .cloned()
            .collect();
        carts.sort_by_key(|c| std::cmp::Reverse((c.created_at, c.id)));
        Ok(carts)
    }

    async fn get_or_create_profile(&self, owner: &OwnerKey) -> Result<ShippingProfile, StoreError> {
        let mut t = self.tables.write().await;
        if let Some(profile) = t.profiles.values().find(|p| &p.owner == owner) {
            return Ok(profile.clone());
        }
        let id = t.next_id();
        let profile = ShippingProfile {
            id: ProfileId::new(id),
            owner: owner.clone(),
            created_at: Utc::now(),
        };
        t.profiles.insert(id, profile.clone());
        Ok(profile)
    }

    async fn list_addresses(
        &self,
        profile_id: ProfileId,
    ) -> Result<Vec<ShippingAddress>, StoreError> {
        let t = self.tables.read().await;
        let mut addresses: Vec<ShippingAddress> = t
            .addresses
            .values()
            .filter(|a| a.profile_id == profile_id)
            .cloned()
            .collect();
        addresses.sort_by_key(|a| {
            (
                std::cmp::Reverse(a.is_default),
                std::cmp::Reverse(a.selected),
                std::cmp::Reverse((a.created_at, a.id)),
            )
        });
        Ok(addresses)
    }

    async fn add_address(
        &self,
        profile_id: ProfileId,
        new: NewAddress,
        requested_default: bool,
    ) -> Result<ShippingAddress, StoreError> {
        let mut t = self.tables.write().await;
        if !t.profiles.contains_key(&profile_id.as_i32()) {
            return Err(StoreError::NotFound);
        }

        // Exclusivity first: clear sibling flags, then insert the winner.
        for a in t.addresses.values_mut().filter(|a| a.profile_id == profile_id) {
            a.selected = false;
            if requested_default {
                a.is_default = false;
            }
        }

        let id = t.next_id();
        let address = ShippingAddress {
            id: AddressId::new(id),
            profile_id,
            name: new.name,
            phone: new.phone,
            city: new.city,
            state: new.state,
            address: new.address,
            zip_code: new.zip_code,
            country: new.country,
            email: new.email,
            selected: true,
            is_default: requested_default,
            created_at: Utc::now(),
        };
        t.addresses.insert(id, address);
        t.backfill_address_flags(profile_id);
        t.check_address_flags(profile_id)?;
        Ok(t.addresses[&id].clone())
    }

    async fn update_address(
        &self,
        profile_id: ProfileId,
        address_id: AddressId,
        patch: AddressPatch,
    ) -> Result<ShippingAddress, StoreError> {
        let mut t = self.tables.write().await;
        let key = t.address_in_profile(profile_id, address_id)?;

        if patch.selected == Some(true) {
            for a in t.addresses.values_mut().filter(|a| a.profile_id == profile_id) {
                a.selected = false;
            }
        }
        if patch.is_default == Some(true) {
            for a in t.addresses.values_mut().filter(|a| a.profile_id == profile_id) {
                a.is_default = false;
            }
        }

        let address = t.addresses.get_mut(&key).ok_or(StoreError::NotFound)?;
        if let Some(name) = patch.name {
            address.name = Some(name);
        }
        if let Some(phone) = patch.phone {
            address.phone = Some(phone);
        }
        if let Some(city) = patch.city {
            address.city = Some(city);
        }
        if let Some(state) = patch.state {
            address.state = Some(state);
        }
        if let Some(addr) = patch.address {
            address.address = Some(addr);
        }
        if let Some(zip_code) = patch.zip_code {
            address.zip_code = Some(zip_code);
        }
        if let Some(country) = patch.country {
            address.country = Some(country);
        }
        if let Some(email) = patch.email {
            address.email = Some(email);
        }
        if let Some(selected) = patch.selected {
            address.selected = selected;
        }
        if let Some(is_default) = patch.is_default {
            address.is_default = is_default;
        }

        t.backfill_address_flags(profile_id);
        t.check_address_flags(profile_id)?;
        Ok(t.addresses[&key].clone())
    }

    async fn set_address_flag(
        &self,
        profile_id: ProfileId,
        address_id: AddressId,
        flag: AddressFlag,
        value: bool,
    ) -> Result<ShippingAddress, StoreError> {
        let mut t = self.tables.write().await;
        let key = t.address_in_profile(profile_id, address_id)?;

        if value {
            for a in t.addresses.values_mut().filter(|a| a.profile_id == profile_id) {
                match flag {
                    AddressFlag::Default => a.is_default = false,
                    AddressFlag::Selected => a.selected = false,
                }
            }
        }
        if let Some(address) = t.addresses.get_mut(&key) {
            match flag {
                AddressFlag::Default => address.is_default = value,
                AddressFlag::Selected => address.selected = value,
            }
        }

        t.backfill_address_flags(profile_id);
        t.check_address_flags(profile_id)?;
        Ok(t.addresses[&key].clone())
    }

    async fn find_address(
        &self,
        profile_id: ProfileId,
        address_id: AddressId,
    ) -> Result<Option<ShippingAddress>, StoreError> {
        let t = self.tables.read().await;
        Ok(t.addresses
            .get(&address_id.as_i32())
            .filter(|a| a.profile_id == profile_id)
            .cloned())
    }

    async fn selected_address(
        &self,
        profile_id: ProfileId,
    ) -> Result<Option<ShippingAddress>, StoreError> {
        let t = self.tables.read().await;
        Ok(t.addresses
            .values()
            .find(|a| a.profile_id == profile_id && a.selected)
            .cloned())
    }

    async fn open_transaction(
        &self,
        cart_id: CartId,
        new: NewTransaction,
    ) -> Result<GatewayTransaction, StoreError> {
        let mut t = self.tables.write().await;
        if !t.carts.contains_key(&cart_id.as_i32()) {
            return Err(StoreError::NotFound);
        }
        let superseded = t.cancel_pending_for_cart(cart_id);
        if superseded > 0 {
            tracing::info!(cart_id = %cart_id, superseded, "superseded pending transactions");
        }
        let id = t.next_id();
        let now = Utc::now();
        let tx = GatewayTransaction {
            id: TransactionId::new(id),
            cart_id,
            gateway: new.gateway,
            external_ref: Uuid::new_v4().to_string(),
            external_transaction_id: None,
            checkout_link: None,
            access_code: None,
            amount: new.amount,
            currency: new.currency,
            status: TransactionStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        t.transactions.insert(id, tx.clone());
        Ok(tx)
    }

    async fn attach_checkout_session(
        &self,
        id: TransactionId,
        checkout_link: Option<String>,
        access_code: Option<String>,
    ) -> Result<(), StoreError> {
        let mut t = self.tables.write().await;
        let tx = t
            .transactions
            .get_mut(&id.as_i32())
            .ok_or(StoreError::NotFound)?;
        tx.checkout_link = checkout_link;
        tx.access_code = access_code;
        tx.updated_at = Utc::now();
        Ok(())
    }

    async fn find_active_transaction(
        &self,
        cart_id: CartId,
    ) -> Result<Option<GatewayTransaction>, StoreError> {
        let t = self.tables.read().await;
        Ok(t.transactions
            .values()
            .filter(|tx| tx.cart_id == cart_id && tx.status == TransactionStatus::Pending)
            .max_by_key(|tx| (tx.created_at, tx.id))
            .cloned())
    }

    async fn find_transaction_by_ref(
        &self,
        external_ref: &str,
    ) -> Result<Option<GatewayTransaction>, StoreError> {
        let t = self.tables.read().await;
        Ok(t.transactions
            .values()
            .find(|tx| tx.external_ref == external_ref)
            .cloned())
    }

    async fn cancel_if_pending(&self, id: TransactionId) -> Result<bool, StoreError> {
        let mut t = self.tables.write().await;
        let Some(tx) = t.transactions.get_mut(&id.as_i32()) else {
            return Ok(false);
        };
        if tx.status != TransactionStatus::Pending {
            return Ok(false);
        }
        tx.status = TransactionStatus::Canceled;
        tx.updated_at = Utc::now();
        Ok(true)
    }

    async fn fail_if_pending(&self, id: TransactionId) -> Result<bool, StoreError> {
        let mut t = self.tables.write().await;
        let Some(tx) = t.transactions.get_mut(&id.as_i32()) else {
            return Ok(false);
        };
        if tx.status != TransactionStatus::Pending {
            return Ok(false);
        }
        tx.status = TransactionStatus::Failed;
        tx.updated_at = Utc::now();
        Ok(true)
    }

    async fn apply_settlement(
        &self,
        external_ref: &str,
        external_transaction_id: &str,
    ) -> Result<Settlement, StoreError> {
        let mut t = self.tables.write().await;

        let tx = t
            .transactions
            .values()
            .find(|tx| tx.external_ref == external_ref)
            .cloned()
            .ok_or(StoreError::NotFound)?;

        match tx.status {
            TransactionStatus::Completed => {
                // Idempotency fast path: the order must already exist.
                let order = t
                    .orders
                    .values()
                    .find(|o| o.cart_id == tx.cart_id && o.tx_ref == tx.external_ref)
                    .cloned()
                    .ok_or_else(|| {
                        StoreError::InvariantViolation(format!(
                            "completed transaction {} has no order",
                            tx.external_ref
                        ))
                    })?;
                return Ok(Settlement::AlreadyApplied { order });
            }
            TransactionStatus::Canceled | TransactionStatus::Failed => {
                return Ok(Settlement::Superseded { status: tx.status });
            }
            TransactionStatus::Pending => {}
        }

        // Gather everything before the first write so a missing shipping
        // address aborts with no partial state.
        let cart = t
            .carts
            .get(&tx.cart_id.as_i32())
            .cloned()
            .ok_or(StoreError::NotFound)?;
        let entries = t.contents(cart.id)?;
        let shipping = t
            .profiles
            .values()
            .find(|p| p.owner == cart.owner)
            .map(|p| p.id)
            .and_then(|profile_id| {
                t.addresses
                    .values()
                    .find(|a| a.profile_id == profile_id && a.selected)
                    .cloned()
            })
            .ok_or(StoreError::NoSelectedShipping)?;

        let draft = OrderDraft::materialize(
            &cart,
            &entries,
            &shipping,
            &tx.external_ref,
            external_transaction_id,
            tx.amount,
        );

        let now = Utc::now();
        if let Some(row) = t.transactions.get_mut(&tx.id.as_i32()) {
            row.status = TransactionStatus::Completed;
            row.external_transaction_id = Some(external_transaction_id.to_owned());
            row.updated_at = now;
        }
        if let Some(row) = t.carts.get_mut(&cart.id.as_i32()) {
            row.paid = true;
            row.updated_at = now;
        }

        // The (cart, tx_ref) uniqueness is the final arbiter: a concurrent
        // settlement that got here first leaves an order to return as-is.
        if let Some(existing) = t
            .orders
            .values()
            .find(|o| o.cart_id == draft.cart_id && o.tx_ref == draft.tx_ref)
            .cloned()
        {
            return Ok(Settlement::AlreadyApplied { order: existing });
        }

        let id = t.next_id();
        let order = Order {
            id: OrderId::new(id),
            cart_id: draft.cart_id,
            tx_ref: draft.tx_ref,
            full_name: draft.full_name,
            email: draft.email,
            phone: draft.phone,
            address: draft.address,
            city: draft.city,
            state: draft.state,
            zip_code: draft.zip_code,
            country: draft.country,
            lines: draft.lines,
            total_amount: draft.total_amount,
            external_transaction_id: draft.external_transaction_id,
            payment_status: draft.payment_status,
            created_at: now,
        };
        t.orders.insert(id, order.clone());
        Ok(Settlement::Applied { order })
    }

    async fn list_orders(&self, owner: &OwnerKey) -> Result<Vec<Order>, StoreError> {
        let t = self.tables.read().await;
        let cart_ids: Vec<CartId> = t
            .carts
            .values()
            .filter(|c| &c.owner == owner)
            .map(|c| c.id)
            .collect();
        let mut orders: Vec<Order> = t
            .orders
            .values()
            .filter(|o| cart_ids.contains(&o.cart_id))
            .cloned()
            .collect();
        orders.sort_by_key(|o| std::cmp::Reverse((o.created_at, o.id)));
        Ok(orders)
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use zentro_core::{CurrencyCode, Gateway};

    use super::*;

    fn owner() -> OwnerKey {
        OwnerKey::Anonymous("test-session".to_owned())
    }

    async fn seed_product(store: &MemoryStore, title: &str, price: &str) -> Product {
        store
            .create_product(NewProduct {
                title: title.to_owned(),
                price: price.parse().unwrap(),
                image: None,
                category: None,
                description: None,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn open_cart_is_idempotent_until_paid() {
        let store = MemoryStore::new();
        let first = store.open_cart(&owner()).await.unwrap();
        let second = store.open_cart(&owner()).await.unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn upsert_line_increments_and_sets() {
        let store = MemoryStore::new();
        let product = seed_product(&store, "Widget", "10.00").await;
        let cart = store.open_cart(&owner()).await.unwrap();

        let m = store
            .upsert_line(cart.id, product.id, 2, QuantityMode::Increment)
            .await
            .unwrap();
        assert_eq!(m.line.quantity, 2);

        let m = store
            .upsert_line(cart.id, product.id, 3, QuantityMode::Increment)
            .await
            .unwrap();
        assert_eq!(m.line.quantity, 5);

        let m = store
            .upsert_line(cart.id, product.id, 1, QuantityMode::Set)
            .await
            .unwrap();
        assert_eq!(m.line.quantity, 1);
    }

    #[tokio::test]
    async fn quantity_change_supersedes_pending_transaction() {
        let store = MemoryStore::new();
        let product = seed_product(&store, "Widget", "10.00").await;
        let cart = store.open_cart(&owner()).await.unwrap();
        store
            .upsert_line(cart.id, product.id, 1, QuantityMode::Increment)
            .await
            .unwrap();

        let tx = store
            .open_transaction(
                cart.id,
                NewTransaction {
                    gateway: Gateway::Flutterwave,
                    amount: Decimal::new(1400, 2),
                    currency: CurrencyCode::NGN,
                },
            )
            .await
            .unwrap();

        let m = store
            .upsert_line(cart.id, product.id, 2, QuantityMode::Set)
            .await
            .unwrap();
        assert_eq!(m.superseded, 1);

        let reloaded = store
            .find_transaction_by_ref(&tx.external_ref)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reloaded.status, TransactionStatus::Canceled);
        assert!(
            store
                .find_active_transaction(cart.id)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn remove_units_deletes_at_zero() {
        let store = MemoryStore::new();
        let product = seed_product(&store, "Widget", "10.00").await;
        let cart = store.open_cart(&owner()).await.unwrap();
        store
            .upsert_line(cart.id, product.id, 2, QuantityMode::Increment)
            .await
            .unwrap();

        store.remove_units(cart.id, product.id, 1).await.unwrap();
        let entries = store.cart_contents(cart.id).await.unwrap();
        assert_eq!(entries[0].line.quantity, 1);

        store.remove_units(cart.id, product.id, 1).await.unwrap();
        assert!(store.cart_contents(cart.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn open_transaction_keeps_a_single_pending_row() {
        let store = MemoryStore::new();
        let cart = store.open_cart(&owner()).await.unwrap();

        let mut opened = Vec::new();
        for _ in 0..3 {
            let tx = store
                .open_transaction(
                    cart.id,
                    NewTransaction {
                        gateway: Gateway::Flutterwave,
                        amount: Decimal::new(500, 2),
                        currency: CurrencyCode::NGN,
                    },
                )
                .await
                .unwrap();
            opened.push(tx);
        }

        let mut pending = 0;
        for tx in &opened {
            let reloaded = store
                .find_transaction_by_ref(&tx.external_ref)
                .await
                .unwrap()
                .unwrap();
            if reloaded.status == TransactionStatus::Pending {
                pending += 1;
            }
        }
        assert_eq!(pending, 1);

        let active = store
            .find_active_transaction(cart.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(active.external_ref, opened[2].external_ref);
    }

    #[tokio::test]
    async fn terminal_transactions_ignore_transitions() {
        let store = MemoryStore::new();
        let cart = store.open_cart(&owner()).await.unwrap();
        let tx = store
            .open_transaction(
                cart.id,
                NewTransaction {
                    gateway: Gateway::Paystack,
                    amount: Decimal::new(500, 2),
                    currency: CurrencyCode::NGN,
                },
            )
            .await
            .unwrap();

        assert!(store.cancel_if_pending(tx.id).await.unwrap());
        assert!(!store.cancel_if_pending(tx.id).await.unwrap());
        assert!(!store.fail_if_pending(tx.id).await.unwrap());
    }
}
