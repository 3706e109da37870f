//! `PostgreSQL` store implementation.
//!
//! Runtime-checked queries over sqlx: every multi-step operation runs in a
//! SQL transaction with row locks on the aggregate being mutated, so each
//! trait call is one atomic unit. The schema's partial unique indexes back
//! the invariants (one unpaid cart per owner, one pending transaction per
//! cart, one default/selected address per profile, one order per
//! (cart, tx_ref)); a unique-violation here means a concurrent writer won
//! and is mapped accordingly rather than surfaced as a raw database error.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction as SqlTx};
use uuid::Uuid;

use zentro_core::{
    AddressId, CartId, CurrencyCode, Gateway, LineId, OrderId, OwnerKey, PaymentStatus, ProductId,
    ProfileId, TransactionId, TransactionStatus, UserId,
};

use crate::models::{
    AddressFlag, AddressPatch, Cart, CartEntry, CartLine, GatewayTransaction, LineMutation,
    NewAddress, NewProduct, NewTransaction, NewUser, Order, OrderDraft, OrderLine, Product,
    ProductFilter, QuantityMode, ShippingAddress, ShippingProfile, User, product::slugify,
};

use super::{CommerceStore, Settlement, StoreError};

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// Run the schema migrations in `crates/server/migrations/`.
///
/// # Errors
///
/// Returns `MigrateError` if a migration fails to apply.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

/// `PostgreSQL`-backed [`CommerceStore`].
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a new store over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a reference to the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_to_user(row: &PgRow) -> Result<User, StoreError> {
        Ok(User {
            id: UserId::new(row.try_get("id")?),
            email: row.try_get("email")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_product(row: &PgRow) -> Result<Product, StoreError> {
        let category: Option<String> = row.try_get("category")?;
        let category = category
            .map(|c| c.parse())
            .transpose()
            .map_err(|e| StoreError::DataCorruption(format!("invalid category in database: {e}")))?;
        Ok(Product {
            id: ProductId::new(row.try_get("id")?),
            title: row.try_get("title")?,
            slug: row.try_get("slug")?,
            price: row.try_get("price")?,
            image: row.try_get("image")?,
            category,
            description: row.try_get("description")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_owner(row: &PgRow) -> Result<OwnerKey, StoreError> {
        let user_id: Option<i32> = row.try_get("user_id")?;
        let session_token: Option<String> = row.try_get("session_token")?;
        OwnerKey::resolve(user_id.map(UserId::new), session_token.as_deref())
            .map_err(|_| StoreError::DataCorruption("ownerless row in database".to_owned()))
    }

    fn row_to_cart(row: &PgRow) -> Result<Cart, StoreError> {
        Ok(Cart {
            id: CartId::new(row.try_get("id")?),
            owner: Self::row_owner(row)?,
            paid: row.try_get("paid")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_line(row: &PgRow) -> Result<CartLine, StoreError> {
        let quantity: i32 = row.try_get("quantity")?;
        let quantity = u32::try_from(quantity)
            .map_err(|_| StoreError::DataCorruption("negative quantity in database".to_owned()))?;
        Ok(CartLine {
            id: LineId::new(row.try_get("id")?),
            cart_id: CartId::new(row.try_get("cart_id")?),
            product_id: ProductId::new(row.try_get("product_id")?),
            quantity,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_profile(row: &PgRow) -> Result<ShippingProfile, StoreError> {
        Ok(ShippingProfile {
            id: ProfileId::new(row.try_get("id")?),
            owner: Self::row_owner(row)?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_address(row: &PgRow) -> Result<ShippingAddress, StoreError> {
        Ok(ShippingAddress {
            id: AddressId::new(row.try_get("id")?),
            profile_id: ProfileId::new(row.try_get("profile_id")?),
            name: row.try_get("name")?,
            phone: row.try_get("phone")?,
            city: row.try_get("city")?,
            state: row.try_get("state")?,
            address: row.try_get("address")?,
            zip_code: row.try_get("zip_code")?,
            country: row.try_get("country")?,
            email: row.try_get("email")?,
            selected: row.try_get("selected")?,
            is_default: row.try_get("is_default")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_transaction(row: &PgRow) -> Result<GatewayTransaction, StoreError> {
        let gateway: String = row.try_get("gateway")?;
        let gateway: Gateway = gateway
            .parse()
            .map_err(|e| StoreError::DataCorruption(format!("invalid gateway in database: {e}")))?;
        let status: String = row.try_get("status")?;
        let status: TransactionStatus = status
            .parse()
            .map_err(|e| StoreError::DataCorruption(format!("invalid status in database: {e}")))?;
        let currency: String = row.try_get("currency")?;
        let currency: CurrencyCode = currency
            .parse()
            .map_err(|e| StoreError::DataCorruption(format!("invalid currency in database: {e}")))?;
        Ok(GatewayTransaction {
            id: TransactionId::new(row.try_get("id")?),
            cart_id: CartId::new(row.try_get("cart_id")?),
            gateway,
            external_ref: row.try_get("external_ref")?,
            external_transaction_id: row.try_get("external_transaction_id")?,
            checkout_link: row.try_get("checkout_link")?,
            access_code: row.try_get("access_code")?,
            amount: row.try_get("amount")?,
            currency,
            status,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_order(row: &PgRow) -> Result<Order, StoreError> {
        let lines: serde_json::Value = row.try_get("lines")?;
        let lines: Vec<OrderLine> = serde_json::from_value(lines)
            .map_err(|e| StoreError::DataCorruption(format!("invalid order snapshot: {e}")))?;
        let payment_status: String = row.try_get("payment_status")?;
        let payment_status: PaymentStatus = payment_status.parse().map_err(|e| {
            StoreError::DataCorruption(format!("invalid payment status in database: {e}"))
        })?;
        Ok(Order {
            id: OrderId::new(row.try_get("id")?),
            cart_id: CartId::new(row.try_get("cart_id")?),
            tx_ref: row.try_get("tx_ref")?,
            full_name: row.try_get("full_name")?,
            email: row.try_get("email")?,
            phone: row.try_get("phone")?,
            address: row.try_get("address")?,
            city: row.try_get("city")?,
            state: row.try_get("state")?,
            zip_code: row.try_get("zip_code")?,
            country: row.try_get("country")?,
            lines,
            total_amount: row.try_get("total_amount")?,
            external_transaction_id: row.try_get("external_transaction_id")?,
            payment_status,
            created_at: row.try_get("created_at")?,
        })
    }

    /// Lock the cart row, returning `NotFound` for an unknown id.
    async fn lock_cart(
        tx: &mut SqlTx<'_, Postgres>,
        cart_id: CartId,
    ) -> Result<Cart, StoreError> {
        let row = sqlx::query("SELECT * FROM carts WHERE id = $1 FOR UPDATE")
            .bind(cart_id.as_i32())
            .fetch_optional(&mut **tx)
            .await?
            .ok_or(StoreError::NotFound)?;
        Self::row_to_cart(&row)
    }

    /// Cancel every pending transaction for a cart. Caller holds the cart lock.
    async fn cancel_pending(
        tx: &mut SqlTx<'_, Postgres>,
        cart_id: CartId,
    ) -> Result<u32, StoreError> {
        let result = sqlx::query(
            "UPDATE transactions SET status = 'canceled', updated_at = now()
             WHERE cart_id = $1 AND status = 'pending'",
        )
        .bind(cart_id.as_i32())
        .execute(&mut **tx)
        .await?;
        Ok(u32::try_from(result.rows_affected()).unwrap_or(u32::MAX))
    }

    /// Re-establish the default/selected backfill after an address write,
    /// then verify exclusivity. Caller holds the profile lock.
    async fn restore_address_flags(
        tx: &mut SqlTx<'_, Postgres>,
        profile_id: ProfileId,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE shipping_addresses SET is_default = TRUE
             WHERE id = (SELECT id FROM shipping_addresses WHERE profile_id = $1
                         ORDER BY created_at DESC, id DESC LIMIT 1)
               AND NOT EXISTS (SELECT 1 FROM shipping_addresses
                               WHERE profile_id = $1 AND is_default)",
        )
        .bind(profile_id.as_i32())
        .execute(&mut **tx)
        .await?;
        sqlx::query(
            "UPDATE shipping_addresses SET selected = TRUE
             WHERE id = (SELECT id FROM shipping_addresses WHERE profile_id = $1
                         ORDER BY created_at DESC, id DESC LIMIT 1)
               AND NOT EXISTS (SELECT 1 FROM shipping_addresses
                               WHERE profile_id = $1 AND selected)",
        )
        .bind(profile_id.as_i32())
        .execute(&mut **tx)
        .await?;

        let row = sqlx::query(
            "SELECT count(*) FILTER (WHERE is_default) AS defaults,
                    count(*) FILTER (WHERE selected) AS selections
             FROM shipping_addresses WHERE profile_id = $1",
        )
        .bind(profile_id.as_i32())
        .fetch_one(&mut **tx)
        .await?;
        let defaults: i64 = row.try_get("defaults")?;
        let selections: i64 = row.try_get("selections")?;
        if defaults > 1 || selections > 1 {
            return Err(StoreError::InvariantViolation(format!(
                "profile {profile_id} has {defaults} defaults and {selections} selected addresses"
            )));
        }
        Ok(())
    }

    /// Lock the profile row, returning `NotFound` for an unknown id.
    async fn lock_profile(
        tx: &mut SqlTx<'_, Postgres>,
        profile_id: ProfileId,
    ) -> Result<(), StoreError> {
        sqlx::query("SELECT id FROM shipping_profiles WHERE id = $1 FOR UPDATE")
            .bind(profile_id.as_i32())
            .fetch_optional(&mut **tx)
            .await?
            .ok_or(StoreError::NotFound)?;
        Ok(())
    }

    async fn contents_in_tx(
        tx: &mut SqlTx<'_, Postgres>,
        cart_id: CartId,
    ) -> Result<Vec<CartEntry>, StoreError> {
        let rows = sqlx::query(
            "SELECT l.id, l.cart_id, l.product_id, l.quantity, l.created_at,
                    p.id AS p_id, p.title, p.slug, p.price, p.image, p.category,
                    p.description, p.created_at AS p_created_at
             FROM cart_lines l
             JOIN products p ON p.id = l.product_id
             WHERE l.cart_id = $1
             ORDER BY l.created_at ASC, l.id ASC",
        )
        .bind(cart_id.as_i32())
        .fetch_all(&mut **tx)
        .await?;

        rows.iter().map(Self::row_to_entry).collect()
    }

    fn row_to_entry(row: &PgRow) -> Result<CartEntry, StoreError> {
        let category: Option<String> = row.try_get("category")?;
        let category = category
            .map(|c| c.parse())
            .transpose()
            .map_err(|e| StoreError::DataCorruption(format!("invalid category in database: {e}")))?;
        Ok(CartEntry {
            line: Self::row_to_line(row)?,
            product: Product {
                id: ProductId::new(row.try_get("p_id")?),
                title: row.try_get("title")?,
                slug: row.try_get("slug")?,
                price: row.try_get("price")?,
                image: row.try_get("image")?,
                category,
                description: row.try_get("description")?,
                created_at: row.try_get("p_created_at")?,
            },
        })
    }
}

#[async_trait]
impl CommerceStore for PgStore {
    async fn create_user(&self, new: NewUser) -> Result<User, StoreError> {
        let row = sqlx::query(
            "INSERT INTO users (email, api_token) VALUES ($1, $2) RETURNING *",
        )
        .bind(&new.email)
        .bind(&new.api_token)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_unique_violation()
            {
                return StoreError::Conflict("email or token already exists".to_owned());
            }
            StoreError::Database(e)
        })?;
        Self::row_to_user(&row)
    }

    async fn find_user_by_token(&self, token: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query("SELECT * FROM users WHERE api_token = $1")
            .bind(token)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_user).transpose()
    }

    async fn create_product(&self, new: NewProduct) -> Result<Product, StoreError> {
        let slug = slugify(&new.title);
        let row = sqlx::query(
            "INSERT INTO products (title, slug, price, image, category, description)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING *",
        )
        .bind(&new.title)
        .bind(&slug)
        .bind(new.price)
        .bind(&new.image)
        .bind(new.category.map(|c| c.as_str()))
        .bind(&new.description)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_unique_violation()
            {
                return StoreError::Conflict(format!("slug already exists: {slug}"));
            }
            StoreError::Database(e)
        })?;
        Self::row_to_product(&row)
    }

    async fn list_products(&self, filter: &ProductFilter) -> Result<Vec<Product>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM products
             WHERE ($1::text IS NULL OR category = $1)
               AND ($2::text IS NULL OR title ILIKE '%' || $2 || '%')
             ORDER BY created_at DESC, id DESC",
        )
        .bind(filter.category.map(|c| c.as_str()))
        .bind(&filter.search)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_product).collect()
    }

    async fn find_product_by_slug(&self, slug: &str) -> Result<Option<Product>, StoreError> {
        let row = sqlx::query("SELECT * FROM products WHERE slug = $1")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_product).transpose()
    }

    async fn open_cart(&self, owner: &OwnerKey) -> Result<Cart, StoreError> {
        let user_id = owner.user_id().map(|u| u.as_i32());
        let session_token = owner.session_token();

        let existing = sqlx::query(
            "SELECT * FROM carts
             WHERE user_id IS NOT DISTINCT FROM $1
               AND session_token IS NOT DISTINCT FROM $2
               AND NOT paid",
        )
        .bind(user_id)
        .bind(session_token)
        .fetch_optional(&self.pool)
        .await?;
        if let Some(row) = existing {
            return Self::row_to_cart(&row);
        }

        // A concurrent creator hits the partial unique index; fall back to
        // the row it committed.
        let inserted = sqlx::query(
            "INSERT INTO carts (user_id, session_token) VALUES ($1, $2)
             ON CONFLICT DO NOTHING
             RETURNING *",
        )
        .bind(user_id)
        .bind(session_token)
        .fetch_optional(&self.pool)
        .await?;
        if let Some(row) = inserted {
            return Self::row_to_cart(&row);
        }

        let row = sqlx::query(
            "SELECT * FROM carts
             WHERE user_id IS NOT DISTINCT FROM $1
               AND session_token IS NOT DISTINCT FROM $2
               AND NOT paid",
        )
        .bind(user_id)
        .bind(session_token)
        .fetch_one(&self.pool)
        .await?;
        Self::row_to_cart(&row)
    }

    async fn cart_contents(&self, cart_id: CartId) -> Result<Vec<CartEntry>, StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SELECT id FROM carts WHERE id = $1")
            .bind(cart_id.as_i32())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(StoreError::NotFound)?;
        let entries = Self::contents_in_tx(&mut tx, cart_id).await?;
        tx.commit().await?;
        Ok(entries)
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
        let quantity = i32::try_from(quantity)
            .map_err(|_| StoreError::Conflict("quantity out of range".to_owned()))?;

        let mut tx = self.pool.begin().await?;
        Self::lock_cart(&mut tx, cart_id).await?;
        sqlx::query("SELECT id FROM products WHERE id = $1")
            .bind(product_id.as_i32())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(StoreError::NotFound)?;

        let existing = sqlx::query(
            "SELECT * FROM cart_lines WHERE cart_id = $1 AND product_id = $2 FOR UPDATE",
        )
        .bind(cart_id.as_i32())
        .bind(product_id.as_i32())
        .fetch_optional(&mut *tx)
        .await?;

        let mutation = match existing {
            None => {
                let row = sqlx::query(
                    "INSERT INTO cart_lines (cart_id, product_id, quantity)
                     VALUES ($1, $2, $3)
                     RETURNING *",
                )
                .bind(cart_id.as_i32())
                .bind(product_id.as_i32())
                .bind(quantity)
                .fetch_one(&mut *tx)
                .await?;
                LineMutation {
                    line: Self::row_to_line(&row)?,
                    superseded: 0,
                }
            }
            Some(row) => {
                let current: i32 = row.try_get("quantity")?;
                let next = match mode {
                    QuantityMode::Increment => current + quantity,
                    QuantityMode::Set => quantity,
                };
                if next == current {
                    LineMutation {
                        line: Self::row_to_line(&row)?,
                        superseded: 0,
                    }
                } else {
                    let superseded = Self::cancel_pending(&mut tx, cart_id).await?;
                    let line_id: i32 = row.try_get("id")?;
                    let row = sqlx::query(
                        "UPDATE cart_lines SET quantity = $1 WHERE id = $2 RETURNING *",
                    )
                    .bind(next)
                    .bind(line_id)
                    .fetch_one(&mut *tx)
                    .await?;
                    LineMutation {
                        line: Self::row_to_line(&row)?,
                        superseded,
                    }
                }
            }
        };

        tx.commit().await?;
        Ok(mutation)
    }

    async fn remove_units(
        &self,
        cart_id: CartId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<(), StoreError> {
        let quantity = i32::try_from(quantity)
            .map_err(|_| StoreError::Conflict("quantity out of range".to_owned()))?;

        let mut tx = self.pool.begin().await?;
        Self::lock_cart(&mut tx, cart_id).await?;

        let row = sqlx::query(
            "SELECT * FROM cart_lines WHERE cart_id = $1 AND product_id = $2 FOR UPDATE",
        )
        .bind(cart_id.as_i32())
        .bind(product_id.as_i32())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StoreError::NotFound)?;

        let current: i32 = row.try_get("quantity")?;
        let line_id: i32 = row.try_get("id")?;
        if current > quantity {
            Self::cancel_pending(&mut tx, cart_id).await?;
            sqlx::query("UPDATE cart_lines SET quantity = $1 WHERE id = $2")
                .bind(current - quantity)
                .bind(line_id)
                .execute(&mut *tx)
                .await?;
        } else {
            sqlx::query("DELETE FROM cart_lines WHERE id = $1")
                .bind(line_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn delete_line(&self, cart_id: CartId, product_id: ProductId) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM cart_lines WHERE cart_id = $1 AND product_id = $2")
            .bind(cart_id.as_i32())
            .bind(product_id.as_i32())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn clear_cart(&self, cart_id: CartId) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM cart_lines WHERE cart_id = $1")
            .bind(cart_id.as_i32())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn paid_carts(&self, owner: &OwnerKey) -> Result<Vec<Cart>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM carts
             WHERE user_id IS NOT DISTINCT FROM $1
               AND session_token IS NOT DISTINCT FROM $2
               AND paid
             ORDER BY created_at DESC, id DESC",
        )
        .bind(owner.user_id().map(|u| u.as_i32()))
        .bind(owner.session_token())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_cart).collect()
    }

    async fn get_or_create_profile(&self, owner: &OwnerKey) -> Result<ShippingProfile, StoreError> {
        let user_id = owner.user_id().map(|u| u.as_i32());
        let session_token = owner.session_token();

        let existing = sqlx::query(
            "SELECT * FROM shipping_profiles
             WHERE user_id IS NOT DISTINCT FROM $1
               AND session_token IS NOT DISTINCT FROM $2",
        )
        .bind(user_id)
        .bind(session_token)
        .fetch_optional(&self.pool)
        .await?;
        if let Some(row) = existing {
            return Self::row_to_profile(&row);
        }

        let inserted = sqlx::query(
            "INSERT INTO shipping_profiles (user_id, session_token) VALUES ($1, $2)
             ON CONFLICT DO NOTHING
             RETURNING *",
        )
        .bind(user_id)
        .bind(session_token)
        .fetch_optional(&self.pool)
        .await?;
        if let Some(row) = inserted {
            return Self::row_to_profile(&row);
        }

        let row = sqlx::query(
            "SELECT * FROM shipping_profiles
             WHERE user_id IS NOT DISTINCT FROM $1
               AND session_token IS NOT DISTINCT FROM $2",
        )
        .bind(user_id)
        .bind(session_token)
        .fetch_one(&self.pool)
        .await?;
        Self::row_to_profile(&row)
    }

    async fn list_addresses(
        &self,
        profile_id: ProfileId,
    ) -> Result<Vec<ShippingAddress>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM shipping_addresses
             WHERE profile_id = $1
             ORDER BY is_default DESC, selected DESC, created_at DESC, id DESC",
        )
        .bind(profile_id.as_i32())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_address).collect()
    }

    async fn add_address(
        &self,
        profile_id: ProfileId,
        new: NewAddress,
        requested_default: bool,
    ) -> Result<ShippingAddress, StoreError> {
        let mut tx = self.pool.begin().await?;
        Self::lock_profile(&mut tx, profile_id).await?;

        sqlx::query("UPDATE shipping_addresses SET selected = FALSE WHERE profile_id = $1 AND selected")
            .bind(profile_id.as_i32())
            .execute(&mut *tx)
            .await?;
        if requested_default {
            sqlx::query(
                "UPDATE shipping_addresses SET is_default = FALSE WHERE profile_id = $1 AND is_default",
            )
            .bind(profile_id.as_i32())
            .execute(&mut *tx)
            .await?;
        }

        let row = sqlx::query(
            "INSERT INTO shipping_addresses
                 (profile_id, name, phone, city, state, address, zip_code, country, email,
                  selected, is_default)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, TRUE, $10)
             RETURNING *",
        )
        .bind(profile_id.as_i32())
        .bind(&new.name)
        .bind(&new.phone)
        .bind(&new.city)
        .bind(&new.state)
        .bind(&new.address)
        .bind(&new.zip_code)
        .bind(&new.country)
        .bind(&new.email)
        .bind(requested_default)
        .fetch_one(&mut *tx)
        .await?;
        let address_id: i32 = row.try_get("id")?;

        Self::restore_address_flags(&mut tx, profile_id).await?;

        let row = sqlx::query("SELECT * FROM shipping_addresses WHERE id = $1")
            .bind(address_id)
            .fetch_one(&mut *tx)
            .await?;
        let address = Self::row_to_address(&row)?;

        tx.commit().await?;
        Ok(address)
    }

    async fn update_address(
        &self,
        profile_id: ProfileId,
        address_id: AddressId,
        patch: AddressPatch,
    ) -> Result<ShippingAddress, StoreError> {
        let mut tx = self.pool.begin().await?;
        Self::lock_profile(&mut tx, profile_id).await?;

        sqlx::query("SELECT id FROM shipping_addresses WHERE id = $1 AND profile_id = $2 FOR UPDATE")
            .bind(address_id.as_i32())
            .bind(profile_id.as_i32())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(StoreError::NotFound)?;

        if patch.selected == Some(true) {
            sqlx::query(
                "UPDATE shipping_addresses SET selected = FALSE WHERE profile_id = $1 AND selected",
            )
            .bind(profile_id.as_i32())
            .execute(&mut *tx)
            .await?;
        }
        if patch.is_default == Some(true) {
            sqlx::query(
                "UPDATE shipping_addresses SET is_default = FALSE WHERE profile_id = $1 AND is_default",
            )
            .bind(profile_id.as_i32())
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            "UPDATE shipping_addresses SET
                 name = COALESCE($3, name),
                 phone = COALESCE($4, phone),
                 city = COALESCE($5, city),
                 state = COALESCE($6, state),
                 address = COALESCE($7, address),
                 zip_code = COALESCE($8, zip_code),
                 country = COALESCE($9, country),
                 email = COALESCE($10, email),
                 selected = COALESCE($11, selected),
                 is_default = COALESCE($12, is_default)
             WHERE id = $1 AND profile_id = $2",
        )
        .bind(address_id.as_i32())
        .bind(profile_id.as_i32())
        .bind(&patch.name)
        .bind(&patch.phone)
        .bind(&patch.city)
        .bind(&patch.state)
        .bind(&patch.address)
        .bind(&patch.zip_code)
        .bind(&patch.country)
        .bind(&patch.email)
        .bind(patch.selected)
        .bind(patch.is_default)
        .execute(&mut *tx)
        .await?;

        Self::restore_address_flags(&mut tx, profile_id).await?;

        let row = sqlx::query("SELECT * FROM shipping_addresses WHERE id = $1")
            .bind(address_id.as_i32())
            .fetch_one(&mut *tx)
            .await?;
        let address = Self::row_to_address(&row)?;

        tx.commit().await?;
        Ok(address)
    }

    async fn set_address_flag(
        &self,
        profile_id: ProfileId,
        address_id: AddressId,
        flag: AddressFlag,
        value: bool,
    ) -> Result<ShippingAddress, StoreError> {
        let column = match flag {
            AddressFlag::Default => "is_default",
            AddressFlag::Selected => "selected",
        };

        let mut tx = self.pool.begin().await?;
        Self::lock_profile(&mut tx, profile_id).await?;

        sqlx::query("SELECT id FROM shipping_addresses WHERE id = $1 AND profile_id = $2 FOR UPDATE")
            .bind(address_id.as_i32())
            .bind(profile_id.as_i32())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(StoreError::NotFound)?;

        if value {
            sqlx::query(&format!(
                "UPDATE shipping_addresses SET {column} = FALSE WHERE profile_id = $1 AND {column}"
            ))
            .bind(profile_id.as_i32())
            .execute(&mut *tx)
            .await?;
        }
        sqlx::query(&format!(
            "UPDATE shipping_addresses SET {column} = $1 WHERE id = $2"
        ))
        .bind(value)
        .bind(address_id.as_i32())
        .execute(&mut *tx)
        .await?;

        Self::restore_address_flags(&mut tx, profile_id).await?;

        let row = sqlx::query("SELECT * FROM shipping_addresses WHERE id = $1")
            .bind(address_id.as_i32())
            .fetch_one(&mut *tx)
            .await?;
        let address = Self::row_to_address(&row)?;

        tx.commit().await?;
        Ok(address)
    }

    async fn find_address(
        &self,
        profile_id: ProfileId,
        address_id: AddressId,
    ) -> Result<Option<ShippingAddress>, StoreError> {
        let row = sqlx::query("SELECT * FROM shipping_addresses WHERE id = $1 AND profile_id = $2")
            .bind(address_id.as_i32())
            .bind(profile_id.as_i32())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_address).transpose()
    }

    async fn selected_address(
        &self,
        profile_id: ProfileId,
    ) -> Result<Option<ShippingAddress>, StoreError> {
        let row = sqlx::query("SELECT * FROM shipping_addresses WHERE profile_id = $1 AND selected")
            .bind(profile_id.as_i32())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_address).transpose()
    }

    async fn open_transaction(
        &self,
        cart_id: CartId,
        new: NewTransaction,
    ) -> Result<GatewayTransaction, StoreError> {
        let mut tx = self.pool.begin().await?;
        Self::lock_cart(&mut tx, cart_id).await?;

        let superseded = Self::cancel_pending(&mut tx, cart_id).await?;
        if superseded > 0 {
            tracing::info!(cart_id = %cart_id, superseded, "superseded pending transactions");
        }

        let row = sqlx::query(
            "INSERT INTO transactions (cart_id, gateway, external_ref, amount, currency, status)
             VALUES ($1, $2, $3, $4, $5, 'pending')
             RETURNING *",
        )
        .bind(cart_id.as_i32())
        .bind(new.gateway.as_str())
        .bind(Uuid::new_v4().to_string())
        .bind(new.amount)
        .bind(new.currency.as_str())
        .fetch_one(&mut *tx)
        .await?;
        let transaction = Self::row_to_transaction(&row)?;

        tx.commit().await?;
        Ok(transaction)
    }

    async fn attach_checkout_session(
        &self,
        id: TransactionId,
        checkout_link: Option<String>,
        access_code: Option<String>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE transactions SET checkout_link = $1, access_code = $2, updated_at = now()
             WHERE id = $3",
        )
        .bind(&checkout_link)
        .bind(&access_code)
        .bind(id.as_i32())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn find_active_transaction(
        &self,
        cart_id: CartId,
    ) -> Result<Option<GatewayTransaction>, StoreError> {
        let row = sqlx::query(
            "SELECT * FROM transactions
             WHERE cart_id = $1 AND status = 'pending'
             ORDER BY created_at DESC, id DESC
             LIMIT 1",
        )
        .bind(cart_id.as_i32())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::row_to_transaction).transpose()
    }

    async fn find_transaction_by_ref(
        &self,
        external_ref: &str,
    ) -> Result<Option<GatewayTransaction>, StoreError> {
        let row = sqlx::query("SELECT * FROM transactions WHERE external_ref = $1")
            .bind(external_ref)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_transaction).transpose()
    }

    async fn cancel_if_pending(&self, id: TransactionId) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE transactions SET status = 'canceled', updated_at = now()
             WHERE id = $1 AND status = 'pending'",
        )
        .bind(id.as_i32())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn fail_if_pending(&self, id: TransactionId) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE transactions SET status = 'failed', updated_at = now()
             WHERE id = $1 AND status = 'pending'",
        )
        .bind(id.as_i32())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn apply_settlement(
        &self,
        external_ref: &str,
        external_transaction_id: &str,
    ) -> Result<Settlement, StoreError> {
        let mut tx = self.pool.begin().await?;

        // Single-writer per external reference: the row lock serializes
        // concurrent callback/webhook deliveries for the same transaction.
        let row = sqlx::query("SELECT * FROM transactions WHERE external_ref = $1 FOR UPDATE")
            .bind(external_ref)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(StoreError::NotFound)?;
        let transaction = Self::row_to_transaction(&row)?;

        match transaction.status {
            TransactionStatus::Completed => {
                let row = sqlx::query("SELECT * FROM orders WHERE cart_id = $1 AND tx_ref = $2")
                    .bind(transaction.cart_id.as_i32())
                    .bind(&transaction.external_ref)
                    .fetch_optional(&mut *tx)
                    .await?
                    .ok_or_else(|| {
                        StoreError::InvariantViolation(format!(
                            "completed transaction {} has no order",
                            transaction.external_ref
                        ))
                    })?;
                let order = Self::row_to_order(&row)?;
                tx.commit().await?;
                return Ok(Settlement::AlreadyApplied { order });
            }
            TransactionStatus::Canceled | TransactionStatus::Failed => {
                return Ok(Settlement::Superseded {
                    status: transaction.status,
                });
            }
            TransactionStatus::Pending => {}
        }

        let cart = Self::lock_cart(&mut tx, transaction.cart_id).await?;
        let entries = Self::contents_in_tx(&mut tx, cart.id).await?;

        let shipping = sqlx::query(
            "SELECT a.* FROM shipping_addresses a
             JOIN shipping_profiles p ON p.id = a.profile_id
             WHERE p.user_id IS NOT DISTINCT FROM $1
               AND p.session_token IS NOT DISTINCT FROM $2
               AND a.selected",
        )
        .bind(cart.owner.user_id().map(|u| u.as_i32()))
        .bind(cart.owner.session_token())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StoreError::NoSelectedShipping)?;
        let shipping = Self::row_to_address(&shipping)?;

        let draft = OrderDraft::materialize(
            &cart,
            &entries,
            &shipping,
            &transaction.external_ref,
            external_transaction_id,
            transaction.amount,
        );
        let lines = serde_json::to_value(&draft.lines)?;

        sqlx::query(
            "UPDATE transactions
             SET status = 'completed', external_transaction_id = $1, updated_at = now()
             WHERE id = $2",
        )
        .bind(external_transaction_id)
        .bind(transaction.id.as_i32())
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE carts SET paid = TRUE, updated_at = now() WHERE id = $1")
            .bind(cart.id.as_i32())
            .execute(&mut *tx)
            .await?;

        // The (cart, tx_ref) uniqueness is the final arbiter under races:
        // the loser's insert collapses into fetching the winner's order.
        let inserted = sqlx::query(
            "INSERT INTO orders
                 (cart_id, tx_ref, full_name, email, phone, address, city, state,
                  zip_code, country, lines, total_amount, external_transaction_id,
                  payment_status)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
             ON CONFLICT (cart_id, tx_ref) DO NOTHING
             RETURNING *",
        )
        .bind(draft.cart_id.as_i32())
        .bind(&draft.tx_ref)
        .bind(&draft.full_name)
        .bind(&draft.email)
        .bind(&draft.phone)
        .bind(&draft.address)
        .bind(&draft.city)
        .bind(&draft.state)
        .bind(&draft.zip_code)
        .bind(&draft.country)
        .bind(&lines)
        .bind(draft.total_amount)
        .bind(&draft.external_transaction_id)
        .bind(draft.payment_status.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        let settlement = match inserted {
            Some(row) => Settlement::Applied {
                order: Self::row_to_order(&row)?,
            },
            None => {
                let row = sqlx::query("SELECT * FROM orders WHERE cart_id = $1 AND tx_ref = $2")
                    .bind(draft.cart_id.as_i32())
                    .bind(&draft.tx_ref)
                    .fetch_one(&mut *tx)
                    .await?;
                Settlement::AlreadyApplied {
                    order: Self::row_to_order(&row)?,
                }
            }
        };

        tx.commit().await?;
        Ok(settlement)
    }

    async fn list_orders(&self, owner: &OwnerKey) -> Result<Vec<Order>, StoreError> {
        let rows = sqlx::query(
            "SELECT o.* FROM orders o
             JOIN carts c ON c.id = o.cart_id
             WHERE c.user_id IS NOT DISTINCT FROM $1
               AND c.session_token IS NOT DISTINCT FROM $2
             ORDER BY o.created_at DESC, o.id DESC",
        )
        .bind(owner.user_id().map(|u| u.as_i32()))
        .bind(owner.session_token())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_order).collect()
    }
}
