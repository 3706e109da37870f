//! Cart route handlers.
//!
//! Every handler resolves the owner first and goes through the owner's
//! single unpaid cart, so line mutations can never cross owners. The cart
//! view includes the resumable checkout link when a pending transaction
//! exists.

use axum::{
    Json,
    extract::{Query, State},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use zentro_core::{CartId, LineId};

use crate::error::{AppError, Result};
use crate::middleware::OptionalAuth;
use crate::models::{Cart, CartTotals, Product, QuantityMode};
use crate::services::identity;
use crate::state::AppState;

/// Owner identification for GET endpoints.
#[derive(Debug, Deserialize)]
pub struct OwnerQuery {
    pub session_id: Option<String>,
}

/// One line in the cart view.
#[derive(Debug, Clone, Serialize)]
pub struct CartItemView {
    pub id: LineId,
    pub product: Product,
    pub quantity: u32,
}

/// The cart as clients see it.
#[derive(Debug, Clone, Serialize)]
pub struct CartView {
    pub id: CartId,
    pub items: Vec<CartItemView>,
    pub total_items: u32,
    pub total_price: Decimal,
    pub paid: bool,
    /// Resumable checkout link, when a pending transaction exists.
    pub link: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Build the client view of a cart.
pub(crate) async fn cart_view(state: &AppState, cart: &Cart) -> Result<CartView> {
    let entries = state.store().cart_contents(cart.id).await?;
    let totals = CartTotals::compute(&entries);
    let link = state
        .store()
        .find_active_transaction(cart.id)
        .await?
        .and_then(|tx| tx.checkout_link);

    Ok(CartView {
        id: cart.id,
        items: entries
            .into_iter()
            .map(|e| CartItemView {
                id: e.line.id,
                product: e.product,
                quantity: e.line.quantity,
            })
            .collect(),
        total_items: totals.item_count,
        total_price: totals.subtotal,
        paid: cart.paid,
        link,
        updated_at: cart.updated_at,
    })
}

/// Current cart view.
#[instrument(skip(state, auth))]
pub async fn show(
    State(state): State<AppState>,
    OptionalAuth(auth): OptionalAuth,
    Query(query): Query<OwnerQuery>,
) -> Result<Json<CartView>> {
    let owner = identity::resolve_owner(auth.map(|u| u.id), query.session_id.as_deref())?;
    let cart = state.store().open_cart(&owner).await?;
    Ok(Json(cart_view(&state, &cart).await?))
}

/// Add-or-update request body.
#[derive(Debug, Deserialize)]
pub struct AddToCartRequest {
    pub session_id: Option<String>,
    pub slug: String,
    pub quantity: Option<u32>,
    #[serde(default)]
    pub mode: QuantityMode,
}

/// Add a product to the cart, or change an existing line's quantity.
#[instrument(skip(state, auth, body))]
pub async fn add(
    State(state): State<AppState>,
    OptionalAuth(auth): OptionalAuth,
    Json(body): Json<AddToCartRequest>,
) -> Result<Json<CartItemView>> {
    let owner = identity::resolve_owner(auth.map(|u| u.id), body.session_id.as_deref())?;
    let cart = state.store().open_cart(&owner).await?;
    let product = state
        .store()
        .find_product_by_slug(&body.slug)
        .await?
        .ok_or_else(|| AppError::NotFound("product not found".to_owned()))?;

    let mutation = state
        .store()
        .upsert_line(cart.id, product.id, body.quantity.unwrap_or(1), body.mode)
        .await?;
    if mutation.superseded > 0 {
        tracing::info!(
            cart_id = %cart.id,
            superseded = mutation.superseded,
            "cart mutation superseded pending checkout"
        );
    }

    Ok(Json(CartItemView {
        id: mutation.line.id,
        product,
        quantity: mutation.line.quantity,
    }))
}

/// Remove-units request body.
#[derive(Debug, Deserialize)]
pub struct RemoveFromCartRequest {
    pub session_id: Option<String>,
    pub slug: String,
    pub quantity: Option<u32>,
}

/// Remove units from a line, deleting it at zero.
#[instrument(skip(state, auth, body))]
pub async fn remove(
    State(state): State<AppState>,
    OptionalAuth(auth): OptionalAuth,
    Json(body): Json<RemoveFromCartRequest>,
) -> Result<Json<serde_json::Value>> {
    let owner = identity::resolve_owner(auth.map(|u| u.id), body.session_id.as_deref())?;
    let cart = state.store().open_cart(&owner).await?;
    let product = state
        .store()
        .find_product_by_slug(&body.slug)
        .await?
        .ok_or_else(|| AppError::NotFound("product not found".to_owned()))?;

    state
        .store()
        .remove_units(cart.id, product.id, body.quantity.unwrap_or(1))
        .await?;
    Ok(Json(serde_json::json!({ "message": "cart updated" })))
}

/// Delete-line request body.
#[derive(Debug, Deserialize)]
pub struct DeleteLineRequest {
    pub session_id: Option<String>,
    pub slug: String,
}

/// Delete a line outright.
#[instrument(skip(state, auth, body))]
pub async fn delete(
    State(state): State<AppState>,
    OptionalAuth(auth): OptionalAuth,
    Json(body): Json<DeleteLineRequest>,
) -> Result<Json<serde_json::Value>> {
    let owner = identity::resolve_owner(auth.map(|u| u.id), body.session_id.as_deref())?;
    let cart = state.store().open_cart(&owner).await?;
    let product = state
        .store()
        .find_product_by_slug(&body.slug)
        .await?
        .ok_or_else(|| AppError::NotFound("product not found".to_owned()))?;

    state.store().delete_line(cart.id, product.id).await?;
    Ok(Json(serde_json::json!({ "message": "cart line deleted" })))
}

/// Clear request body.
#[derive(Debug, Deserialize)]
pub struct ClearCartRequest {
    pub session_id: Option<String>,
}

/// Delete all lines.
#[instrument(skip(state, auth, body))]
pub async fn clear(
    State(state): State<AppState>,
    OptionalAuth(auth): OptionalAuth,
    Json(body): Json<ClearCartRequest>,
) -> Result<Json<serde_json::Value>> {
    let owner = identity::resolve_owner(auth.map(|u| u.id), body.session_id.as_deref())?;
    let cart = state.store().open_cart(&owner).await?;
    let removed = state.store().clear_cart(cart.id).await?;
    Ok(Json(
        serde_json::json!({ "message": "cart cleared", "removed": removed }),
    ))
}
