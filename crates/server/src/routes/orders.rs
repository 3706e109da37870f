//! Order history handlers.

use axum::{
    Json,
    extract::{Query, State},
};
use tracing::instrument;

use crate::error::Result;
use crate::middleware::OptionalAuth;
use crate::models::Order;
use crate::services::identity;
use crate::state::AppState;

use super::cart::{CartView, OwnerQuery, cart_view};

/// The owner's materialized orders, newest first.
#[instrument(skip(state, auth))]
pub async fn index(
    State(state): State<AppState>,
    OptionalAuth(auth): OptionalAuth,
    Query(query): Query<OwnerQuery>,
) -> Result<Json<Vec<Order>>> {
    let owner = identity::resolve_owner(auth.map(|u| u.id), query.session_id.as_deref())?;
    let orders = state.store().list_orders(&owner).await?;
    Ok(Json(orders))
}

/// The owner's archival (paid) carts, newest first.
#[instrument(skip(state, auth))]
pub async fn carts(
    State(state): State<AppState>,
    OptionalAuth(auth): OptionalAuth,
    Query(query): Query<OwnerQuery>,
) -> Result<Json<Vec<CartView>>> {
    let owner = identity::resolve_owner(auth.map(|u| u.id), query.session_id.as_deref())?;
    let carts = state.store().paid_carts(&owner).await?;
    let mut views = Vec::with_capacity(carts.len());
    for cart in &carts {
        views.push(cart_view(&state, cart).await?);
    }
    Ok(Json(views))
}
