//! Shipping profile handlers.
//!
//! Address ids are always scoped to the resolved owner's profile; an id
//! belonging to another owner answers 404 with no hint that it exists.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use zentro_core::{AddressId, ProfileId};

use crate::error::{AppError, Result};
use crate::middleware::OptionalAuth;
use crate::models::{AddressFlag, AddressPatch, NewAddress, ShippingAddress};
use crate::services::identity;
use crate::state::AppState;

use super::cart::OwnerQuery;

/// The owner's profile with its addresses.
#[derive(Debug, Serialize)]
pub struct ProfileView {
    pub id: ProfileId,
    pub shippings: Vec<ShippingAddress>,
}

/// The owner's profile and all its addresses.
#[instrument(skip(state, auth))]
pub async fn index(
    State(state): State<AppState>,
    OptionalAuth(auth): OptionalAuth,
    Query(query): Query<OwnerQuery>,
) -> Result<Json<ProfileView>> {
    let owner = identity::resolve_owner(auth.map(|u| u.id), query.session_id.as_deref())?;
    let profile = state.store().get_or_create_profile(&owner).await?;
    let shippings = state.store().list_addresses(profile.id).await?;
    Ok(Json(ProfileView {
        id: profile.id,
        shippings,
    }))
}

/// The currently selected address.
#[instrument(skip(state, auth))]
pub async fn current(
    State(state): State<AppState>,
    OptionalAuth(auth): OptionalAuth,
    Query(query): Query<OwnerQuery>,
) -> Result<Json<ShippingAddress>> {
    let owner = identity::resolve_owner(auth.map(|u| u.id), query.session_id.as_deref())?;
    let profile = state.store().get_or_create_profile(&owner).await?;
    let address = state
        .store()
        .selected_address(profile.id)
        .await?
        .ok_or_else(|| AppError::NotFound("no selected shipping found".to_owned()))?;
    Ok(Json(address))
}

/// One address by id.
#[instrument(skip(state, auth))]
pub async fn show(
    State(state): State<AppState>,
    OptionalAuth(auth): OptionalAuth,
    Path(id): Path<AddressId>,
    Query(query): Query<OwnerQuery>,
) -> Result<Json<ShippingAddress>> {
    let owner = identity::resolve_owner(auth.map(|u| u.id), query.session_id.as_deref())?;
    let profile = state.store().get_or_create_profile(&owner).await?;
    let address = state
        .store()
        .find_address(profile.id, id)
        .await?
        .ok_or_else(|| AppError::NotFound("shipping not found".to_owned()))?;
    Ok(Json(address))
}

/// Add-address request body.
#[derive(Debug, Deserialize)]
pub struct AddAddressRequest {
    pub session_id: Option<String>,
    #[serde(default)]
    pub default: bool,
    #[serde(flatten)]
    pub fields: NewAddress,
}

/// Add an address. The new address becomes the selected one.
#[instrument(skip(state, auth, body))]
pub async fn create(
    State(state): State<AppState>,
    OptionalAuth(auth): OptionalAuth,
    Json(body): Json<AddAddressRequest>,
) -> Result<(StatusCode, Json<ShippingAddress>)> {
    let owner = identity::resolve_owner(auth.map(|u| u.id), body.session_id.as_deref())?;
    let profile = state.store().get_or_create_profile(&owner).await?;
    let address = state
        .store()
        .add_address(profile.id, body.fields, body.default)
        .await?;
    Ok((StatusCode::CREATED, Json(address)))
}

/// Update-address request body.
#[derive(Debug, Deserialize)]
pub struct UpdateAddressRequest {
    pub session_id: Option<String>,
    pub shipping_id: AddressId,
    #[serde(flatten)]
    pub patch: AddressPatch,
}

/// Partially update an address.
#[instrument(skip(state, auth, body))]
pub async fn update(
    State(state): State<AppState>,
    OptionalAuth(auth): OptionalAuth,
    Json(body): Json<UpdateAddressRequest>,
) -> Result<Json<ShippingAddress>> {
    let owner = identity::resolve_owner(auth.map(|u| u.id), body.session_id.as_deref())?;
    let profile = state.store().get_or_create_profile(&owner).await?;
    let address = state
        .store()
        .update_address(profile.id, body.shipping_id, body.patch)
        .await?;
    Ok(Json(address))
}

/// Set-flag request body.
#[derive(Debug, Deserialize)]
pub struct SetFlagRequest {
    pub session_id: Option<String>,
    pub shipping_id: AddressId,
    pub flag: AddressFlag,
    pub value: Option<bool>,
}

/// Set or clear the default/selected flag on an address.
#[instrument(skip(state, auth, body))]
pub async fn set_flag(
    State(state): State<AppState>,
    OptionalAuth(auth): OptionalAuth,
    Json(body): Json<SetFlagRequest>,
) -> Result<Json<ShippingAddress>> {
    let owner = identity::resolve_owner(auth.map(|u| u.id), body.session_id.as_deref())?;
    let profile = state.store().get_or_create_profile(&owner).await?;
    let address = state
        .store()
        .set_address_flag(
            profile.id,
            body.shipping_id,
            body.flag,
            body.value.unwrap_or(true),
        )
        .await?;
    Ok(Json(address))
}
