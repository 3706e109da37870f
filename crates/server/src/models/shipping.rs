//! Shipping profiles and addresses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zentro_core::{AddressId, OwnerKey, ProfileId};

/// The container holding one owner's shipping addresses. One per owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingProfile {
    pub id: ProfileId,
    pub owner: OwnerKey,
    pub created_at: DateTime<Utc>,
}

/// A shipping address inside a profile.
///
/// Per profile, at most one address is the default and at most one is
/// selected; the store re-establishes both after every mutation, promoting
/// the most recently created address when a write leaves either flag vacant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub id: AddressId,
    pub profile_id: ProfileId,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub address: Option<String>,
    pub zip_code: Option<String>,
    pub country: Option<String>,
    pub email: Option<String>,
    pub selected: bool,
    #[serde(rename = "default")]
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
}

/// Fields for creating an address. Flags are set by the store, not callers.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewAddress {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub address: Option<String>,
    pub zip_code: Option<String>,
    pub country: Option<String>,
    pub email: Option<String>,
}

/// Partial update for an address. `None` leaves a field unchanged.
///
/// Flag updates run through the same exclusivity enforcement as
/// [`AddressFlag`] writes.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AddressPatch {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub address: Option<String>,
    pub zip_code: Option<String>,
    pub country: Option<String>,
    pub email: Option<String>,
    pub selected: Option<bool>,
    #[serde(rename = "default")]
    pub is_default: Option<bool>,
}

/// The two exclusive per-profile address flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressFlag {
    Default,
    Selected,
}
