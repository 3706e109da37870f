//! Core types for Zentro.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod currency;
pub mod id;
pub mod owner;
pub mod status;

pub use currency::{CurrencyCode, CurrencyParseError};
pub use id::*;
pub use owner::{MissingIdentity, OwnerKey};
pub use status::*;
