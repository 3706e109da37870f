//! Domain services.
//!
//! - [`identity`] - maps a request's identity channels to an owner key
//! - [`checkout`] - opens ledger transactions and gateway checkouts
//! - [`reconcile`] - corroborates confirmations and applies settlements

pub mod checkout;
pub mod identity;
pub mod reconcile;
