//! HTTP handlers for the account service.

pub mod auth;

pub use auth::*;
