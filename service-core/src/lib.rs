//! service-core: Shared infrastructure for the account platform services.
pub mod config;
pub mod error;
pub mod observability;
