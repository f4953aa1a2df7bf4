//! Storage abstraction for quickdesk.
//!
//! Backend crates (e.g., quickdesk-store-memory) implement the [`Store`] trait so
//! the ticket and billing crates don't depend on any specific database engine
//! or schema details.

use thiserror::Error;

mod store;
mod types;

pub use store::*;
pub use types::*;

/// Uniform error type for all storage backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found")]
    NotFound,
    #[error("already exists")]
    AlreadyExists,
    #[error("conflict")]
    Conflict,
    #[error("backend error: {0}")]
    Backend(String),
}
