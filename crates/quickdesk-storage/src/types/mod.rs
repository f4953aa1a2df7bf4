//! Type definitions for quickdesk storage.

mod billing;
mod ids;
mod members;
mod organizations;
mod tickets;

// Re-export all types from submodules
pub use billing::*;
pub use ids::*;
pub use members::*;
pub use organizations::*;
pub use tickets::*;
