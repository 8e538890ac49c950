//! Shared domain types for the POS inventory core
//!
//! Pure models, state machines and planners used by the backend. Nothing in
//! this crate performs I/O.

pub mod error;
pub mod models;
pub mod types;
pub mod validation;

pub use error::*;
pub use models::*;
pub use types::*;
pub use validation::*;
