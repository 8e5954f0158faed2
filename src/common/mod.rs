//! Types and utilities shared by the record, model and evaluation layers.

// Submodule declarations
pub mod binary;
pub mod error;
pub mod number;

// Re-exports for convenience
pub use error::{XlsError, XlsResult};
