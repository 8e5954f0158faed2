//! Error types for BIFF8 reading, writing and formula evaluation.
//!
//! Codec and aggregate failures are fatal for the document being loaded.
//! Spreadsheet-level errors raised while evaluating a formula (`#DIV/0!`,
//! `#VALUE!`, ...) are not represented here: they are ordinary values, see
//! [`crate::eval::ErrorCode`].

// Submodule declarations
pub mod types;

// Re-exports
pub use types::{XlsError, XlsResult};
