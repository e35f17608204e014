//! # SessionGuard Domain
//!
//! Value types shared by every SessionGuard crate.
//!
//! This crate contains:
//! - Session configuration and refresh-token custody selection
//! - The error taxonomy and `Result` alias
//! - Storage keys, callback parameter names and timing defaults
//! - Small enums exchanged between the session components
//!
//! ## Architecture
//! - No dependencies on other SessionGuard crates
//! - No I/O, no async runtime

pub mod config;
pub mod constants;
pub mod errors;
pub mod macros;
pub mod types;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;
