//! # SessionGuard Infrastructure
//!
//! Production adapters for the ports defined in `sessionguard-core`.
//!
//! This crate contains:
//! - The reqwest-backed [`HttpAuthBackend`]
//! - File-backed persistent storage
//! - Configuration loading from the environment and JSON/TOML files
//! - Tracing subscriber setup
//!
//! ## Architecture
//! - Implements traits defined in `sessionguard-core`
//! - Contains all "impure" code (network, filesystem, process environment)

pub mod config;
pub mod errors;
pub mod http;
pub mod observability;
pub mod storage;
pub mod wiring;

// Re-export commonly used items
pub use http::{HttpAuthBackend, HttpClient, HttpClientBuilder};
pub use observability::{init_tracing, LogFormat};
pub use storage::FileStorage;
pub use wiring::production_ports;
