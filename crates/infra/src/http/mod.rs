//! HTTP transport for the auth backend

pub mod auth_backend;
pub mod client;

pub use auth_backend::HttpAuthBackend;
pub use client::{HttpClient, HttpClientBuilder};
