//! Container registry client for shipit.
//!
//! Provides credential exchange for time-limited sessions and digest lookup
//! over the registry HTTP v2 API.

pub mod client;
pub mod reference;

pub use client::HttpRegistryClient;
pub use reference::{registry_host, split_registry};
