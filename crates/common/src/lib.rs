//! Common utilities and types shared across the call client crates.

#![warn(clippy::pedantic)]

/// Module for common data types
pub mod types;

/// Module for common configuration
pub mod config;

/// Module for secret types that prevent accidental logging
pub mod secret;

/// Module for retry policies applied to fallible network operations
pub mod retry;

/// Module for join token retrieval from the token server
pub mod token_client;
