//! Secret types for protecting sensitive values from accidental logging.
//!
//! Re-exports the [`secrecy`] types. Join tokens and app IDs are carried as
//! `SecretString` so that any struct deriving `Debug` around them prints
//! `[REDACTED]` instead of the value, and tracing fields cannot leak them.
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct JoinCredentials {
//!     channel: String,
//!     token: SecretString,
//! }
//!
//! let creds = JoinCredentials {
//!     channel: "lobby".to_string(),
//!     token: SecretString::from("006abc"),
//! };
//!
//! assert!(!format!("{creds:?}").contains("006abc"));
//! assert_eq!(creds.token.expose_secret(), "006abc");
//! ```

pub use secrecy::{ExposeSecret, SecretString};
