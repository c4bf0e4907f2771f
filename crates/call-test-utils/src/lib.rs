//! # Call Client Test Utilities
//!
//! Mocks and fixtures for driving the `SessionController` without a real
//! media SDK, token server or UI.
//!
//! ## Modules
//!
//! - `gate` - Suspension points tests can hold open and release
//! - `mock_engine` - Scriptable `MediaEngine` that records every call
//! - `mock_tokens` - Scriptable `TokenProvider`
//! - `mock_surface` - `ViewSurface` that records mounts, layouts and controls
//! - `fixtures` - A controller wired to all three mocks
//!
//! ## Usage
//!
//! ```rust,ignore
//! use call_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let session = TestSession::builder()
//!         .engine(MockMediaEngine::builder().assign_id(7u32).build())
//!         .build();
//!
//!     session.controller.join().await.unwrap();
//!     assert_eq!(session.engine.join_count(), 1);
//! }
//! ```

pub mod fixtures;
pub mod gate;
pub mod mock_engine;
pub mod mock_surface;
pub mod mock_tokens;

// Re-export commonly used items
pub use fixtures::*;
pub use gate::*;
pub use mock_engine::*;
pub use mock_surface::*;
pub use mock_tokens::*;
