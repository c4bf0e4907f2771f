//! Call Client Library
//!
//! Client-side session controller for a real-time audio/video call:
//!
//! - Fetches a join token for a channel from a token server
//! - Joins the channel through a pluggable media engine
//! - Captures and publishes the local microphone and camera
//! - Subscribes to and renders remote participants as they publish
//! - Toggles local devices and picks a layout for the participant count
//! - Tears everything down on leave, including a leave while still joining
//!
//! # Architecture
//!
//! ```text
//! SessionController (one per channel)
//! ├── TokenProvider   (HTTP token server, or a test double)
//! ├── MediaEngine     (vendor SDK adapter; emits EngineEvents)
//! └── ViewRegistry    (render targets, mounted through a ViewSurface)
//! ```
//!
//! The engine's event stream is fed to the controller by
//! [`session::spawn_event_pump`], which applies events in arrival order.
//!
//! # Modules
//!
//! - [`config`] - Client configuration from environment
//! - [`engine`] - Media engine capability traits
//! - [`errors`] - Session error types
//! - [`layout`] - Layout policy
//! - [`session`] - Session controller and event pump
//! - [`views`] - Render targets and the view surface seam

#![warn(clippy::pedantic)]

pub mod config;
pub mod engine;
pub mod errors;
pub mod layout;
pub mod metrics;
pub mod session;
pub mod views;
