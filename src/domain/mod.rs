//! Domain types used throughout the crate.
//!
//! This module defines the client, polling, and prediction configuration.

pub mod types;

pub use types::*;
