//! `ipums-wealth` library crate.
//!
//! The binary (`iw`) is a thin wrapper around this library so that:
//!
//! - the extract client and the prediction engine are testable without
//!   spawning processes or touching the network
//! - fitted models can be swapped behind the `PosteriorPredictive` trait

pub mod app;
pub mod cli;
pub mod domain;
pub mod error;
pub mod io;
pub mod ipums;
pub mod models;
pub mod predict;
