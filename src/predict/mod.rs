//! Population-scale posterior-predictive prediction.
//!
//! - memory-bounded single-model sampling (`chunked`)
//! - the four-model asset/debt pass (`allmodels`)

pub mod allmodels;
pub mod chunked;

pub use allmodels::*;
pub use chunked::*;
