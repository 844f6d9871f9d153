//! IPUMS extract API integration.
//!
//! - payload and status record types (`extract`)
//! - submit / status / download over blocking HTTP (`client`)
//! - fixed-interval completion polling (`poll`)

pub mod client;
pub mod extract;
pub mod poll;

pub use client::*;
pub use extract::*;
pub use poll::*;
