//! Fitted-model side of the prediction engine.
//!
//! - posterior sample collections (`posterior`)
//! - the `PosteriorPredictive` capability (`predictive`)
//! - a hierarchical GLM evaluator implementing it (`glm`)
//! - the four wealth model layouts and their training frames (`presets`)

pub mod glm;
pub mod posterior;
pub mod predictive;
pub mod presets;

pub use glm::*;
pub use posterior::*;
pub use predictive::*;
pub use presets::*;
