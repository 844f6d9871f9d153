//! Input/output helpers.
//!
//! - CSV row tables (`table`)
//! - prediction and training-frame exports (`export`)
//! - model directory loading (`model_dir`)

pub mod export;
pub mod model_dir;
pub mod table;

pub use export::*;
pub use model_dir::*;
pub use table::*;
