//! Point cloud completion with burn.
//!
//! A DGCNN encoder maps a partial cloud to a global embedding, a fully
//! connected head regresses a coarse cloud from it, and a folding decoder
//! grows a small 2-D patch around every coarse point to get the dense
//! output. Training minimises the Chamfer distance at both resolutions.
#![recursion_limit = "131"]

pub mod data;
pub mod error;
pub mod inference;
pub mod model;
pub mod training;

pub use error::{CompletionError, Result};
