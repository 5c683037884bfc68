//! Engineering calculators for foamdeck
//!
//! This crate provides boundary layer mesh sizing and brine fluid properties.

mod error;
mod fluid;
mod layers;

pub use error::{LayerError, LayerResult};
pub use fluid::{BrineProperties, FluidProperties, FluidState};
pub use layers::{LayerInputs, LayerRateResult, compute_increase_rate, compute_rn};
