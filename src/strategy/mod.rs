//! Trade decision logic.

pub mod signal;

pub use signal::{evaluate, MispricingDetector, ModelBand, Signal};
