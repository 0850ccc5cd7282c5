//! The fitting pipeline stage and its live-update wiring.

pub mod fitter;
pub mod notify;

pub use fitter::*;
pub use notify::*;
