//! Numerical utilities: the linear solve behind each optimizer step.

pub mod lstsq;

pub use lstsq::*;
