//! Fitting options, the fit engine, and options provenance.
//!
//! - `options`: per-parameter constraints, validation against a model's
//!   signature, and the serialized form that round-trips through dataset
//!   metadata
//! - `engine`: the model callable bound to `(x, y)` and its run contract
//! - `provenance`: where the active options came from and what may
//!   override them

pub mod engine;
pub mod options;
pub mod provenance;

pub use engine::*;
pub use options::*;
pub use provenance::*;
