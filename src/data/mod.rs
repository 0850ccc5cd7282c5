//! Dataset container consumed and produced by the pipeline stage.

pub mod dataset;

pub use dataset::*;
