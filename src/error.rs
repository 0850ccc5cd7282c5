//! Error types for the fitting core.
//!
//! Discovery and options-validation failures are local and recoverable: the
//! registry and options layers return these as values and leave prior state
//! intact. Fit non-convergence is deliberately *not* represented here — it is
//! a normal outcome reported by [`crate::fit::FitOutcome`], and the pipeline
//! stage degrades to pass-through instead of erroring.

use std::path::PathBuf;

/// Top-level error enum for the fitting core.
#[derive(Debug, thiserror::Error)]
pub enum FitError {
    /// A source failed to load or parse. Other sources are unaffected.
    #[error("failed to load source '{source_id}': {reason}")]
    Discovery { source_id: String, reason: String },

    /// A user-supplied path is not a loadable model catalog.
    #[error("not a loadable model source: '{0}'")]
    InvalidSource(PathBuf),

    /// Options were built against a parameter set that does not match the
    /// model's declared parameters.
    #[error(
        "parameter set does not match model '{model}' (missing: [{}], extra: [{}])",
        missing.join(", "),
        extra.join(", ")
    )]
    ParameterMismatch {
        model: String,
        missing: Vec<String>,
        extra: Vec<String>,
    },

    /// A numeric field could not be parsed where a value is required.
    #[error("invalid value for parameter '{name}': '{raw}'")]
    InvalidParameterValue { name: String, raw: String },

    /// Deserialized options reference a model no longer in the registry.
    #[error("model '{name}' from source '{source_id}' is not in the registry")]
    UnresolvedModel { name: String, source_id: String },
}

pub type FitResult<T> = Result<T, FitError>;
