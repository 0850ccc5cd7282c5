//! `fitnode` library crate.
//!
//! A dynamic fit-model registry plus a reactive fitting pipeline stage:
//!
//! - discover fit models from built-in catalogs and user-supplied files,
//!   with on-demand re-scan so edited definitions are picked up
//! - couple a chosen model to per-parameter constraints (fix / initial
//!   guess / bounds)
//! - track where the active options came from (upstream data vs. user
//!   choice) and apply the corresponding override precedence
//! - run the fit as one stage of a dataset pipeline, with pass-through as
//!   the universal fallback for anything that cannot be fitted

pub mod data;
pub mod error;
pub mod expr;
pub mod fit;
pub mod math;
pub mod models;
pub mod node;
pub mod registry;
