//! A minimal named-array dataset.
//!
//! Entries are ordered and carry the names of the axes they depend on: an
//! entry with no axes *is* an axis, an entry with axes is a dependent.
//! Metadata is an ordered map of JSON values, which is also how fitting
//! options travel between pipeline stages (under
//! [`FITTING_OPTIONS_META`]). The pipeline never mutates an input dataset
//! in place — stages clone and annotate the clone.

use indexmap::IndexMap;
use serde_json::Value;

/// Reserved metadata key carrying upstream-chosen fitting options.
///
/// Read-only from this crate's perspective: the pipeline stage consumes it
/// from inputs and never writes it to outputs.
pub const FITTING_OPTIONS_META: &str = "__fitting_options__";

/// One named data entry: values plus the axes they are measured against.
#[derive(Debug, Clone, PartialEq)]
pub struct DataEntry {
    pub values: Vec<f64>,
    pub axes: Vec<String>,
}

/// Ordered named arrays plus metadata.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Dataset {
    entries: IndexMap<String, DataEntry>,
    meta: IndexMap<String, Value>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an independent axis.
    pub fn add_axis(&mut self, name: impl Into<String>, values: Vec<f64>) {
        self.entries.insert(
            name.into(),
            DataEntry {
                values,
                axes: Vec::new(),
            },
        );
    }

    /// Add a dependent entry measured against the named axes.
    pub fn add_dependent(&mut self, name: impl Into<String>, values: Vec<f64>, axes: &[&str]) {
        self.entries.insert(
            name.into(),
            DataEntry {
                values,
                axes: axes.iter().map(|a| a.to_string()).collect(),
            },
        );
    }

    /// Replace or insert a named entry wholesale.
    pub fn set_entry(&mut self, name: impl Into<String>, values: Vec<f64>, axes: &[&str]) {
        self.add_dependent(name, values, axes);
    }

    /// Axis names, in insertion order.
    pub fn axes(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(_, e)| e.axes.is_empty())
            .map(|(n, _)| n.as_str())
            .collect()
    }

    /// Dependent names, in insertion order.
    pub fn dependents(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(_, e)| !e.axes.is_empty())
            .map(|(n, _)| n.as_str())
            .collect()
    }

    pub fn entry(&self, name: &str) -> Option<&DataEntry> {
        self.entries.get(name)
    }

    /// Values of a named entry.
    pub fn data_vals(&self, name: &str) -> Option<&[f64]> {
        self.entries.get(name).map(|e| e.values.as_slice())
    }

    pub fn add_meta(&mut self, key: impl Into<String>, value: Value) {
        self.meta.insert(key.into(), value);
    }

    pub fn meta(&self, key: &str) -> Option<&Value> {
        self.meta.get(key)
    }
}
