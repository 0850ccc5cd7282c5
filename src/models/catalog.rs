//! User model catalogs.
//!
//! A catalog is a JSON file mapping model names to definitions:
//!
//! ```json
//! {
//!   "models": {
//!     "DampedCosine": {
//!       "signature": "x, amp, tau, freq, phase",
//!       "expr": "amp * exp(-x/tau) * cos(2*pi*freq*x + phase)",
//!       "doc": "Exponentially damped cosine."
//!     }
//!   }
//! }
//! ```
//!
//! Each body is compiled against its signature by the strict expression
//! parser; an expression referencing anything outside the signature fails
//! the whole load. Loads always re-read the file, so a re-scan reflects
//! on-disk edits with no cached state in between.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::Deserialize;

use crate::error::{FitError, FitResult};
use crate::expr::Compiled;
use crate::models::{parse_signature, FitModel, ModelDescriptor};

#[derive(Debug, Deserialize)]
struct CatalogFile {
    models: IndexMap<String, CatalogEntry>,
}

#[derive(Debug, Deserialize)]
struct CatalogEntry {
    signature: String,
    expr: String,
    #[serde(default)]
    doc: String,
}

/// A model compiled from a catalog entry.
struct ExprModel {
    name: String,
    signature: Vec<String>,
    doc: String,
    compiled: Compiled,
}

impl FitModel for ExprModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn signature(&self) -> &[String] {
        &self.signature
    }

    fn doc(&self) -> &str {
        &self.doc
    }

    fn eval(&self, x: f64, params: &[f64]) -> f64 {
        let mut frame = Vec::with_capacity(1 + params.len());
        frame.push(x);
        frame.extend_from_slice(params);
        self.compiled.eval(&frame)
    }
}

/// Load every model defined in the catalog file at `path`.
///
/// `source_id` is the registry name of the source, used in error reports.
/// The returned descriptors are freshly built on every call.
pub fn load_model_file(path: &Path, source_id: &str) -> FitResult<Vec<ModelDescriptor>> {
    let discovery_err = |reason: String| FitError::Discovery {
        source_id: source_id.to_string(),
        reason,
    };

    let text = fs::read_to_string(path)
        .map_err(|e| discovery_err(format!("cannot read '{}': {e}", path.display())))?;
    let file: CatalogFile =
        serde_json::from_str(&text).map_err(|e| discovery_err(format!("invalid catalog JSON: {e}")))?;

    let mut out = Vec::with_capacity(file.models.len());
    for (name, entry) in file.models {
        let signature = parse_signature(&entry.signature)
            .map_err(|reason| discovery_err(format!("model '{name}': {reason}")))?;
        let compiled = Compiled::compile(&entry.expr, &signature)
            .map_err(|e| discovery_err(format!("model '{name}': {e}")))?;
        let func: Arc<dyn FitModel> = Arc::new(ExprModel {
            name: name.clone(),
            signature,
            doc: entry.doc,
            compiled,
        });
        out.push(ModelDescriptor::new(name, source_id, func));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_catalog(content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn loads_and_evaluates_expression_models() {
        let f = write_catalog(
            r#"{
                "models": {
                    "Line": {"signature": "x, a, b", "expr": "a*x + b", "doc": "straight line"},
                    "Decay": {"signature": "t, amp, tau", "expr": "amp * exp(-t/tau)"}
                }
            }"#,
        );
        let models = load_model_file(f.path(), "user").unwrap();
        assert_eq!(models.len(), 2);

        let line = &models[0];
        assert_eq!(line.name(), "Line");
        assert_eq!(line.source_id(), "user");
        assert_eq!(line.doc(), "straight line");
        assert!((line.eval(2.0, &[3.0, 1.0]) - 7.0).abs() < 1e-12);

        let decay = &models[1];
        assert_eq!(decay.independent_var(), "t");
        assert!((decay.eval(0.0, &[5.0, 1.0]) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn rejects_expression_outside_signature() {
        let f = write_catalog(
            r#"{"models": {"Bad": {"signature": "x, a", "expr": "a*x + hidden"}}}"#,
        );
        let err = load_model_file(f.path(), "user").unwrap_err();
        assert!(matches!(err, FitError::Discovery { .. }), "{err}");
    }

    #[test]
    fn rejects_malformed_json() {
        let f = write_catalog("not json at all");
        assert!(load_model_file(f.path(), "user").is_err());
    }
}
