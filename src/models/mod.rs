//! Fit-model definitions and the descriptor type the registry hands out.
//!
//! A model is anything implementing the [`FitModel`] capability: a declared
//! signature (independent variable first), a doc string, and pointwise
//! evaluation. Detection is this trait, not runtime type introspection —
//! built-in models are small pure functions ([`builtin`]), user models are
//! compiled expressions loaded from catalog files ([`catalog`]).

use std::sync::Arc;

pub mod builtin;
pub mod catalog;

pub use builtin::{builtin_units, load_builtin_unit};
pub use catalog::load_model_file;

/// Capability every fit model exposes.
///
/// `signature()` lists the model's variables with the independent variable
/// first, mirroring how a plain function would be written (`f(x, a, b)`).
/// `eval` receives the remaining signature entries, in order, as `params`.
pub trait FitModel: Send + Sync {
    fn name(&self) -> &str;
    fn signature(&self) -> &[String];
    fn doc(&self) -> &str;
    fn eval(&self, x: f64, params: &[f64]) -> f64;
}

/// One discovered model: its unique name, the source it came from, and the
/// callable with its metadata.
///
/// Descriptors are cheap to clone; identity (for change detection) is the
/// shared callable, not the name — two registry generations of the same
/// model name are distinct descriptors.
#[derive(Clone)]
pub struct ModelDescriptor {
    name: String,
    source_id: String,
    func: Arc<dyn FitModel>,
}

impl ModelDescriptor {
    pub fn new(name: impl Into<String>, source_id: impl Into<String>, func: Arc<dyn FitModel>) -> Self {
        Self {
            name: name.into(),
            source_id: source_id.into(),
            func,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Id of the source this descriptor was discovered in.
    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn doc(&self) -> &str {
        self.func.doc()
    }

    /// Name of the independent variable (first signature entry).
    pub fn independent_var(&self) -> &str {
        &self.func.signature()[0]
    }

    /// Declared parameter names, excluding the independent variable.
    pub fn param_names(&self) -> &[String] {
        &self.func.signature()[1..]
    }

    /// Evaluate the model at `x` with parameters in signature order.
    pub fn eval(&self, x: f64, params: &[f64]) -> f64 {
        self.func.eval(x, params)
    }

    /// Descriptor identity: the same underlying callable.
    ///
    /// Name equality is not enough — a re-scanned source produces fresh
    /// callables, and stale options must not compare equal to fresh ones.
    pub fn same_model(&self, other: &ModelDescriptor) -> bool {
        Arc::ptr_eq(&self.func, &other.func)
    }
}

impl std::fmt::Debug for ModelDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelDescriptor")
            .field("name", &self.name)
            .field("source_id", &self.source_id)
            .field("signature", &self.func.signature())
            .finish()
    }
}

/// Split a signature string like `"x, a, b"` into its variable names.
///
/// Requires at least two entries (independent variable plus one parameter)
/// and plain identifier syntax for each.
pub(crate) fn parse_signature(signature: &str) -> Result<Vec<String>, String> {
    let names: Vec<String> = signature
        .split(',')
        .map(|s| s.trim().to_string())
        .collect();

    if names.len() < 2 {
        return Err(format!(
            "signature '{signature}' needs an independent variable and at least one parameter"
        ));
    }
    for name in &names {
        let mut chars = name.chars();
        let head_ok = chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
        if !head_ok || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(format!("'{name}' is not a valid variable name"));
        }
    }
    let mut seen = Vec::new();
    for name in &names {
        if seen.contains(&name) {
            return Err(format!("duplicate variable '{name}' in signature"));
        }
        seen.push(name);
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_parsing() {
        assert_eq!(
            parse_signature("x, a, b").unwrap(),
            vec!["x".to_string(), "a".to_string(), "b".to_string()]
        );
        assert!(parse_signature("x").is_err());
        assert!(parse_signature("x, 2a").is_err());
        assert!(parse_signature("x, a, a").is_err());
    }

    #[test]
    fn descriptor_identity_is_the_callable() {
        let unit = builtin_units()[0];
        let models = load_builtin_unit(unit).unwrap();
        let a = models[0].clone();
        let b = a.clone();
        assert!(a.same_model(&b));

        // A fresh load of the same unit produces distinct callables.
        let again = load_builtin_unit(unit).unwrap();
        assert!(!a.same_model(&again[0]));
    }
}
