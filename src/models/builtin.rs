//! Built-in model catalog.
//!
//! Models are grouped into named units, each exporting several models, so
//! the registry treats built-ins exactly like user sources. Implementations
//! are small pure functions; the shared [`FitModel`] trait is the only
//! "base" here and is never itself discoverable.

use std::sync::Arc;

use crate::models::{FitModel, ModelDescriptor};

/// A built-in model: a native function plus its declared metadata.
struct BuiltinModel {
    name: &'static str,
    signature: Vec<String>,
    doc: &'static str,
    f: fn(f64, &[f64]) -> f64,
}

impl FitModel for BuiltinModel {
    fn name(&self) -> &str {
        self.name
    }

    fn signature(&self) -> &[String] {
        &self.signature
    }

    fn doc(&self) -> &str {
        self.doc
    }

    fn eval(&self, x: f64, params: &[f64]) -> f64 {
        (self.f)(x, params)
    }
}

fn model(
    name: &'static str,
    signature: &[&str],
    doc: &'static str,
    f: fn(f64, &[f64]) -> f64,
) -> Arc<dyn FitModel> {
    Arc::new(BuiltinModel {
        name,
        signature: signature.iter().map(|s| s.to_string()).collect(),
        doc,
        f,
    })
}

/// Names of the discoverable built-in units.
pub fn builtin_units() -> &'static [&'static str] {
    &["generic", "oscillations", "peaks"]
}

/// Load one built-in unit, or `None` for an unknown unit name.
pub fn load_builtin_unit(unit: &str) -> Option<Vec<ModelDescriptor>> {
    let models: Vec<Arc<dyn FitModel>> = match unit {
        "generic" => vec![
            model("Linear", &["x", "a", "b"], "a * x + b", |x, p| p[0] * x + p[1]),
            model("Quadratic", &["x", "a", "b", "c"], "a * x^2 + b * x + c", |x, p| {
                p[0] * x * x + p[1] * x + p[2]
            }),
            model(
                "Exponential",
                &["x", "a", "rate"],
                "a * exp(rate * x)",
                |x, p| p[0] * (p[1] * x).exp(),
            ),
            model(
                "PowerLaw",
                &["x", "a", "k"],
                "a * x^k (requires x > 0)",
                |x, p| p[0] * x.powf(p[1]),
            ),
        ],
        "oscillations" => vec![
            model(
                "Cosine",
                &["x", "amp", "freq", "phase"],
                "amp * cos(2*pi*freq*x + phase)",
                |x, p| p[0] * (std::f64::consts::TAU * p[1] * x + p[2]).cos(),
            ),
            model(
                "DampedOscillation",
                &["x", "amp", "tau", "freq", "phase"],
                "amp * exp(-x/tau) * cos(2*pi*freq*x + phase)",
                |x, p| {
                    p[0] * (-x / p[1]).exp() * (std::f64::consts::TAU * p[2] * x + p[3]).cos()
                },
            ),
        ],
        "peaks" => vec![
            model(
                "Gaussian",
                &["x", "amp", "center", "sigma", "offset"],
                "amp * exp(-(x-center)^2 / (2*sigma^2)) + offset",
                |x, p| {
                    let d = x - p[1];
                    p[0] * (-d * d / (2.0 * p[2] * p[2])).exp() + p[3]
                },
            ),
            model(
                "Lorentzian",
                &["x", "amp", "center", "gamma", "offset"],
                "amp * gamma^2 / ((x-center)^2 + gamma^2) + offset",
                |x, p| {
                    let d = x - p[1];
                    let g2 = p[2] * p[2];
                    p[0] * g2 / (d * d + g2) + p[3]
                },
            ),
        ],
        _ => return None,
    };

    Some(
        models
            .into_iter()
            .map(|func| {
                let name = func.name().to_string();
                ModelDescriptor::new(name, unit, func)
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_unit_loads_and_evaluates() {
        for unit in builtin_units() {
            let models = load_builtin_unit(unit).unwrap();
            assert!(!models.is_empty(), "unit '{unit}' is empty");
            for m in &models {
                assert!(!m.param_names().is_empty());
                assert!(!m.doc().is_empty());
                let params = vec![1.0; m.param_names().len()];
                assert!(m.eval(1.0, &params).is_finite(), "{} not finite", m.name());
            }
        }
    }

    #[test]
    fn linear_is_linear() {
        let models = load_builtin_unit("generic").unwrap();
        let linear = models.iter().find(|m| m.name() == "Linear").unwrap();
        assert_eq!(linear.independent_var(), "x");
        assert_eq!(linear.param_names(), ["a".to_string(), "b".to_string()]);
        assert!((linear.eval(3.0, &[2.0, 1.0]) - 7.0).abs() < 1e-12);
    }
}
