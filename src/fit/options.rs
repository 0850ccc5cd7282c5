//! Fitting options: a model reference plus ordered per-parameter
//! constraints.
//!
//! Construction goes through [`build_options`], which enforces that the
//! parameter set exactly matches the model's declared parameters — never a
//! silent drop or fill. Bounds use a real [`Bound`] type rather than a
//! float-max sentinel, and serialize as JSON null when unbounded.

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::debug;

use crate::error::{FitError, FitResult};
use crate::expr::parse_number;
use crate::models::ModelDescriptor;
use crate::registry::ModelRegistry;

/// One side of a parameter's allowed range.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Bound {
    #[default]
    Unbounded,
    Value(f64),
}

impl Bound {
    /// The bound as a float, with `unbounded` standing in when absent.
    pub fn value_or(self, unbounded: f64) -> f64 {
        match self {
            Bound::Unbounded => unbounded,
            Bound::Value(v) => v,
        }
    }
}

impl Serialize for Bound {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Bound::Unbounded => serializer.serialize_none(),
            Bound::Value(v) => serializer.serialize_some(v),
        }
    }
}

impl<'de> Deserialize<'de> for Bound {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let v = Option::<f64>::deserialize(deserializer)?;
        Ok(match v {
            Some(v) if v.is_finite() => Bound::Value(v),
            _ => Bound::Unbounded,
        })
    }
}

/// Constraint for one fit parameter.
///
/// `lower <= initial <= upper` is a soft expectation only — the engine may
/// clamp, and this layer just passes values through. `fixed` means the
/// engine must not vary the parameter regardless of bounds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterConstraint {
    pub fixed: bool,
    pub initial: f64,
    pub lower: Bound,
    pub upper: Bound,
}

impl Default for ParameterConstraint {
    fn default() -> Self {
        Self {
            fixed: false,
            initial: 1.0,
            lower: Bound::Unbounded,
            upper: Bound::Unbounded,
        }
    }
}

/// Raw per-parameter inputs, as a presenting layer would hand them over:
/// text fields for the numeric values, a flag for fixedness.
#[derive(Debug, Clone, Default)]
pub struct RawConstraint {
    pub fixed: bool,
    pub initial: String,
    pub lower: String,
    pub upper: String,
}

/// The active fitting configuration: a model plus one constraint per
/// declared parameter, in signature order.
#[derive(Debug, Clone)]
pub struct FittingOptions {
    pub model: ModelDescriptor,
    pub parameters: IndexMap<String, ParameterConstraint>,
}

impl FittingOptions {
    /// Change-detection equality: identical model (descriptor identity,
    /// not name) and value-equal constraints.
    pub fn same_as(&self, other: &FittingOptions) -> bool {
        self.model.same_model(&other.model) && self.parameters == other.parameters
    }
}

/// Default options for a model: every parameter varying, initial guess 1,
/// unbounded.
pub fn default_options(model: &ModelDescriptor) -> FittingOptions {
    let parameters = model
        .param_names()
        .iter()
        .map(|name| (name.clone(), ParameterConstraint::default()))
        .collect();
    FittingOptions {
        model: model.clone(),
        parameters,
    }
}

/// Build validated options from raw per-parameter inputs.
///
/// The raw keys must exactly equal the model's declared parameter names
/// (order-insensitive); the result is ordered by the model signature.
/// Initial guesses must parse as finite numbers; bounds that fail to parse
/// degrade to unbounded.
pub fn build_options(
    model: &ModelDescriptor,
    raw: &IndexMap<String, RawConstraint>,
) -> FitResult<FittingOptions> {
    let declared = model.param_names();

    let missing: Vec<String> = declared
        .iter()
        .filter(|n| !raw.contains_key(n.as_str()))
        .cloned()
        .collect();
    let extra: Vec<String> = raw
        .keys()
        .filter(|k| !declared.contains(*k))
        .cloned()
        .collect();
    if !missing.is_empty() || !extra.is_empty() {
        return Err(FitError::ParameterMismatch {
            model: model.name().to_string(),
            missing,
            extra,
        });
    }

    let mut parameters = IndexMap::with_capacity(declared.len());
    for name in declared {
        let r = &raw[name.as_str()];
        let initial = match parse_number(&r.initial) {
            Ok(v) if v.is_finite() => v,
            _ => {
                return Err(FitError::InvalidParameterValue {
                    name: name.clone(),
                    raw: r.initial.clone(),
                });
            }
        };
        parameters.insert(
            name.clone(),
            ParameterConstraint {
                fixed: r.fixed,
                initial,
                lower: parse_bound(name, "lower", &r.lower),
                upper: parse_bound(name, "upper", &r.upper),
            },
        );
    }

    Ok(FittingOptions {
        model: model.clone(),
        parameters,
    })
}

/// Bounds are forgiving: empty or unparseable text means unbounded, which
/// is a sound fallback for a range limit (unlike the initial value).
fn parse_bound(param: &str, side: &str, text: &str) -> Bound {
    if text.trim().is_empty() {
        return Bound::Unbounded;
    }
    match parse_number(text) {
        Ok(v) if v.is_finite() => Bound::Value(v),
        Ok(_) => Bound::Unbounded,
        Err(e) => {
            debug!(param, side, text, %e, "unparseable bound, treating as unbounded");
            Bound::Unbounded
        }
    }
}

/// Wire form of one parameter constraint (`vary` is the inverse of
/// `fixed`, matching the common fitting-library convention).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SavedParam {
    pub vary: bool,
    pub value: f64,
    pub min: Bound,
    pub max: Bound,
}

/// Wire form of the model reference: enough to re-locate the exact
/// descriptor across a registry rebuild.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SavedModelRef {
    pub name: String,
    pub source: String,
}

/// Serialized fitting options, as stored in dataset metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SavedOptions {
    pub model: SavedModelRef,
    pub parameters: IndexMap<String, SavedParam>,
}

impl SavedOptions {
    pub fn from_options(options: &FittingOptions) -> Self {
        Self {
            model: SavedModelRef {
                name: options.model.name().to_string(),
                source: options.model.source_id().to_string(),
            },
            parameters: options
                .parameters
                .iter()
                .map(|(name, c)| {
                    (
                        name.clone(),
                        SavedParam {
                            vary: !c.fixed,
                            value: c.initial,
                            min: c.lower,
                            max: c.upper,
                        },
                    )
                })
                .collect(),
        }
    }

    /// Resolve against a registry, re-validating the parameter set against
    /// the resolved model (the source may have changed since saving).
    pub fn resolve(&self, registry: &ModelRegistry) -> FitResult<FittingOptions> {
        let model = registry.resolve(&self.model.name, &self.model.source)?.clone();

        let declared = model.param_names();
        let missing: Vec<String> = declared
            .iter()
            .filter(|n| !self.parameters.contains_key(n.as_str()))
            .cloned()
            .collect();
        let extra: Vec<String> = self
            .parameters
            .keys()
            .filter(|k| !declared.contains(*k))
            .cloned()
            .collect();
        if !missing.is_empty() || !extra.is_empty() {
            return Err(FitError::ParameterMismatch {
                model: model.name().to_string(),
                missing,
                extra,
            });
        }

        let parameters = declared
            .iter()
            .map(|name| {
                let p = &self.parameters[name.as_str()];
                (
                    name.clone(),
                    ParameterConstraint {
                        fixed: !p.vary,
                        initial: p.value,
                        lower: p.min,
                        upper: p.max,
                    },
                )
            })
            .collect();

        Ok(FittingOptions { model, parameters })
    }
}
