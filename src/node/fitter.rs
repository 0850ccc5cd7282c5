//! The fitting pipeline stage.
//!
//! [`FitNode::process`] turns (input dataset, active options) into an
//! output dataset. The universal fallback is pass-through: multi-
//! dimensional data, absent options, unresolved upstream options, and
//! failed fits all return an unmodified copy of the input. Only a
//! successful fit annotates the copy, with a `fit` entry on the input's
//! axis and the engine report under the `info` metadata key.
//!
//! Upstream options arriving in `__fitting_options__` are adopted as the
//! active baseline only while provenance is unset, and adoption itself
//! never fits — the fit happens on the next trigger, so a presenting
//! layer gets a chance to reflect the adopted defaults first.

use serde_json::Value;
use tracing::{debug, warn};

use crate::data::{Dataset, FITTING_OPTIONS_META};
use crate::error::{FitError, FitResult};
use crate::fit::{
    FitOutcome, FittingOptions, ModelFit, OptionsState, ParameterConstraint, Provenance,
    SavedOptions,
};
use crate::node::ChangeNotifier;
use crate::registry::ModelRegistry;

/// Everything one `process` call produced.
#[derive(Debug)]
pub struct ProcessOutput {
    /// The stage output: the input copy, annotated on fit success.
    pub output: Dataset,
    /// Engine outcome when a fit was attempted (success or not).
    pub outcome: Option<FitOutcome>,
    /// Upstream options were adopted as the new baseline on this call.
    pub adopted_upstream: bool,
    /// The upstream-options channel was present but unusable.
    pub upstream_error: Option<FitError>,
}

/// The pipeline stage: active options, their provenance, and the
/// live-update wiring.
#[derive(Debug, Default)]
pub struct FitNode {
    state: OptionsState,
    notifier: ChangeNotifier,
}

impl FitNode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn options(&self) -> Option<&FittingOptions> {
        self.state.current()
    }

    pub fn provenance(&self) -> Provenance {
        self.state.provenance()
    }

    pub fn notifier(&self) -> &ChangeNotifier {
        &self.notifier
    }

    pub fn notifier_mut(&mut self) -> &mut ChangeNotifier {
        &mut self.notifier
    }

    pub fn set_live_update(&mut self, live: bool) {
        self.notifier.set_live(live);
    }

    /// Explicit "fit now" trigger, live update or not.
    pub fn request_fit(&mut self) {
        self.notifier.request_fit();
    }

    /// The user picked a model (options already validated for it).
    ///
    /// Replaces the active options, rebuilds the parameter rows for the
    /// new model, and queues the aggregated change event if live.
    pub fn select_model(&mut self, options: FittingOptions) {
        let rows: Vec<String> = options.parameters.keys().cloned().collect();
        self.state.set_user(options);
        // Rows are recreated on model change; re-subscription must follow
        // the rebuild, not precede it.
        self.notifier.rebuild_rows(&rows);
        self.notifier.record_model_change();
    }

    /// The user edited one parameter's constraint.
    pub fn set_parameter(&mut self, name: &str, constraint: ParameterConstraint) -> FitResult<()> {
        let Some(current) = self.state.current() else {
            return Err(FitError::ParameterMismatch {
                model: "(no active options)".to_string(),
                missing: Vec::new(),
                extra: vec![name.to_string()],
            });
        };
        if !current.parameters.contains_key(name) {
            return Err(FitError::ParameterMismatch {
                model: current.model.name().to_string(),
                missing: Vec::new(),
                extra: vec![name.to_string()],
            });
        }
        let mut updated = current.clone();
        updated.parameters[name] = constraint;
        self.state.set_user(updated);
        self.notifier.record_param_edit(name);
        Ok(())
    }

    /// Explicitly re-adopt the most recently seen upstream options.
    ///
    /// Returns `false` if no upstream options have arrived yet.
    pub fn reload_input_options(&mut self) -> bool {
        if !self.state.reload_upstream() {
            return false;
        }
        let rows: Vec<String> = self
            .state
            .current()
            .map(|o| o.parameters.keys().cloned().collect())
            .unwrap_or_default();
        self.notifier.rebuild_rows(&rows);
        self.notifier.record_model_change();
        true
    }

    /// Run the stage on one input dataset.
    pub fn process(&mut self, input: &Dataset, registry: &ModelRegistry) -> ProcessOutput {
        let mut out = ProcessOutput {
            output: input.clone(),
            outcome: None,
            adopted_upstream: false,
            upstream_error: None,
        };

        // Only single-axis, single-dependent data is fittable here;
        // anything else passes through untouched.
        let axes = input.axes();
        let deps = input.dependents();
        if axes.len() > 1 || deps.len() > 1 {
            return out;
        }

        // The sole sanctioned channel for upstream-chosen options.
        let mut upstream: Option<FittingOptions> = None;
        if let Some(value) = input.meta(FITTING_OPTIONS_META) {
            match serde_json::from_value::<SavedOptions>(value.clone()) {
                Ok(saved) => match saved.resolve(registry) {
                    Ok(options) => upstream = Some(options),
                    Err(e) => {
                        warn!(%e, "upstream fitting options did not resolve");
                        out.upstream_error = Some(e);
                    }
                },
                Err(e) => {
                    let err = FitError::Discovery {
                        source_id: FITTING_OPTIONS_META.to_string(),
                        reason: e.to_string(),
                    };
                    warn!(%err, "unreadable upstream fitting options");
                    out.upstream_error = Some(err);
                }
            }
        }

        if self.state.current().is_none() {
            if let Some(options) = upstream {
                let rows: Vec<String> = options.parameters.keys().cloned().collect();
                if self.state.try_adopt_upstream(options) {
                    self.notifier.rebuild_rows(&rows);
                    // Live mode fits the adopted baseline on the next
                    // trigger, same as any other model change.
                    self.notifier.record_model_change();
                    out.adopted_upstream = true;
                    debug!("adopted upstream fitting options as baseline");
                }
            }
            // With or without an adoption, this invocation does not fit.
            return out;
        }
        if let Some(options) = upstream {
            // Active options take precedence; remember the arrival so an
            // explicit reload can pick it up.
            self.state.record_upstream(options);
        }

        let Some(options) = self.state.current().cloned() else {
            return out;
        };
        let (Some(&axname), Some(&depname)) = (axes.first(), deps.first()) else {
            return out;
        };
        let (Some(x), Some(y)) = (input.data_vals(axname), input.data_vals(depname)) else {
            return out;
        };

        let outcome = ModelFit::new(&options.model, x, y).run(&options.parameters);
        if outcome.success {
            let mut annotated = input.clone();
            annotated.set_entry("fit", outcome.best_fit.clone(), &[axname]);
            annotated.add_meta("info", Value::String(outcome.fit_report()));
            out.output = annotated;
        } else {
            debug!(
                model = options.model.name(),
                message = %outcome.message,
                "fit unsuccessful, passing input through"
            );
        }
        out.outcome = Some(outcome);
        out
    }
}
