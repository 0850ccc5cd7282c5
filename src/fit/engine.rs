//! The fit engine: a model bound to `(x, y)` plus its run contract.
//!
//! [`ModelFit::run`] consumes parameter constraints and produces a
//! [`FitOutcome`] that reports success or failure — non-convergence is a
//! normal outcome, never a panic, and the caller keeps the input data
//! untouched on failure.
//!
//! The optimizer is a plain damped least-squares loop (Levenberg–
//! Marquardt) over the non-fixed parameters: forward-difference Jacobian,
//! bounds enforced by projecting each step back into range, and the linear
//! step solved with the SVD routine in [`crate::math`]. Iteration-capped,
//! so a hopeless configuration terminates with `success = false` instead
//! of hanging.

use indexmap::IndexMap;
use nalgebra::{DMatrix, DVector};
use tracing::debug;

use crate::fit::options::ParameterConstraint;
use crate::math::solve_least_squares;
use crate::models::ModelDescriptor;

const MAX_ITERATIONS: usize = 200;
const LAMBDA_START: f64 = 1e-3;
const LAMBDA_MAX: f64 = 1e12;
const COST_TOL: f64 = 1e-12;
const STEP_TOL: f64 = 1e-11;

/// A model bound to one `(x, y)` dataset, ready to run.
pub struct ModelFit<'a> {
    model: &'a ModelDescriptor,
    x: &'a [f64],
    y: &'a [f64],
}

/// Result of one fit run.
#[derive(Debug, Clone)]
pub struct FitOutcome {
    pub success: bool,
    /// Fitted curve sampled at the input `x` values. Empty unless
    /// `success`.
    pub best_fit: Vec<f64>,
    /// Final parameter values, in signature order.
    pub best_params: IndexMap<String, f64>,
    pub iterations: usize,
    pub chisqr: f64,
    pub message: String,
    model_label: String,
    n_points: usize,
    fixed: Vec<String>,
}

impl FitOutcome {
    /// Human-readable report of the run, success or not.
    pub fn fit_report(&self) -> String {
        let mut out = String::new();
        out.push_str("[[Fit]]\n");
        out.push_str(&format!("    model       = {}\n", self.model_label));
        out.push_str(&format!("    success     = {}\n", self.success));
        out.push_str(&format!("    data points = {}\n", self.n_points));
        out.push_str(&format!("    iterations  = {}\n", self.iterations));
        out.push_str(&format!("    chi-square  = {:.6e}\n", self.chisqr));
        out.push_str(&format!("    message     = {}\n", self.message));
        out.push_str("[[Parameters]]\n");
        for (name, value) in &self.best_params {
            let flag = if self.fixed.contains(name) {
                "fixed"
            } else {
                "varied"
            };
            out.push_str(&format!("    {name} = {value:.8} ({flag})\n"));
        }
        out
    }
}

impl<'a> ModelFit<'a> {
    pub fn new(model: &'a ModelDescriptor, x: &'a [f64], y: &'a [f64]) -> Self {
        Self { model, x, y }
    }

    /// Run the fit with the given constraints.
    ///
    /// Constraints must cover exactly the model's declared parameters
    /// (options built via [`crate::fit::build_options`] always do); a
    /// mismatched or empty dataset is reported as a failed outcome rather
    /// than a panic.
    pub fn run(&self, params: &IndexMap<String, ParameterConstraint>) -> FitOutcome {
        let names = self.model.param_names();

        if self.x.is_empty() || self.x.len() != self.y.len() {
            return self.failure(params, 0, f64::NAN, "empty or mismatched data arrays");
        }
        if names.len() != params.len() || names.iter().any(|n| !params.contains_key(n.as_str())) {
            return self.failure(params, 0, f64::NAN, "constraints do not match model parameters");
        }

        // Assemble the working vectors in signature order.
        let mut p: Vec<f64> = Vec::with_capacity(names.len());
        let mut lower: Vec<f64> = Vec::with_capacity(names.len());
        let mut upper: Vec<f64> = Vec::with_capacity(names.len());
        let mut free: Vec<usize> = Vec::new();
        for (i, name) in names.iter().enumerate() {
            let c = &params[name.as_str()];
            let lo = c.lower.value_or(f64::NEG_INFINITY);
            let hi = c.upper.value_or(f64::INFINITY);
            // An inverted (or NaN) bound pair admits no value at all, and
            // clamping against it would panic.
            if !(lo <= hi) {
                return self.failure(
                    params,
                    0,
                    f64::NAN,
                    &format!("inverted bounds for parameter '{name}'"),
                );
            }
            p.push(c.initial.clamp(lo, hi));
            lower.push(lo);
            upper.push(hi);
            if !c.fixed {
                free.push(i);
            }
        }

        let mut cost = self.chisqr_at(&p);
        if !cost.is_finite() {
            return self.outcome(
                params,
                &p,
                false,
                0,
                cost,
                "model evaluates to non-finite values at the initial guess",
            );
        }

        // All parameters fixed: nothing to optimize, the evaluation is the
        // fit.
        if free.is_empty() {
            return self.outcome(params, &p, true, 0, cost, "all parameters fixed");
        }

        let n = self.x.len();
        let m = free.len();
        let mut lambda = LAMBDA_START;
        let mut converged = false;
        let mut message = String::from("did not converge within the iteration limit");
        let mut iterations = 0;

        for iter in 1..=MAX_ITERATIONS {
            iterations = iter;

            let residuals = self.residuals_at(&p);
            let jacobian = self.jacobian(&p, &free, &lower, &upper);

            // Damped normal equations, solved as a stacked least-squares
            // problem: [J; sqrt(lambda) I] delta = [r; 0].
            let mut step_found = false;
            while lambda <= LAMBDA_MAX {
                let mut a = DMatrix::<f64>::zeros(n + m, m);
                let mut b = DVector::<f64>::zeros(n + m);
                for i in 0..n {
                    for j in 0..m {
                        a[(i, j)] = jacobian[(i, j)];
                    }
                    b[i] = residuals[i];
                }
                let damp = lambda.sqrt();
                for j in 0..m {
                    a[(n + j, j)] = damp;
                }

                let Some(delta) = solve_least_squares(&a, &b) else {
                    lambda *= 10.0;
                    continue;
                };

                let mut trial = p.clone();
                for (j, &idx) in free.iter().enumerate() {
                    trial[idx] = (trial[idx] + delta[j]).clamp(lower[idx], upper[idx]);
                }
                let trial_cost = self.chisqr_at(&trial);

                if trial_cost.is_finite() && trial_cost <= cost {
                    let max_step = free
                        .iter()
                        .enumerate()
                        .map(|(j, &idx)| (trial[idx] - p[idx]).abs().max(delta[j].abs().min(1.0)))
                        .fold(0.0_f64, f64::max);
                    let improvement = cost - trial_cost;

                    p = trial;
                    let prev = cost;
                    cost = trial_cost;
                    lambda = (lambda / 3.0).max(1e-12);
                    step_found = true;

                    if improvement <= COST_TOL * (prev + COST_TOL) || max_step <= STEP_TOL {
                        converged = true;
                        message = "converged".to_string();
                    }
                    break;
                }
                lambda *= 10.0;
            }

            if converged {
                break;
            }
            if !step_found {
                // No acceptable step at any damping: either we are at a
                // (possibly bound-constrained) minimum, or the surface is
                // hostile. Treat a finite, stationary cost as converged.
                if cost.is_finite() {
                    converged = true;
                    message = "converged (no further improvement possible)".to_string();
                } else {
                    message = "no acceptable step found".to_string();
                }
                break;
            }
        }

        if !converged {
            debug!(model = self.model.name(), iterations, cost, "fit did not converge");
        }
        self.outcome(params, &p, converged, iterations, cost, &message)
    }

    fn residuals_at(&self, p: &[f64]) -> DVector<f64> {
        DVector::from_iterator(
            self.x.len(),
            self.x
                .iter()
                .zip(self.y.iter())
                .map(|(&x, &y)| y - self.model.eval(x, p)),
        )
    }

    fn chisqr_at(&self, p: &[f64]) -> f64 {
        self.x
            .iter()
            .zip(self.y.iter())
            .map(|(&x, &y)| {
                let r = y - self.model.eval(x, p);
                r * r
            })
            .sum()
    }

    /// Forward-difference Jacobian of the residuals w.r.t. the free
    /// parameters. Steps that would leave the bounds flip direction.
    fn jacobian(&self, p: &[f64], free: &[usize], lower: &[f64], upper: &[f64]) -> DMatrix<f64> {
        let n = self.x.len();
        let m = free.len();
        let base = self.residuals_at(p);
        let mut jac = DMatrix::<f64>::zeros(n, m);

        for (j, &idx) in free.iter().enumerate() {
            let mut h = 1e-8 * p[idx].abs().max(1.0);
            if p[idx] + h > upper[idx] {
                h = -h;
            }
            let mut stepped = p.to_vec();
            stepped[idx] = (stepped[idx] + h).clamp(lower[idx], upper[idx]);
            let actual = stepped[idx] - p[idx];
            if actual == 0.0 {
                continue; // parameter pinned between equal bounds
            }
            let perturbed = self.residuals_at(&stepped);
            for i in 0..n {
                jac[(i, j)] = (perturbed[i] - base[i]) / actual;
            }
        }
        jac
    }

    fn failure(
        &self,
        params: &IndexMap<String, ParameterConstraint>,
        iterations: usize,
        chisqr: f64,
        message: &str,
    ) -> FitOutcome {
        let p: Vec<f64> = self
            .model
            .param_names()
            .iter()
            .map(|n| params.get(n.as_str()).map_or(f64::NAN, |c| c.initial))
            .collect();
        self.outcome(params, &p, false, iterations, chisqr, message)
    }

    fn outcome(
        &self,
        params: &IndexMap<String, ParameterConstraint>,
        p: &[f64],
        success: bool,
        iterations: usize,
        chisqr: f64,
        message: &str,
    ) -> FitOutcome {
        let names = self.model.param_names();
        let best_fit = if success {
            self.x.iter().map(|&x| self.model.eval(x, p)).collect()
        } else {
            Vec::new()
        };
        FitOutcome {
            success,
            best_fit,
            best_params: names
                .iter()
                .zip(p.iter())
                .map(|(n, &v)| (n.clone(), v))
                .collect(),
            iterations,
            chisqr,
            message: message.to_string(),
            model_label: format!("{} ({})", self.model.name(), self.model.source_id()),
            n_points: self.x.len(),
            fixed: names
                .iter()
                .filter(|n| params.get(n.as_str()).is_some_and(|c| c.fixed))
                .cloned()
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fit::options::{Bound, default_options};
    use crate::models::load_builtin_unit;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Normal};

    fn builtin(unit: &str, name: &str) -> ModelDescriptor {
        load_builtin_unit(unit)
            .unwrap()
            .into_iter()
            .find(|m| m.name() == name)
            .unwrap()
    }

    #[test]
    fn fits_exact_linear_data() {
        let model = builtin("generic", "Linear");
        let x = [0.0, 1.0, 2.0, 3.0];
        let y = [1.0, 3.0, 5.0, 7.0];
        let options = default_options(&model);

        let outcome = ModelFit::new(&model, &x, &y).run(&options.parameters);
        assert!(outcome.success, "{}", outcome.message);
        assert_eq!(outcome.best_fit.len(), x.len());
        assert!((outcome.best_params["a"] - 2.0).abs() < 1e-6);
        assert!((outcome.best_params["b"] - 1.0).abs() < 1e-6);
        assert!(outcome.chisqr < 1e-10);
        assert!(!outcome.fit_report().is_empty());
    }

    #[test]
    fn fixed_parameters_do_not_move() {
        let model = builtin("generic", "Linear");
        let x = [0.0, 1.0, 2.0, 3.0];
        let y = [1.0, 3.0, 5.0, 7.0];
        let mut options = default_options(&model);
        options.parameters["b"].fixed = true;
        options.parameters["b"].initial = 0.0;

        let outcome = ModelFit::new(&model, &x, &y).run(&options.parameters);
        assert!(outcome.success);
        assert_eq!(outcome.best_params["b"], 0.0);
        // With b pinned at 0, least squares pushes a off the true slope.
        assert!((outcome.best_params["a"] - 2.0).abs() > 1e-3);
    }

    #[test]
    fn bounds_are_respected() {
        let model = builtin("generic", "Linear");
        let x = [0.0, 1.0, 2.0, 3.0];
        let y = [1.0, 3.0, 5.0, 7.0];
        let mut options = default_options(&model);
        options.parameters["a"].upper = Bound::Value(1.5);

        let outcome = ModelFit::new(&model, &x, &y).run(&options.parameters);
        assert!(outcome.success);
        assert!(outcome.best_params["a"] <= 1.5 + 1e-12);
    }

    #[test]
    fn recovers_gaussian_from_noisy_data() {
        let model = builtin("peaks", "Gaussian");
        let true_p = [4.0, 2.0, 0.7, 0.5]; // amp, center, sigma, offset

        let mut rng = StdRng::seed_from_u64(7);
        let noise = Normal::new(0.0, 0.01).unwrap();
        let x: Vec<f64> = (0..80).map(|i| i as f64 * 0.05).collect();
        let y: Vec<f64> = x
            .iter()
            .map(|&xi| model.eval(xi, &true_p) + noise.sample(&mut rng))
            .collect();

        let mut options = default_options(&model);
        options.parameters["amp"].initial = 3.0;
        options.parameters["center"].initial = 1.5;
        options.parameters["sigma"].initial = 1.0;
        options.parameters["offset"].initial = 0.0;

        let outcome = ModelFit::new(&model, &x, &y).run(&options.parameters);
        assert!(outcome.success, "{}", outcome.message);
        assert!((outcome.best_params["amp"] - 4.0).abs() < 0.1);
        assert!((outcome.best_params["center"] - 2.0).abs() < 0.05);
        assert!((outcome.best_params["sigma"].abs() - 0.7).abs() < 0.05);
    }

    #[test]
    fn invalid_domain_is_a_failed_outcome_not_a_panic() {
        // PowerLaw with fractional exponent over negative x yields NaN
        // everywhere, so the initial cost is already non-finite.
        let model = builtin("generic", "PowerLaw");
        let x = [-3.0, -2.0, -1.0];
        let y = [1.0, 2.0, 3.0];
        let mut options = default_options(&model);
        options.parameters["k"].initial = 0.5;

        let outcome = ModelFit::new(&model, &x, &y).run(&options.parameters);
        assert!(!outcome.success);
        assert!(outcome.best_fit.is_empty());
        assert!(!outcome.fit_report().is_empty());
    }

    #[test]
    fn inverted_bounds_fail_softly() {
        // Bound ordering is a soft expectation at the options layer, so a
        // lower above the upper can reach the engine; it must come back as
        // a failed outcome, not a panic.
        let model = builtin("generic", "Linear");
        let x = [0.0, 1.0, 2.0, 3.0];
        let y = [1.0, 3.0, 5.0, 7.0];
        let mut options = default_options(&model);
        options.parameters["a"].lower = Bound::Value(5.0);
        options.parameters["a"].upper = Bound::Value(1.0);

        let outcome = ModelFit::new(&model, &x, &y).run(&options.parameters);
        assert!(!outcome.success);
        assert!(outcome.message.contains("'a'"), "{}", outcome.message);
        assert!(outcome.best_fit.is_empty());
    }

    #[test]
    fn mismatched_constraints_fail_softly() {
        let model = builtin("generic", "Linear");
        let x = [0.0, 1.0];
        let y = [0.0, 1.0];
        let outcome = ModelFit::new(&model, &x, &y).run(&IndexMap::new());
        assert!(!outcome.success);
    }
}
