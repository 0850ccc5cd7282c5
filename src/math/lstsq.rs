//! Least-squares solve for optimizer steps.
//!
//! Each Levenberg–Marquardt iteration solves a small linear problem
//!
//! ```text
//! minimize ‖ J δ - r ‖²   (with damping rows appended to J)
//! ```
//!
//! for the parameter step `δ`. The systems are tall (observations ≥
//! parameters) and can be nearly rank-deficient when a model direction is
//! locally flat, so we solve via SVD rather than QR: nalgebra's `QR::solve`
//! targets square systems, and SVD handles the ill-conditioned candidates
//! gracefully. Parameter counts are tiny, so SVD cost is irrelevant.

use nalgebra::{DMatrix, DVector};

/// Solve a least-squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly,
/// or if the solution contains non-finite entries.
pub fn solve_least_squares(a: &DMatrix<f64>, b: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = a.clone().svd(true, true);

    // Try progressively looser tolerances if the strict solve fails.
    for &tol in &[1e-10, 1e-8, 1e-6] {
        if let Ok(x) = svd.solve(b, tol) {
            if x.iter().all(|v| v.is_finite()) {
                return Some(x);
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solves_overdetermined_system() {
        // Fit y = 2 + 3x on x = [0,1,2].
        let a = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0]);
        let b = DVector::from_row_slice(&[2.0, 5.0, 8.0]);

        let x = solve_least_squares(&a, &b).unwrap();
        assert!((x[0] - 2.0).abs() < 1e-10);
        assert!((x[1] - 3.0).abs() < 1e-10);
    }

    #[test]
    fn rejects_non_finite_input() {
        let a = DMatrix::from_row_slice(2, 1, &[f64::NAN, 1.0]);
        let b = DVector::from_row_slice(&[1.0, 2.0]);
        assert!(solve_least_squares(&a, &b).is_none());
    }
}
