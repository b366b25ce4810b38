//! Bayesian classification of raster grids
//!
//! Per pixel: posterior = membership * prior (straight copy of the
//! membership when no priors are supplied), L1-normalized, optionally
//! regularized by N passes of a smoothing operator per class band, then
//! labeled with the maximum decision rule. Label and posterior images are
//! products of the same pass and are returned together.

use ndarray::Array2;

use crate::classification::decision::classify_posteriors;
use crate::maybe_rayon::*;
use crate::smoothing::SmoothingOperator;
use classigrid_core::raster::Raster;
use classigrid_core::{ClassStack, Error, Result};

/// Labels are u8, so a membership image may carry at most this many classes.
const MAX_CLASSES: usize = 256;

/// Parameters for Bayesian classification
#[derive(Clone, Copy, Default)]
pub struct BayesParams<'a> {
    /// Number of smoothing passes over the posterior bands (default 0)
    pub smoothing_iterations: usize,
    /// Operator applied per class band each pass; required when
    /// `smoothing_iterations > 0`
    pub smoothing: Option<&'a dyn SmoothingOperator>,
}

/// Result of Bayesian classification: the label image plus the final
/// (normalized, optionally smoothed) posterior stack it was derived from.
#[derive(Debug, Clone)]
pub struct BayesianClassification {
    /// Per-pixel class index in `[0, n_classes)`
    pub labels: Raster<u8>,
    /// Per-pixel posterior probability vectors
    pub posteriors: ClassStack,
}

/// Classify a membership image, optionally weighted by per-pixel priors.
///
/// Stages run in a fixed order: validate, combine via the Bayes rule,
/// normalize, smooth (if configured) and re-normalize, then apply the
/// maximum decision rule. Validation failures surface before any output
/// is allocated; errors raised by the smoothing operator propagate
/// unchanged and no outputs are returned.
///
/// # Arguments
/// * `memberships` - Per-pixel class likelihood vectors (read-only)
/// * `priors` - Optional per-pixel prior vectors with matching class count
///   and geometry; absence means a uniform prior
/// * `params` - Smoothing configuration
///
/// # Returns
/// [`BayesianClassification`] holding the label raster and posterior stack,
/// both carrying the membership image's geometry.
pub fn bayesian_classification(
    memberships: &ClassStack,
    priors: Option<&ClassStack>,
    params: &BayesParams<'_>,
) -> Result<BayesianClassification> {
    validate_inputs(memberships, priors, params)?;

    let mut posteriors = compute_bayes_rule(memberships, priors)?;
    normalize_posteriors(&mut posteriors)?;

    if params.smoothing_iterations > 0 {
        if let Some(operator) = params.smoothing {
            smooth_posteriors(&mut posteriors, operator, params.smoothing_iterations)?;
            // Smoothing does not preserve the simplex constraint
            normalize_posteriors(&mut posteriors)?;
        }
    }

    let labels = classify_posteriors(&posteriors)?;
    Ok(BayesianClassification { labels, posteriors })
}

/// Configuration checks, all performed before any per-pixel work
fn validate_inputs(
    memberships: &ClassStack,
    priors: Option<&ClassStack>,
    params: &BayesParams<'_>,
) -> Result<()> {
    if memberships.is_empty() {
        return Err(Error::MissingInput("membership image"));
    }
    if memberships.n_classes() > MAX_CLASSES {
        return Err(Error::InvalidParameter {
            name: "n_classes",
            value: memberships.n_classes().to_string(),
            reason: format!("label image is u8, at most {MAX_CLASSES} classes"),
        });
    }

    if let Some(priors) = priors {
        check_priors_compatible(memberships, priors)?;
    }

    if params.smoothing_iterations > 0 && params.smoothing.is_none() {
        return Err(Error::InvalidParameter {
            name: "smoothing_iterations",
            value: params.smoothing_iterations.to_string(),
            reason: "no smoothing operator configured".into(),
        });
    }

    Ok(())
}

/// Priors must agree with the membership image in class count and geometry
fn check_priors_compatible(memberships: &ClassStack, priors: &ClassStack) -> Result<()> {
    if priors.n_classes() != memberships.n_classes() {
        return Err(Error::ClassCountMismatch {
            expected: memberships.n_classes(),
            actual: priors.n_classes(),
        });
    }
    if !priors.geometry_matches(memberships) {
        return Err(Error::GeometryMismatch("membership image", "priors image"));
    }
    Ok(())
}

/// Raw (unnormalized) posteriors via the Bayes rule.
///
/// With priors: `posterior[c] = membership[c] * prior[c]` per pixel.
/// Without: the posterior stack is a copy of the membership stack, the
/// uniform-prior case.
pub fn compute_bayes_rule(
    memberships: &ClassStack,
    priors: Option<&ClassStack>,
) -> Result<ClassStack> {
    let Some(priors) = priors else {
        return Ok(memberships.clone());
    };

    check_priors_compatible(memberships, priors)?;

    let (rows, cols) = memberships.shape();
    let mut posteriors = ClassStack::zeros_like(memberships);

    for ((out, m), p) in posteriors
        .bands_mut()
        .iter_mut()
        .zip(memberships.bands())
        .zip(priors.bands())
    {
        let data: Vec<f64> = (0..rows)
            .into_par_iter()
            .flat_map(|row| {
                let mut row_data = vec![0.0_f64; cols];
                for (col, v) in row_data.iter_mut().enumerate() {
                    *v = m[(row, col)] * p[(row, col)];
                }
                row_data
            })
            .collect();

        *out = Array2::from_shape_vec((rows, cols), data)
            .map_err(|e| Error::Other(e.to_string()))?;
    }

    Ok(posteriors)
}

/// Scale every posterior vector to unit L1 norm.
///
/// Vectors with zero sum (degenerate membership/prior combinations) are
/// left all-zero; the decision rule's lowest-index tie-break handles them.
pub fn normalize_posteriors(posteriors: &mut ClassStack) -> Result<()> {
    let (rows, cols) = posteriors.shape();

    let sums: Vec<f64> = {
        let bands = posteriors.bands();
        (0..rows)
            .into_par_iter()
            .flat_map(|row| {
                let mut row_sums = vec![0.0_f64; cols];
                for (col, s) in row_sums.iter_mut().enumerate() {
                    *s = bands.iter().map(|b| b[(row, col)]).sum();
                }
                row_sums
            })
            .collect()
    };

    for band in posteriors.bands_mut() {
        let data: Vec<f64> = {
            let b = &*band;
            (0..rows)
                .into_par_iter()
                .flat_map(|row| {
                    let mut row_data = vec![0.0_f64; cols];
                    for (col, v) in row_data.iter_mut().enumerate() {
                        let sum = sums[row * cols + col];
                        let raw = b[(row, col)];
                        *v = if sum > 0.0 { raw / sum } else { raw };
                    }
                    row_data
                })
                .collect()
        };
        *band = Array2::from_shape_vec((rows, cols), data)
            .map_err(|e| Error::Other(e.to_string()))?;
    }

    Ok(())
}

/// Apply `operator` to every class band, `iterations` times.
///
/// Iterations are strictly sequential: each pass re-extracts from the
/// already-smoothed stack. Within one pass the class bands are independent
/// and are smoothed concurrently; the operator is never invoked twice on
/// the same band in the same pass. A returned band whose shape differs
/// from the stack's is rejected.
pub fn smooth_posteriors(
    posteriors: &mut ClassStack,
    operator: &dyn SmoothingOperator,
    iterations: usize,
) -> Result<()> {
    let (rows, cols) = posteriors.shape();

    for _ in 0..iterations {
        let smoothed: Vec<Raster<f64>> = {
            let stack = &*posteriors;
            (0..stack.n_classes())
                .into_par_iter()
                .map(|class| operator.smooth(&stack.extract_band(class)?))
                .collect::<Result<Vec<_>>>()?
        };

        for (class, band) in smoothed.into_iter().enumerate() {
            if band.shape() != (rows, cols) {
                return Err(Error::SizeMismatch {
                    er: rows,
                    ec: cols,
                    ar: band.rows(),
                    ac: band.cols(),
                });
            }
            posteriors.set_band(class, band)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn uniform_stack(n_classes: usize, rows: usize, cols: usize, values: &[f64]) -> ClassStack {
        let mut stack = ClassStack::new(n_classes, rows, cols).unwrap();
        for r in 0..rows {
            for c in 0..cols {
                stack.set_vector(r, c, values).unwrap();
            }
        }
        stack
    }

    #[test]
    fn test_bayes_rule_without_priors_copies_membership() {
        let memberships = uniform_stack(3, 4, 4, &[0.2, 0.5, 0.3]);
        let posteriors = compute_bayes_rule(&memberships, None).unwrap();
        assert_eq!(posteriors.vector_at(2, 2).unwrap(), vec![0.2, 0.5, 0.3]);
        assert!(posteriors.geometry_matches(&memberships));
    }

    #[test]
    fn test_bayes_rule_multiplies_priors() {
        let memberships = uniform_stack(2, 3, 3, &[0.3, 0.7]);
        let priors = uniform_stack(2, 3, 3, &[0.5, 0.5]);

        let posteriors = compute_bayes_rule(&memberships, Some(&priors)).unwrap();
        let v = posteriors.vector_at(1, 1).unwrap();
        assert_relative_eq!(v[0], 0.15, epsilon = 1e-12);
        assert_relative_eq!(v[1], 0.35, epsilon = 1e-12);
    }

    #[test]
    fn test_bayes_rule_class_count_mismatch() {
        let memberships = uniform_stack(3, 3, 3, &[0.2, 0.5, 0.3]);
        let priors = uniform_stack(2, 3, 3, &[0.5, 0.5]);
        assert!(matches!(
            compute_bayes_rule(&memberships, Some(&priors)),
            Err(Error::ClassCountMismatch { expected: 3, actual: 2 })
        ));
    }

    #[test]
    fn test_normalize_sums_to_one() {
        let mut posteriors = uniform_stack(3, 4, 4, &[2.0, 3.0, 5.0]);
        normalize_posteriors(&mut posteriors).unwrap();

        let v = posteriors.vector_at(0, 0).unwrap();
        assert_relative_eq!(v.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(v[0], 0.2, epsilon = 1e-12);
        assert_relative_eq!(v[2], 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_normalize_leaves_zero_vectors() {
        let mut posteriors = uniform_stack(2, 2, 2, &[0.4, 0.6]);
        posteriors.set_vector(1, 1, &[0.0, 0.0]).unwrap();
        normalize_posteriors(&mut posteriors).unwrap();

        assert_eq!(posteriors.vector_at(1, 1).unwrap(), vec![0.0, 0.0]);
        let v = posteriors.vector_at(0, 0).unwrap();
        assert_relative_eq!(v.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_validation_missing_membership() {
        let memberships = ClassStack::new(2, 0, 0).unwrap();
        let result =
            bayesian_classification(&memberships, None, &BayesParams::default());
        assert!(matches!(result, Err(Error::MissingInput(_))));
    }

    #[test]
    fn test_validation_iterations_without_operator() {
        let memberships = uniform_stack(2, 3, 3, &[0.3, 0.7]);
        let params = BayesParams {
            smoothing_iterations: 2,
            smoothing: None,
        };
        assert!(matches!(
            bayesian_classification(&memberships, None, &params),
            Err(Error::InvalidParameter { name: "smoothing_iterations", .. })
        ));
    }

    #[test]
    fn test_validation_geometry_mismatch() {
        use classigrid_core::GeoTransform;

        let memberships = uniform_stack(2, 3, 3, &[0.3, 0.7]);
        let mut priors = uniform_stack(2, 3, 3, &[0.5, 0.5]);
        priors.set_transform(GeoTransform::new(10.0, 10.0, 1.0, -1.0));

        assert!(matches!(
            bayesian_classification(&memberships, Some(&priors), &BayesParams::default()),
            Err(Error::GeometryMismatch(_, _))
        ));
    }

    #[test]
    fn test_smoothing_shape_mismatch_rejected() {
        let mut posteriors = uniform_stack(2, 4, 4, &[0.5, 0.5]);
        let shrinking = |_band: &Raster<f64>| -> Result<Raster<f64>> {
            Ok(Raster::filled(2, 2, 0.5))
        };
        assert!(matches!(
            smooth_posteriors(&mut posteriors, &shrinking, 1),
            Err(Error::SizeMismatch { .. })
        ));
    }

    #[test]
    fn test_smoothing_operator_error_propagates() {
        let mut posteriors = uniform_stack(2, 4, 4, &[0.5, 0.5]);
        let failing = |_band: &Raster<f64>| -> Result<Raster<f64>> {
            Err(Error::Algorithm("operator failed".into()))
        };
        assert!(matches!(
            smooth_posteriors(&mut posteriors, &failing, 1),
            Err(Error::Algorithm(_))
        ));
    }
}
