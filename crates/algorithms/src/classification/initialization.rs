//! Membership image generation from class signatures
//!
//! The Bayesian classifier consumes per-pixel likelihood vectors. This
//! module builds them from a single-band raster and per-class Gaussian
//! signatures, and derives those signatures from training data.

use ndarray::Array2;

use crate::maybe_rayon::*;
use classigrid_core::raster::Raster;
use classigrid_core::{ClassStack, Error, Result};

/// A class signature: Gaussian parameters derived from training samples.
///
/// The class index is the signature's position in the slice passed to
/// [`memberships_from_signatures`].
#[derive(Debug, Clone)]
pub struct ClassSignature {
    /// Mean value of the class
    pub mean: f64,
    /// Standard deviation of the class (must be positive)
    pub std_dev: f64,
}

/// Build a membership stack of Gaussian likelihoods.
///
/// For each pixel value `x` and class `c`:
/// `membership[c] = (1 / (σ_c√(2π))) * exp(-(x-μ_c)² / (2σ_c²))`
///
/// Non-finite input cells, and cells matching the raster's nodata value,
/// get an all-zero membership vector, which the decision rule later
/// resolves to class 0.
///
/// # Arguments
/// * `raster` - Input measurement raster
/// * `signatures` - One Gaussian signature per class (at least 2)
///
/// # Returns
/// A [`ClassStack`] with one likelihood band per signature, carrying the
/// input raster's geometry.
pub fn memberships_from_signatures(
    raster: &Raster<f64>,
    signatures: &[ClassSignature],
) -> Result<ClassStack> {
    if signatures.len() < 2 {
        return Err(Error::Algorithm(
            "membership generation requires at least 2 class signatures".into(),
        ));
    }
    for (class, sig) in signatures.iter().enumerate() {
        if sig.std_dev <= 0.0 {
            return Err(Error::InvalidParameter {
                name: "std_dev",
                value: sig.std_dev.to_string(),
                reason: format!("class {class} has a non-positive standard deviation"),
            });
        }
    }

    let (rows, cols) = raster.shape();
    let inv_sqrt_2pi = 1.0 / (2.0 * std::f64::consts::PI).sqrt();

    let mut stack = ClassStack::new(signatures.len(), rows, cols)?;
    stack.set_transform(*raster.transform());
    stack.set_crs(raster.crs().cloned());

    for (band, sig) in stack.bands_mut().iter_mut().zip(signatures) {
        let scale = inv_sqrt_2pi / sig.std_dev;
        let data: Vec<f64> = (0..rows)
            .into_par_iter()
            .flat_map(|row| {
                let mut row_data = vec![0.0_f64; cols];
                for (col, out) in row_data.iter_mut().enumerate() {
                    let v = unsafe { raster.get_unchecked(row, col) };
                    if !v.is_finite() || raster.is_nodata(v) {
                        continue;
                    }
                    let z = (v - sig.mean) / sig.std_dev;
                    *out = scale * (-0.5 * z * z).exp();
                }
                row_data
            })
            .collect();

        *band = Array2::from_shape_vec((rows, cols), data)
            .map_err(|e| Error::Other(e.to_string()))?;
    }

    Ok(stack)
}

/// Derive class signatures from a classified raster and a value raster.
///
/// Cells where either raster is non-finite are skipped; classes with fewer
/// than 2 samples are dropped. Signatures are returned in ascending order
/// of the training label, so the label ordering defines the class indices.
///
/// # Arguments
/// * `classified` - Raster with known class labels (e.g., from field data)
/// * `values` - Raster with measurement values
pub fn signatures_from_training(
    classified: &Raster<f64>,
    values: &Raster<f64>,
) -> Result<Vec<ClassSignature>> {
    let (rows, cols) = classified.shape();
    if values.shape() != (rows, cols) {
        return Err(Error::SizeMismatch {
            er: rows,
            ec: cols,
            ar: values.rows(),
            ac: values.cols(),
        });
    }

    let mut class_data: std::collections::BTreeMap<i64, Vec<f64>> =
        std::collections::BTreeMap::new();

    for r in 0..rows {
        for c in 0..cols {
            let class_val = unsafe { classified.get_unchecked(r, c) };
            let data_val = unsafe { values.get_unchecked(r, c) };
            if class_val.is_finite() && data_val.is_finite() {
                class_data
                    .entry(class_val.round() as i64)
                    .or_default()
                    .push(data_val);
            }
        }
    }

    let mut signatures = Vec::new();
    for vals in class_data.values() {
        if vals.len() < 2 {
            continue;
        }
        let n = vals.len() as f64;
        let mean = vals.iter().sum::<f64>() / n;
        let variance = vals.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
        let std_dev = variance.sqrt().max(1e-10); // Guard against zero variance

        signatures.push(ClassSignature { mean, std_dev });
    }

    Ok(signatures)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn make_signatures() -> Vec<ClassSignature> {
        vec![
            ClassSignature { mean: 10.0, std_dev: 2.0 },
            ClassSignature { mean: 50.0, std_dev: 5.0 },
        ]
    }

    #[test]
    fn test_memberships_peak_at_mean() {
        let mut raster = Raster::new(1, 3);
        raster.set(0, 0, 10.0).unwrap();
        raster.set(0, 1, 50.0).unwrap();
        raster.set(0, 2, 30.0).unwrap();

        let stack = memberships_from_signatures(&raster, &make_signatures()).unwrap();
        assert_eq!(stack.n_classes(), 2);

        // At each class mean, that class has the larger likelihood
        let at_10 = stack.vector_at(0, 0).unwrap();
        assert!(at_10[0] > at_10[1]);
        let at_50 = stack.vector_at(0, 1).unwrap();
        assert!(at_50[1] > at_50[0]);

        // Density value at the mean is 1/(σ√(2π))
        let expected = 1.0 / (2.0 * (2.0 * std::f64::consts::PI).sqrt());
        assert_relative_eq!(at_10[0], expected, epsilon = 1e-12);
    }

    #[test]
    fn test_memberships_nan_gives_zero_vector() {
        let mut raster = Raster::filled(2, 2, 10.0);
        raster.set(1, 1, f64::NAN).unwrap();

        let stack = memberships_from_signatures(&raster, &make_signatures()).unwrap();
        assert_eq!(stack.vector_at(1, 1).unwrap(), vec![0.0, 0.0]);
        assert!(stack.vector_at(0, 0).unwrap()[0] > 0.0);
    }

    #[test]
    fn test_memberships_respect_nodata_sentinel() {
        let mut raster = Raster::filled(2, 2, 10.0);
        raster.set_nodata(Some(-9999.0));
        raster.set(0, 1, -9999.0).unwrap();

        let stack = memberships_from_signatures(&raster, &make_signatures()).unwrap();
        assert_eq!(stack.vector_at(0, 1).unwrap(), vec![0.0, 0.0]);
        assert!(stack.vector_at(0, 0).unwrap()[0] > 0.0);
    }

    #[test]
    fn test_memberships_validation() {
        let raster = Raster::filled(2, 2, 10.0);
        assert!(memberships_from_signatures(&raster, &make_signatures()[..1]).is_err());

        let bad = vec![
            ClassSignature { mean: 10.0, std_dev: 2.0 },
            ClassSignature { mean: 50.0, std_dev: 0.0 },
        ];
        assert!(memberships_from_signatures(&raster, &bad).is_err());
    }

    #[test]
    fn test_signatures_from_training() {
        let mut classified = Raster::new(10, 10);
        let mut values = Raster::new(10, 10);
        for row in 0..10 {
            for col in 0..10 {
                let class = if row < 5 { 1.0 } else { 2.0 };
                let val = if row < 5 {
                    10.0 + col as f64
                } else {
                    50.0 + col as f64
                };
                classified.set(row, col, class).unwrap();
                values.set(row, col, val).unwrap();
            }
        }

        let sigs = signatures_from_training(&classified, &values).unwrap();
        assert_eq!(sigs.len(), 2);
        assert_relative_eq!(sigs[0].mean, 14.5, epsilon = 1e-10); // mean of 10..19
        assert_relative_eq!(sigs[1].mean, 54.5, epsilon = 1e-10); // mean of 50..59
        assert!(sigs[0].std_dev > 0.0);
    }

    #[test]
    fn test_signatures_shape_mismatch() {
        let classified = Raster::<f64>::new(4, 4);
        let values = Raster::<f64>::new(3, 4);
        assert!(signatures_from_training(&classified, &values).is_err());
    }
}
