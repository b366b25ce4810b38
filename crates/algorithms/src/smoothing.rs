//! Smoothing operators for posterior regularization
//!
//! The Bayesian classifier accepts any single-band transform implementing
//! [`SmoothingOperator`] and applies it per class component between
//! normalization and the decision rule. Two concrete operators are
//! provided: an isotropic Gaussian kernel and a 3x3 distance-weighted mean.

use ndarray::Array2;

use crate::maybe_rayon::*;
use classigrid_core::raster::{Raster, RasterElement};
use classigrid_core::{Error, Result};

/// A single-band-raster to single-band-raster transform.
///
/// The classifier treats implementors as opaque: it extracts one class
/// band, hands it over, and writes the result back. The returned raster
/// must have the input's shape; the classifier rejects anything else.
/// Operators must be `Sync` because independent class bands may be
/// smoothed concurrently within one iteration.
pub trait SmoothingOperator: Sync {
    /// Produce a smoothed copy of `band`
    fn smooth(&self, band: &Raster<f64>) -> Result<Raster<f64>>;
}

impl<F> SmoothingOperator for F
where
    F: Fn(&Raster<f64>) -> Result<Raster<f64>> + Sync,
{
    fn smooth(&self, band: &Raster<f64>) -> Result<Raster<f64>> {
        self(band)
    }
}

/// Isotropic Gaussian kernel smoothing.
///
/// `G(x,y) = exp(-(x²+y²)/(2σ²))`, renormalized over the cells that fall
/// inside the grid, so edges do not darken. NaN cells and cells matching
/// the band's nodata value become NaN in the output and are excluded from
/// their neighbors' averages.
#[derive(Debug, Clone)]
pub struct GaussianSmoothing {
    /// Kernel radius in cells; the kernel is (2*radius+1) x (2*radius+1)
    pub radius: usize,
    /// Standard deviation in cell units; values <= 0 select radius / 2
    pub sigma: f64,
}

impl Default for GaussianSmoothing {
    fn default() -> Self {
        Self {
            radius: 2,
            sigma: 0.0, // auto: radius / 2.0
        }
    }
}

impl SmoothingOperator for GaussianSmoothing {
    fn smooth(&self, band: &Raster<f64>) -> Result<Raster<f64>> {
        if self.radius == 0 {
            return Err(Error::InvalidParameter {
                name: "radius",
                value: "0".into(),
                reason: "Gaussian kernel needs a positive radius".into(),
            });
        }

        let (rows, cols) = band.shape();
        let r = self.radius as isize;
        let sigma = if self.sigma <= 0.0 {
            self.radius as f64 / 2.0
        } else {
            self.sigma
        };
        let two_sigma_sq = 2.0 * sigma * sigma;

        // Precompute the kernel
        let kernel_size = 2 * self.radius + 1;
        let mut kernel = vec![0.0_f64; kernel_size * kernel_size];
        for dr in -r..=r {
            for dc in -r..=r {
                let dist_sq = (dr * dr + dc * dc) as f64;
                let idx = ((dr + r) as usize) * kernel_size + (dc + r) as usize;
                kernel[idx] = (-dist_sq / two_sigma_sq).exp();
            }
        }

        let nodata = band.nodata();
        let data = band.data();

        let output_data: Vec<f64> = (0..rows)
            .into_par_iter()
            .flat_map(|row| {
                let mut row_data = vec![f64::NAN; cols];
                for col in 0..cols {
                    let z0 = data[(row, col)];
                    if z0.is_nodata(nodata) {
                        continue;
                    }

                    let mut sum = 0.0;
                    let mut wsum = 0.0;

                    for dr in -r..=r {
                        let nr = row as isize + dr;
                        if nr < 0 || (nr as usize) >= rows {
                            continue;
                        }

                        for dc in -r..=r {
                            let nc = col as isize + dc;
                            if nc < 0 || (nc as usize) >= cols {
                                continue;
                            }

                            let z = data[(nr as usize, nc as usize)];
                            if z.is_nodata(nodata) {
                                continue;
                            }

                            let ki = ((dr + r) as usize) * kernel_size + (dc + r) as usize;
                            sum += z * kernel[ki];
                            wsum += kernel[ki];
                        }
                    }

                    if wsum > 0.0 {
                        row_data[col] = sum / wsum;
                    }
                }
                row_data
            })
            .collect();

        let mut output = band.with_same_meta::<f64>(rows, cols);
        output.set_nodata(Some(f64::NAN));
        *output.data_mut() = Array2::from_shape_vec((rows, cols), output_data)
            .map_err(|e| Error::Other(e.to_string()))?;

        Ok(output)
    }
}

/// 3x3 distance-weighted mean smoothing.
///
/// Each interior cell becomes the weighted mean of itself and its eight
/// neighbors, with weights `1/d^m` for neighbor distance `d`. Border cells
/// pass through unchanged; NaN and nodata cells become NaN and are
/// excluded from their neighbors' means.
#[derive(Debug, Clone)]
pub struct MeanSmoothing {
    /// Weight exponent m: 0 = uniform mean, 1 = inverse distance (default),
    /// 2 = inverse distance squared
    pub weight_exponent: u32,
}

impl Default for MeanSmoothing {
    fn default() -> Self {
        Self { weight_exponent: 1 }
    }
}

impl SmoothingOperator for MeanSmoothing {
    fn smooth(&self, band: &Raster<f64>) -> Result<Raster<f64>> {
        let (rows, cols) = band.shape();
        let m = self.weight_exponent;

        let sqrt2 = std::f64::consts::SQRT_2;
        let offsets: [(isize, isize, f64); 8] = [
            (-1, -1, sqrt2), (-1, 0, 1.0), (-1, 1, sqrt2),
            (0, -1, 1.0),                  (0, 1, 1.0),
            (1, -1, sqrt2),  (1, 0, 1.0),  (1, 1, sqrt2),
        ];
        let weights: Vec<f64> = offsets
            .iter()
            .map(|&(_, _, d)| if m == 0 { 1.0 } else { 1.0 / d.powi(m as i32) })
            .collect();

        let nodata = band.nodata();
        let data = band.data();

        let output_data: Vec<f64> = (0..rows)
            .into_par_iter()
            .flat_map(|row| {
                let mut row_data = vec![f64::NAN; cols];
                for col in 0..cols {
                    let z0 = data[(row, col)];
                    if z0.is_nodata(nodata) {
                        continue;
                    }

                    if row == 0 || row == rows - 1 || col == 0 || col == cols - 1 {
                        row_data[col] = z0;
                        continue;
                    }

                    // Center cell with weight 1
                    let mut sum = z0;
                    let mut wsum = 1.0;

                    for (i, &(dr, dc, _)) in offsets.iter().enumerate() {
                        let nr = (row as isize + dr) as usize;
                        let nc = (col as isize + dc) as usize;
                        let z = data[(nr, nc)];
                        if z.is_nodata(nodata) {
                            continue;
                        }
                        sum += z * weights[i];
                        wsum += weights[i];
                    }

                    row_data[col] = sum / wsum;
                }
                row_data
            })
            .collect();

        let mut output = band.with_same_meta::<f64>(rows, cols);
        output.set_nodata(Some(f64::NAN));
        *output.data_mut() = Array2::from_shape_vec((rows, cols), output_data)
            .map_err(|e| Error::Other(e.to_string()))?;

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use classigrid_core::GeoTransform;

    /// Variance of interior cells
    fn interior_variance(raster: &Raster<f64>) -> f64 {
        let (rows, cols) = raster.shape();
        let mut sum = 0.0;
        let mut sum_sq = 0.0;
        let mut count = 0.0;
        for row in 2..rows - 2 {
            for col in 2..cols - 2 {
                let v = raster.get(row, col).unwrap();
                if !v.is_nan() {
                    sum += v;
                    sum_sq += v * v;
                    count += 1.0;
                }
            }
        }
        if count < 2.0 {
            return 0.0;
        }
        let mean = sum / count;
        sum_sq / count - mean * mean
    }

    fn noisy_band() -> Raster<f64> {
        let mut band = Raster::new(20, 20);
        band.set_transform(GeoTransform::new(0.0, 20.0, 1.0, -1.0));
        for row in 0..20 {
            for col in 0..20 {
                let noise = ((row * 7 + col * 13) % 11) as f64 - 5.0;
                band.set(row, col, 100.0 + noise).unwrap();
            }
        }
        band
    }

    #[test]
    fn test_gaussian_preserves_flat() {
        let band = Raster::filled(20, 20, 0.5_f64);
        let result = GaussianSmoothing::default().smooth(&band).unwrap();
        let v = result.get(10, 10).unwrap();
        assert!((v - 0.5).abs() < 1e-12, "Flat should stay flat, got {}", v);
    }

    #[test]
    fn test_gaussian_reduces_noise() {
        let band = noisy_band();
        let result = GaussianSmoothing { radius: 3, sigma: 1.5 }.smooth(&band).unwrap();

        let orig_var = interior_variance(&band);
        let smooth_var = interior_variance(&result);
        assert!(
            smooth_var < orig_var,
            "Gaussian should reduce variance: orig={:.2}, smooth={:.2}",
            orig_var, smooth_var
        );
    }

    #[test]
    fn test_gaussian_zero_radius_rejected() {
        let band = Raster::filled(5, 5, 1.0_f64);
        assert!(GaussianSmoothing { radius: 0, sigma: 1.0 }.smooth(&band).is_err());
    }

    #[test]
    fn test_gaussian_keeps_nan() {
        let mut band = Raster::filled(10, 10, 1.0_f64);
        band.set(4, 4, f64::NAN).unwrap();

        let result = GaussianSmoothing::default().smooth(&band).unwrap();
        assert!(result.get(4, 4).unwrap().is_nan());
        assert!((result.get(7, 7).unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_gaussian_masks_nodata_sentinel() {
        let mut band = Raster::filled(10, 10, 1.0_f64);
        band.set_nodata(Some(-9999.0));
        band.set(4, 4, -9999.0).unwrap();

        let result = GaussianSmoothing::default().smooth(&band).unwrap();
        // Sentinel cell becomes NaN and does not drag down its neighbors
        assert!(result.get(4, 4).unwrap().is_nan());
        assert!((result.get(4, 5).unwrap() - 1.0).abs() < 1e-12);
        assert!(result.nodata().unwrap().is_nan());
    }

    #[test]
    fn test_mean_preserves_flat() {
        let band = Raster::filled(12, 12, 0.25_f64);
        let result = MeanSmoothing::default().smooth(&band).unwrap();
        let v = result.get(6, 6).unwrap();
        assert!((v - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_mean_reduces_noise() {
        let band = noisy_band();
        let result = MeanSmoothing::default().smooth(&band).unwrap();
        assert!(interior_variance(&result) < interior_variance(&band));
    }

    #[test]
    fn test_mean_keeps_border() {
        let mut band = Raster::filled(6, 6, 2.0_f64);
        band.set(0, 3, 9.0).unwrap();
        let result = MeanSmoothing::default().smooth(&band).unwrap();
        assert_eq!(result.get(0, 3).unwrap(), 9.0);
    }

    #[test]
    fn test_mean_masks_nodata_sentinel() {
        let mut band = Raster::filled(8, 8, 2.0_f64);
        band.set_nodata(Some(-9999.0));
        band.set(3, 3, -9999.0).unwrap();

        let result = MeanSmoothing::default().smooth(&band).unwrap();
        assert!(result.get(3, 3).unwrap().is_nan());
        assert!((result.get(3, 4).unwrap() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_closure_operator() {
        let identity = |band: &Raster<f64>| -> classigrid_core::Result<Raster<f64>> {
            Ok(band.clone())
        };
        let band = noisy_band();
        let result = identity.smooth(&band).unwrap();
        assert_eq!(result.get(3, 3).unwrap(), band.get(3, 3).unwrap());
    }

    #[test]
    fn test_smoothing_carries_metadata() {
        let band = noisy_band();
        let result = GaussianSmoothing::default().smooth(&band).unwrap();
        assert_eq!(result.transform(), band.transform());
        assert_eq!(result.shape(), band.shape());
    }
}
