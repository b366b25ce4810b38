//! Maximum decision rule
//!
//! Maps a class-probability vector to the index of its largest component,
//! and applies that rule over a posterior stack to produce the label image.

use ndarray::Array2;

use crate::maybe_rayon::*;
use classigrid_core::raster::Raster;
use classigrid_core::{ClassStack, Error, Result};

/// Index of the maximum component of `probabilities`.
///
/// Ties resolve to the lowest index, so a degenerate all-zero vector maps
/// deterministically to class 0. An empty slice also yields 0.
pub fn max_decision(probabilities: &[f64]) -> usize {
    let mut best_class = 0;
    let mut best = f64::NEG_INFINITY;
    for (class, &p) in probabilities.iter().enumerate() {
        if p > best {
            best = p;
            best_class = class;
        }
    }
    best_class
}

/// Apply the maximum decision rule to every pixel of a posterior stack.
///
/// Returns a `u8` label raster carrying the stack's geometry, with values
/// in `[0, n_classes)`. The caller guarantees `n_classes <= 256`; the
/// classifier validates this before any per-pixel work.
pub fn classify_posteriors(posteriors: &ClassStack) -> Result<Raster<u8>> {
    let (rows, cols) = posteriors.shape();
    let bands = posteriors.bands();
    let n_classes = bands.len();

    let data: Vec<u8> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![0_u8; cols];
            let mut probs = vec![0.0_f64; n_classes];
            for (col, out) in row_data.iter_mut().enumerate() {
                for (class, band) in bands.iter().enumerate() {
                    probs[class] = band[(row, col)];
                }
                *out = max_decision(&probs) as u8;
            }
            row_data
        })
        .collect();

    let array = Array2::from_shape_vec((rows, cols), data)
        .map_err(|e| Error::Other(e.to_string()))?;
    let mut labels = Raster::from_array(array);
    labels.set_transform(*posteriors.transform());
    labels.set_crs(posteriors.crs().cloned());
    Ok(labels)
}
