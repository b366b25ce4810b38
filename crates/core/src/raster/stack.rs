//! Vector-pixel image: one band per class over a shared geometry

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Raster};
use ndarray::Array2;

/// A raster whose pixels are fixed-length class vectors.
///
/// `ClassStack` stores one `f64` band per class, all sharing the same
/// dimensions, transform and CRS. The vector at pixel (row, col) is the
/// sequence of band values at that position. Membership, prior and
/// posterior images are all `ClassStack`s with the same class count.
///
/// Band-per-class storage keeps per-component extraction cheap: a single
/// class band can be lifted out as a [`Raster<f64>`] (for example to feed a
/// smoothing operator) and written back without touching the other classes.
#[derive(Debug, Clone)]
pub struct ClassStack {
    bands: Vec<Array2<f64>>,
    transform: GeoTransform,
    crs: Option<CRS>,
}

impl ClassStack {
    /// Create a zero-filled stack with `n_classes` bands of `rows` x `cols`
    pub fn new(n_classes: usize, rows: usize, cols: usize) -> Result<Self> {
        if n_classes == 0 {
            return Err(Error::InvalidParameter {
                name: "n_classes",
                value: "0".into(),
                reason: "a class stack needs at least one class".into(),
            });
        }
        Ok(Self {
            bands: (0..n_classes).map(|_| Array2::zeros((rows, cols))).collect(),
            transform: GeoTransform::default(),
            crs: None,
        })
    }

    /// Build a stack from per-class rasters.
    ///
    /// All rasters must share geometry; the first raster's transform and CRS
    /// become the stack's.
    pub fn from_bands(bands: Vec<Raster<f64>>) -> Result<Self> {
        let first = bands.first().ok_or(Error::MissingInput("class bands"))?;

        for band in bands.iter().skip(1) {
            if band.shape() != first.shape() {
                return Err(Error::SizeMismatch {
                    er: first.rows(),
                    ec: first.cols(),
                    ar: band.rows(),
                    ac: band.cols(),
                });
            }
            if !band.geometry_matches(first) {
                return Err(Error::GeometryMismatch("class band", "class band"));
            }
        }

        let transform = *first.transform();
        let crs = first.crs().cloned();
        Ok(Self {
            bands: bands.into_iter().map(Raster::into_array).collect(),
            transform,
            crs,
        })
    }

    /// Create a zero-filled stack with the same class count and geometry as `other`
    pub fn zeros_like(other: &ClassStack) -> Self {
        Self {
            bands: other
                .bands
                .iter()
                .map(|b| Array2::zeros(b.dim()))
                .collect(),
            transform: other.transform,
            crs: other.crs.clone(),
        }
    }

    // Dimensions

    /// Number of classes (bands)
    pub fn n_classes(&self) -> usize {
        self.bands.len()
    }

    /// Number of rows
    pub fn rows(&self) -> usize {
        self.bands[0].nrows()
    }

    /// Number of columns
    pub fn cols(&self) -> usize {
        self.bands[0].ncols()
    }

    /// Dimensions as (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        self.bands[0].dim()
    }

    /// Whether the stack has zero pixels
    pub fn is_empty(&self) -> bool {
        self.bands[0].is_empty()
    }

    // Band access

    /// All class bands in order
    pub fn bands(&self) -> &[Array2<f64>] {
        &self.bands
    }

    /// All class bands in order, mutable
    pub fn bands_mut(&mut self) -> &mut [Array2<f64>] {
        &mut self.bands
    }

    /// Borrow a single class band
    pub fn band(&self, class: usize) -> Result<&Array2<f64>> {
        self.bands.get(class).ok_or(Error::IndexOutOfBounds {
            row: 0,
            col: class,
            rows: 1,
            cols: self.n_classes(),
        })
    }

    /// Copy a class band out as a standalone raster carrying the stack's geometry
    pub fn extract_band(&self, class: usize) -> Result<Raster<f64>> {
        let band = self.band(class)?.clone();
        let mut raster = Raster::from_array(band);
        raster.set_transform(self.transform);
        raster.set_crs(self.crs.clone());
        Ok(raster)
    }

    /// Replace a class band with the data of `raster`.
    ///
    /// The raster must have the stack's shape.
    pub fn set_band(&mut self, class: usize, raster: Raster<f64>) -> Result<()> {
        let (rows, cols) = self.shape();
        if raster.shape() != (rows, cols) {
            return Err(Error::SizeMismatch {
                er: rows,
                ec: cols,
                ar: raster.rows(),
                ac: raster.cols(),
            });
        }
        let n = self.n_classes();
        let slot = self.bands.get_mut(class).ok_or(Error::IndexOutOfBounds {
            row: 0,
            col: class,
            rows: 1,
            cols: n,
        })?;
        *slot = raster.into_array();
        Ok(())
    }

    // Pixel access

    /// The class vector at (row, col)
    pub fn vector_at(&self, row: usize, col: usize) -> Result<Vec<f64>> {
        let (rows, cols) = self.shape();
        if row >= rows || col >= cols {
            return Err(Error::IndexOutOfBounds { row, col, rows, cols });
        }
        Ok(self.bands.iter().map(|b| b[(row, col)]).collect())
    }

    /// Overwrite the class vector at (row, col).
    ///
    /// `values` must have exactly `n_classes` entries.
    pub fn set_vector(&mut self, row: usize, col: usize, values: &[f64]) -> Result<()> {
        if values.len() != self.n_classes() {
            return Err(Error::ClassCountMismatch {
                expected: self.n_classes(),
                actual: values.len(),
            });
        }
        let (rows, cols) = self.shape();
        if row >= rows || col >= cols {
            return Err(Error::IndexOutOfBounds { row, col, rows, cols });
        }
        for (band, &v) in self.bands.iter_mut().zip(values) {
            band[(row, col)] = v;
        }
        Ok(())
    }

    // Metadata

    /// Get the geotransform
    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    /// Set the geotransform
    pub fn set_transform(&mut self, transform: GeoTransform) {
        self.transform = transform;
    }

    /// Get the CRS
    pub fn crs(&self) -> Option<&CRS> {
        self.crs.as_ref()
    }

    /// Set the CRS
    pub fn set_crs(&mut self, crs: Option<CRS>) {
        self.crs = crs;
    }

    /// Whether this stack's geometry (shape, transform, CRS) matches another's.
    ///
    /// Class counts are compared separately by callers that need them.
    pub fn geometry_matches(&self, other: &ClassStack) -> bool {
        if self.shape() != other.shape() || self.transform != other.transform {
            return false;
        }
        match (&self.crs, &other.crs) {
            (Some(a), Some(b)) => a.is_equivalent(b),
            (None, None) => true,
            _ => false,
        }
    }
}
