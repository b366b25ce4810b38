//! # classigrid core
//!
//! Core types for the classigrid Bayesian raster classification library.
//!
//! This crate provides:
//! - `Raster<T>`: generic single-band raster grid
//! - `ClassStack`: vector-pixel image (one band per class, shared geometry)
//! - `GeoTransform`: affine transformation for georeferencing
//! - `CRS`: coordinate reference system handling
//! - `Error`/`Result`: shared error taxonomy

pub mod crs;
pub mod error;
pub mod raster;

pub use crs::CRS;
pub use error::{Error, Result};
pub use raster::{ClassStack, GeoTransform, Raster, RasterElement};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::crs::CRS;
    pub use crate::error::{Error, Result};
    pub use crate::raster::{ClassStack, GeoTransform, Raster, RasterElement};
}
