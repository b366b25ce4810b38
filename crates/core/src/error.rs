//! Error types for classigrid

use thiserror::Error;

/// Main error type for classigrid operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Missing required input: {0}")]
    MissingInput(&'static str),

    #[error("Invalid raster dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("Index out of bounds: ({row}, {col}) in raster of size ({rows}, {cols})")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("Raster size mismatch: expected ({er}, {ec}), got ({ar}, {ac})")]
    SizeMismatch { er: usize, ec: usize, ar: usize, ac: usize },

    #[error("Class count mismatch: expected {expected} classes, got {actual}")]
    ClassCountMismatch { expected: usize, actual: usize },

    #[error("Grid geometry mismatch between {0} and {1}")]
    GeometryMismatch(&'static str, &'static str),

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("Algorithm error: {0}")]
    Algorithm(String),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for classigrid operations
pub type Result<T> = std::result::Result<T, Error>;
