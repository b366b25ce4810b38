//! # classigrid algorithms
//!
//! Pixel-wise Bayesian classification of raster grids.
//!
//! The central entry point is [`classification::bayesian_classification`]:
//! given a membership [`ClassStack`](classigrid_core::ClassStack) (one
//! likelihood band per class) and optional per-pixel priors, it computes
//! normalized posterior probabilities, optionally regularizes them with a
//! pluggable [`smoothing::SmoothingOperator`], and assigns each pixel the
//! class with the maximum posterior.
//!
//! Supporting pieces:
//! - **classification**: Bayes rule, posterior normalization, max decision
//!   rule, and membership generation from class signatures
//! - **smoothing**: the smoothing capability trait plus Gaussian and
//!   weighted-mean operators

mod maybe_rayon;

pub mod classification;
pub mod smoothing;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::classification::{
        bayesian_classification, classify_posteriors, max_decision,
        memberships_from_signatures, signatures_from_training, BayesParams,
        BayesianClassification, ClassSignature,
    };
    pub use crate::smoothing::{GaussianSmoothing, MeanSmoothing, SmoothingOperator};
    pub use classigrid_core::prelude::*;
}
