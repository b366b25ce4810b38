//! Bayesian classification of vector-pixel raster images
//!
//! Pipeline: membership stack (+ optional priors) -> Bayes rule -> L1
//! normalization -> optional iterative smoothing -> maximum decision rule
//! -> label raster. The posterior stack is a first-class output alongside
//! the labels.

mod bayes;
mod decision;
mod initialization;

pub use bayes::{
    bayesian_classification, compute_bayes_rule, normalize_posteriors, smooth_posteriors,
    BayesParams, BayesianClassification,
};
pub use decision::{classify_posteriors, max_decision};
pub use initialization::{memberships_from_signatures, signatures_from_training, ClassSignature};
