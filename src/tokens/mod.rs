//! Token estimation for budget enforcement

pub mod estimator;

pub use estimator::{
    build_estimator, CharRatioEstimator, TiktokenEstimator, TokenEstimator,
};
