//! Errors
//!
//! Custom error types used throughout the `honest-forest` crate.
use thiserror::Error;

/// Errors raised by the samplers and prediction strategies.
#[derive(Debug, Error)]
pub enum ForestError {
    /// Bad sampling parameters, empty or invalid weight vectors, out of range ids.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    /// The penalised normal equations could not be solved.
    #[error("Singular system: {0}")]
    SingularSystem(String),
    /// Not enough usable trees or groups to form an estimate.
    #[error("Insufficient data: {0}")]
    InsufficientData(String),
    /// First value is the name of the parameter, second is expected, third is what was passed.
    #[error("Invalid parameter value passed for {0}, expected {1} but {2} provided.")]
    InvalidParameter(String, String, String),
    /// Invalid value parsing.
    #[error("Invalid value {0} passed for {1}, expected one of {2}.")]
    ParseString(String, String, String),
    /// Unable to write a configuration.
    #[error("Unable to write configuration: {0}")]
    UnableToWrite(String),
    /// Unable to read a configuration.
    #[error("Unable to read configuration: {0}")]
    UnableToRead(String),
    /// The prediction thread pool could not be built.
    #[error("Unable to build thread pool: {0}")]
    ThreadPool(String),
}
