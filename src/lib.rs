// Modules
pub mod config;
pub mod constants;
pub mod data;
pub mod debias;
pub mod errors;
pub mod linalg;
pub mod prediction;
pub mod predictor;
pub mod sampler;
pub mod utils;

// Individual classes, and functions
pub use config::ConfigIO;
pub use data::{Data, Matrix, Observations};
pub use errors::ForestError;
pub use prediction::{Prediction, PredictionContext, PredictionStrategy};
pub use predictor::ForestPredictor;
pub use sampler::{RandomSampler, SamplingOptions};
