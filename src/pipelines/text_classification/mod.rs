/// The trained model and its artifact format
pub mod model;

/// Training
pub mod training;

/// Prediction engines and pooling
pub mod engine;

/// Inference
pub mod inference;

pub use engine::{EngineProvider, PredictionEngine, PredictionEnginePool, SingleUseEngines};
pub use inference::{OutputSchema, Prediction, PredictionList, Predictor};
pub use model::TrainedModel;
pub use training::Trainer;
