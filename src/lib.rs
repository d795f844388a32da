//! # Generic Classifier
//!
//! One trainer and one predictor for multi-class text classification, parametrised only by
//! the record type and which of its columns hold the label and the text.
#![forbid(unsafe_code)]

/// Records, column mappings and training data
pub mod data;

/// Hashed n-gram text features
pub mod featurize;

/// Estimators
pub mod models;

/// Model search
pub mod automl;

/// Pipelines
pub mod pipelines;

/// Datasets
pub mod datasets;

/// Utilities
pub mod utils;

/// Errors
pub mod error;

pub use data::{ColumnInformation, DataSchema, Record, TrainingData};
pub use error::{Error, Result};
pub use pipelines::text_classification::{
    Prediction, PredictionEnginePool, PredictionList, Predictor, TrainedModel, Trainer,
};
