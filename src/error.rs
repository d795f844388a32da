use burn::record::RecorderError;

/// Errors raised while training, persisting or serving a classifier
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A file or stream could not be read or written
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// A CSV row could not be parsed into a record
    #[error("unable to read training data: {0}")]
    Csv(#[from] csv::Error),

    /// A JSON document (settings or model manifest) could not be (de)serialized
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),

    /// Neural network weights could not be recorded or restored
    #[error("unable to record model weights: {0}")]
    Recorder(#[from] RecorderError),

    /// The bytes handed to the model loader are not a valid model artifact
    #[error("corrupt model artifact: {0}")]
    CorruptModel(String),

    /// A column named by the column information does not exist on the record type
    #[error("unknown column '{column}', expected one of {available:?}")]
    UnknownColumn {
        /// The requested column
        column: String,
        /// The columns the record type declares
        available: Vec<String>,
    },

    /// The column information does not name any text column to featurize
    #[error("no text columns were declared for training")]
    MissingTextColumns,

    /// None of the training rows carried both a label and some text
    #[error("no usable training rows: every row is missing its label or its text")]
    EmptyTrainingData,

    /// The experiment finished without a single successful trial
    #[error("the experiment produced no valid run ({0})")]
    NoValidRun(String),

    /// A model was saved before the trainer ever saw training data
    #[error("training schema unavailable: call auto_train before saving a model")]
    SchemaUnavailable,

    /// Predict was called with no model loaded and no engine pool attached
    #[error("predict called with no model loaded")]
    NoModelLoaded,

    /// The model expects a column the input record type does not provide
    #[error("model expects column '{0}' which the input type does not provide")]
    SchemaMismatch(String),

    /// The model's category list and score vector disagree in length
    #[error("model reports {categories} categories but produced {scores} scores")]
    ScoreCategoryMismatch {
        /// Number of category labels in the output schema
        categories: usize,
        /// Number of score slots produced by the engine
        scores: usize,
    },

    /// A prediction engine pool lock was poisoned by a panicking thread
    #[error("prediction engine pool is poisoned")]
    PoolPoisoned,

    /// Experiment settings failed validation
    #[error("invalid experiment settings: {0}")]
    InvalidSettings(String),
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;
