use std::fmt::Display;

use derive_new::new;
use serde::{Deserialize, Serialize};

use crate::{
    data::{ColumnInformation, Record},
    models::MulticlassTrainer,
    pipelines::text_classification::Trainer,
};

/// The name of the commit message dataset
pub static DATASET: &str = "gitmo";

/// Training data file, relative to the data directory
pub static DATA_FILE: &str = "CommitMessages.csv";

/// Default model file name
pub static MODEL_FILE: &str = "gitmo.model";

/// Default training budget
pub const TRAINING_TIME_SECS: u64 = 120;

/// A git commit message, labeled with its gitmoji
///
/// The raw data has no header, so the columns keep their positional names.
#[derive(Clone, Debug, Serialize, Deserialize, new)]
pub struct GitComment {
    /// The gitmoji (`col0`)
    pub emoji: Option<String>,

    /// The commit message (`col1`)
    pub commit_message: Option<String>,
}

impl GitComment {
    /// An unlabeled commit message, ready for prediction
    pub fn message(commit_message: impl Into<String>) -> Self {
        Self::new(None, Some(commit_message.into()))
    }
}

impl Record for GitComment {
    const COLUMNS: &'static [&'static str] = &["col0", "col1"];

    fn column(&self, name: &str) -> Option<&str> {
        match name {
            "col0" => self.emoji.as_deref(),
            "col1" => self.commit_message.as_deref(),
            _ => None,
        }
    }
}

impl Display for GitComment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.commit_message.as_deref().unwrap_or_default())
    }
}

/// Predict `col0` (the emoji) from `col1` (the message)
pub fn columns() -> ColumnInformation {
    ColumnInformation::new("col0").with_text_column("col1")
}

/// A trainer for the gitmoji task
///
/// Leaves out the averaged perceptron.
pub fn trainer() -> Trainer<GitComment> {
    Trainer::new(columns()).excluding(MulticlassTrainer::AveragedPerceptronOva)
}
