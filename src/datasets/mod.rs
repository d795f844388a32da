use std::{fmt::Display, path::PathBuf};

/// Bank transactions labeled with spending categories
pub mod transactions;

/// Git commit messages labeled with gitmojis
pub mod gitmo;

/// The Dataset enum
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Dataset {
    /// Bank transactions
    Transactions,

    /// Commit messages
    Gitmo,
}

impl Dataset {
    /// Every known dataset
    pub const ALL: [Dataset; 2] = [Dataset::Transactions, Dataset::Gitmo];

    /// Path of the training data inside a data directory
    pub fn data_path(&self, data_dir: &str) -> PathBuf {
        let file = match self {
            Dataset::Transactions => transactions::DATA_FILE,
            Dataset::Gitmo => gitmo::DATA_FILE,
        };

        PathBuf::from(data_dir).join(file)
    }

    /// Path of the model file inside a model directory
    pub fn model_path(&self, model_dir: &str) -> PathBuf {
        let file = match self {
            Dataset::Transactions => transactions::MODEL_FILE,
            Dataset::Gitmo => gitmo::MODEL_FILE,
        };

        PathBuf::from(model_dir).join(file)
    }

    /// Default training budget
    pub fn training_time_secs(&self) -> u64 {
        match self {
            Dataset::Transactions => transactions::TRAINING_TIME_SECS,
            Dataset::Gitmo => gitmo::TRAINING_TIME_SECS,
        }
    }
}

impl TryFrom<&str> for Dataset {
    type Error = DatasetError;

    /// Try to convert a string to a Dataset
    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let value = value.to_lowercase();

        Dataset::ALL
            .into_iter()
            .find(|dataset| dataset.to_string() == value)
            .ok_or(Self::Error::Unknown(value))
    }
}

impl Display for Dataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Dataset::Transactions => transactions::DATASET,
            Dataset::Gitmo => gitmo::DATASET,
        };

        write!(f, "{}", name)
    }
}

/// Dataset Error
#[derive(thiserror::Error, Debug)]
pub enum DatasetError {
    /// No dataset found for the given string
    #[error("no dataset found for {0}")]
    Unknown(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_parse_case_insensitively() {
        assert_eq!(Dataset::try_from("Gitmo").unwrap(), Dataset::Gitmo);
        assert_eq!(
            Dataset::try_from("transactions").unwrap(),
            Dataset::Transactions
        );
        assert!(Dataset::try_from("mnist").is_err());
    }

    #[test]
    fn paths_are_joined_onto_directories() {
        assert_eq!(
            Dataset::Transactions.data_path("data"),
            PathBuf::from("data/transactions.csv")
        );
        assert_eq!(
            Dataset::Gitmo.model_path("."),
            PathBuf::from("./gitmo.model")
        );
    }
}
