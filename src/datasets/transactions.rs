use std::fmt::Display;

use derive_new::new;
use serde::{Deserialize, Serialize};

use crate::{
    data::{ColumnInformation, Record},
    pipelines::text_classification::Trainer,
};

/// The name of the bank transactions dataset
pub static DATASET: &str = "transactions";

/// Training data file, relative to the data directory
pub static DATA_FILE: &str = "transactions.csv";

/// Default model file name
pub static MODEL_FILE: &str = "bank.model";

/// Default training budget
pub const TRAINING_TIME_SECS: u64 = 60;

/// A bank transaction, labeled with its spending category
#[derive(Clone, Debug, Serialize, Deserialize, new)]
pub struct TransactionData {
    /// The merchant or payee as it appears on the statement
    pub transaction_name: String,

    /// The spending category
    pub category: Option<String>,
}

impl TransactionData {
    /// An unlabeled transaction, ready for prediction
    pub fn named(transaction_name: impl Into<String>) -> Self {
        Self::new(transaction_name.into(), None)
    }
}

impl Record for TransactionData {
    const COLUMNS: &'static [&'static str] = &["Transaction Name", "Category"];

    fn column(&self, name: &str) -> Option<&str> {
        match name {
            "Transaction Name" => Some(&self.transaction_name),
            "Category" => self.category.as_deref(),
            _ => None,
        }
    }
}

impl Display for TransactionData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.transaction_name)
    }
}

/// Predict `Category` from `Transaction Name`
pub fn columns() -> ColumnInformation {
    ColumnInformation::new("Category").with_text_column("Transaction Name")
}

/// A trainer for the transactions task
pub fn trainer() -> Trainer<TransactionData> {
    Trainer::new(columns())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn columns_match_the_record() {
        assert!(columns().validate::<TransactionData>().is_ok());
    }

    #[test]
    fn unlabeled_transactions_have_no_category() {
        let transaction = TransactionData::named("Runolfsson");

        assert_eq!(transaction.column("Transaction Name"), Some("Runolfsson"));
        assert_eq!(transaction.column("Category"), None);
        assert_eq!(transaction.to_string(), "Runolfsson");
    }
}
