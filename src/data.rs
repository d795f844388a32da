use std::{fmt::Debug, path::Path};

use burn::data::dataset::{Dataset, InMemDataset};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::{Error, Result};

pub use crate::utils::classes::LabelMap;

/// A trait for rows that can be used for text classification
///
/// Records are read from headerless CSV files, so the fields of an implementing type are
/// deserialized positionally in declaration order. `COLUMNS` names those positions.
pub trait Record: DeserializeOwned + Send + Sync + Clone + Debug + 'static {
    /// The column names, in load order
    const COLUMNS: &'static [&'static str];

    /// Returns the value of the named column, or `None` when it is unknown or missing
    fn column(&self, name: &str) -> Option<&str>;
}

/// Designates which column holds the label and which columns hold free text
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInformation {
    /// The column to predict
    pub label_column_name: String,

    /// Columns that are featurized as free text
    pub text_column_names: Vec<String>,
}

impl ColumnInformation {
    /// Column information with a label column and no text columns yet
    pub fn new(label_column_name: impl Into<String>) -> Self {
        Self {
            label_column_name: label_column_name.into(),
            text_column_names: Vec::new(),
        }
    }

    /// Add a free-text feature column
    pub fn with_text_column(mut self, name: impl Into<String>) -> Self {
        self.text_column_names.push(name.into());
        self
    }

    /// Check every named column against the columns a record type declares
    pub fn validate<T: Record>(&self) -> Result<()> {
        if self.text_column_names.is_empty() {
            return Err(Error::MissingTextColumns);
        }

        std::iter::once(&self.label_column_name)
            .chain(self.text_column_names.iter())
            .try_for_each(|column| require_column::<T>(column))
    }
}

/// Fail unless `T` declares a column called `column`
pub(crate) fn require_column<T: Record>(column: &str) -> Result<()> {
    if T::COLUMNS.contains(&column) {
        Ok(())
    } else {
        Err(Error::UnknownColumn {
            column: column.to_string(),
            available: T::COLUMNS.iter().map(|c| c.to_string()).collect(),
        })
    }
}

/// The ordered column list of the data a model was fit on
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSchema {
    /// Column names in load order
    pub columns: Vec<String>,
}

impl DataSchema {
    /// The schema of a record type
    pub fn of<T: Record>() -> Self {
        Self {
            columns: T::COLUMNS.iter().map(|c| c.to_string()).collect(),
        }
    }

    /// Check whether the schema contains a column
    pub fn contains(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }
}

/// A labeled training row, reduced to the pieces the experiment needs
#[derive(Clone, Debug, PartialEq)]
pub struct LabeledText {
    /// The trimmed label value
    pub label: String,

    /// The text column values, in column information order (missing values are empty)
    pub texts: Vec<String>,
}

impl LabeledText {
    /// Extract the label and text columns from a record, if the row is usable for training
    pub fn from_record<T: Record>(record: &T, columns: &ColumnInformation) -> Option<Self> {
        let label = record
            .column(&columns.label_column_name)
            .map(str::trim)
            .filter(|label| !label.is_empty())?;

        let texts: Vec<String> = columns
            .text_column_names
            .iter()
            .map(|name| record.column(name).unwrap_or_default().to_string())
            .collect();

        if texts.iter().all(|text| text.trim().is_empty()) {
            return None;
        }

        Some(Self {
            label: label.to_string(),
            texts,
        })
    }
}

/// An in-memory set of records loaded for training or evaluation
pub struct TrainingData<T: Record> {
    /// Underlying In-Memory dataset
    dataset: InMemDataset<T>,
}

impl<T: Record> Dataset<T> for TrainingData<T> {
    fn get(&self, index: usize) -> Option<T> {
        self.dataset.get(index)
    }

    fn len(&self) -> usize {
        self.dataset.len()
    }
}

impl<T: Record> TrainingData<T> {
    /// Load a comma separated file without a header row, addressing columns by position
    pub fn from_csv(path: impl AsRef<Path>) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .delimiter(b',')
            .flexible(true)
            .from_path(path)
            .map_err(into_io_error)?;

        let records = reader
            .deserialize()
            .collect::<std::result::Result<Vec<T>, csv::Error>>()?;

        log::debug!("Loaded {} rows", records.len());

        Ok(Self::from_records(records))
    }

    /// Wrap already materialized records
    pub fn from_records(records: Vec<T>) -> Self {
        Self {
            dataset: InMemDataset::new(records),
        }
    }

    /// The schema of the loaded records
    pub fn schema(&self) -> DataSchema {
        DataSchema::of::<T>()
    }

    /// Iterate over the records
    pub fn records(&self) -> impl Iterator<Item = T> + '_ {
        self.dataset.iter()
    }

    /// Reduce every usable row to its label and text, skipping rows that lack either
    pub fn labeled_texts(&self, columns: &ColumnInformation) -> Vec<LabeledText> {
        let mut skipped = 0;

        let rows = self
            .records()
            .filter_map(|record| {
                let row = LabeledText::from_record(&record, columns);
                if row.is_none() {
                    skipped += 1;
                }
                row
            })
            .collect();

        if skipped > 0 {
            log::warn!("Skipped {skipped} rows with a missing label or empty text");
        }

        rows
    }
}

/// Missing files surface as plain i/o errors rather than CSV errors
fn into_io_error(err: csv::Error) -> Error {
    if err.is_io_error() {
        Error::Io(err.into())
    } else {
        Error::Csv(err)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use pretty_assertions::assert_eq;
    use serde::Deserialize;

    use super::*;

    #[derive(Clone, Debug, Deserialize)]
    pub(crate) struct Row {
        pub label: Option<String>,
        pub text: Option<String>,
    }

    impl Record for Row {
        const COLUMNS: &'static [&'static str] = &["label", "text"];

        fn column(&self, name: &str) -> Option<&str> {
            match name {
                "label" => self.label.as_deref(),
                "text" => self.text.as_deref(),
                _ => None,
            }
        }
    }

    pub(crate) fn row(label: &str, text: &str) -> Row {
        Row {
            label: Some(label.to_string()),
            text: Some(text.to_string()),
        }
    }

    pub(crate) fn columns() -> ColumnInformation {
        ColumnInformation::new("label").with_text_column("text")
    }

    #[test]
    fn validate_rejects_unknown_columns() {
        let info = ColumnInformation::new("label").with_text_column("body");

        match info.validate::<Row>() {
            Err(Error::UnknownColumn { column, .. }) => assert_eq!(column, "body"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn validate_requires_a_text_column() {
        let info = ColumnInformation::new("label");

        assert!(matches!(
            info.validate::<Row>(),
            Err(Error::MissingTextColumns)
        ));
    }

    #[test]
    fn rows_without_label_or_text_are_skipped() {
        let data = TrainingData::from_records(vec![
            row(" Games ", "Runolfsson"),
            Row {
                label: None,
                text: Some("orphan".to_string()),
            },
            row("Music", "   "),
        ]);

        let rows = data.labeled_texts(&columns());

        assert_eq!(
            rows,
            vec![LabeledText {
                label: "Games".to_string(),
                texts: vec!["Runolfsson".to_string()],
            }]
        );
    }

    #[test]
    fn labels_are_numbered_in_first_seen_order() {
        let data = TrainingData::from_records(vec![
            row("Music", "spotify"),
            row("Games", "steam"),
            row("Music", "itunes"),
            row("Coffee", "starbucks"),
        ]);

        let labels = LabelMap::from_rows(&data.labeled_texts(&columns()));

        assert_eq!(labels.labels(), ["Music", "Games", "Coffee"]);
        assert_eq!(labels.id("Coffee"), Some(2));
        assert_eq!(labels.id("Rent"), None);
    }

    #[test]
    fn csv_rows_are_read_positionally_without_headers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rows.csv");
        std::fs::write(&path, "Games,Runolfsson\nMusic,\"PAYPAL *Gerlach 123456789\"\n").unwrap();

        let data = TrainingData::<Row>::from_csv(&path).unwrap();

        assert_eq!(data.len(), 2);
        assert_eq!(
            data.get(1).unwrap().text.as_deref(),
            Some("PAYPAL *Gerlach 123456789")
        );
    }

    #[test]
    fn missing_csv_is_an_io_error() {
        let result = TrainingData::<Row>::from_csv("does/not/exist.csv");

        assert!(matches!(result, Err(Error::Io(_))));
    }
}
