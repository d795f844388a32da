use std::{collections::HashMap, hash::Hash};

use crate::data::LabeledText;

/// Invert a map by swapping keys and values
pub fn invert_map<K, V, MK, MV>(original: MK) -> MV
where
    K: Hash + Eq,
    V: Hash + Eq,
    MK: IntoIterator<Item = (K, V)>,
    MV: FromIterator<(V, K)>,
{
    original
        .into_iter()
        .map(|(key, value)| (value, key))
        .collect()
}

/// The ordered category list, numbered in first-seen order
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LabelMap {
    labels: Vec<String>,
    label2id: HashMap<String, usize>,
}

impl LabelMap {
    /// Number the distinct labels of the given rows in the order they first appear
    pub fn from_rows(rows: &[LabeledText]) -> Self {
        let mut labels: Vec<String> = Vec::new();
        for row in rows {
            if !labels.contains(&row.label) {
                labels.push(row.label.clone());
            }
        }

        let label2id = invert_map(labels.iter().cloned().enumerate());

        Self { labels, label2id }
    }

    /// The class id of a label
    pub fn id(&self, label: &str) -> Option<usize> {
        self.label2id.get(label).copied()
    }

    /// The labels, indexed by class id
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Number of classes
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Whether no label was seen
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Consume the map, keeping the ordered labels
    pub fn into_labels(self) -> Vec<String> {
        self.labels
    }
}
