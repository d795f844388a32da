use std::{collections::BTreeMap, ops::RangeInclusive};

use burn::config::Config;

/// Supported values of [TextFeaturizer::hash_bits]
pub const HASH_BITS: RangeInclusive<u32> = 1..=24;

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Turns free-text columns into hashed, L2-normalized n-gram count vectors
///
/// The featurizer is stateless: the same configuration always maps the same text to the same
/// vector, so it is stored alongside a trained model instead of being fit.
#[derive(Config, Debug, PartialEq)]
pub struct TextFeaturizer {
    /// Number of hash bits; the vector has `2^hash_bits` slots
    #[config(default = 12)]
    pub hash_bits: u32,

    /// Longest word n-gram to emit
    #[config(default = 2)]
    pub word_ngrams: usize,

    /// Length of the character n-grams to emit (0 disables them)
    #[config(default = 3)]
    pub char_ngrams: usize,

    /// Lowercase text before tokenizing
    #[config(default = true)]
    pub lowercase: bool,
}

/// A sparse feature vector with sorted, unique indices
#[derive(Clone, Debug, PartialEq)]
pub struct SparseFeatures {
    /// Total number of slots
    pub dim: usize,

    /// Indices of the non-zero slots, ascending
    pub indices: Vec<usize>,

    /// Values of the non-zero slots
    pub values: Vec<f32>,
}

impl SparseFeatures {
    /// Expand into a dense vector of `dim` slots
    pub fn to_dense(&self) -> Vec<f32> {
        let mut dense = vec![0.0; self.dim];
        for (&index, &value) in self.indices.iter().zip(&self.values) {
            dense[index] = value;
        }

        dense
    }

    /// Iterate over `(index, value)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (usize, f32)> + '_ {
        self.indices.iter().copied().zip(self.values.iter().copied())
    }

    /// Dot product against a dense weight row
    pub fn dot(&self, weights: &[f32]) -> f32 {
        self.iter().map(|(index, value)| weights[index] * value).sum()
    }
}

impl TextFeaturizer {
    /// The number of slots in every produced vector
    pub fn dim(&self) -> usize {
        1 << self.hash_bits
    }

    /// Featurize the text columns of one row, given in column information order
    pub fn featurize<S: AsRef<str>>(&self, texts: &[S]) -> SparseFeatures {
        let mask = (self.dim() - 1) as u64;
        let mut counts: BTreeMap<usize, f32> = BTreeMap::new();

        for (column, text) in texts.iter().enumerate() {
            for term in self.terms(text.as_ref()) {
                let slot = (fnv1a(column as u64, &term) & mask) as usize;
                *counts.entry(slot).or_insert(0.0) += 1.0;
            }
        }

        let norm = counts.values().map(|v| v * v).sum::<f32>().sqrt();
        let scale = if norm > 0.0 { 1.0 / norm } else { 0.0 };

        let (indices, values) = counts.into_iter().map(|(i, v)| (i, v * scale)).unzip();

        SparseFeatures {
            dim: self.dim(),
            indices,
            values,
        }
    }

    /// Word and character n-grams of a single column value
    fn terms(&self, text: &str) -> Vec<String> {
        let text = if self.lowercase {
            text.to_lowercase()
        } else {
            text.to_string()
        };

        let words: Vec<&str> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();

        let mut terms = Vec::new();

        for n in 1..=self.word_ngrams {
            for gram in words.windows(n) {
                terms.push(format!("w{n}:{}", gram.join(" ")));
            }
        }

        if self.char_ngrams > 0 && !words.is_empty() {
            let padded: Vec<char> = format!(" {} ", words.join(" ")).chars().collect();
            for gram in padded.windows(self.char_ngrams) {
                terms.push(format!("c:{}", gram.iter().collect::<String>()));
            }
        }

        terms
    }
}

/// 64-bit FNV-1a over a column index and a term, stable across platforms and builds
fn fnv1a(column: u64, term: &str) -> u64 {
    column
        .to_le_bytes()
        .iter()
        .chain(term.as_bytes())
        .fold(FNV_OFFSET_BASIS, |hash, byte| {
            (hash ^ u64::from(*byte)).wrapping_mul(FNV_PRIME)
        })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn featurizing_is_deterministic() {
        let featurizer = TextFeaturizer::new();

        let a = featurizer.featurize(&["PAYPAL *Gerlach 123456789"]);
        let b = featurizer.featurize(&["PAYPAL *Gerlach 123456789"]);

        assert_eq!(a, b);
        assert_eq!(a.dim, 4096);
    }

    #[test]
    fn vectors_are_unit_length() {
        let features = TextFeaturizer::new().featurize(&["Updated button UI"]);
        let norm: f32 = features.values.iter().map(|v| v * v).sum::<f32>().sqrt();

        assert!((norm - 1.0).abs() < 1e-5);
        assert!(features.indices.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn empty_text_is_all_zero() {
        let features = TextFeaturizer::new().featurize(&["  ", ""]);

        assert!(features.indices.is_empty());
        assert!(features.to_dense().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn lowercasing_folds_case() {
        let featurizer = TextFeaturizer::new();

        assert_eq!(
            featurizer.featurize(&["Initial Commit"]),
            featurizer.featurize(&["initial commit"])
        );
    }

    #[test]
    fn columns_hash_into_separate_features() {
        let featurizer = TextFeaturizer::new().with_char_ngrams(0);

        let first = featurizer.featurize(&["coffee", ""]);
        let second = featurizer.featurize(&["", "coffee"]);

        assert_ne!(first.indices, second.indices);
    }

    #[test]
    fn fnv1a_matches_reference_offset() {
        assert_eq!(
            "".bytes().fold(FNV_OFFSET_BASIS, |h, b| (h ^ u64::from(b))
                .wrapping_mul(FNV_PRIME)),
            FNV_OFFSET_BASIS
        );
        assert_ne!(fnv1a(0, "a"), fnv1a(1, "a"));
    }
}
