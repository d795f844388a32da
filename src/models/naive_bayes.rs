use burn::config::Config;
use serde::{Deserialize, Serialize};

use crate::{
    error::{self, Error},
    featurize::SparseFeatures,
};

use super::Example;

/// Multinomial naive Bayes trainer configuration
#[derive(Config, Debug, PartialEq)]
pub struct NaiveBayesConfig {
    /// Laplace smoothing added to every feature count
    #[config(default = 1.0)]
    pub alpha: f32,
}

/// A fitted multinomial naive Bayes model
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NaiveBayes {
    /// Log prior per class
    pub log_priors: Vec<f32>,

    /// Log likelihood of every feature slot, per class
    pub log_likelihoods: Vec<Vec<f32>>,
}

impl NaiveBayesConfig {
    /// Estimate priors and smoothed feature likelihoods from weighted feature counts
    pub fn fit(
        &self,
        examples: &[Example],
        n_classes: usize,
        dim: usize,
    ) -> error::Result<NaiveBayes> {
        if self.alpha <= 0.0 {
            return Err(Error::InvalidSettings(format!(
                "naive Bayes smoothing must be positive, got {}",
                self.alpha
            )));
        }

        let mut class_counts = vec![0.0f32; n_classes];
        let mut feature_mass = vec![vec![0.0f32; dim]; n_classes];

        for example in examples {
            class_counts[example.target] += 1.0;
            for (index, value) in example.features.iter() {
                feature_mass[example.target][index] += value;
            }
        }

        // Classes missing from a fold still get a small prior
        let total = examples.len() as f32 + n_classes as f32;
        let log_priors = class_counts
            .iter()
            .map(|count| ((count + 1.0) / total).ln())
            .collect();

        let log_likelihoods = feature_mass
            .into_iter()
            .map(|mass| {
                let denominator = mass.iter().sum::<f32>() + self.alpha * dim as f32;
                mass.into_iter()
                    .map(|m| ((m + self.alpha) / denominator).ln())
                    .collect()
            })
            .collect();

        Ok(NaiveBayes {
            log_priors,
            log_likelihoods,
        })
    }

    /// Hyper-parameter sweep explored by the experiment, best guess first
    pub fn candidates() -> Vec<Self> {
        vec![
            Self::new(),
            Self::new().with_alpha(0.1),
            Self::new().with_alpha(0.01),
        ]
    }
}

impl NaiveBayes {
    /// Unnormalized log posterior per class
    pub fn log_scores(&self, features: &SparseFeatures) -> Vec<f32> {
        self.log_priors
            .iter()
            .zip(&self.log_likelihoods)
            .map(|(prior, likelihoods)| prior + features.dot(likelihoods))
            .collect()
    }
}
