use burn::config::Config;
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::featurize::SparseFeatures;

use super::Example;

/// Averaged perceptron (one-versus-all) trainer configuration
#[derive(Config, Debug, PartialEq)]
pub struct PerceptronConfig {
    /// Passes over the training examples
    #[config(default = 10)]
    pub epochs: usize,

    /// Step size of every mistake-driven update
    #[config(default = 1.0)]
    pub learning_rate: f32,
}

/// One averaged binary perceptron per class
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AveragedPerceptron {
    /// Averaged weights, per class
    pub weights: Vec<Vec<f32>>,

    /// Averaged bias, per class
    pub biases: Vec<f32>,
}

impl PerceptronConfig {
    /// Train every class against the rest, averaging the weights over all steps
    pub fn fit(
        &self,
        examples: &[Example],
        n_classes: usize,
        dim: usize,
        seed: u64,
    ) -> AveragedPerceptron {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut order: Vec<usize> = (0..examples.len()).collect();

        let mut weights = vec![vec![0.0f32; dim]; n_classes];
        let mut biases = vec![0.0f32; n_classes];

        // Step-weighted sums of every update, used to average lazily
        let mut weight_sums = vec![vec![0.0f32; dim]; n_classes];
        let mut bias_sums = vec![0.0f32; n_classes];
        let mut step = 1.0f32;

        for _ in 0..self.epochs {
            order.shuffle(&mut rng);

            for &i in &order {
                let example = &examples[i];

                for class in 0..n_classes {
                    let y = if example.target == class { 1.0 } else { -1.0 };
                    let margin = example.features.dot(&weights[class]) + biases[class];

                    if y * margin <= 0.0 {
                        let update = self.learning_rate * y;

                        for (index, value) in example.features.iter() {
                            weights[class][index] += update * value;
                            weight_sums[class][index] += step * update * value;
                        }

                        biases[class] += update;
                        bias_sums[class] += step * update;
                    }
                }

                step += 1.0;
            }
        }

        for (w, sums) in weights.iter_mut().zip(&weight_sums) {
            for (weight, sum) in w.iter_mut().zip(sums) {
                *weight -= sum / step;
            }
        }

        for (bias, sum) in biases.iter_mut().zip(&bias_sums) {
            *bias -= sum / step;
        }

        AveragedPerceptron { weights, biases }
    }

    /// Hyper-parameter sweep explored by the experiment, best guess first
    pub fn candidates() -> Vec<Self> {
        vec![
            Self::new(),
            Self::new().with_epochs(25),
            Self::new().with_epochs(5).with_learning_rate(0.5),
        ]
    }
}

impl AveragedPerceptron {
    /// Margin of every one-versus-all classifier
    pub fn margins(&self, features: &SparseFeatures) -> Vec<f32> {
        self.weights
            .iter()
            .zip(&self.biases)
            .map(|(weights, bias)| features.dot(weights) + bias)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use crate::featurize::TextFeaturizer;

    use super::*;

    #[test]
    fn separable_classes_are_learned() {
        let featurizer = TextFeaturizer::new();
        let examples = vec![
            Example::new(featurizer.featurize(&["netflix subscription"]), 0),
            Example::new(featurizer.featurize(&["spotify premium"]), 1),
            Example::new(featurizer.featurize(&["netflix monthly"]), 0),
            Example::new(featurizer.featurize(&["spotify family"]), 1),
        ];

        let model = PerceptronConfig::new().fit(&examples, 2, featurizer.dim(), 7);

        for example in &examples {
            let margins = model.margins(&example.features);
            let predicted = if margins[0] >= margins[1] { 0 } else { 1 };
            assert_eq!(predicted, example.target);
        }
    }

    #[test]
    fn training_is_reproducible_for_a_seed() {
        let featurizer = TextFeaturizer::new().with_hash_bits(8);
        let examples = vec![
            Example::new(featurizer.featurize(&["a b"]), 0),
            Example::new(featurizer.featurize(&["c d"]), 1),
            Example::new(featurizer.featurize(&["e f"]), 2),
        ];

        let config = PerceptronConfig::new();

        assert_eq!(
            config.fit(&examples, 3, featurizer.dim(), 1),
            config.fit(&examples, 3, featurizer.dim(), 1)
        );
    }
}
