use std::fmt::{self, Display};

use burn::{
    backend::{Autodiff, NdArray},
    tensor::backend::Backend,
};
use derive_new::new;
use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    featurize::SparseFeatures,
};

/// Multi-layer perceptron
pub mod mlp;

/// Softmax regression
pub mod linear;

/// Multinomial naive Bayes
pub mod naive_bayes;

/// Averaged perceptron, one-versus-all
pub mod perceptron;

/// Batching and the training loop for tensor-backed estimators
pub mod neural;

pub use linear::{MaximumEntropy, MaximumEntropyConfig};
pub use mlp::{MlpConfig, MultiLayerPerceptron};
pub use naive_bayes::{NaiveBayes, NaiveBayesConfig};
pub use neural::NeuralWeights;
pub use perceptron::{AveragedPerceptron, PerceptronConfig};

/// Backend used to run fitted models
pub type InferenceBackend = NdArray;

/// Backend used to fit the tensor-backed estimators
pub type TrainingBackend = Autodiff<InferenceBackend>;

/// The catalogue of multi-class trainers the experiment can choose from
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum MulticlassTrainer {
    /// Multinomial naive Bayes
    NaiveBayes,

    /// One-versus-all averaged perceptron
    AveragedPerceptronOva,

    /// Softmax regression
    MaximumEntropy,

    /// One hidden layer neural network
    MultiLayerPerceptron,
}

impl MulticlassTrainer {
    /// Every trainer, in the order the experiment tries them within a round
    pub const ALL: [MulticlassTrainer; 4] = [
        MulticlassTrainer::NaiveBayes,
        MulticlassTrainer::AveragedPerceptronOva,
        MulticlassTrainer::MaximumEntropy,
        MulticlassTrainer::MultiLayerPerceptron,
    ];

    /// Get the unique string token that identifies this trainer
    pub fn as_str(&self) -> &'static str {
        match self {
            MulticlassTrainer::NaiveBayes => "naive-bayes",
            MulticlassTrainer::AveragedPerceptronOva => "averaged-perceptron-ova",
            MulticlassTrainer::MaximumEntropy => "maximum-entropy",
            MulticlassTrainer::MultiLayerPerceptron => "multi-layer-perceptron",
        }
    }

    /// The hyper-parameter sweep for this trainer, best guess first
    pub fn candidates(&self) -> Vec<Hyperparameters> {
        match self {
            MulticlassTrainer::NaiveBayes => NaiveBayesConfig::candidates()
                .into_iter()
                .map(Hyperparameters::NaiveBayes)
                .collect(),
            MulticlassTrainer::AveragedPerceptronOva => PerceptronConfig::candidates()
                .into_iter()
                .map(Hyperparameters::AveragedPerceptronOva)
                .collect(),
            MulticlassTrainer::MaximumEntropy => MaximumEntropyConfig::candidates()
                .into_iter()
                .map(Hyperparameters::MaximumEntropy)
                .collect(),
            MulticlassTrainer::MultiLayerPerceptron => MlpConfig::candidates()
                .into_iter()
                .map(Hyperparameters::MultiLayerPerceptron)
                .collect(),
        }
    }
}

impl TryFrom<&str> for MulticlassTrainer {
    type Error = ModelError;

    fn try_from(value: &str) -> std::result::Result<Self, Self::Error> {
        MulticlassTrainer::ALL
            .into_iter()
            .find(|trainer| trainer.as_str() == value)
            .ok_or_else(|| ModelError::Unknown(value.to_string()))
    }
}

impl Display for MulticlassTrainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Model Error
#[derive(thiserror::Error, Debug)]
pub enum ModelError {
    /// No trainer found for the given string
    #[error("no trainer found for {0}")]
    Unknown(String),
}

/// One point of a trainer's hyper-parameter sweep
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Hyperparameters {
    /// Naive Bayes smoothing
    NaiveBayes(NaiveBayesConfig),

    /// Perceptron schedule
    AveragedPerceptronOva(PerceptronConfig),

    /// Softmax regression schedule
    MaximumEntropy(MaximumEntropyConfig),

    /// Network shape and schedule
    MultiLayerPerceptron(MlpConfig),
}

impl Hyperparameters {
    /// The trainer these hyper-parameters belong to
    pub fn trainer(&self) -> MulticlassTrainer {
        match self {
            Hyperparameters::NaiveBayes(_) => MulticlassTrainer::NaiveBayes,
            Hyperparameters::AveragedPerceptronOva(_) => MulticlassTrainer::AveragedPerceptronOva,
            Hyperparameters::MaximumEntropy(_) => MulticlassTrainer::MaximumEntropy,
            Hyperparameters::MultiLayerPerceptron(_) => MulticlassTrainer::MultiLayerPerceptron,
        }
    }

    /// Fit an estimator on featurized examples
    pub fn fit(
        &self,
        examples: &[Example],
        n_classes: usize,
        dim: usize,
        seed: u64,
    ) -> Result<Estimator> {
        if examples.is_empty() {
            return Err(Error::EmptyTrainingData);
        }

        let estimator = match self {
            Hyperparameters::NaiveBayes(config) => {
                Estimator::NaiveBayes(config.fit(examples, n_classes, dim)?)
            }
            Hyperparameters::AveragedPerceptronOva(config) => {
                Estimator::AveragedPerceptronOva(config.fit(examples, n_classes, dim, seed))
            }
            Hyperparameters::MaximumEntropy(config) => {
                let device = Default::default();
                TrainingBackend::seed(&device, seed);

                let module = neural::fit(
                    config.init::<TrainingBackend>(dim, n_classes, &device),
                    examples,
                    dim,
                    config.schedule(),
                    seed,
                );

                Estimator::MaximumEntropy(NeuralWeights::record(
                    config.clone(),
                    dim,
                    n_classes,
                    module,
                )?)
            }
            Hyperparameters::MultiLayerPerceptron(config) => {
                let device = Default::default();
                TrainingBackend::seed(&device, seed);

                let module = neural::fit(
                    config.init::<TrainingBackend>(dim, n_classes, &device),
                    examples,
                    dim,
                    config.schedule(),
                    seed,
                );

                Estimator::MultiLayerPerceptron(NeuralWeights::record(
                    config.clone(),
                    dim,
                    n_classes,
                    module,
                )?)
            }
        };

        Ok(estimator)
    }
}

impl Display for Hyperparameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Hyperparameters::NaiveBayes(config) => write!(f, "{config}"),
            Hyperparameters::AveragedPerceptronOva(config) => write!(f, "{config}"),
            Hyperparameters::MaximumEntropy(config) => write!(f, "{config}"),
            Hyperparameters::MultiLayerPerceptron(config) => write!(f, "{config}"),
        }
    }
}

/// A featurized training row
#[derive(Clone, Debug, new)]
pub struct Example {
    /// Hashed text features
    pub features: SparseFeatures,

    /// Index of the label in the label map
    pub target: usize,
}

/// A fitted estimator
///
/// Estimators are plain data so a trained model can be shared across threads. Tensor-backed
/// estimators are turned into a [Scorer] to run them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Estimator {
    /// Multinomial naive Bayes
    NaiveBayes(NaiveBayes),

    /// One-versus-all averaged perceptron
    AveragedPerceptronOva(AveragedPerceptron),

    /// Softmax regression
    MaximumEntropy(NeuralWeights<MaximumEntropyConfig>),

    /// One hidden layer neural network
    MultiLayerPerceptron(NeuralWeights<MlpConfig>),
}

impl Estimator {
    /// Number of classes the estimator scores
    pub fn n_classes(&self) -> usize {
        match self {
            Estimator::NaiveBayes(model) => model.log_priors.len(),
            Estimator::AveragedPerceptronOva(model) => model.biases.len(),
            Estimator::MaximumEntropy(weights) => weights.n_classes,
            Estimator::MultiLayerPerceptron(weights) => weights.n_classes,
        }
    }

    /// Width of the feature vectors the estimator reads, `None` when its weight rows disagree
    pub fn d_input(&self) -> Option<usize> {
        let rows = match self {
            Estimator::NaiveBayes(model) => &model.log_likelihoods,
            Estimator::AveragedPerceptronOva(model) => &model.weights,
            Estimator::MaximumEntropy(weights) => return Some(weights.d_input),
            Estimator::MultiLayerPerceptron(weights) => return Some(weights.d_input),
        };

        if rows.len() != self.n_classes() {
            return None;
        }

        let width = rows.first().map_or(0, Vec::len);
        rows.iter().all(|row| row.len() == width).then_some(width)
    }

    /// Recorded module weights, empty for estimators that live entirely in the manifest
    pub fn weights(&self) -> &[u8] {
        match self {
            Estimator::MaximumEntropy(weights) => &weights.record,
            Estimator::MultiLayerPerceptron(weights) => &weights.record,
            _ => &[],
        }
    }

    /// Attach module weights read back from a model artifact
    pub fn set_weights(&mut self, record: Vec<u8>) -> Result<()> {
        match self {
            Estimator::MaximumEntropy(weights) => weights.record = record,
            Estimator::MultiLayerPerceptron(weights) => weights.record = record,
            _ if record.is_empty() => {}
            _ => {
                return Err(Error::CorruptModel(
                    "unexpected weights for an estimator without tensors".to_string(),
                ))
            }
        }

        Ok(())
    }

    /// Build something that can score feature vectors
    pub fn scorer(&self) -> Result<Scorer> {
        let scorer = match self {
            Estimator::NaiveBayes(model) => Scorer::NaiveBayes(model.clone()),
            Estimator::AveragedPerceptronOva(model) => Scorer::AveragedPerceptronOva(model.clone()),
            Estimator::MaximumEntropy(weights) => {
                Scorer::MaximumEntropy(weights.restore(|config, d_input, n_classes| {
                    config.init::<InferenceBackend>(d_input, n_classes, &Default::default())
                })?)
            }
            Estimator::MultiLayerPerceptron(weights) => {
                Scorer::MultiLayerPerceptron(weights.restore(|config, d_input, n_classes| {
                    config.init::<InferenceBackend>(d_input, n_classes, &Default::default())
                })?)
            }
        };

        Ok(scorer)
    }
}

/// A runnable estimator
///
/// Tensor-backed scorers hold burn modules, which are `Send` but not `Sync`.
#[derive(Debug)]
pub enum Scorer {
    /// Multinomial naive Bayes
    NaiveBayes(NaiveBayes),

    /// One-versus-all averaged perceptron
    AveragedPerceptronOva(AveragedPerceptron),

    /// Softmax regression
    MaximumEntropy(MaximumEntropy<InferenceBackend>),

    /// One hidden layer neural network
    MultiLayerPerceptron(MultiLayerPerceptron<InferenceBackend>),
}

impl Scorer {
    /// Class probabilities for one feature vector
    pub fn probabilities(&self, features: &SparseFeatures) -> Vec<f32> {
        self.probabilities_batch(std::slice::from_ref(features))
            .pop()
            .unwrap_or_default()
    }

    /// Class probabilities for a batch of feature vectors, one row per input
    pub fn probabilities_batch(&self, batch: &[SparseFeatures]) -> Vec<Vec<f32>> {
        match self {
            Scorer::NaiveBayes(model) => batch
                .iter()
                .map(|features| softmax(&model.log_scores(features)))
                .collect(),
            Scorer::AveragedPerceptronOva(model) => batch
                .iter()
                .map(|features| softmax(&model.margins(features)))
                .collect(),
            Scorer::MaximumEntropy(model) => neural::probabilities(model, batch),
            Scorer::MultiLayerPerceptron(model) => neural::probabilities(model, batch),
        }
    }
}

/// Numerically stable softmax
pub fn softmax(scores: &[f32]) -> Vec<f32> {
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = scores.iter().map(|s| (s - max).exp()).collect();
    let sum: f32 = exps.iter().sum();

    exps.into_iter().map(|e| e / sum).collect()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::featurize::TextFeaturizer;

    use super::*;

    fn examples(featurizer: &TextFeaturizer) -> Vec<Example> {
        [
            ("coffee shop downtown", 0),
            ("espresso coffee bar", 0),
            ("steam games purchase", 1),
            ("console games store", 1),
            ("spotify music premium", 2),
            ("itunes music store", 2),
        ]
        .into_iter()
        .map(|(text, target)| Example::new(featurizer.featurize(&[text]), target))
        .collect()
    }

    fn assert_distribution(probabilities: &[f32], n_classes: usize) {
        assert_eq!(probabilities.len(), n_classes);
        assert!(probabilities.iter().all(|p| *p >= 0.0));
        assert!((probabilities.iter().sum::<f32>() - 1.0).abs() < 1e-4);
    }

    #[test]
    fn every_trainer_yields_probability_distributions() {
        let featurizer = TextFeaturizer::new().with_hash_bits(8);
        let examples = examples(&featurizer);

        for trainer in MulticlassTrainer::ALL {
            let hyperparameters = &trainer.candidates()[0];
            let estimator = hyperparameters
                .fit(&examples, 3, featurizer.dim(), 42)
                .unwrap();
            let scorer = estimator.scorer().unwrap();

            for example in &examples {
                assert_distribution(&scorer.probabilities(&example.features), 3);
            }
        }
    }

    #[test]
    fn neural_weights_survive_a_manifest_round_trip() {
        let featurizer = TextFeaturizer::new().with_hash_bits(6);
        let examples = examples(&featurizer);
        let estimator = Hyperparameters::MaximumEntropy(MaximumEntropyConfig::new().with_epochs(2))
            .fit(&examples, 3, featurizer.dim(), 1)
            .unwrap();

        let json = serde_json::to_string(&estimator).unwrap();
        let mut restored: Estimator = serde_json::from_str(&json).unwrap();
        assert!(restored.weights().is_empty());

        restored.set_weights(estimator.weights().to_vec()).unwrap();

        let features = featurizer.featurize(&["coffee"]);
        let expected = estimator.scorer().unwrap().probabilities(&features);
        let actual = restored.scorer().unwrap().probabilities(&features);
        for (a, b) in expected.iter().zip(&actual) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn single_class_scores_one() {
        let featurizer = TextFeaturizer::new().with_hash_bits(6);
        let examples = vec![Example::new(featurizer.featurize(&["only"]), 0)];

        let scorer = Hyperparameters::NaiveBayes(NaiveBayesConfig::new())
            .fit(&examples, 1, featurizer.dim(), 0)
            .unwrap()
            .scorer()
            .unwrap();

        assert_eq!(scorer.probabilities(&examples[0].features), vec![1.0]);
    }

    #[test]
    fn trainer_names_parse() {
        for trainer in MulticlassTrainer::ALL {
            assert_eq!(MulticlassTrainer::try_from(trainer.as_str()).unwrap(), trainer);
        }
        assert!(MulticlassTrainer::try_from("lightgbm").is_err());
    }

    #[test]
    fn softmax_handles_large_scores() {
        let probabilities = softmax(&[1000.0, 1000.0]);

        assert_eq!(probabilities, vec![0.5, 0.5]);
    }

    #[test]
    fn shallow_estimators_reject_stray_weights() {
        let mut estimator = Estimator::NaiveBayes(NaiveBayes {
            log_priors: vec![0.0],
            log_likelihoods: vec![vec![0.0]],
        });

        assert!(estimator.set_weights(Vec::new()).is_ok());
        assert!(matches!(
            estimator.set_weights(vec![1, 2, 3]),
            Err(Error::CorruptModel(_))
        ));
    }
}
