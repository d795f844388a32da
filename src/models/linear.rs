use burn::{
    config::Config,
    module::Module,
    nn::{Linear, LinearConfig},
    tensor::{backend::Backend, Tensor},
};

use super::neural::{Logits, Schedule};

/// Softmax regression over the hashed text features
#[derive(Module, Debug)]
pub struct MaximumEntropy<B: Backend> {
    /// Feature weights and per-class bias
    pub output: Linear<B>,
}

impl<B: Backend> Logits<B> for MaximumEntropy<B> {
    fn logits(&self, features: Tensor<B, 2>) -> Tensor<B, 2> {
        self.output.forward(features)
    }
}

/// Maximum entropy trainer configuration
#[derive(Config, Debug, PartialEq)]
pub struct MaximumEntropyConfig {
    /// Number of epochs
    #[config(default = 20)]
    pub epochs: usize,

    /// Batch size
    #[config(default = 32)]
    pub batch_size: usize,

    /// AdamW learning rate
    #[config(default = 0.05)]
    pub learning_rate: f64,

    /// AdamW weight decay, acting as L2 regularization
    #[config(default = 1e-4)]
    pub weight_decay: f32,
}

impl MaximumEntropyConfig {
    /// Initialize an untrained classifier
    pub fn init<B: Backend>(
        &self,
        d_input: usize,
        n_classes: usize,
        device: &B::Device,
    ) -> MaximumEntropy<B> {
        MaximumEntropy {
            output: LinearConfig::new(d_input, n_classes).init(device),
        }
    }

    /// The optimization loop settings
    pub fn schedule(&self) -> Schedule {
        Schedule::new(
            self.epochs,
            self.batch_size,
            self.learning_rate,
            self.weight_decay,
        )
    }

    /// Hyper-parameter sweep explored by the experiment, best guess first
    pub fn candidates() -> Vec<Self> {
        vec![
            Self::new(),
            Self::new().with_learning_rate(0.1).with_epochs(30),
            Self::new().with_learning_rate(0.02).with_weight_decay(1e-3),
        ]
    }
}
