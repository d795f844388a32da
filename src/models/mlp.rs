use burn::{
    config::Config,
    module::Module,
    nn::{Dropout, DropoutConfig, Linear, LinearConfig},
    tensor::{activation::relu, backend::Backend, Tensor},
};

use super::neural::{Logits, Schedule};

/// One hidden layer perceptron
#[derive(Module, Debug)]
pub struct MultiLayerPerceptron<B: Backend> {
    /// Input to hidden projection
    pub hidden: Linear<B>,

    /// Dropout applied to the hidden activations while training
    pub dropout: Dropout,

    /// Hidden to class projection
    pub output: Linear<B>,
}

impl<B: Backend> Logits<B> for MultiLayerPerceptron<B> {
    fn logits(&self, features: Tensor<B, 2>) -> Tensor<B, 2> {
        let hidden = relu(self.hidden.forward(features));

        self.output.forward(self.dropout.forward(hidden))
    }
}

/// Multi-layer perceptron trainer configuration
#[derive(Config, Debug, PartialEq)]
pub struct MlpConfig {
    /// Size of the hidden layer
    #[config(default = 64)]
    pub hidden_size: usize,

    /// Dropout rate
    #[config(default = 0.1)]
    pub dropout: f64,

    /// Number of epochs
    #[config(default = 15)]
    pub epochs: usize,

    /// Batch size
    #[config(default = 32)]
    pub batch_size: usize,

    /// AdamW learning rate
    #[config(default = 0.01)]
    pub learning_rate: f64,

    /// AdamW weight decay
    #[config(default = 1e-4)]
    pub weight_decay: f32,
}

impl MlpConfig {
    /// Initialize an untrained classifier
    pub fn init<B: Backend>(
        &self,
        d_input: usize,
        n_classes: usize,
        device: &B::Device,
    ) -> MultiLayerPerceptron<B> {
        MultiLayerPerceptron {
            hidden: LinearConfig::new(d_input, self.hidden_size).init(device),
            dropout: DropoutConfig::new(self.dropout).init(),
            output: LinearConfig::new(self.hidden_size, n_classes).init(device),
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
            Self::new().with_hidden_size(128).with_dropout(0.2),
            Self::new().with_learning_rate(0.003).with_epochs(25),
        ]
    }
}
