use std::{fmt, sync::Arc};

use burn::{
    config::Config,
    data::{
        dataloader::{batcher::Batcher, DataLoader, DataLoaderBuilder},
        dataset::InMemDataset,
    },
    module::{AutodiffModule, Module},
    nn::loss::CrossEntropyLossConfig,
    optim::{AdamWConfig, GradientsParams, Optimizer},
    record::{FullPrecisionSettings, NamedMpkBytesRecorder, Recorder},
    tensor::{
        activation::softmax,
        backend::Backend,
        Int, Tensor, TensorData,
    },
};
use derive_new::new;
use serde::{Deserialize, Serialize};

use crate::{error::Result, featurize::SparseFeatures};

use super::{Example, InferenceBackend, TrainingBackend};

type WeightRecorder = NamedMpkBytesRecorder<FullPrecisionSettings>;

/// A module that maps a dense feature batch to unnormalized class scores
pub trait Logits<B: Backend> {
    /// Logits for a `[batch_size, n_features]` input, shaped `[batch_size, n_classes]`
    fn logits(&self, features: Tensor<B, 2>) -> Tensor<B, 2>;
}

/// Optimization settings shared by the tensor-backed estimators
#[derive(Debug, Clone, Copy, new)]
pub struct Schedule {
    /// Passes over the training examples
    pub epochs: usize,

    /// Examples per optimizer step
    pub batch_size: usize,

    /// AdamW learning rate
    pub learning_rate: f64,

    /// AdamW weight decay
    pub weight_decay: f32,
}

/// A training batch of featurized examples
#[derive(Clone, Debug)]
pub struct ExampleBatch<B: Backend> {
    /// Dense features: [batch_size, n_features]
    pub features: Tensor<B, 2>,

    /// Class ids for the batch
    pub targets: Tensor<B, 1, Int>,
}

/// Turns sparse examples into dense tensors
#[derive(Clone, Debug, new)]
pub struct ExampleBatcher {
    /// Width of every feature row
    dim: usize,
}

impl<B: Backend> Batcher<B, Example, ExampleBatch<B>> for ExampleBatcher {
    fn batch(&self, items: Vec<Example>, device: &B::Device) -> ExampleBatch<B> {
        let batch_size = items.len();
        let mut features = Vec::with_capacity(batch_size * self.dim);
        let mut targets = Vec::with_capacity(batch_size);

        for item in items {
            features.extend(item.features.to_dense());
            targets.push(item.target as i64);
        }

        ExampleBatch {
            features: Tensor::from_data(TensorData::new(features, [batch_size, self.dim]), device),
            targets: Tensor::from_data(TensorData::new(targets, [batch_size]), device),
        }
    }
}

/// Fit a freshly initialized module with cross-entropy and AdamW, returning the inference module
pub(crate) fn fit<M>(
    mut model: M,
    examples: &[Example],
    dim: usize,
    schedule: Schedule,
    seed: u64,
) -> M::InnerModule
where
    M: AutodiffModule<TrainingBackend> + Logits<TrainingBackend>,
{
    let device: <TrainingBackend as Backend>::Device = Default::default();
    let loss_fn = CrossEntropyLossConfig::new().init::<TrainingBackend>(&device);

    let loader: Arc<dyn DataLoader<TrainingBackend, ExampleBatch<TrainingBackend>>> =
        DataLoaderBuilder::new(ExampleBatcher::new(dim))
            .batch_size(schedule.batch_size.max(1))
            .shuffle(seed)
            .set_device(device.clone())
            .build(InMemDataset::new(examples.to_vec()));

    let mut optim = AdamWConfig::new()
        .with_weight_decay(schedule.weight_decay)
        .init::<TrainingBackend, M>();

    for epoch in 1..=schedule.epochs {
        let mut total = 0.0;
        let mut steps = 0;

        for batch in loader.iter() {
            let logits = model.logits(batch.features);
            let loss = loss_fn.forward(logits, batch.targets);

            total += loss.clone().into_data().iter::<f32>().next().unwrap_or_default();
            steps += 1;

            let grads = GradientsParams::from_grads(loss.backward(), &model);
            model = optim.step(schedule.learning_rate, model, grads);
        }

        log::trace!("epoch {epoch}: loss {:.4}", total / steps.max(1) as f32);
    }

    model.valid()
}

/// Class probabilities for a batch of sparse features, one row per input
pub(crate) fn probabilities<M>(model: &M, batch: &[SparseFeatures]) -> Vec<Vec<f32>>
where
    M: Logits<InferenceBackend>,
{
    let Some(dim) = batch.first().map(|features| features.dim) else {
        return Vec::new();
    };

    let device: <InferenceBackend as Backend>::Device = Default::default();
    let dense: Vec<f32> = batch.iter().flat_map(SparseFeatures::to_dense).collect();
    let input = Tensor::<InferenceBackend, 2>::from_data(
        TensorData::new(dense, [batch.len(), dim]),
        &device,
    );

    let output = softmax(model.logits(input), 1);
    let n_classes = output.dims()[1];

    output
        .into_data()
        .iter::<f32>()
        .collect::<Vec<_>>()
        .chunks(n_classes.max(1))
        .map(<[f32]>::to_vec)
        .collect()
}

/// Weights of a tensor-backed estimator, kept as recorded bytes so the estimator stays `Sync`
#[derive(Clone, Serialize, Deserialize)]
pub struct NeuralWeights<C> {
    /// The hyper-parameters the module was built from
    pub config: C,

    /// Input width
    pub d_input: usize,

    /// Output width
    pub n_classes: usize,

    /// The recorded module, stored outside the JSON manifest
    #[serde(skip)]
    pub record: Vec<u8>,
}

impl<C: Config> NeuralWeights<C> {
    /// Record a trained inference module
    pub(crate) fn record<M: Module<InferenceBackend>>(
        config: C,
        d_input: usize,
        n_classes: usize,
        module: M,
    ) -> Result<Self> {
        let record = Recorder::<InferenceBackend>::record(
            &WeightRecorder::default(),
            module.into_record(),
            (),
        )?;

        Ok(Self {
            config,
            d_input,
            n_classes,
            record,
        })
    }

    /// Restore the recorded weights into a module built by `init`
    pub(crate) fn restore<M, F>(&self, init: F) -> Result<M>
    where
        M: Module<InferenceBackend>,
        F: FnOnce(&C, usize, usize) -> M,
    {
        let device: <InferenceBackend as Backend>::Device = Default::default();
        let record = Recorder::<InferenceBackend>::load(
            &WeightRecorder::default(),
            self.record.clone(),
            &device,
        )?;

        Ok(init(&self.config, self.d_input, self.n_classes).load_record(record))
    }
}

impl<C: fmt::Display> fmt::Debug for NeuralWeights<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NeuralWeights")
            .field("config", &self.config.to_string())
            .field("d_input", &self.d_input)
            .field("n_classes", &self.n_classes)
            .field("record", &format_args!("{} bytes", self.record.len()))
            .finish()
    }
}
