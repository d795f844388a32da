use std::{collections::HashMap, io::Read, path::Path, sync::Arc};

use crate::{
    data::Record,
    error::{Error, Result},
};

use super::{
    engine::{EngineProvider, SingleUseEngines},
    model::TrainedModel,
};

/// Name of the predicted label output column
pub const PREDICTED_LABEL_COLUMN: &str = "PredictedLabel";

/// Name of the score vector output column
pub const SCORE_COLUMN: &str = "Score";

/// The result of classifying one record
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    /// The winning category
    pub label: String,

    /// One probability per category, in category order
    pub score: Vec<f32>,
}

impl Prediction {
    /// The probability of the winning category
    pub fn max_score(&self) -> f32 {
        self.score.iter().copied().fold(0.0, f32::max)
    }
}

/// Describes the columns a prediction engine produces
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputSchema {
    /// Column holding the predicted label
    pub predicted_label_column: String,

    /// Column holding the score vector
    pub score_column: String,

    /// Category name of every score slot
    pub score_slot_names: Vec<String>,
}

impl OutputSchema {
    /// The output schema of a model
    pub fn of(model: &TrainedModel) -> Self {
        Self {
            predicted_label_column: PREDICTED_LABEL_COLUMN.to_string(),
            score_column: SCORE_COLUMN.to_string(),
            score_slot_names: model.categories().to_vec(),
        }
    }
}

/// Category scores of one prediction, in category order
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionList {
    entries: Vec<(String, f32)>,
}

impl PredictionList {
    /// Pair categories with scores by position
    pub fn new(categories: Vec<String>, scores: Vec<f32>) -> Result<Self> {
        if categories.len() != scores.len() {
            return Err(Error::ScoreCategoryMismatch {
                categories: categories.len(),
                scores: scores.len(),
            });
        }

        Ok(Self {
            entries: categories.into_iter().zip(scores).collect(),
        })
    }

    /// The score of a category
    pub fn get(&self, label: &str) -> Option<f32> {
        self.entries
            .iter()
            .find(|(category, _)| category == label)
            .map(|(_, score)| *score)
    }

    /// Iterate over `(category, score)` pairs in category order
    pub fn iter(&self) -> impl Iterator<Item = (&str, f32)> {
        self.entries
            .iter()
            .map(|(category, score)| (category.as_str(), *score))
    }

    /// Number of categories
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no categories
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Convert into an unordered label to score map
    pub fn into_map(self) -> HashMap<String, f32> {
        self.entries.into_iter().collect()
    }
}

impl IntoIterator for PredictionList {
    type Item = (String, f32);
    type IntoIter = std::vec::IntoIter<(String, f32)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// What the predictor holds
#[derive(Debug, Clone)]
enum State {
    /// No model
    Unloaded,

    /// A model whose categories have not been read yet
    Stale(Arc<TrainedModel>),

    /// A model with its categories cached
    Cached(Arc<TrainedModel>, Vec<String>),
}

/// Loads a trained model and classifies records of type `T`
pub struct Predictor<T: Record> {
    state: State,
    provider: Box<dyn EngineProvider<T>>,
}

impl<T: Record> Default for Predictor<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Record> Predictor<T> {
    /// A predictor with no model, creating a fresh engine per prediction
    pub fn new() -> Self {
        Self {
            state: State::Unloaded,
            provider: Box::new(SingleUseEngines),
        }
    }

    /// Load a model artifact from disk, replacing the current model
    pub fn load_from_file_path(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let model = TrainedModel::load_file(path)?;
        log::info!("Loaded {} model from {}", model.trainer, path.display());

        self.set_model(Arc::new(model));

        Ok(())
    }

    /// Load a model artifact from a stream, replacing the current model
    pub fn load_from_reader<R: Read>(&mut self, reader: R) -> Result<()> {
        self.set_model(Arc::new(TrainedModel::load(reader)?));

        Ok(())
    }

    /// Replace the current model; cached categories are dropped
    pub fn set_model(&mut self, model: Arc<TrainedModel>) {
        self.state = State::Stale(model);
    }

    /// Replace the engine provider, typically with a [PredictionEnginePool](super::PredictionEnginePool)
    pub fn set_engine_provider(&mut self, provider: impl EngineProvider<T> + 'static) {
        self.provider = Box::new(provider);

        if let State::Cached(model, _) = &self.state {
            self.state = State::Stale(model.clone());
        }
    }

    /// The model the predictor holds, if any
    pub fn model(&self) -> Option<&Arc<TrainedModel>> {
        match &self.state {
            State::Unloaded => None,
            State::Stale(model) | State::Cached(model, _) => Some(model),
        }
    }

    /// Classify one record
    pub fn predict(&self, input: &T) -> Result<Prediction> {
        self.provider.predict(self.model(), input)
    }

    /// Every category with its score for one record, in category order
    pub fn prediction_list(&mut self, input: &T) -> Result<PredictionList> {
        let categories = self.categories()?;
        let prediction = self.predict(input)?;

        PredictionList::new(categories, prediction.score)
    }

    /// The categories the model predicts, in score slot order
    pub fn categories(&mut self) -> Result<Vec<String>> {
        match &self.state {
            State::Cached(_, categories) => Ok(categories.clone()),
            State::Stale(model) => {
                let model = model.clone();
                let categories = self.provider.output_schema(Some(&model))?.score_slot_names;
                self.state = State::Cached(model, categories.clone());

                Ok(categories)
            }
            State::Unloaded => Ok(self.provider.output_schema(None)?.score_slot_names),
        }
    }
}
