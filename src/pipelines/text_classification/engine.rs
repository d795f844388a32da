use std::{
    marker::PhantomData,
    path::Path,
    sync::{Arc, Mutex},
};

use crate::{
    automl::metrics::argmax,
    data::Record,
    error::{Error, Result},
    models::Scorer,
};

use super::{
    inference::{OutputSchema, Prediction},
    model::TrainedModel,
};

/// Idle engines kept by a pool unless configured otherwise
pub const DEFAULT_MAX_IDLE: usize = 8;

/// Runs a trained model on records of type `T`
///
/// An engine owns a materialized estimator, which for tensor-backed models is a burn module.
/// Those are not `Sync`, so an engine is used by one thread at a time.
#[derive(Debug)]
pub struct PredictionEngine<T: Record> {
    model: Arc<TrainedModel>,
    scorer: Scorer,
    _record: PhantomData<fn(&T)>,
}

impl<T: Record> PredictionEngine<T> {
    /// Create an engine, checking that `T` provides every column the model reads
    pub fn new(model: Arc<TrainedModel>) -> Result<Self> {
        if let Some(missing) = model
            .columns
            .text_column_names
            .iter()
            .find(|column| !T::COLUMNS.contains(&column.as_str()))
        {
            return Err(Error::SchemaMismatch(missing.clone()));
        }

        let scorer = model.estimator.scorer()?;

        Ok(Self {
            model,
            scorer,
            _record: PhantomData,
        })
    }

    /// Predict the category of one record
    pub fn predict(&mut self, input: &T) -> Result<Prediction> {
        let texts: Vec<&str> = self
            .model
            .columns
            .text_column_names
            .iter()
            .map(|name| input.column(name).unwrap_or_default())
            .collect();

        let score = self
            .scorer
            .probabilities(&self.model.featurizer.featurize(&texts));

        let labels = self.model.categories();
        if score.len() != labels.len() {
            return Err(Error::ScoreCategoryMismatch {
                categories: labels.len(),
                scores: score.len(),
            });
        }

        Ok(Prediction {
            label: labels[argmax(&score)].clone(),
            score,
        })
    }

    /// Describe the engine's output columns
    pub fn output_schema(&self) -> OutputSchema {
        OutputSchema::of(&self.model)
    }

    /// The model this engine runs
    pub fn model(&self) -> &Arc<TrainedModel> {
        &self.model
    }
}

/// Supplies prediction engines to a predictor
pub trait EngineProvider<T: Record>: Send + Sync {
    /// Predict with `model`, or with the provider's own model if it has one
    fn predict(&self, model: Option<&Arc<TrainedModel>>, input: &T) -> Result<Prediction>;

    /// The output schema of `model`, or of the provider's own model if it has one
    fn output_schema(&self, model: Option<&Arc<TrainedModel>>) -> Result<OutputSchema>;
}

/// Builds a fresh engine for every call
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleUseEngines;

impl<T: Record> EngineProvider<T> for SingleUseEngines {
    fn predict(&self, model: Option<&Arc<TrainedModel>>, input: &T) -> Result<Prediction> {
        let model = model.ok_or(Error::NoModelLoaded)?;

        PredictionEngine::<T>::new(model.clone())?.predict(input)
    }

    fn output_schema(&self, model: Option<&Arc<TrainedModel>>) -> Result<OutputSchema> {
        model
            .map(|model| OutputSchema::of(model))
            .ok_or(Error::NoModelLoaded)
    }
}

/// A thread-safe pool of engines over a model it owns
///
/// Engines are checked out for one prediction and returned afterwards, so concurrent callers
/// never share one. The pool ignores any model the predictor holds.
#[derive(Debug)]
pub struct PredictionEnginePool<T: Record> {
    model: Arc<TrainedModel>,
    idle: Mutex<Vec<PredictionEngine<T>>>,
    max_idle: usize,
}

impl<T: Record> PredictionEnginePool<T> {
    /// Create a pool, validating the model against `T` by building its first engine
    pub fn new(model: Arc<TrainedModel>) -> Result<Self> {
        let engine = PredictionEngine::new(model.clone())?;

        Ok(Self {
            model,
            idle: Mutex::new(vec![engine]),
            max_idle: DEFAULT_MAX_IDLE,
        })
    }

    /// Create a pool over a model artifact on disk
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::new(Arc::new(TrainedModel::load_file(path)?))
    }

    /// Cap the number of idle engines kept for reuse
    pub fn with_max_idle(mut self, max_idle: usize) -> Self {
        self.max_idle = max_idle;
        self
    }

    /// The model served by this pool
    pub fn model(&self) -> &Arc<TrainedModel> {
        &self.model
    }

    /// Number of engines waiting to be reused
    pub fn idle_engines(&self) -> Result<usize> {
        Ok(self.idle.lock().map_err(|_| Error::PoolPoisoned)?.len())
    }

    fn checkout(&self) -> Result<PredictionEngine<T>> {
        let engine = self.idle.lock().map_err(|_| Error::PoolPoisoned)?.pop();

        match engine {
            Some(engine) => Ok(engine),
            None => PredictionEngine::new(self.model.clone()),
        }
    }

    fn checkin(&self, engine: PredictionEngine<T>) -> Result<()> {
        let mut idle = self.idle.lock().map_err(|_| Error::PoolPoisoned)?;
        if idle.len() < self.max_idle {
            idle.push(engine);
        }

        Ok(())
    }
}

impl<T: Record> EngineProvider<T> for PredictionEnginePool<T> {
    fn predict(&self, _model: Option<&Arc<TrainedModel>>, input: &T) -> Result<Prediction> {
        let mut engine = self.checkout()?;
        let prediction = engine.predict(input);
        self.checkin(engine)?;

        prediction
    }

    fn output_schema(&self, _model: Option<&Arc<TrainedModel>>) -> Result<OutputSchema> {
        Ok(OutputSchema::of(&self.model))
    }
}

/// Lets several predictors share one pool
impl<T: Record, P: EngineProvider<T> + ?Sized> EngineProvider<T> for Arc<P> {
    fn predict(&self, model: Option<&Arc<TrainedModel>>, input: &T) -> Result<Prediction> {
        (**self).predict(model, input)
    }

    fn output_schema(&self, model: Option<&Arc<TrainedModel>>) -> Result<OutputSchema> {
        (**self).output_schema(model)
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use pretty_assertions::assert_eq;
    use serde::Deserialize;

    use crate::{
        data::tests::{row, Row},
        pipelines::text_classification::model::tests::model,
    };

    use super::*;

    #[derive(Clone, Debug, Deserialize)]
    struct Other {
        body: Option<String>,
    }

    impl Record for Other {
        const COLUMNS: &'static [&'static str] = &["body"];

        fn column(&self, name: &str) -> Option<&str> {
            (name == "body").then_some(self.body.as_deref()).flatten()
        }
    }

    #[test]
    fn engines_reject_records_missing_model_columns() {
        let result = PredictionEngine::<Other>::new(Arc::new(model()));

        assert!(matches!(result, Err(Error::SchemaMismatch(column)) if column == "text"));
    }

    #[test]
    fn engine_scores_cover_every_category() {
        let mut engine = PredictionEngine::<Row>::new(Arc::new(model())).unwrap();

        let prediction = engine.predict(&row("", "anything")).unwrap();

        assert_eq!(prediction.score.len(), 2);
        assert_eq!(engine.output_schema().score_slot_names, ["Games", "Music"]);
    }

    #[test]
    fn single_use_engines_need_a_model() {
        let provider = SingleUseEngines;

        assert!(matches!(
            EngineProvider::<Row>::predict(&provider, None, &row("", "x")),
            Err(Error::NoModelLoaded)
        ));
        assert!(matches!(
            EngineProvider::<Row>::output_schema(&provider, None),
            Err(Error::NoModelLoaded)
        ));
    }

    #[test]
    fn pools_reuse_engines() {
        let pool = PredictionEnginePool::<Row>::new(Arc::new(model())).unwrap();
        assert_eq!(pool.idle_engines().unwrap(), 1);

        for _ in 0..3 {
            pool.predict(None, &row("", "text")).unwrap();
        }

        assert_eq!(pool.idle_engines().unwrap(), 1);
    }

    #[test]
    fn pools_serve_concurrent_callers() {
        let pool = Arc::new(
            PredictionEnginePool::<Row>::new(Arc::new(model()))
                .unwrap()
                .with_max_idle(2),
        );

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let pool = pool.clone();
                thread::spawn(move || pool.predict(None, &row("", &format!("text {i}"))))
            })
            .collect();

        for handle in handles {
            assert!(handle.join().unwrap().is_ok());
        }

        assert!(pool.idle_engines().unwrap() <= 2);
    }

    #[test]
    fn pools_ignore_the_callers_model() {
        let pool = PredictionEnginePool::<Row>::new(Arc::new(model())).unwrap();
        let mut other = model();
        other.labels = vec!["A".to_string(), "B".to_string()];

        let schema = pool.output_schema(Some(&Arc::new(other))).unwrap();

        assert_eq!(schema.score_slot_names, ["Games", "Music"]);
    }
}
