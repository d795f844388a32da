use std::time::{Duration, Instant};

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

use crate::{
    data::{ColumnInformation, LabelMap, LabeledText, Record, TrainingData},
    error::{Error, Result},
    featurize::{SparseFeatures, TextFeaturizer},
    models::{Estimator, Example, Hyperparameters, MulticlassTrainer},
    pipelines::text_classification::TrainedModel,
};

use super::{metrics::MulticlassMetrics, settings::ExperimentSettings};

/// Fraction of rows held out when the data is too large to cross-validate
const HOLDOUT_FRACTION: f64 = 0.1;

/// Rows scored per batch during evaluation
const EVALUATION_BATCH: usize = 256;

/// The outcome of a single trial
#[derive(Debug, Clone)]
pub struct RunDetail {
    /// The trainer that was run
    pub trainer: MulticlassTrainer,

    /// The hyper-parameters it was run with
    pub hyperparameters: Hyperparameters,

    /// Metrics on the validation rows, averaged over folds when cross-validating
    pub validation_metrics: MulticlassMetrics,

    /// Time spent fitting and evaluating
    pub runtime: Duration,

    /// The fitted model
    pub model: TrainedModel,
}

/// A trial reduced to what is needed to compare it
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// The trainer that was run
    pub trainer: MulticlassTrainer,

    /// The hyper-parameters it was run with
    pub hyperparameters: Hyperparameters,

    /// Validation metrics, or `None` when the trial failed
    pub validation_metrics: Option<MulticlassMetrics>,

    /// Time spent on the trial
    pub runtime: Duration,

    /// Why the trial failed, if it did
    pub error: Option<String>,
}

/// Everything an experiment produced
#[derive(Debug, Clone)]
pub struct ExperimentResult {
    /// The best run, carrying its model
    pub best_run: RunDetail,

    /// Every trial in the order it ran, including failures
    pub run_summaries: Vec<RunSummary>,
}

/// How trials are validated
enum Validation {
    /// Fit on one set, score on another
    Holdout {
        train: Vec<Example>,
        valid: Vec<Example>,
    },

    /// Fit and score once per fold, then refit the winner on everything
    CrossValidation {
        examples: Vec<Example>,
        folds: Vec<Vec<usize>>,
    },
}

/// A time-boxed search over trainers and hyper-parameters for a multi-class text task
#[derive(Debug, Clone)]
pub struct MulticlassExperiment {
    settings: ExperimentSettings,
}

impl MulticlassExperiment {
    /// Create an experiment with the given settings
    pub fn new(settings: ExperimentSettings) -> Self {
        Self { settings }
    }

    /// The settings the experiment runs with
    pub fn settings(&self) -> &ExperimentSettings {
        &self.settings
    }

    /// Run the search, validating with cross-validation (or a holdout split on large data)
    pub fn execute<T: Record>(
        &self,
        training: &TrainingData<T>,
        columns: &ColumnInformation,
    ) -> Result<ExperimentResult> {
        let (labels, examples) = self.prepare(training, columns)?;
        let validation = self.split(examples);

        self.search(training, columns, labels, validation)
    }

    /// Run the search, scoring every trial on the given validation data
    pub fn execute_with_validation<T: Record>(
        &self,
        training: &TrainingData<T>,
        validation: &TrainingData<T>,
        columns: &ColumnInformation,
    ) -> Result<ExperimentResult> {
        let (labels, train) = self.prepare(training, columns)?;

        let rows = validation.labeled_texts(columns);
        let total = rows.len();
        let valid = featurize(&self.settings.featurizer, &labels, &rows);

        if valid.len() < total {
            log::warn!(
                "Skipped {} validation rows with a label unseen in training",
                total - valid.len()
            );
        }

        if valid.is_empty() {
            return Err(Error::NoValidRun(
                "validation data has no rows with a known label".to_string(),
            ));
        }

        self.search(training, columns, labels, Validation::Holdout { train, valid })
    }

    /// Validate inputs, number the labels and featurize the training rows
    fn prepare<T: Record>(
        &self,
        training: &TrainingData<T>,
        columns: &ColumnInformation,
    ) -> Result<(LabelMap, Vec<Example>)> {
        self.settings.validate()?;
        columns.validate::<T>()?;

        let rows = training.labeled_texts(columns);
        if rows.is_empty() {
            return Err(Error::EmptyTrainingData);
        }

        let labels = LabelMap::from_rows(&rows);
        let examples = featurize(&self.settings.featurizer, &labels, &rows);

        log::info!(
            "Prepared {} training rows over {} categories",
            examples.len(),
            labels.len()
        );

        Ok((labels, examples))
    }

    /// Assign folds after a seeded shuffle, or hold out a slice when there are too many rows
    fn split(&self, examples: Vec<Example>) -> Validation {
        let mut order: Vec<usize> = (0..examples.len()).collect();
        order.shuffle(&mut StdRng::seed_from_u64(self.settings.seed));

        if examples.len() > self.settings.cross_validation_row_limit {
            let n_valid = ((examples.len() as f64) * HOLDOUT_FRACTION).ceil() as usize;
            log::info!("Using a holdout split of {n_valid} rows");

            let mut train = Vec::with_capacity(examples.len() - n_valid);
            let mut valid = Vec::with_capacity(n_valid);
            let mut slots: Vec<Option<Example>> = examples.into_iter().map(Some).collect();

            for (position, index) in order.into_iter().enumerate() {
                if let Some(example) = slots[index].take() {
                    if position < n_valid {
                        valid.push(example);
                    } else {
                        train.push(example);
                    }
                }
            }

            return Validation::Holdout { train, valid };
        }

        let k = self.settings.cross_validation_folds.min(examples.len());
        let mut folds = vec![Vec::new(); k.max(1)];
        for (position, index) in order.into_iter().enumerate() {
            folds[position % k.max(1)].push(index);
        }

        log::info!("Using {k}-fold cross-validation");

        Validation::CrossValidation { examples, folds }
    }

    /// Run rounds of trials until the budget is spent or the sweep is exhausted
    fn search<T: Record>(
        &self,
        training: &TrainingData<T>,
        columns: &ColumnInformation,
        labels: LabelMap,
        validation: Validation,
    ) -> Result<ExperimentResult> {
        let started = Instant::now();
        let deadline = started + Duration::from_secs(self.settings.max_experiment_time_secs);
        let metric = self.settings.optimizing_metric;

        let sweeps: Vec<Vec<Hyperparameters>> = self
            .settings
            .trainers
            .iter()
            .map(MulticlassTrainer::candidates)
            .collect();
        let rounds = sweeps.iter().map(Vec::len).max().unwrap_or_default();

        let mut summaries = Vec::new();
        let mut best: Option<(Hyperparameters, MulticlassMetrics, Duration, Option<Estimator>)> =
            None;

        'search: for round in 0..rounds {
            for hyperparameters in sweeps.iter().filter_map(|sweep| sweep.get(round)) {
                if Instant::now() >= deadline {
                    log::info!("Time budget spent after {} trials", summaries.len());
                    break 'search;
                }

                let trainer = hyperparameters.trainer();
                log::debug!("Trial {}: {trainer} {hyperparameters}", summaries.len() + 1);

                let trial_start = Instant::now();
                let outcome = self.trial(hyperparameters, labels.len(), &validation);
                let runtime = trial_start.elapsed();

                match outcome {
                    Ok((metrics, estimator)) => {
                        log::info!(
                            "{trainer}: macro-accuracy {:.4}, log-loss {:.4} in {runtime:.1?}",
                            metrics.macro_accuracy,
                            metrics.log_loss
                        );

                        summaries.push(RunSummary {
                            trainer,
                            hyperparameters: hyperparameters.clone(),
                            validation_metrics: Some(metrics.clone()),
                            runtime,
                            error: None,
                        });

                        let improves = best
                            .as_ref()
                            .map_or(true, |(_, incumbent, _, _)| metric.is_better(&metrics, incumbent));

                        if improves {
                            best = Some((hyperparameters.clone(), metrics, runtime, estimator));
                        }
                    }
                    Err(err) => {
                        log::warn!("{trainer} failed, skipping: {err}");

                        summaries.push(RunSummary {
                            trainer,
                            hyperparameters: hyperparameters.clone(),
                            validation_metrics: None,
                            runtime,
                            error: Some(err.to_string()),
                        });
                    }
                }
            }
        }

        let Some((hyperparameters, validation_metrics, runtime, estimator)) = best else {
            return Err(Error::NoValidRun(format!(
                "{} trials attempted in {}s",
                summaries.len(),
                self.settings.max_experiment_time_secs
            )));
        };

        let estimator = match (estimator, validation) {
            (Some(estimator), _) => estimator,
            (None, Validation::CrossValidation { examples, .. }) => {
                log::info!("Refitting {} on all rows", hyperparameters.trainer());
                self.fit(&hyperparameters, &examples, labels.len())?
            }
            (None, Validation::Holdout { train, .. }) => {
                self.fit(&hyperparameters, &train, labels.len())?
            }
        };

        log::info!(
            "Best run: {} with macro-accuracy {:.4} after {:.1?}",
            hyperparameters.trainer(),
            validation_metrics.macro_accuracy,
            started.elapsed()
        );

        let model = TrainedModel {
            input_schema: training.schema(),
            columns: columns.clone(),
            labels: labels.into_labels(),
            featurizer: self.settings.featurizer.clone(),
            estimator,
            trainer: hyperparameters.trainer(),
        };

        Ok(ExperimentResult {
            best_run: RunDetail {
                trainer: hyperparameters.trainer(),
                hyperparameters,
                validation_metrics,
                runtime,
                model,
            },
            run_summaries: summaries,
        })
    }

    /// Fit and score one candidate; holdout trials keep their estimator
    fn trial(
        &self,
        hyperparameters: &Hyperparameters,
        n_classes: usize,
        validation: &Validation,
    ) -> Result<(MulticlassMetrics, Option<Estimator>)> {
        match validation {
            Validation::Holdout { train, valid } => {
                let estimator = self.fit(hyperparameters, train, n_classes)?;
                let metrics = evaluate(&estimator, valid, n_classes)?;

                Ok((metrics, Some(estimator)))
            }
            Validation::CrossValidation { examples, folds } if folds.len() < 2 => {
                // Too few rows to hold any out: score on the training rows
                let estimator = self.fit(hyperparameters, examples, n_classes)?;
                let metrics = evaluate(&estimator, examples, n_classes)?;

                Ok((metrics, Some(estimator)))
            }
            Validation::CrossValidation { examples, folds } => {
                let mut fold_metrics = Vec::with_capacity(folds.len());

                for (i, fold) in folds.iter().enumerate() {
                    let train: Vec<Example> = folds
                        .iter()
                        .enumerate()
                        .filter(|(j, _)| *j != i)
                        .flat_map(|(_, other)| other.iter().map(|&index| examples[index].clone()))
                        .collect();
                    let valid: Vec<Example> =
                        fold.iter().map(|&index| examples[index].clone()).collect();

                    let estimator = self.fit(hyperparameters, &train, n_classes)?;
                    fold_metrics.push(evaluate(&estimator, &valid, n_classes)?);
                }

                let metrics = MulticlassMetrics::averaged(&fold_metrics)
                    .ok_or_else(|| Error::NoValidRun("no folds were evaluated".to_string()))?;

                Ok((metrics, None))
            }
        }
    }

    fn fit(
        &self,
        hyperparameters: &Hyperparameters,
        examples: &[Example],
        n_classes: usize,
    ) -> Result<Estimator> {
        hyperparameters.fit(
            examples,
            n_classes,
            self.settings.featurizer.dim(),
            self.settings.seed,
        )
    }
}

/// Featurize labeled rows, dropping rows whose label the map does not know
fn featurize(featurizer: &TextFeaturizer, labels: &LabelMap, rows: &[LabeledText]) -> Vec<Example> {
    rows.iter()
        .filter_map(|row| {
            let target = labels.id(&row.label)?;
            Some(Example::new(featurizer.featurize(&row.texts), target))
        })
        .collect()
}

/// Score an estimator on labeled examples
fn evaluate(
    estimator: &Estimator,
    examples: &[Example],
    n_classes: usize,
) -> Result<MulticlassMetrics> {
    let scorer = estimator.scorer()?;

    let mut probabilities = Vec::with_capacity(examples.len());
    for chunk in examples.chunks(EVALUATION_BATCH) {
        let features: Vec<SparseFeatures> = chunk.iter().map(|e| e.features.clone()).collect();
        probabilities.extend(scorer.probabilities_batch(&features));
    }

    let targets: Vec<usize> = examples.iter().map(|e| e.target).collect();

    Ok(MulticlassMetrics::evaluate(
        &targets,
        &probabilities,
        n_classes,
    ))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::data::tests::{columns, row, Row};

    use super::*;

    fn training() -> TrainingData<Row> {
        let mut rows = Vec::new();
        for i in 0..6 {
            rows.push(row("Coffee", &format!("STARBUCKS STORE {i}")));
            rows.push(row("Games", &format!("STEAM PURCHASE {i}")));
            rows.push(row("Music", &format!("SPOTIFY PREMIUM {i}")));
        }
        TrainingData::from_records(rows)
    }

    fn settings(seconds: u64) -> ExperimentSettings {
        ExperimentSettings::new(seconds)
            .with_trainers(vec![
                MulticlassTrainer::NaiveBayes,
                MulticlassTrainer::AveragedPerceptronOva,
            ])
            .with_cross_validation_folds(3)
            .with_featurizer(TextFeaturizer::new().with_hash_bits(8))
    }

    #[test]
    fn zero_budget_yields_no_valid_run() {
        let experiment = MulticlassExperiment::new(settings(0));

        let result = experiment.execute(&training(), &columns());

        assert!(matches!(result, Err(Error::NoValidRun(_))));
    }

    #[test]
    fn cross_validation_explores_every_candidate_and_refits() {
        let experiment = MulticlassExperiment::new(settings(60));

        let result = experiment.execute(&training(), &columns()).unwrap();

        assert_eq!(result.run_summaries.len(), 6);
        assert_eq!(result.best_run.model.labels, ["Coffee", "Games", "Music"]);
        assert!(result.best_run.validation_metrics.macro_accuracy > 0.9);
        assert_eq!(result.best_run.model.estimator.n_classes(), 3);
    }

    #[test]
    fn validation_rows_with_unknown_labels_are_skipped() {
        let experiment = MulticlassExperiment::new(settings(60));
        let validation = TrainingData::from_records(vec![
            row("Games", "STEAM PURCHASE 9"),
            row("Rent", "LANDLORD"),
        ]);

        let result = experiment
            .execute_with_validation(&training(), &validation, &columns())
            .unwrap();

        assert_eq!(
            result.best_run.validation_metrics.confusion_matrix[1].iter().sum::<usize>(),
            1
        );
    }

    #[test]
    fn validation_without_known_labels_fails() {
        let experiment = MulticlassExperiment::new(settings(60));
        let validation = TrainingData::from_records(vec![row("Rent", "LANDLORD")]);

        let result = experiment.execute_with_validation(&training(), &validation, &columns());

        assert!(matches!(result, Err(Error::NoValidRun(_))));
    }

    #[test]
    fn empty_training_data_is_rejected() {
        let experiment = MulticlassExperiment::new(settings(60));
        let training = TrainingData::from_records(vec![row("", "orphan text")]);

        assert!(matches!(
            experiment.execute(&training, &columns()),
            Err(Error::EmptyTrainingData)
        ));
    }

    #[test]
    fn large_data_uses_a_holdout_split() {
        let experiment =
            MulticlassExperiment::new(settings(60).with_cross_validation_row_limit(10));

        match experiment.split(
            (0..20)
                .map(|i| Example::new(TextFeaturizer::new().featurize(&["x"]), i % 2))
                .collect(),
        ) {
            Validation::Holdout { train, valid } => {
                assert_eq!(valid.len(), 2);
                assert_eq!(train.len(), 18);
            }
            Validation::CrossValidation { .. } => panic!("expected a holdout split"),
        }
    }

    #[test]
    fn single_row_is_scored_on_itself() {
        let experiment = MulticlassExperiment::new(settings(60));
        let training = TrainingData::from_records(vec![row("Only", "lonely text")]);

        let result = experiment.execute(&training, &columns()).unwrap();

        assert_eq!(result.best_run.model.labels, ["Only"]);
        assert_eq!(result.best_run.validation_metrics.micro_accuracy, 1.0);
    }
}
