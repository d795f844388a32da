use std::{
    fs::File,
    io::{BufWriter, Write},
    marker::PhantomData,
    path::Path,
};

use crate::{
    automl::{ExperimentSettings, MulticlassExperiment, MulticlassMetric, RunDetail},
    data::{ColumnInformation, DataSchema, Record, TrainingData},
    error::{Error, Result},
    models::MulticlassTrainer,
};

use super::model::TrainedModel;

type Override = Box<dyn Fn(&mut ExperimentSettings, &ColumnInformation) + Send + Sync>;

/// Trains text classifiers over records of type `T`
///
/// The trainer is parametrised by the column mapping alone. Task specific tweaks to the
/// experiment are registered as overrides and applied on every `auto_train` call.
pub struct Trainer<T: Record> {
    columns: ColumnInformation,
    base_settings: Option<ExperimentSettings>,
    overrides: Vec<Override>,
    training_schema: Option<DataSchema>,
    _record: PhantomData<fn(&T)>,
}

impl<T: Record> Trainer<T> {
    /// Create a trainer for the given label and text columns
    pub fn new(columns: ColumnInformation) -> Self {
        Self {
            columns,
            base_settings: None,
            overrides: Vec::new(),
            training_schema: None,
            _record: PhantomData,
        }
    }

    /// Start every experiment from these settings instead of the defaults
    ///
    /// The time budget still comes from `auto_train`, and the overrides still run afterwards.
    pub fn with_base_settings(mut self, settings: ExperimentSettings) -> Self {
        self.base_settings = Some(settings);
        self
    }

    /// Adjust the experiment settings before every run
    pub fn with_experiment_overrides<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut ExperimentSettings, &ColumnInformation) + Send + Sync + 'static,
    {
        self.overrides.push(Box::new(f));
        self
    }

    /// Never try the given trainer
    pub fn excluding(self, trainer: MulticlassTrainer) -> Self {
        self.with_experiment_overrides(move |settings, _| settings.remove_trainer(trainer))
    }

    /// The label and text columns
    pub fn columns(&self) -> &ColumnInformation {
        &self.columns
    }

    /// The schema of the data the trainer was last fit on
    pub fn training_schema(&self) -> Option<&DataSchema> {
        self.training_schema.as_ref()
    }

    /// The settings an experiment with the given budget would run with
    pub fn experiment_settings(&self, max_time_secs: u64) -> ExperimentSettings {
        let mut settings = match &self.base_settings {
            Some(base) => {
                let mut settings = base.clone();
                settings.max_experiment_time_secs = max_time_secs;
                settings
            }
            None => ExperimentSettings::new(max_time_secs)
                .with_optimizing_metric(MulticlassMetric::MacroAccuracy),
        };

        for f in &self.overrides {
            f(&mut settings, &self.columns);
        }

        settings
    }

    /// Search for the best classifier within `max_time_secs`
    ///
    /// With `validation` every trial is scored on it; otherwise the experiment cross-validates
    /// on the training data.
    pub fn auto_train(
        &mut self,
        training: &TrainingData<T>,
        max_time_secs: u64,
        validation: Option<&TrainingData<T>>,
    ) -> Result<RunDetail> {
        self.columns.validate::<T>()?;
        self.training_schema = Some(training.schema());

        let settings = self.experiment_settings(max_time_secs);
        log::info!(
            "Training on '{}' for up to {max_time_secs}s with {} trainers",
            self.columns.label_column_name,
            settings.trainers.len()
        );

        let experiment = MulticlassExperiment::new(settings);
        let result = match validation {
            Some(validation) => {
                experiment.execute_with_validation(training, validation, &self.columns)?
            }
            None => experiment.execute(training, &self.columns)?,
        };

        log::debug!("{} trials completed", result.run_summaries.len());

        Ok(result.best_run)
    }

    /// Save a model to a file, stamped with the schema of the training data
    pub fn save_model(&self, path: impl AsRef<Path>, model: &TrainedModel) -> Result<()> {
        let schema = self.training_schema.as_ref().ok_or(Error::SchemaUnavailable)?;
        let path = path.as_ref();

        model.save_with_schema(BufWriter::new(File::create(path)?), schema)?;
        log::info!("Saved model to {}", path.display());

        Ok(())
    }

    /// Save a model to a stream, stamped with the schema of the training data
    pub fn save_model_to_writer<W: Write>(&self, writer: W, model: &TrainedModel) -> Result<()> {
        let schema = self.training_schema.as_ref().ok_or(Error::SchemaUnavailable)?;

        model.save_with_schema(writer, schema)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::{
        data::tests::{columns, row, Row},
        featurize::TextFeaturizer,
        pipelines::text_classification::model::tests::model,
    };

    use super::*;

    fn fast(trainer: Trainer<Row>) -> Trainer<Row> {
        trainer.with_experiment_overrides(|settings, _| {
            settings.trainers = vec![MulticlassTrainer::NaiveBayes];
            settings.cross_validation_folds = 2;
            settings.featurizer = TextFeaturizer::new().with_hash_bits(8);
        })
    }

    fn training() -> TrainingData<Row> {
        TrainingData::from_records(vec![
            row("Games", "Runolfsson"),
            row("Music", "PAYPAL *Gerlach 123456789"),
            row("Games", "Runolfsson and Sons"),
            row("Music", "PAYPAL *Gerlach 987654321"),
        ])
    }

    #[test]
    fn saving_before_training_fails() {
        let trainer = Trainer::<Row>::new(columns());

        assert!(matches!(
            trainer.save_model_to_writer(Vec::new(), &model()),
            Err(Error::SchemaUnavailable)
        ));
    }

    #[test]
    fn overrides_apply_in_order() {
        let trainer = Trainer::<Row>::new(columns())
            .excluding(MulticlassTrainer::AveragedPerceptronOva)
            .with_experiment_overrides(|settings, columns| {
                assert_eq!(columns.label_column_name, "label");
                settings.seed = 7;
            });

        let settings = trainer.experiment_settings(30);

        assert_eq!(settings.max_experiment_time_secs, 30);
        assert_eq!(settings.seed, 7);
        assert!(!settings
            .trainers
            .contains(&MulticlassTrainer::AveragedPerceptronOva));
    }

    #[test]
    fn base_settings_run_before_the_overrides() {
        let base = ExperimentSettings::new(5)
            .with_seed(3)
            .with_optimizing_metric(MulticlassMetric::LogLoss);
        let trainer = Trainer::<Row>::new(columns())
            .excluding(MulticlassTrainer::AveragedPerceptronOva)
            .with_base_settings(base);

        let settings = trainer.experiment_settings(30);

        assert_eq!(settings.max_experiment_time_secs, 30);
        assert_eq!(settings.seed, 3);
        assert_eq!(settings.optimizing_metric, MulticlassMetric::LogLoss);
        assert!(!settings
            .trainers
            .contains(&MulticlassTrainer::AveragedPerceptronOva));
    }

    #[test]
    fn training_records_the_schema() {
        let mut trainer = fast(Trainer::<Row>::new(columns()));

        let run = trainer.auto_train(&training(), 30, None).unwrap();

        assert_eq!(trainer.training_schema(), Some(&DataSchema::of::<Row>()));
        assert_eq!(run.trainer, MulticlassTrainer::NaiveBayes);

        let mut bytes = Vec::new();
        trainer.save_model_to_writer(&mut bytes, &run.model).unwrap();
        assert_eq!(
            TrainedModel::load(bytes.as_slice()).unwrap().input_schema,
            DataSchema::of::<Row>()
        );
    }

    #[test]
    fn invalid_columns_fail_before_training() {
        let mut trainer = Trainer::<Row>::new(ColumnInformation::new("label").with_text_column("memo"));

        assert!(matches!(
            trainer.auto_train(&training(), 30, None),
            Err(Error::UnknownColumn { .. })
        ));
        assert!(trainer.training_schema().is_none());
    }
}
