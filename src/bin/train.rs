//! Command line tool to train a classifier for one dataset

use std::path::PathBuf;

use anyhow::{anyhow, Result};
use burn::config::Config as _;
use generic_classifier::{
    automl::ExperimentSettings,
    datasets::{gitmo, transactions, Dataset},
    Record, Trainer, TrainingData,
};
use pico_args::Arguments;

const HELP: &str = "\
Usage: train DATASET [OPTIONS]

Arguments:
  DATASET              The dataset to use ('transactions' or 'gitmo')

Options:
  -h, --help           Print help
  -t, --time           Training budget in seconds (defaults to the dataset's budget)
  -d, --data-dir       The path to the top-level data directory (defaults to 'data')
  -m, --model          Where to write the model (defaults to the dataset's model file)
  -s, --settings       An experiment settings JSON file to start from
";

#[derive(Debug)]
struct Args {
    dataset: String,
    time: Option<u64>,
    data_dir: String,
    model: Option<PathBuf>,
    settings: Option<PathBuf>,
}

impl Args {
    fn parse() -> Result<Option<Self>> {
        let mut pargs = Arguments::from_env();

        // Help has a higher priority and should be handled separately.
        if pargs.contains(["-h", "--help"]) {
            return Ok(None);
        }

        let args = Args {
            time: pargs.opt_value_from_str(["-t", "--time"])?,
            data_dir: pargs
                .opt_value_from_str(["-d", "--data-dir"])?
                .unwrap_or_else(|| "data".to_string()),
            model: pargs.opt_value_from_str(["-m", "--model"])?,
            settings: pargs.opt_value_from_str(["-s", "--settings"])?,
            dataset: pargs.free_from_str().map_err(|e| match e {
                pico_args::Error::MissingArgument => anyhow!("Missing required argument: DATASET"),
                _ => anyhow!("{}", e),
            })?,
        };

        Ok(Some(args))
    }
}

fn main() -> Result<()> {
    pretty_env_logger::init();

    let Some(args) = Args::parse()? else {
        print!("{}", HELP);
        return Ok(());
    };

    let dataset = Dataset::try_from(args.dataset.as_str())?;

    match dataset {
        Dataset::Transactions => train(transactions::trainer(), dataset, &args),
        Dataset::Gitmo => train(gitmo::trainer(), dataset, &args),
    }
}

fn train<T: Record>(trainer: Trainer<T>, dataset: Dataset, args: &Args) -> Result<()> {
    let mut trainer = match &args.settings {
        Some(path) => trainer.with_base_settings(
            ExperimentSettings::load(path)
                .map_err(|e| anyhow!("Unable to load settings file: {}", e))?,
        ),
        None => trainer,
    };

    let training = TrainingData::<T>::from_csv(dataset.data_path(&args.data_dir))?;
    let time = args.time.unwrap_or_else(|| dataset.training_time_secs());

    let run = trainer.auto_train(&training, time, None)?;

    let model_path = args
        .model
        .clone()
        .unwrap_or_else(|| dataset.model_path("."));
    trainer.save_model(&model_path, &run.model)?;

    let metrics = &run.validation_metrics;
    println!(
        "\n=== {dataset} ===\
         \n- Trainer: {}\
         \n- Hyper-parameters: {}\
         \n- Macro-accuracy: {:.4}\
         \n- Micro-accuracy: {:.4}\
         \n- Log-loss: {:.4}\
         \n- Model: {}\
         \n================",
        run.trainer,
        run.hyperparameters,
        metrics.macro_accuracy,
        metrics.micro_accuracy,
        metrics.log_loss,
        model_path.display()
    );

    Ok(())
}
