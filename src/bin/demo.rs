//! Trains (when needed) and queries both demo classifiers

use std::fmt::Display;

use anyhow::Result;
use generic_classifier::{
    datasets::{
        gitmo::{self, GitComment},
        transactions::{self, TransactionData},
        Dataset,
    },
    Predictor, Record, Trainer, TrainingData,
};
use pico_args::Arguments;

const HELP: &str = "\
Usage: demo [OPTIONS]

Options:
  -h, --help           Print help
  --retrain            Train both models even if the model files already exist
  -d, --data-dir       The directory holding the training CSV files (defaults to 'data')
  -o, --model-dir      The directory to read and write model files (defaults to '.')
";

/// Macro-accuracy under which a trained model is reported as weak
const LOW_ACCURACY: f64 = 0.7;

#[derive(Debug)]
struct Args {
    retrain: bool,
    data_dir: String,
    model_dir: String,
}

impl Args {
    fn parse() -> Result<Option<Self>> {
        let mut pargs = Arguments::from_env();

        // Help has a higher priority and should be handled separately.
        if pargs.contains(["-h", "--help"]) {
            return Ok(None);
        }

        let args = Args {
            retrain: pargs.contains("--retrain"),
            data_dir: pargs
                .opt_value_from_str(["-d", "--data-dir"])?
                .unwrap_or_else(|| "data".to_string()),
            model_dir: pargs
                .opt_value_from_str(["-o", "--model-dir"])?
                .unwrap_or_else(|| ".".to_string()),
        };

        Ok(Some(args))
    }
}

fn main() -> Result<()> {
    let mut logger = pretty_env_logger::formatted_builder();
    logger.parse_filters(&std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()));
    logger.init();

    let Some(args) = Args::parse()? else {
        print!("{}", HELP);
        return Ok(());
    };

    // Generated bank transactions are clean data, so accuracy should be high
    let dataset = Dataset::Transactions;
    let model_path = dataset.model_path(&args.model_dir);
    if !model_path.exists() || args.retrain {
        println!(
            "Training bank transactions model (~{} seconds)...",
            dataset.training_time_secs()
        );
        train(transactions::trainer(), &args, dataset)?;
    }

    println!();
    println!("Predictions for bank transactions model");
    let mut predictor = Predictor::<TransactionData>::new();
    predictor.load_from_file_path(&model_path)?;

    predict(&mut predictor, &TransactionData::named("Runolfsson"), false)?;
    predict(
        &mut predictor,
        &TransactionData::named("PAYPAL *Gerlach 123456789"),
        true,
    )?;

    println!();
    println!();

    // Commit messages are noisy, expect weaker results
    let dataset = Dataset::Gitmo;
    let model_path = dataset.model_path(&args.model_dir);
    if !model_path.exists() || args.retrain {
        println!(
            "Training gitmo model (~{} seconds)...",
            dataset.training_time_secs()
        );
        train(gitmo::trainer(), &args, dataset)?;
    }

    println!();
    println!("Predictions for gitmo model");
    let mut predictor = Predictor::<GitComment>::new();
    predictor.load_from_file_path(&model_path)?;

    predict(&mut predictor, &GitComment::message("Initial commit"), false)?;
    predict(&mut predictor, &GitComment::message("Updated button UI"), true)?;

    Ok(())
}

fn train<T: Record>(mut trainer: Trainer<T>, args: &Args, dataset: Dataset) -> Result<()> {
    let training = TrainingData::<T>::from_csv(dataset.data_path(&args.data_dir))?;

    let run = trainer.auto_train(&training, dataset.training_time_secs(), None)?;
    if run.validation_metrics.macro_accuracy < LOW_ACCURACY {
        log::warn!(
            "The model accuracy is quite low at {:.4}",
            run.validation_metrics.macro_accuracy
        );
    }

    trainer.save_model(dataset.model_path(&args.model_dir), &run.model)?;

    Ok(())
}

fn predict<T: Record + Display>(
    predictor: &mut Predictor<T>,
    input: &T,
    show_details: bool,
) -> Result<()> {
    let prediction = predictor.predict(input)?;
    println!(
        "Prediction {input} -> {} ({:.2}%)",
        prediction.label.trim(),
        prediction.max_score() * 100.0
    );

    if show_details {
        for (label, score) in predictor.prediction_list(input)?.iter() {
            println!("  {label} -> {:.2}%", score * 100.0);
        }
    }

    Ok(())
}
