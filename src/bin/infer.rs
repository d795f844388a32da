//! Command line tool for inference with a saved classifier

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use generic_classifier::{
    datasets::{gitmo::GitComment, transactions::TransactionData, Dataset},
    Predictor, Record,
};
use pico_args::Arguments;

const HELP: &str = "\
Usage: infer DATASET TEXT... [OPTIONS]

Arguments:
  DATASET              The dataset the model was trained on ('transactions' or 'gitmo')
  TEXT                 One or more texts to classify

Options:
  -h, --help           Print help
  -m, --model          The model file (defaults to the dataset's model file)
  --details            Print the score of every category
";

#[derive(Debug)]
struct Args {
    /// Prints the usage menu
    help: bool,

    /// The dataset the model belongs to
    dataset: String,

    /// The model file
    model: Option<PathBuf>,

    /// Print every category score
    details: bool,

    /// The texts to classify
    texts: Vec<String>,
}

fn parse_args() -> Result<Args, pico_args::Error> {
    let mut pargs = Arguments::from_env();

    let help = pargs.contains(["-h", "--help"]);
    let details = pargs.contains("--details");
    let model = pargs.opt_value_from_str(["-m", "--model"])?;

    if help {
        return Ok(Args {
            help,
            dataset: String::new(),
            model,
            details,
            texts: Vec::new(),
        });
    }

    let dataset = pargs.free_from_str()?;
    let texts = pargs
        .finish()
        .into_iter()
        .map(|text| text.to_string_lossy().into_owned())
        .collect();

    Ok(Args {
        help,
        dataset,
        model,
        details,
        texts,
    })
}

fn main() -> Result<()> {
    pretty_env_logger::init();

    let args = parse_args()?;

    if args.help {
        println!("{}", HELP);
        return Ok(());
    }

    if args.texts.is_empty() {
        return Err(anyhow!("Nothing to classify: pass at least one TEXT"));
    }

    let dataset = Dataset::try_from(args.dataset.as_str())?;
    let model = args
        .model
        .clone()
        .unwrap_or_else(|| dataset.model_path("."));

    match dataset {
        Dataset::Transactions => infer(&model, &args, |text| TransactionData::named(text)),
        Dataset::Gitmo => infer(&model, &args, |text| GitComment::message(text)),
    }
}

fn infer<T, F>(model: &Path, args: &Args, record: F) -> Result<()>
where
    T: Record,
    F: Fn(String) -> T,
{
    let mut predictor = Predictor::<T>::new();
    predictor
        .load_from_file_path(model)
        .map_err(|e| anyhow!("Unable to load model {}: {}", model.display(), e))?;

    for (i, text) in args.texts.iter().enumerate() {
        let input = record(text.clone());
        let prediction = predictor.predict(&input)?;

        println!(
            "\n=== Item {i} ===\
             \n- Text: {text}\
             \n- Class: {}\
             \n- Score: {:.2}%\
             \n================",
            prediction.label,
            prediction.max_score() * 100.0
        );

        if args.details {
            for (label, score) in predictor.prediction_list(&input)?.iter() {
                println!("  {label} -> {:.2}%", score * 100.0);
            }
        }
    }

    Ok(())
}
