//! Signal profitability scorer.
//!
//! Invoked as a one-shot subprocess by the trading engine. The engine reads
//! only the LAST stdout line: the classifier confidence with three decimal
//! places. Everything else (training reports, human summaries) is printed
//! before it; logs go to stderr.
//!
//! # Usage
//! ```sh
//! signal_classifier --train
//! signal_classifier --predict signal.json
//! signal_classifier '{"edge_percent": 15.5, "delta": 0.65, ...}'
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use signalbridge::application::classifier::{ClassifierConfig, SignalClassifier, TrainSummary};
use signalbridge::application::synthetic;
use signalbridge::domain::signal::{LabeledSignal, SignalFeatures};
use signalbridge::infrastructure::dataset;
use signalbridge::interfaces::protocol;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Force (re)training and persist the refreshed artifact
    #[arg(long)]
    train: bool,

    /// Score a JSON feature record loaded from this file
    #[arg(long, value_name = "FILE")]
    predict: Option<PathBuf>,

    /// Labeled training corpus (CSV). Synthetic bootstrap data is used when absent.
    #[arg(long, value_name = "FILE")]
    data: Option<PathBuf>,

    /// Never train implicitly; scoring without an artifact becomes an error
    #[arg(long)]
    no_train: bool,

    /// Directory holding the persisted model artifacts
    #[arg(long, default_value = "models")]
    model_dir: PathBuf,

    /// Inline JSON feature record
    features: Option<String>,
}

fn main() -> Result<()> {
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();

    let args = Args::parse();
    if !args.train && args.predict.is_none() && args.features.is_none() {
        println!("Usage:");
        println!("  Train model:     signal_classifier --train [--data corpus.csv]");
        println!("  Classify file:   signal_classifier --predict signal.json");
        println!("  Classify inline: signal_classifier '<json signal features>'");
        return Ok(());
    }

    let mut classifier = SignalClassifier::open(&args.model_dir, ClassifierConfig::default())
        .context("opening classifier artifact")?;

    if args.train {
        let summary = train(&mut classifier, &args)?;
        print_report(&summary);
    } else if !classifier.is_trained() && !args.no_train {
        println!("Model not trained. Training first...");
        train(&mut classifier, &args)?;
    }

    if let Some(path) = &args.predict {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading feature record {}", path.display()))?;
        let features = SignalFeatures::from_json_str(&raw)?;
        let prediction = classifier.predict(&features)?;
        println!("{}", protocol::confidence_line(prediction.confidence));
        return Ok(());
    }

    if let Some(raw) = &args.features {
        let features = SignalFeatures::from_json_str(raw)?;
        let prediction = classifier.predict(&features)?;
        println!(
            "ML Confidence: {}",
            protocol::confidence_line(prediction.confidence)
        );
        println!("Recommendation: {}", prediction.recommendation);
        println!("{}", protocol::confidence_line(prediction.confidence));
    }

    Ok(())
}

fn train(classifier: &mut SignalClassifier, args: &Args) -> Result<TrainSummary> {
    let corpus: Vec<LabeledSignal> = match &args.data {
        Some(path) => dataset::load_signal_csv(path)?,
        None => {
            println!("Generating synthetic training data...");
            synthetic::signal_corpus(classifier.config().corpus_size, synthetic::DEFAULT_SEED)
        }
    };
    println!("Training signal classifier...");
    Ok(classifier.train(&corpus)?)
}

fn print_report(summary: &TrainSummary) {
    println!(
        "Model trained on {} samples, evaluated on {} (accuracy {:.2})",
        summary.train_samples, summary.test_samples, summary.accuracy
    );
    println!();
    println!("{:<16} {:>9} {:>9} {:>9} {:>9}", "", "precision", "recall", "f1", "support");
    for class in &summary.per_class {
        println!(
            "{:<16} {:>9.2} {:>9.2} {:>9.2} {:>9}",
            class.label, class.precision, class.recall, class.f1, class.support
        );
    }
    println!();
}
