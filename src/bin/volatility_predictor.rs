//! Implied-volatility forecaster.
//!
//! Invoked as a one-shot subprocess by the trading engine. The engine reads
//! only the LAST stdout line: a compact JSON object with the current and
//! predicted average IV, the percent change and the direction. Logs go to
//! stderr.
//!
//! # Usage
//! ```sh
//! volatility_predictor --train
//! volatility_predictor --train --csv data/tsla_vol_surface.csv
//! volatility_predictor --predict data/tsla_vol_surface.csv
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use signalbridge::application::forecaster::{
    ForecastTrainSummary, ForecasterConfig, VolForecaster,
};
use signalbridge::application::synthetic;
use signalbridge::domain::surface::SurfaceRow;
use signalbridge::infrastructure::dataset;
use signalbridge::interfaces::protocol;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Force (re)training and persist the refreshed artifact
    #[arg(long)]
    train: bool,

    /// Surface table (CSV) to train on. A synthetic surface is generated
    /// and saved when absent.
    #[arg(long, value_name = "FILE")]
    csv: Option<PathBuf>,

    /// Forecast from the surface table at this path
    #[arg(long, value_name = "FILE")]
    predict: Option<PathBuf>,

    /// Never train implicitly; forecasting without an artifact becomes an error
    #[arg(long)]
    no_train: bool,

    /// Directory holding the persisted model artifacts
    #[arg(long, default_value = "models")]
    model_dir: PathBuf,

    /// Where the generated synthetic surface is saved when no --csv is given
    #[arg(long, default_value = "data/synthetic_vol_surface.csv")]
    synthetic_out: PathBuf,
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
    if !args.train && args.predict.is_none() {
        println!("Usage:");
        println!("  Train model:     volatility_predictor --train [--csv surface.csv]");
        println!("  Make prediction: volatility_predictor --predict surface.csv");
        return Ok(());
    }

    let mut forecaster = VolForecaster::open(&args.model_dir, ForecasterConfig::default())
        .context("opening forecaster artifact")?;

    if args.train {
        let summary = train(&mut forecaster, &args)?;
        print_report(&summary);
    } else if !forecaster.is_trained() && !args.no_train {
        println!("Model not trained. Training first...");
        train(&mut forecaster, &args)?;
    }

    if let Some(path) = &args.predict {
        let rows = dataset::load_surface_csv(path)?;
        let forecast = forecaster.predict(&rows)?;

        println!("Volatility Prediction Results:");
        println!("Current IV: {:.3}", forecast.current_avg_iv);
        println!("Predicted IV: {:.3}", forecast.predicted_avg_iv);
        println!("Change: {:.2}%", forecast.change_percent);
        println!("Direction: {}", forecast.direction);
        println!("{}", protocol::forecast_line(&forecast));
    }

    Ok(())
}

fn train(forecaster: &mut VolForecaster, args: &Args) -> Result<ForecastTrainSummary> {
    let rows: Vec<SurfaceRow> = match &args.csv {
        Some(path) => dataset::load_surface_csv(path)?,
        None => {
            println!("Generating synthetic volatility data...");
            let config = *forecaster.config();
            let rows = synthetic::vol_surface(
                config.synthetic_days,
                config.strikes_per_day,
                synthetic::DEFAULT_SEED,
            );
            dataset::save_surface_csv(&args.synthetic_out, &rows)?;
            println!(
                "Synthetic surface saved to {}",
                args.synthetic_out.display()
            );
            rows
        }
    };
    println!("Training volatility predictor...");
    Ok(forecaster.train(&rows)?)
}

fn print_report(summary: &ForecastTrainSummary) {
    println!("Prepared {} training windows", summary.windows);
    if let Some(stats) = summary.final_stats() {
        println!(
            "Final training loss: {:.4} (mae {:.4})",
            stats.train_mse, stats.train_mae
        );
        if let (Some(val_mse), Some(val_mae)) = (stats.val_mse, stats.val_mae) {
            println!("Final validation loss: {:.4} (mae {:.4})", val_mse, val_mae);
        }
    }
}
