#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]

use clap::{Args, CommandFactory, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process;

use agriprice::config::Settings;
use agriprice::data::load_table;
use agriprice::pipeline::{PricingError, predict_table, train_and_save};
use agriprice::store::{ModelStore, load_state};
use agriprice::types::PriceQuantiles;

#[derive(Args)]
pub struct TrainArgs {
    /// Training CSV with every feature column plus price_per_kg
    #[arg(long)]
    pub csv: Option<PathBuf>,

    /// Where to write the trained model
    #[arg(long)]
    pub out: Option<PathBuf>,
}

#[derive(Args)]
pub struct PredictArgs {
    /// CSV with the feature columns of the lots to price
    pub input: PathBuf,

    /// Trained model to load
    #[arg(long)]
    pub model: Option<PathBuf>,

    /// Output file for the tab-separated predictions
    #[arg(long, default_value = "predictions.tsv")]
    pub out: PathBuf,
}

#[derive(Args)]
pub struct InspectArgs {
    /// Trained model to load
    #[arg(long)]
    pub model: Option<PathBuf>,
}

#[derive(Parser)]
#[command(
    name = "agriprice",
    about = "Quantile price bands for agricultural commodity lots",
    long_about = "Trains a linear price model with residual-quantile bands on historical \
                 commodity sales and prices new lots with p10/p50/p90 estimates."
)]
struct Cli {
    /// Optional TOML settings file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Train the price model (outputs: models/model.toml)")]
    Train(TrainArgs),
    #[command(about = "Price the lots in a CSV file (outputs: predictions.tsv)")]
    Predict(PredictArgs),
    #[command(about = "Show the design columns and coefficients of a trained model")]
    Inspect(InspectArgs),
}

fn train(settings: Settings, args: TrainArgs) -> Result<(), PricingError> {
    let csv = args.csv.unwrap_or(settings.training_csv);
    let out = args.out.unwrap_or(settings.model_path);

    println!("Loading training data from: {}", csv.display());
    let report = train_and_save(&settings.schema, &csv, &out)?;

    let m = &report.metrics;
    println!("MAE (p50):          {:.4}", m.mae_p50);
    println!("Pinball loss (q10): {:.4}", m.pinball_loss_q10);
    println!("Pinball loss (q50): {:.4}", m.pinball_loss_q50);
    println!("Pinball loss (q90): {:.4}", m.pinball_loss_q90);
    println!("Model saved to: {}", report.model_path.display());
    Ok(())
}

fn predict(settings: Settings, args: PredictArgs) -> Result<(), Box<dyn std::error::Error>> {
    let model_path = args.model.unwrap_or(settings.model_path);

    println!("Loading model from: {}", model_path.display());
    let store = ModelStore::new(&model_path, settings.schema);
    store.reload().map_err(PricingError::from)?;

    println!("Loading prediction data from: {}", args.input.display());
    let table = load_table(&args.input).map_err(PricingError::from)?;
    let predictions = predict_table(&store, &table)?;

    save_predictions(&predictions, &args.out)?;
    println!(
        "Predictions for {} lots saved to: {}",
        predictions.len(),
        args.out.display()
    );
    Ok(())
}

fn inspect(settings: Settings, args: InspectArgs) -> Result<(), PricingError> {
    let model_path = args.model.unwrap_or(settings.model_path);
    let state = load_state(&model_path)?;

    println!("Model: {}", model_path.display());
    println!("{:<40} {:>14.6}", "(intercept)", state.intercept());
    for (name, coefficient) in state
        .design_columns()
        .as_slice()
        .iter()
        .zip(state.coefficients().iter())
    {
        println!("{name:<40} {coefficient:>14.6}");
    }
    println!(
        "Residual offsets: q10 = {:.6}, q90 = {:.6}",
        state.resid_q10(),
        state.resid_q90()
    );
    Ok(())
}

/// Writes one tab-separated line per lot, numbered from 1 in input order.
fn save_predictions(predictions: &[PriceQuantiles], path: &Path) -> Result<(), csv::Error> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(path)?;
    writer.write_record(["row", "p10", "p50", "p90", "suggested_price"])?;
    for (i, p) in predictions.iter().enumerate() {
        writer.write_record([
            (i + 1).to_string(),
            format!("{:.6}", p.p10),
            format!("{:.6}", p.p50),
            format!("{:.6}", p.p90),
            format!("{:.6}", p.suggested_price),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let Cli { config, command } = Cli::parse();

    let settings = match Settings::load(config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    let result: Result<(), Box<dyn std::error::Error>> = match command {
        Some(Commands::Train(args)) => train(settings, args).map_err(Into::into),
        Some(Commands::Predict(args)) => predict(settings, args),
        Some(Commands::Inspect(args)) => inspect(settings, args).map_err(Into::into),
        None => {
            let _ = Cli::command().print_help();
            println!();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
