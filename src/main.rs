//! CLI entry point for the departure planner.
//!
//! Provides subcommands for each pipeline stage (align, features, train),
//! a `run` command chaining them, and `recommend` for querying a trained model.

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveTime};
use clap::{Parser, Subcommand};
use departure_planner::config::PipelineConfig;
use departure_planner::ingest::{load_traffic, load_weather};
use departure_planner::model::FittedModel;
use departure_planner::model::estimator::train;
use departure_planner::output::{format_recommendation, read_table, recommendation_json, write_table};
use departure_planner::pipeline::align::align;
use departure_planner::pipeline::features::synthesize;
use departure_planner::pipeline::types::{FeatureRecord, HourlyRecord};
use departure_planner::recommend::{DEFAULT_INTERVAL_MINUTES, RecommendationQuery, recommend};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "departure_planner")]
#[command(about = "Predict road travel times and recommend departure times", long_about = None)]
struct Cli {
    /// JSON pipeline config (falls back to $PIPELINE_CONFIG, then built-in defaults)
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Align traffic and weather observations onto an hourly grid
    Align {
        /// Traffic observations CSV
        #[arg(long)]
        traffic: Option<PathBuf>,

        /// Weather observations CSV
        #[arg(long)]
        weather: Option<PathBuf>,

        /// Hourly table CSV to write
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Derive lag, temporal and weather-severity features from the hourly table
    Features {
        /// Hourly table CSV
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Feature table CSV to write
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Train the travel-time model and report holdout error
    Train {
        /// Feature table CSV
        #[arg(short, long)]
        features: Option<PathBuf>,

        /// Model artifact to write
        #[arg(short, long)]
        model: Option<PathBuf>,
    },
    /// Align, derive features and train in one go
    Run,
    /// Recommend the departure time with the lowest predicted travel time
    Recommend {
        /// Road segment identifier (as it appears in the traffic data)
        #[arg(long)]
        segment: String,

        /// Departure date, YYYY-MM-DD
        #[arg(long)]
        date: String,

        /// Window start, HH:MM
        #[arg(long)]
        start_time: String,

        /// Window end, HH:MM (inclusive)
        #[arg(long)]
        end_time: String,

        /// Spacing between candidate departures
        #[arg(short = 'w', long, default_value_t = DEFAULT_INTERVAL_MINUTES)]
        window_minutes: u32,

        /// Feature table CSV
        #[arg(short, long)]
        features: Option<PathBuf>,

        /// Model artifact
        #[arg(short, long)]
        model: Option<PathBuf>,

        /// Print the result as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path = std::env::var("LOG_FILE_PATH")
        .unwrap_or_else(|_| "logs/departure_planner.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("departure_planner.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.or_else(|| std::env::var("PIPELINE_CONFIG").ok());
    let config = PipelineConfig::load_or_default(config_path.as_deref())?;

    match cli.command {
        Commands::Align {
            traffic,
            weather,
            output,
        } => {
            let traffic = traffic.unwrap_or_else(|| config.paths.traffic_csv.clone());
            let weather = weather.unwrap_or_else(|| config.paths.weather_csv.clone());
            let output = output.unwrap_or_else(|| config.paths.hourly_csv.clone());
            run_align(&config, &traffic, &weather, &output)?;
        }
        Commands::Features { input, output } => {
            let input = input.unwrap_or_else(|| config.paths.hourly_csv.clone());
            let output = output.unwrap_or_else(|| config.paths.features_csv.clone());
            run_features(&input, &output)?;
        }
        Commands::Train { features, model } => {
            let features = features.unwrap_or_else(|| config.paths.features_csv.clone());
            let model = model.unwrap_or_else(|| config.paths.model.clone());
            run_train(&config, &features, &model)?;
        }
        Commands::Run => {
            let paths = &config.paths;
            run_align(&config, &paths.traffic_csv, &paths.weather_csv, &paths.hourly_csv)?;
            run_features(&paths.hourly_csv, &paths.features_csv)?;
            run_train(&config, &paths.features_csv, &paths.model)?;
        }
        Commands::Recommend {
            segment,
            date,
            start_time,
            end_time,
            window_minutes,
            features,
            model,
            json,
        } => {
            let features = features.unwrap_or_else(|| config.paths.features_csv.clone());
            let model_path = model.unwrap_or_else(|| config.paths.model.clone());

            let query = RecommendationQuery {
                segment_id: segment,
                date: NaiveDate::parse_from_str(&date, "%Y-%m-%d")
                    .with_context(|| format!("invalid --date '{date}', expected YYYY-MM-DD"))?,
                start: parse_hhmm(&start_time, "--start-time")?,
                end: parse_hhmm(&end_time, "--end-time")?,
                interval_minutes: window_minutes,
            };

            let history: Vec<FeatureRecord> = read_table(&features)
                .with_context(|| format!("reading feature table {}", features.display()))?;
            let model = FittedModel::load(&model_path)
                .with_context(|| format!("loading model {}", model_path.display()))?;

            let recommendation = recommend(&history, &model, &query)?;
            if json {
                println!("{}", recommendation_json(&recommendation)?);
            } else {
                print!("{}", format_recommendation(&recommendation));
            }
        }
    }

    Ok(())
}

fn parse_hhmm(raw: &str, flag: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(raw, "%H:%M")
        .with_context(|| format!("invalid {flag} '{raw}', expected HH:MM"))
}

#[tracing::instrument(skip_all, fields(traffic = %traffic.display(), weather = %weather.display()))]
fn run_align(config: &PipelineConfig, traffic: &Path, weather: &Path, output: &Path) -> Result<()> {
    let traffic = load_traffic(traffic, &config.traffic_columns)?;
    let weather = load_weather(weather, &config.weather_columns)?;
    let hourly = align(&traffic, &weather)?;
    write_table(output, &hourly)?;
    Ok(())
}

#[tracing::instrument(skip_all, fields(input = %input.display(), output = %output.display()))]
fn run_features(input: &Path, output: &Path) -> Result<()> {
    let hourly: Vec<HourlyRecord> = read_table(input)
        .with_context(|| format!("reading hourly table {}", input.display()))?;
    let features = synthesize(&hourly)?;
    write_table(output, &features)?;
    Ok(())
}

#[tracing::instrument(skip_all, fields(features = %features.display(), model = %model_path.display()))]
fn run_train(config: &PipelineConfig, features: &Path, model_path: &Path) -> Result<()> {
    let records: Vec<FeatureRecord> = read_table(features)
        .with_context(|| format!("reading feature table {}", features.display()))?;
    let model = train(&records, &config.estimator)?;
    model.save(model_path)?;
    info!(
        mae = model.metrics.mae,
        rmse = model.metrics.rmse,
        "Holdout error (minutes)"
    );
    Ok(())
}
