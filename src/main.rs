use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lesionscan::analysis::enhance::{ClaheParams, enhance_image};
use lesionscan::conditions::{SortKey, search_conditions};
use lesionscan::preprocess::load_image;
use lesionscan::{AppConfig, ApiResponse, DiagnosisService, Preprocessor, extract_image_features};

#[derive(Parser)]
#[command(name = "lesionscan")]
#[command(about = "Classify skin lesion images")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// JSON config file (environment variables apply when absent)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Directory holding model.onnx or model.rten
    #[arg(long, value_name = "DIR", global = true)]
    model_dir: Option<PathBuf>,

    /// Directory uploads are copied into
    #[arg(long, value_name = "DIR", global = true)]
    upload_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Classify an image and print the result
    Diagnose {
        #[arg(value_name = "IMAGE")]
        image: PathBuf,

        /// Print the JSON API response instead of text
        #[arg(long)]
        json: bool,

        /// Include color, texture and shape features
        #[arg(long)]
        features: bool,

        /// Equalize lightness before classification
        #[arg(long)]
        enhance: bool,

        /// Save preprocessing steps to directory (must be empty)
        #[arg(long, value_name = "DIR")]
        debug_out: Option<PathBuf>,
    },

    /// Print color, texture and shape features as JSON
    Features {
        #[arg(value_name = "IMAGE")]
        image: PathBuf,
    },

    /// Write a contrast-enhanced copy of an image
    Enhance {
        #[arg(value_name = "INPUT")]
        input: PathBuf,
        #[arg(value_name = "OUTPUT")]
        output: PathBuf,
    },

    /// List the conditions the classifier knows about
    Conditions {
        /// Case-insensitive name filter
        #[arg(long)]
        search: Option<String>,

        /// name, severity or prevalence
        #[arg(long, default_value = "name")]
        sort: SortKey,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("lesionscan={log_level}").into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();

    match run(&cli) {
        Ok(code) => code,
        Err(err) => {
            tracing::error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> Result<AppConfig> {
    let mut config = match &cli.config {
        Some(path) => AppConfig::from_json_file(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?,
        None => AppConfig::from_env()?,
    };
    if let Some(dir) = &cli.model_dir {
        config.classifier.model_dir = dir.clone();
    }
    if let Some(dir) = &cli.upload_dir {
        config.upload.dir = dir.clone();
    }
    Ok(config)
}

fn run(cli: &Cli) -> Result<ExitCode> {
    match &cli.command {
        Command::Diagnose {
            image,
            json,
            features,
            enhance,
            debug_out,
        } => {
            if !image.exists() {
                anyhow::bail!("Input file does not exist: {}", image.display());
            }
            let mut config = load_config(cli)?;
            config.extract_features |= *features;

            let mut preprocessor = Preprocessor::new(config.classifier.input_size);
            if *enhance {
                preprocessor = preprocessor.with_enhancement(ClaheParams::default());
            }
            if let Some(dir) = debug_out {
                preprocessor = preprocessor.with_debug(dir.clone());
            }
            let service = DiagnosisService::new(&config)?.with_preprocessor(preprocessor);

            let response = ApiResponse::from_result(service.diagnose_file(image));
            if *json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else if let Some(report) = &response.result {
                print!("{}", report.render_text());
            } else if let Some(error) = &response.error {
                eprintln!("{error}");
            }

            Ok(if response.success {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }

        Command::Features { image } => {
            let img = load_image(image)?;
            let report = extract_image_features(&img);
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(match report.error() {
                Some(_) => ExitCode::FAILURE,
                None => ExitCode::SUCCESS,
            })
        }

        Command::Enhance { input, output } => {
            if enhance_image(input, output) {
                println!("Enhanced image written to {}", output.display());
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::FAILURE)
            }
        }

        Command::Conditions { search, sort } => {
            let found = search_conditions(search.as_deref().unwrap_or(""), *sort);
            if found.is_empty() {
                println!("No conditions match.");
            }
            for condition in found {
                println!(
                    "{:<28} severity: {:<10} prevalence: {}",
                    condition.name, condition.severity, condition.prevalence
                );
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}
