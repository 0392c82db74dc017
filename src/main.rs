//! Crop Recommender CLI
//!
//! Trains the crop classifier, evaluates and inspects artifacts, and serves
//! single predictions from the command line.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use crop_recommender::artifact::{migrate, ModelArtifact};
use crop_recommender::backend::{backend_name, default_device, DefaultBackend, TrainingBackend};
use crop_recommender::config::{load_toml_config, PipelineConfig};
use crop_recommender::dataset::{load_csv, split, CropFeatures, EncodedDataset, IdealConditions};
use crop_recommender::evaluation::Evaluator;
use crop_recommender::inference::{ErrorResponse, InferenceService};
use crop_recommender::model::ArchitectureDescriptor;
use crop_recommender::training::run_training;
use crop_recommender::utils::logging::{init_logging, LogConfig, LogLevel};
use crop_recommender::utils::{format_duration, format_progress_bar};
use crop_recommender::FEATURE_NAMES;

/// Crop recommendation from soil and climate measurements
#[derive(Parser, Debug)]
#[command(name = "crop_recommender")]
#[command(version)]
#[command(about = "Crop recommendation classifier built with Burn", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long, default_value = "false", conflicts_with = "verbose")]
    quiet: bool,

    /// Log level (trace, debug, info, warn, error); overrides -v/-q
    #[arg(long)]
    log_level: Option<String>,

    /// Disable ANSI colors in logs and output
    #[arg(long, default_value = "false")]
    no_color: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Train a classifier and write the artifact and training report
    Train {
        /// TOML pipeline config (defaults are used when omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Training CSV
        #[arg(short, long)]
        data: Option<PathBuf>,

        /// Artifact output path
        #[arg(short, long)]
        artifact: Option<PathBuf>,

        /// Training report output path
        #[arg(short, long)]
        report: Option<PathBuf>,

        /// Maximum number of epochs
        #[arg(short, long)]
        epochs: Option<usize>,

        /// Batch size for training
        #[arg(short, long)]
        batch_size: Option<usize>,

        /// Learning rate
        #[arg(short, long)]
        learning_rate: Option<f64>,

        /// Seed of the held-out split
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Evaluate an artifact on the held-out part of a CSV
    Evaluate {
        /// Path to the model artifact
        #[arg(short, long, default_value = "output/crop_model.json")]
        artifact: PathBuf,

        /// Path to the CSV
        #[arg(short, long, default_value = "data/Crop_recommendation.csv")]
        data: PathBuf,

        /// Held-out fraction (must match training)
        #[arg(long, default_value = "0.2")]
        test_fraction: f64,

        /// Split seed (must match training)
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Directory for confusion matrix and ROC CSV exports
        #[arg(long)]
        export_dir: Option<PathBuf>,
    },

    /// Recommend a crop for one set of measurements
    Predict {
        /// Path to the model artifact
        #[arg(short, long, default_value = "output/crop_model.json")]
        artifact: PathBuf,

        /// JSON request body, e.g. '{"N": 90, "P": 42, ...}'
        #[arg(long, conflicts_with_all = ["n", "p", "k", "temperature", "humidity"])]
        json: Option<String>,

        /// Nitrogen
        #[arg(short = 'N', long = "nitrogen")]
        n: Option<f64>,

        /// Phosphorus
        #[arg(short = 'P', long = "phosphorus")]
        p: Option<f64>,

        /// Potassium
        #[arg(short = 'K', long = "potassium")]
        k: Option<f64>,

        /// Temperature in degrees Celsius
        #[arg(short, long, allow_hyphen_values = true)]
        temperature: Option<f64>,

        /// Relative humidity in percent
        #[arg(long)]
        humidity: Option<f64>,

        /// CSV used to check the input against the recommended crop's ideal ranges
        #[arg(short, long)]
        data: Option<PathBuf>,
    },

    /// Print the per-crop feature ranges of a CSV
    IdealConditions {
        /// Path to the CSV
        #[arg(short, long, default_value = "data/Crop_recommendation.csv")]
        data: PathBuf,

        /// Only print this crop
        #[arg(short, long)]
        crop: Option<String>,
    },

    /// Re-wrap an artifact's parameters in a new architecture descriptor
    Migrate {
        /// Artifact to migrate
        #[arg(short, long)]
        artifact: PathBuf,

        /// TOML architecture descriptor
        #[arg(long)]
        architecture: PathBuf,

        /// Output path of the migrated artifact
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Show artifact metadata
    Inspect {
        /// Path to the model artifact
        #[arg(short, long, default_value = "output/crop_model.json")]
        artifact: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut log_config = if cli.verbose {
        LogConfig::verbose()
    } else if cli.quiet {
        LogConfig::quiet()
    } else {
        LogConfig::default()
    };
    if let Some(level) = cli.log_level.as_deref() {
        log_config.level = LogLevel::parse(level);
    }
    if cli.no_color {
        log_config.ansi_colors = LogConfig::production().ansi_colors;
        colored::control::set_override(false);
    }

    let _ = init_logging(&log_config);

    match cli.command {
        Commands::Train {
            config,
            data,
            artifact,
            report,
            epochs,
            batch_size,
            learning_rate,
            seed,
        } => {
            let mut config = match config {
                Some(path) => PipelineConfig::from_file(&path)
                    .with_context(|| format!("loading {}", path.display()))?,
                None => PipelineConfig::default(),
            };
            if let Some(data) = data {
                config.data_path = data;
            }
            if let Some(artifact) = artifact {
                config.artifact_path = artifact;
            }
            if let Some(report) = report {
                config.report_path = report;
            }
            if let Some(epochs) = epochs {
                config.training.epochs = epochs;
            }
            if let Some(batch_size) = batch_size {
                config.training.batch_size = batch_size;
            }
            if let Some(learning_rate) = learning_rate {
                config.training.learning_rate = learning_rate;
            }
            if let Some(seed) = seed {
                config.split_seed = seed;
            }

            cmd_train(&config)?;
        }

        Commands::Evaluate {
            artifact,
            data,
            test_fraction,
            seed,
            export_dir,
        } => {
            cmd_evaluate(&artifact, &data, test_fraction, seed, export_dir.as_deref())?;
        }

        Commands::Predict {
            artifact,
            json,
            n,
            p,
            k,
            temperature,
            humidity,
            data,
        } => {
            let mut service = InferenceService::<DefaultBackend>::load(&artifact, &default_device())
                .with_context(|| format!("loading {}", artifact.display()))?;
            if let Some(data) = data {
                service = service.with_ideal_conditions(IdealConditions::from_records(&load_csv(&data)?));
            }

            match json {
                Some(body) => cmd_predict_json(&service, &body)?,
                None => {
                    let (Some(n), Some(p), Some(k), Some(temperature), Some(humidity)) =
                        (n, p, k, temperature, humidity)
                    else {
                        bail!("either --json or all of -N, -P, -K, --temperature, --humidity are required");
                    };
                    cmd_predict(&service, CropFeatures::new(n, p, k, temperature, humidity))?;
                }
            }
        }

        Commands::IdealConditions { data, crop } => {
            cmd_ideal_conditions(&data, crop.as_deref())?;
        }

        Commands::Migrate {
            artifact,
            architecture,
            output,
        } => {
            cmd_migrate(&artifact, &architecture, &output)?;
        }

        Commands::Inspect { artifact } => {
            cmd_inspect(&artifact)?;
        }
    }

    Ok(())
}

fn cmd_train(config: &PipelineConfig) -> Result<()> {
    println!("{}", "Training Crop Classifier".green().bold());
    println!("  Backend: {}", backend_name());
    println!("  Data:    {}", config.data_path.display());
    println!(
        "  Epochs:  {} (batch {}, lr {})",
        config.training.epochs, config.training.batch_size, config.training.learning_rate
    );
    println!();

    let outcome = run_training::<TrainingBackend>(config, &default_device())?;
    let report = &outcome.report;

    println!();
    println!("{}", "Training Complete!".green().bold());
    println!(
        "  Epochs run:      {}{}",
        report.history.len(),
        if report.stopped_early {
            " (early stop)".yellow().to_string()
        } else {
            String::new()
        }
    );
    println!("  Best epoch:      {}", report.best_epoch + 1);
    println!("  Best val loss:   {:.4}", report.best_val_loss);
    if let Some(best) = report.history.best_epoch() {
        println!("  Best val acc:    {:.2}%", best.val_accuracy * 100.0);
    }
    if let Some(last) = report.history.final_epoch() {
        println!("  Final val acc:   {:.2}%", last.val_accuracy * 100.0);
    }
    println!("  Final LR:        {:.2e}", report.final_lr);
    println!("  Duration:        {}", format_duration(report.duration_secs));
    println!(
        "  Test accuracy:   {}",
        format_progress_bar(report.evaluation.accuracy, 30)
    );
    println!();
    println!("{}", report.evaluation.display());

    println!("  Artifact: {}", config.artifact_path.display());
    println!("  Report:   {}", config.report_path.display());
    println!();
    println!("{}", "Next steps:".cyan().bold());
    println!(
        "  • Predict: crop_recommender predict --artifact {} -N 90 -P 42 -K 43 --temperature 20.8 --humidity 82",
        config.artifact_path.display()
    );

    Ok(())
}

fn cmd_evaluate(
    artifact_path: &Path,
    data: &Path,
    test_fraction: f64,
    seed: u64,
    export_dir: Option<&Path>,
) -> Result<()> {
    let device = default_device();
    let artifact = ModelArtifact::load(artifact_path)
        .with_context(|| format!("loading {}", artifact_path.display()))?;
    let model = artifact.model::<DefaultBackend>(&device)?;

    // The artifact's encoding, never a re-fit one
    let records = load_csv(data)?;
    let dataset = EncodedDataset::encode(&records, &artifact.encoding)?;
    let partition = split(&dataset, test_fraction, seed)?;

    info!("Evaluating on {} held-out records", partition.eval.len());
    let report = Evaluator::default().evaluate(&model, &partition.eval, &device)?;

    println!("{}", "Evaluation".green().bold());
    println!("  Accuracy: {}", format_progress_bar(report.accuracy, 30));
    println!();
    println!("{}", report.display());
    println!("{}", "Confusion matrix (rows: actual, columns: predicted)".cyan());
    println!("{}", report.confusion_matrix.display(&report.class_names));

    for metrics in &report.per_class {
        let name = metrics.class_name.as_deref().unwrap_or("?");
        println!("  {:>14} {}", name, format_progress_bar(metrics.recall, 20));
    }

    if let Some(dir) = export_dir {
        std::fs::create_dir_all(dir)?;
        report.export_confusion_matrix(dir.join("confusion_matrix.csv"))?;
        report.export_roc_curves(dir.join("roc_curves.csv"))?;
        println!();
        println!("  💾 Exported CSVs to {}", dir.display());
    }

    Ok(())
}

fn cmd_predict(service: &InferenceService<DefaultBackend>, features: CropFeatures) -> Result<()> {
    let prediction = service.predict(&features)?;

    println!(
        "{} {} ({:.1}%)",
        "Recommended crop:".green().bold(),
        prediction.crop.bold(),
        prediction.confidence * 100.0
    );
    println!();
    println!("{}", "Top candidates:".cyan());
    for (crop, probability) in prediction.top_k(service.encoding(), 3) {
        println!("  {:>14} {}", crop, format_progress_bar(probability as f64, 20));
    }
    if let Some(ideal) = service.ideal_conditions() {
        println!();
        let fits = ideal.contains(&prediction.crop, &features);
        println!(
            "{} {}",
            format!("Ideal ranges for {}:", prediction.crop).cyan(),
            if fits { "all inside".green() } else { "outside".yellow() }
        );
        for (name, value) in FEATURE_NAMES.iter().zip(features.to_array()) {
            if let Some(range) = ideal.range(&prediction.crop, name) {
                let mark = if range.contains(value) { " " } else { "!" };
                println!(
                    "  {} {:>12} {:>8.2} in [{:.2}, {:.2}]",
                    mark, name, value, range.min, range.max
                );
            }
        }
    }
    println!();
    println!("  Inference time: {:.2} ms", prediction.inference_time_ms);

    Ok(())
}

fn cmd_predict_json(service: &InferenceService<DefaultBackend>, body: &str) -> Result<()> {
    let value: serde_json::Value = serde_json::from_str(body).context("request body is not JSON")?;

    match service.predict_json(&value) {
        Ok(prediction) => {
            println!("{}", serde_json::to_string(&prediction.to_response())?);
            Ok(())
        }
        Err(err) => {
            println!("{}", serde_json::to_string(&ErrorResponse::from(&err))?);
            Err(err.into())
        }
    }
}

fn cmd_ideal_conditions(data: &Path, crop: Option<&str>) -> Result<()> {
    let records = load_csv(data)?;
    let ideal = IdealConditions::from_records(&records);

    let json = match crop {
        Some(crop) => {
            let ranges = ideal.get(crop).with_context(|| {
                format!(
                    "no records for crop '{}' (known: {})",
                    crop,
                    ideal.crops().collect::<Vec<_>>().join(", ")
                )
            })?;
            let single: BTreeMap<&str, _> = BTreeMap::from([(crop, ranges)]);
            serde_json::to_string_pretty(&single)?
        }
        None => serde_json::to_string_pretty(&ideal)?,
    };

    println!("{}", json);
    Ok(())
}

fn cmd_migrate(artifact_path: &Path, architecture_path: &Path, output: &Path) -> Result<()> {
    let old = ModelArtifact::load_unchecked(artifact_path)
        .with_context(|| format!("loading {}", artifact_path.display()))?;
    let architecture: ArchitectureDescriptor = load_toml_config(architecture_path)?;

    let migrated = migrate::<DefaultBackend>(&old, &architecture, &default_device())?;
    migrated.save(output)?;

    println!(
        "{} v{} -> v{}: {}",
        "Migrated".green().bold(),
        old.format_version,
        migrated.format_version,
        output.display()
    );
    Ok(())
}

fn cmd_inspect(artifact_path: &Path) -> Result<()> {
    let artifact = ModelArtifact::load_unchecked(artifact_path)
        .with_context(|| format!("loading {}", artifact_path.display()))?;
    let arch = &artifact.architecture;
    let meta = &artifact.metadata;

    println!("{}", "Model Artifact".green().bold());
    println!("  Path:            {}", artifact_path.display());
    println!("  Format version:  {}", artifact.format_version);
    println!("  Created:         {}", meta.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
    println!("  Library version: {}", meta.library_version);
    if let Some(from) = meta.migrated_from {
        println!("  Migrated from:   v{}", from);
    }
    if let (Some(epoch), Some(loss)) = (meta.best_epoch, meta.best_val_loss) {
        println!("  Best epoch:      {} (val loss {:.4})", epoch + 1, loss);
    }
    if let Some(samples) = meta.training_samples {
        println!("  Trained on:      {} records", samples);
    }
    println!();

    let units: Vec<String> = arch.hidden.iter().map(|l| l.units.to_string()).collect();
    println!("{}", "Architecture".cyan());
    println!(
        "  {} -> {} -> {} ({} trainable parameters)",
        arch.input_features,
        units.join(" -> "),
        arch.num_classes,
        arch.num_trainable_params()
    );
    for shape in &artifact.parameter_shapes {
        println!("    {}", shape);
    }
    println!();

    println!("{} ({})", "Classes".cyan(), artifact.encoding.len());
    for (i, name) in artifact.encoding.classes().iter().enumerate() {
        println!("  {:>3}  {}", i, name);
    }

    match artifact.verify() {
        Ok(()) => println!("\n  {}", "✓ artifact is loadable".green()),
        Err(err) => println!("\n  {} {}", "✗".red(), err),
    }

    Ok(())
}
