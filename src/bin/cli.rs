//! Command-line front end for feature extraction, training and prediction.
//!
//! Usage:
//!   expression-features extract-training                 # Images/TrainingImages -> CSV
//!   expression-features extract-testing                  # Images/TestingImages -> CSV
//!   expression-features extract --root DIR --output CSV
//!   expression-features train [--dataset CSV]
//!   expression-features evaluate [--dataset CSV]
//!   expression-features predict <image> [--json]
//!   expression-features features <image> [--json]

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use expression_features::{
    create_dataset, evaluate, telemetry, Classifier, Dataset, DlibLandmarkDetector,
    EvaluationMetrics, ExpressionSession, ExtractionReport, Extractor, FacialFeatureRecord,
    LabelStrategy, Result, Settings, SingleImageOutput, TrainingOptions,
};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "expression-features")]
#[command(author, version, about = "Facial expression features and classification", long_about = None)]
struct Args {
    /// Settings file (TOML, JSON or YAML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Face detector model path
    #[arg(long, global = true)]
    detector: Option<PathBuf>,

    /// Landmark model path
    #[arg(long, global = true)]
    landmarks: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract the training image folders into the training dataset
    ExtractTraining,
    /// Extract the testing image folders into the testing dataset
    ExtractTesting,
    /// Extract expression folders under ROOT into OUTPUT
    Extract {
        #[arg(long)]
        root: PathBuf,
        #[arg(long)]
        output: PathBuf,
    },
    /// Train the classifier and save it to the configured model path
    Train {
        #[arg(long)]
        dataset: Option<PathBuf>,
    },
    /// Report classifier metrics on a dataset
    Evaluate {
        #[arg(long)]
        dataset: Option<PathBuf>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Classify every face in an image
    Predict {
        image: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the features of every face in an image
    Features {
        image: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    let args = Args::parse();
    telemetry::init_subscriber(args.verbose);

    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let mut settings = Settings::load(args.config.as_deref())?;
    if let Some(path) = args.detector {
        settings.detector.face_model = path;
    }
    if let Some(path) = args.landmarks {
        settings.detector.landmark_model = path;
    }

    match args.command {
        Command::ExtractTraining => {
            let (root, output) = (
                settings.paths.training_images.clone(),
                settings.paths.training_dataset.clone(),
            );
            extract(&settings, &root, &output)
        }
        Command::ExtractTesting => {
            let (root, output) = (
                settings.paths.testing_images.clone(),
                settings.paths.testing_dataset.clone(),
            );
            extract(&settings, &root, &output)
        }
        Command::Extract { root, output } => extract(&settings, &root, &output),
        Command::Train { dataset } => {
            let path = dataset.unwrap_or_else(|| settings.paths.training_dataset.clone());
            let data = Dataset::load(&path)?;
            let model = Classifier::train(&data, &TrainingOptions::from(&settings.classifier))?;
            model.save(&settings.classifier.model_path)?;
            print!("{}", format_training(&data, &settings.classifier.model_path));
            Ok(())
        }
        Command::Evaluate { dataset, json } => {
            let path = dataset.unwrap_or_else(|| settings.paths.testing_dataset.clone());
            let model = Classifier::load(&settings.classifier.model_path)?;
            let metrics = evaluate(&model, &Dataset::load(&path)?)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&metrics)?);
            } else {
                print!("{}", format_metrics(&metrics));
            }
            Ok(())
        }
        Command::Predict { image, json } => {
            let detector = DlibLandmarkDetector::load(&settings.detector)?;
            let session = ExpressionSession::load(&settings, detector)?;
            let faces = session.predict_image(&image)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&faces)?);
            } else {
                for (i, face) in faces.iter().enumerate() {
                    println!("--- Face {} ---", i + 1);
                    println!(
                        "Prediction: {} ({:.1}%)",
                        face.prediction.label,
                        face.prediction.confidence() * 100.0
                    );
                    for score in &face.prediction.scores {
                        println!("  {:<9} {:.4}", score.expression.to_string(), score.score);
                    }
                }
            }
            Ok(())
        }
        Command::Features { image, json } => {
            let detector = DlibLandmarkDetector::load(&settings.detector)?;
            let extractor = Extractor::new(detector, settings.extraction.clone());
            let records = extractor.extract_single_image(
                &image,
                &SingleImageOutput::InMemory,
                &LabelStrategy::default(),
            )?;
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else {
                for record in &records {
                    print!("{}", format_record(record));
                }
            }
            Ok(())
        }
    }
}

fn extract(settings: &Settings, root: &Path, output: &Path) -> Result<()> {
    let detector = DlibLandmarkDetector::load(&settings.detector)?;
    let extractor = Extractor::new(detector, settings.extraction.clone());

    create_dataset(output)?;
    info!(output = %output.display(), "created dataset");
    let report = extractor.extract_dataset(root, output)?;
    print!("{}", format_report(&report));
    Ok(())
}

fn format_report(report: &ExtractionReport) -> String {
    let mut s = String::new();
    s.push_str(&format!("Images succeeded: {}\n", report.images_succeeded));
    s.push_str(&format!("Images failed:    {}\n", report.images_failed()));
    s.push_str(&format!("Rows written:     {}\n", report.rows_written));
    for failure in &report.failures {
        s.push_str(&format!("  {}: {}\n", failure.path.display(), failure.error));
    }
    s
}

fn format_training(data: &Dataset, model_path: &Path) -> String {
    let trainable = data.iter().filter(|r| r.label.is_trainable()).count();
    format!(
        "Trained on {} rows ({} Neutral/ERROR rows ignored); model written to {}\n",
        trainable,
        data.len() - trainable,
        model_path.display()
    )
}

fn format_record(record: &FacialFeatureRecord) -> String {
    let f = &record.features;
    let mut s = String::new();
    s.push_str(&format!("Label: {}\n", record.label));
    s.push_str(&format!("  Left eyebrow raise:  {:.4}\n", f.left_eyebrow_raise));
    s.push_str(&format!("  Right eyebrow raise: {:.4}\n", f.right_eyebrow_raise));
    s.push_str(&format!("  Left lip curl:       {:.4}\n", f.left_lip_curl));
    s.push_str(&format!("  Right lip curl:      {:.4}\n", f.right_lip_curl));
    s.push_str(&format!("  Lip height:          {:.4}\n", f.lip_height));
    s.push_str(&format!("  Lip width:           {:.4}\n", f.lip_width));
    s
}

fn format_metrics(metrics: &EvaluationMetrics) -> String {
    let mut s = String::new();
    s.push_str(&format!(
        "Rows evaluated: {} (skipped {})\n",
        metrics.rows_evaluated, metrics.rows_skipped
    ));
    s.push_str(&format!("MicroAccuracy:    {:.4}\n", metrics.micro_accuracy));
    s.push_str(&format!("MacroAccuracy:    {:.4}\n", metrics.macro_accuracy));
    s.push_str(&format!("LogLoss:          {:.4}\n", metrics.log_loss));
    s.push_str(&format!("LogLossReduction: {:.4}\n", metrics.log_loss_reduction));

    s.push_str("\nPer class:\n");
    for class in &metrics.per_class {
        s.push_str(&format!(
            "  {:<9} support {:>4}  precision {:.4}  recall {:.4}  log loss {:.4}\n",
            class.expression.to_string(),
            class.support,
            class.precision,
            class.recall,
            class.log_loss
        ));
    }

    s.push_str("\nConfusion (rows = truth):\n");
    for (class, row) in metrics.classes().zip(&metrics.confusion) {
        let cells: Vec<String> = row.iter().map(|n| format!("{n:>5}")).collect();
        s.push_str(&format!("  {:<9}{}\n", class.to_string(), cells.join("")));
    }
    s
}
