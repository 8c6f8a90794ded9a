use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Model serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid model: {0}")]
    InvalidModel(String),

    #[error("Face detector error: {0}")]
    Detector(String),

    #[error("No face detected in {}", path.display())]
    NoFaceDetected { path: PathBuf },

    #[error("Degenerate landmarks: landmarks {inner} and {normalise} coincide, normalising distance is zero")]
    DegenerateLandmarks { inner: usize, normalise: usize },

    #[error("Landmark index {index} out of range")]
    LandmarkIndex { index: usize },

    #[error("Expected {expected} landmarks, found {found}")]
    LandmarkCount { expected: usize, found: usize },

    #[error("Unrecognized label encoding in file name {filename:?}")]
    UnrecognizedLabelEncoding { filename: String },

    #[error("No trained model at {} (run `train` first)", path.display())]
    MissingModelArtifact { path: PathBuf },

    #[error("Malformed dataset row at line {line}: {reason}")]
    MalformedDatasetRow { line: u64, reason: String },

    #[error("Dataset has no rows with a label the classifier can use")]
    EmptyDataset,
}

pub type Result<T> = std::result::Result<T, Error>;
