//! # expression-features
//!
//! Geometric facial-expression features from 68-point facial landmarks.
//!
//! This crate provides:
//! - **Landmark Detection**: SeetaFace face boxes (via `rustface`) refined by
//!   a pure-Rust dlib ERT shape predictor, behind the [`LandmarkDetector`] trait
//! - **Feature Extraction**: six scale-invariant distances (eyebrow raise, lip
//!   curl, lip height and width) normalised by a per-feature reference length
//! - **Datasets**: labelled feature rows in a CSV file, built from folders of
//!   expression images
//! - **Classification**: a softmax-regression expression classifier with
//!   training, evaluation and single-image prediction
//!
//! ## Feature Pipeline
//!
//! 1. Load an image and convert it to grayscale
//! 2. Detect faces and predict 68 landmarks per face
//! 3. Measure each feature as a distance (or sum of distances) divided by the
//!    feature's normalising distance
//! 4. Append one labelled row per face to the dataset
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::path::Path;
//! use expression_features::{
//!     DlibLandmarkDetector, ExpressionSession, Extractor, Settings,
//! };
//!
//! let settings = Settings::load(None)?;
//!
//! // Build a training set from Images/TrainingImages/{Surprise,Sadness,...}
//! let detector = DlibLandmarkDetector::load(&settings.detector)?;
//! let extractor = Extractor::new(detector, settings.extraction.clone());
//! expression_features::create_dataset(&settings.paths.training_dataset)?;
//! let report = extractor.extract_dataset(
//!     &settings.paths.training_images,
//!     &settings.paths.training_dataset,
//! )?;
//! println!("{} images, {} failed", report.images_succeeded, report.images_failed());
//!
//! // Classify a new image with a previously trained model
//! let detector = DlibLandmarkDetector::load(&settings.detector)?;
//! let session = ExpressionSession::load(&settings, detector)?;
//! for face in session.predict_image(Path::new("face.jpg"))? {
//!     println!("{} ({:.2})", face.prediction.label, face.prediction.confidence());
//! }
//! # Ok::<(), expression_features::Error>(())
//! ```
//!
//! ## Custom Detectors
//!
//! Anything that yields 68-point [`LandmarkSet`]s can drive extraction:
//!
//! ```rust
//! use expression_features::{LandmarkDetector, LandmarkSet, Result};
//! use image::GrayImage;
//!
//! struct NoFaces;
//!
//! impl LandmarkDetector for NoFaces {
//!     fn detect(&self, _image: &GrayImage) -> Result<Vec<LandmarkSet>> {
//!         Ok(Vec::new())
//!     }
//! }
//! ```

pub mod classifier;
pub mod config;
pub mod dataset;
pub mod detector;
pub mod dlib;
mod error;
pub mod features;
pub mod labeling;
pub mod metrics;
pub mod pipeline;
pub mod record;
pub mod session;
pub mod shape_predictor;
pub mod telemetry;
mod types;

pub use crate::classifier::{ClassScore, Classifier, Prediction, TrainingOptions};
pub use crate::config::{FailurePolicy, Settings};
pub use crate::dataset::{append_record, create_dataset, Dataset, DATASET_HEADER};
pub use crate::detector::{DlibLandmarkDetector, LandmarkDetector};
pub use crate::error::{Error, Result};
pub use crate::features::{
    aggregated_feature, normalized_distance, FacialFeatures, FEATURE_TABLE, NUM_FEATURES,
};
pub use crate::labeling::{infer_label, FilenameConvention, LabelStrategy};
pub use crate::metrics::{evaluate, ClassMetrics, EvaluationMetrics};
pub use crate::pipeline::{
    annotate, ExtractionReport, Extractor, ImageFailure, SingleImageOutput, EXPRESSION_FOLDERS,
};
pub use crate::record::{Expression, FacialFeatureRecord};
pub use crate::session::{ExpressionSession, FacePrediction};
pub use crate::shape_predictor::{ImageAccess, ShapePredictor};
pub use crate::types::{BoundingBox, LandmarkSet, Point, NUM_LANDMARKS};
