//! Layered settings: built-in defaults, an optional settings file, then
//! `EXPRESSION_*` environment variables (`__` separates nested keys, e.g.
//! `EXPRESSION_CLASSIFIER__EPOCHS=1000`).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub detector: DetectorSettings,
    pub extraction: ExtractionSettings,
    pub classifier: ClassifierSettings,
    pub paths: PathSettings,
}

impl Settings {
    /// Build settings from defaults, `file` (format chosen by extension) and
    /// the environment.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Settings::default())?);
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix("EXPRESSION")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorSettings {
    /// SeetaFace frontal face model.
    pub face_model: PathBuf,
    /// dlib 68-point shape predictor (`.dat` or `.dat.bz2`).
    pub landmark_model: PathBuf,
    pub min_face_size: u32,
    pub score_thresh: f64,
    pub pyramid_scale_factor: f32,
    pub slide_window_step: u32,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            face_model: PathBuf::from("seeta_fd_frontal_v1.0.bin"),
            landmark_model: PathBuf::from("shape_predictor_68_face_landmarks.dat"),
            min_face_size: 20,
            score_thresh: 2.0,
            pyramid_scale_factor: 0.8,
            slide_window_step: 4,
        }
    }
}

/// What a batch does when one image fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Log the failure, record it in the report and continue.
    #[default]
    Skip,
    /// Stop the batch at the first failing image.
    Abort,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionSettings {
    pub failure_policy: FailurePolicy,
    /// Where single-image extraction writes its landmark overlay.
    pub annotated_output: PathBuf,
    /// Fail images whose file name carries no label code instead of
    /// labelling them `ERROR`.
    pub strict_labels: bool,
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self {
            failure_policy: FailurePolicy::Skip,
            annotated_output: PathBuf::from("output.jpg"),
            strict_labels: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierSettings {
    pub model_path: PathBuf,
    pub learning_rate: f64,
    pub epochs: usize,
    pub l2: f64,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("model.bin"),
            learning_rate: 0.5,
            epochs: 500,
            l2: 1e-3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    pub training_images: PathBuf,
    pub testing_images: PathBuf,
    pub training_dataset: PathBuf,
    pub testing_dataset: PathBuf,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            training_images: PathBuf::from("Images/TrainingImages"),
            testing_images: PathBuf::from("Images/TestingImages"),
            training_dataset: PathBuf::from("feature_vectorsTraining.csv"),
            testing_dataset: PathBuf::from("feature_vectorsTesting.csv"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let settings = Settings::default();
        assert_eq!(settings.detector.min_face_size, 20);
        assert_eq!(settings.extraction.failure_policy, FailurePolicy::Skip);
        assert_eq!(settings.classifier.model_path, PathBuf::from("model.bin"));
        assert_eq!(
            settings.paths.training_dataset,
            PathBuf::from("feature_vectorsTraining.csv")
        );
    }

    #[test]
    fn file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{
                "detector": { "min_face_size": 40, "landmark_model": "models/sp68.dat.bz2" },
                "extraction": { "failure_policy": "abort" }
            }"#,
        )
        .unwrap();

        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.detector.min_face_size, 40);
        assert_eq!(
            settings.detector.landmark_model,
            PathBuf::from("models/sp68.dat.bz2")
        );
        assert_eq!(settings.extraction.failure_policy, FailurePolicy::Abort);
        // Untouched keys keep their defaults.
        assert_eq!(settings.detector.score_thresh, 2.0);
        assert_eq!(
            settings.extraction.annotated_output,
            PathBuf::from("output.jpg")
        );
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Settings::load(Some(&dir.path().join("absent.toml"))).is_err());
    }
}
