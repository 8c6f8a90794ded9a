use std::path::Path;

use serde::Serialize;
use tracing::debug;

use crate::classifier::{Classifier, Prediction};
use crate::config::Settings;
use crate::detector::LandmarkDetector;
use crate::error::Result;
use crate::labeling::LabelStrategy;
use crate::pipeline::{Extractor, SingleImageOutput};
use crate::record::{Expression, FacialFeatureRecord};

/// Features and classifier output for one face. The record carries the
/// predicted label.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FacePrediction {
    pub record: FacialFeatureRecord,
    pub prediction: Prediction,
}

/// A loaded classifier paired with a landmark detector.
///
/// All prediction goes through `&self`; models are released when the
/// session is dropped.
pub struct ExpressionSession<D> {
    extractor: Extractor<D>,
    classifier: Classifier,
}

impl<D: LandmarkDetector> ExpressionSession<D> {
    /// Load the model at `settings.classifier.model_path`.
    pub fn load(settings: &Settings, detector: D) -> Result<Self> {
        let classifier = Classifier::load(&settings.classifier.model_path)?;
        debug!(
            path = %settings.classifier.model_path.display(),
            classes = classifier.classes().len(),
            "loaded classifier"
        );
        Ok(Self::new(classifier, detector, settings))
    }

    pub fn new(classifier: Classifier, detector: D, settings: &Settings) -> Self {
        Self {
            extractor: Extractor::new(detector, settings.extraction.clone()),
            classifier,
        }
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    /// Classify every face in the image at `path`.
    ///
    /// Writes the landmark overlay like an in-memory extraction. An image
    /// without faces is an error, never an empty prediction list.
    pub fn predict_image(&self, path: &Path) -> Result<Vec<FacePrediction>> {
        // Query images carry no label; the file name is never decoded.
        let unlabelled = LabelStrategy::Explicit(Expression::Error);
        let records =
            self.extractor
                .extract_single_image(path, &SingleImageOutput::InMemory, &unlabelled)?;
        Ok(records
            .into_iter()
            .map(|record| {
                let prediction = self.classifier.predict(&record.features);
                FacePrediction {
                    record: FacialFeatureRecord::new(prediction.label, record.features),
                    prediction,
                }
            })
            .collect())
    }
}
