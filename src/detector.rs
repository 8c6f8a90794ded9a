use std::fs::File;
use std::io::BufReader;

use image::GrayImage;
use tracing::debug;

use crate::config::DetectorSettings;
use crate::dlib::load_dlib_model;
use crate::error::{Error, Result};
use crate::shape_predictor::ShapePredictor;
use crate::types::{BoundingBox, LandmarkSet, NUM_LANDMARKS};

/// Pluggable face + landmark detection backend.
///
/// Implementations must be deterministic for a given image and model, and
/// return one 68-point landmark set per detected face.
pub trait LandmarkDetector {
    fn detect(&self, image: &GrayImage) -> Result<Vec<LandmarkSet>>;
}

impl<D: LandmarkDetector + ?Sized> LandmarkDetector for &D {
    fn detect(&self, image: &GrayImage) -> Result<Vec<LandmarkSet>> {
        (**self).detect(image)
    }
}

impl<D: LandmarkDetector + ?Sized> LandmarkDetector for Box<D> {
    fn detect(&self, image: &GrayImage) -> Result<Vec<LandmarkSet>> {
        (**self).detect(image)
    }
}

/// SeetaFace face boxes (via `rustface`) refined to 68 landmarks by a dlib
/// shape predictor.
pub struct DlibLandmarkDetector {
    face_model: rustface::Model,
    predictor: ShapePredictor,
    settings: DetectorSettings,
}

impl DlibLandmarkDetector {
    /// Load both models from the paths in `settings`.
    pub fn load(settings: &DetectorSettings) -> Result<Self> {
        debug!(path = %settings.face_model.display(), "loading face detector");
        let file = File::open(&settings.face_model).map_err(|e| {
            Error::Detector(format!("{}: {e}", settings.face_model.display()))
        })?;
        let face_model = rustface::read_model(BufReader::new(file)).map_err(|e| {
            Error::Detector(format!("{}: {e}", settings.face_model.display()))
        })?;

        let predictor = load_dlib_model(&settings.landmark_model)?;
        Self::new(face_model, predictor, settings.clone())
    }

    pub fn new(
        face_model: rustface::Model,
        predictor: ShapePredictor,
        settings: DetectorSettings,
    ) -> Result<Self> {
        if predictor.num_landmarks() != NUM_LANDMARKS {
            return Err(Error::LandmarkCount {
                expected: NUM_LANDMARKS,
                found: predictor.num_landmarks(),
            });
        }
        Ok(Self {
            face_model,
            predictor,
            settings,
        })
    }
}

impl LandmarkDetector for DlibLandmarkDetector {
    fn detect(&self, image: &GrayImage) -> Result<Vec<LandmarkSet>> {
        let mut detector = rustface::create_detector_with_model(self.face_model.clone());
        detector.set_min_face_size(self.settings.min_face_size);
        detector.set_score_thresh(self.settings.score_thresh);
        detector.set_pyramid_scale_factor(self.settings.pyramid_scale_factor);
        detector.set_slide_window_step(
            self.settings.slide_window_step,
            self.settings.slide_window_step,
        );

        let (width, height) = image.dimensions();
        let faces = detector.detect(&rustface::ImageData::new(image.as_raw(), width, height));
        debug!(faces = faces.len(), "face detection finished");

        faces
            .iter()
            .map(|face| {
                let bbox = face.bbox();
                let rect = BoundingBox::new(
                    bbox.x() as f64,
                    bbox.y() as f64,
                    bbox.width() as f64,
                    bbox.height() as f64,
                );
                LandmarkSet::try_from(self.predictor.predict(image, &rect))
            })
            .collect()
    }
}
