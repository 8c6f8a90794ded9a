//! Batch extraction of feature datasets from labeled image folders.
//!
//! Processing is sequential: each image is loaded, run through the landmark
//! detector, turned into one record per face and appended to the dataset
//! before the next image starts. Rows of one image are written only after
//! all of its faces produced features, so a failing image leaves no rows.

use std::io;
use std::path::{Path, PathBuf};

use image::{DynamicImage, Rgb, RgbImage};
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::config::{ExtractionSettings, FailurePolicy};
use crate::dataset::append_record;
use crate::detector::LandmarkDetector;
use crate::error::{Error, Result};
use crate::features::FacialFeatures;
use crate::labeling::LabelStrategy;
use crate::record::{Expression, FacialFeatureRecord};
use crate::types::{LandmarkSet, Point};

/// Expression sub-folders of a dataset root, in processing order.
pub const EXPRESSION_FOLDERS: [(&str, Expression); 6] = [
    ("Surprise", Expression::Surprise),
    ("Sadness", Expression::Sadness),
    ("Fear", Expression::Fear),
    ("Anger", Expression::Angry),
    ("Disgust", Expression::Disgust),
    ("Joy", Expression::Joy),
];

/// Destination of a single-image extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SingleImageOutput {
    /// Append the records to this dataset file.
    Append(PathBuf),
    /// Return the records only, and write the landmark overlay for inspection.
    InMemory,
}

/// An image that produced no rows, and why.
#[derive(Debug)]
pub struct ImageFailure {
    pub path: PathBuf,
    pub error: Error,
}

/// Outcome of a batch extraction.
#[derive(Debug, Default)]
pub struct ExtractionReport {
    pub images_succeeded: usize,
    pub rows_written: usize,
    pub failures: Vec<ImageFailure>,
}

impl ExtractionReport {
    pub fn images_failed(&self) -> usize {
        self.failures.len()
    }

    pub fn merge(&mut self, other: ExtractionReport) {
        self.images_succeeded += other.images_succeeded;
        self.rows_written += other.rows_written;
        self.failures.extend(other.failures);
    }
}

/// Runs a [`LandmarkDetector`] over images and turns faces into records.
pub struct Extractor<D> {
    detector: D,
    settings: ExtractionSettings,
}

impl<D: LandmarkDetector> Extractor<D> {
    pub fn new(detector: D, settings: ExtractionSettings) -> Self {
        Self { detector, settings }
    }

    pub fn settings(&self) -> &ExtractionSettings {
        &self.settings
    }

    fn label_for(&self, path: &Path, labels: &LabelStrategy) -> Result<Expression> {
        if self.settings.strict_labels {
            labels.resolve_strict(path)
        } else {
            Ok(labels.resolve(path))
        }
    }

    fn detect(&self, path: &Path) -> Result<(DynamicImage, Vec<LandmarkSet>)> {
        let image = image::open(path)?;
        let faces = self.detector.detect(&image.to_luma8())?;
        if faces.is_empty() {
            return Err(Error::NoFaceDetected {
                path: path.to_path_buf(),
            });
        }
        Ok((image, faces))
    }

    /// One record per face detected in the image at `path`.
    pub fn extract_records(
        &self,
        path: &Path,
        labels: &LabelStrategy,
    ) -> Result<Vec<FacialFeatureRecord>> {
        let label = self.label_for(path, labels)?;
        let (_, faces) = self.detect(path)?;
        records_for(label, &faces)
    }

    /// Extract the faces of one image.
    ///
    /// With [`SingleImageOutput::Append`] the records are appended to the
    /// dataset. With [`SingleImageOutput::InMemory`] nothing is written to a
    /// dataset; instead a copy of the image with the landmarks marked is saved
    /// to the configured `annotated_output`.
    pub fn extract_single_image(
        &self,
        path: &Path,
        output: &SingleImageOutput,
        labels: &LabelStrategy,
    ) -> Result<Vec<FacialFeatureRecord>> {
        let label = self.label_for(path, labels)?;
        let (image, faces) = self.detect(path)?;
        let records = records_for(label, &faces)?;

        match output {
            SingleImageOutput::Append(dataset) => {
                for record in &records {
                    append_record(dataset, record)?;
                }
            }
            SingleImageOutput::InMemory => {
                let annotated = annotate(&image, &faces);
                annotated.save(&self.settings.annotated_output)?;
                for record in &records {
                    info!(
                        left_eyebrow = record.features.left_eyebrow_raise,
                        right_eyebrow = record.features.right_eyebrow_raise,
                        left_lip = record.features.left_lip_curl,
                        right_lip = record.features.right_lip_curl,
                        lip_width = record.features.lip_width,
                        lip_height = record.features.lip_height,
                        "extracted features"
                    );
                }
                debug!(path = %self.settings.annotated_output.display(), "wrote landmark overlay");
            }
        }

        Ok(records)
    }

    /// Extract every file directly inside `dir`, appending to `output`.
    ///
    /// Files are visited in file-name order and symbolic links are followed;
    /// sub-directories are not descended into. Per-image failures, including
    /// unreadable entries, are handled according to the configured
    /// [`FailurePolicy`].
    pub fn extract_directory(
        &self,
        dir: &Path,
        output: &Path,
        labels: &LabelStrategy,
    ) -> Result<ExtractionReport> {
        info!(dir = %dir.display(), "extracting features");
        let mut report = ExtractionReport::default();
        let target = SingleImageOutput::Append(output.to_path_buf());

        let entries = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .follow_links(true)
            .sort_by_file_name();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    let path = err.path().unwrap_or(dir).to_path_buf();
                    self.handle_failure(&mut report, path, Error::Io(io::Error::from(err)))?;
                    continue;
                }
            };
            if entry.file_type().is_dir() {
                debug!(path = %entry.path().display(), "ignoring sub-directory");
                continue;
            }
            let path = entry.path();
            debug!(image = %path.display(), "extracting from image");

            match self.extract_single_image(path, &target, labels) {
                Ok(records) => {
                    report.images_succeeded += 1;
                    report.rows_written += records.len();
                }
                Err(err) => self.handle_failure(&mut report, path.to_path_buf(), err)?,
            }
        }

        info!(
            dir = %dir.display(),
            succeeded = report.images_succeeded,
            failed = report.images_failed(),
            rows = report.rows_written,
            "directory finished"
        );
        Ok(report)
    }

    /// Extract all expression folders under `root` into `output`, labelling
    /// each row with its folder's expression.
    pub fn extract_dataset(&self, root: &Path, output: &Path) -> Result<ExtractionReport> {
        let mut report = ExtractionReport::default();

        for (folder, expression) in EXPRESSION_FOLDERS {
            let dir = root.join(folder);
            if !dir.is_dir() {
                let err = Error::Io(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("expression folder {} not found", dir.display()),
                ));
                self.handle_failure(&mut report, dir, err)?;
                continue;
            }

            let folder_report =
                self.extract_directory(&dir, output, &LabelStrategy::Explicit(expression))?;
            report.merge(folder_report);
        }

        Ok(report)
    }

    fn handle_failure(
        &self,
        report: &mut ExtractionReport,
        path: PathBuf,
        err: Error,
    ) -> Result<()> {
        match self.settings.failure_policy {
            FailurePolicy::Skip => {
                warn!(path = %path.display(), error = %err, "skipping image");
                report.failures.push(ImageFailure { path, error: err });
                Ok(())
            }
            FailurePolicy::Abort => {
                error!(path = %path.display(), error = %err, "aborting extraction");
                Err(err)
            }
        }
    }
}

fn records_for(label: Expression, faces: &[LandmarkSet]) -> Result<Vec<FacialFeatureRecord>> {
    faces
        .iter()
        .map(|face| {
            FacialFeatures::from_landmarks(face)
                .map(|features| FacialFeatureRecord::new(label, features))
        })
        .collect()
}

const MARKER_COLOR: Rgb<u8> = Rgb([255, 255, 0]);
const MARKER_RADIUS: i64 = 3;
const MARKER_THICKNESS: i64 = 2;

/// Copy of `image` with a square marker on every landmark.
pub fn annotate(image: &DynamicImage, faces: &[LandmarkSet]) -> RgbImage {
    let mut canvas = image.to_rgb8();
    for point in faces.iter().flat_map(|face| face.iter()) {
        draw_marker(&mut canvas, *point);
    }
    canvas
}

fn draw_marker(img: &mut RgbImage, center: Point) {
    let (width, height) = (img.width() as i64, img.height() as i64);
    let cx = center.x.round() as i64;
    let cy = center.y.round() as i64;

    for dy in -MARKER_RADIUS..=MARKER_RADIUS {
        for dx in -MARKER_RADIUS..=MARKER_RADIUS {
            // Outline only: skip the interior.
            if dx.abs() <= MARKER_RADIUS - MARKER_THICKNESS
                && dy.abs() <= MARKER_RADIUS - MARKER_THICKNESS
            {
                continue;
            }
            let (px, py) = (cx + dx, cy + dy);
            if px >= 0 && px < width && py >= 0 && py < height {
                img.put_pixel(px as u32, py as u32, MARKER_COLOR);
            }
        }
    }
}
