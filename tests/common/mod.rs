//! Shared fixtures: a landmark detector driven by the image contents, and
//! tiny PNG images that select its behaviour.

#![allow(dead_code)]

use std::path::Path;

use expression_features::{LandmarkDetector, LandmarkSet, Point, Result, NUM_LANDMARKS};
use image::{GrayImage, Luma};

/// Image width that yields no faces.
pub const NO_FACE: u32 = 1;
/// Image width that yields two faces.
pub const TWO_FACES: u32 = 2;
/// Image width that yields one face whose normalising landmarks coincide.
pub const DEGENERATE: u32 = 3;
/// Image width that yields one regular face.
pub const ONE_FACE: u32 = 4;

/// Mirrored face whose features are exactly
/// `[6.625, 6.625, 5.0, 5.0, 2.0, 3.0]`.
pub fn symmetric_face() -> LandmarkSet {
    let mut points = [Point::zero(); NUM_LANDMARKS];
    let left = [
        (39, 42, -8.0, 0.0),
        (21, 22, -8.0, -8.0),
        (20, 23, -14.0, -8.0),
        (19, 24, -17.0, -12.0),
        (18, 25, -20.0, -16.0),
        (17, 26, -24.0, -12.0),
        (48, 54, -12.0, 32.0),
        (49, 53, -8.0, 22.0),
        (50, 52, -6.0, 24.0),
    ];
    for (idx, partner, x, y) in left {
        points[idx] = Point::new(x, y);
        points[partner] = Point::new(-x, y);
    }
    points[33] = Point::new(0.0, 16.0);
    points[51] = Point::new(0.0, 24.0);
    points[57] = Point::new(0.0, 40.0);
    LandmarkSet::new(points)
}

/// Symmetric face with the mouth corners pulled outwards by `stretch`.
pub fn stretched_face(stretch: f64) -> LandmarkSet {
    let mut points: Vec<Point> = symmetric_face().points().to_vec();
    points[48].x -= stretch;
    points[54].x += stretch;
    LandmarkSet::try_from(points).unwrap()
}

/// Chooses faces from the image width (see the constants above); the
/// intensity of the top-left pixel stretches the mouth, so images of
/// different brightness give different features.
pub struct FixtureDetector;

impl LandmarkDetector for FixtureDetector {
    fn detect(&self, image: &GrayImage) -> Result<Vec<LandmarkSet>> {
        let stretch = image.get_pixel(0, 0)[0] as f64 / 8.0;
        Ok(match image.width() {
            NO_FACE => vec![],
            TWO_FACES => vec![symmetric_face(), stretched_face(stretch)],
            DEGENERATE => vec![LandmarkSet::new([Point::zero(); NUM_LANDMARKS])],
            _ => vec![stretched_face(stretch)],
        })
    }
}

/// Write a uniform grayscale PNG.
pub fn write_image(path: &Path, width: u32, intensity: u8) {
    GrayImage::from_pixel(width, 4, Luma([intensity]))
        .save(path)
        .unwrap();
}
