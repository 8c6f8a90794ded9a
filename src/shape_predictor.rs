//! Ensemble-of-Regression-Trees landmark localisation.
//!
//! Implements inference for the cascade described in "One Millisecond Face
//! Alignment with an Ensemble of Regression Trees" (Kazemi & Sullivan, 2014),
//! laid out the way dlib stores it:
//!
//! 1. The shape estimate lives in face-box-normalised [0,1] coordinates and
//!    starts at the mean shape.
//! 2. Each cascade stage samples a fixed set of pixels, each anchored to a
//!    landmark plus an offset that follows the current shape's rotation and
//!    scale relative to the mean shape.
//! 3. Every tree of the stage compares pixel pairs down to a leaf; the leaf
//!    deltas of all trees are added to the shape.
//! 4. The final shape is mapped back to image coordinates.

use crate::error::{Error, Result};
use crate::types::{BoundingBox, Point};

/// Grayscale pixel access for landmark prediction.
pub trait ImageAccess {
    /// Intensity at (x, y); 0 outside the image.
    fn get_pixel(&self, x: i64, y: i64) -> u8;

    fn width(&self) -> u32;
    fn height(&self) -> u32;
}

impl ImageAccess for image::GrayImage {
    fn get_pixel(&self, x: i64, y: i64) -> u8 {
        if x < 0 || y < 0 || x >= self.width() as i64 || y >= self.height() as i64 {
            return 0;
        }
        image::GrayImage::get_pixel(self, x as u32, y as u32).0[0]
    }

    fn width(&self) -> u32 {
        self.dimensions().0
    }

    fn height(&self) -> u32 {
        self.dimensions().1
    }
}

/// Rotation and uniform scale, without translation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimilarityTransform {
    a: f64,
    b: f64,
}

impl SimilarityTransform {
    pub const IDENTITY: Self = Self { a: 1.0, b: 0.0 };

    /// Least-squares similarity mapping `from` onto `to`; only the linear part
    /// is kept.
    pub fn between(from: &[Point], to: &[Point]) -> Self {
        let n = from.len().min(to.len());
        if n == 0 {
            return Self::IDENTITY;
        }

        let mean = |points: &[Point]| {
            let sum = points[..n].iter().fold(Point::zero(), |acc, p| acc + *p);
            sum * (1.0 / n as f64)
        };
        let from_mean = mean(from);
        let to_mean = mean(to);

        let (mut dot, mut cross, mut norm) = (0.0, 0.0, 0.0);
        for (f, t) in from[..n].iter().zip(&to[..n]) {
            let f = *f - from_mean;
            let t = *t - to_mean;
            dot += f.x * t.x + f.y * t.y;
            cross += f.x * t.y - f.y * t.x;
            norm += f.x * f.x + f.y * f.y;
        }

        if norm == 0.0 {
            return Self::IDENTITY;
        }
        Self {
            a: dot / norm,
            b: cross / norm,
        }
    }

    pub fn apply(&self, p: Point) -> Point {
        Point::new(self.a * p.x - self.b * p.y, self.b * p.x + self.a * p.y)
    }
}

/// A pixel sampled relative to a landmark of the current shape.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelAnchor {
    pub landmark: usize,
    /// Offset from the landmark in mean-shape coordinates.
    pub offset: Point,
}

/// Binary test on two sampled pixels: go left when
/// `pixels[idx1] - pixels[idx2] > threshold`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Split {
    pub idx1: usize,
    pub idx2: usize,
    pub threshold: f32,
}

/// A complete binary regression tree stored breadth-first.
///
/// Split `i` has children `2i + 1` and `2i + 2`; node indices past the
/// splits address the leaves.
#[derive(Debug, Clone, PartialEq)]
pub struct RegressionTree {
    splits: Vec<Split>,
    leaves: Vec<Vec<Point>>,
}

impl RegressionTree {
    pub fn new(splits: Vec<Split>, leaves: Vec<Vec<Point>>) -> Result<Self> {
        if leaves.len() != splits.len() + 1 {
            return Err(Error::InvalidModel(format!(
                "Tree with {} splits needs {} leaves, got {}",
                splits.len(),
                splits.len() + 1,
                leaves.len()
            )));
        }
        Ok(Self { splits, leaves })
    }

    /// Leaf delta selected by the sampled pixel intensities.
    pub fn leaf(&self, pixels: &[f32]) -> &[Point] {
        let mut node = 0;
        while node < self.splits.len() {
            let split = &self.splits[node];
            node = if pixels[split.idx1] - pixels[split.idx2] > split.threshold {
                2 * node + 1
            } else {
                2 * node + 2
            };
        }
        &self.leaves[node - self.splits.len()]
    }

    pub fn depth(&self) -> usize {
        // Complete tree: leaves = 2^depth.
        self.leaves.len().trailing_zeros() as usize
    }
}

/// One cascade level: the pixels it samples and the trees reading them.
#[derive(Debug, Clone, PartialEq)]
pub struct CascadeStage {
    anchors: Vec<PixelAnchor>,
    trees: Vec<RegressionTree>,
}

impl CascadeStage {
    pub fn new(anchors: Vec<PixelAnchor>, trees: Vec<RegressionTree>) -> Self {
        Self { anchors, trees }
    }
}

/// Trained landmark model: mean shape plus cascade.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapePredictor {
    mean_shape: Vec<Point>,
    stages: Vec<CascadeStage>,
}

impl ShapePredictor {
    /// Build a predictor, checking that every index the cascade uses is in range.
    pub fn new(mean_shape: Vec<Point>, stages: Vec<CascadeStage>) -> Result<Self> {
        let num_landmarks = mean_shape.len();
        if num_landmarks == 0 {
            return Err(Error::InvalidModel("Mean shape has no landmarks".into()));
        }

        for (level, stage) in stages.iter().enumerate() {
            if let Some(anchor) = stage.anchors.iter().find(|a| a.landmark >= num_landmarks) {
                return Err(Error::InvalidModel(format!(
                    "Stage {level}: anchor landmark {} out of range",
                    anchor.landmark
                )));
            }
            for tree in &stage.trees {
                let bad_split = tree
                    .splits
                    .iter()
                    .any(|s| s.idx1 >= stage.anchors.len() || s.idx2 >= stage.anchors.len());
                if bad_split {
                    return Err(Error::InvalidModel(format!(
                        "Stage {level}: split pixel index out of range"
                    )));
                }
                if tree.leaves.iter().any(|leaf| leaf.len() != num_landmarks) {
                    return Err(Error::InvalidModel(format!(
                        "Stage {level}: leaf delta does not have {num_landmarks} points"
                    )));
                }
            }
        }

        Ok(Self { mean_shape, stages })
    }

    pub fn num_landmarks(&self) -> usize {
        self.mean_shape.len()
    }

    pub fn num_cascade_stages(&self) -> usize {
        self.stages.len()
    }

    /// Regression trees across all stages.
    pub fn num_trees(&self) -> usize {
        self.stages.iter().map(|stage| stage.trees.len()).sum()
    }

    /// Predict landmarks, in image coordinates, for the face inside `face`.
    pub fn predict<I: ImageAccess>(&self, image: &I, face: &BoundingBox) -> Vec<Point> {
        let mut shape = self.mean_shape.clone();
        let mut pixels = Vec::new();

        for stage in &self.stages {
            let tform = SimilarityTransform::between(&self.mean_shape, &shape);

            pixels.clear();
            pixels.extend(stage.anchors.iter().map(|anchor| {
                let p = tform.apply(anchor.offset) + shape[anchor.landmark];
                sample(image, face.denormalize_point(p))
            }));

            for tree in &stage.trees {
                for (point, delta) in shape.iter_mut().zip(tree.leaf(&pixels)) {
                    *point = *point + *delta;
                }
            }
        }

        shape
            .into_iter()
            .map(|p| face.denormalize_point(p))
            .collect()
    }
}

/// Nearest-pixel intensity.
fn sample<I: ImageAccess>(image: &I, p: Point) -> f32 {
    image.get_pixel(p.x.round() as i64, p.y.round() as i64) as f32
}
