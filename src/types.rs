use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Number of landmarks in the iBUG 68-point annotation scheme.
pub const NUM_LANDMARKS: usize = 68;

/// A 2D point with real-valued coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub const fn zero() -> Self {
        Self { x: 0.0, y: 0.0 }
    }

    /// Euclidean distance between two points.
    pub fn distance(&self, other: &Point) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Distance from the origin.
    pub fn magnitude(&self) -> f64 {
        self.distance(&Point::zero())
    }

    /// Unit vector in the direction of this point.
    ///
    /// Returns `None` for the zero vector, which has no direction.
    pub fn normalise(&self) -> Option<Point> {
        let magnitude = self.magnitude();
        if magnitude == 0.0 {
            return None;
        }
        Some(Point::new(self.x / magnitude, self.y / magnitude))
    }
}

impl std::ops::Add for Point {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
        }
    }
}

impl std::ops::Sub for Point {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
        }
    }
}

impl std::ops::Mul<f64> for Point {
    type Output = Self;

    fn mul(self, rhs: f64) -> Self::Output {
        Self {
            x: self.x * rhs,
            y: self.y * rhs,
        }
    }
}

/// A bounding box defined by top-left corner, width, and height.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Map a point from box-normalised [0,1] coordinates to image coordinates.
    pub fn denormalize_point(&self, p: Point) -> Point {
        Point::new(self.x + p.x * self.width, self.y + p.y * self.height)
    }
}

/// The 68 anatomical landmarks of one detected face.
///
/// Indexing follows the iBUG scheme: jaw 0-16, eyebrows 17-26, nose 27-35,
/// eyes 36-47, outer lip 48-59, inner lip 60-67.
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkSet {
    points: [Point; NUM_LANDMARKS],
}

impl LandmarkSet {
    pub fn new(points: [Point; NUM_LANDMARKS]) -> Self {
        Self { points }
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn iter(&self) -> impl Iterator<Item = &Point> {
        self.points.iter()
    }

    /// Uniformly scale every coordinate by `factor`.
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            points: self.points.map(|p| p * factor),
        }
    }
}

impl TryFrom<Vec<Point>> for LandmarkSet {
    type Error = Error;

    fn try_from(points: Vec<Point>) -> Result<Self> {
        let found = points.len();
        let points: [Point; NUM_LANDMARKS] =
            points.try_into().map_err(|_| Error::LandmarkCount {
                expected: NUM_LANDMARKS,
                found,
            })?;
        Ok(Self { points })
    }
}

impl std::ops::Index<usize> for LandmarkSet {
    type Output = Point;

    fn index(&self, idx: usize) -> &Self::Output {
        &self.points[idx]
    }
}
