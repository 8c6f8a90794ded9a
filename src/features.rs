//! Geometric expression features computed from 68-point landmarks.
//!
//! Every feature is a ratio of two Euclidean distances measured on the same
//! face, which makes it independent of image resolution and subject distance
//! (but not of head rotation).

use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{LandmarkSet, Point};

/// How a feature measures its landmarks once the normaliser is fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Measurement {
    /// Sum of normalised distances from every landmark in `start..=end`
    /// to the inner landmark.
    Aggregate { start: usize, end: usize },
    /// Normalised distance between two landmarks.
    Pair { first: usize, second: usize },
}

/// One row of the anatomical index table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureSpec {
    /// Dataset column name.
    pub name: &'static str,
    /// Reference landmark; also one end of the normalising distance.
    pub inner: usize,
    /// Other end of the normalising distance.
    pub normalise: usize,
    pub measurement: Measurement,
}

impl FeatureSpec {
    /// Evaluate this feature on a landmark set.
    pub fn evaluate(&self, landmarks: &LandmarkSet) -> Result<f64> {
        match self.measurement {
            Measurement::Aggregate { start, end } => {
                aggregated_feature(landmarks, self.inner, self.normalise, start..=end)
            }
            Measurement::Pair { first, second } => {
                normalized_distance(landmarks, self.inner, self.normalise, first, second)
            }
        }
    }
}

/// The feature space, in dataset column order.
///
/// Changing any index here invalidates every previously extracted dataset
/// and every classifier trained on one.
pub const FEATURE_TABLE: [FeatureSpec; 6] = [
    FeatureSpec {
        name: "LeftEyebrow",
        inner: 39,
        normalise: 21,
        measurement: Measurement::Aggregate { start: 18, end: 21 },
    },
    FeatureSpec {
        name: "RightEyebrow",
        inner: 42,
        normalise: 22,
        measurement: Measurement::Aggregate { start: 22, end: 25 },
    },
    FeatureSpec {
        name: "LeftLip",
        inner: 33,
        normalise: 51,
        measurement: Measurement::Aggregate { start: 48, end: 50 },
    },
    FeatureSpec {
        name: "RightLip",
        inner: 33,
        normalise: 51,
        measurement: Measurement::Aggregate { start: 52, end: 54 },
    },
    FeatureSpec {
        name: "LipHeight",
        inner: 33,
        normalise: 51,
        measurement: Measurement::Pair {
            first: 51,
            second: 57,
        },
    },
    FeatureSpec {
        name: "LipWidth",
        inner: 33,
        normalise: 51,
        measurement: Measurement::Pair {
            first: 48,
            second: 54,
        },
    },
];

/// Number of scalar features per face.
pub const NUM_FEATURES: usize = FEATURE_TABLE.len();

fn landmark(landmarks: &LandmarkSet, index: usize) -> Result<Point> {
    landmarks
        .points()
        .get(index)
        .copied()
        .ok_or(Error::LandmarkIndex { index })
}

/// Distance between `first` and `second`, divided by the distance between
/// `inner` and `normalise`.
///
/// Fails with [`Error::DegenerateLandmarks`] when the normalising distance is
/// zero instead of producing an infinite or NaN ratio.
pub fn normalized_distance(
    landmarks: &LandmarkSet,
    inner: usize,
    normalise: usize,
    first: usize,
    second: usize,
) -> Result<f64> {
    let normaliser = landmark(landmarks, inner)?.distance(&landmark(landmarks, normalise)?);
    if normaliser == 0.0 || !normaliser.is_finite() {
        return Err(Error::DegenerateLandmarks { inner, normalise });
    }

    let distance = landmark(landmarks, first)?.distance(&landmark(landmarks, second)?);
    Ok(distance / normaliser)
}

/// Sum of the normalised distances from each landmark in `range` to `inner`.
pub fn aggregated_feature(
    landmarks: &LandmarkSet,
    inner: usize,
    normalise: usize,
    range: RangeInclusive<usize>,
) -> Result<f64> {
    range.into_iter().try_fold(0.0, |sum, i| -> Result<f64> {
        Ok(sum + normalized_distance(landmarks, inner, normalise, i, inner)?)
    })
}

/// The six expression features of one face.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FacialFeatures {
    pub left_eyebrow_raise: f64,
    pub right_eyebrow_raise: f64,
    pub left_lip_curl: f64,
    pub right_lip_curl: f64,
    pub lip_height: f64,
    pub lip_width: f64,
}

impl FacialFeatures {
    /// Compute all features of one face from its landmarks.
    pub fn from_landmarks(landmarks: &LandmarkSet) -> Result<Self> {
        let mut values = [0.0; NUM_FEATURES];
        for (value, spec) in values.iter_mut().zip(FEATURE_TABLE.iter()) {
            *value = spec.evaluate(landmarks)?;
        }
        Ok(Self::from_array(values))
    }

    /// Features in dataset column order.
    pub fn to_array(&self) -> [f64; NUM_FEATURES] {
        [
            self.left_eyebrow_raise,
            self.right_eyebrow_raise,
            self.left_lip_curl,
            self.right_lip_curl,
            self.lip_height,
            self.lip_width,
        ]
    }

    pub fn from_array(values: [f64; NUM_FEATURES]) -> Self {
        let [left_eyebrow_raise, right_eyebrow_raise, left_lip_curl, right_lip_curl, lip_height, lip_width] =
            values;
        Self {
            left_eyebrow_raise,
            right_eyebrow_raise,
            left_lip_curl,
            right_lip_curl,
            lip_height,
            lip_width,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NUM_LANDMARKS;
    use proptest::prelude::*;

    /// Left/right mirrored face with integer distances and a power-of-two
    /// normaliser, so every feature is exactly representable.
    fn symmetric_face() -> LandmarkSet {
        let mut points = [Point::zero(); NUM_LANDMARKS];
        let left = [
            (39, -8.0, 0.0),
            (21, -8.0, -8.0),
            (20, -14.0, -8.0),
            (19, -17.0, -12.0),
            (18, -20.0, -16.0),
            (17, -24.0, -12.0),
            (48, -12.0, 32.0),
            (49, -8.0, 22.0),
            (50, -6.0, 24.0),
        ];
        let mirror = [
            (39, 42),
            (21, 22),
            (20, 23),
            (19, 24),
            (18, 25),
            (17, 26),
            (48, 54),
            (49, 53),
            (50, 52),
        ];
        for ((idx, x, y), (_, partner)) in left.iter().zip(mirror.iter()) {
            points[*idx] = Point::new(*x, *y);
            points[*partner] = Point::new(-*x, *y);
        }
        points[33] = Point::new(0.0, 16.0);
        points[51] = Point::new(0.0, 24.0);
        points[57] = Point::new(0.0, 40.0);
        LandmarkSet::new(points)
    }

    #[test]
    fn golden_feature_vector() {
        let features = FacialFeatures::from_landmarks(&symmetric_face()).unwrap();

        // (20 + 15 + 10 + 8) / 8
        assert_eq!(features.left_eyebrow_raise, 6.625);
        assert_eq!(features.right_eyebrow_raise, 6.625);
        // (20 + 10 + 10) / 8
        assert_eq!(features.left_lip_curl, 5.0);
        assert_eq!(features.right_lip_curl, 5.0);
        assert_eq!(features.lip_height, 2.0);
        assert_eq!(features.lip_width, 3.0);
    }

    #[test]
    fn symmetric_face_gives_equal_sides() {
        let f = FacialFeatures::from_landmarks(&symmetric_face()).unwrap();
        assert_eq!(f.left_eyebrow_raise, f.right_eyebrow_raise);
        assert_eq!(f.left_lip_curl, f.right_lip_curl);
    }

    #[test]
    fn single_point_range_matches_normalized_distance() {
        let face = symmetric_face();
        for i in [18, 48, 54, 60] {
            let aggregate = aggregated_feature(&face, 33, 51, i..=i).unwrap();
            let single = normalized_distance(&face, 33, 51, i, 33).unwrap();
            assert_eq!(aggregate, single);
        }
    }

    #[test]
    fn zero_normaliser_is_degenerate() {
        let face = LandmarkSet::new([Point::new(5.0, 5.0); NUM_LANDMARKS]);
        let err = normalized_distance(&face, 39, 21, 18, 39).unwrap_err();
        assert!(matches!(
            err,
            Error::DegenerateLandmarks {
                inner: 39,
                normalise: 21
            }
        ));
        assert!(FacialFeatures::from_landmarks(&face).is_err());
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let err = normalized_distance(&symmetric_face(), 33, 51, 68, 33).unwrap_err();
        assert!(matches!(err, Error::LandmarkIndex { index: 68 }));
    }

    #[test]
    fn array_order_matches_table() {
        let f = FacialFeatures::from_landmarks(&symmetric_face()).unwrap();
        let values = f.to_array();
        for (spec, value) in FEATURE_TABLE.iter().zip(values) {
            assert_eq!(spec.evaluate(&symmetric_face()).unwrap(), value, "{}", spec.name);
        }
        assert_eq!(FacialFeatures::from_array(values), f);
    }

    proptest! {
        #[test]
        fn features_are_scale_invariant(k in 0.01f64..1000.0) {
            let face = symmetric_face();
            let base = FacialFeatures::from_landmarks(&face).unwrap().to_array();
            let scaled = FacialFeatures::from_landmarks(&face.scaled(k)).unwrap().to_array();
            for (a, b) in base.iter().zip(scaled.iter()) {
                prop_assert!((a - b).abs() <= 1e-9 * a.abs().max(1.0));
            }
        }
    }
}
