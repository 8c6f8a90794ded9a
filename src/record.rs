use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::features::FacialFeatures;

/// Categorical expression label of one face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Expression {
    Angry,
    Disgust,
    Fear,
    Joy,
    Sadness,
    Surprise,
    Neutral,
    /// Sentinel for a label that could not be inferred.
    #[serde(rename = "ERROR")]
    Error,
}

impl Expression {
    pub const ALL: [Expression; 8] = [
        Expression::Angry,
        Expression::Disgust,
        Expression::Fear,
        Expression::Joy,
        Expression::Sadness,
        Expression::Surprise,
        Expression::Neutral,
        Expression::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Expression::Angry => "Angry",
            Expression::Disgust => "Disgust",
            Expression::Fear => "Fear",
            Expression::Joy => "Joy",
            Expression::Sadness => "Sadness",
            Expression::Surprise => "Surprise",
            Expression::Neutral => "Neutral",
            Expression::Error => "ERROR",
        }
    }

    /// Whether a classifier may be trained on this label.
    pub fn is_trainable(&self) -> bool {
        !matches!(self, Expression::Neutral | Expression::Error)
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Expression {
    type Err = String;

    /// Parses canonical names plus the folder and classifier spellings
    /// (`Anger`, `Sad`, `Surprised`) used by older datasets.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Angry" | "Anger" => Ok(Expression::Angry),
            "Disgust" => Ok(Expression::Disgust),
            "Fear" => Ok(Expression::Fear),
            "Joy" => Ok(Expression::Joy),
            "Sadness" | "Sad" => Ok(Expression::Sadness),
            "Surprise" | "Surprised" => Ok(Expression::Surprise),
            "Neutral" => Ok(Expression::Neutral),
            "ERROR" => Ok(Expression::Error),
            other => Err(format!("unknown expression label {other:?}")),
        }
    }
}

/// One labeled feature vector: a single row of a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FacialFeatureRecord {
    pub label: Expression,
    pub features: FacialFeatures,
}

impl FacialFeatureRecord {
    pub fn new(label: Expression, features: FacialFeatures) -> Self {
        Self { label, features }
    }
}
