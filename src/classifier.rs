//! Multiclass maximum-entropy (softmax regression) expression classifier.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::ClassifierSettings;
use crate::dataset::Dataset;
use crate::error::{Error, Result};
use crate::features::{FacialFeatures, NUM_FEATURES};
use crate::record::Expression;

/// Gradient-descent hyper-parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainingOptions {
    pub learning_rate: f64,
    pub epochs: usize,
    /// L2 penalty on the weights (not the biases).
    pub l2: f64,
}

impl Default for TrainingOptions {
    fn default() -> Self {
        Self::from(&ClassifierSettings::default())
    }
}

impl From<&ClassifierSettings> for TrainingOptions {
    fn from(settings: &ClassifierSettings) -> Self {
        Self {
            learning_rate: settings.learning_rate,
            epochs: settings.epochs,
            l2: settings.l2,
        }
    }
}

/// Probability assigned to one class.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClassScore {
    pub expression: Expression,
    pub score: f32,
}

/// Predicted label plus the probability of every class, in class order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub label: Expression,
    pub scores: Vec<ClassScore>,
}

impl Prediction {
    /// Probability of the predicted label.
    pub fn confidence(&self) -> f32 {
        self.score_of(self.label).unwrap_or_default()
    }

    pub fn score_of(&self, expression: Expression) -> Option<f32> {
        self.scores
            .iter()
            .find(|s| s.expression == expression)
            .map(|s| s.score)
    }
}

/// A trained classifier over the six expression features.
///
/// Inputs are standardised with the training mean and standard deviation
/// before the linear layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classifier {
    classes: Vec<Expression>,
    mean: Array1<f64>,
    scale: Array1<f64>,
    /// (classes, features)
    weights: Array2<f64>,
    bias: Array1<f64>,
}

impl Classifier {
    /// Fit a classifier on the trainable rows of `dataset`.
    ///
    /// `Neutral` and `ERROR` rows are skipped. Training is deterministic.
    pub fn train(dataset: &Dataset, options: &TrainingOptions) -> Result<Self> {
        let rows: Vec<_> = dataset
            .iter()
            .filter(|record| record.label.is_trainable())
            .collect();
        let skipped = dataset.len() - rows.len();
        if skipped > 0 {
            info!(skipped, "ignoring rows without a trainable label");
        }
        if rows.is_empty() {
            return Err(Error::EmptyDataset);
        }

        let classes: Vec<Expression> = rows
            .iter()
            .map(|record| record.label)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let n = rows.len();
        let k = classes.len();

        let mut x = Array2::<f64>::zeros((n, NUM_FEATURES));
        let mut targets = Array2::<f64>::zeros((n, k));
        for (i, record) in rows.iter().enumerate() {
            x.row_mut(i).assign(&Array1::from(record.features.to_array().to_vec()));
            if let Some(c) = classes.iter().position(|e| *e == record.label) {
                targets[[i, c]] = 1.0;
            }
        }

        let mean = x.sum_axis(Axis(0)) / n as f64;
        let centered = &x - &mean;
        let variance = centered.mapv(|v| v * v).sum_axis(Axis(0)) / n as f64;
        let scale = variance.mapv(|v| if v > 0.0 { v.sqrt() } else { 1.0 });
        let z = centered / &scale;

        let mut weights = Array2::<f64>::zeros((k, NUM_FEATURES));
        let mut bias = Array1::<f64>::zeros(k);

        for epoch in 0..options.epochs {
            let mut probs = z.dot(&weights.t());
            probs += &bias;
            for mut row in probs.rows_mut() {
                softmax_inplace(&mut row);
            }

            let residual = &probs - &targets;
            let mut grad_w = residual.t().dot(&z);
            grad_w /= n as f64;
            grad_w.scaled_add(options.l2, &weights);
            let grad_b = residual.sum_axis(Axis(0)) / n as f64;

            weights.scaled_add(-options.learning_rate, &grad_w);
            bias.scaled_add(-options.learning_rate, &grad_b);

            if epoch % 100 == 0 {
                debug!(epoch, loss = cross_entropy(&probs, &targets), "training");
            }
        }

        info!(rows = n, classes = k, epochs = options.epochs, "trained classifier");
        Ok(Self {
            classes,
            mean,
            scale,
            weights,
            bias,
        })
    }

    /// Label universe, in score order.
    pub fn classes(&self) -> &[Expression] {
        &self.classes
    }

    /// Class probabilities for one feature vector, in class order.
    pub fn probabilities(&self, features: &FacialFeatures) -> Array1<f64> {
        let x = Array1::from(features.to_array().to_vec());
        let z = (x - &self.mean) / &self.scale;
        let mut logits = self.weights.dot(&z) + &self.bias;
        softmax_inplace(&mut logits.view_mut());
        logits
    }

    pub fn predict(&self, features: &FacialFeatures) -> Prediction {
        let probs = self.probabilities(features);
        let best = probs
            .iter()
            .enumerate()
            .fold(0, |best, (i, p)| if *p > probs[best] { i } else { best });

        Prediction {
            label: self.classes[best],
            scores: self
                .classes
                .iter()
                .zip(probs.iter())
                .map(|(expression, p)| ClassScore {
                    expression: *expression,
                    score: *p as f32,
                })
                .collect(),
        }
    }

    /// Save the model to a binary file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        let bytes = bincode::serialize(self)?;
        writer.write_all(&bytes)?;
        writer.flush()?;
        Ok(())
    }

    /// Load a model saved with [`save`](Self::save).
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::MissingModelArtifact {
                path: path.to_path_buf(),
            });
        }

        let mut reader = BufReader::new(File::open(path)?);
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        let model: Self = bincode::deserialize(&bytes)?;
        model.validate()?;
        Ok(model)
    }

    fn validate(&self) -> Result<()> {
        let k = self.classes.len();
        let consistent = k > 0
            && self.weights.dim() == (k, NUM_FEATURES)
            && self.bias.len() == k
            && self.mean.len() == NUM_FEATURES
            && self.scale.len() == NUM_FEATURES;
        if consistent {
            Ok(())
        } else {
            Err(Error::InvalidModel(
                "classifier dimensions do not match its classes".into(),
            ))
        }
    }
}

fn softmax_inplace(values: &mut ndarray::ArrayViewMut1<f64>) {
    let max = values.fold(f64::NEG_INFINITY, |m, &v| m.max(v));
    values.mapv_inplace(|v| (v - max).exp());
    let sum = values.sum();
    *values /= sum;
}

fn cross_entropy(probs: &Array2<f64>, targets: &Array2<f64>) -> f64 {
    let n = probs.nrows().max(1) as f64;
    -(targets * &probs.mapv(|p| p.max(1e-15).ln())).sum() / n
}
