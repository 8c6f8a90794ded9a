//! Evaluation of a trained classifier against a labelled dataset.

use serde::Serialize;
use tracing::{info, warn};

use crate::classifier::Classifier;
use crate::dataset::Dataset;
use crate::error::{Error, Result};
use crate::record::Expression;

/// Probabilities are clamped to this floor before taking logarithms.
const PROBABILITY_FLOOR: f64 = 1e-15;

/// Per-class figures.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassMetrics {
    pub expression: Expression,
    /// Rows whose true label is this class.
    pub support: usize,
    pub precision: f64,
    pub recall: f64,
    /// Mean log loss over this class's rows; 0 without support.
    pub log_loss: f64,
}

/// Multiclass evaluation report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationMetrics {
    /// Fraction of rows predicted correctly.
    pub micro_accuracy: f64,
    /// Mean recall over classes with support.
    pub macro_accuracy: f64,
    pub log_loss: f64,
    /// `1 - log_loss / prior_log_loss`, where the prior predicts the label
    /// frequencies of the evaluated rows.
    pub log_loss_reduction: f64,
    pub per_class: Vec<ClassMetrics>,
    /// `confusion[truth][predicted]`, indexed in class order.
    pub confusion: Vec<Vec<usize>>,
    pub rows_evaluated: usize,
    /// Rows whose label the model cannot predict.
    pub rows_skipped: usize,
}

impl EvaluationMetrics {
    pub fn classes(&self) -> impl Iterator<Item = Expression> + '_ {
        self.per_class.iter().map(|c| c.expression)
    }
}

/// Score `classifier` on every row of `dataset` whose label is in its universe.
pub fn evaluate(classifier: &Classifier, dataset: &Dataset) -> Result<EvaluationMetrics> {
    let classes = classifier.classes();
    let k = classes.len();

    let mut confusion = vec![vec![0usize; k]; k];
    let mut class_loss = vec![0.0f64; k];
    let mut rows_skipped = 0;

    for record in dataset.iter() {
        let Some(truth) = classes.iter().position(|c| *c == record.label) else {
            rows_skipped += 1;
            continue;
        };
        let prediction = classifier.predict(&record.features);
        let predicted = classes
            .iter()
            .position(|c| *c == prediction.label)
            .unwrap_or(truth);
        let p_true = prediction
            .score_of(record.label)
            .map(f64::from)
            .unwrap_or_default();

        confusion[truth][predicted] += 1;
        class_loss[truth] += -p_true.clamp(PROBABILITY_FLOOR, 1.0).ln();
    }

    if rows_skipped > 0 {
        warn!(rows_skipped, "rows with labels outside the model were not evaluated");
    }

    let support: Vec<usize> = confusion.iter().map(|row| row.iter().sum()).collect();
    let rows_evaluated: usize = support.iter().sum();
    if rows_evaluated == 0 {
        return Err(Error::EmptyDataset);
    }
    let n = rows_evaluated as f64;

    let correct: usize = (0..k).map(|c| confusion[c][c]).sum();
    let predicted_totals: Vec<usize> = (0..k)
        .map(|c| confusion.iter().map(|row| row[c]).sum())
        .collect();

    let per_class: Vec<ClassMetrics> = (0..k)
        .map(|c| ClassMetrics {
            expression: classes[c],
            support: support[c],
            precision: ratio(confusion[c][c], predicted_totals[c]),
            recall: ratio(confusion[c][c], support[c]),
            log_loss: if support[c] > 0 {
                class_loss[c] / support[c] as f64
            } else {
                0.0
            },
        })
        .collect();

    let present: Vec<&ClassMetrics> = per_class.iter().filter(|c| c.support > 0).collect();
    let macro_accuracy = present.iter().map(|c| c.recall).sum::<f64>() / present.len() as f64;

    let log_loss = class_loss.iter().sum::<f64>() / n;
    let prior_log_loss: f64 = support
        .iter()
        .filter(|s| **s > 0)
        .map(|s| {
            let p = *s as f64 / n;
            -p * p.ln()
        })
        .sum();
    let log_loss_reduction = if prior_log_loss > 0.0 {
        1.0 - log_loss / prior_log_loss
    } else {
        0.0
    };

    let metrics = EvaluationMetrics {
        micro_accuracy: correct as f64 / n,
        macro_accuracy,
        log_loss,
        log_loss_reduction,
        per_class,
        confusion,
        rows_evaluated,
        rows_skipped,
    };
    info!(
        rows = rows_evaluated,
        micro_accuracy = metrics.micro_accuracy,
        macro_accuracy = metrics.macro_accuracy,
        log_loss = metrics.log_loss,
        "evaluation finished"
    );
    Ok(metrics)
}

/// Fraction, with an empty denominator yielding 0.
fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator > 0 {
        numerator as f64 / denominator as f64
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::TrainingOptions;
    use crate::features::{FacialFeatures, NUM_FEATURES};
    use crate::record::FacialFeatureRecord;

    fn record(label: Expression, value: f64) -> FacialFeatureRecord {
        FacialFeatureRecord::new(label, FacialFeatures::from_array([value; NUM_FEATURES]))
    }

    fn two_class_model() -> Classifier {
        let mut train = Dataset::new();
        for i in 0..8 {
            let jitter = i as f64 * 0.01;
            train.push(record(Expression::Fear, 1.0 + jitter));
            train.push(record(Expression::Joy, 5.0 + jitter));
        }
        Classifier::train(&train, &TrainingOptions::default()).unwrap()
    }

    #[test]
    fn perfect_predictions() {
        let model = two_class_model();
        let test: Dataset = [record(Expression::Fear, 1.0), record(Expression::Joy, 5.0)]
            .into_iter()
            .collect();

        let metrics = evaluate(&model, &test).unwrap();
        assert_eq!(metrics.rows_evaluated, 2);
        assert_eq!(metrics.micro_accuracy, 1.0);
        assert_eq!(metrics.macro_accuracy, 1.0);
        assert_eq!(metrics.confusion, vec![vec![1, 0], vec![0, 1]]);
        assert!(metrics.log_loss < 0.5);
        // Prior over a 50/50 split is ln 2.
        assert!(metrics.log_loss_reduction > 0.0);
        for class in &metrics.per_class {
            assert_eq!(class.precision, 1.0);
            assert_eq!(class.recall, 1.0);
        }
    }

    #[test]
    fn micro_and_macro_differ_on_imbalanced_errors() {
        let model = two_class_model();
        // Three Fear rows right, one Joy row that looks like Fear.
        let test: Dataset = [
            record(Expression::Fear, 1.0),
            record(Expression::Fear, 1.0),
            record(Expression::Fear, 1.0),
            record(Expression::Joy, 1.0),
        ]
        .into_iter()
        .collect();

        let metrics = evaluate(&model, &test).unwrap();
        assert_eq!(metrics.micro_accuracy, 0.75);
        assert_eq!(metrics.macro_accuracy, 0.5);

        let joy = &metrics.per_class[1];
        assert_eq!(joy.expression, Expression::Joy);
        assert_eq!(joy.recall, 0.0);
        // Nothing was predicted as Joy.
        assert_eq!(joy.precision, 0.0);
        assert_eq!(metrics.per_class[0].precision, 0.75);
        assert!(joy.log_loss > metrics.per_class[0].log_loss);
    }

    #[test]
    fn rows_outside_the_universe_are_skipped() {
        let model = two_class_model();
        let test: Dataset = [
            record(Expression::Fear, 1.0),
            record(Expression::Neutral, 3.0),
            record(Expression::Surprise, 3.0),
        ]
        .into_iter()
        .collect();

        let metrics = evaluate(&model, &test).unwrap();
        assert_eq!(metrics.rows_evaluated, 1);
        assert_eq!(metrics.rows_skipped, 2);
        // A single class has no prior uncertainty to reduce.
        assert_eq!(metrics.log_loss_reduction, 0.0);
    }

    #[test]
    fn nothing_to_evaluate() {
        let model = two_class_model();
        let test: Dataset = [record(Expression::Neutral, 3.0)].into_iter().collect();
        assert!(matches!(evaluate(&model, &test), Err(Error::EmptyDataset)));
    }

    #[test]
    fn ratio_guards_zero_denominator() {
        assert_eq!(ratio(3, 0), 0.0);
        assert_eq!(ratio(1, 4), 0.25);
    }
}
