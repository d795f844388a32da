use serde::{Deserialize, Serialize};

/// Probabilities are clamped to this before taking logarithms
const LOG_LOSS_EPSILON: f64 = 1e-15;

/// Evaluation results of a multi-class classifier on a labeled set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MulticlassMetrics {
    /// Mean of the per-class accuracies, over classes present in the evaluation set
    pub macro_accuracy: f64,

    /// Fraction of rows predicted correctly
    pub micro_accuracy: f64,

    /// Mean negative log probability of the true class
    pub log_loss: f64,

    /// `1 - log_loss / prior_log_loss`, where the prior predicts the evaluation class frequencies
    pub log_loss_reduction: f64,

    /// Recall of every class, `None` for classes absent from the evaluation set
    pub per_class_accuracy: Vec<Option<f64>>,

    /// Row counts indexed by `[true class][predicted class]`
    pub confusion_matrix: Vec<Vec<usize>>,
}

impl MulticlassMetrics {
    /// Score predicted class probabilities against the true class ids
    pub fn evaluate(targets: &[usize], probabilities: &[Vec<f32>], n_classes: usize) -> Self {
        let mut confusion_matrix = vec![vec![0usize; n_classes]; n_classes];
        let mut log_loss = 0.0;

        for (&target, scores) in targets.iter().zip(probabilities) {
            confusion_matrix[target][argmax(scores)] += 1;

            let p = scores.get(target).copied().unwrap_or_default() as f64;
            log_loss -= p.max(LOG_LOSS_EPSILON).ln();
        }

        let rows = targets.len();
        let correct: usize = (0..n_classes).map(|c| confusion_matrix[c][c]).sum();

        let support: Vec<usize> = confusion_matrix.iter().map(|row| row.iter().sum()).collect();
        let per_class_accuracy: Vec<Option<f64>> = support
            .iter()
            .enumerate()
            .map(|(c, &n)| (n > 0).then(|| confusion_matrix[c][c] as f64 / n as f64))
            .collect();

        let log_loss = if rows > 0 { log_loss / rows as f64 } else { 0.0 };

        // Entropy of the evaluation class frequencies
        let prior_log_loss: f64 = support
            .iter()
            .filter(|&&n| n > 0)
            .map(|&n| {
                let p = n as f64 / rows as f64;
                -p * p.ln()
            })
            .sum();

        let log_loss_reduction = if prior_log_loss > 0.0 {
            1.0 - log_loss / prior_log_loss
        } else {
            0.0
        };

        Self {
            macro_accuracy: mean(per_class_accuracy.iter().flatten().copied()),
            micro_accuracy: if rows > 0 {
                correct as f64 / rows as f64
            } else {
                0.0
            },
            log_loss,
            log_loss_reduction,
            per_class_accuracy,
            confusion_matrix,
        }
    }

    /// Combine fold results: scalar metrics are averaged, confusion matrices are summed
    pub fn averaged(folds: &[MulticlassMetrics]) -> Option<Self> {
        let first = folds.first()?;
        let n_classes = first.confusion_matrix.len();

        let mut confusion_matrix = vec![vec![0usize; n_classes]; n_classes];
        for fold in folds {
            for (total, row) in confusion_matrix.iter_mut().zip(&fold.confusion_matrix) {
                for (t, n) in total.iter_mut().zip(row) {
                    *t += n;
                }
            }
        }

        let per_class_accuracy = (0..n_classes)
            .map(|c| {
                let present: Vec<f64> = folds
                    .iter()
                    .filter_map(|fold| fold.per_class_accuracy.get(c).copied().flatten())
                    .collect();
                (!present.is_empty()).then(|| mean(present.into_iter()))
            })
            .collect();

        Some(Self {
            macro_accuracy: mean(folds.iter().map(|f| f.macro_accuracy)),
            micro_accuracy: mean(folds.iter().map(|f| f.micro_accuracy)),
            log_loss: mean(folds.iter().map(|f| f.log_loss)),
            log_loss_reduction: mean(folds.iter().map(|f| f.log_loss_reduction)),
            per_class_accuracy,
            confusion_matrix,
        })
    }
}

/// Index of the highest score, the first one on ties
pub fn argmax(scores: &[f32]) -> usize {
    scores
        .iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |(best, max), (i, &s)| {
            if s > max {
                (i, s)
            } else {
                (best, max)
            }
        })
        .0
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));

    if count > 0 {
        sum / count as f64
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn accuracies_follow_the_confusion_matrix() {
        // class 0: 2 of 3 right, class 1: 1 of 1 right
        let targets = [0, 0, 0, 1];
        let probabilities = vec![
            vec![0.9, 0.1],
            vec![0.8, 0.2],
            vec![0.4, 0.6],
            vec![0.3, 0.7],
        ];

        let metrics = MulticlassMetrics::evaluate(&targets, &probabilities, 2);

        assert_eq!(metrics.confusion_matrix, vec![vec![2, 1], vec![0, 1]]);
        assert_eq!(metrics.micro_accuracy, 0.75);
        assert!((metrics.macro_accuracy - (2.0 / 3.0 + 1.0) / 2.0).abs() < 1e-12);
    }

    #[test]
    fn absent_classes_do_not_drag_the_macro_average() {
        let metrics = MulticlassMetrics::evaluate(&[0, 0], &[vec![1.0, 0.0], vec![1.0, 0.0]], 2);

        assert_eq!(metrics.per_class_accuracy, vec![Some(1.0), None]);
        assert_eq!(metrics.macro_accuracy, 1.0);
    }

    #[test]
    fn log_loss_is_clamped() {
        let metrics = MulticlassMetrics::evaluate(&[1], &[vec![1.0, 0.0]], 2);

        assert!(metrics.log_loss.is_finite());
        assert!((metrics.log_loss - 1e-15f64.ln().abs()).abs() < 1e-6);
    }

    #[test]
    fn uniform_predictions_have_no_log_loss_reduction() {
        let metrics = MulticlassMetrics::evaluate(&[0, 1], &[vec![0.5, 0.5], vec![0.5, 0.5]], 2);

        assert!(metrics.log_loss_reduction.abs() < 1e-6);
    }

    #[test]
    fn folds_are_averaged() {
        let a = MulticlassMetrics::evaluate(&[0, 1], &[vec![0.9, 0.1], vec![0.2, 0.8]], 2);
        let b = MulticlassMetrics::evaluate(&[0, 1], &[vec![0.1, 0.9], vec![0.2, 0.8]], 2);

        let averaged = MulticlassMetrics::averaged(&[a, b]).unwrap();

        assert_eq!(averaged.micro_accuracy, 0.75);
        assert_eq!(averaged.confusion_matrix, vec![vec![1, 1], vec![0, 2]]);
        assert_eq!(averaged.per_class_accuracy, vec![Some(0.5), Some(1.0)]);
        assert!(MulticlassMetrics::averaged(&[]).is_none());
    }

    #[test]
    fn argmax_prefers_the_first_maximum() {
        assert_eq!(argmax(&[0.2, 0.4, 0.4]), 1);
        assert_eq!(argmax(&[]), 0);
    }
}
