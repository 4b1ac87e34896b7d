use ndarray::{Array1, Array2, Array3, ArrayView1, s};

/// Loss over vocabulary scores at every position of a sequence batch.
///
/// Scores have shape (batch, time, vocab) and targets are integer indices
/// of shape (batch, time).
pub trait SequenceLoss {
    /// Compute the scalar loss between scores and target indices
    fn compute_loss(&self, scores: &Array3<f64>, targets: &Array2<usize>) -> f64;

    /// Compute the gradient of the loss with respect to the scores
    fn compute_gradient(&self, scores: &Array3<f64>, targets: &Array2<usize>) -> Array3<f64>;
}

/// Temporal softmax cross-entropy loss.
///
/// Applies a cross-entropy loss at every timestep, summing over timesteps
/// and averaging over the minibatch. Positions whose target equals
/// `ignore_index` contribute nothing to either the loss or the gradient,
/// so captions of different lengths can be padded into one minibatch.
#[derive(Clone, Debug)]
pub struct TemporalSoftmaxLoss {
    pub ignore_index: Option<usize>,
}

impl TemporalSoftmaxLoss {
    pub fn new(ignore_index: Option<usize>) -> Self {
        TemporalSoftmaxLoss { ignore_index }
    }

    fn is_ignored(&self, target: usize) -> bool {
        self.ignore_index == Some(target)
    }
}

impl SequenceLoss for TemporalSoftmaxLoss {
    fn compute_loss(&self, scores: &Array3<f64>, targets: &Array2<usize>) -> f64 {
        let (batch, time, vocab) = scores.dim();
        assert_eq!(targets.dim(), (batch, time), "Target shape mismatch");

        let mut loss = 0.0;
        for n in 0..batch {
            for t in 0..time {
                let target = targets[[n, t]];
                if self.is_ignored(target) {
                    continue;
                }
                assert!(target < vocab, "Target index {} out of vocabulary size {}", target, vocab);

                let row = scores.slice(s![n, t, ..]);
                // Stable log-sum-exp: shift by the row maximum
                let max_val = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
                let log_sum_exp = max_val + row.iter().map(|&v| (v - max_val).exp()).sum::<f64>().ln();

                loss += log_sum_exp - row[target];
            }
        }

        loss / batch as f64
    }

    fn compute_gradient(&self, scores: &Array3<f64>, targets: &Array2<usize>) -> Array3<f64> {
        let (batch, time, vocab) = scores.dim();
        assert_eq!(targets.dim(), (batch, time), "Target shape mismatch");

        let mut grad = Array3::zeros((batch, time, vocab));
        let inv_batch = 1.0 / batch as f64;

        for n in 0..batch {
            for t in 0..time {
                let target = targets[[n, t]];
                if self.is_ignored(target) {
                    continue;
                }

                let probs = softmax(&scores.slice(s![n, t, ..]));
                let mut grad_row = grad.slice_mut(s![n, t, ..]);
                grad_row.assign(&(&probs * inv_batch));
                grad_row[target] -= inv_batch;
            }
        }

        grad
    }
}

/// Numerically stable softmax over a score vector.
pub fn softmax(logits: &ArrayView1<f64>) -> Array1<f64> {
    let max_val = logits.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let exp_vals: Array1<f64> = logits.mapv(|v| (v - max_val).exp());
    let sum: f64 = exp_vals.sum();
    exp_vals / sum
}
