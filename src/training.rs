use ndarray::Array2;
use std::time::Instant;

use crate::models::captioning::{CaptioningGradients, CaptioningRNN};
use crate::optimizers::{Optimizer, SGD};

/// One training example batch: image features and padded caption indices
pub type CaptionBatch = (Array2<f64>, Array2<usize>);

/// Configuration for training hyperparameters
pub struct TrainingConfig {
    pub epochs: usize,
    pub print_every: usize,
    pub clip_gradient: Option<f64>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        TrainingConfig {
            epochs: 100,
            print_every: 10,
            clip_gradient: Some(5.0),
        }
    }
}

/// Training metrics tracked during training
#[derive(Debug, Clone)]
pub struct TrainingMetrics {
    pub epoch: usize,
    pub train_loss: f64,
    pub validation_loss: Option<f64>,
    pub time_elapsed: f64,
}

/// Trainer for the captioning model with a configurable optimizer
pub struct CaptioningTrainer<O: Optimizer> {
    pub model: CaptioningRNN,
    pub optimizer: O,
    pub config: TrainingConfig,
    pub metrics_history: Vec<TrainingMetrics>,
}

impl<O: Optimizer> CaptioningTrainer<O> {
    pub fn new(model: CaptioningRNN, optimizer: O) -> Self {
        CaptioningTrainer {
            model,
            optimizer,
            config: TrainingConfig::default(),
            metrics_history: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: TrainingConfig) -> Self {
        self.config = config;
        self
    }

    /// Run one optimization step on a minibatch and return its loss
    pub fn train_batch(&mut self, features: &Array2<f64>, captions: &Array2<usize>) -> f64 {
        let (loss, cache) = self.model.forward_with_cache(features, captions);
        let mut gradients = self.model.backward(&cache);

        if let Some(clip_value) = self.config.clip_gradient {
            clip_gradients(&mut gradients, clip_value);
        }

        self.model.update_parameters(&gradients, &mut self.optimizer);

        loss
    }

    /// Train for multiple epochs with optional validation
    pub fn train(&mut self, train_data: &[CaptionBatch], validation_data: Option<&[CaptionBatch]>) {
        println!("Starting training for {} epochs...", self.config.epochs);

        for epoch in 0..self.config.epochs {
            let start_time = Instant::now();
            let mut epoch_loss = 0.0;

            for (features, captions) in train_data {
                epoch_loss += self.train_batch(features, captions);
            }
            epoch_loss /= train_data.len().max(1) as f64;

            let validation_loss = validation_data.map(|val_data| self.evaluate(val_data));
            let time_elapsed = start_time.elapsed().as_secs_f64();

            let metrics = TrainingMetrics {
                epoch,
                train_loss: epoch_loss,
                validation_loss,
                time_elapsed,
            };
            self.metrics_history.push(metrics);

            if epoch % self.config.print_every == 0 {
                match validation_loss {
                    Some(val_loss) => println!(
                        "Epoch {}: Train Loss: {:.6}, Val Loss: {:.6}, Time: {:.2}s",
                        epoch, epoch_loss, val_loss, time_elapsed
                    ),
                    None => println!(
                        "Epoch {}: Train Loss: {:.6}, Time: {:.2}s",
                        epoch, epoch_loss, time_elapsed
                    ),
                }
            }
        }

        println!("Training completed!");
    }

    /// Compute the loss over a dataset without updating parameters
    pub fn evaluate(&mut self, data: &[CaptionBatch]) -> f64 {
        let mut total_loss = 0.0;
        let mut total_batches = 0;

        for (features, captions) in data {
            total_loss += self.model.forward(features, captions);
            total_batches += 1;
        }

        if total_batches > 0 {
            total_loss / total_batches as f64
        } else {
            0.0
        }
    }

    pub fn get_latest_metrics(&self) -> Option<&TrainingMetrics> {
        self.metrics_history.last()
    }

    pub fn get_metrics_history(&self) -> &[TrainingMetrics] {
        &self.metrics_history
    }
}

/// Clip each gradient matrix by its Frobenius norm to prevent exploding
/// gradients through the recurrence
fn clip_gradients(gradients: &mut CaptioningGradients, max_norm: f64) {
    clip_gradient_matrix(&mut gradients.feature_proj.weight, max_norm);
    clip_gradient_matrix(&mut gradients.feature_proj.bias, max_norm);
    clip_gradient_matrix(&mut gradients.embedding.weight, max_norm);
    clip_gradient_matrix(&mut gradients.rnn.w_xh, max_norm);
    clip_gradient_matrix(&mut gradients.rnn.w_hh, max_norm);
    clip_gradient_matrix(&mut gradients.rnn.b, max_norm);
    clip_gradient_matrix(&mut gradients.output_proj.weight, max_norm);
    clip_gradient_matrix(&mut gradients.output_proj.bias, max_norm);
}

fn clip_gradient_matrix(matrix: &mut Array2<f64>, max_norm: f64) {
    let norm = (&*matrix * &*matrix).sum().sqrt();
    if norm > max_norm {
        let scale = max_norm / norm;
        matrix.mapv_inplace(|x| x * scale);
    }
}

/// Create a basic trainer with an SGD optimizer
pub fn create_basic_trainer(model: CaptioningRNN, learning_rate: f64) -> CaptioningTrainer<SGD> {
    CaptioningTrainer::new(model, SGD::new(learning_rate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;
    use crate::vocab::Vocabulary;

    fn tiny_dataset() -> (CaptioningRNN, Vec<CaptionBatch>) {
        let vocab = Vocabulary::from_captions(["a cat sat", "a dog ran"]);
        let model = CaptioningRNN::new(vocab.clone(), 4, 3, 5);

        let mut features = Array2::zeros((2, 4));
        for (i, v) in features.iter_mut().enumerate() {
            *v = ((i * 3 % 7) as f64) * 0.2 - 0.5;
        }

        let c0 = vocab.encode_caption("a cat sat", 6).unwrap();
        let c1 = vocab.encode_caption("a dog ran", 6).unwrap();
        let mut captions = Array2::zeros((2, 6));
        for t in 0..6 {
            captions[[0, t]] = c0[t];
            captions[[1, t]] = c1[t];
        }

        (model, vec![(features, captions)])
    }

    #[test]
    fn test_trainer_creation() {
        let (model, _) = tiny_dataset();
        let trainer = create_basic_trainer(model, 0.01);

        assert_eq!(trainer.model.input_dim, 4);
        assert_eq!(trainer.model.hidden_dim, 5);
        assert_eq!(trainer.config.clip_gradient, Some(5.0));
    }

    #[test]
    fn test_train_batch_returns_finite_loss() {
        let (model, data) = tiny_dataset();
        let mut trainer = create_basic_trainer(model, 0.01);

        let (features, captions) = &data[0];
        let loss = trainer.train_batch(features, captions);
        assert!(loss.is_finite());
        assert!(loss > 0.0);
    }

    #[test]
    fn test_training_overfits_single_batch() {
        let (model, data) = tiny_dataset();
        let mut trainer = create_basic_trainer(model, 0.1);

        let initial = trainer.evaluate(&data);
        for _ in 0..50 {
            let (features, captions) = &data[0];
            trainer.train_batch(features, captions);
        }
        let after = trainer.evaluate(&data);

        assert!(after < initial, "Loss should drop when overfitting one batch: {} -> {}", initial, after);
    }

    #[test]
    fn test_clip_gradient_matrix() {
        let mut grad = Array2::from_elem((3, 3), 10.0);
        clip_gradient_matrix(&mut grad, 1.0);

        let norm = (&grad * &grad).sum().sqrt();
        assert!((norm - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_metrics_recorded_per_epoch() {
        let (model, data) = tiny_dataset();
        let mut trainer = create_basic_trainer(model, 0.05).with_config(TrainingConfig {
            epochs: 3,
            print_every: 10,
            clip_gradient: Some(5.0),
        });

        trainer.train(&data, Some(&data));

        assert_eq!(trainer.get_metrics_history().len(), 3);
        let last = trainer.get_latest_metrics().unwrap();
        assert_eq!(last.epoch, 2);
        assert!(last.validation_loss.is_some());
    }
}
