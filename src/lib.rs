//! # Rust Captioning Library
//!
//! An image-captioning model built on a vanilla tanh RNN, with every
//! forward and backward pass written out explicitly over `ndarray`
//! tensors.
//!
//! ## Core Components
//!
//! - **RNN Cell**: single-timestep tanh recurrence with full backpropagation
//! - **Sequence RNN**: shared-parameter recurrence over whole minibatched sequences
//! - **Captioning Model**: feature projection, word embedding, RNN, and vocabulary scoring composed into a training forward pass and a greedy sampler
//! - **Loss**: temporal softmax cross-entropy with padded positions masked out
//! - **Training**: minibatch trainer with gradient clipping and validation
//! - **Optimizers**: SGD, Adam, and RMSprop with per-parameter state
//!
//! ## Quick Start
//!
//! ```rust
//! use rust_captioning::vocab::Vocabulary;
//! use rust_captioning::models::captioning::CaptioningRNN;
//! use rust_captioning::training::create_basic_trainer;
//!
//! // Vocabulary from training captions, model over 64-dim image features
//! let vocab = Vocabulary::from_captions(["a cat on a mat"]);
//! let model = CaptioningRNN::new(vocab, 64, 32, 32);
//! let mut trainer = create_basic_trainer(model, 0.01);
//!
//! // Train on your (features, captions) batches
//! // trainer.train(&train_data, Some(&validation_data));
//! ```

/// Main library module.
pub mod utils;
pub mod layers;
pub mod models;
pub mod loss;
pub mod optimizers;
pub mod training;
pub mod persistence;
pub mod vocab;
pub mod features;

// Re-export commonly used items
pub use models::captioning::CaptioningRNN;
pub use models::rnn::RNN;
pub use layers::rnn_cell::RNNCell;
pub use layers::embedding::WordEmbedding;
pub use layers::linear::LinearLayer;
pub use loss::{SequenceLoss, TemporalSoftmaxLoss};
pub use optimizers::{SGD, Adam, RMSprop};
pub use training::{CaptioningTrainer, TrainingConfig};
pub use persistence::{ModelPersistence, PersistentModel, ModelMetadata, PersistenceError};
pub use vocab::Vocabulary;
pub use features::{FeatureExtractor, ImageBackbone, PooledBackbone, PrecomputedFeatures};

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array4;

    #[test]
    fn test_library_integration() {
        // Images -> features -> training step -> sampled captions
        let vocab = Vocabulary::from_captions(["a cat sat", "a dog ran"]);
        let extractor = FeatureExtractor::new(PooledBackbone::new(2));

        let mut images = Array4::zeros((2, 3, 8, 8));
        for (i, v) in images.iter_mut().enumerate() {
            *v = (i % 256) as f64;
        }
        let features = extractor.extract(&images);
        assert_eq!(features.shape(), &[2, 12]);

        let mut model = CaptioningRNN::new(vocab.clone(), 12, 8, 10);

        let c0 = vocab.encode_caption("a cat sat", 6).unwrap();
        let c1 = vocab.encode_caption("a dog ran", 6).unwrap();
        let mut captions = ndarray::Array2::zeros((2, 6));
        for t in 0..6 {
            captions[[0, t]] = c0[t];
            captions[[1, t]] = c1[t];
        }

        let loss = model.forward(&features, &captions);
        assert!(loss.is_finite() && loss > 0.0);

        let sampled = model.sample(&features, 8);
        assert_eq!(sampled.shape(), &[2, 8]);
    }
}
