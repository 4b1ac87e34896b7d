use ndarray::{Array1, Array2, Array3, s};
use ndarray_rand::RandomExt;
use ndarray_rand::rand_distr::StandardNormal;
use crate::optimizers::Optimizer;

/// Gradients for the word embedding layer.
#[derive(Clone, Debug)]
pub struct EmbeddingGradients {
    pub weight: Array2<f64>,
}

/// Trainable word embedding table.
///
/// Maps integer word indices to dense vectors. Operates on minibatches of
/// index matrices with shape (batch, time), producing (batch, time, embed)
/// outputs; a single-timestep lookup is provided for autoregressive
/// decoding.
#[derive(Clone, Debug)]
pub struct WordEmbedding {
    pub weight: Array2<f64>, // (vocab_size, embed_size)
    vocab_size: usize,
    embed_size: usize,
    input_cache: Option<Array2<usize>>,
}

impl WordEmbedding {
    /// Create a new embedding with scaled normal initialization.
    pub fn new(vocab_size: usize, embed_size: usize) -> Self {
        let scale = 1.0 / (vocab_size as f64).sqrt();
        let weight = Array2::random((vocab_size, embed_size), StandardNormal).mapv(|v: f64| v * scale);

        Self {
            weight,
            vocab_size,
            embed_size,
            input_cache: None,
        }
    }

    /// Create an embedding from existing weights.
    pub fn from_weights(weight: Array2<f64>) -> Self {
        let (vocab_size, embed_size) = weight.dim();
        Self {
            weight,
            vocab_size,
            embed_size,
            input_cache: None,
        }
    }

    /// Get embedding dimension.
    pub fn embed_size(&self) -> usize {
        self.embed_size
    }

    /// Get vocabulary size.
    pub fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    /// Look up embeddings for one word per batch row.
    /// Returns a (batch, embed_size) matrix.
    pub fn lookup_batch(&self, indices: &Array1<usize>) -> Array2<f64> {
        let mut output = Array2::zeros((indices.len(), self.embed_size));

        for (i, &idx) in indices.iter().enumerate() {
            assert!(idx < self.vocab_size, "Index {} out of vocabulary size {}", idx, self.vocab_size);
            output.row_mut(i).assign(&self.weight.row(idx));
        }

        output
    }

    /// Forward pass over a (batch, time) index matrix.
    /// Returns a (batch, time, embed_size) tensor and caches the indices.
    pub fn forward(&mut self, indices: &Array2<usize>) -> Array3<f64> {
        self.input_cache = Some(indices.clone());

        let (batch, time) = indices.dim();
        let mut output = Array3::zeros((batch, time, self.embed_size));

        for n in 0..batch {
            for t in 0..time {
                let idx = indices[[n, t]];
                assert!(idx < self.vocab_size, "Index {} out of vocabulary size {}", idx, self.vocab_size);
                output.slice_mut(s![n, t, ..]).assign(&self.weight.row(idx));
            }
        }

        output
    }

    /// Backward pass - scatter-add upstream gradients into the rows that
    /// were gathered. Repeated indices accumulate.
    pub fn backward(&self, grad_output: &Array3<f64>) -> EmbeddingGradients {
        let indices = self.input_cache.as_ref().expect("No cached input for backward pass");
        let (batch, time) = indices.dim();
        assert_eq!(grad_output.dim(), (batch, time, self.embed_size), "Gradient shape mismatch");

        let mut weight_grad = Array2::zeros((self.vocab_size, self.embed_size));

        for n in 0..batch {
            for t in 0..time {
                let idx = indices[[n, t]];
                let mut row = weight_grad.row_mut(idx);
                row += &grad_output.slice(s![n, t, ..]);
            }
        }

        EmbeddingGradients { weight: weight_grad }
    }

    /// Update parameters with optimizer.
    pub fn update_parameters<O: Optimizer>(&mut self, gradients: &EmbeddingGradients, optimizer: &mut O, prefix: &str) {
        optimizer.update(&format!("{}_weight", prefix), &mut self.weight, &gradients.weight);
    }

    /// Initialize zero gradients for accumulation.
    pub fn zero_gradients(&self) -> EmbeddingGradients {
        EmbeddingGradients {
            weight: Array2::zeros(self.weight.raw_dim()),
        }
    }

    /// Get number of parameters.
    pub fn num_parameters(&self) -> usize {
        self.weight.len()
    }
}
