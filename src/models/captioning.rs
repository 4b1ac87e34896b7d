use ndarray::{Array1, Array2, Array3, s};

use crate::layers::embedding::{EmbeddingGradients, WordEmbedding};
use crate::layers::linear::{LinearGradients, LinearLayer};
use crate::layers::rnn_cell::RNNCellGradients;
use crate::loss::{SequenceLoss, TemporalSoftmaxLoss};
use crate::models::rnn::{RNN, RNNSequenceCache};
use crate::optimizers::Optimizer;
use crate::vocab::{argmax, sample_with_temperature, Vocabulary};

/// Gradients for every parameter group of the captioning model
#[derive(Clone, Debug)]
pub struct CaptioningGradients {
    pub feature_proj: LinearGradients,
    pub embedding: EmbeddingGradients,
    pub rnn: RNNCellGradients,
    pub output_proj: LinearGradients,
}

/// Values cached by the training forward pass for backpropagation.
///
/// The layers cache their own inputs; this bundle carries what the model
/// itself needs: the vocabulary scores, the shifted targets, and the
/// per-timestep RNN caches.
pub struct CaptioningCache {
    scores: Array3<f64>,
    targets: Array2<usize>,
    rnn: RNNSequenceCache,
}

/// Image captioning model built on a vanilla RNN.
///
/// Composition: a linear feature projector maps image features to the
/// initial hidden state, a word embedding maps caption indices to
/// vectors, a single-layer tanh RNN consumes the embedded words, and a
/// linear output projector scores the vocabulary at every timestep.
/// Training uses a temporal softmax loss that ignores `<NULL>` padding.
pub struct CaptioningRNN {
    pub vocab: Vocabulary,
    pub feature_proj: LinearLayer,
    pub embedding: WordEmbedding,
    pub rnn: RNN,
    pub output_proj: LinearLayer,
    loss_fn: TemporalSoftmaxLoss,
    pub input_dim: usize,
    pub wordvec_dim: usize,
    pub hidden_dim: usize,
}

impl CaptioningRNN {
    /// Construct a new captioning model.
    ///
    /// - `input_dim`: dimension of the image feature vectors
    /// - `wordvec_dim`: dimension of the word embeddings
    /// - `hidden_dim`: dimension of the RNN hidden state
    pub fn new(vocab: Vocabulary, input_dim: usize, wordvec_dim: usize, hidden_dim: usize) -> Self {
        let vocab_size = vocab.size();
        let null_index = vocab.null_index();

        CaptioningRNN {
            feature_proj: LinearLayer::new(input_dim, hidden_dim),
            embedding: WordEmbedding::new(vocab_size, wordvec_dim),
            rnn: RNN::new(wordvec_dim, hidden_dim),
            output_proj: LinearLayer::new(hidden_dim, vocab_size),
            loss_fn: TemporalSoftmaxLoss::new(Some(null_index)),
            vocab,
            input_dim,
            wordvec_dim,
            hidden_dim,
        }
    }

    /// Rebuild a model from its parts (used for deserialization)
    pub fn from_parts(
        vocab: Vocabulary,
        feature_proj: LinearLayer,
        embedding: WordEmbedding,
        rnn: RNN,
        output_proj: LinearLayer,
    ) -> Self {
        let input_dim = feature_proj.input_size;
        let wordvec_dim = embedding.embed_size();
        let hidden_dim = rnn.hidden_size;
        let null_index = vocab.null_index();

        CaptioningRNN {
            feature_proj,
            embedding,
            rnn,
            output_proj,
            loss_fn: TemporalSoftmaxLoss::new(Some(null_index)),
            vocab,
            input_dim,
            wordvec_dim,
            hidden_dim,
        }
    }

    /// Compute the training loss for a minibatch.
    ///
    /// `features` is (batch, input_dim); `captions` is (batch, T+1) where
    /// each row is `<START> w_1 .. w_k <END> <NULL>..`. The captions are
    /// split into an input sequence (everything but the last token) and a
    /// target sequence (everything but the first), offset by one so the
    /// RNN learns to produce word t+1 after seeing word t.
    pub fn forward(&mut self, features: &Array2<f64>, captions: &Array2<usize>) -> f64 {
        let (loss, _) = self.forward_with_cache(features, captions);
        loss
    }

    /// Training forward pass that also returns the cache for `backward`
    pub fn forward_with_cache(&mut self, features: &Array2<f64>, captions: &Array2<usize>) -> (f64, CaptioningCache) {
        let (batch, total_len) = captions.dim();
        assert!(total_len >= 2, "Captions must hold at least <START> and one target token");
        assert_eq!(features.nrows(), batch, "Feature batch doesn't match caption batch");
        assert_eq!(features.ncols(), self.input_dim,
                   "Feature dim {} doesn't match model input dim {}", features.ncols(), self.input_dim);

        let captions_in = captions.slice(s![.., ..total_len - 1]).to_owned();
        let captions_out = captions.slice(s![.., 1..]).to_owned();

        // (1) image features -> initial hidden state
        let h0 = self.feature_proj.forward(features);
        // (2) word indices -> embedded vectors (batch, T, wordvec)
        let embedded = self.embedding.forward(&captions_in);
        // (3) RNN over the embedded sequence -> (batch, T, hidden)
        let (hidden, rnn_cache) = self.rnn.forward_with_cache(&embedded, &h0);
        // (4) hidden states -> vocabulary scores (batch, T, vocab)
        let scores = self.output_proj.forward_temporal(&hidden);
        // (5) temporal softmax against the shifted targets, <NULL> ignored
        let loss = self.loss_fn.compute_loss(&scores, &captions_out);

        let cache = CaptioningCache {
            scores,
            targets: captions_out,
            rnn: rnn_cache,
        };

        (loss, cache)
    }

    /// Backward pass through the whole model.
    ///
    /// Walks the chain in reverse: loss -> output projector -> RNN (which
    /// also yields the gradient for the initial hidden state) -> embedding
    /// and feature projector.
    pub fn backward(&self, cache: &CaptioningCache) -> CaptioningGradients {
        let dscores = self.loss_fn.compute_gradient(&cache.scores, &cache.targets);

        let (output_proj_grads, dhidden) = self.output_proj.backward_temporal(&dscores);
        let (rnn_grads, dembedded, dh0) = self.rnn.backward(&dhidden, &cache.rnn);
        let embedding_grads = self.embedding.backward(&dembedded);
        let (feature_proj_grads, _dfeatures) = self.feature_proj.backward(&dh0);

        CaptioningGradients {
            feature_proj: feature_proj_grads,
            embedding: embedding_grads,
            rnn: rnn_grads,
            output_proj: output_proj_grads,
        }
    }

    /// Update every parameter group using the provided optimizer
    pub fn update_parameters<O: Optimizer>(&mut self, gradients: &CaptioningGradients, optimizer: &mut O) {
        self.feature_proj.update_parameters(&gradients.feature_proj, optimizer, "feature_proj");
        self.embedding.update_parameters(&gradients.embedding, optimizer, "embedding");
        self.rnn.update_parameters(&gradients.rnn, optimizer, "rnn");
        self.output_proj.update_parameters(&gradients.output_proj, optimizer, "output_proj");
    }

    /// Greedily sample captions for a feature minibatch.
    ///
    /// The initial hidden state comes from the feature projector and the
    /// first input word is `<START>`. At each step the previous words are
    /// embedded, the RNN advances one step, the hidden state is scored
    /// over the vocabulary, and each row takes its argmax word. A row
    /// stops being written once it emits `<END>`; its remaining slots
    /// stay `<NULL>`, and the loop exits early when every row has ended.
    /// The returned (batch, max_length) matrix never contains `<START>`.
    pub fn sample(&mut self, features: &Array2<f64>, max_length: usize) -> Array2<usize> {
        self.sample_impl(features, max_length, None)
    }

    /// Stochastic variant of `sample` using temperature-scaled softmax
    /// sampling instead of argmax.
    pub fn sample_with_temperature(&mut self, features: &Array2<f64>, max_length: usize, temperature: f64) -> Array2<usize> {
        assert!(temperature > 0.0, "Temperature must be positive");
        self.sample_impl(features, max_length, Some(temperature))
    }

    fn sample_impl(&mut self, features: &Array2<f64>, max_length: usize, temperature: Option<f64>) -> Array2<usize> {
        let batch = features.nrows();
        assert_eq!(features.ncols(), self.input_dim,
                   "Feature dim {} doesn't match model input dim {}", features.ncols(), self.input_dim);

        let null = self.vocab.null_index();
        let start = self.vocab.start_index();
        let end = self.vocab.end_index();

        let mut captions = Array2::from_elem((batch, max_length), null);
        let mut h = self.feature_proj.forward(features);
        let mut words = Array1::from_elem(batch, start);
        let mut running = vec![true; batch];

        for t in 0..max_length {
            let embedded = self.embedding.lookup_batch(&words);
            h = self.rnn.step_forward(&embedded, &h);
            let scores = self.output_proj.forward(&h);

            for i in 0..batch {
                let row = scores.row(i);
                words[i] = match temperature {
                    Some(temp) => sample_with_temperature(&row, temp),
                    None => argmax(&row),
                };
            }

            for i in 0..batch {
                if words[i] == end {
                    running[i] = false;
                }
            }
            if running.iter().all(|&r| !r) {
                break;
            }
            for i in 0..batch {
                if running[i] {
                    captions[[i, t]] = words[i];
                }
            }
        }

        captions
    }

    /// Total number of trainable parameters
    pub fn num_parameters(&self) -> usize {
        self.feature_proj.num_parameters()
            + self.embedding.num_parameters()
            + self.rnn.cell.num_parameters()
            + self.output_proj.num_parameters()
    }
}
