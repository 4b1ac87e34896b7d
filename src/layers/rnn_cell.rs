use ndarray::{Array2, Axis};
use ndarray_rand::RandomExt;
use ndarray_rand::rand_distr::StandardNormal;
use crate::optimizers::Optimizer;

/// Holds gradients for all RNN cell parameters during backpropagation
#[derive(Clone, Debug)]
pub struct RNNCellGradients {
    pub w_xh: Array2<f64>,
    pub w_hh: Array2<f64>,
    pub b: Array2<f64>,
}

impl RNNCellGradients {
    /// Accumulate another set of gradients into this one (used across timesteps)
    pub fn accumulate(&mut self, other: &RNNCellGradients) {
        self.w_xh = &self.w_xh + &other.w_xh;
        self.w_hh = &self.w_hh + &other.w_hh;
        self.b = &self.b + &other.b;
    }
}

/// Caches values from a single forward step for the backward pass.
///
/// The tanh output is cached so the local derivative can be computed
/// as 1 - next_h^2 without re-evaluating the activation.
#[derive(Clone, Debug)]
pub struct RNNCellCache {
    pub input: Array2<f64>,
    pub prev_h: Array2<f64>,
    pub next_h: Array2<f64>,
}

/// Vanilla RNN cell with tanh activation and trainable parameters
///
/// Implements the single-timestep recurrence:
/// - h_t = tanh(x_t * W_xh + h_t-1 * W_hh + b)
///
/// Inputs are batch-major: x_t has shape (batch, input_size) and hidden
/// states have shape (batch, hidden_size).
#[derive(Clone, Debug)]
pub struct RNNCell {
    pub w_xh: Array2<f64>,  // input-to-hidden weights (input_size, hidden_size)
    pub w_hh: Array2<f64>,  // hidden-to-hidden weights (hidden_size, hidden_size)
    pub b: Array2<f64>,     // bias (1, hidden_size), broadcast over the batch
    pub input_size: usize,
    pub hidden_size: usize,
}

impl RNNCell {
    /// Creates a new RNN cell with scaled normal weight initialization
    /// (standard normal divided by sqrt of the fan-in) and zero bias.
    pub fn new(input_size: usize, hidden_size: usize) -> Self {
        let xh_scale = 1.0 / (input_size as f64).sqrt();
        let hh_scale = 1.0 / (hidden_size as f64).sqrt();

        let w_xh = Array2::random((input_size, hidden_size), StandardNormal).mapv(|v: f64| v * xh_scale);
        let w_hh = Array2::random((hidden_size, hidden_size), StandardNormal).mapv(|v: f64| v * hh_scale);
        let b = Array2::zeros((1, hidden_size));

        RNNCell { w_xh, w_hh, b, input_size, hidden_size }
    }

    /// Creates a cell from existing parameters (used for deserialization)
    pub fn from_weights(w_xh: Array2<f64>, w_hh: Array2<f64>, b: Array2<f64>) -> Self {
        let (input_size, hidden_size) = w_xh.dim();
        assert_eq!(w_hh.shape(), &[hidden_size, hidden_size], "W_hh must be square in the hidden size");
        assert_eq!(b.shape(), &[1, hidden_size], "Bias shape must be (1, hidden_size)");

        RNNCell { w_xh, w_hh, b, input_size, hidden_size }
    }

    /// Forward pass for a single timestep
    pub fn step_forward(&self, input: &Array2<f64>, prev_h: &Array2<f64>) -> Array2<f64> {
        let (next_h, _) = self.step_forward_with_cache(input, prev_h);
        next_h
    }

    /// Forward pass for a single timestep, caching values for backward
    pub fn step_forward_with_cache(&self, input: &Array2<f64>, prev_h: &Array2<f64>) -> (Array2<f64>, RNNCellCache) {
        assert_eq!(input.ncols(), self.input_size,
                   "Input size {} doesn't match cell input size {}", input.ncols(), self.input_size);
        assert_eq!(prev_h.ncols(), self.hidden_size,
                   "Hidden size {} doesn't match cell hidden size {}", prev_h.ncols(), self.hidden_size);
        assert_eq!(input.nrows(), prev_h.nrows(), "Batch size mismatch between input and hidden state");

        let pre_activation = &input.dot(&self.w_xh) + &prev_h.dot(&self.w_hh) + &self.b;
        let next_h = pre_activation.mapv(f64::tanh);

        let cache = RNNCellCache {
            input: input.clone(),
            prev_h: prev_h.clone(),
            next_h: next_h.clone(),
        };

        (next_h, cache)
    }

    /// Backward pass for a single timestep
    ///
    /// Given dnext_h = ∂L/∂h_t, applies the chain rule through tanh and the
    /// two matrix products. Returns (parameter_gradients, dx, dprev_h).
    pub fn step_backward(&self, dnext_h: &Array2<f64>, cache: &RNNCellCache) -> (RNNCellGradients, Array2<f64>, Array2<f64>) {
        // tanh'(a) expressed through the cached output: 1 - h_t^2
        let dtanh = dnext_h * &cache.next_h.mapv(|h| 1.0 - h * h);

        let dx = dtanh.dot(&self.w_xh.t());
        let dprev_h = dtanh.dot(&self.w_hh.t());
        let dw_xh = cache.input.t().dot(&dtanh);
        let dw_hh = cache.prev_h.t().dot(&dtanh);
        let db = dtanh.sum_axis(Axis(0)).insert_axis(Axis(0));

        let gradients = RNNCellGradients {
            w_xh: dw_xh,
            w_hh: dw_hh,
            b: db,
        };

        (gradients, dx, dprev_h)
    }

    /// Initialize zero gradients for accumulation
    pub fn zero_gradients(&self) -> RNNCellGradients {
        RNNCellGradients {
            w_xh: Array2::zeros(self.w_xh.raw_dim()),
            w_hh: Array2::zeros(self.w_hh.raw_dim()),
            b: Array2::zeros(self.b.raw_dim()),
        }
    }

    /// Apply gradients using the provided optimizer
    pub fn update_parameters<O: Optimizer>(&mut self, gradients: &RNNCellGradients, optimizer: &mut O, prefix: &str) {
        optimizer.update(&format!("{}_w_xh", prefix), &mut self.w_xh, &gradients.w_xh);
        optimizer.update(&format!("{}_w_hh", prefix), &mut self.w_hh, &gradients.w_hh);
        optimizer.update(&format!("{}_b", prefix), &mut self.b, &gradients.b);
    }

    /// Get the number of parameters in this cell
    pub fn num_parameters(&self) -> usize {
        self.w_xh.len() + self.w_hh.len() + self.b.len()
    }
}
