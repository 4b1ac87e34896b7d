use ndarray::{Array2, Array3, s};
use crate::layers::rnn_cell::{RNNCell, RNNCellCache, RNNCellGradients};
use crate::optimizers::Optimizer;

/// Per-timestep caches from a full-sequence forward pass
#[derive(Clone, Debug)]
pub struct RNNSequenceCache {
    pub step_caches: Vec<RNNCellCache>,
}

/// Single-layer vanilla RNN run over whole sequences.
///
/// Applies the cell at every timestep with shared parameters, threading
/// the hidden state through time. Inputs are (batch, time, input_size)
/// and the initial hidden state is (batch, hidden_size).
#[derive(Clone, Debug)]
pub struct RNN {
    pub cell: RNNCell,
    pub input_size: usize,
    pub hidden_size: usize,
}

impl RNN {
    pub fn new(input_size: usize, hidden_size: usize) -> Self {
        RNN {
            cell: RNNCell::new(input_size, hidden_size),
            input_size,
            hidden_size,
        }
    }

    /// Creates a network from an existing cell (used for deserialization)
    pub fn from_cell(cell: RNNCell) -> Self {
        let input_size = cell.input_size;
        let hidden_size = cell.hidden_size;
        RNN { cell, input_size, hidden_size }
    }

    /// Forward pass over a full sequence, returning all hidden states
    /// with shape (batch, time, hidden_size)
    pub fn forward(&self, input: &Array3<f64>, h0: &Array2<f64>) -> Array3<f64> {
        let (hidden, _) = self.forward_with_cache(input, h0);
        hidden
    }

    /// Forward pass with per-timestep caching for backpropagation through time
    pub fn forward_with_cache(&self, input: &Array3<f64>, h0: &Array2<f64>) -> (Array3<f64>, RNNSequenceCache) {
        let (batch, time, features) = input.dim();
        assert_eq!(features, self.input_size,
                   "Input size {} doesn't match RNN input size {}", features, self.input_size);
        assert_eq!(h0.dim(), (batch, self.hidden_size), "Initial hidden state shape mismatch");

        let mut hidden = Array3::zeros((batch, time, self.hidden_size));
        let mut step_caches = Vec::with_capacity(time);
        let mut current_h = h0.clone();

        for t in 0..time {
            let x_t = input.slice(s![.., t, ..]).to_owned();
            let (next_h, cache) = self.cell.step_forward_with_cache(&x_t, &current_h);

            hidden.slice_mut(s![.., t, ..]).assign(&next_h);
            step_caches.push(cache);
            current_h = next_h;
        }

        (hidden, RNNSequenceCache { step_caches })
    }

    /// Single-step forward used by autoregressive sampling
    pub fn step_forward(&self, input: &Array2<f64>, prev_h: &Array2<f64>) -> Array2<f64> {
        self.cell.step_forward(input, prev_h)
    }

    /// Backpropagation through time over a full sequence.
    ///
    /// `dh` holds the upstream gradients produced by the per-timestep
    /// losses, shape (batch, time, hidden_size) - not the recurrent
    /// gradients, which are carried between steps internally. Parameter
    /// gradients are accumulated across all timesteps since the cell
    /// parameters are shared.
    ///
    /// Returns (parameter_gradients, dx, dh0).
    pub fn backward(&self, dh: &Array3<f64>, cache: &RNNSequenceCache) -> (RNNCellGradients, Array3<f64>, Array2<f64>) {
        let (batch, time, hidden) = dh.dim();
        assert_eq!(hidden, self.hidden_size, "Upstream gradient hidden size mismatch");
        assert_eq!(cache.step_caches.len(), time, "Cache length doesn't match sequence length");

        let mut gradients = self.cell.zero_gradients();
        let mut dx = Array3::zeros((batch, time, self.input_size));
        let mut dprev_h = Array2::zeros((batch, self.hidden_size));

        for t in (0..time).rev() {
            // Loss gradient at this step plus the gradient carried back
            // from step t+1
            let dh_t = &dh.slice(s![.., t, ..]) + &dprev_h;

            let (step_gradients, dx_t, dprev) = self.cell.step_backward(&dh_t, &cache.step_caches[t]);

            dx.slice_mut(s![.., t, ..]).assign(&dx_t);
            gradients.accumulate(&step_gradients);
            dprev_h = dprev;
        }

        (gradients, dx, dprev_h)
    }

    /// Update parameters using the provided optimizer
    pub fn update_parameters<O: Optimizer>(&mut self, gradients: &RNNCellGradients, optimizer: &mut O, prefix: &str) {
        self.cell.update_parameters(gradients, optimizer, prefix);
    }

    /// Initialize zero gradients for accumulation
    pub fn zero_gradients(&self) -> RNNCellGradients {
        self.cell.zero_gradients()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array2, Array3};
    use crate::utils::{numeric_gradient, relative_error};

    fn fill_sequence(batch: usize, time: usize, features: usize) -> Array3<f64> {
        let mut x = Array3::zeros((batch, time, features));
        for (i, v) in x.iter_mut().enumerate() {
            *v = ((i * 7 % 13) as f64) * 0.1 - 0.6;
        }
        x
    }

    #[test]
    fn test_rnn_forward_shape() {
        let rnn = RNN::new(3, 5);
        let input = fill_sequence(2, 4, 3);
        let h0 = Array2::zeros((2, 5));

        let hidden = rnn.forward(&input, &h0);
        assert_eq!(hidden.shape(), &[2, 4, 5]);
    }

    #[test]
    fn test_rnn_forward_threads_hidden_state() {
        let rnn = RNN::new(3, 5);
        let input = fill_sequence(2, 4, 3);
        let h0 = Array2::from_elem((2, 5), 0.1);

        let hidden = rnn.forward(&input, &h0);

        // Replaying the steps manually must give identical states
        let mut h = h0.clone();
        for t in 0..4 {
            h = rnn.step_forward(&input.slice(ndarray::s![.., t, ..]).to_owned(), &h);
            assert!((&h - &hidden.slice(ndarray::s![.., t, ..])).mapv(f64::abs).iter().all(|&e| e < 1e-12));
        }
    }

    #[test]
    fn test_rnn_empty_sequence() {
        let rnn = RNN::new(3, 5);
        let input = Array3::zeros((2, 0, 3));
        let h0 = Array2::zeros((2, 5));

        let (hidden, cache) = rnn.forward_with_cache(&input, &h0);
        assert_eq!(hidden.shape(), &[2, 0, 5]);

        let dh = Array3::zeros((2, 0, 5));
        let (gradients, dx, dh0) = rnn.backward(&dh, &cache);
        assert_eq!(dx.shape(), &[2, 0, 3]);
        assert_eq!(dh0.shape(), &[2, 5]);
        assert!(gradients.w_xh.iter().all(|&g| g == 0.0));
        assert!(dh0.iter().all(|&g| g == 0.0));
    }

    #[test]
    fn test_rnn_backward_shapes() {
        let rnn = RNN::new(3, 5);
        let input = fill_sequence(2, 4, 3);
        let h0 = Array2::zeros((2, 5));

        let (_, cache) = rnn.forward_with_cache(&input, &h0);
        let dh = Array3::ones((2, 4, 5));
        let (gradients, dx, dh0) = rnn.backward(&dh, &cache);

        assert_eq!(gradients.w_xh.shape(), &[3, 5]);
        assert_eq!(gradients.w_hh.shape(), &[5, 5]);
        assert_eq!(gradients.b.shape(), &[1, 5]);
        assert_eq!(dx.shape(), &[2, 4, 3]);
        assert_eq!(dh0.shape(), &[2, 5]);
    }

    #[test]
    fn test_rnn_backward_gradient_check() {
        let rnn = RNN::new(2, 3);
        let input = fill_sequence(2, 3, 2);
        let h0 = Array2::from_elem((2, 3), 0.05);

        let (_, cache) = rnn.forward_with_cache(&input, &h0);
        // Upstream gradient of ones makes the loss sum over all hidden states,
        // which exercises the accumulation across timesteps
        let dh = Array3::ones((2, 3, 3));
        let (gradients, _, dh0) = rnn.backward(&dh, &cache);

        let num_dw_hh = numeric_gradient(
            |w| {
                let cell = crate::layers::rnn_cell::RNNCell::from_weights(
                    rnn.cell.w_xh.clone(), w.clone(), rnn.cell.b.clone());
                RNN::from_cell(cell).forward(&input, &h0).sum()
            },
            &rnn.cell.w_hh,
            1e-5,
        );
        let num_dh0 = numeric_gradient(
            |h| rnn.forward(&input, h).sum(),
            &h0,
            1e-5,
        );

        assert!(relative_error(&gradients.w_hh, &num_dw_hh) < 1e-6);
        assert!(relative_error(&dh0, &num_dh0) < 1e-6);
    }
}
