use ndarray::{Array2, Array3, Axis, s};
use ndarray_rand::RandomExt;
use ndarray_rand::rand_distr::Uniform;
use crate::optimizers::Optimizer;

/// Holds gradients for linear layer parameters during backpropagation
#[derive(Clone, Debug)]
pub struct LinearGradients {
    pub weight: Array2<f64>,
    pub bias: Array2<f64>,
}

/// A fully connected (linear/dense) layer
///
/// Performs the transformation: output = input * weight + bias
/// on batch-major inputs, where weight has shape (input_size, output_size)
/// and bias has shape (1, output_size).
///
/// The layer can also be applied position-wise to a sequence batch of
/// shape (batch, time, input_size), sharing the same parameters at every
/// timestep.
#[derive(Clone, Debug)]
pub struct LinearLayer {
    pub weight: Array2<f64>,     // (input_size, output_size)
    pub bias: Array2<f64>,       // (1, output_size)
    pub input_size: usize,
    pub output_size: usize,
    input_cache: Option<Array2<f64>>,
    temporal_cache: Option<Array3<f64>>,
}

impl LinearLayer {
    /// Create a new linear layer with Xavier/Glorot initialization
    pub fn new(input_size: usize, output_size: usize) -> Self {
        let scale = (2.0 / (input_size + output_size) as f64).sqrt();

        let weight = Array2::random((input_size, output_size), Uniform::new(-scale, scale));
        let bias = Array2::zeros((1, output_size));

        Self {
            weight,
            bias,
            input_size,
            output_size,
            input_cache: None,
            temporal_cache: None,
        }
    }

    /// Create a new linear layer with zero initialization
    pub fn new_zeros(input_size: usize, output_size: usize) -> Self {
        Self {
            weight: Array2::zeros((input_size, output_size)),
            bias: Array2::zeros((1, output_size)),
            input_size,
            output_size,
            input_cache: None,
            temporal_cache: None,
        }
    }

    /// Create a linear layer from existing parameters
    pub fn from_weights(weight: Array2<f64>, bias: Array2<f64>) -> Self {
        let (input_size, output_size) = weight.dim();
        assert_eq!(bias.shape(), &[1, output_size], "Bias shape must be (1, output_size)");

        Self {
            weight,
            bias,
            input_size,
            output_size,
            input_cache: None,
            temporal_cache: None,
        }
    }

    /// Forward pass on a (batch, input_size) matrix
    pub fn forward(&mut self, input: &Array2<f64>) -> Array2<f64> {
        assert_eq!(input.ncols(), self.input_size,
                   "Input size {} doesn't match layer input size {}", input.ncols(), self.input_size);

        self.input_cache = Some(input.clone());

        &input.dot(&self.weight) + &self.bias
    }

    /// Backward pass for the matrix forward
    ///
    /// Returns (gradients, input_gradient) where input_gradient has the
    /// same shape as the cached input.
    pub fn backward(&self, grad_output: &Array2<f64>) -> (LinearGradients, Array2<f64>) {
        let input = self.input_cache.as_ref().expect("Input cache not found for backward pass");
        assert_eq!(grad_output.ncols(), self.output_size, "Gradient output size mismatch");
        assert_eq!(grad_output.nrows(), input.nrows(), "Batch size mismatch");

        let weight_grad = input.t().dot(grad_output);
        let bias_grad = grad_output.sum_axis(Axis(0)).insert_axis(Axis(0));
        let input_grad = grad_output.dot(&self.weight.t());

        let gradients = LinearGradients {
            weight: weight_grad,
            bias: bias_grad,
        };

        (gradients, input_grad)
    }

    /// Position-wise forward on a (batch, time, input_size) sequence batch
    pub fn forward_temporal(&mut self, input: &Array3<f64>) -> Array3<f64> {
        let (batch, time, features) = input.dim();
        assert_eq!(features, self.input_size,
                   "Input size {} doesn't match layer input size {}", features, self.input_size);

        self.temporal_cache = Some(input.clone());

        let mut output = Array3::zeros((batch, time, self.output_size));
        for t in 0..time {
            let x_t = input.slice(s![.., t, ..]);
            let out_t = &x_t.dot(&self.weight) + &self.bias;
            output.slice_mut(s![.., t, ..]).assign(&out_t);
        }

        output
    }

    /// Backward pass for the position-wise forward
    ///
    /// Parameter gradients are summed over every timestep since the same
    /// weights are applied at each position.
    pub fn backward_temporal(&self, grad_output: &Array3<f64>) -> (LinearGradients, Array3<f64>) {
        let input = self.temporal_cache.as_ref().expect("Temporal cache not found for backward pass");
        let (batch, time, out_features) = grad_output.dim();
        assert_eq!(out_features, self.output_size, "Gradient output size mismatch");
        assert_eq!(input.dim().0, batch, "Batch size mismatch");
        assert_eq!(input.dim().1, time, "Sequence length mismatch");

        let mut weight_grad = Array2::zeros(self.weight.raw_dim());
        let mut bias_grad = Array2::zeros(self.bias.raw_dim());
        let mut input_grad = Array3::zeros(input.raw_dim());

        for t in 0..time {
            let x_t = input.slice(s![.., t, ..]);
            let g_t = grad_output.slice(s![.., t, ..]);

            weight_grad = &weight_grad + &x_t.t().dot(&g_t);
            bias_grad = &bias_grad + &g_t.sum_axis(Axis(0)).insert_axis(Axis(0));
            input_grad.slice_mut(s![.., t, ..]).assign(&g_t.dot(&self.weight.t()));
        }

        let gradients = LinearGradients {
            weight: weight_grad,
            bias: bias_grad,
        };

        (gradients, input_grad)
    }

    /// Update parameters using the provided optimizer
    pub fn update_parameters<O: Optimizer>(&mut self, gradients: &LinearGradients, optimizer: &mut O, prefix: &str) {
        optimizer.update(&format!("{}_weight", prefix), &mut self.weight, &gradients.weight);
        optimizer.update(&format!("{}_bias", prefix), &mut self.bias, &gradients.bias);
    }

    /// Initialize zero gradients for accumulation
    pub fn zero_gradients(&self) -> LinearGradients {
        LinearGradients {
            weight: Array2::zeros(self.weight.raw_dim()),
            bias: Array2::zeros(self.bias.raw_dim()),
        }
    }

    /// Get the number of parameters in this layer
    pub fn num_parameters(&self) -> usize {
        self.weight.len() + self.bias.len()
    }

    /// Get layer dimensions as (input_size, output_size)
    pub fn dimensions(&self) -> (usize, usize) {
        (self.input_size, self.output_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr2, Array3};
    use crate::optimizers::SGD;
    use crate::utils::numeric_gradient;

    #[test]
    fn test_linear_layer_creation() {
        let layer = LinearLayer::new(10, 5);
        assert_eq!(layer.input_size, 10);
        assert_eq!(layer.output_size, 5);
        assert_eq!(layer.weight.shape(), &[10, 5]);
        assert_eq!(layer.bias.shape(), &[1, 5]);
    }

    #[test]
    fn test_linear_layer_forward() {
        let mut layer = LinearLayer::new_zeros(3, 2);
        let input = arr2(&[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]); // (2, 3)

        let output = layer.forward(&input);
        assert_eq!(output.shape(), &[2, 2]);

        // With zero weights and bias, output should be zero
        assert!(output.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_linear_layer_backward() {
        let mut layer = LinearLayer::new(3, 2);
        let input = arr2(&[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        let grad_output = arr2(&[[1.0, 1.0], [1.0, 1.0]]);

        let _output = layer.forward(&input);
        let (gradients, input_grad) = layer.backward(&grad_output);

        assert_eq!(gradients.weight.shape(), &[3, 2]);
        assert_eq!(gradients.bias.shape(), &[1, 2]);
        assert_eq!(input_grad.shape(), &[2, 3]);
    }

    #[test]
    fn test_linear_layer_gradient_check() {
        let mut layer = LinearLayer::new(3, 2);
        let input = arr2(&[[0.4, -0.2, 0.9], [-0.6, 0.1, 0.3]]);

        let _ = layer.forward(&input);
        let grad_output = Array2::ones((2, 2));
        let (gradients, input_grad) = layer.backward(&grad_output);

        let frozen = layer.clone();
        let num_weight = numeric_gradient(
            |w| {
                let mut probe = LinearLayer::from_weights(w.clone(), frozen.bias.clone());
                probe.forward(&input).sum()
            },
            &frozen.weight,
            1e-5,
        );
        let num_input = numeric_gradient(
            |x| {
                let mut probe = frozen.clone();
                probe.forward(x).sum()
            },
            &input,
            1e-5,
        );

        assert!((&gradients.weight - &num_weight).mapv(f64::abs).iter().all(|&e| e < 1e-6));
        assert!((&input_grad - &num_input).mapv(f64::abs).iter().all(|&e| e < 1e-6));
    }

    #[test]
    fn test_temporal_forward_matches_per_step() {
        let mut layer = LinearLayer::new(3, 2);
        let mut seq = Array3::zeros((2, 4, 3));
        for (i, v) in seq.iter_mut().enumerate() {
            *v = (i as f64) * 0.1 - 1.0;
        }

        let temporal = layer.forward_temporal(&seq);
        assert_eq!(temporal.shape(), &[2, 4, 2]);

        for t in 0..4 {
            let step = layer.forward(&seq.slice(ndarray::s![.., t, ..]).to_owned());
            assert!((&step - &temporal.slice(ndarray::s![.., t, ..])).mapv(f64::abs).iter().all(|&e| e < 1e-12));
        }
    }

    #[test]
    fn test_temporal_backward_shapes() {
        let mut layer = LinearLayer::new(3, 2);
        let seq = Array3::from_elem((2, 4, 3), 0.5);

        let _ = layer.forward_temporal(&seq);
        let grad_output = Array3::ones((2, 4, 2));
        let (gradients, input_grad) = layer.backward_temporal(&grad_output);

        assert_eq!(gradients.weight.shape(), &[3, 2]);
        assert_eq!(gradients.bias.shape(), &[1, 2]);
        assert_eq!(input_grad.shape(), &[2, 4, 3]);

        // All-ones upstream over 2x4 positions: bias gradient is the position count
        assert!(gradients.bias.iter().all(|&b| (b - 8.0).abs() < 1e-12));
    }

    #[test]
    fn test_linear_layer_with_optimizer() {
        let mut layer = LinearLayer::new(2, 1);
        let mut optimizer = SGD::new(0.1);

        let input = arr2(&[[1.0, 2.0]]);
        let target = arr2(&[[3.0]]);

        let output = layer.forward(&input);
        let grad_output = &output - &target;
        let (gradients, _) = layer.backward(&grad_output);
        layer.update_parameters(&gradients, &mut optimizer, "linear");

        assert!(layer.weight.iter().any(|&x| x != 0.0) || layer.bias.iter().any(|&x| x != 0.0));
    }
}
