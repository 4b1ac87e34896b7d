use ndarray::Array2;
use std::collections::HashMap;

/// Optimizer trait for parameter updates during training.
///
/// Parameters are identified by string ids so stateful optimizers can
/// keep per-parameter moment estimates across steps.
pub trait Optimizer {
    fn update(&mut self, param_id: &str, param: &mut Array2<f64>, gradient: &Array2<f64>);
    fn reset(&mut self);
}

/// Stochastic Gradient Descent: θ = θ - η∇θ
pub struct SGD {
    learning_rate: f64,
}

impl SGD {
    pub fn new(learning_rate: f64) -> Self {
        SGD { learning_rate }
    }
}

impl Optimizer for SGD {
    fn update(&mut self, _param_id: &str, param: &mut Array2<f64>, gradient: &Array2<f64>) {
        *param = &*param - self.learning_rate * gradient;
    }

    fn reset(&mut self) {
        // SGD has no state to reset
    }
}

/// Per-parameter Adam state: first and second moment estimates
struct AdamState {
    m: Array2<f64>,
    v: Array2<f64>,
}

/// Adam optimizer with adaptive learning rates
///
/// Implements: m_t = β₁m_{t-1} + (1-β₁)g_t
///             v_t = β₂v_{t-1} + (1-β₂)g_t²
///             θ_t = θ_{t-1} - η * m̂_t / (√v̂_t + ε)
/// where m̂_t and v̂_t are bias-corrected estimates
pub struct Adam {
    learning_rate: f64,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    t: i32, // time step for bias correction
    state: HashMap<String, AdamState>,
}

impl Adam {
    pub fn new(learning_rate: f64) -> Self {
        Adam::with_params(learning_rate, 0.9, 0.999, 1e-8)
    }

    pub fn with_params(learning_rate: f64, beta1: f64, beta2: f64, epsilon: f64) -> Self {
        Adam {
            learning_rate,
            beta1,
            beta2,
            epsilon,
            t: 0,
            state: HashMap::new(),
        }
    }
}

impl Optimizer for Adam {
    fn update(&mut self, param_id: &str, param: &mut Array2<f64>, gradient: &Array2<f64>) {
        self.t += 1;

        let state = self.state.entry(param_id.to_string()).or_insert_with(|| AdamState {
            m: Array2::zeros(param.raw_dim()),
            v: Array2::zeros(param.raw_dim()),
        });

        state.m = self.beta1 * &state.m + (1.0 - self.beta1) * gradient;
        state.v = self.beta2 * &state.v + (1.0 - self.beta2) * gradient * gradient;

        // Bias correction
        let m_hat = &state.m / (1.0 - self.beta1.powi(self.t));
        let v_hat = &state.v / (1.0 - self.beta2.powi(self.t));

        let update = self.learning_rate * m_hat / (v_hat.mapv(f64::sqrt) + self.epsilon);
        *param = &*param - update;
    }

    fn reset(&mut self) {
        self.t = 0;
        self.state.clear();
    }
}

/// RMSprop: v_t = αv_{t-1} + (1-α)g_t²
///          θ_t = θ_{t-1} - η * g_t / √(v_t + ε)
pub struct RMSprop {
    learning_rate: f64,
    alpha: f64, // decay rate for moving average
    epsilon: f64,
    v: HashMap<String, Array2<f64>>,
}

impl RMSprop {
    pub fn new(learning_rate: f64) -> Self {
        RMSprop::with_params(learning_rate, 0.99, 1e-8)
    }

    pub fn with_params(learning_rate: f64, alpha: f64, epsilon: f64) -> Self {
        RMSprop {
            learning_rate,
            alpha,
            epsilon,
            v: HashMap::new(),
        }
    }
}

impl Optimizer for RMSprop {
    fn update(&mut self, param_id: &str, param: &mut Array2<f64>, gradient: &Array2<f64>) {
        let v_t = self.v.entry(param_id.to_string())
            .or_insert_with(|| Array2::zeros(param.raw_dim()));

        *v_t = self.alpha * &*v_t + (1.0 - self.alpha) * gradient * gradient;

        let update = self.learning_rate * gradient / (v_t.mapv(f64::sqrt) + self.epsilon);
        *param = &*param - update;
    }

    fn reset(&mut self) {
        self.v.clear();
    }
}
