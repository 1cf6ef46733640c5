//! Adam optimizer

use ndarray::{Array, Dimension, Zip};

use super::config::TrainingConfig;

/// Adam hyperparameters plus the shared step counter
#[derive(Debug, Clone)]
pub struct Adam {
    pub learning_rate: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub epsilon: f64,
    step: i32,
}

impl Adam {
    pub fn new(learning_rate: f64) -> Self {
        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-7,
            step: 0,
        }
    }

    pub fn from_config(cfg: &TrainingConfig) -> Self {
        Self {
            learning_rate: cfg.learning_rate,
            beta1: cfg.beta1,
            beta2: cfg.beta2,
            epsilon: cfg.epsilon,
            step: 0,
        }
    }

    /// Advance to the next update; call once per batch before applying gradients
    pub fn tick(&mut self) {
        self.step = self.step.saturating_add(1);
    }

    pub fn step(&self) -> i32 {
        self.step
    }

    /// Bias-corrected step size for the current update
    fn step_size(&self) -> f64 {
        let t = self.step.max(1);
        self.learning_rate * (1.0 - self.beta2.powi(t)).sqrt() / (1.0 - self.beta1.powi(t))
    }
}

/// First and second moment estimates for one parameter tensor
#[derive(Debug, Clone)]
pub struct Moments<D: Dimension> {
    m: Array<f64, D>,
    v: Array<f64, D>,
}

impl<D: Dimension> Moments<D> {
    pub fn zeros_like(param: &Array<f64, D>) -> Self {
        Self {
            m: Array::zeros(param.raw_dim()),
            v: Array::zeros(param.raw_dim()),
        }
    }

    pub fn update(&mut self, param: &mut Array<f64, D>, grad: &Array<f64, D>, adam: &Adam) {
        let (b1, b2, eps) = (adam.beta1, adam.beta2, adam.epsilon);
        let lr = adam.step_size();
        Zip::from(param)
            .and(&mut self.m)
            .and(&mut self.v)
            .and(grad)
            .for_each(|p, m, v, &g| {
                *m = b1 * *m + (1.0 - b1) * g;
                *v = b2 * *v + (1.0 - b2) * g * g;
                *p -= lr * *m / (v.sqrt() + eps);
            });
    }
}
