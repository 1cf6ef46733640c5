//! Dense layer, dropout and loss helpers

use ndarray::{Array1, Array2, Axis};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::optimizer::{Adam, Moments};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Activation {
    Linear,
    Relu,
}

/// Fully connected layer, `out = act(x . W + b)` with `W: [in, out]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dense {
    pub(crate) weights: Array2<f64>,
    pub(crate) biases: Array1<f64>,
    pub activation: Activation,
}

#[derive(Debug, Clone)]
pub struct DenseGrads {
    pub weights: Array2<f64>,
    pub biases: Array1<f64>,
}

#[derive(Debug, Clone)]
pub struct DenseMoments {
    weights: Moments<ndarray::Ix2>,
    biases: Moments<ndarray::Ix1>,
}

impl Dense {
    /// Glorot-uniform weights, zero biases
    pub fn new(input_size: usize, output_size: usize, activation: Activation) -> Self {
        let limit = (6.0 / (input_size + output_size) as f64).sqrt();
        Self {
            weights: Array2::random((input_size, output_size), Uniform::new(-limit, limit)),
            biases: Array1::zeros(output_size),
            activation,
        }
    }

    pub fn input_size(&self) -> usize {
        self.weights.nrows()
    }

    pub fn output_size(&self) -> usize {
        self.weights.ncols()
    }

    /// Returns `(pre_activation, output)` for a `[batch, in]` input
    pub fn forward(&self, x: &Array2<f64>) -> (Array2<f64>, Array2<f64>) {
        let pre = x.dot(&self.weights) + &self.biases;
        let out = match self.activation {
            Activation::Linear => pre.clone(),
            Activation::Relu => pre.mapv(|v| v.max(0.0)),
        };
        (pre, out)
    }

    /// Gradients w.r.t. parameters and input, given the upstream gradient of the output
    pub fn backward(
        &self,
        x: &Array2<f64>,
        pre: &Array2<f64>,
        d_out: &Array2<f64>,
    ) -> (DenseGrads, Array2<f64>) {
        let d_pre = match self.activation {
            Activation::Linear => d_out.clone(),
            Activation::Relu => {
                let mut d = d_out.clone();
                d.zip_mut_with(pre, |g, &p| {
                    if p <= 0.0 {
                        *g = 0.0;
                    }
                });
                d
            }
        };
        let grads = DenseGrads {
            weights: x.t().dot(&d_pre),
            biases: d_pre.sum_axis(Axis(0)),
        };
        let d_x = d_pre.dot(&self.weights.t());
        (grads, d_x)
    }

    pub fn moments(&self) -> DenseMoments {
        DenseMoments {
            weights: Moments::zeros_like(&self.weights),
            biases: Moments::zeros_like(&self.biases),
        }
    }

    pub fn apply(&mut self, grads: &DenseGrads, moments: &mut DenseMoments, adam: &Adam) {
        moments.weights.update(&mut self.weights, &grads.weights, adam);
        moments.biases.update(&mut self.biases, &grads.biases, adam);
    }
}

/// Inverted dropout mask: each entry is 0 with probability `rate`, otherwise `1 / (1 - rate)`
pub fn dropout_mask<R: Rng + ?Sized>(shape: (usize, usize), rate: f64, rng: &mut R) -> Array2<f64> {
    let keep = 1.0 - rate;
    Array2::from_shape_simple_fn(shape, || {
        if rng.gen::<f64>() < rate {
            0.0
        } else {
            1.0 / keep
        }
    })
}

pub fn sigmoid(v: f64) -> f64 {
    1.0 / (1.0 + (-v).exp())
}

/// Binary cross-entropy of one logit against a 0/1 target, stable for large |z|
pub fn bce_with_logit(z: f64, y: f64) -> f64 {
    z.max(0.0) - z * y + (-z.abs()).exp().ln_1p()
}
