//! LSTM layer with backpropagation through time
//!
//! Batched: every timestep processes a `[batch, features]` matrix. Gate
//! weights are stored fused in the order input, forget, candidate, output:
//!
//! ```text
//! z = x . W + h_prev . U + b          W: [in, 4H]  U: [H, 4H]  b: [4H]
//! i = σ(z_i)  f = σ(z_f)  g = tanh(z_g)  o = σ(z_o)
//! c = f * c_prev + i * g
//! h = o * tanh(c)
//! ```

use ndarray::{s, Array1, Array2, Axis, Ix1, Ix2};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use serde::{Deserialize, Serialize};

use super::layers::sigmoid;
use super::optimizer::{Adam, Moments};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LstmLayer {
    pub input_size: usize,
    pub hidden_size: usize,
    pub(crate) w: Array2<f64>,
    pub(crate) u: Array2<f64>,
    pub(crate) b: Array1<f64>,
}

/// Activations kept from the forward pass of one timestep
#[derive(Debug, Clone)]
struct Step {
    x: Array2<f64>,
    h_prev: Array2<f64>,
    c_prev: Array2<f64>,
    i: Array2<f64>,
    f: Array2<f64>,
    g: Array2<f64>,
    o: Array2<f64>,
    tanh_c: Array2<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct LstmCache {
    steps: Vec<Step>,
}

#[derive(Debug, Clone)]
pub struct LstmGrads {
    pub w: Array2<f64>,
    pub u: Array2<f64>,
    pub b: Array1<f64>,
}

#[derive(Debug, Clone)]
pub struct LstmMoments {
    w: Moments<Ix2>,
    u: Moments<Ix2>,
    b: Moments<Ix1>,
}

impl LstmLayer {
    /// Glorot-uniform kernels, zero biases except a forget-gate bias of 1
    pub fn new(input_size: usize, hidden_size: usize) -> Self {
        let gates = 4 * hidden_size;
        let limit_w = (6.0 / (input_size + gates) as f64).sqrt();
        let limit_u = (6.0 / (hidden_size + gates) as f64).sqrt();

        let mut b: Array1<f64> = Array1::zeros(gates);
        b.slice_mut(s![hidden_size..2 * hidden_size]).fill(1.0);

        Self {
            input_size,
            hidden_size,
            w: Array2::random((input_size, gates), Uniform::new(-limit_w, limit_w)),
            u: Array2::random((hidden_size, gates), Uniform::new(-limit_u, limit_u)),
            b,
        }
    }

    /// Run the layer over a sequence of `[batch, input_size]` inputs.
    ///
    /// Returns the hidden state after every step and the cache needed by
    /// [`LstmLayer::backward`]. State starts at zero.
    pub fn forward(&self, inputs: &[Array2<f64>]) -> (Vec<Array2<f64>>, LstmCache) {
        let hs = self.hidden_size;
        let batch = inputs.first().map_or(0, |x| x.nrows());
        let mut h: Array2<f64> = Array2::zeros((batch, hs));
        let mut c: Array2<f64> = Array2::zeros((batch, hs));

        let mut outputs = Vec::with_capacity(inputs.len());
        let mut steps = Vec::with_capacity(inputs.len());

        for x in inputs {
            let z = x.dot(&self.w) + h.dot(&self.u) + &self.b;
            let i = z.slice(s![.., 0..hs]).mapv(sigmoid);
            let f = z.slice(s![.., hs..2 * hs]).mapv(sigmoid);
            let g = z.slice(s![.., 2 * hs..3 * hs]).mapv(f64::tanh);
            let o = z.slice(s![.., 3 * hs..]).mapv(sigmoid);

            let c_next = &f * &c + &i * &g;
            let tanh_c = c_next.mapv(f64::tanh);
            let h_next = &o * &tanh_c;

            outputs.push(h_next.clone());
            steps.push(Step {
                x: x.clone(),
                h_prev: h,
                c_prev: c,
                i,
                f,
                g,
                o,
                tanh_c,
            });
            h = h_next;
            c = c_next;
        }

        (outputs, LstmCache { steps })
    }

    /// Backpropagate through time.
    ///
    /// `d_outputs[t]` is the loss gradient w.r.t. the hidden state emitted at
    /// step `t` (zeros where the state was not consumed). Returns parameter
    /// gradients and the gradient w.r.t. each input.
    pub fn backward(
        &self,
        cache: &LstmCache,
        d_outputs: &[Array2<f64>],
    ) -> (LstmGrads, Vec<Array2<f64>>) {
        let hs = self.hidden_size;
        let batch = cache.steps.first().map_or(0, |s| s.x.nrows());

        let mut grads = LstmGrads {
            w: Array2::zeros(self.w.raw_dim()),
            u: Array2::zeros(self.u.raw_dim()),
            b: Array1::zeros(self.b.raw_dim()),
        };
        let mut d_inputs = Vec::with_capacity(cache.steps.len());
        let mut dh_next: Array2<f64> = Array2::zeros((batch, hs));
        let mut dc_next: Array2<f64> = Array2::zeros((batch, hs));
        let mut dz: Array2<f64> = Array2::zeros((batch, 4 * hs));

        for (step, d_out) in cache.steps.iter().zip(d_outputs).rev() {
            let dh = d_out + &dh_next;

            let d_o = &dh * &step.tanh_c * &step.o.mapv(|v| v * (1.0 - v));
            let dc = &dh * &step.o * &step.tanh_c.mapv(|v| 1.0 - v * v) + &dc_next;
            let d_i = &dc * &step.g * &step.i.mapv(|v| v * (1.0 - v));
            let d_f = &dc * &step.c_prev * &step.f.mapv(|v| v * (1.0 - v));
            let d_g = &dc * &step.i * &step.g.mapv(|v| 1.0 - v * v);

            dz.slice_mut(s![.., 0..hs]).assign(&d_i);
            dz.slice_mut(s![.., hs..2 * hs]).assign(&d_f);
            dz.slice_mut(s![.., 2 * hs..3 * hs]).assign(&d_g);
            dz.slice_mut(s![.., 3 * hs..]).assign(&d_o);

            grads.w += &step.x.t().dot(&dz);
            grads.u += &step.h_prev.t().dot(&dz);
            grads.b += &dz.sum_axis(Axis(0));

            d_inputs.push(dz.dot(&self.w.t()));
            dh_next = dz.dot(&self.u.t());
            dc_next = &dc * &step.f;
        }

        d_inputs.reverse();
        (grads, d_inputs)
    }

    pub fn moments(&self) -> LstmMoments {
        LstmMoments {
            w: Moments::zeros_like(&self.w),
            u: Moments::zeros_like(&self.u),
            b: Moments::zeros_like(&self.b),
        }
    }

    pub fn apply(&mut self, grads: &LstmGrads, moments: &mut LstmMoments, adam: &Adam) {
        moments.w.update(&mut self.w, &grads.w, adam);
        moments.u.update(&mut self.u, &grads.u, adam);
        moments.b.update(&mut self.b, &grads.b, adam);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_shapes() {
        let layer = LstmLayer::new(5, 8);
        let inputs = vec![Array2::zeros((3, 5)); 10];
        let (outputs, cache) = layer.forward(&inputs);

        assert_eq!(outputs.len(), 10);
        assert_eq!(outputs[9].dim(), (3, 8));
        assert_eq!(cache.steps.len(), 10);
    }

    #[test]
    fn test_forget_bias_initialised_to_one() {
        let layer = LstmLayer::new(2, 4);
        assert!(layer.b.slice(s![4..8]).iter().all(|&v| v == 1.0));
        assert!(layer.b.slice(s![0..4]).iter().all(|&v| v == 0.0));
        assert!(layer.b.slice(s![8..]).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_hidden_state_bounded() {
        let layer = LstmLayer::new(3, 6);
        let inputs = vec![Array2::from_elem((2, 3), 50.0); 20];
        let (outputs, _) = layer.forward(&inputs);
        for h in outputs {
            assert!(h.iter().all(|&v| v.abs() <= 1.0));
        }
    }

    #[test]
    fn test_backward_shapes() {
        let layer = LstmLayer::new(4, 5);
        let inputs = vec![Array2::from_elem((2, 4), 0.3); 6];
        let (outputs, cache) = layer.forward(&inputs);
        let d_outputs: Vec<_> = outputs.iter().map(|h| h.mapv(|_| 1.0)).collect();

        let (grads, d_inputs) = layer.backward(&cache, &d_outputs);
        assert_eq!(grads.w.dim(), (4, 20));
        assert_eq!(grads.u.dim(), (5, 20));
        assert_eq!(grads.b.len(), 20);
        assert_eq!(d_inputs.len(), 6);
        assert_eq!(d_inputs[0].dim(), (2, 4));
    }
}
