//! Direction classifier network
//!
//! ```text
//! [batch, T, F] -> LSTM(seq) -> dropout -> LSTM(last) -> dropout
//!               -> dense ReLU -> dense -> sigmoid = P(up)
//! ```
//!
//! The output layer emits a logit; the sigmoid is folded into the
//! binary cross-entropy gradient.

use ndarray::{Array1, Array2, Array3, Axis};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use super::config::NetworkConfig;
use super::layers::{bce_with_logit, dropout_mask, sigmoid, Activation, Dense, DenseGrads, DenseMoments};
use super::lstm::{LstmCache, LstmGrads, LstmLayer, LstmMoments};
use super::optimizer::Adam;

/// Metrics recorded at the end of one training epoch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub epoch: usize,
    pub loss: f64,
    pub accuracy: f64,
    pub val_loss: Option<f64>,
    pub val_accuracy: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectionNetwork {
    pub config: NetworkConfig,
    lstm1: LstmLayer,
    lstm2: LstmLayer,
    hidden: Dense,
    output: Dense,
    /// Training history of the epochs that produced these weights
    #[serde(default)]
    pub history: Vec<EpochMetrics>,
}

/// Everything the backward pass needs from one forward pass
pub struct ForwardPass {
    seq_len: usize,
    lstm1_cache: LstmCache,
    masks1: Option<Vec<Array2<f64>>>,
    lstm2_cache: LstmCache,
    mask2: Option<Array2<f64>>,
    dense_in: Array2<f64>,
    hidden_pre: Array2<f64>,
    hidden_out: Array2<f64>,
    /// `[batch, 1]`
    logits: Array2<f64>,
}

impl ForwardPass {
    pub fn probabilities(&self) -> Array1<f64> {
        self.logits.column(0).mapv(sigmoid)
    }

    /// Summed (not averaged) cross-entropy over the batch
    pub fn loss_sum(&self, labels: &Array1<f64>) -> f64 {
        self.logits
            .column(0)
            .iter()
            .zip(labels.iter())
            .map(|(&z, &y)| bce_with_logit(z, y))
            .sum()
    }

    /// Predictions on the right side of 0.5
    pub fn correct(&self, labels: &Array1<f64>) -> usize {
        self.probabilities()
            .iter()
            .zip(labels.iter())
            .filter(|&(&p, &y)| (p > 0.5) == (y > 0.5))
            .count()
    }
}

pub struct NetworkGrads {
    lstm1: LstmGrads,
    lstm2: LstmGrads,
    hidden: DenseGrads,
    output: DenseGrads,
}

pub struct NetworkMoments {
    lstm1: LstmMoments,
    lstm2: LstmMoments,
    hidden: DenseMoments,
    output: DenseMoments,
}

/// Split `[batch, T, F]` into `T` matrices of `[batch, F]`
fn timesteps(batch: &Array3<f64>) -> Vec<Array2<f64>> {
    batch
        .axis_iter(Axis(1))
        .map(|step| step.to_owned())
        .collect()
}

impl DirectionNetwork {
    pub fn new(config: NetworkConfig) -> Self {
        Self {
            lstm1: LstmLayer::new(config.input_size, config.lstm1_units),
            lstm2: LstmLayer::new(config.lstm1_units, config.lstm2_units),
            hidden: Dense::new(config.lstm2_units, config.dense_units, Activation::Relu),
            output: Dense::new(config.dense_units, 1, Activation::Linear),
            config,
            history: Vec::new(),
        }
    }

    /// Forward pass with dropout active
    pub fn forward_train(&self, batch: &Array3<f64>, rng: &mut dyn RngCore) -> ForwardPass {
        self.run(batch, Some(rng))
    }

    /// Forward pass without dropout
    pub fn forward_eval(&self, batch: &Array3<f64>) -> ForwardPass {
        self.run(batch, None)
    }

    fn run(&self, batch: &Array3<f64>, mut rng: Option<&mut dyn RngCore>) -> ForwardPass {
        let rate = self.config.dropout;
        let inputs = timesteps(batch);
        let seq_len = inputs.len();

        let (h1, lstm1_cache) = self.lstm1.forward(&inputs);
        let (h1, masks1) = match rng.as_deref_mut() {
            Some(r) if rate > 0.0 => {
                let masks: Vec<Array2<f64>> =
                    h1.iter().map(|h| dropout_mask(h.dim(), rate, &mut *r)).collect();
                let dropped = h1.iter().zip(&masks).map(|(h, m)| h * m).collect();
                (dropped, Some(masks))
            }
            _ => (h1, None),
        };

        let (h2, lstm2_cache) = self.lstm2.forward(&h1);
        let last = h2
            .last()
            .cloned()
            .unwrap_or_else(|| Array2::zeros((batch.len_of(Axis(0)), self.lstm2.hidden_size)));
        let (dense_in, mask2) = match rng.as_deref_mut() {
            Some(r) if rate > 0.0 => {
                let mask = dropout_mask(last.dim(), rate, r);
                (&last * &mask, Some(mask))
            }
            _ => (last, None),
        };

        let (hidden_pre, hidden_out) = self.hidden.forward(&dense_in);
        let (logits, _) = self.output.forward(&hidden_out);

        ForwardPass {
            seq_len,
            lstm1_cache,
            masks1,
            lstm2_cache,
            mask2,
            dense_in,
            hidden_pre,
            hidden_out,
            logits,
        }
    }

    /// Gradients of the mean binary cross-entropy over the batch
    pub fn backward(&self, pass: &ForwardPass, labels: &Array1<f64>) -> NetworkGrads {
        let n = labels.len().max(1) as f64;
        let d_logits = ((pass.probabilities() - labels) / n).insert_axis(Axis(1));

        let (output, d_hidden) = self.output.backward(&pass.hidden_out, &pass.logits, &d_logits);
        let (hidden, d_dense_in) = self.hidden.backward(&pass.dense_in, &pass.hidden_pre, &d_hidden);

        let d_last = match &pass.mask2 {
            Some(mask) => d_dense_in * mask,
            None => d_dense_in,
        };

        // only the final state of the second layer feeds the head
        let mut d_h2: Vec<Array2<f64>> = (0..pass.seq_len)
            .map(|_| Array2::zeros(d_last.raw_dim()))
            .collect();
        if let Some(slot) = d_h2.last_mut() {
            *slot = d_last;
        }
        let (lstm2, d_h1) = self.lstm2.backward(&pass.lstm2_cache, &d_h2);

        let d_h1: Vec<Array2<f64>> = match &pass.masks1 {
            Some(masks) => d_h1.into_iter().zip(masks).map(|(d, m)| d * m).collect(),
            None => d_h1,
        };
        let (lstm1, _) = self.lstm1.backward(&pass.lstm1_cache, &d_h1);

        NetworkGrads {
            lstm1,
            lstm2,
            hidden,
            output,
        }
    }

    pub fn moments(&self) -> NetworkMoments {
        NetworkMoments {
            lstm1: self.lstm1.moments(),
            lstm2: self.lstm2.moments(),
            hidden: self.hidden.moments(),
            output: self.output.moments(),
        }
    }

    pub fn apply(&mut self, grads: &NetworkGrads, moments: &mut NetworkMoments, adam: &Adam) {
        self.lstm1.apply(&grads.lstm1, &mut moments.lstm1, adam);
        self.lstm2.apply(&grads.lstm2, &mut moments.lstm2, adam);
        self.hidden.apply(&grads.hidden, &mut moments.hidden, adam);
        self.output.apply(&grads.output, &mut moments.output, adam);
    }

    /// P(up) for every window in a `[batch, T, F]` tensor
    pub fn predict_batch(&self, batch: &Array3<f64>) -> Array1<f64> {
        self.forward_eval(batch).probabilities()
    }

    /// P(up) for a single `[T, F]` window
    pub fn predict_window(&self, window: &Array2<f64>) -> f64 {
        let batch = window.view().insert_axis(Axis(0)).to_owned();
        self.predict_batch(&batch)[0]
    }
}
