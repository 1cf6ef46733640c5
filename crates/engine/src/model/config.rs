//! Network shape and training hyperparameters

use serde::{Deserialize, Serialize};

/// Layer sizes of the direction classifier:
/// LSTM(seq) -> dropout -> LSTM(last) -> dropout -> dense ReLU -> dense sigmoid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Features per timestep
    pub input_size: usize,
    /// Units of the first recurrent layer (returns the full sequence)
    pub lstm1_units: usize,
    /// Units of the second recurrent layer (returns the last state)
    pub lstm2_units: usize,
    pub dense_units: usize,
    /// Dropout rate applied after each recurrent layer while training
    pub dropout: f64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            input_size: crate::features::CHANNELS,
            lstm1_units: 64,
            lstm2_units: 32,
            dense_units: 16,
            dropout: 0.2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub epochs: usize,
    pub batch_size: usize,
    /// Fraction of windows, taken from the end, held out for validation
    pub validation_split: f64,
    pub learning_rate: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub epsilon: f64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 8,
            batch_size: 32,
            validation_split: 0.1,
            learning_rate: 0.001,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-7,
        }
    }
}

impl TrainingConfig {
    /// Index splitting `n` windows into training `[0, split)` and validation
    /// `[split, n)`. Falls back to training on everything when the split would
    /// leave no training windows.
    pub fn split_index(&self, n: usize) -> usize {
        let fraction = self.validation_split.clamp(0.0, 1.0);
        let split = (n as f64 * (1.0 - fraction)).floor() as usize;
        if split == 0 {
            n
        } else {
            split.min(n)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_architecture() {
        let net = NetworkConfig::default();
        assert_eq!((net.lstm1_units, net.lstm2_units, net.dense_units), (64, 32, 16));
        assert_eq!(net.input_size, 5);

        let train = TrainingConfig::default();
        assert_eq!(train.epochs, 8);
        assert_eq!(train.batch_size, 32);
    }

    #[test]
    fn test_split_index() {
        let cfg = TrainingConfig::default();
        assert_eq!(cfg.split_index(100), 90);
        assert_eq!(cfg.split_index(9), 8);
        assert_eq!(cfg.split_index(1), 1);
        assert_eq!(cfg.split_index(0), 0);
    }
}
