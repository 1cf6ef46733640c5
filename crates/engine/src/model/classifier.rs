//! Stacked-LSTM implementation of [`SequenceClassifier`]

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use ndarray::{stack, Array1, Array3, ArrayView2, Axis};
use tracing::{debug, info};

use super::config::{NetworkConfig, TrainingConfig};
use super::network::{DirectionNetwork, EpochMetrics};
use super::optimizer::Adam;
use super::{ModelError, SequenceClassifier};
use crate::features::Window;

/// Stacked-LSTM direction classifier trained with mini-batch Adam
#[derive(Debug, Clone, Default)]
pub struct LstmClassifier {
    pub network: NetworkConfig,
    pub training: TrainingConfig,
}

impl LstmClassifier {
    pub fn new(network: NetworkConfig, training: TrainingConfig) -> Self {
        Self { network, training }
    }

    fn check_windows(&self, windows: &[Window]) -> Result<(), ModelError> {
        let Some(first) = windows.first() else {
            return Err(ModelError::EmptyDataset);
        };
        let steps = first.nrows();
        if steps == 0 {
            return Err(ModelError::InvalidInput("windows have no timesteps".into()));
        }
        for (idx, w) in windows.iter().enumerate() {
            if w.dim() != (steps, self.network.input_size) {
                return Err(ModelError::InvalidInput(format!(
                    "window {} has shape {:?}, expected ({}, {})",
                    idx,
                    w.dim(),
                    steps,
                    self.network.input_size
                )));
            }
        }
        Ok(())
    }
}

fn stack_windows(windows: &[Window]) -> Result<Array3<f64>, ModelError> {
    let views: Vec<ArrayView2<f64>> = windows.iter().map(|w| w.view()).collect();
    stack(Axis(0), &views).map_err(|e| ModelError::InvalidInput(e.to_string()))
}

fn targets(labels: &[u8]) -> Array1<f64> {
    labels.iter().map(|&l| if l > 0 { 1.0 } else { 0.0 }).collect()
}

/// Mean loss and accuracy of `net` over a labelled set, without dropout
fn evaluate(
    net: &DirectionNetwork,
    windows: &[Window],
    labels: &[u8],
    batch_size: usize,
) -> Result<Option<(f64, f64)>, ModelError> {
    if windows.is_empty() {
        return Ok(None);
    }
    let mut loss = 0.0;
    let mut correct = 0;
    for (xs, ys) in windows.chunks(batch_size).zip(labels.chunks(batch_size)) {
        let y = targets(ys);
        let pass = net.forward_eval(&stack_windows(xs)?);
        loss += pass.loss_sum(&y);
        correct += pass.correct(&y);
    }
    let n = windows.len() as f64;
    Ok(Some((loss / n, correct as f64 / n)))
}

impl SequenceClassifier for LstmClassifier {
    type Model = DirectionNetwork;

    fn fit(&self, windows: &[Window], labels: &[u8]) -> Result<DirectionNetwork, ModelError> {
        if windows.len() != labels.len() {
            return Err(ModelError::LabelMismatch {
                windows: windows.len(),
                labels: labels.len(),
            });
        }
        self.check_windows(windows)?;

        let cfg = &self.training;
        let batch_size = cfg.batch_size.max(1);
        let split = cfg.split_index(windows.len());
        let (train_x, val_x) = windows.split_at(split);
        let (train_y, val_y) = labels.split_at(split);

        info!(
            train = train_x.len(),
            validation = val_x.len(),
            epochs = cfg.epochs,
            batch_size,
            "Training LSTM classifier"
        );

        let mut net = DirectionNetwork::new(self.network.clone());
        let mut moments = net.moments();
        let mut adam = Adam::from_config(cfg);
        let mut rng = rand::thread_rng();

        for epoch in 1..=cfg.epochs {
            let mut loss = 0.0;
            let mut correct = 0;

            for (xs, ys) in train_x.chunks(batch_size).zip(train_y.chunks(batch_size)) {
                let y = targets(ys);
                let pass = net.forward_train(&stack_windows(xs)?, &mut rng);
                loss += pass.loss_sum(&y);
                correct += pass.correct(&y);

                let grads = net.backward(&pass, &y);
                adam.tick();
                net.apply(&grads, &mut moments, &adam);
            }

            let n = train_x.len() as f64;
            let validation = evaluate(&net, val_x, val_y, batch_size)?;
            let metrics = EpochMetrics {
                epoch,
                loss: loss / n,
                accuracy: correct as f64 / n,
                val_loss: validation.map(|(l, _)| l),
                val_accuracy: validation.map(|(_, a)| a),
            };

            info!(
                epoch,
                epochs = cfg.epochs,
                loss = metrics.loss,
                accuracy = metrics.accuracy,
                val_loss = ?metrics.val_loss,
                val_accuracy = ?metrics.val_accuracy,
                "Epoch complete"
            );
            net.history.push(metrics);
        }

        debug!(updates = adam.step(), "Training finished");
        Ok(net)
    }

    fn predict(&self, model: &DirectionNetwork, window: &Window) -> Result<f64, ModelError> {
        if window.nrows() == 0 || window.ncols() != model.config.input_size {
            return Err(ModelError::InvalidInput(format!(
                "window shape {:?} does not fit a model with {} input channels",
                window.dim(),
                model.config.input_size
            )));
        }
        let p = model.predict_window(window);
        if !p.is_finite() {
            return Err(ModelError::InvalidInput("window produced a non-finite probability".into()));
        }
        Ok(p)
    }

    fn save(&self, model: &DirectionNetwork, path: &Path) -> Result<(), ModelError> {
        let io_err = |source| ModelError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let mut writer = BufWriter::new(File::create(path).map_err(io_err)?);
        bincode::serialize_into(&mut writer, model)?;
        writer.flush().map_err(io_err)?;

        info!(path = %path.display(), "Model saved");
        Ok(())
    }

    fn load(&self, path: &Path) -> Result<DirectionNetwork, ModelError> {
        if !path.exists() {
            return Err(ModelError::NotFound(path.to_path_buf()));
        }
        let file = File::open(path).map_err(|source| ModelError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        bincode::deserialize_from(BufReader::new(file)).map_err(|e| ModelError::Corrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    fn history(&self, model: &DirectionNetwork) -> Vec<EpochMetrics> {
        model.history.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn tiny_classifier(epochs: usize) -> LstmClassifier {
        LstmClassifier::new(
            NetworkConfig {
                input_size: 2,
                lstm1_units: 6,
                lstm2_units: 4,
                dense_units: 4,
                dropout: 0.0,
            },
            TrainingConfig {
                epochs,
                batch_size: 8,
                learning_rate: 0.01,
                ..TrainingConfig::default()
            },
        )
    }

    /// Constant-valued windows labelled by whether the level is above 0.5
    fn level_dataset(n: usize) -> (Vec<Window>, Vec<u8>) {
        (0..n)
            .map(|i| {
                let level = (i as f64 + 0.5) / n as f64;
                let level = if i % 2 == 0 { level } else { 1.0 - level };
                (Array2::from_elem((5, 2), level), u8::from(level > 0.5))
            })
            .unzip()
    }

    #[test]
    fn test_fit_records_history_and_predicts_probability() {
        let clf = tiny_classifier(3);
        let (windows, labels) = level_dataset(40);
        let model = clf.fit(&windows, &labels).unwrap();

        assert_eq!(model.history.len(), 3);
        assert!(model.history.iter().all(|m| m.val_loss.is_some()));

        let p = clf.predict(&model, &windows[0]).unwrap();
        assert!((0.0..=1.0).contains(&p));
    }

    #[test]
    fn test_training_reduces_loss() {
        let clf = tiny_classifier(40);
        let (windows, labels) = level_dataset(64);
        let model = clf.fit(&windows, &labels).unwrap();

        let first = model.history.first().unwrap().loss;
        let last = model.history.last().unwrap().loss;
        assert!(last < first, "loss went from {first} to {last}");
    }

    #[test]
    fn test_single_window_trains_without_validation() {
        let clf = tiny_classifier(2);
        let model = clf.fit(&[Array2::zeros((5, 2))], &[1]).unwrap();
        assert!(model.history.iter().all(|m| m.val_loss.is_none()));
    }

    #[test]
    fn test_fit_rejects_bad_input() {
        let clf = tiny_classifier(1);
        assert!(matches!(clf.fit(&[], &[]), Err(ModelError::EmptyDataset)));
        assert!(matches!(
            clf.fit(&[Array2::zeros((5, 2))], &[1, 0]),
            Err(ModelError::LabelMismatch { windows: 1, labels: 2 })
        ));
        assert!(matches!(
            clf.fit(&[Array2::zeros((5, 2)), Array2::zeros((4, 2))], &[1, 0]),
            Err(ModelError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_predict_rejects_wrong_channels() {
        let clf = tiny_classifier(1);
        let model = DirectionNetwork::new(clf.network.clone());
        let err = clf.predict(&model, &Array2::zeros((5, 3))).unwrap_err();
        assert!(matches!(err, ModelError::InvalidInput(_)));
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("model.bin");
        let clf = tiny_classifier(1);
        let (windows, labels) = level_dataset(10);
        let model = clf.fit(&windows, &labels).unwrap();

        clf.save(&model, &path).unwrap();
        let loaded = clf.load(&path).unwrap();

        assert_eq!(loaded.history, model.history);
        assert_eq!(
            clf.predict(&loaded, &windows[3]).unwrap(),
            clf.predict(&model, &windows[3]).unwrap()
        );
    }

    #[test]
    fn test_load_missing_and_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let clf = tiny_classifier(1);

        let missing = dir.path().join("absent.bin");
        assert!(matches!(clf.load(&missing), Err(ModelError::NotFound(_))));

        let garbage = dir.path().join("garbage.bin");
        fs::write(&garbage, b"not a model").unwrap();
        assert!(matches!(clf.load(&garbage), Err(ModelError::Corrupt { .. })));
    }
}
