//! Stochastic gradient descent over a model's linear map.
//!
//! For each epoch the sample order is reshuffled (Fisher–Yates, seeded), the
//! learning rate decays as `lr / (1 + decay * epoch)`, and every sample
//! applies
//!
//! ```text
//! W[j, i] -= lr_epoch * ((ŷ_j - y_j) * x_i + l2 * W[j, i])
//! ```
//!
//! There is no batching, momentum, early stopping or validation split: a
//! call always runs the full number of epochs and is deterministic given the
//! seed.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{MnemoError, Result};
use crate::linalg::Similarity;
use crate::memory::now_nanos;
use crate::model::Model;

/// SGD hyper-parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    /// Full passes over the data. Default: 20.
    pub epochs: usize,
    /// Initial learning rate. Default: 0.1.
    pub learning_rate: f32,
    /// Learning-rate decay per epoch. Default: 0.01.
    pub decay: f32,
    /// L2 weight-decay coefficient. Default: 1e-4.
    pub l2: f32,
    /// Shuffle seed. Default: 42.
    pub seed: u64,
    /// Write every (input, target) pair into memory after training. Default: true.
    pub remember_samples: bool,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            epochs: 20,
            learning_rate: 0.1,
            decay: 0.01,
            l2: 1e-4,
            seed: 42,
            remember_samples: true,
        }
    }
}

/// Outcome of a training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainReport {
    pub epochs: usize,
    pub samples: usize,
    /// Mean squared error of the linear map after the last epoch.
    pub final_loss: f32,
}

/// Runs SGD with a fixed [`TrainConfig`].
#[derive(Debug, Clone, Default)]
pub struct Trainer {
    config: TrainConfig,
}

impl Trainer {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    /// Train `model` on paired rows of `inputs` (each `input_size` wide) and
    /// `targets` (each `output_size` wide).
    ///
    /// Fails on an empty dataset or on any row of the wrong width, before
    /// touching the model. A model with an empty weight matrix trains as a
    /// successful no-op.
    pub fn train<I, T>(&self, model: &mut Model, inputs: &[I], targets: &[T]) -> Result<TrainReport>
    where
        I: AsRef<[f32]>,
        T: AsRef<[f32]>,
    {
        check_dataset(model, inputs, targets)?;

        let n = inputs.len();
        if model.weights().is_empty() {
            return Ok(TrainReport {
                epochs: 0,
                samples: n,
                final_loss: 0.0,
            });
        }

        let cfg = &self.config;
        let input_size = model.input_size();
        let output_size = model.output_size();
        let mut rng = ChaCha8Rng::seed_from_u64(cfg.seed);
        let mut order: Vec<usize> = (0..n).collect();

        for epoch in 0..cfg.epochs {
            order.shuffle(&mut rng);
            let lr = cfg.learning_rate / (1.0 + cfg.decay * epoch as f32);

            for &s in &order {
                let x = inputs[s].as_ref();
                let y = targets[s].as_ref();
                let w = model.weights_mut();
                let y_hat = Similarity::matvec(w, x, output_size);

                for j in 0..output_size {
                    let err = y_hat[j] - y[j];
                    let row = &mut w[j * input_size..(j + 1) * input_size];
                    for (wi, &xi) in row.iter_mut().zip(x) {
                        *wi -= lr * (err * xi + cfg.l2 * *wi);
                    }
                }
            }
        }

        if cfg.remember_samples {
            let embed_width = model.memory().embed_width();
            let out_width = model.memory().output_width();
            for (x, y) in inputs.iter().zip(targets) {
                let (x, y) = (x.as_ref(), y.as_ref());
                model.memory_mut().add(
                    &x[..x.len().min(embed_width)],
                    &y[..out_width],
                    now_nanos(),
                    None,
                )?;
            }
        }

        model.bump_version();
        let final_loss = self.evaluate(model, inputs, targets)?;
        debug!(
            model = model.id(),
            version = model.version(),
            epochs = cfg.epochs,
            samples = n,
            final_loss,
            "training finished"
        );

        Ok(TrainReport {
            epochs: cfg.epochs,
            samples: n,
            final_loss,
        })
    }

    /// Mean squared error of the pure linear map over a dataset.
    pub fn evaluate<I, T>(&self, model: &Model, inputs: &[I], targets: &[T]) -> Result<f32>
    where
        I: AsRef<[f32]>,
        T: AsRef<[f32]>,
    {
        check_dataset(model, inputs, targets)?;
        if model.output_size() == 0 {
            return Ok(0.0);
        }

        let mut sum = 0.0f32;
        for (x, y) in inputs.iter().zip(targets) {
            let y_hat = model.forward(x.as_ref())?;
            sum += Similarity::squared_distance(&y_hat, y.as_ref());
        }
        Ok(sum / (inputs.len() * model.output_size()) as f32)
    }
}

fn check_dataset<I, T>(model: &Model, inputs: &[I], targets: &[T]) -> Result<()>
where
    I: AsRef<[f32]>,
    T: AsRef<[f32]>,
{
    if inputs.is_empty() {
        return Err(MnemoError::EmptyInput("training inputs".to_string()));
    }
    if inputs.len() != targets.len() {
        return Err(MnemoError::DimensionMismatch {
            expected: inputs.len(),
            got: targets.len(),
        });
    }
    for x in inputs {
        if x.as_ref().len() != model.input_size() {
            return Err(MnemoError::DimensionMismatch {
                expected: model.input_size(),
                got: x.as_ref().len(),
            });
        }
    }
    for y in targets {
        if y.as_ref().len() != model.output_size() {
            return Err(MnemoError::DimensionMismatch {
                expected: model.output_size(),
                got: y.as_ref().len(),
            });
        }
    }
    Ok(())
}
