//! Running averages and per-epoch metric history.

use serde::{Deserialize, Serialize};

/// Weighted running average of a scalar.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AverageMeter {
    pub last: f64,
    pub sum: f64,
    pub count: usize,
}

impl AverageMeter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `value` observed over `n` samples.
    pub fn update(&mut self, value: f64, n: usize) {
        self.last = value;
        self.sum += value * n as f64;
        self.count += n;
    }

    pub fn avg(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }
}

/// Accuracy and loss of one full pass over a loader.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EpochStats {
    /// Top-1 accuracy in percent.
    pub accuracy: f64,
    pub loss: f64,
}

/// Metric sequences of a run, in epoch order.
///
/// Validation has one extra leading entry: the baseline pass recorded before
/// the first training epoch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct History {
    pub train_loss: Vec<f64>,
    pub train_acc: Vec<f64>,
    pub val_loss: Vec<f64>,
    pub val_acc: Vec<f64>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.train_loss.clear();
        self.train_acc.clear();
        self.val_loss.clear();
        self.val_acc.clear();
    }

    pub fn record_baseline(&mut self, val: EpochStats) {
        self.val_loss.push(val.loss);
        self.val_acc.push(val.accuracy);
    }

    pub fn record_epoch(&mut self, train: EpochStats, val: EpochStats) {
        self.train_loss.push(train.loss);
        self.train_acc.push(train.accuracy);
        self.val_loss.push(val.loss);
        self.val_acc.push(val.accuracy);
    }

    /// Number of completed training epochs.
    pub fn epochs(&self) -> usize {
        self.train_acc.len()
    }

    pub fn latest_val_acc(&self) -> Option<f64> {
        self.val_acc.last().copied()
    }

    pub fn max_val_acc(&self) -> Option<f64> {
        self.val_acc.iter().copied().reduce(f64::max)
    }
}
