//! Deterministic fakes shared by the integration tests: a one-feature
//! logistic classifier with plain gradient descent and a step schedule.

#![allow(dead_code)]

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;
use yews_train::nn::{decode_state, encode_state};
use yews_train::{
    BatchOutcome, Criterion, Device, Model, Optimizer, Recipe, Result, Scheduler, StateDict,
    Stateful, SubsetRandomSampler, SubsetSampler, TrainError, TrainOptions, Trainer,
    TrainerConfig, train_val_split,
};

#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub x: f64,
    pub label: u8,
}

/// 100 points on [-1, 1], labelled by sign.
pub fn points() -> Vec<Point> {
    (0..100)
        .map(|i| {
            let x = i as f64 / 99.0 * 2.0 - 1.0;
            Point {
                x,
                label: u8::from(x > 0.0),
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct LogisticState {
    w: f64,
    b: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Logistic {
    pub w: f64,
    pub b: f64,
    pub device: Device,
    pub gpus: usize,
    pub training: bool,
    pub moves: Vec<Device>,
}

impl Logistic {
    fn prob(&self, x: f64) -> f64 {
        1.0 / (1.0 + (-(self.w * x + self.b)).exp())
    }
}

impl Stateful for Logistic {
    fn state_dict(&self) -> Result<StateDict> {
        encode_state(&LogisticState {
            w: self.w,
            b: self.b,
        })
    }

    fn load_state_dict(&mut self, state: StateDict) -> Result<()> {
        let state: LogisticState = decode_state(state)?;
        self.w = state.w;
        self.b = state.b;
        Ok(())
    }
}

impl Model for Logistic {
    type Sample = Point;
    type Gradient = (f64, f64);

    fn to_device(&mut self, device: &Device) -> Result<()> {
        self.device = *device;
        self.moves.push(*device);
        Ok(())
    }

    fn available_devices(&self) -> Vec<Device> {
        std::iter::once(Device::Cpu)
            .chain((0..self.gpus).map(Device::Cuda))
            .collect()
    }

    fn set_training(&mut self, training: bool) {
        self.training = training;
    }
}

pub struct LogLoss;

impl LogLoss {
    fn outcome(model: &Logistic, batch: &[Point]) -> (BatchOutcome, (f64, f64)) {
        let n = batch.len().max(1) as f64;
        let mut loss = 0.0;
        let mut correct = 0;
        let (mut dw, mut db) = (0.0, 0.0);
        for point in batch {
            let p = model.prob(point.x).clamp(1e-12, 1.0 - 1e-12);
            let y = f64::from(point.label);
            loss -= y * p.ln() + (1.0 - y) * (1.0 - p).ln();
            if (p >= 0.5) == (point.label == 1) {
                correct += 1;
            }
            dw += (p - y) * point.x;
            db += p - y;
        }
        (
            BatchOutcome {
                loss: loss / n,
                correct,
                count: batch.len(),
            },
            (dw / n, db / n),
        )
    }
}

impl Criterion<Logistic> for LogLoss {
    fn evaluate(&self, model: &Logistic, batch: &[Point]) -> Result<BatchOutcome> {
        Ok(Self::outcome(model, batch).0)
    }

    fn backward(&self, model: &Logistic, batch: &[Point]) -> Result<(BatchOutcome, (f64, f64))> {
        Ok(Self::outcome(model, batch))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sgd {
    pub lr: f64,
    pub steps: usize,
}

impl Stateful for Sgd {
    fn state_dict(&self) -> Result<StateDict> {
        encode_state(self)
    }

    fn load_state_dict(&mut self, state: StateDict) -> Result<()> {
        *self = decode_state(state)?;
        Ok(())
    }
}

impl Optimizer<Logistic> for Sgd {
    fn step(&mut self, model: &mut Logistic, (dw, db): (f64, f64)) -> Result<()> {
        model.w -= self.lr * dw;
        model.b -= self.lr * db;
        self.steps += 1;
        Ok(())
    }

    fn learning_rate(&self) -> f64 {
        self.lr
    }

    fn set_learning_rate(&mut self, lr: f64) {
        self.lr = lr;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepLr {
    pub base_lr: f64,
    pub step_size: usize,
    pub gamma: f64,
    pub last_epoch: Option<usize>,
}

impl Stateful for StepLr {
    fn state_dict(&self) -> Result<StateDict> {
        encode_state(self)
    }

    fn load_state_dict(&mut self, state: StateDict) -> Result<()> {
        *self = decode_state(state)?;
        Ok(())
    }
}

impl Scheduler for StepLr {}

pub struct LogisticRecipe {
    pub arch: String,
    pub lr: f64,
    pub gpus: usize,
    pub failing_hook: Option<&'static str>,
}

impl LogisticRecipe {
    pub fn new(arch: &str) -> Self {
        Self {
            arch: arch.to_string(),
            lr: 1.0,
            gpus: 0,
            failing_hook: None,
        }
    }

    fn check(&self, hook: &'static str) -> Result<()> {
        if self.failing_hook == Some(hook) {
            return Err(TrainError::hook(hook, "configured to fail"));
        }
        Ok(())
    }
}

impl Recipe for LogisticRecipe {
    type Model = Logistic;
    type Criterion = LogLoss;
    type Optimizer = Sgd;
    type Scheduler = StepLr;

    fn arch(&self) -> &str {
        &self.arch
    }

    fn build_model(&self) -> Result<Logistic> {
        self.check("build_model")?;
        Ok(Logistic {
            w: 0.0,
            b: 0.0,
            device: Device::Cpu,
            gpus: self.gpus,
            training: false,
            moves: Vec::new(),
        })
    }

    fn build_criterion(&self) -> Result<LogLoss> {
        self.check("build_criterion")?;
        Ok(LogLoss)
    }

    fn build_optimizer(&self, _model: &Logistic) -> Result<Sgd> {
        self.check("build_optimizer")?;
        Ok(Sgd {
            lr: self.lr,
            steps: 0,
        })
    }

    fn build_scheduler(&self, optimizer: &Sgd) -> Result<StepLr> {
        self.check("build_scheduler")?;
        Ok(StepLr {
            base_lr: optimizer.lr,
            step_size: 2,
            gamma: 0.5,
            last_epoch: None,
        })
    }

    fn update_scheduler(&self, scheduler: &mut StepLr, optimizer: &mut Sgd, epoch: usize) -> Result<()> {
        self.check("update_scheduler")?;
        scheduler.last_epoch = Some(epoch);
        let decays = (epoch / scheduler.step_size) as i32;
        optimizer.set_learning_rate(scheduler.base_lr * scheduler.gamma.powi(decays));
        Ok(())
    }
}

pub type TestTrainer = Trainer<LogisticRecipe, Vec<Point>>;

/// Trainer over [`points`] with a 70/30 train/validation split.
pub fn trainer_with(recipe: LogisticRecipe, tmp_dir: &Path) -> Result<TestTrainer> {
    let (train, val) = train_val_split(100, 30, Some(7));
    Trainer::new(
        recipe,
        Arc::new(points()),
        SubsetRandomSampler::new(train, 3),
        SubsetSampler::new(val),
        TrainerConfig::with_tmp_dir(tmp_dir),
    )
}

pub fn trainer(tmp_dir: &Path) -> TestTrainer {
    trainer_with(LogisticRecipe::new("logistic"), tmp_dir).unwrap()
}

/// Small batches, no progress logging.
pub fn options(epochs: usize, save_tmp: bool) -> TrainOptions {
    TrainOptions {
        epochs,
        train_batch_size: 16,
        train_num_workers: 2,
        val_batch_size: 32,
        val_num_workers: 0,
        print_freq: None,
        save_tmp,
        ..TrainOptions::default()
    }
}

/// Everything observable about a trainer, for before/after comparisons.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub model: Logistic,
    pub optimizer: Sgd,
    pub scheduler: StepLr,
    pub start_epoch: usize,
    pub end_epoch: usize,
    pub best_acc: f64,
    pub val_acc: Vec<f64>,
    pub train_acc: Vec<f64>,
    pub run_name: String,
    pub best_model: Option<std::path::PathBuf>,
}

pub fn snapshot(trainer: &TestTrainer) -> Snapshot {
    Snapshot {
        model: trainer.model().clone(),
        optimizer: trainer.optimizer().clone(),
        scheduler: trainer.scheduler().clone(),
        start_epoch: trainer.start_epoch(),
        end_epoch: trainer.end_epoch(),
        best_acc: trainer.best_acc(),
        val_acc: trainer.history().val_acc.clone(),
        train_acc: trainer.history().train_acc.clone(),
        run_name: trainer.run_name().to_string(),
        best_model: trainer.best_model().map(Path::to_path_buf),
    }
}

/// Model weights as stored in checkpoints.
pub fn weights(trainer: &TestTrainer) -> Value {
    trainer.model().state_dict().unwrap()
}

/// Counts WARN-level events seen by the subscriber it is attached to.
#[derive(Clone, Default)]
pub struct WarnCounter(pub Arc<AtomicUsize>);

impl WarnCounter {
    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

impl<S: Subscriber> Layer<S> for WarnCounter {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() == Level::WARN {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }
}
