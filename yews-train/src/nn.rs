//! Trait seams for the deep-learning layer the trainer drives.
//!
//! The trainer never does tensor math itself. A model library plugs in by
//! implementing [`Model`], [`Criterion`], [`Optimizer`] and [`Scheduler`];
//! everything in this crate is orchestration on top of these traits.

use crate::device::Device;
use crate::error::{Result, TrainError};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Opaque serialized state of a model, optimizer or scheduler.
pub type StateDict = serde_json::Value;

/// Something whose internal state can be snapshotted and restored.
pub trait Stateful {
    fn state_dict(&self) -> Result<StateDict>;

    fn load_state_dict(&mut self, state: StateDict) -> Result<()>;
}

/// Serialize any serde value into a [`StateDict`].
pub fn encode_state<T: Serialize>(value: &T) -> Result<StateDict> {
    Ok(serde_json::to_value(value)?)
}

/// Decode a [`StateDict`] back into a concrete state type.
pub fn decode_state<T: DeserializeOwned>(state: StateDict) -> Result<T> {
    serde_json::from_value(state).map_err(|e| TrainError::state(e.to_string()))
}

/// A trainable network.
pub trait Model: Stateful {
    /// One dataset example as consumed by this model.
    type Sample;
    /// Gradient produced by a criterion and consumed by an optimizer.
    type Gradient;

    fn to_device(&mut self, device: &Device) -> Result<()>;

    /// Fan the model out over several devices.
    ///
    /// Models without multi-device support accept exactly one device.
    fn to_devices(&mut self, devices: &[Device]) -> Result<()> {
        match devices {
            [device] => self.to_device(device),
            _ => Err(TrainError::device(format!(
                "model does not support data-parallel placement over {} devices",
                devices.len()
            ))),
        }
    }

    /// Devices this model can be placed on.
    fn available_devices(&self) -> Vec<Device> {
        vec![Device::Cpu]
    }

    /// Switch between training and evaluation behaviour (dropout, batch norm).
    fn set_training(&mut self, _training: bool) {}
}

/// Loss and hit count of a model on one batch.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BatchOutcome {
    /// Mean loss over the batch.
    pub loss: f64,
    /// Number of correctly classified samples.
    pub correct: usize,
    /// Number of samples in the batch.
    pub count: usize,
}

impl BatchOutcome {
    /// Top-1 accuracy in percent.
    pub fn accuracy(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.correct as f64 * 100.0 / self.count as f64
        }
    }
}

/// Loss function bound to a model type.
pub trait Criterion<M: Model> {
    /// Forward pass only.
    fn evaluate(&self, model: &M, batch: &[M::Sample]) -> Result<BatchOutcome>;

    /// Forward pass plus gradient of the loss with respect to the parameters.
    fn backward(&self, model: &M, batch: &[M::Sample]) -> Result<(BatchOutcome, M::Gradient)>;
}

/// Parameter update rule.
pub trait Optimizer<M: Model>: Stateful {
    fn step(&mut self, model: &mut M, gradient: M::Gradient) -> Result<()>;

    fn learning_rate(&self) -> f64;

    fn set_learning_rate(&mut self, lr: f64);
}

/// Learning-rate policy state. Advanced by `Recipe::update_scheduler`.
pub trait Scheduler: Stateful {}
