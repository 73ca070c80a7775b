//! Compute devices and model placement policy.

use crate::error::{Result, TrainError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A compute device a model can live on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Device {
    Cpu,
    Cuda(usize),
}

impl Device {
    pub fn is_accelerator(&self) -> bool {
        matches!(self, Self::Cuda(_))
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda(index) => write!(f, "cuda:{index}"),
        }
    }
}

/// Where a trainer places its model.
///
/// `DataParallel` fans the model out over several accelerators; the first
/// listed device is the primary one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    /// First accelerator the model reports, CPU otherwise.
    #[default]
    Auto,
    Cpu,
    Cuda(usize),
    DataParallel(Vec<usize>),
}

impl Placement {
    /// Resolve this policy against the devices a model can run on.
    ///
    /// The returned list is never empty; its first element is the primary
    /// device.
    pub fn resolve(&self, available: &[Device]) -> Result<Vec<Device>> {
        match self {
            Self::Auto => Ok(vec![
                available
                    .iter()
                    .copied()
                    .find(Device::is_accelerator)
                    .unwrap_or(Device::Cpu),
            ]),
            Self::Cpu => Ok(vec![Device::Cpu]),
            Self::Cuda(index) => {
                let device = Device::Cuda(*index);
                require_available(device, available)?;
                Ok(vec![device])
            }
            Self::DataParallel(indices) => {
                if indices.is_empty() {
                    return Err(TrainError::device(
                        "data-parallel placement needs at least one device",
                    ));
                }
                let devices: Vec<Device> = indices.iter().map(|i| Device::Cuda(*i)).collect();
                for device in &devices {
                    require_available(*device, available)?;
                }
                Ok(devices)
            }
        }
    }
}

fn require_available(device: Device, available: &[Device]) -> Result<()> {
    if available.contains(&device) {
        Ok(())
    } else {
        Err(TrainError::device(format!(
            "{device} is not available for this model"
        )))
    }
}
