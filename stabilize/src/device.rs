//! Compute devices and their exclusive, round-robin assignment to tasks.

use common::parallel::available_workers;
use parking_lot::{Mutex, MutexGuard};

use crate::error::{Error, Result};

/// A compute backend a registration primitive may run on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub index: usize,
    pub name: String,
}

impl Device {
    pub fn cpu(index: usize) -> Self {
        Self {
            index,
            name: format!("cpu:{index}"),
        }
    }
}

/// Exclusive use of one device; released when dropped.
pub type DeviceGuard<'a> = MutexGuard<'a, Device>;

/// Fixed set of device slots.
///
/// Task `i` is assigned slot `i % len` and holds it exclusively until its
/// guard drops. Tasks sharing a slot wait for each other.
#[derive(Debug)]
pub struct DevicePool {
    slots: Vec<Mutex<Device>>,
}

impl DevicePool {
    pub fn new(devices: Vec<Device>) -> Result<Self> {
        if devices.is_empty() {
            return Err(Error::InvalidConfig(
                "device pool needs at least one device".to_string(),
            ));
        }
        Ok(Self {
            slots: devices.into_iter().map(Mutex::new).collect(),
        })
    }

    /// `count` CPU devices (at least one).
    pub fn cpu(count: usize) -> Self {
        Self {
            slots: (0..count.max(1)).map(|i| Mutex::new(Device::cpu(i))).collect(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Blocks until the slot assigned to `task_index` is free.
    pub fn acquire(&self, task_index: usize) -> DeviceGuard<'_> {
        self.slots[task_index % self.slots.len()].lock()
    }

    /// Non-blocking variant of [`acquire`](Self::acquire).
    pub fn try_acquire(&self, task_index: usize) -> Option<DeviceGuard<'_>> {
        self.slots[task_index % self.slots.len()].try_lock()
    }
}

impl Default for DevicePool {
    /// One CPU slot per available core.
    fn default() -> Self {
        Self::cpu(available_workers())
    }
}
