//! Ordered, deduplicated registry of devices found during the current scan

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::IndexError;

/// Label shown for a device whose name is blank
pub const UNKNOWN_DEVICE_LABEL: &str = "Unknown device";

/// A discovered peripheral
///
/// Identity is the hardware address alone; the name is whatever the first
/// accepted advertisement carried.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    /// Hardware address, unique per physical device
    pub identifier: String,
    /// Advertised name at first sighting
    pub display_name: Option<String>,
    /// When the device first entered the registry
    pub discovered_at: DateTime<Utc>,
}

impl Device {
    /// Project into the view handed to consumers
    pub fn view(&self) -> DeviceView {
        DeviceView {
            identifier: self.identifier.clone(),
            display_name: self.display_name.clone(),
        }
    }
}

impl PartialEq for Device {
    fn eq(&self, other: &Self) -> bool {
        self.identifier == other.identifier
    }
}

impl Eq for Device {}

/// What a presentation layer or downstream consumer gets for a device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceView {
    pub identifier: String,
    pub display_name: Option<String>,
}

impl DeviceView {
    /// Name for display, falling back to a placeholder when blank
    pub fn label(&self) -> &str {
        match self.display_name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => UNKNOWN_DEVICE_LABEL,
        }
    }
}

/// Devices in first-seen order
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: Vec<Device>,
    known: HashSet<String>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a device unless it is already known or has no name
    ///
    /// Returns whether the registry changed.
    pub fn add(&mut self, identifier: &str, display_name: Option<&str>) -> bool {
        let name = match display_name {
            Some(name) if !name.is_empty() => name,
            _ => return false,
        };
        if identifier.is_empty() || self.known.contains(identifier) {
            return false;
        }

        self.known.insert(identifier.to_string());
        self.devices.push(Device {
            identifier: identifier.to_string(),
            display_name: Some(name.to_string()),
            discovered_at: Utc::now(),
        });
        true
    }

    /// Device at a list position
    pub fn get(&self, index: usize) -> Result<&Device, IndexError> {
        self.devices.get(index).ok_or(IndexError::OutOfRange {
            index,
            len: self.devices.len(),
        })
    }

    /// Look a device up by hardware address
    pub fn find(&self, identifier: &str) -> Option<&Device> {
        if !self.known.contains(identifier) {
            return None;
        }
        self.devices.iter().find(|d| d.identifier == identifier)
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.known.contains(identifier)
    }

    pub fn clear(&mut self) {
        self.devices.clear();
        self.known.clear();
    }

    pub fn count(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Device> {
        self.devices.iter()
    }

    /// Snapshot of every device as a view, in registry order
    pub fn views(&self) -> Vec<DeviceView> {
        self.devices.iter().map(Device::view).collect()
    }
}
