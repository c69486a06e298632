use crate::profile::Profile;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Bus a device (and the profiles written for it) belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    Pci,
    Usb,
}

impl DeviceClass {
    pub const ALL: [DeviceClass; 2] = [DeviceClass::Pci, DeviceClass::Usb];

    /// Directory name used under the catalog and installed-store roots.
    pub fn dir_name(self) -> &'static str {
        match self {
            DeviceClass::Pci => "pci",
            DeviceClass::Usb => "usb",
        }
    }
}

impl std::fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceClass::Pci => write!(f, "PCI"),
            DeviceClass::Usb => write!(f, "USB"),
        }
    }
}

/// One detected device with the profiles attached to it by the matcher.
#[derive(Debug, Clone, Serialize)]
pub struct Device {
    pub kind: DeviceClass,
    pub class_id: String,
    pub vendor_id: String,
    pub device_id: String,
    pub class_name: String,
    pub vendor_name: String,
    pub device_name: String,
    pub sysfs_bus_id: String,
    pub sysfs_id: String,
    /// Sorted by descending priority.
    pub available_profiles: Vec<Arc<Profile>>,
    /// Sorted by descending priority.
    pub installed_profiles: Vec<Arc<Profile>>,
}

impl Device {
    /// A device record with empty names and no attached profiles.
    pub fn new(
        kind: DeviceClass,
        class_id: impl Into<String>,
        vendor_id: impl Into<String>,
        device_id: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            class_id: class_id.into().to_ascii_lowercase(),
            vendor_id: vendor_id.into().to_ascii_lowercase(),
            device_id: device_id.into().to_ascii_lowercase(),
            class_name: String::new(),
            vendor_name: String::new(),
            device_name: String::new(),
            sysfs_bus_id: String::new(),
            sysfs_id: String::new(),
            available_profiles: Vec::new(),
            installed_profiles: Vec::new(),
        }
    }

    pub fn with_sysfs(mut self, bus_id: impl Into<String>, sysfs_id: impl Into<String>) -> Self {
        self.sysfs_bus_id = bus_id.into();
        self.sysfs_id = sysfs_id.into();
        self
    }

    /// `bus (class:vendor:device)` label used in listings and reports.
    pub fn label(&self) -> String {
        format!(
            "{} ({}:{}:{})",
            self.sysfs_bus_id, self.class_id, self.vendor_id, self.device_id
        )
    }

    pub fn has_available(&self, name: &str) -> bool {
        self.available_profiles.iter().any(|p| p.name == name)
    }

    pub fn has_installed(&self, name: &str) -> bool {
        self.installed_profiles.iter().any(|p| p.name == name)
    }
}

/// Detected PCI and USB devices. Rebuilt wholesale on every refresh.
#[derive(Debug, Clone, Default)]
pub struct DeviceCatalog {
    pub pci: Vec<Device>,
    pub usb: Vec<Device>,
    /// DMI product name of the machine, when the firmware reports one.
    pub product_name: Option<String>,
}

impl DeviceCatalog {
    pub fn new(pci: Vec<Device>, usb: Vec<Device>) -> Self {
        Self {
            pci,
            usb,
            product_name: None,
        }
    }

    pub fn with_product_name(mut self, product_name: Option<String>) -> Self {
        self.product_name = product_name;
        self
    }

    pub fn devices(&self, class: DeviceClass) -> &[Device] {
        match class {
            DeviceClass::Pci => &self.pci,
            DeviceClass::Usb => &self.usb,
        }
    }

    pub fn devices_mut(&mut self, class: DeviceClass) -> &mut Vec<Device> {
        match class {
            DeviceClass::Pci => &mut self.pci,
            DeviceClass::Usb => &mut self.usb,
        }
    }
}

/// Devices deduplicated by (bus id, sysfs id), first occurrence wins.
pub fn unique_devices<'a>(devices: impl IntoIterator<Item = &'a Device>) -> Vec<&'a Device> {
    let mut unique: Vec<&Device> = Vec::new();
    for device in devices {
        let seen = unique
            .iter()
            .any(|d| d.sysfs_bus_id == device.sysfs_bus_id && d.sysfs_id == device.sysfs_id);
        if !seen {
            unique.push(device);
        }
    }
    unique
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_lowercases_ids() {
        let dev = Device::new(DeviceClass::Pci, "0300", "10DE", "1F9D");
        assert_eq!(dev.vendor_id, "10de");
        assert_eq!(dev.device_id, "1f9d");
        assert_eq!(dev.class_id, "0300");
    }

    #[test]
    fn test_unique_devices() {
        let a = Device::new(DeviceClass::Pci, "0300", "10de", "1234")
            .with_sysfs("0000:01:00.0", "/devices/pci0000:00/0000:01:00.0");
        let b = a.clone();
        let c = Device::new(DeviceClass::Pci, "0403", "10de", "10fa")
            .with_sysfs("0000:01:00.1", "/devices/pci0000:00/0000:01:00.1");
        let all = vec![a, b, c];
        let unique = unique_devices(&all);
        assert_eq!(unique.len(), 2);
        assert_eq!(unique[1].sysfs_bus_id, "0000:01:00.1");
    }

    #[test]
    fn test_class_display_and_dir() {
        assert_eq!(DeviceClass::Pci.to_string(), "PCI");
        assert_eq!(DeviceClass::Usb.dir_name(), "usb");
    }
}
