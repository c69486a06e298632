use super::ids::IdsDatabase;
use super::name_or_unknown;
use crate::device::{Device, DeviceClass};
use crate::sysfs::SysfsRoot;

const PCI_BASE: &str = "sys/bus/pci/devices";

/// Enumerate `sys/bus/pci/devices`. Entries missing a class, vendor or device
/// attribute are skipped.
pub fn detect(sysfs: &SysfsRoot, ids: &IdsDatabase) -> Vec<Device> {
    let entries = match sysfs.list_dir(PCI_BASE) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!("cannot enumerate PCI devices: {}", e);
            return Vec::new();
        }
    };

    let mut devices = Vec::new();
    for addr in entries {
        let base = format!("{}/{}", PCI_BASE, addr);

        // class is 0xBBSSPP; only base class and subclass are matched against.
        let class = sysfs.read_hex_id(format!("{}/class", base));
        let vendor = sysfs.read_hex_id(format!("{}/vendor", base));
        let device = sysfs.read_hex_id(format!("{}/device", base));
        let (Some(class), Some(vendor), Some(device)) = (class, vendor, device) else {
            tracing::debug!("skipping PCI entry {} without ids", addr);
            continue;
        };
        let class_id: String = format!("{:0>6}", class).chars().take(4).collect();

        let sysfs_id = sysfs
            .device_link(&base)
            .unwrap_or_else(|| format!("/bus/pci/devices/{}", addr));

        let mut entry = Device::new(DeviceClass::Pci, class_id, vendor, device)
            .with_sysfs(addr, sysfs_id);
        entry.class_name = name_or_unknown(ids.class_name(&entry.class_id));
        entry.vendor_name = name_or_unknown(ids.vendor_name(&entry.vendor_id));
        entry.device_name = name_or_unknown(ids.device_name(&entry.vendor_id, &entry.device_id));
        devices.push(entry);
    }

    tracing::debug!("detected {} PCI devices", devices.len());
    devices
}
