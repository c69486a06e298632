use super::ids::IdsDatabase;
use super::name_or_unknown;
use crate::device::{Device, DeviceClass};
use crate::sysfs::SysfsRoot;

const USB_BASE: &str = "sys/bus/usb/devices";

/// Two-digit class/subclass pair, e.g. `bDeviceClass=09`, `bDeviceSubClass=00` -> `0900`.
fn class_pair(sysfs: &SysfsRoot, class_attr: &str, subclass_attr: &str) -> Option<String> {
    let class = sysfs.read_hex_id(class_attr)?;
    let subclass = sysfs.read_hex_id(subclass_attr).unwrap_or_else(|| "00".to_string());
    Some(format!("{:0>2}{:0>2}", class, subclass))
}

/// Enumerate `sys/bus/usb/devices`. Interface entries (`1-2:1.0`) are not
/// devices; they are only consulted for the class of devices that declare it
/// per interface (`bDeviceClass` 00).
pub fn detect(sysfs: &SysfsRoot, ids: &IdsDatabase) -> Vec<Device> {
    let entries = match sysfs.list_dir(USB_BASE) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!("cannot enumerate USB devices: {}", e);
            return Vec::new();
        }
    };

    let mut devices = Vec::new();
    for name in entries.into_iter().filter(|n| !n.contains(':')) {
        let base = format!("{}/{}", USB_BASE, name);
        let vendor = sysfs.read_hex_id(format!("{}/idVendor", base));
        let product = sysfs.read_hex_id(format!("{}/idProduct", base));
        let (Some(vendor), Some(product)) = (vendor, product) else {
            tracing::debug!("skipping USB entry {} without ids", name);
            continue;
        };

        let mut class_id = class_pair(
            sysfs,
            &format!("{}/bDeviceClass", base),
            &format!("{}/bDeviceSubClass", base),
        )
        .unwrap_or_else(|| "0000".to_string());
        if class_id.starts_with("00") {
            let interface = format!("{}/{}:1.0", base, name);
            if let Some(from_interface) = class_pair(
                sysfs,
                &format!("{}/bInterfaceClass", interface),
                &format!("{}/bInterfaceSubClass", interface),
            ) {
                class_id = from_interface;
            }
        }

        let sysfs_id = sysfs
            .device_link(&base)
            .unwrap_or_else(|| format!("/bus/usb/devices/{}", name));

        let mut entry =
            Device::new(DeviceClass::Usb, class_id, vendor, product).with_sysfs(name, sysfs_id);

        let manufacturer = sysfs.read_optional(format!("{}/manufacturer", base)).unwrap_or(None);
        let product_name = sysfs.read_optional(format!("{}/product", base)).unwrap_or(None);
        entry.class_name = name_or_unknown(ids.class_name(&entry.class_id));
        entry.vendor_name = name_or_unknown(
            ids.vendor_name(&entry.vendor_id)
                .or(manufacturer.as_deref()),
        );
        entry.device_name = name_or_unknown(
            ids.device_name(&entry.vendor_id, &entry.device_id)
                .or(product_name.as_deref()),
        );
        devices.push(entry);
    }

    tracing::debug!("detected {} USB devices", devices.len());
    devices
}
