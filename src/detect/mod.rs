pub mod ids;
pub mod pci;
pub mod usb;

use crate::device::DeviceCatalog;
use crate::sysfs::SysfsRoot;
use ids::IdsDatabase;
use std::path::Path;

pub const UNKNOWN: &str = "Unknown";

const PRODUCT_NAME: &str = "sys/class/dmi/id/product_name";

fn name_or_unknown(name: Option<&str>) -> String {
    name.unwrap_or(UNKNOWN).to_string()
}

/// Enumerate PCI and USB devices below `sysfs`, naming them from the hwdata
/// files in `ids_dir`.
pub fn detect(sysfs: &SysfsRoot, ids_dir: &Path) -> DeviceCatalog {
    let pci_ids = IdsDatabase::load(&ids_dir.join("pci.ids"));
    let usb_ids = IdsDatabase::load(&ids_dir.join("usb.ids"));

    DeviceCatalog::new(pci::detect(sysfs, &pci_ids), usb::detect(sysfs, &usb_ids))
        .with_product_name(product_name(sysfs))
}

/// Machine model from DMI. Missing or blank means unknown.
fn product_name(sysfs: &SysfsRoot) -> Option<String> {
    match sysfs.read_optional(PRODUCT_NAME) {
        Ok(name) => name.filter(|n| !n.is_empty()),
        Err(e) => {
            tracing::warn!("cannot read product name: {}", e);
            None
        }
    }
}
