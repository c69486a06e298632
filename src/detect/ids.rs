//! Reader for the hwdata `pci.ids` / `usb.ids` name databases.
//!
//! ```text
//! 10de  NVIDIA Corporation
//! 	2684  AD102 [GeForce RTX 4090]
//! 		1043 889c  ROG Strix
//! C 03  Display controller
//! 	00  VGA compatible controller
//! ```
//!
//! Only vendors, devices, classes and subclasses are kept. Subsystem and
//! prog-if lines, and the extra usb.ids sections (HID usages, languages, ...)
//! are skipped.

use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, Default)]
pub struct IdsDatabase {
    vendors: HashMap<String, String>,
    devices: HashMap<(String, String), String>,
    classes: HashMap<String, String>,
    subclasses: HashMap<(String, String), String>,
}

enum Section {
    Vendor(String),
    Class(String),
    Other,
}

fn split_entry(line: &str) -> Option<(String, String)> {
    let (id, name) = line.trim().split_once(char::is_whitespace)?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((id.to_ascii_lowercase(), name.to_string()))
}

fn is_hex(id: &str, len: usize) -> bool {
    id.len() == len && id.chars().all(|c| c.is_ascii_hexdigit())
}

impl IdsDatabase {
    /// Load an ids file. A missing or unreadable file gives an empty database.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let db = Self::parse(&content);
                tracing::debug!(
                    "{}: {} vendors, {} devices, {} classes",
                    path.display(),
                    db.vendors.len(),
                    db.devices.len(),
                    db.classes.len()
                );
                db
            }
            Err(e) => {
                tracing::debug!("no id names from {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn parse(content: &str) -> Self {
        let mut db = Self::default();
        let mut section = Section::Other;

        for line in content.lines() {
            if line.trim().is_empty() || line.starts_with('#') {
                continue;
            }
            let depth = line.chars().take_while(|c| *c == '\t').count();
            match depth {
                0 => {
                    if let Some(rest) = line.strip_prefix("C ") {
                        section = match split_entry(rest) {
                            Some((id, name)) if is_hex(&id, 2) => {
                                db.classes.insert(id.clone(), name);
                                Section::Class(id)
                            }
                            _ => Section::Other,
                        };
                        continue;
                    }
                    section = match split_entry(line) {
                        Some((id, name)) if is_hex(&id, 4) => {
                            db.vendors.insert(id.clone(), name);
                            Section::Vendor(id)
                        }
                        _ => Section::Other,
                    };
                }
                1 => {
                    let Some((id, name)) = split_entry(line) else {
                        continue;
                    };
                    match &section {
                        Section::Vendor(vendor) if is_hex(&id, 4) => {
                            db.devices.insert((vendor.clone(), id), name);
                        }
                        Section::Class(class) if is_hex(&id, 2) => {
                            db.subclasses.insert((class.clone(), id), name);
                        }
                        _ => {}
                    }
                }
                _ => {}
            }
        }
        db
    }

    pub fn vendor_name(&self, vendor_id: &str) -> Option<&str> {
        self.vendors.get(vendor_id).map(String::as_str)
    }

    pub fn device_name(&self, vendor_id: &str, device_id: &str) -> Option<&str> {
        self.devices
            .get(&(vendor_id.to_string(), device_id.to_string()))
            .map(String::as_str)
    }

    /// Name for a four-digit class id: the subclass name when known, else the
    /// base class name.
    pub fn class_name(&self, class_id: &str) -> Option<&str> {
        if class_id.len() != 4 || !class_id.is_ascii() {
            return None;
        }
        let (base, sub) = class_id.split_at(2);
        self.subclasses
            .get(&(base.to_string(), sub.to_string()))
            .or_else(|| self.classes.get(base))
            .map(String::as_str)
    }
}
