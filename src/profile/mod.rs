pub mod parser;
pub mod store;

use crate::device::DeviceClass;
use regex::Regex;
use serde::{Serialize, Serializer};
use std::path::PathBuf;
use std::sync::Arc;

/// One AND-connected hardware requirement of a profile.
///
/// A device satisfies the group when its class, vendor and device id each match
/// one of the listed patterns and none of the corresponding blacklist patterns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HardwareIdGroup {
    pub class_ids: Vec<String>,
    pub vendor_ids: Vec<String>,
    pub device_ids: Vec<String>,
    pub blacklisted_class_ids: Vec<String>,
    pub blacklisted_vendor_ids: Vec<String>,
    pub blacklisted_device_ids: Vec<String>,
}

/// The six id lists a group carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdField {
    Class,
    Vendor,
    Device,
    BlacklistedClass,
    BlacklistedVendor,
    BlacklistedDevice,
}

impl IdField {
    /// Order in which a declaration block's id keys are applied.
    pub const ALL: [IdField; 6] = [
        IdField::Class,
        IdField::Vendor,
        IdField::Device,
        IdField::BlacklistedClass,
        IdField::BlacklistedVendor,
        IdField::BlacklistedDevice,
    ];

    /// Key used in profile files.
    pub fn key(self) -> &'static str {
        match self {
            IdField::Class => "class_ids",
            IdField::Vendor => "vendor_ids",
            IdField::Device => "device_ids",
            IdField::BlacklistedClass => "blacklisted_class_ids",
            IdField::BlacklistedVendor => "blacklisted_vendor_ids",
            IdField::BlacklistedDevice => "blacklisted_device_ids",
        }
    }
}

impl HardwareIdGroup {
    pub fn field(&self, field: IdField) -> &Vec<String> {
        match field {
            IdField::Class => &self.class_ids,
            IdField::Vendor => &self.vendor_ids,
            IdField::Device => &self.device_ids,
            IdField::BlacklistedClass => &self.blacklisted_class_ids,
            IdField::BlacklistedVendor => &self.blacklisted_vendor_ids,
            IdField::BlacklistedDevice => &self.blacklisted_device_ids,
        }
    }

    pub fn field_mut(&mut self, field: IdField) -> &mut Vec<String> {
        match field {
            IdField::Class => &mut self.class_ids,
            IdField::Vendor => &mut self.vendor_ids,
            IdField::Device => &mut self.device_ids,
            IdField::BlacklistedClass => &mut self.blacklisted_class_ids,
            IdField::BlacklistedVendor => &mut self.blacklisted_vendor_ids,
            IdField::BlacklistedDevice => &mut self.blacklisted_device_ids,
        }
    }

    /// Replace empty class/vendor/device lists with `["*"]`.
    /// Blacklists stay empty.
    pub fn fill_wildcards(&mut self) {
        for field in [IdField::Class, IdField::Vendor, IdField::Device] {
            let ids = self.field_mut(field);
            if ids.is_empty() {
                ids.push("*".to_string());
            }
        }
    }
}

/// A compiled regular expression that compares and serializes as its source.
#[derive(Debug, Clone)]
pub struct NamePattern(Regex);

impl NamePattern {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Regex::new(pattern).map(Self)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Unanchored search, like `Regex::is_match`.
    pub fn is_match(&self, text: &str) -> bool {
        self.0.is_match(text)
    }
}

impl PartialEq for NamePattern {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for NamePattern {}

impl Serialize for NamePattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// A driver profile: which hardware it supports and how it relates to other profiles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Profile {
    pub name: String,
    pub device_class: DeviceClass,
    pub description: String,
    pub version: String,
    /// Higher is preferred.
    pub priority: i32,
    pub is_freedriver: bool,
    /// Never empty.
    pub hwd_id_groups: Vec<HardwareIdGroup>,
    pub dependencies: Vec<String>,
    /// Glob patterns over profile names.
    pub conflicts: Vec<String>,
    /// Checked against the device name in place of the device ids.
    pub device_name_pattern: Option<NamePattern>,
    /// The profile only applies on machines whose DMI product name matches.
    pub product_name_pattern: Option<NamePattern>,
    pub base_path: PathBuf,
    pub config_path: PathBuf,
}

impl Profile {
    /// A fresh profile with a single empty id group.
    pub fn new(name: impl Into<String>, device_class: DeviceClass) -> Self {
        Self {
            name: name.into(),
            device_class,
            description: String::new(),
            version: String::new(),
            priority: 0,
            is_freedriver: true,
            hwd_id_groups: vec![HardwareIdGroup::default()],
            dependencies: Vec::new(),
            conflicts: Vec::new(),
            device_name_pattern: None,
            product_name_pattern: None,
            base_path: PathBuf::new(),
            config_path: PathBuf::new(),
        }
    }

    /// Apply one id declaration. Starts a new group when the current group
    /// already has this field set, otherwise fills it in place.
    pub fn add_ids(&mut self, field: IdField, ids: Vec<String>) {
        if ids.is_empty() {
            return;
        }
        let needs_new_group = self
            .hwd_id_groups
            .last()
            .is_none_or(|group| !group.field(field).is_empty());
        if needs_new_group {
            self.hwd_id_groups.push(HardwareIdGroup::default());
        }
        if let Some(group) = self.hwd_id_groups.last_mut() {
            *group.field_mut(field) = ids;
        }
    }

    /// Begin a new id group for a declaration block, unless the last group
    /// has nothing in it yet.
    pub fn start_group(&mut self) {
        let reusable = self
            .hwd_id_groups
            .last()
            .is_some_and(|group| *group == HardwareIdGroup::default());
        if !reusable {
            self.hwd_id_groups.push(HardwareIdGroup::default());
        }
    }

    /// Enforce the load-time wildcard invariant on every group.
    pub fn fill_wildcards(&mut self) {
        if self.hwd_id_groups.is_empty() {
            self.hwd_id_groups.push(HardwareIdGroup::default());
        }
        for group in &mut self.hwd_id_groups {
            group.fill_wildcards();
        }
    }
}

/// A profile entry that failed to load. Reported, never matched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvalidProfile {
    pub name: String,
    pub path: PathBuf,
    pub reason: String,
}

/// Profiles of one device class.
#[derive(Debug, Clone, Default)]
pub struct ClassProfiles {
    pub all: Vec<Arc<Profile>>,
    pub installed: Vec<Arc<Profile>>,
    pub invalid: Vec<InvalidProfile>,
}

/// All known, installed and invalid profiles per device class.
#[derive(Debug, Clone, Default)]
pub struct ProfileCatalog {
    pub pci: ClassProfiles,
    pub usb: ClassProfiles,
}

impl ProfileCatalog {
    pub fn class(&self, class: DeviceClass) -> &ClassProfiles {
        match class {
            DeviceClass::Pci => &self.pci,
            DeviceClass::Usb => &self.usb,
        }
    }

    pub fn class_mut(&mut self, class: DeviceClass) -> &mut ClassProfiles {
        match class {
            DeviceClass::Pci => &mut self.pci,
            DeviceClass::Usb => &mut self.usb,
        }
    }

    pub fn all(&self, class: DeviceClass) -> &[Arc<Profile>] {
        &self.class(class).all
    }

    pub fn installed(&self, class: DeviceClass) -> &[Arc<Profile>] {
        &self.class(class).installed
    }

    /// Invalid entries of both classes, PCI first.
    pub fn invalid(&self) -> impl Iterator<Item = &InvalidProfile> {
        self.pci.invalid.iter().chain(self.usb.invalid.iter())
    }
}

/// First profile with exactly this name.
pub fn find_by_name<'a>(profiles: &'a [Arc<Profile>], name: &str) -> Option<&'a Arc<Profile>> {
    profiles.iter().find(|p| p.name == name)
}
