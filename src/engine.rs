use crate::config::HwdConfig;
use crate::detect;
use crate::device::{Device, DeviceCatalog, DeviceClass};
use crate::error::{Error, Result};
use crate::matching;
use crate::profile::store::ProfileStore;
use crate::profile::{Profile, ProfileCatalog, find_by_name};
use crate::script::{CancelHandle, ScriptRunner};
use crate::sysfs::SysfsRoot;
use crate::transaction::{self, Message, Operation, Status, Transaction, TransactionOps};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

/// Receives progress of transactions run through [`Engine::run`].
pub trait StatusSink {
    fn message(&mut self, message: Message, profile: &Profile);
    fn script_line(&mut self, line: &str);
}

/// Devices and profiles of one system, matched against each other.
///
/// Every mutation goes through a full rebuild ([`Engine::refresh`]); the
/// attached profile lists are never patched in place.
#[derive(Debug)]
pub struct Engine {
    config: HwdConfig,
    sysfs: SysfsRoot,
    store: ProfileStore,
    runner: ScriptRunner,
    devices: DeviceCatalog,
    profiles: ProfileCatalog,
}

impl Engine {
    /// Enumerate devices, load the profile catalogs and match them.
    pub fn load(config: HwdConfig, sysfs: SysfsRoot) -> Result<Self> {
        let store = ProfileStore::new(&config.paths.db_dir, &config.paths.local_dir);
        let runner = ScriptRunner::from_config(&config);
        let mut engine = Self {
            config,
            sysfs,
            store,
            runner,
            devices: DeviceCatalog::default(),
            profiles: ProfileCatalog::default(),
        };
        engine.refresh()?;
        Ok(engine)
    }

    /// Rebuild devices, catalogs and attachments from scratch.
    pub fn refresh(&mut self) -> Result<()> {
        let profiles = self.store.load_catalog()?;
        let mut devices = detect::detect(&self.sysfs, &self.config.paths.ids_dir);

        let product = devices.product_name.clone();
        for class in DeviceClass::ALL {
            let pool = devices.devices_mut(class);
            matching::attach_profiles(pool, profiles.all(class), false, product.as_deref());
            matching::attach_profiles(pool, profiles.installed(class), true, product.as_deref());
        }

        tracing::debug!(
            "refreshed: {} PCI / {} USB devices",
            devices.pci.len(),
            devices.usb.len()
        );
        self.devices = devices;
        self.profiles = profiles;
        Ok(())
    }

    pub fn config(&self) -> &HwdConfig {
        &self.config
    }

    pub fn devices(&self) -> &DeviceCatalog {
        &self.devices
    }

    pub fn profiles(&self) -> &ProfileCatalog {
        &self.profiles
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.runner.cancel_handle()
    }

    /// The profile as attached to the first device offering it.
    pub fn available_profile(&self, name: &str, class: DeviceClass) -> Option<Arc<Profile>> {
        self.devices
            .devices(class)
            .iter()
            .find_map(|d| find_by_name(&d.available_profiles, name))
            .cloned()
    }

    pub fn db_profile(&self, name: &str, class: DeviceClass) -> Option<Arc<Profile>> {
        find_by_name(self.profiles.all(class), name).cloned()
    }

    pub fn installed_profile(&self, name: &str, class: DeviceClass) -> Option<Arc<Profile>> {
        find_by_name(self.profiles.installed(class), name).cloned()
    }

    /// The profile to install for `name`: the copy attached to a device. A
    /// catalog profile no device matches is refused.
    pub fn install_candidate(&self, name: &str, class: DeviceClass) -> Result<Arc<Profile>> {
        if let Some(profile) = self.available_profile(name, class) {
            return Ok(profile);
        }
        if self.db_profile(name, class).is_some() {
            return Err(Error::NoMatchingDevice {
                name: name.to_string(),
            });
        }
        Err(Error::ProfileNotFound {
            name: name.to_string(),
            class: class.to_string(),
        })
    }

    /// Catalog and installed-store roots that do not exist.
    pub fn missing_dirs(&self) -> Vec<PathBuf> {
        DeviceClass::ALL
            .into_iter()
            .flat_map(|class| [self.store.catalog_dir(class), self.store.installed_dir(class)])
            .filter(|dir| !dir.is_dir())
            .collect()
    }

    pub fn transaction(
        &self,
        profile: Arc<Profile>,
        operation: Operation,
        allow_reinstall: bool,
    ) -> Transaction {
        let class = profile.device_class;
        Transaction::new(profile, operation, allow_reinstall, self.profiles.class(class))
    }

    /// Execute `tx` with the given side effects, then rebuild.
    pub fn perform(&mut self, tx: &Transaction, ops: &mut impl TransactionOps) -> Result<Status> {
        let status =
            transaction::execute(tx, self.profiles.installed(tx.profile.device_class), ops);
        tracing::info!("{} '{}': {:?}", tx.operation, tx.profile.name, status);
        self.refresh()?;
        Ok(status)
    }

    /// Execute `tx` against the system: run the configured script and update
    /// the installed-profile store. Rebuilds afterwards.
    pub fn run(&mut self, tx: &Transaction, sink: &mut dyn StatusSink) -> Result<Status> {
        let mut ops = SystemOps {
            runner: &mut self.runner,
            store: &self.store,
            devices: &self.devices,
            sink,
        };
        let status =
            transaction::execute(tx, self.profiles.installed(tx.profile.device_class), &mut ops);
        tracing::info!("{} '{}': {:?}", tx.operation, tx.profile.name, status);
        self.refresh()?;
        Ok(status)
    }

    /// Pick a profile for every device of `class` whose class id equals
    /// `class_id`: the highest-priority available one, restricted to free
    /// drivers unless `allow_nonfree`.
    pub fn autoconfigure(
        &self,
        class: DeviceClass,
        class_id: &str,
        allow_nonfree: bool,
        force: bool,
    ) -> AutoconfigurePlan {
        let class_id = class_id.to_ascii_lowercase();
        let mut plan = AutoconfigurePlan::default();

        for device in self.devices.devices(class) {
            if device.class_id != class_id {
                continue;
            }
            plan.found_device = true;

            let candidate = device
                .available_profiles
                .iter()
                .find(|p| allow_nonfree || p.is_freedriver);
            let choice = match candidate {
                None => Choice::NoProfile,
                Some(profile) => {
                    let installed = self.installed_profile(&profile.name, class).is_some();
                    if installed && !force {
                        Choice::AlreadyInstalled(profile.name.clone())
                    } else {
                        if !plan.profiles.contains(&profile.name) {
                            plan.profiles.push(profile.name.clone());
                        }
                        Choice::Use(profile.name.clone())
                    }
                }
            };
            plan.devices.push(DeviceChoice {
                device: describe_device(device),
                choice,
            });
        }

        tracing::debug!(
            "autoconfigure {} {}: {} profile(s) selected",
            class,
            class_id,
            plan.profiles.len()
        );
        plan
    }
}

fn describe_device(device: &Device) -> String {
    format!(
        "{} {} {} {}",
        device.label(),
        device.class_name,
        device.vendor_name,
        device.device_name
    )
}

/// What autoconfigure decided for one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", content = "profile", rename_all = "snake_case")]
pub enum Choice {
    Use(String),
    AlreadyInstalled(String),
    NoProfile,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceChoice {
    pub device: String,
    pub choice: Choice,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AutoconfigurePlan {
    /// Whether any device of the requested class id exists.
    pub found_device: bool,
    /// Profiles to install, de-duplicated, in device order.
    pub profiles: Vec<String>,
    pub devices: Vec<DeviceChoice>,
}

struct SystemOps<'a, S: StatusSink + ?Sized> {
    runner: &'a mut ScriptRunner,
    store: &'a ProfileStore,
    devices: &'a DeviceCatalog,
    sink: &'a mut S,
}

impl<S: StatusSink + ?Sized> TransactionOps for SystemOps<'_, S> {
    fn run_script(&mut self, profile: &Profile, operation: Operation) -> Result<()> {
        let devices = self.devices.devices(profile.device_class);
        let sink = &mut *self.sink;
        self.runner
            .run(profile, operation, devices, &mut |line| sink.script_line(line))
    }

    fn persist_install(&mut self, profile: &Profile) -> Result<()> {
        self.store.install(profile)
    }

    fn persist_remove(&mut self, profile: &Profile) -> Result<()> {
        self.store.remove(profile)
    }

    fn message(&mut self, message: Message, profile: &Profile) {
        self.sink.message(message, profile);
    }
}
