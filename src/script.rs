use crate::config::HwdConfig;
use crate::device::{Device, DeviceClass, unique_devices};
use crate::error::{Error, Result};
use crate::matching;
use crate::profile::Profile;
use crate::transaction::Operation;
use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use std::io::{BufRead, BufReader, Read};
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;

/// Package-manager environment handed to the install script.
#[derive(Debug, Clone, PartialEq)]
pub struct Environment {
    pub cache_dir: PathBuf,
    pub config: PathBuf,
    pub root: PathBuf,
}

impl Environment {
    pub fn from_config(config: &HwdConfig) -> Self {
        Self {
            cache_dir: config.package_manager.cache_dir.clone(),
            config: config.package_manager.config.clone(),
            root: config.package_manager.root.clone(),
        }
    }
}

/// Terminates the process group of the script currently running, if any.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    running: Arc<Mutex<Option<i32>>>,
}

impl CancelHandle {
    /// Send SIGTERM to the running script's process group. Returns false when
    /// nothing is running.
    pub fn cancel(&self) -> bool {
        let Ok(running) = self.running.lock() else {
            return false;
        };
        match *running {
            Some(pgid) => match killpg(Pid::from_raw(pgid), Signal::SIGTERM) {
                Ok(()) => {
                    tracing::info!("sent SIGTERM to script process group {}", pgid);
                    true
                }
                Err(e) => {
                    tracing::warn!("cannot signal process group {}: {}", pgid, e);
                    false
                }
            },
            None => false,
        }
    }

    fn set(&self, pgid: Option<i32>) {
        if let Ok(mut running) = self.running.lock() {
            *running = pgid;
        }
    }
}

/// Runs the external install/remove script.
#[derive(Debug)]
pub struct ScriptRunner {
    script: PathBuf,
    env: Environment,
    sync_pending: bool,
    cancel: CancelHandle,
}

impl ScriptRunner {
    pub fn new(script: impl Into<PathBuf>, env: Environment, sync_database: bool) -> Self {
        Self {
            script: script.into(),
            env,
            sync_pending: sync_database,
            cancel: CancelHandle::default(),
        }
    }

    pub fn from_config(config: &HwdConfig) -> Self {
        Self::new(
            &config.paths.script,
            Environment::from_config(config),
            config.package_manager.sync_database,
        )
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Whether the next install still passes `--sync`.
    pub fn sync_pending(&self) -> bool {
        self.sync_pending
    }

    /// Command-line arguments for running `profile` against `devices` (the
    /// pool of its class).
    pub fn arguments(
        &self,
        profile: &Profile,
        operation: Operation,
        devices: &[Device],
    ) -> Vec<String> {
        let mut args = vec![match operation {
            Operation::Install => "--install".to_string(),
            Operation::Remove => "--remove".to_string(),
        }];
        if self.sync_pending {
            args.push("--sync".to_string());
        }
        args.push("--cachedir".to_string());
        args.push(self.env.cache_dir.to_string_lossy().into_owned());
        args.push("--pmconfig".to_string());
        args.push(self.env.config.to_string_lossy().into_owned());
        args.push("--pmroot".to_string());
        args.push(self.env.root.to_string_lossy().into_owned());
        args.push("--profile".to_string());
        args.push(profile.name.clone());
        args.push("--path".to_string());
        args.push(profile.config_path.to_string_lossy().into_owned());

        if profile.device_class == DeviceClass::Pci {
            let matched: Vec<&Device> = matching::devices_for_profile(profile, devices)
                .into_iter()
                .map(|index| &devices[index])
                .collect();
            for device in unique_devices(matched) {
                args.push("--device".to_string());
                args.push(format!(
                    "{}|{}|{}|{}",
                    device.class_id,
                    device.vendor_id,
                    device.device_id,
                    decimal_bus_id(&device.sysfs_bus_id)
                ));
            }
        }
        args
    }

    /// Run the script and stream its output to `sink`. A non-zero exit status
    /// is an error.
    pub fn run(
        &mut self,
        profile: &Profile,
        operation: Operation,
        devices: &[Device],
        sink: &mut dyn FnMut(&str),
    ) -> Result<()> {
        let args = self.arguments(profile, operation, devices);
        tracing::info!("running {} {}", self.script.display(), args.join(" "));

        run_streaming(&self.script, &args, &self.cancel, sink)?;

        if operation == Operation::Install && self.sync_pending {
            tracing::debug!("package database synced, dropping --sync");
            self.sync_pending = false;
        }
        Ok(())
    }
}

/// `0000:01:00.1` becomes `1:0:1`. Ids that do not have three hex parts are
/// passed through unchanged.
pub fn decimal_bus_id(bus_id: &str) -> String {
    let normalized = bus_id.replace('.', ":");
    let parts: Vec<&str> = normalized.split(':').collect();
    if parts.len() < 3 {
        return bus_id.to_string();
    }
    let tail = &parts[parts.len() - 3..];
    let decimal: std::result::Result<Vec<u64>, _> =
        tail.iter().map(|p| u64::from_str_radix(p, 16)).collect();
    match decimal {
        Ok(values) => format!("{}:{}:{}", values[0], values[1], values[2]),
        Err(_) => bus_id.to_string(),
    }
}

fn forward_lines(
    stream: impl Read + Send + 'static,
    tx: mpsc::Sender<String>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let reader = BufReader::new(stream);
        for line in reader.lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    })
}

fn run_streaming(
    script: &std::path::Path,
    args: &[String],
    cancel: &CancelHandle,
    sink: &mut dyn FnMut(&str),
) -> Result<()> {
    let mut child = Command::new(script)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0)
        .spawn()
        .map_err(|e| Error::Script {
            path: script.to_path_buf(),
            detail: format!("cannot start: {}", e),
        })?;

    let pid = i32::try_from(child.id()).ok();
    cancel.set(pid);

    let (tx, rx) = mpsc::channel();
    let mut readers = Vec::new();
    if let Some(stdout) = child.stdout.take() {
        readers.push(forward_lines(stdout, tx.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(forward_lines(stderr, tx.clone()));
    }
    drop(tx);

    for line in rx {
        sink(&line);
    }
    for reader in readers {
        let _ = reader.join();
    }

    let status = child.wait();
    cancel.set(None);
    let status = status.map_err(|e| Error::Script {
        path: script.to_path_buf(),
        detail: format!("cannot wait for script: {}", e),
    })?;

    if status.success() {
        Ok(())
    } else {
        Err(Error::Script {
            path: script.to_path_buf(),
            detail: format!("exited with {}", status),
        })
    }
}
