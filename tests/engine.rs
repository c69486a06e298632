use hwd::config::HwdConfig;
use hwd::device::DeviceClass;
use hwd::engine::{Engine, StatusSink};
use hwd::profile::Profile;
use hwd::sysfs::SysfsRoot;
use hwd::transaction::{Message, Operation, Status};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const PROFILES: &str = r#"
[video-nvidia]
desc = "Closed source NVIDIA drivers"
priority = 12
freedriver = false
class_ids = "0300 0302"
vendor_ids = "10de"
depends = ["nvidia-utils"]

[nvidia-utils]
desc = "NVIDIA userspace"
vendor_ids = "ffff"
depends = ["nvidia-firmware"]

[nvidia-firmware]
vendor_ids = "ffff"

[video-nouveau]
class_ids = "0300"
vendor_ids = "10de"
conflicts = ["video-nvidia*"]

[video-ghost-deps]
class_ids = "0300"
depends = ["not-in-any-catalog"]
"#;

/// Mock root with one NVIDIA GPU, one Intel NIC, a profile database and an
/// install script that appends its arguments to `script.log`.
struct Fixture {
    tmp: TempDir,
    config: HwdConfig,
}

impl Fixture {
    fn new() -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        let config = HwdConfig::rooted_at(root);

        add_pci(root, "0000:01:00.0", "0x030000", "0x10de", "0x2684");
        add_pci(root, "0000:00:1f.6", "0x020000", "0x8086", "0x15f3");

        for class in ["pci", "usb"] {
            fs::create_dir_all(config.paths.db_dir.join(class)).unwrap();
            fs::create_dir_all(config.paths.local_dir.join(class)).unwrap();
        }
        let video = config.paths.db_dir.join("pci/graphic_drivers");
        fs::create_dir_all(&video).unwrap();
        fs::write(video.join("profiles.toml"), PROFILES).unwrap();

        let log = root.join("script.log");
        let script = format!(
            "#!/bin/sh\necho \"$@\" >> \"{}\"\necho \"ran $2\"\n",
            log.display()
        );
        let script_path = &config.paths.script;
        fs::create_dir_all(script_path.parent().unwrap()).unwrap();
        fs::write(script_path, script).unwrap();
        fs::set_permissions(script_path, fs::Permissions::from_mode(0o755)).unwrap();

        Self { tmp, config }
    }

    fn engine(&self) -> Engine {
        Engine::load(self.config.clone(), SysfsRoot::new(self.tmp.path())).unwrap()
    }

    fn script_log(&self) -> Vec<String> {
        fs::read_to_string(self.tmp.path().join("script.log"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    fn record(&self, name: &str) -> PathBuf {
        self.config
            .paths
            .local_dir
            .join("pci")
            .join(name)
            .join("profiles.toml")
    }
}

fn add_pci(root: &Path, addr: &str, class: &str, vendor: &str, device: &str) {
    let dir = root.join("sys/bus/pci/devices").join(addr);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("class"), format!("{}\n", class)).unwrap();
    fs::write(dir.join("vendor"), format!("{}\n", vendor)).unwrap();
    fs::write(dir.join("device"), format!("{}\n", device)).unwrap();
}

#[derive(Default)]
struct Events {
    messages: Vec<String>,
    lines: Vec<String>,
}

impl StatusSink for Events {
    fn message(&mut self, message: Message, profile: &Profile) {
        self.messages.push(format!("{:?} {}", message, profile.name));
    }

    fn script_line(&mut self, line: &str) {
        self.lines.push(line.to_string());
    }
}

fn install(engine: &mut Engine, name: &str, force: bool, events: &mut Events) -> Status {
    let profile = engine.available_profile(name, DeviceClass::Pci).unwrap();
    let tx = engine.transaction(profile, Operation::Install, force);
    engine.run(&tx, events).unwrap()
}

#[test]
fn test_install_runs_dependencies_first_and_records_everything() {
    let fixture = Fixture::new();
    let mut engine = fixture.engine();
    let mut events = Events::default();

    let status = install(&mut engine, "video-nvidia", false, &mut events);
    assert_eq!(status, Status::Success);

    let log = fixture.script_log();
    assert_eq!(log.len(), 3);
    assert!(log[0].contains("--profile nvidia-firmware"));
    assert!(log[1].contains("--profile nvidia-utils"));
    assert!(log[2].contains("--profile video-nvidia"));

    // Only the first script of the session refreshes the package database.
    assert!(log[0].starts_with("--install --sync "));
    assert!(!log[1].contains("--sync"));
    assert!(!log[2].contains("--sync"));

    assert!(log[2].contains("--device 0300|10de|2684|1:0:0"));
    assert!(!log[2].contains("8086"));

    assert_eq!(
        events.messages,
        vec![
            "InstallStart nvidia-firmware",
            "InstallEnd nvidia-firmware",
            "InstallStart nvidia-utils",
            "InstallEnd nvidia-utils",
            "InstallStart video-nvidia",
            "InstallEnd video-nvidia",
        ]
    );
    assert!(events.lines.contains(&"ran --cachedir".to_string()));

    for name in ["video-nvidia", "nvidia-utils", "nvidia-firmware"] {
        assert!(fixture.record(name).is_file(), "missing record for {}", name);
        assert!(engine.installed_profile(name, DeviceClass::Pci).is_some());
    }
    let gpu = &engine.devices().pci[1];
    assert!(gpu.has_installed("video-nvidia"));
    assert!(gpu.has_available("video-nouveau"));
    assert!(!engine.devices().pci[0].has_available("video-nvidia"));
}

#[test]
fn test_installed_record_reloads_with_source_path() {
    let fixture = Fixture::new();
    let mut engine = fixture.engine();
    install(&mut engine, "video-nvidia", false, &mut Events::default());

    let installed = engine
        .installed_profile("video-nvidia", DeviceClass::Pci)
        .unwrap();
    let known = engine.db_profile("video-nvidia", DeviceClass::Pci).unwrap();
    assert_eq!(installed.base_path, known.base_path);
    assert_eq!(installed.priority, 12);
    assert!(!installed.is_freedriver);
    assert_eq!(installed.dependencies, vec!["nvidia-utils"]);
    assert_eq!(installed.hwd_id_groups, known.hwd_id_groups);
}

#[test]
fn test_unknown_dependency_is_skipped() {
    let fixture = Fixture::new();
    let mut engine = fixture.engine();

    let status = install(&mut engine, "video-ghost-deps", false, &mut Events::default());
    assert_eq!(status, Status::Success);
    let log = fixture.script_log();
    assert_eq!(log.len(), 1);
    assert!(log[0].contains("--profile video-ghost-deps"));
}

#[test]
fn test_reinstall_requires_force() {
    let fixture = Fixture::new();
    let mut engine = fixture.engine();
    install(&mut engine, "video-ghost-deps", false, &mut Events::default());

    let status = install(&mut engine, "video-ghost-deps", false, &mut Events::default());
    assert_eq!(status, Status::ErrorAlreadyInstalled);
    assert_eq!(fixture.script_log().len(), 1);

    let mut events = Events::default();
    let status = install(&mut engine, "video-ghost-deps", true, &mut events);
    assert_eq!(status, Status::Success);
    let log = fixture.script_log();
    assert_eq!(log.len(), 3);
    assert!(log[1].starts_with("--remove "));
    assert!(log[2].starts_with("--install "));
    assert!(fixture.record("video-ghost-deps").is_file());
}

#[test]
fn test_conflicting_install_is_refused() {
    let fixture = Fixture::new();
    let mut engine = fixture.engine();
    install(&mut engine, "video-nvidia", false, &mut Events::default());

    let mut events = Events::default();
    let status = install(&mut engine, "video-nouveau", false, &mut events);
    assert_eq!(status, Status::ErrorConflicts);
    assert!(events.messages.is_empty());
    assert_eq!(fixture.script_log().len(), 3);
    assert!(!fixture.record("video-nouveau").exists());
}

#[test]
fn test_remove_of_required_profile_is_refused() {
    let fixture = Fixture::new();
    let mut engine = fixture.engine();
    install(&mut engine, "video-nvidia", false, &mut Events::default());

    let utils = engine
        .installed_profile("nvidia-utils", DeviceClass::Pci)
        .unwrap();
    let tx = engine.transaction(utils, Operation::Remove, false);
    assert_eq!(tx.blocking_requirers.len(), 1);
    assert_eq!(tx.blocking_requirers[0].name, "video-nvidia");

    let status = engine.run(&tx, &mut Events::default()).unwrap();
    assert_eq!(status, Status::ErrorRequirements);
    assert_eq!(fixture.script_log().len(), 3);
    assert!(fixture.record("nvidia-utils").is_file());
}

#[test]
fn test_remove_deletes_record() {
    let fixture = Fixture::new();
    let mut engine = fixture.engine();
    install(&mut engine, "video-nvidia", false, &mut Events::default());

    let nvidia = engine
        .installed_profile("video-nvidia", DeviceClass::Pci)
        .unwrap();
    let tx = engine.transaction(nvidia, Operation::Remove, false);
    let mut events = Events::default();
    let status = engine.run(&tx, &mut events).unwrap();

    assert_eq!(status, Status::Success);
    assert_eq!(
        events.messages,
        vec!["RemoveStart video-nvidia", "RemoveEnd video-nvidia"]
    );
    let log = fixture.script_log();
    assert!(log[3].starts_with("--remove --cachedir "));
    assert!(!fixture.record("video-nvidia").exists());
    assert!(fixture.record("nvidia-utils").is_file());
    assert!(engine.installed_profile("video-nvidia", DeviceClass::Pci).is_none());
}

#[test]
fn test_failing_script_leaves_no_record() {
    let fixture = Fixture::new();
    fs::write(&fixture.config.paths.script, "#!/bin/sh\necho broken >&2\nexit 1\n").unwrap();
    let mut engine = fixture.engine();
    let mut events = Events::default();

    let status = install(&mut engine, "video-ghost-deps", false, &mut events);
    assert_eq!(status, Status::ErrorScriptFailed);
    assert_eq!(events.messages, vec!["InstallStart video-ghost-deps"]);
    assert_eq!(events.lines, vec!["broken"]);
    assert!(!fixture.record("video-ghost-deps").exists());
}
