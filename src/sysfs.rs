use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// Abstraction over the sysfs/procfs filesystem root.
/// Defaults to `/` in production, redirectable to a temp directory for testing.
#[derive(Debug, Clone)]
pub struct SysfsRoot {
    root: PathBuf,
}

impl Default for SysfsRoot {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/"),
        }
    }
}

impl SysfsRoot {
    /// Create a SysfsRoot pointing at the real system.
    pub fn system() -> Self {
        Self::default()
    }

    /// Create a SysfsRoot pointing at a custom directory (for testing).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve a path relative to this root.
    /// e.g., `path("sys/bus/pci/devices")` -> `/sys/bus/pci/devices` or
    /// `<test_root>/sys/bus/pci/devices`
    pub fn path(&self, relative: impl AsRef<Path>) -> PathBuf {
        let relative = relative.as_ref();
        // Absolute paths from the config are re-rooted, not replaced.
        let relative = relative.strip_prefix("/").unwrap_or(relative);
        self.root.join(relative)
    }

    /// Read a sysfs file, returning None if it doesn't exist.
    pub fn read_optional(&self, relative: impl AsRef<Path>) -> Result<Option<String>> {
        let path = self.path(relative);
        match std::fs::read_to_string(&path) {
            Ok(s) => Ok(Some(s.trim().to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => Ok(None),
            Err(e) => Err(Error::SysfsRead { path, source: e }),
        }
    }

    /// Read a hex id attribute (`0x10de`, `10DE`) as lowercase hex without prefix.
    pub fn read_hex_id(&self, relative: impl AsRef<Path>) -> Option<String> {
        let raw = self.read_optional(relative).unwrap_or(None)?;
        let hex = raw.trim_start_matches("0x").trim_start_matches("0X");
        if hex.is_empty() || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        Some(hex.to_ascii_lowercase())
    }

    /// List entries in a sysfs directory, sorted by name.
    pub fn list_dir(&self, relative: impl AsRef<Path>) -> Result<Vec<String>> {
        let path = self.path(relative);
        let entries = std::fs::read_dir(&path).map_err(|e| Error::SysfsRead {
            path: path.clone(),
            source: e,
        })?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| Error::SysfsRead {
                path: path.clone(),
                source: e,
            })?;
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Resolve a sysfs device symlink to its `/devices/...` form.
    /// `sys/bus/pci/devices/0000:00:02.0 -> ../../../devices/pci0000:00/0000:00:02.0`
    /// becomes `/devices/pci0000:00/0000:00:02.0`.
    pub fn device_link(&self, relative: impl AsRef<Path>) -> Option<String> {
        let target = std::fs::read_link(self.path(relative)).ok()?;
        let target = target.to_string_lossy();
        let start = target.find("devices/")?;
        Some(format!("/{}", &target[start..]))
    }
}
