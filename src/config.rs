use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level hwd configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HwdConfig {
    pub paths: PathsConfig,
    pub package_manager: PackageManagerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Profile database, one subdirectory per device class.
    pub db_dir: PathBuf,
    /// Installed-profile store, one subdirectory per device class.
    pub local_dir: PathBuf,
    /// Script invoked to install or remove a profile.
    pub script: PathBuf,
    /// Directory holding `pci.ids` and `usb.ids`.
    pub ids_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            db_dir: PathBuf::from("/var/lib/hwd/db"),
            local_dir: PathBuf::from("/var/lib/hwd/local"),
            script: PathBuf::from("/var/lib/hwd/scripts/hwd"),
            ids_dir: PathBuf::from("/usr/share/hwdata"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackageManagerConfig {
    pub cache_dir: PathBuf,
    pub config: PathBuf,
    pub root: PathBuf,
    /// Ask the script to refresh the package database on the first install.
    pub sync_database: bool,
}

impl Default for PackageManagerConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("/var/cache/pacman/pkg"),
            config: PathBuf::from("/etc/pacman.conf"),
            root: PathBuf::from("/"),
            sync_database: true,
        }
    }
}

const SYSTEM_CONFIG: &str = "/etc/hwd/config.toml";

fn read_value(path: &Path) -> Option<toml::Value> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!("ignoring malformed config {}: {}", path.display(), e);
            None
        }
    }
}

/// Load the system config file if it exists.
fn load_system() -> Option<toml::Value> {
    read_value(Path::new(SYSTEM_CONFIG))
}

/// Load the user config file (~/.config/hwd/config.toml) if it exists.
fn load_user() -> Option<toml::Value> {
    let dir = dirs::config_dir()?;
    read_value(&dir.join("hwd").join("config.toml"))
}

/// Recursively merge two TOML values. Tables are merged key-by-key;
/// all other types in `overlay` replace `base`.
fn merge_values(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_values(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load config from a specific path, ignoring system/user files.
fn load_from_path(path: &Path) -> HwdConfig {
    match std::fs::read_to_string(path) {
        Ok(content) => toml::from_str(&content).unwrap_or_else(|e| {
            tracing::warn!("failed to parse config at {}: {}", path.display(), e);
            HwdConfig::default()
        }),
        Err(e) => {
            tracing::warn!("failed to read config at {}: {}", path.display(), e);
            HwdConfig::default()
        }
    }
}

fn from_layers(system: Option<toml::Value>, user: Option<toml::Value>) -> HwdConfig {
    let merged = match (system, user) {
        (Some(s), Some(u)) => Some(merge_values(s, u)),
        (Some(v), None) | (None, Some(v)) => Some(v),
        (None, None) => None,
    };

    match merged {
        Some(value) => value.try_into().unwrap_or_else(|e| {
            tracing::warn!("failed to deserialize config: {}", e);
            HwdConfig::default()
        }),
        None => HwdConfig::default(),
    }
}

/// Load the merged config: system defaults, then user overrides.
/// If `override_path` is provided, use only that file instead.
pub fn load(override_path: Option<&PathBuf>) -> HwdConfig {
    if let Some(path) = override_path {
        return load_from_path(path);
    }
    from_layers(load_system(), load_user())
}

impl HwdConfig {
    /// Apply command-line package-manager overrides.
    pub fn with_package_manager_overrides(
        mut self,
        cache_dir: Option<PathBuf>,
        config: Option<PathBuf>,
        root: Option<PathBuf>,
    ) -> Self {
        if let Some(cache_dir) = cache_dir {
            self.package_manager.cache_dir = cache_dir;
        }
        if let Some(config) = config {
            self.package_manager.config = config;
        }
        if let Some(root) = root {
            self.package_manager.root = root;
        }
        self
    }

    /// Configuration rooted entirely below `root`, as used by the tests.
    pub fn rooted_at(root: &Path) -> Self {
        let defaults = PathsConfig::default();
        let reroot = |path: &Path| root.join(path.strip_prefix("/").unwrap_or(path));
        Self {
            paths: PathsConfig {
                db_dir: reroot(&defaults.db_dir),
                local_dir: reroot(&defaults.local_dir),
                script: reroot(&defaults.script),
                ids_dir: reroot(&defaults.ids_dir),
            },
            package_manager: PackageManagerConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HwdConfig::default();
        assert_eq!(config.paths.db_dir, PathBuf::from("/var/lib/hwd/db"));
        assert_eq!(config.paths.local_dir, PathBuf::from("/var/lib/hwd/local"));
        assert_eq!(config.paths.script, PathBuf::from("/var/lib/hwd/scripts/hwd"));
        assert_eq!(config.paths.ids_dir, PathBuf::from("/usr/share/hwdata"));
        assert_eq!(
            config.package_manager.cache_dir,
            PathBuf::from("/var/cache/pacman/pkg")
        );
        assert_eq!(config.package_manager.config, PathBuf::from("/etc/pacman.conf"));
        assert_eq!(config.package_manager.root, PathBuf::from("/"));
        assert!(config.package_manager.sync_database);
    }

    #[test]
    fn test_merge_values_tables() {
        let base: toml::Value = toml::from_str(
            r#"
            [paths]
            db_dir = "/srv/db"
            local_dir = "/srv/local"
            [package_manager]
            sync_database = false
        "#,
        )
        .unwrap();

        let overlay: toml::Value = toml::from_str(
            r#"
            [paths]
            db_dir = "/home/me/db"
        "#,
        )
        .unwrap();

        let merged = merge_values(base, overlay);
        let table = merged.as_table().unwrap();

        let paths = table["paths"].as_table().unwrap();
        assert_eq!(paths["db_dir"].as_str(), Some("/home/me/db"));
        assert_eq!(paths["local_dir"].as_str(), Some("/srv/local"));

        let pm = table["package_manager"].as_table().unwrap();
        assert_eq!(pm["sync_database"].as_bool(), Some(false));
    }

    #[test]
    fn test_merge_values_overlay_replaces_scalar() {
        let base: toml::Value = toml::from_str("value = 1").unwrap();
        let overlay: toml::Value = toml::from_str("value = 2").unwrap();
        let merged = merge_values(base, overlay);
        assert_eq!(merged["value"].as_integer(), Some(2));
    }

    #[test]
    fn test_layers_user_overrides_system() {
        let system: toml::Value = toml::from_str(
            r#"
            [paths]
            script = "/opt/hwd/run"
            [package_manager]
            root = "/mnt"
        "#,
        )
        .unwrap();
        let user: toml::Value = toml::from_str(
            r#"
            [package_manager]
            root = "/target"
        "#,
        )
        .unwrap();

        let config = from_layers(Some(system), Some(user));
        assert_eq!(config.paths.script, PathBuf::from("/opt/hwd/run"));
        assert_eq!(config.package_manager.root, PathBuf::from("/target"));
        assert_eq!(config.paths.db_dir, PathBuf::from("/var/lib/hwd/db"));
    }

    #[test]
    fn test_layers_with_bad_types_fall_back_to_defaults() {
        let user: toml::Value =
            toml::from_str("[package_manager]\nsync_database = \"yes\"").unwrap();
        assert_eq!(from_layers(None, Some(user)), HwdConfig::default());
    }

    #[test]
    fn test_deserialize_partial_config() {
        let config: HwdConfig = toml::from_str("[paths]\nids_dir = \"/opt/ids\"").unwrap();
        assert_eq!(config.paths.ids_dir, PathBuf::from("/opt/ids"));
        assert_eq!(config.paths.db_dir, PathBuf::from("/var/lib/hwd/db"));
        assert!(config.package_manager.sync_database);
    }

    #[test]
    fn test_load_from_path() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[package_manager]\ncache_dir = \"/tmp/pkg\"\n").unwrap();
        let config = load(Some(&path));
        assert_eq!(config.package_manager.cache_dir, PathBuf::from("/tmp/pkg"));
        assert_eq!(config.paths, PathsConfig::default());
    }

    #[test]
    fn test_load_from_nonexistent_path() {
        let config = load_from_path(Path::new("/nonexistent/config.toml"));
        assert_eq!(config, HwdConfig::default());
    }

    #[test]
    fn test_package_manager_overrides() {
        let config = HwdConfig::default().with_package_manager_overrides(
            None,
            Some(PathBuf::from("/tmp/pacman.conf")),
            Some(PathBuf::from("/mnt")),
        );
        assert_eq!(
            config.package_manager.cache_dir,
            PathBuf::from("/var/cache/pacman/pkg")
        );
        assert_eq!(config.package_manager.config, PathBuf::from("/tmp/pacman.conf"));
        assert_eq!(config.package_manager.root, PathBuf::from("/mnt"));
    }

    #[test]
    fn test_rooted_at_moves_every_path() {
        let config = HwdConfig::rooted_at(Path::new("/tmp/root"));
        assert_eq!(config.paths.db_dir, PathBuf::from("/tmp/root/var/lib/hwd/db"));
        assert_eq!(
            config.paths.script,
            PathBuf::from("/tmp/root/var/lib/hwd/scripts/hwd")
        );
    }

    #[test]
    fn test_roundtrip_serialize() {
        let config = HwdConfig::default();
        let serialized = toml::to_string_pretty(&config).unwrap();
        let deserialized: HwdConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(config, deserialized);
    }
}
