use super::parser::{self, ParsedFile};
use super::{ClassProfiles, Profile, ProfileCatalog};
use crate::device::DeviceClass;
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use toml::{Table, Value};

/// File holding the profiles of one catalog or installed-store directory.
pub const PROFILE_FILE: &str = "profiles.toml";

/// Profile database (`<db_dir>/<class>/*/profiles.toml`) and the
/// installed-profile store (`<local_dir>/<class>/<name>/profiles.toml`).
#[derive(Debug, Clone)]
pub struct ProfileStore {
    db_dir: PathBuf,
    local_dir: PathBuf,
}

impl ProfileStore {
    pub fn new(db_dir: impl Into<PathBuf>, local_dir: impl Into<PathBuf>) -> Self {
        Self {
            db_dir: db_dir.into(),
            local_dir: local_dir.into(),
        }
    }

    pub fn catalog_dir(&self, class: DeviceClass) -> PathBuf {
        self.db_dir.join(class.dir_name())
    }

    pub fn installed_dir(&self, class: DeviceClass) -> PathBuf {
        self.local_dir.join(class.dir_name())
    }

    /// Where the installed record of `profile` lives.
    pub fn record_path(&self, profile: &Profile) -> PathBuf {
        self.installed_dir(profile.device_class)
            .join(&profile.name)
            .join(PROFILE_FILE)
    }

    /// Load every known, installed and invalid profile of both classes.
    pub fn load_catalog(&self) -> Result<ProfileCatalog> {
        let mut catalog = ProfileCatalog::default();
        for class in DeviceClass::ALL {
            let all = load_dir(&self.catalog_dir(class), class)?;
            let installed = load_dir(&self.installed_dir(class), class)?;

            let mut invalid = all.invalid;
            invalid.extend(installed.invalid);

            *catalog.class_mut(class) = ClassProfiles {
                all: into_sorted(all.profiles),
                installed: into_sorted(installed.profiles),
                invalid,
            };
            tracing::debug!(
                "{} catalog: {} known, {} installed, {} invalid",
                class,
                catalog.all(class).len(),
                catalog.installed(class).len(),
                catalog.class(class).invalid.len()
            );
        }
        Ok(catalog)
    }

    /// Write the installed record of `profile`.
    pub fn install(&self, profile: &Profile) -> Result<()> {
        let path = self.record_path(profile);
        let record = render_record(profile, &chrono::Utc::now().to_rfc3339())?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| Error::Persist {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(&path, record).map_err(|source| Error::Persist {
            path: path.clone(),
            source,
        })?;
        tracing::info!("recorded '{}' as installed at {}", profile.name, path.display());
        Ok(())
    }

    /// Delete the installed record of `profile`.
    pub fn remove(&self, profile: &Profile) -> Result<()> {
        let dir = self.installed_dir(profile.device_class).join(&profile.name);
        std::fs::remove_dir_all(&dir).map_err(|source| Error::Persist {
            path: dir.clone(),
            source,
        })?;
        tracing::info!("removed installed record {}", dir.display());
        Ok(())
    }
}

/// Parse `<dir>/*/profiles.toml`. A missing directory is empty; any other
/// read failure of the directory itself is an error.
fn load_dir(dir: &Path, class: DeviceClass) -> Result<ParsedFile> {
    let mut parsed = ParsedFile::default();

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!("profile directory {} does not exist", dir.display());
            return Ok(parsed);
        }
        Err(source) => {
            return Err(Error::CatalogRead {
                path: dir.to_path_buf(),
                source,
            });
        }
    };

    let mut subdirs = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| Error::CatalogRead {
            path: dir.to_path_buf(),
            source,
        })?;
        subdirs.push(entry.path());
    }
    subdirs.sort();

    for subdir in subdirs {
        let file = subdir.join(PROFILE_FILE);
        if !file.is_file() {
            continue;
        }
        let ParsedFile { profiles, invalid } = parser::parse_file(&file, class);
        tracing::debug!(
            "{}: {} profiles, {} invalid",
            file.display(),
            profiles.len(),
            invalid.len()
        );
        parsed.profiles.extend(profiles);
        parsed.invalid.extend(invalid);
    }

    Ok(parsed)
}

/// Stable sort by descending priority.
fn into_sorted(mut profiles: Vec<Profile>) -> Vec<Arc<Profile>> {
    profiles.sort_by(|a, b| b.priority.cmp(&a.priority));
    profiles.into_iter().map(Arc::new).collect()
}

fn string_array(items: &[String]) -> Value {
    Value::Array(items.iter().cloned().map(Value::String).collect())
}

/// Render the installed record of `profile`. Every id group is written as an
/// `ids` block so the record parses back into the same groups.
pub fn render_record(profile: &Profile, installed_at: &str) -> Result<String> {
    let mut node = Table::new();
    node.insert("desc".into(), Value::String(profile.description.clone()));
    node.insert("version".into(), Value::String(profile.version.clone()));
    node.insert("priority".into(), Value::Integer(i64::from(profile.priority)));
    node.insert("freedriver".into(), Value::Boolean(profile.is_freedriver));
    node.insert("depends".into(), string_array(&profile.dependencies));
    node.insert("conflicts".into(), string_array(&profile.conflicts));
    if let Some(pattern) = &profile.device_name_pattern {
        node.insert("device_name_pattern".into(), Value::String(pattern.as_str().into()));
    }
    if let Some(pattern) = &profile.product_name_pattern {
        node.insert("hwd_product_name_pattern".into(), Value::String(pattern.as_str().into()));
    }
    node.insert(
        "source".into(),
        Value::String(profile.base_path.to_string_lossy().into_owned()),
    );
    node.insert("installed_at".into(), Value::String(installed_at.to_string()));

    let blocks = profile
        .hwd_id_groups
        .iter()
        .map(|group| {
            let mut block = Table::new();
            for field in super::IdField::ALL {
                let ids = group.field(field);
                if !ids.is_empty() {
                    block.insert(field.key().into(), string_array(ids));
                }
            }
            Value::Table(block)
        })
        .collect();
    node.insert("ids".into(), Value::Array(blocks));

    let mut root = Table::new();
    root.insert(profile.name.clone(), Value::Table(node));
    toml::to_string(&root).map_err(|e| Error::Other(format!("cannot render profile record: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{IdField, NamePattern};
    use std::fs;

    fn strings(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn sample_profile(base: &Path) -> Profile {
        let mut p = Profile::new("nvidia.open", DeviceClass::Pci);
        p.description = "Open NVIDIA kernel modules".into();
        p.version = "1.2".into();
        p.priority = 7;
        p.is_freedriver = false;
        p.add_ids(IdField::Vendor, strings(&["10de"]));
        p.add_ids(IdField::BlacklistedDevice, strings(&["1f9d"]));
        p.add_ids(IdField::Vendor, strings(&["8086"]));
        p.dependencies = strings(&["nvidia-utils"]);
        p.conflicts = strings(&["nvidia-legacy-*"]);
        p.product_name_pattern = NamePattern::new("^ROG (Ally|Flow)").ok();
        p.base_path = base.join("db/pci/nvidia");
        p.config_path = base.join("db/pci/nvidia/profiles.toml");
        p.fill_wildcards();
        p
    }

    #[test]
    fn test_install_writes_record_that_parses_back() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ProfileStore::new(tmp.path().join("db"), tmp.path().join("local"));
        let profile = sample_profile(tmp.path());

        store.install(&profile).unwrap();

        let record = tmp.path().join("local/pci/nvidia.open/profiles.toml");
        assert!(record.is_file());
        let parsed = parser::parse_file(&record, DeviceClass::Pci);
        assert!(parsed.invalid.is_empty());
        let loaded = &parsed.profiles[0];
        assert_eq!(loaded.name, profile.name);
        assert_eq!(loaded.hwd_id_groups, profile.hwd_id_groups);
        assert_eq!(loaded.dependencies, profile.dependencies);
        assert_eq!(loaded.conflicts, profile.conflicts);
        assert_eq!(loaded.product_name_pattern, profile.product_name_pattern);
        assert_eq!(loaded.device_name_pattern, None);
        assert_eq!(loaded.priority, 7);
        assert!(!loaded.is_freedriver);
        assert_eq!(loaded.base_path, profile.base_path);
        assert_eq!(loaded.config_path, record);
    }

    #[test]
    fn test_remove_deletes_record_and_fails_when_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ProfileStore::new(tmp.path().join("db"), tmp.path().join("local"));
        let profile = sample_profile(tmp.path());

        store.install(&profile).unwrap();
        store.remove(&profile).unwrap();
        assert!(!tmp.path().join("local/pci/nvidia.open").exists());

        let err = store.remove(&profile).unwrap_err();
        assert!(matches!(err, Error::Persist { .. }));
    }

    #[test]
    fn test_load_catalog_sorts_by_priority_and_collects_invalid() {
        let tmp = tempfile::tempdir().unwrap();
        let db = tmp.path().join("db/pci");
        fs::create_dir_all(db.join("a")).unwrap();
        fs::create_dir_all(db.join("b")).unwrap();
        fs::create_dir_all(db.join("empty")).unwrap();
        fs::write(
            db.join("a/profiles.toml"),
            "[low]\npriority = 1\n[bad]\npriority = \"x\"\n",
        )
        .unwrap();
        fs::write(
            db.join("b/profiles.toml"),
            "[high]\npriority = 9\n[low-too]\npriority = 1\n",
        )
        .unwrap();

        let store = ProfileStore::new(tmp.path().join("db"), tmp.path().join("local"));
        let catalog = store.load_catalog().unwrap();

        let names: Vec<_> = catalog
            .all(DeviceClass::Pci)
            .iter()
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(names, vec!["high", "low", "low-too"]);
        assert!(catalog.installed(DeviceClass::Pci).is_empty());
        assert!(catalog.all(DeviceClass::Usb).is_empty());
        let invalid: Vec<_> = catalog.invalid().map(|i| i.name.as_str()).collect();
        assert_eq!(invalid, vec!["bad"]);
    }
}
