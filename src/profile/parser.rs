//! TOML profile files.
//!
//! Every top-level table of a `profiles.toml` is a profile named by its key.
//! Tables nested one level deeper define variants (`[nvidia.open]` becomes
//! `nvidia.open`) that inherit every key of their parent they don't set
//! themselves.
//!
//! ```toml
//! [nvidia]
//! desc = "Closed source NVIDIA drivers"
//! priority = 12
//! freedriver = false
//! class_ids = "0300 0302"
//! vendor_ids = "10de"
//! device_ids = ">nvidia.ids"
//! depends = ["nvidia-utils"]
//! conflicts = "nvidia-legacy-*"
//!
//! [[nvidia.ids]]
//! class_ids = "0403"
//! vendor_ids = "10de"
//! ```

use super::{IdField, InvalidProfile, NamePattern, Profile};
use crate::device::DeviceClass;
use std::path::{Path, PathBuf};
use toml::{Table, Value};

/// Keys that describe a profile rather than carry ids.
const SCALAR_KEYS: &[&str] = &[
    "desc",
    "version",
    "priority",
    "freedriver",
    "device_name_pattern",
    "hwd_product_name_pattern",
    "depends",
    "conflicts",
    "ids",
    "source",
    "installed_at",
];

/// Result of parsing one profile file.
#[derive(Debug, Default)]
pub struct ParsedFile {
    pub profiles: Vec<Profile>,
    pub invalid: Vec<InvalidProfile>,
}

/// Parse a profile file from disk. Never fails: unreadable or malformed files
/// are reported as a single invalid entry named after their directory.
pub fn parse_file(path: &Path, class: DeviceClass) -> ParsedFile {
    match std::fs::read_to_string(path) {
        Ok(content) => parse_str(&content, path, class),
        Err(e) => ParsedFile {
            profiles: Vec::new(),
            invalid: vec![file_invalid(path, format!("cannot read file: {}", e))],
        },
    }
}

/// Parse profile file content. `path` is the file the content came from.
pub fn parse_str(content: &str, path: &Path, class: DeviceClass) -> ParsedFile {
    let mut parsed = ParsedFile::default();

    let root: Table = match content.parse() {
        Ok(table) => table,
        Err(e) => {
            parsed
                .invalid
                .push(file_invalid(path, format!("invalid TOML: {}", e)));
            return parsed;
        }
    };

    for (name, value) in &root {
        let Some(node) = value.as_table() else {
            continue;
        };

        let parent = match parse_profile(node, name, class, path) {
            Ok(profile) => profile,
            Err(reason) => {
                tracing::warn!("invalid profile '{}' in {}: {}", name, path.display(), reason);
                parsed.invalid.push(InvalidProfile {
                    name: name.clone(),
                    path: path.to_path_buf(),
                    reason,
                });
                continue;
            }
        };

        for (child_key, child_value) in node {
            let Some(child_node) = child_value.as_table() else {
                continue;
            };
            let child_name = format!("{}.{}", name, child_key);
            let merged = inherit(child_node, node);
            match parse_profile(&merged, &child_name, class, path) {
                Ok(profile) => parsed.profiles.push(profile),
                Err(reason) => {
                    tracing::warn!(
                        "invalid profile '{}' in {}: {}",
                        child_name,
                        path.display(),
                        reason
                    );
                    parsed.invalid.push(InvalidProfile {
                        name: child_name,
                        path: path.to_path_buf(),
                        reason,
                    });
                }
            }
        }

        parsed.profiles.push(parent);
    }

    parsed
}

fn file_invalid(path: &Path, reason: String) -> InvalidProfile {
    let name = path
        .parent()
        .and_then(Path::file_name)
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    InvalidProfile {
        name,
        path: path.to_path_buf(),
        reason,
    }
}

/// Child keys win; parent keys the child doesn't set are copied over.
/// Sibling variants (nested tables) are not inherited.
fn inherit(child: &Table, parent: &Table) -> Table {
    let mut merged = child.clone();
    for (key, value) in parent {
        if value.is_table() || merged.contains_key(key) {
            continue;
        }
        merged.insert(key.clone(), value.clone());
    }
    merged
}

fn parse_profile(
    node: &Table,
    name: &str,
    class: DeviceClass,
    path: &Path,
) -> Result<Profile, String> {
    if name.is_empty() || name.contains('/') {
        return Err(format!("'{}' is not a usable profile name", name));
    }

    let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
    let mut profile = Profile::new(name, class);

    profile.description = optional_str(node, "desc")?.unwrap_or_default();
    profile.version = optional_str(node, "version")?.unwrap_or_default();
    if let Some(value) = node.get("priority") {
        let raw = value
            .as_integer()
            .ok_or_else(|| "'priority' must be an integer".to_string())?;
        profile.priority =
            i32::try_from(raw).map_err(|_| format!("'priority' {} is out of range", raw))?;
    }
    if let Some(free) = optional_bool(node, "freedriver")? {
        profile.is_freedriver = free;
    }

    apply_id_keys(&mut profile, node, &base_dir)?;

    if let Some(blocks) = node.get("ids") {
        let blocks = blocks
            .as_array()
            .ok_or_else(|| "'ids' must be an array of tables".to_string())?;
        for block in blocks {
            let block = block
                .as_table()
                .ok_or_else(|| "'ids' must be an array of tables".to_string())?;
            profile.start_group();
            apply_id_keys(&mut profile, block, &base_dir)?;
        }
    }

    profile.device_name_pattern = optional_pattern(node, "device_name_pattern")?;
    profile.product_name_pattern = optional_pattern(node, "hwd_product_name_pattern")?;

    if let Some(value) = node.get("depends") {
        profile.dependencies = name_list(value, "depends")?;
    }
    if let Some(value) = node.get("conflicts") {
        profile.conflicts = name_list(value, "conflicts")?;
    }

    profile.base_path = match optional_str(node, "source")? {
        Some(source) => PathBuf::from(source),
        None => base_dir,
    };
    profile.config_path = path.to_path_buf();

    for key in node.keys() {
        let known = SCALAR_KEYS.contains(&key.as_str())
            || IdField::ALL.iter().any(|f| f.key() == key)
            || node.get(key).is_some_and(Value::is_table);
        if !known {
            tracing::debug!("profile '{}': ignoring unknown key '{}'", name, key);
        }
    }

    profile.fill_wildcards();
    Ok(profile)
}

fn apply_id_keys(profile: &mut Profile, node: &Table, base_dir: &Path) -> Result<(), String> {
    for field in IdField::ALL {
        if let Some(value) = node.get(field.key()) {
            let ids = id_list(value, field.key(), base_dir)?;
            profile.add_ids(field, ids);
        }
    }
    Ok(())
}

fn optional_str(node: &Table, key: &str) -> Result<Option<String>, String> {
    match node.get(key) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(format!("'{}' must be a string", key)),
    }
}

fn optional_pattern(node: &Table, key: &str) -> Result<Option<NamePattern>, String> {
    optional_str(node, key)?
        .map(|pattern| {
            NamePattern::new(&pattern)
                .map_err(|e| format!("'{}' is not a valid regular expression: {}", key, e))
        })
        .transpose()
}

fn optional_bool(node: &Table, key: &str) -> Result<Option<bool>, String> {
    match node.get(key) {
        None => Ok(None),
        Some(Value::Boolean(b)) => Ok(Some(*b)),
        Some(_) => Err(format!("'{}' must be a boolean", key)),
    }
}

/// A space-separated string or an array of strings.
fn name_list(value: &Value, key: &str) -> Result<Vec<String>, String> {
    match value {
        Value::String(s) => Ok(s.split_whitespace().map(String::from).collect()),
        Value::Array(items) => {
            let mut out = Vec::new();
            for item in items {
                let s = item
                    .as_str()
                    .ok_or_else(|| format!("'{}' must contain only strings", key))?;
                out.extend(s.split_whitespace().map(String::from));
            }
            Ok(out)
        }
        _ => Err(format!("'{}' must be a string or an array of strings", key)),
    }
}

/// Like `name_list`, but a string starting with `>` names an ids file.
fn id_list(value: &Value, key: &str, base_dir: &Path) -> Result<Vec<String>, String> {
    if let Value::String(s) = value {
        if let Some(file) = s.trim().strip_prefix('>') {
            let file = base_dir.join(file.trim());
            return read_ids_file(&file)
                .map_err(|e| format!("'{}': cannot read ids file {}: {}", key, file.display(), e));
        }
    }
    name_list(value, key)
}

/// Ids file: whitespace-separated ids, blank lines and `#` comments ignored.
fn read_ids_file(path: &Path) -> std::io::Result<Vec<String>> {
    let content = std::fs::read_to_string(path)?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .flat_map(|line| line.split_whitespace().map(String::from))
        .collect())
}
