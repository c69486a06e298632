use crate::glob;
use crate::profile::{Profile, find_by_name};
use std::collections::HashSet;
use std::sync::Arc;

/// Profiles `profile` needs that are not installed yet, in pre-order DFS
/// discovery order. Names missing from `catalog` are dropped.
///
/// Cyclic dependencies are not rejected: a name already collected is never
/// expanded twice, which is what stops the walk.
pub fn transitive_dependencies(
    profile: &Profile,
    installed: &[Arc<Profile>],
    catalog: &[Arc<Profile>],
) -> Vec<Arc<Profile>> {
    let mut closure = Vec::new();
    let mut visited = HashSet::new();
    collect_dependencies(profile, installed, catalog, &mut visited, &mut closure);
    closure
}

fn collect_dependencies(
    profile: &Profile,
    installed: &[Arc<Profile>],
    catalog: &[Arc<Profile>],
    visited: &mut HashSet<String>,
    closure: &mut Vec<Arc<Profile>>,
) {
    for name in &profile.dependencies {
        if find_by_name(installed, name).is_some() || visited.contains(name) {
            continue;
        }
        let Some(dependency) = find_by_name(catalog, name) else {
            tracing::debug!(
                "dependency '{}' of '{}' not found in catalog, skipping",
                name,
                profile.name
            );
            continue;
        };
        visited.insert(name.clone());
        closure.push(Arc::clone(dependency));
        collect_dependencies(dependency, installed, catalog, visited, closure);
    }
}

/// Installed profiles that `profile` or anything in its dependency closure
/// declares a conflict with. Each conflicting installed profile is reported once.
pub fn local_conflicts(
    profile: &Profile,
    installed: &[Arc<Profile>],
    catalog: &[Arc<Profile>],
) -> Vec<Arc<Profile>> {
    let closure = transitive_dependencies(profile, installed, catalog);
    let candidates = closure.iter().map(|p| p.as_ref()).chain(std::iter::once(profile));

    let mut conflicts: Vec<Arc<Profile>> = Vec::new();
    for candidate in candidates {
        for pattern in &candidate.conflicts {
            let hit = installed
                .iter()
                .filter(|p| p.name != profile.name)
                .find(|p| glob::matches(pattern, &p.name));
            if let Some(hit) = hit {
                if !conflicts.iter().any(|c| c.name == hit.name) {
                    tracing::debug!(
                        "'{}' conflicts with installed '{}' via '{}'",
                        candidate.name,
                        hit.name,
                        pattern
                    );
                    conflicts.push(Arc::clone(hit));
                }
            }
        }
    }
    conflicts
}

/// Installed profiles listing `profile` as a dependency (exact name).
pub fn local_requirements(profile: &Profile, installed: &[Arc<Profile>]) -> Vec<Arc<Profile>> {
    let mut requirers: Vec<Arc<Profile>> = Vec::new();
    for candidate in installed {
        if !candidate.dependencies.iter().any(|d| *d == profile.name) {
            continue;
        }
        if !requirers.iter().any(|r| r.name == candidate.name) {
            requirers.push(Arc::clone(candidate));
        }
    }
    requirers
}
