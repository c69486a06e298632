use crate::device::Device;
use crate::glob::any_matches;
use crate::profile::{HardwareIdGroup, NamePattern, Profile};
use std::sync::Arc;

fn id_matches(patterns: &[String], blacklist: &[String], id: &str) -> bool {
    any_matches(patterns, id) && !any_matches(blacklist, id)
}

/// Class, vendor and device id must all be accepted by the group. With a
/// `device_name_pattern` the device name is searched instead of the device id
/// list; blacklisted device ids still apply.
pub fn group_matches_device(
    group: &HardwareIdGroup,
    device: &Device,
    device_name_pattern: Option<&NamePattern>,
) -> bool {
    let device_accepted = match device_name_pattern {
        Some(pattern) => pattern.is_match(&device.device_name),
        None => any_matches(&group.device_ids, &device.device_id),
    };
    id_matches(&group.class_ids, &group.blacklisted_class_ids, &device.class_id)
        && id_matches(&group.vendor_ids, &group.blacklisted_vendor_ids, &device.vendor_id)
        && device_accepted
        && !any_matches(&group.blacklisted_device_ids, &device.device_id)
}

/// Whether the machine passes the profile's product-name gate. A gated
/// profile never applies when the product name is unknown.
pub fn fits_product(profile: &Profile, product_name: Option<&str>) -> bool {
    match (&profile.product_name_pattern, product_name) {
        (None, _) => true,
        (Some(pattern), Some(name)) => pattern.is_match(name),
        (Some(_), None) => false,
    }
}

/// Indices into `devices` the profile applies to, in pool order.
///
/// Every group must match at least one device, otherwise the profile does not
/// apply at all and the result is empty. When it applies, the result is the
/// union of the devices matched by any group.
pub fn devices_for_profile(profile: &Profile, devices: &[Device]) -> Vec<usize> {
    let mut matched = vec![false; devices.len()];
    let name_pattern = profile.device_name_pattern.as_ref();

    for group in &profile.hwd_id_groups {
        let mut group_hit = false;
        for (index, device) in devices.iter().enumerate() {
            if group_matches_device(group, device, name_pattern) {
                matched[index] = true;
                group_hit = true;
            }
        }
        if !group_hit {
            return Vec::new();
        }
    }

    matched
        .iter()
        .enumerate()
        .filter_map(|(index, hit)| hit.then_some(index))
        .collect()
}

/// Insert keeping descending priority; equal priorities keep insertion order.
/// A profile whose name is already listed is not added again.
pub fn insert_by_priority(list: &mut Vec<Arc<Profile>>, profile: &Arc<Profile>) {
    if list.iter().any(|p| p.name == profile.name) {
        return;
    }
    match list.iter().position(|p| p.priority < profile.priority) {
        Some(index) => list.insert(index, Arc::clone(profile)),
        None => list.push(Arc::clone(profile)),
    }
}

/// Attach each profile to every device it applies to, as available or
/// installed. Profiles gated on another product are skipped.
pub fn attach_profiles(
    devices: &mut [Device],
    profiles: &[Arc<Profile>],
    as_installed: bool,
    product_name: Option<&str>,
) {
    for profile in profiles {
        if !fits_product(profile, product_name) {
            tracing::debug!("profile '{}' is not for this product", profile.name);
            continue;
        }
        let found = devices_for_profile(profile, devices);
        if !found.is_empty() {
            tracing::debug!(
                "profile '{}' matches {} device(s){}",
                profile.name,
                found.len(),
                if as_installed { " (installed)" } else { "" }
            );
        }
        for index in found {
            let device = &mut devices[index];
            let target = if as_installed {
                &mut device.installed_profiles
            } else {
                &mut device.available_profiles
            };
            insert_by_priority(target, profile);
        }
    }
}
