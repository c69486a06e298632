use crate::device::{Device, DeviceClass};
use crate::engine::{AutoconfigurePlan, Choice, StatusSink};
use crate::error::{Error, Result};
use crate::profile::{IdField, InvalidProfile, Profile};
use crate::transaction::{Message, Status, Transaction};
use colored::Colorize;
use serde::Serialize;
use std::sync::Arc;

const LABEL_W: usize = 12;
const DIVIDER_W: usize = 64;

pub fn print_status(msg: &str) {
    println!("{} {}", ">".green().bold(), msg);
}

pub fn print_warning(msg: &str) {
    println!("{} {}", "Warning:".yellow().bold(), msg);
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", "Error:".red().bold(), msg);
}

fn print_header(title: &str) {
    let fill = DIVIDER_W.saturating_sub(4 + title.chars().count());
    println!("── {} {}", title.bold(), "─".repeat(fill));
}

fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

pub fn print_invalid(invalid: &[&InvalidProfile]) {
    for entry in invalid {
        print_warning(&format!(
            "profile '{}' is invalid ({}): {}",
            entry.name,
            entry.path.display(),
            entry.reason
        ));
    }
}

/// Table of profile names with their free/nonfree flag and class.
pub fn list_profiles(profiles: &[Arc<Profile>], header: &str) {
    print_header(header);
    println!(
        "  {:<32}{:>10}{:>8}{:>10}",
        "NAME".dimmed(),
        "NONFREE".dimmed(),
        "TYPE".dimmed(),
        "PRIORITY".dimmed()
    );
    for profile in profiles {
        let nonfree = if profile.is_freedriver {
            yes_no(false).normal()
        } else {
            yes_no(true).yellow()
        };
        println!(
            "  {:<32}{:>10}{:>8}{:>10}",
            profile.name,
            nonfree,
            profile.device_class.to_string(),
            profile.priority
        );
    }
    println!();
}

pub fn list_devices(devices: &[Device], class: DeviceClass) {
    if devices.is_empty() {
        print_warning(&format!("No {} devices found!", class));
        return;
    }
    print_header(&format!("{} devices", class));
    println!(
        "  {:<30}{:>16}{:>7}{:>8}{:>8}{:>10}",
        "TYPE".dimmed(),
        "BUS".dimmed(),
        "CLASS".dimmed(),
        "VENDOR".dimmed(),
        "DEVICE".dimmed(),
        "PROFILES".dimmed()
    );
    for device in devices {
        let class_name: String = device.class_name.chars().take(28).collect();
        println!(
            "  {:<30}{:>16}{:>7}{:>8}{:>8}{:>10}",
            class_name,
            device.sysfs_bus_id,
            device.class_id,
            device.vendor_id,
            device.device_id,
            device.available_profiles.len()
        );
    }
    println!();
}

/// Compact listing: one profile table per device offering something.
pub fn list_available(devices: &[Device], class: DeviceClass) {
    let mut any = false;
    for device in devices.iter().filter(|d| !d.available_profiles.is_empty()) {
        any = true;
        list_profiles(
            &device.available_profiles,
            &format!("{} {} {}", device.label(), device.class_name, device.vendor_name),
        );
    }
    if !any {
        print_warning(&format!("No profiles for {} devices found!", class));
    }
}

/// Ids of one field across all groups, groups separated by `|`.
fn joined_ids(profile: &Profile, field: IdField) -> String {
    profile
        .hwd_id_groups
        .iter()
        .map(|g| g.field(field).join(" "))
        .collect::<Vec<_>>()
        .join(" | ")
}

pub fn print_profile_details(profile: &Profile) {
    let mut rows: Vec<(&str, String)> = vec![
        ("Name", profile.name.clone()),
        (
            "Description",
            if profile.description.is_empty() {
                "-".to_string()
            } else {
                profile.description.clone()
            },
        ),
        ("Version", profile.version.clone()),
        ("Priority", profile.priority.to_string()),
        ("Free driver", yes_no(profile.is_freedriver).to_string()),
        ("Class ids", joined_ids(profile, IdField::Class)),
        ("Vendor ids", joined_ids(profile, IdField::Vendor)),
        ("Depends", profile.dependencies.join(" ")),
        ("Conflicts", profile.conflicts.join(" ")),
        ("Path", profile.config_path.display().to_string()),
    ];
    if let Some(pattern) = &profile.device_name_pattern {
        rows.push(("Device name", pattern.as_str().to_string()));
    }
    if let Some(pattern) = &profile.product_name_pattern {
        rows.push(("Product", pattern.as_str().to_string()));
    }

    let inner_w = rows
        .iter()
        .map(|(l, v)| l.len().max(LABEL_W) + 2 + v.chars().count())
        .max()
        .unwrap_or(40);

    let title = &profile.name;
    let fill = inner_w.saturating_sub(1 + title.chars().count());
    println!("╭─ {} {}╮", title.bold(), "─".repeat(fill));
    for (label, value) in &rows {
        let padded = format!("{:<w$}", label, w = LABEL_W);
        let pad = inner_w.saturating_sub(LABEL_W + 2 + value.chars().count());
        println!("│ {}  {}{} │", padded.dimmed(), value, " ".repeat(pad));
    }
    println!("╰{}╯", "─".repeat(inner_w + 2));
}

/// Detailed listing: every device with its installed and available profiles.
pub fn print_available_in_detail(devices: &[Device], class: DeviceClass) {
    let mut any = false;
    for device in devices {
        if device.available_profiles.is_empty() && device.installed_profiles.is_empty() {
            continue;
        }
        any = true;
        print_status(&format!(
            "{} device: {} ({}:{}:{})",
            class, device.sysfs_id, device.class_id, device.vendor_id, device.device_id
        ));
        println!(
            "  {} {} {}",
            device.class_name, device.vendor_name, device.device_name
        );
        println!();
        if !device.installed_profiles.is_empty() {
            println!("  {}", "Installed:".green());
            for profile in &device.installed_profiles {
                print_profile_details(profile);
            }
            println!();
        }
        if !device.available_profiles.is_empty() {
            println!("  {}", "Available:".cyan());
            for profile in &device.available_profiles {
                print_profile_details(profile);
            }
            println!();
        }
    }
    if !any {
        print_warning(&format!("No profiles for {} devices found!", class));
    }
}

pub fn print_message(message: Message, name: &str) {
    match message {
        Message::InstallStart => print_status(&format!("Installing {} ...", name)),
        Message::InstallEnd => print_status(&format!("Successfully installed {}", name)),
        Message::RemoveStart => print_status(&format!("Removing {} ...", name)),
        Message::RemoveEnd => print_status(&format!("Successfully removed {}", name)),
    }
}

fn names(profiles: &[Arc<Profile>]) -> String {
    profiles
        .iter()
        .map(|p| p.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// User-facing explanation of a failed transaction. Nothing is printed for
/// `Success`.
pub fn print_transaction_failure(status: Status, tx: &Transaction) {
    let name = &tx.profile.name;
    match status {
        Status::Success => {}
        Status::ErrorConflicts => print_error(&format!(
            "profile '{}' conflicts with installed profile(s): {}",
            name,
            names(&tx.conflicting_profiles)
        )),
        Status::ErrorRequirements => print_error(&format!(
            "profile '{}' is required by installed profile(s): {}",
            name,
            names(&tx.blocking_requirers)
        )),
        Status::ErrorNotInstalled => {
            print_error(&format!("profile '{}' is not installed!", name))
        }
        Status::ErrorAlreadyInstalled => print_warning(&format!(
            "a version of profile '{}' is already installed!\nUse --force to force installation...",
            name
        )),
        Status::ErrorNoMatchLocalConfig => {
            print_error("passed profile does not match with installed profile!")
        }
        Status::ErrorScriptFailed => print_error("script failed!"),
        Status::ErrorSetDatabase => print_error("failed to set database!"),
    }
}

pub fn print_autoconfigure(plan: &AutoconfigurePlan, class_id: &str) {
    for entry in &plan.devices {
        match &entry.choice {
            Choice::Use(name) => print_status(&format!(
                "Using profile '{}' for device: {}",
                name.cyan(),
                entry.device
            )),
            Choice::AlreadyInstalled(name) => print_status(&format!(
                "Skipping already installed profile '{}' for device: {}",
                name, entry.device
            )),
            Choice::NoProfile => {
                print_warning(&format!("No profile found for device: {}", entry.device))
            }
        }
    }
    if !plan.found_device {
        print_warning(&format!("No device of class '{}' found!", class_id));
    }
}

/// Pretty-printed JSON document on stdout.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| Error::Other(format!("cannot serialize output: {}", e)))?;
    println!("{}", text);
    Ok(())
}

/// Progress printer for transactions. In JSON mode everything goes to stderr
/// so stdout stays a single document.
pub struct ConsoleSink {
    pub json: bool,
}

impl StatusSink for ConsoleSink {
    fn message(&mut self, message: Message, profile: &Profile) {
        if self.json {
            eprintln!("{:?} {}", message, profile.name);
        } else {
            print_message(message, &profile.name);
        }
    }

    fn script_line(&mut self, line: &str) {
        if self.json {
            eprintln!("{}", line);
        } else {
            println!("  {}", line.dimmed());
        }
    }
}
