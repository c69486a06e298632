use crate::device::DeviceClass;
use crate::error::{Error, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "hwd",
    about = "Hardware detection and driver profile management for Linux",
    version
)]
pub struct Cli {
    /// Defaults to `list` when omitted
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Output as JSON instead of formatted tables
    #[arg(long, global = true)]
    pub json: bool,

    /// Use this config file instead of the system and user ones
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only show PCI devices and profiles
    #[arg(long, global = true)]
    pub pci: bool,

    /// Only show USB devices and profiles
    #[arg(long, global = true)]
    pub usb: bool,

    /// Show detailed profile information
    #[arg(short, long, global = true)]
    pub detail: bool,

    /// Package manager cache directory
    #[arg(long, global = true, value_name = "DIR")]
    pub pmcachedir: Option<PathBuf>,

    /// Package manager config file
    #[arg(long, global = true, value_name = "PATH")]
    pub pmconfig: Option<PathBuf>,

    /// Package manager root
    #[arg(long, global = true, value_name = "DIR")]
    pub pmroot: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// List profiles available for the detected devices
    List,

    /// List installed profiles
    ListInstalled,

    /// List every profile in the database
    ListAll,

    /// List detected devices
    ListHardware,

    /// Install profiles by name
    Install {
        class: DeviceClass,
        #[arg(required = true)]
        names: Vec<String>,
        /// Reinstall profiles that are already installed
        #[arg(short, long)]
        force: bool,
    },

    /// Remove installed profiles by name
    Remove {
        class: DeviceClass,
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// Pick and install the best profile for every device of a class id
    Autoconfigure {
        class: DeviceClass,
        driver: DriverKind,
        /// Two-digit base class followed by two-digit subclass, e.g. 0300
        class_id: String,
        /// Reinstall profiles that are already installed
        #[arg(short, long)]
        force: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for (auto-detected if omitted)
        shell: Option<Shell>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DriverKind {
    Free,
    Nonfree,
}

impl Cli {
    /// Device classes selected by `--pci` / `--usb`; both when neither is given.
    pub fn classes(&self) -> Vec<DeviceClass> {
        match (self.pci, self.usb) {
            (true, false) => vec![DeviceClass::Pci],
            (false, true) => vec![DeviceClass::Usb],
            _ => DeviceClass::ALL.to_vec(),
        }
    }
}

/// Lower-case profile names and drop repeats, keeping first-seen order.
pub fn normalize_names(names: &[String]) -> Vec<String> {
    let mut normalized: Vec<String> = Vec::new();
    for name in names {
        let name = name.to_lowercase();
        if !normalized.contains(&name) {
            normalized.push(name);
        }
    }
    normalized
}

/// Print shell completions to stdout.
pub fn print_completions(shell: Option<Shell>) -> Result<()> {
    let shell = shell.or_else(Shell::from_env).ok_or_else(|| {
        Error::Other(
            "could not detect shell, specify one: hwd completions bash|zsh|fish|elvish|powershell"
                .to_string(),
        )
    })?;
    clap_complete::generate(shell, &mut Cli::command(), "hwd", &mut std::io::stdout());
    Ok(())
}
