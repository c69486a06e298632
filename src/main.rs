use anyhow::Result;
use clap::Parser;
use hwd::cli::{Cli, Command, DriverKind, normalize_names};
use hwd::device::DeviceClass;
use hwd::engine::Engine;
use hwd::error::Error;
use hwd::output::{self, ConsoleSink};
use hwd::profile::Profile;
use hwd::sysfs::SysfsRoot;
use hwd::transaction::{Operation, Status};
use serde::Serialize;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt};

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Some(Command::Completions { shell }) = cli.command {
        hwd::cli::print_completions(shell)?;
        return Ok(());
    }

    let config = hwd::config::load(cli.config.as_ref()).with_package_manager_overrides(
        cli.pmcachedir.clone(),
        cli.pmconfig.clone(),
        cli.pmroot.clone(),
    );
    let mut engine = Engine::load(config, SysfsRoot::system())?;

    let missing = engine.missing_dirs();
    if !missing.is_empty() {
        output::print_error("Following directories do not exist:");
        for dir in &missing {
            output::print_status(&dir.display().to_string());
        }
        anyhow::bail!("hwd is not set up on this system");
    }

    if !cli.json {
        let invalid: Vec<_> = engine.profiles().invalid().collect();
        output::print_invalid(&invalid);
    }

    match cli.command.as_ref().unwrap_or(&Command::List) {
        Command::List => cmd_list(&engine, &cli)?,
        Command::ListInstalled => cmd_list_installed(&engine, &cli)?,
        Command::ListAll => cmd_list_all(&engine, &cli)?,
        Command::ListHardware => cmd_list_hardware(&engine, &cli)?,
        Command::Install { class, names, force } => {
            require_root("install")?;
            let mut session = Session::new(&mut engine, cli.json);
            let result = session.install_all(*class, &normalize_names(names), *force);
            session.finish(result)?;
        }
        Command::Remove { class, names } => {
            require_root("remove")?;
            let mut session = Session::new(&mut engine, cli.json);
            let result = session.remove_all(*class, &normalize_names(names));
            session.finish(result)?;
        }
        Command::Autoconfigure {
            class,
            driver,
            class_id,
            force,
        } => {
            let allow_nonfree = *driver == DriverKind::Nonfree;
            let plan = engine.autoconfigure(*class, class_id, allow_nonfree, *force);
            if cli.json {
                if plan.profiles.is_empty() {
                    output::print_json(&plan)?;
                }
            } else {
                output::print_autoconfigure(&plan, class_id);
            }
            if plan.profiles.is_empty() {
                return Ok(());
            }
            require_root("autoconfigure")?;
            let mut session = Session::new(&mut engine, cli.json);
            let result = session.install_all(*class, &plan.profiles, *force);
            session.finish(result)?;
        }
        Command::Completions { .. } => {}
    }

    Ok(())
}

fn require_root(operation: &str) -> Result<()> {
    if !nix::unistd::geteuid().is_root() {
        return Err(Error::NotRoot {
            operation: operation.to_string(),
        }
        .into());
    }
    Ok(())
}

#[derive(Serialize)]
struct Listing<T: Serialize> {
    class: DeviceClass,
    items: Vec<T>,
}

fn cmd_list(engine: &Engine, cli: &Cli) -> Result<()> {
    if cli.json {
        let listings: Vec<_> = cli
            .classes()
            .into_iter()
            .map(|class| Listing {
                class,
                items: engine
                    .devices()
                    .devices(class)
                    .iter()
                    .filter(|d| !d.available_profiles.is_empty())
                    .collect(),
            })
            .collect();
        output::print_json(&listings)?;
        return Ok(());
    }

    for class in cli.classes() {
        let devices = engine.devices().devices(class);
        if cli.detail {
            output::print_available_in_detail(devices, class);
        } else {
            output::list_available(devices, class);
        }
    }
    Ok(())
}

fn print_profile_listing(
    engine: &Engine,
    cli: &Cli,
    select: fn(&Engine, DeviceClass) -> &[Arc<Profile>],
    title: &str,
) -> Result<()> {
    if cli.json {
        let listings: Vec<_> = cli
            .classes()
            .into_iter()
            .map(|class| Listing {
                class,
                items: select(engine, class).to_vec(),
            })
            .collect();
        output::print_json(&listings)?;
        return Ok(());
    }

    for class in cli.classes() {
        let profiles = select(engine, class);
        if profiles.is_empty() {
            output::print_warning(&format!("No {} {} profiles!", title.to_lowercase(), class));
        } else if cli.detail {
            profiles.iter().for_each(|p| output::print_profile_details(p));
        } else {
            output::list_profiles(profiles, &format!("{} {} profiles", title, class));
        }
    }
    Ok(())
}

fn installed_of(engine: &Engine, class: DeviceClass) -> &[Arc<Profile>] {
    engine.profiles().installed(class)
}

fn all_of(engine: &Engine, class: DeviceClass) -> &[Arc<Profile>] {
    engine.profiles().all(class)
}

fn cmd_list_installed(engine: &Engine, cli: &Cli) -> Result<()> {
    print_profile_listing(engine, cli, installed_of, "Installed")
}

fn cmd_list_all(engine: &Engine, cli: &Cli) -> Result<()> {
    print_profile_listing(engine, cli, all_of, "All")
}

fn cmd_list_hardware(engine: &Engine, cli: &Cli) -> Result<()> {
    if cli.json {
        let listings: Vec<_> = cli
            .classes()
            .into_iter()
            .map(|class| Listing {
                class,
                items: engine.devices().devices(class).iter().collect(),
            })
            .collect();
        output::print_json(&listings)?;
        return Ok(());
    }

    for class in cli.classes() {
        let devices = engine.devices().devices(class);
        if cli.detail {
            output::print_available_in_detail(devices, class);
        } else {
            output::list_devices(devices, class);
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct Outcome {
    profile: String,
    operation: Operation,
    status: Status,
}

/// Runs a sequence of transactions, stopping at the first failure.
struct Session<'a> {
    engine: &'a mut Engine,
    json: bool,
    sink: ConsoleSink,
    outcomes: Vec<Outcome>,
}

impl<'a> Session<'a> {
    fn new(engine: &'a mut Engine, json: bool) -> Self {
        Self {
            engine,
            json,
            sink: ConsoleSink { json },
            outcomes: Vec::new(),
        }
    }

    fn install_all(&mut self, class: DeviceClass, names: &[String], force: bool) -> Result<()> {
        for name in names {
            let profile = self.engine.install_candidate(name, class)?;
            self.run(profile, Operation::Install, force)?;
        }
        Ok(())
    }

    fn remove_all(&mut self, class: DeviceClass, names: &[String]) -> Result<()> {
        for name in names {
            let Some(profile) = self.engine.installed_profile(name, class) else {
                anyhow::bail!("profile '{}' is not installed!", name);
            };
            self.run(profile, Operation::Remove, false)?;
        }
        Ok(())
    }

    fn run(&mut self, profile: Arc<Profile>, operation: Operation, force: bool) -> Result<()> {
        let tx = self.engine.transaction(profile, operation, force);
        let status = self.engine.run(&tx, &mut self.sink)?;
        self.outcomes.push(Outcome {
            profile: tx.profile.name.clone(),
            operation,
            status,
        });
        if !status.is_success() {
            if !self.json {
                output::print_transaction_failure(status, &tx);
            }
            anyhow::bail!("{} of '{}' failed: {:?}", operation, tx.profile.name, status);
        }
        Ok(())
    }

    /// Emit the JSON report, if requested, then pass `result` through.
    fn finish(self, result: Result<()>) -> Result<()> {
        if self.json {
            output::print_json(&self.outcomes)?;
        }
        result
    }
}
