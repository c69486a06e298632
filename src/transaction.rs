use crate::error::Result;
use crate::profile::{ClassProfiles, Profile, find_by_name};
use crate::resolve;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Install,
    Remove,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Install => write!(f, "install"),
            Operation::Remove => write!(f, "remove"),
        }
    }
}

/// Terminal outcome of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Success,
    ErrorConflicts,
    ErrorRequirements,
    ErrorNotInstalled,
    ErrorAlreadyInstalled,
    ErrorNoMatchLocalConfig,
    ErrorScriptFailed,
    ErrorSetDatabase,
}

impl Status {
    pub fn is_success(self) -> bool {
        self == Status::Success
    }
}

/// Progress points reported for every profile a transaction touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Message {
    InstallStart,
    InstallEnd,
    RemoveStart,
    RemoveEnd,
}

/// One install or remove request together with its resolved context.
#[derive(Debug, Clone)]
pub struct Transaction {
    pub profile: Arc<Profile>,
    pub operation: Operation,
    pub allow_reinstall: bool,
    pub dependency_closure: Vec<Arc<Profile>>,
    pub conflicting_profiles: Vec<Arc<Profile>>,
    pub blocking_requirers: Vec<Arc<Profile>>,
}

impl Transaction {
    /// Resolve dependencies, conflicts and requirers of `profile` against the
    /// profiles of its device class.
    pub fn new(
        profile: Arc<Profile>,
        operation: Operation,
        allow_reinstall: bool,
        profiles: &ClassProfiles,
    ) -> Self {
        let dependency_closure =
            resolve::transitive_dependencies(&profile, &profiles.installed, &profiles.all);
        let conflicting_profiles =
            resolve::local_conflicts(&profile, &profiles.installed, &profiles.all);
        let blocking_requirers = resolve::local_requirements(&profile, &profiles.installed);

        tracing::debug!(
            "{} '{}': {} dependencies, {} conflicts, {} requirers",
            operation,
            profile.name,
            dependency_closure.len(),
            conflicting_profiles.len(),
            blocking_requirers.len()
        );

        Self {
            profile,
            operation,
            allow_reinstall,
            dependency_closure,
            conflicting_profiles,
            blocking_requirers,
        }
    }
}

/// Side effects of a transaction.
pub trait TransactionOps {
    /// Run the install script for `profile`. Any error counts as a script failure.
    fn run_script(&mut self, profile: &Profile, operation: Operation) -> Result<()>;
    fn persist_install(&mut self, profile: &Profile) -> Result<()>;
    fn persist_remove(&mut self, profile: &Profile) -> Result<()>;
    fn message(&mut self, message: Message, profile: &Profile);
}

/// Run `tx` to completion. `installed` is the current installed view of the
/// profile's class; it is not updated here, the caller rebuilds it afterwards.
pub fn execute(
    tx: &Transaction,
    installed: &[Arc<Profile>],
    ops: &mut impl TransactionOps,
) -> Status {
    match tx.operation {
        Operation::Install if !tx.conflicting_profiles.is_empty() => {
            return Status::ErrorConflicts;
        }
        Operation::Remove if !tx.blocking_requirers.is_empty() => {
            return Status::ErrorRequirements;
        }
        _ => {}
    }

    let current = find_by_name(installed, &tx.profile.name);

    if tx.operation == Operation::Remove || (current.is_some() && tx.allow_reinstall) {
        let Some(current) = current else {
            return Status::ErrorNotInstalled;
        };
        if current.base_path != tx.profile.base_path {
            tracing::warn!(
                "installed '{}' comes from {}, requested one from {}",
                current.name,
                current.base_path.display(),
                tx.profile.base_path.display()
            );
            return Status::ErrorNoMatchLocalConfig;
        }
        let status = remove_one(current, ops);
        if !status.is_success() {
            return status;
        }
    }

    if tx.operation == Operation::Install {
        if current.is_some() && !tx.allow_reinstall {
            return Status::ErrorAlreadyInstalled;
        }
        for dependency in tx.dependency_closure.iter().rev() {
            let status = install_one(dependency, ops);
            if !status.is_success() {
                tracing::warn!(
                    "dependency '{}' of '{}' failed: {:?}",
                    dependency.name,
                    tx.profile.name,
                    status
                );
                return status;
            }
        }
        return install_one(&tx.profile, ops);
    }

    Status::Success
}

fn install_one(profile: &Profile, ops: &mut impl TransactionOps) -> Status {
    ops.message(Message::InstallStart, profile);
    if let Err(e) = ops.run_script(profile, Operation::Install) {
        tracing::warn!("install script for '{}' failed: {}", profile.name, e);
        return Status::ErrorScriptFailed;
    }
    if let Err(e) = ops.persist_install(profile) {
        tracing::warn!("cannot record '{}' as installed: {}", profile.name, e);
        return Status::ErrorSetDatabase;
    }
    ops.message(Message::InstallEnd, profile);
    Status::Success
}

fn remove_one(profile: &Profile, ops: &mut impl TransactionOps) -> Status {
    ops.message(Message::RemoveStart, profile);
    if let Err(e) = ops.run_script(profile, Operation::Remove) {
        tracing::warn!("remove script for '{}' failed: {}", profile.name, e);
        return Status::ErrorScriptFailed;
    }
    if let Err(e) = ops.persist_remove(profile) {
        tracing::warn!("cannot delete installed record of '{}': {}", profile.name, e);
        return Status::ErrorSetDatabase;
    }
    ops.message(Message::RemoveEnd, profile);
    Status::Success
}
