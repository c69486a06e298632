use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("sysfs read failed: {path}: {source}")]
    SysfsRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot read profile catalog {path}: {source}")]
    CatalogRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("installed profile store error at {path}: {source}")]
    Persist {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("script {path}: {detail}")]
    Script { path: PathBuf, detail: String },

    #[error("not running as root (required for {operation})")]
    NotRoot { operation: String },

    #[error("profile '{name}' does not exist for {class} devices")]
    ProfileNotFound { name: String, class: String },

    #[error("no matching device for profile '{name}' found")]
    NoMatchingDevice { name: String },

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
