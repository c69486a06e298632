pub mod cli;
pub mod config;
pub mod detect;
pub mod device;
pub mod engine;
pub mod error;
pub mod glob;
pub mod matching;
pub mod output;
pub mod profile;
pub mod resolve;
pub mod script;
pub mod sysfs;
pub mod transaction;
