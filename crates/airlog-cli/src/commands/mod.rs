//! Command implementations for the CLI.

mod config;
mod decode;
mod delete;
mod records;
mod simulate;

use std::path::PathBuf;

use airlog_store::ReconciliationStore;
use anyhow::{Context as _, Result};

use crate::config::Config;
use crate::format::FormatOptions;

pub use config::cmd_config;
pub use decode::{DecodeArgs, cmd_decode};
pub use delete::{cmd_delete, cmd_purge, cmd_remove_device};
pub use records::{ListArgs, cmd_devices, cmd_export, cmd_import, cmd_list, cmd_stats};
pub use simulate::{SimulateArgs, cmd_simulate};

/// Settings every command receives.
pub struct Context {
    pub config: Config,
    pub config_path: PathBuf,
    pub store_path: PathBuf,
    pub output: Option<PathBuf>,
    pub opts: FormatOptions,
    pub quiet: bool,
}

impl Context {
    pub fn open_store(&self) -> Result<ReconciliationStore> {
        ReconciliationStore::open(&self.store_path).with_context(|| {
            format!("Failed to open record store at {}", self.store_path.display())
        })
    }

    /// Print a status line unless running quietly.
    pub fn status(&self, message: &str) {
        if !self.quiet {
            println!("{}", message);
        }
    }
}
