//! Command implementations.

pub mod probe;
pub mod reconcile;
pub mod service;
pub mod status;

use anyhow::{Context as _, bail};

use crate::config::{Config, ConfigSource};
use crate::output::{OutputFormat, OutputOptions, Printable};

/// Everything a command needs from the command line and configuration.
pub struct Context {
    pub config: Config,
    pub source: ConfigSource,
    pub format: OutputFormat,
    pub opts: OutputOptions,
}

impl Context {
    pub fn print<T: Printable>(&self, item: &T) -> anyhow::Result<()> {
        crate::output::print(item, self.format, &self.opts).context("writing output")
    }
}

/// Fail unless running with effective uid 0.
pub fn require_root(command: &str) -> anyhow::Result<()> {
    // SAFETY: geteuid has no preconditions.
    if unsafe { libc::geteuid() } != 0 {
        bail!("'{}' must be run as root, try with sudo", command);
    }
    Ok(())
}
