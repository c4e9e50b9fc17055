//! systemd integration: unit files and `systemctl`.

use std::fmt::Write as _;
use std::io;
use std::path::{Path, PathBuf};

use tokio::process::Command;

use crate::config::Config;

/// The units that keep one namespace configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceUnits {
    namespace: String,
    binary: PathBuf,
    config: PathBuf,
    unit_dir: PathBuf,
    reapply_interval: Option<u64>,
}

impl ServiceUnits {
    pub fn from_config(config: &Config) -> Self {
        Self {
            namespace: config.namespace.clone(),
            binary: config.install_path(),
            config: config.config_path(),
            unit_dir: config.unit_dir(),
            reapply_interval: config.service.reapply_interval_secs.filter(|s| *s > 0),
        }
    }

    pub fn service_name(&self) -> String {
        format!("{}-netns.service", self.namespace)
    }

    pub fn timer_name(&self) -> String {
        format!("{}-netns.timer", self.namespace)
    }

    pub fn service_path(&self) -> PathBuf {
        self.unit_dir.join(self.service_name())
    }

    pub fn timer_path(&self) -> PathBuf {
        self.unit_dir.join(self.timer_name())
    }

    /// The unit to enable: the timer when re-applying periodically.
    pub fn primary_unit(&self) -> String {
        if self.reapply_interval.is_some() {
            self.timer_name()
        } else {
            self.service_name()
        }
    }

    pub fn render_service(&self) -> String {
        let mut unit = String::new();
        let _ = writeln!(unit, "[Unit]");
        let _ = writeln!(unit, "Description=Persistent netns setup for {}", self.namespace);
        let _ = writeln!(unit, "After=network.target");
        let _ = writeln!(unit);
        let _ = writeln!(unit, "[Service]");
        let _ = writeln!(unit, "Type=oneshot");
        let _ = writeln!(
            unit,
            "ExecStart={} --config {} add",
            self.binary.display(),
            self.config.display()
        );
        if self.reapply_interval.is_none() {
            let _ = writeln!(unit, "RemainAfterExit=yes");
        }
        let _ = writeln!(unit);
        let _ = writeln!(unit, "[Install]");
        let _ = writeln!(unit, "WantedBy=multi-user.target");
        unit
    }

    pub fn render_timer(&self) -> Option<String> {
        let interval = self.reapply_interval?;
        let mut unit = String::new();
        let _ = writeln!(unit, "[Unit]");
        let _ = writeln!(unit, "Description=Periodic netns reconciliation for {}", self.namespace);
        let _ = writeln!(unit);
        let _ = writeln!(unit, "[Timer]");
        let _ = writeln!(unit, "OnBootSec=10s");
        let _ = writeln!(unit, "OnUnitActiveSec={}s", interval);
        let _ = writeln!(unit, "Unit={}", self.service_name());
        let _ = writeln!(unit);
        let _ = writeln!(unit, "[Install]");
        let _ = writeln!(unit, "WantedBy=timers.target");
        Some(unit)
    }

    /// Write the unit files, removing a timer that is no longer configured.
    pub fn write(&self) -> io::Result<Vec<PathBuf>> {
        std::fs::create_dir_all(&self.unit_dir)?;

        let mut written = vec![self.service_path()];
        std::fs::write(self.service_path(), self.render_service())?;

        match self.render_timer() {
            Some(timer) => {
                std::fs::write(self.timer_path(), timer)?;
                written.push(self.timer_path());
            }
            None => remove_if_present(&self.timer_path())?,
        }
        Ok(written)
    }

    /// Remove the unit files; returns the ones that existed.
    pub fn remove(&self) -> io::Result<Vec<PathBuf>> {
        let mut removed = Vec::new();
        for path in [self.timer_path(), self.service_path()] {
            if path.exists() {
                std::fs::remove_file(&path)?;
                removed.push(path);
            }
        }
        Ok(removed)
    }
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Captured result of one `systemctl` call.
#[derive(Debug, Clone)]
pub struct SystemctlOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl SystemctlOutput {
    /// First non-empty line of stdout, else of stderr.
    pub fn summary(&self) -> String {
        self.stdout
            .lines()
            .chain(self.stderr.lines())
            .map(str::trim)
            .find(|l| !l.is_empty())
            .unwrap_or("")
            .to_string()
    }
}

/// Run `systemctl <args>`.
pub async fn systemctl(args: &[&str]) -> io::Result<SystemctlOutput> {
    tracing::debug!(?args, "running systemctl");
    let output = Command::new("systemctl").args(args).output().await?;
    Ok(SystemctlOutput {
        success: output.status.success(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Run `systemctl <args>`, failing on a non-zero exit.
pub async fn systemctl_checked(args: &[&str]) -> anyhow::Result<()> {
    let output = systemctl(args).await?;
    if !output.success {
        anyhow::bail!("systemctl {} failed: {}", args.join(" "), output.summary());
    }
    Ok(())
}
