//! install, update, reload and delete.

use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use anyhow::Context as _;
use netns_keeper::reconcile::teardown;

use super::Context;
use crate::config::ConfigSource;
use crate::output::Steps;
use crate::service::{ServiceUnits, systemctl, systemctl_checked};

pub async fn daemon_reload() -> anyhow::Result<()> {
    systemctl_checked(&["daemon-reload"]).await
}

/// Write config, binary and units, then enable the service.
pub async fn install(ctx: &Context) -> anyhow::Result<()> {
    // Refuse to install something the service could not apply.
    ctx.config.target()?;

    let mut steps = Steps::default();

    let config_path = ctx.config.config_path();
    if ctx.source == ConfigSource::File(config_path.clone()) {
        steps.done(format!("using configuration {}", config_path.display()));
    } else {
        ctx.config.write_to(&config_path)?;
        steps.done(format!("wrote configuration {}", config_path.display()));
    }

    let dest = ctx.config.install_path();
    let exe = std::env::current_exe().context("locating the running binary")?;
    if same_file(&exe, &dest) {
        steps.done(format!("binary already at {}", dest.display()));
    } else {
        install_binary(&exe, &dest)?;
        steps.done(format!("installed {}", dest.display()));
    }

    let units = write_units(&mut steps, &ctx.config)?;
    daemon_reload().await?;
    steps.done("reloaded systemd");

    let unit = units.primary_unit();
    systemctl_checked(&["enable", &unit]).await?;
    steps.done(format!("enabled {}", unit));

    ctx.print(&steps)
}

/// Rewrite the units and reload systemd. The namespace is left alone.
pub async fn update(ctx: &Context) -> anyhow::Result<()> {
    let mut steps = Steps::default();
    write_units(&mut steps, &ctx.config)?;
    daemon_reload().await?;
    steps.done("reloaded systemd");
    ctx.print(&steps)
}

/// Rewrite the units, then restart the service so it re-applies.
pub async fn reload(ctx: &Context) -> anyhow::Result<()> {
    let mut steps = Steps::default();
    let units = write_units(&mut steps, &ctx.config)?;
    daemon_reload().await?;
    steps.done("reloaded systemd");

    let service = units.service_name();
    systemctl_checked(&["restart", &service]).await?;
    steps.done(format!("restarted {}", service));
    ctx.print(&steps)
}

/// Remove the namespace and everything installed for it.
pub async fn delete(ctx: &Context) -> anyhow::Result<()> {
    let mut steps = Steps::default();
    let ns = &ctx.config.namespace;

    if teardown(ns)? {
        steps.done(format!("deleted netns {}", ns));
    } else {
        steps.done(format!("netns {} not found, skipping", ns));
    }

    let units = ServiceUnits::from_config(&ctx.config);
    for unit in [units.timer_name(), units.service_name()] {
        match systemctl(&["disable", &unit]).await {
            Ok(out) if out.success => steps.done(format!("disabled {}", unit)),
            Ok(out) => steps.warn(format!("disable {}: {}", unit, out.summary())),
            Err(e) => steps.warn(format!("disable {}: {}", unit, e)),
        }
    }

    let removed = units.remove().context("removing unit files")?;
    if removed.is_empty() {
        steps.done(format!("{} not found, skipping", units.service_path().display()));
    } else {
        for path in &removed {
            steps.done(format!("removed {}", path.display()));
        }
        daemon_reload().await?;
        steps.done("reloaded systemd");
    }

    ctx.print(&steps)
}

fn write_units(steps: &mut Steps, config: &crate::config::Config) -> anyhow::Result<ServiceUnits> {
    let units = ServiceUnits::from_config(config);
    let written = units
        .write()
        .with_context(|| format!("writing units to {}", config.unit_dir().display()))?;
    for path in written {
        steps.done(format!("wrote {}", path.display()));
    }
    Ok(units)
}

fn install_binary(from: &Path, to: &Path) -> anyhow::Result<()> {
    if let Some(parent) = to.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    std::fs::copy(from, to)
        .with_context(|| format!("copying {} to {}", from.display(), to.display()))?;
    std::fs::set_permissions(to, std::fs::Permissions::from_mode(0o755))
        .with_context(|| format!("setting permissions on {}", to.display()))?;
    Ok(())
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
