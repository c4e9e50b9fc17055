//! add, plan and restart.

use anyhow::Context as _;
use netns_keeper::reconcile::{
    NetlinkExecutor, NetlinkInspector, StateInspector, plan, run_pass, teardown,
};

use super::Context;
use crate::service::ServiceUnits;

/// One reconciliation pass. With `force` the namespace is removed first.
pub async fn add(ctx: &Context, force: bool) -> anyhow::Result<()> {
    let target = ctx.config.target()?;

    if force && teardown(target.namespace())? {
        tracing::info!(namespace = target.namespace(), "removed namespace before re-adding");
    }

    let pass = run_pass(&target, &NetlinkInspector::new(), &NetlinkExecutor::new()).await?;
    ctx.print(&pass)?;

    match pass.report.error() {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}

/// Inspect and print the plan without applying it.
pub async fn plan_only(ctx: &Context) -> anyhow::Result<()> {
    let target = ctx.config.target()?;
    let snapshot = NetlinkInspector::new()
        .inspect(target.namespace(), target.interface())
        .await
        .context("inspecting network state")?;

    let plan = plan(&target, &snapshot)?;
    ctx.print(&plan)
}

/// Tear down, reconcile from scratch and rewrite the unit files.
pub async fn restart(ctx: &Context) -> anyhow::Result<()> {
    let target = ctx.config.target()?;
    teardown(target.namespace())?;

    let pass = run_pass(&target, &NetlinkInspector::new(), &NetlinkExecutor::new()).await?;
    ctx.print(&pass)?;
    if let Some(err) = pass.report.error() {
        return Err(err.into());
    }

    let units = ServiceUnits::from_config(&ctx.config);
    units
        .write()
        .with_context(|| format!("writing {}", units.service_path().display()))?;
    super::service::daemon_reload().await
}
