//! test1 (ping) and test2 (iperf).

use netns_keeper::probe::{ProbeKind, Prober};

use super::Context;

/// Run a probe and print the result. A failed probe is not an error.
pub async fn run(ctx: &Context, kind: ProbeKind) -> anyhow::Result<()> {
    let prober = Prober::new(ctx.config.probe_config());
    let result = prober.probe(&ctx.config.namespace, kind).await;

    if !result.success {
        tracing::warn!(namespace = %ctx.config.namespace, ?kind, detail = %result.detail, "probe failed");
    }
    ctx.print(&result)
}
