//! status: namespace snapshot plus service state.

use std::io::{self, Write};

use anyhow::Context as _;
use netns_keeper::reconcile::{NamespaceSnapshot, NetlinkInspector, StateInspector};
use serde::Serialize;

use super::Context;
use crate::output::Printable;
use crate::service::{ServiceUnits, systemctl};

#[derive(Debug, Serialize)]
struct ServiceState {
    unit: String,
    installed: bool,
    enabled: String,
    active: String,
}

#[derive(Debug, Serialize)]
struct StatusReport {
    snapshot: NamespaceSnapshot,
    service: ServiceState,
}

impl Printable for StatusReport {
    fn print_text<W: Write>(&self, w: &mut W) -> io::Result<()> {
        self.snapshot.print_text(w)?;
        writeln!(
            w,
            "service {}: {}, {}, {}",
            self.service.unit,
            if self.service.installed { "installed" } else { "not installed" },
            self.service.enabled,
            self.service.active
        )
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn run(ctx: &Context) -> anyhow::Result<()> {
    let target = ctx.config.target()?;
    let snapshot = NetlinkInspector::new()
        .inspect(target.namespace(), target.interface())
        .await
        .context("inspecting network state")?;

    let units = ServiceUnits::from_config(&ctx.config);
    let unit = units.primary_unit();
    let service = ServiceState {
        installed: units.service_path().exists(),
        enabled: query(&["is-enabled", &unit]).await,
        active: query(&["is-active", &unit]).await,
        unit,
    };

    ctx.print(&StatusReport { snapshot, service })
}

/// Ask systemctl; failures are reported in the answer, not raised.
async fn query(args: &[&str]) -> String {
    match systemctl(args).await {
        Ok(out) => {
            let answer = out.summary();
            if answer.is_empty() { "unknown".into() } else { answer }
        }
        Err(e) => {
            tracing::warn!(error = %e, "systemctl unavailable");
            "unknown".into()
        }
    }
}
