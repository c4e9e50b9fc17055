//! Idempotent reconciliation of one namespace against a declared target.
//!
//! A pass runs in three steps:
//!
//! 1. **Inspect** - a [`StateInspector`] reads the live state into an
//!    immutable [`NamespaceSnapshot`].
//! 2. **Plan** - [`plan()`] compares target and snapshot and returns an
//!    [`ActionPlan`]. Every action carries the [`Predicate`] under which it
//!    is already done; a converged snapshot plans to nothing.
//! 3. **Apply** - [`apply()`] walks the plan through an [`ActionExecutor`],
//!    re-inspecting and re-checking each predicate first, and stops at the
//!    first failure.
//!
//! No state is cached between passes. A pass that stopped half-way is
//! finished by the next one.
//!
//! # Example
//!
//! ```ignore
//! use netns_keeper::reconcile::{NetlinkExecutor, NetlinkInspector, NamespaceTarget, run_pass};
//!
//! let target = NamespaceTarget::builder("ns1", "eth1", "10.0.0.2/24".parse()?)
//!     .gateway("10.0.0.1".parse()?)
//!     .bring_up(true)
//!     .build()?;
//!
//! let pass = run_pass(&target, &NetlinkInspector::new(), &NetlinkExecutor::new()).await?;
//! if let Some(err) = pass.report.error() {
//!     return Err(err.into());
//! }
//! ```

mod apply;
mod execute;
mod inspect;
mod plan;
mod snapshot;
mod target;

#[cfg(any(test, feature = "lab"))]
pub mod memory;

pub use apply::{ActionResult, ApplyReport, Outcome, PassReport, apply, run_pass};
pub use execute::{ActionExecutor, NetlinkExecutor};
pub use inspect::{NetlinkInspector, StateInspector};
pub use plan::{Action, ActionKind, ActionPlan, PlannedAction, Predicate, plan};
pub use snapshot::{DefaultRoute, InterfaceLocation, NamespaceSnapshot, ObservedInterface};
pub use target::{AddressPolicy, NamespaceTarget, NamespaceTargetBuilder};

use crate::netlink::{self, namespace};

/// Why a pass could not converge.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// Kernel state could not be read at all.
    #[error("cannot observe network state: {0}")]
    Observation(#[source] netlink::Error),

    /// The interface is not on this host.
    #[error("interface {interface} not found: {detail}")]
    ResourceMissing { interface: String, detail: String },

    /// The namespace already holds a different device under the same name.
    #[error("interface {interface} conflicts with an existing device in netns {namespace}: {detail}")]
    NamingConflict {
        interface: String,
        namespace: String,
        detail: String,
    },

    /// A kernel mutation was rejected; later actions were not attempted.
    #[error(
        "{action} failed: {message} ({applied} applied before it, {not_attempted} not attempted)"
    )]
    ActionFailed {
        action: String,
        message: String,
        applied: usize,
        not_attempted: usize,
    },

    /// The target itself is unusable.
    #[error("invalid target: {0}")]
    InvalidTarget(String),
}

/// Remove a namespace and everything configured inside it.
///
/// Returns `Ok(false)` if there was nothing to remove. Physical interfaces
/// inside fall back to the host namespace; their addresses and routes go.
pub fn teardown(ns: &str) -> netlink::Result<bool> {
    if !namespace::exists(ns) {
        tracing::debug!(namespace = ns, "nothing to tear down");
        return Ok(false);
    }
    namespace::delete(ns)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ReconcileError::ResourceMissing {
            interface: "eth1".into(),
            detail: "no such device on this host".into(),
        };
        assert_eq!(
            err.to_string(),
            "interface eth1 not found: no such device on this host"
        );
    }

    #[test]
    fn test_teardown_absent() {
        assert!(!teardown("definitely-not-a-namespace-7f3a").unwrap());
    }
}
