//! Idempotent reconciliation of a Linux network namespace.
//!
//! Given a declared [`NamespaceTarget`] (namespace name, interface, address,
//! optional default gateway) this crate observes the live kernel state over
//! rtnetlink, computes the minimal ordered set of changes needed to converge,
//! and applies them one at a time. Running a pass against an already
//! converged host is a no-op, so the pass can be re-run from a boot service
//! or a timer as often as needed.
//!
//! # Features
//!
//! - `serde` - `Serialize` for snapshots, plans and reports
//! - `lab` - in-memory host model ([`reconcile::memory::MemoryHost`])
//!
//! # Example
//!
//! ```ignore
//! use netns_keeper::reconcile::{NetlinkExecutor, NetlinkInspector, run_pass};
//! use netns_keeper::NamespaceTarget;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let target = NamespaceTarget::builder("ha-test", "ha-0-0", "2.2.2.3/24".parse()?)
//!         .gateway("2.2.2.2".parse()?)
//!         .build()?;
//!
//!     let pass = run_pass(&target, &NetlinkInspector::new(), &NetlinkExecutor::new()).await?;
//!     println!("{}", pass.report.summary());
//!     Ok(())
//! }
//! ```

pub mod netlink;
pub mod probe;
pub mod reconcile;
pub mod util;

pub use netlink::{Connection, Error, Result};
pub use reconcile::{ActionPlan, NamespaceSnapshot, NamespaceTarget, ReconcileError};
