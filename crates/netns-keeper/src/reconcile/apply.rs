//! Executing a plan and reporting what happened.

use super::execute::ActionExecutor;
use super::inspect::StateInspector;
use super::plan::{Action, ActionPlan};
use super::snapshot::NamespaceSnapshot;
use super::target::NamespaceTarget;
use super::{ReconcileError, plan};

/// What happened to one planned action.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(tag = "status", content = "error", rename_all = "kebab-case"))]
pub enum Outcome {
    /// The kernel accepted the change.
    Applied,
    /// Its predicate held by the time it came up.
    Skipped,
    /// The change (or the re-check before it) failed; the pass stopped here.
    Failed(String),
    /// Never reached because an earlier action failed.
    NotAttempted,
}

impl Outcome {
    /// Whether the action was tried at all.
    pub fn attempted(&self) -> bool {
        !matches!(self, Outcome::NotAttempted)
    }
}

/// Outcome of one action.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ActionResult {
    pub action: Action,
    pub outcome: Outcome,
}

/// Per-action outcomes of a plan, in plan order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ApplyReport {
    pub results: Vec<ActionResult>,
}

impl ApplyReport {
    /// Check if every action was applied or skipped.
    pub fn is_success(&self) -> bool {
        self.results
            .iter()
            .all(|r| matches!(r.outcome, Outcome::Applied | Outcome::Skipped))
    }

    /// Number of actions the kernel accepted.
    pub fn applied(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Applied))
    }

    /// Number of actions found already done at execution time.
    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Skipped))
    }

    /// Number of actions tried, including the failing one.
    pub fn attempted(&self) -> usize {
        self.count(Outcome::attempted)
    }

    fn count(&self, f: impl Fn(&Outcome) -> bool) -> usize {
        self.results.iter().filter(|r| f(&r.outcome)).count()
    }

    /// The failing action, if any.
    pub fn failure(&self) -> Option<&ActionResult> {
        self.results
            .iter()
            .find(|r| matches!(r.outcome, Outcome::Failed(_)))
    }

    /// Turn a failed report into the matching error.
    pub fn error(&self) -> Option<ReconcileError> {
        self.failure().map(|r| ReconcileError::ActionFailed {
            action: r.action.to_string(),
            message: match &r.outcome {
                Outcome::Failed(msg) => msg.clone(),
                _ => String::new(),
            },
            applied: self.applied(),
            not_attempted: self.results.len() - self.attempted(),
        })
    }

    /// Get a human-readable summary.
    pub fn summary(&self) -> String {
        if self.results.is_empty() {
            return "No changes made".to_string();
        }

        self.results
            .iter()
            .map(|r| {
                let status = match &r.outcome {
                    Outcome::Applied => "applied".to_string(),
                    Outcome::Skipped => "skipped (already done)".to_string(),
                    Outcome::Failed(e) => format!("FAILED: {}", e),
                    Outcome::NotAttempted => "not attempted".to_string(),
                };
                format!("{}  [{}]", r.action, status)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Execute a plan in order, stopping at the first failure.
///
/// State is re-inspected before every action and the action is skipped if
/// its predicate already holds. A failed re-inspection counts as a failure
/// of the action it was guarding. Completed actions are never rolled back.
pub async fn apply<I, E>(
    plan: &ActionPlan,
    target: &NamespaceTarget,
    inspector: &I,
    executor: &E,
) -> ApplyReport
where
    I: StateInspector,
    E: ActionExecutor,
{
    let mut report = ApplyReport {
        results: Vec::with_capacity(plan.len()),
    };
    let mut failed = false;

    for planned in plan {
        let action = planned.action.clone();

        if failed {
            report.results.push(ActionResult {
                action,
                outcome: Outcome::NotAttempted,
            });
            continue;
        }

        let outcome = match inspector
            .inspect(target.namespace(), target.interface())
            .await
        {
            Err(e) => Outcome::Failed(format!("re-inspection failed: {}", e)),
            Ok(snapshot) if planned.predicate.holds(&snapshot) => {
                tracing::debug!(%action, "skipping, already satisfied");
                Outcome::Skipped
            }
            Ok(_) => match executor.execute(&action).await {
                Ok(()) => {
                    tracing::info!(%action, "applied");
                    Outcome::Applied
                }
                Err(e) => Outcome::Failed(e.to_string()),
            },
        };

        if let Outcome::Failed(e) = &outcome {
            tracing::warn!(%action, error = %e, "action failed, stopping");
            failed = true;
        }

        report.results.push(ActionResult { action, outcome });
    }

    report
}

/// Everything one reconciliation pass saw and did.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PassReport {
    /// State observed at the start of the pass.
    pub snapshot: NamespaceSnapshot,
    pub plan: ActionPlan,
    pub report: ApplyReport,
}

impl PassReport {
    /// Check if the pass left the namespace in the declared state.
    pub fn is_converged(&self) -> bool {
        self.report.is_success()
    }

    /// Check if the pass had nothing to do.
    pub fn was_noop(&self) -> bool {
        self.plan.is_empty()
    }
}

/// Inspect, plan and apply once.
///
/// This is the re-entrant entry point a boot service or timer calls. An
/// `Err` means the pass never reached execution; execution failures are in
/// the returned report.
pub async fn run_pass<I, E>(
    target: &NamespaceTarget,
    inspector: &I,
    executor: &E,
) -> Result<PassReport, ReconcileError>
where
    I: StateInspector,
    E: ActionExecutor,
{
    let snapshot = inspector
        .inspect(target.namespace(), target.interface())
        .await
        .map_err(ReconcileError::Observation)?;

    let plan = plan::plan(target, &snapshot)?;
    tracing::debug!(
        namespace = target.namespace(),
        actions = plan.len(),
        "computed plan"
    );

    let report = apply(&plan, target, inspector, executor).await;

    Ok(PassReport {
        snapshot,
        plan,
        report,
    })
}
