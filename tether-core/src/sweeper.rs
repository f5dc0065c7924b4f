//! Reconciliation sweep.
//!
//! A pass walks every active mapping and converges it against the
//! platform, independently of notifications:
//! - companion gone ⇒ stale mapping dropped (no delete call)
//! - event ended ⇒ thread locked and archived
//! - subscribers missing from a thread ⇒ added (never removed)
//! - empty derived voice room ⇒ reclaimed
//! - empty numbered room of a registered template that no mapping records
//!   ⇒ deleted
//!
//! Passes are idempotent; a failure on one entry does not stop the pass.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::Result;
use crate::lifecycle::{LifecycleManager, Outcome};

/// Tally of one sweep pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub examined: usize,
    pub locked: usize,
    pub reclaimed: usize,
    pub stale_dropped: usize,
    pub members_added: usize,
    #[serde(default)]
    pub orphans_deleted: usize,
    pub failures: usize,
    pub started_at: i64,
    pub finished_at: i64,
}

impl SweepReport {
    fn record(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Locked { .. } => self.locked += 1,
            Outcome::Reclaimed { .. } => self.reclaimed += 1,
            Outcome::StaleMappingDropped { .. } => self.stale_dropped += 1,
            Outcome::MembersAdded { added, .. } => self.members_added += added.len(),
            _ => {}
        }
    }

    /// Whether the pass changed anything.
    pub fn is_quiet(&self) -> bool {
        self.locked
            + self.reclaimed
            + self.stale_dropped
            + self.members_added
            + self.orphans_deleted
            + self.failures
            == 0
    }
}

impl LifecycleManager {
    /// Run one reconciliation pass over the active index, then over the
    /// rooms of every registered template.
    ///
    /// Only reading the indexes can fail; per-entry failures are counted
    /// and logged.
    pub async fn run_sweep(&self) -> Result<SweepReport> {
        let mut report = SweepReport {
            started_at: chrono::Utc::now().timestamp_millis(),
            ..Default::default()
        };

        let entries = self.context().store.list()?;
        for entry in entries {
            report.examined += 1;
            match self.sweep_entry(&entry.template_id).await {
                Ok(outcome) => report.record(&outcome),
                Err(e) => {
                    report.failures += 1;
                    warn!(
                        template_id = %entry.template_id,
                        companion_id = %entry.companion_id,
                        error = %e,
                        "Sweep failed for entry"
                    );
                }
            }
        }

        for template in self.context().store.list_templates()? {
            match self.sweep_orphans(&template).await {
                Ok(deleted) => report.orphans_deleted += deleted.len(),
                Err(e) => {
                    report.failures += 1;
                    warn!(
                        template_id = %template.id,
                        error = %e,
                        "Orphan sweep failed for template"
                    );
                }
            }
        }

        report.finished_at = chrono::Utc::now().timestamp_millis();
        if !report.is_quiet() {
            info!(
                examined = report.examined,
                locked = report.locked,
                reclaimed = report.reclaimed,
                stale_dropped = report.stale_dropped,
                members_added = report.members_added,
                orphans_deleted = report.orphans_deleted,
                failures = report.failures,
                "Sweep pass complete"
            );
        }
        Ok(report)
    }
}
