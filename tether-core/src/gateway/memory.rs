//! In-process platform model.
//!
//! Backs the daemon's dry-run mode and the test suites. Supports scripted
//! failures (`fail_next`) and artificial latency (`set_delay`) per operation.

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

use super::{CompanionSnapshot, Gateway, Placement};
use crate::error::{Error, Result};

#[derive(Default)]
struct PlatformState {
    companions: HashMap<String, CompanionSnapshot>,
    subscribers: HashMap<String, BTreeSet<String>>,
    lock_reasons: HashMap<String, String>,
    calls: HashMap<&'static str, usize>,
    failures: HashMap<&'static str, usize>,
    delays: HashMap<&'static str, Duration>,
}

/// Gateway holding the whole platform in memory.
#[derive(Default)]
pub struct InMemoryGateway {
    state: Mutex<PlatformState>,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, PlatformState> {
        // A panic while holding the lock only happens inside a failing test.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record the call, apply scripted latency, and consume a scripted failure.
    async fn enter(&self, op: &'static str) -> Result<()> {
        let delay = {
            let mut state = self.state();
            *state.calls.entry(op).or_default() += 1;
            state.delays.get(op).copied()
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state();
        if let Some(remaining) = state.failures.get_mut(op) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(Error::rejected(op, "scripted failure"));
            }
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Scripting
    // ─────────────────────────────────────────────────────────────────────────

    /// Make the next `times` calls of `op` fail with `AdapterRejected`.
    pub fn fail_next(&self, op: &'static str, times: usize) {
        self.state().failures.insert(op, times);
    }

    /// Delay every call of `op`.
    pub fn set_delay(&self, op: &'static str, delay: Duration) {
        self.state().delays.insert(op, delay);
    }

    /// Number of times `op` was invoked.
    pub fn call_count(&self, op: &str) -> usize {
        self.state().calls.get(op).copied().unwrap_or(0)
    }

    /// Place a companion directly (pre-existing or manually created).
    pub fn insert_companion(&self, snapshot: CompanionSnapshot) {
        self.state().companions.insert(snapshot.id.clone(), snapshot);
    }

    /// Delete a companion out-of-band, bypassing the lifecycle manager.
    pub fn remove_companion(&self, companion_id: &str) -> bool {
        self.state().companions.remove(companion_id).is_some()
    }

    /// Replace the member set of a companion.
    pub fn set_members<I, S>(&self, companion_id: &str, members: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Some(companion) = self.state().companions.get_mut(companion_id) {
            companion.members = members.into_iter().map(Into::into).collect();
        }
    }

    /// Replace the subscriber set of a template.
    pub fn set_subscribers<I, S>(&self, template_id: &str, subscribers: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state().subscribers.insert(
            template_id.to_string(),
            subscribers.into_iter().map(Into::into).collect(),
        );
    }

    /// Current snapshot of a companion.
    pub fn companion(&self, companion_id: &str) -> Option<CompanionSnapshot> {
        self.state().companions.get(companion_id).cloned()
    }

    /// All companions owned by a template.
    pub fn companions_of(&self, template_id: &str) -> Vec<CompanionSnapshot> {
        self.state()
            .companions
            .values()
            .filter(|c| c.owner_template_id.as_deref() == Some(template_id))
            .cloned()
            .collect()
    }

    /// Reason recorded by the last lock of a companion.
    pub fn lock_reason(&self, companion_id: &str) -> Option<String> {
        self.state().lock_reasons.get(companion_id).cloned()
    }
}

#[async_trait]
impl Gateway for InMemoryGateway {
    async fn create_companion(
        &self,
        template_id: &str,
        name: &str,
        placement: &Placement,
    ) -> Result<String> {
        self.enter("create_companion").await?;
        let id = uuid::Uuid::new_v4().to_string();
        let snapshot = CompanionSnapshot {
            id: id.clone(),
            name: name.to_string(),
            owner_template_id: Some(template_id.to_string()),
            parent_group_id: placement.parent_group_id.clone(),
            members: BTreeSet::new(),
            locked: false,
            created_at: chrono::Utc::now().timestamp_millis(),
        };
        self.state().companions.insert(id.clone(), snapshot);
        debug!(companion_id = %id, name = %name, "In-memory companion created");
        Ok(id)
    }

    async fn delete_companion(&self, companion_id: &str) -> Result<()> {
        self.enter("delete_companion").await?;
        match self.state().companions.remove(companion_id) {
            Some(_) => Ok(()),
            None => Err(Error::not_found("Companion", companion_id)),
        }
    }

    async fn fetch_companion(&self, companion_id: &str) -> Result<Option<CompanionSnapshot>> {
        self.enter("fetch_companion").await?;
        Ok(self.state().companions.get(companion_id).cloned())
    }

    async fn list_companions(
        &self,
        parent_group_id: Option<&str>,
    ) -> Result<Vec<CompanionSnapshot>> {
        self.enter("list_companions").await?;
        Ok(self
            .state()
            .companions
            .values()
            .filter(|c| c.parent_group_id.as_deref() == parent_group_id)
            .cloned()
            .collect())
    }

    async fn add_member(&self, companion_id: &str, identity_id: &str) -> Result<()> {
        self.enter("add_member").await?;
        let mut state = self.state();
        let companion = state
            .companions
            .get_mut(companion_id)
            .ok_or_else(|| Error::not_found("Companion", companion_id))?;
        companion.members.insert(identity_id.to_string());
        Ok(())
    }

    async fn remove_member(&self, companion_id: &str, identity_id: &str) -> Result<()> {
        self.enter("remove_member").await?;
        let mut state = self.state();
        let companion = state
            .companions
            .get_mut(companion_id)
            .ok_or_else(|| Error::not_found("Companion", companion_id))?;
        companion.members.remove(identity_id);
        Ok(())
    }

    async fn lock_companion(&self, companion_id: &str, reason: &str) -> Result<()> {
        self.enter("lock_companion").await?;
        let mut state = self.state();
        let companion = state
            .companions
            .get_mut(companion_id)
            .ok_or_else(|| Error::not_found("Companion", companion_id))?;
        companion.locked = true;
        state
            .lock_reasons
            .insert(companion_id.to_string(), reason.to_string());
        Ok(())
    }

    async fn list_subscribers(&self, template_id: &str) -> Result<BTreeSet<String>> {
        self.enter("list_subscribers").await?;
        Ok(self
            .state()
            .subscribers
            .get(template_id)
            .cloned()
            .unwrap_or_default())
    }
}
