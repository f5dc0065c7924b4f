//! The per-template lifecycle state machine.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::keyed::{InFlight, KeyedLocks};
use crate::config::LifecycleConfig;
use crate::error::{Error, Result};
use crate::gateway::{CompanionSnapshot, Gateway, Placement, TimedGateway};
use crate::membership::{self, Eligibility};
use crate::naming;
use crate::store::MappingStore;
use crate::types::{
    CompanionKind, LifecycleState, MappingEntry, MembershipKind, RegisteredTemplate, Template,
};

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Empty, unlocked room named `"{template} #n"` and not claimed by another
/// template.
fn is_unused_room_of(registered: &RegisteredTemplate, companion: &CompanionSnapshot) -> bool {
    let derived = naming::parse_numbered(&companion.name)
        .is_some_and(|(base, _)| base == registered.display_name);
    let owner_matches = companion
        .owner_template_id
        .as_deref()
        .is_none_or(|owner| owner == registered.id);
    derived && owner_matches && companion.member_count() == 0 && !companion.locked
}

/// Everything a transition needs: the durable store, the platform and
/// the tunables.
#[derive(Clone)]
pub struct LifecycleContext {
    pub store: Arc<dyn MappingStore>,
    pub gateway: Arc<dyn Gateway>,
    pub config: LifecycleConfig,
}

impl LifecycleContext {
    /// Build a context. The gateway is wrapped so every call is bounded by
    /// `config.adapter_timeout()`.
    pub fn new(
        store: Arc<dyn MappingStore>,
        gateway: Arc<dyn Gateway>,
        config: LifecycleConfig,
    ) -> Self {
        let gateway: Arc<dyn Gateway> =
            Arc::new(TimedGateway::new(gateway, config.adapter_timeout()));
        Self {
            store,
            gateway,
            config,
        }
    }
}

/// Observable result of handling one trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// `Idle → Active`: a companion was created and recorded.
    Provisioned {
        template_id: String,
        companion_id: String,
        name: String,
    },
    /// A joiner was moved into the already active companion.
    MemberRouted {
        template_id: String,
        companion_id: String,
        member_id: String,
    },
    /// A creation trigger arrived while the key was provisioning.
    ConcurrentProvisionSuppressed { template_id: String },
    /// `Active → Idle`: the companion was deleted and its mapping removed.
    Reclaimed {
        template_id: String,
        companion_id: String,
    },
    /// The companion no longer existed; only the mapping was removed.
    StaleMappingDropped {
        template_id: String,
        companion_id: String,
    },
    /// `Active → Locked`: the companion was locked and archived.
    Locked {
        template_id: String,
        companion_id: String,
    },
    MembersAdded {
        template_id: String,
        companion_id: String,
        added: Vec<String>,
    },
    MemberRemoved {
        template_id: String,
        companion_id: String,
        member_id: String,
    },
    /// Recorded metadata refreshed, nothing else to do.
    Refreshed { template_id: String },
    /// Nothing to do.
    Skipped { reason: &'static str },
}

/// Result of reloading the active index at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RestoreReport {
    pub loaded: usize,
    pub dropped: usize,
    /// Entries kept because the gateway could not be asked.
    pub unverified: usize,
}

/// Drives every template through `Idle → Provisioning → Active →
/// Reclaiming → Idle` (or `Active → Locked`).
///
/// All operations on one template are serialized; operations on different
/// templates run in parallel. Gateway failures leave the key in its
/// pre-transition state and surface as errors.
pub struct LifecycleManager {
    ctx: LifecycleContext,
    locks: KeyedLocks,
    in_flight: InFlight,
}

impl LifecycleManager {
    pub fn new(ctx: LifecycleContext) -> Self {
        Self {
            ctx,
            locks: KeyedLocks::new(),
            in_flight: InFlight::new(),
        }
    }

    pub fn context(&self) -> &LifecycleContext {
        &self.ctx
    }

    /// Current state of a template.
    pub fn state(&self, template_id: &str) -> Result<LifecycleState> {
        if let Some(state) = self.in_flight.get(template_id) {
            return Ok(state);
        }
        if self.ctx.store.get(template_id)?.is_some() {
            return Ok(LifecycleState::Active);
        }
        if self.ctx.store.get_archived(template_id)?.is_some() {
            return Ok(LifecycleState::Locked);
        }
        Ok(LifecycleState::Idle)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Triggers
    // ─────────────────────────────────────────────────────────────────────────

    /// A member joined or left a template resource.
    ///
    /// Joining a registered voice template provisions a numbered room (and
    /// moves the member into it) or routes the member into the active one.
    /// Leaving a template is a no-op: base resources are never reclaimed.
    pub async fn on_template_membership_trigger(
        &self,
        template_id: &str,
        kind: MembershipKind,
        member_id: Option<&str>,
    ) -> Result<Outcome> {
        if kind == MembershipKind::Left {
            debug!(template_id = %template_id, "Member left a template resource");
            return Ok(Outcome::Skipped {
                reason: "template resources are never reclaimed",
            });
        }

        let Some(registered) = self.ctx.store.get_template(template_id)? else {
            debug!(template_id = %template_id, "Join on unregistered template ignored");
            return Ok(Outcome::Skipped {
                reason: "template not registered",
            });
        };
        if let Some(outcome) = self.suppress_if_provisioning(template_id) {
            return Ok(outcome);
        }

        let _key = self.locks.acquire(template_id).await;
        let template = registered.to_template();
        match (self.ctx.store.get(template_id)?, member_id) {
            (Some(entry), Some(member)) => self.route_member(entry, &template, member).await,
            (Some(_), None) => Ok(Outcome::Skipped {
                reason: "companion already active",
            }),
            (None, _) => self.provision(&template, member_id).await,
        }
    }

    /// An event template was announced.
    pub async fn on_template_created(&self, template: &Template) -> Result<Outcome> {
        if let Some(outcome) = self.suppress_if_provisioning(&template.id) {
            return Ok(outcome);
        }

        let _key = self.locks.acquire(&template.id).await;
        if self.ctx.store.get(&template.id)?.is_some() {
            info!(template_id = %template.id, "Duplicate creation trigger ignored");
            return Ok(Outcome::Skipped {
                reason: "companion already active",
            });
        }
        if let Some(outcome) = self.skip_if_ended(template)? {
            return Ok(outcome);
        }
        self.provision(template, None).await
    }

    /// An event template changed: refresh the recorded end time and
    /// re-sync subscribers. A terminal update locks the companion.
    ///
    /// An event with no companion (missed creation) is provisioned here.
    pub async fn on_template_updated(&self, template: &Template) -> Result<Outcome> {
        if template.is_terminal {
            return self.on_template_terminal(&template.id).await;
        }

        let _key = self.locks.acquire(&template.id).await;
        let Some(entry) = self.ctx.store.get(&template.id)? else {
            if template.kind != CompanionKind::EventThread {
                return Ok(Outcome::Skipped {
                    reason: "no active companion",
                });
            }
            if let Some(outcome) = self.skip_if_ended(template)? {
                return Ok(outcome);
            }
            info!(template_id = %template.id, "Updated event has no thread; provisioning");
            return self.provision(template, None).await;
        };

        if entry.ends_at != template.ends_at {
            self.ctx.store.set_ends_at(&template.id, template.ends_at)?;
            info!(
                template_id = %template.id,
                ends_at = ?template.ends_at,
                "Recorded end time refreshed"
            );
        }

        if entry.kind == CompanionKind::EventThread {
            let Some(snapshot) = self.ctx.gateway.fetch_companion(&entry.companion_id).await? else {
                return self.drop_stale(&entry);
            };
            let added = self.add_missing_subscribers(&entry, &snapshot).await?;
            if !added.is_empty() {
                return Ok(Outcome::MembersAdded {
                    template_id: entry.template_id,
                    companion_id: entry.companion_id,
                    added,
                });
            }
        }

        Ok(Outcome::Refreshed {
            template_id: template.id.clone(),
        })
    }

    /// The template's lifecycle ended (deleted, completed, cancelled).
    pub async fn on_template_terminal(&self, template_id: &str) -> Result<Outcome> {
        let _key = self.locks.acquire(template_id).await;
        let Some(entry) = self.ctx.store.get(template_id)? else {
            let reason = if self.ctx.store.get_archived(template_id)?.is_some() {
                "companion already locked"
            } else {
                "no active companion"
            };
            return Ok(Outcome::Skipped { reason });
        };
        self.lock_entry(entry).await
    }

    /// Membership of a companion changed; `member_count` is the count the
    /// platform reported, confirmed by a fresh fetch before reclaiming.
    pub async fn on_companion_membership_changed(
        &self,
        companion_id: &str,
        member_count: usize,
    ) -> Result<Outcome> {
        let Some(hint) = self.ctx.store.find_by_companion(companion_id)? else {
            debug!(companion_id = %companion_id, "Membership change on untracked companion");
            return Ok(Outcome::Skipped {
                reason: "companion not tracked",
            });
        };
        if member_count > 0 {
            return Ok(Outcome::Skipped {
                reason: "companion still occupied",
            });
        }
        if !hint.kind.reclaims_when_empty() {
            return Ok(Outcome::Skipped {
                reason: "kind is not reclaimed when empty",
            });
        }

        let _key = self.locks.acquire(&hint.template_id).await;
        let current = self
            .ctx
            .store
            .get(&hint.template_id)?
            .filter(|e| e.companion_id == companion_id);
        match current {
            Some(entry) => self.reclaim_if_eligible(entry).await,
            None => Ok(Outcome::Skipped {
                reason: "companion already reclaimed",
            }),
        }
    }

    /// An identity became interested in an event template.
    pub async fn on_subscriber_added(&self, template_id: &str, identity_id: &str) -> Result<Outcome> {
        let _key = self.locks.acquire(template_id).await;
        let Some(entry) = self.thread_entry(template_id)? else {
            return Ok(Outcome::Skipped {
                reason: "no active event thread",
            });
        };

        match self.ctx.gateway.add_member(&entry.companion_id, identity_id).await {
            Ok(()) => {
                info!(
                    template_id = %template_id,
                    companion_id = %entry.companion_id,
                    identity_id = %identity_id,
                    "Subscriber added to thread"
                );
                Ok(Outcome::MembersAdded {
                    template_id: entry.template_id,
                    companion_id: entry.companion_id,
                    added: vec![identity_id.to_string()],
                })
            }
            Err(e) if e.is_not_found() => {
                self.confirm_vanished(&entry, e).await?;
                self.drop_stale(&entry)
            }
            Err(e) => Err(e),
        }
    }

    /// The platform reported an explicit un-subscribe.
    pub async fn on_subscriber_removed(
        &self,
        template_id: &str,
        identity_id: &str,
    ) -> Result<Outcome> {
        let _key = self.locks.acquire(template_id).await;
        let Some(entry) = self.thread_entry(template_id)? else {
            return Ok(Outcome::Skipped {
                reason: "no active event thread",
            });
        };

        match self.ctx.gateway.remove_member(&entry.companion_id, identity_id).await {
            Ok(()) => {
                info!(
                    template_id = %template_id,
                    companion_id = %entry.companion_id,
                    identity_id = %identity_id,
                    "Subscriber removed from thread"
                );
                Ok(Outcome::MemberRemoved {
                    template_id: entry.template_id,
                    companion_id: entry.companion_id,
                    member_id: identity_id.to_string(),
                })
            }
            Err(e) if e.is_not_found() => {
                self.confirm_vanished(&entry, e).await?;
                self.drop_stale(&entry)
            }
            Err(e) => Err(e),
        }
    }

    /// Explicit reclaim trigger. Safe to repeat.
    pub async fn reclaim(&self, template_id: &str) -> Result<Outcome> {
        let _key = self.locks.acquire(template_id).await;
        match self.ctx.store.get(template_id)? {
            Some(entry) => self.reclaim_if_eligible(entry).await,
            None => Ok(Outcome::Skipped {
                reason: "no active companion",
            }),
        }
    }

    /// Startup reload: verify each active entry against the gateway and
    /// drop the ones whose companion is gone.
    pub async fn restore(&self) -> Result<RestoreReport> {
        let entries = self.ctx.store.list()?;
        let mut report = RestoreReport {
            loaded: entries.len(),
            ..Default::default()
        };

        for entry in entries {
            let _key = self.locks.acquire(&entry.template_id).await;
            match self.ctx.gateway.fetch_companion(&entry.companion_id).await {
                Ok(Some(_)) => {}
                Ok(None) => {
                    self.drop_stale(&entry)?;
                    report.dropped += 1;
                }
                Err(e) => {
                    warn!(
                        template_id = %entry.template_id,
                        companion_id = %entry.companion_id,
                        error = %e,
                        "Could not verify companion, keeping mapping"
                    );
                    report.unverified += 1;
                }
            }
        }

        info!(
            loaded = report.loaded,
            dropped = report.dropped,
            unverified = report.unverified,
            "Mappings restored"
        );
        Ok(report)
    }

    /// One reconciliation step for a single active entry.
    ///
    /// Ended threads are locked, missing subscribers added, empty rooms
    /// reclaimed and stale mappings dropped.
    pub(crate) async fn sweep_entry(&self, template_id: &str) -> Result<Outcome> {
        let _key = self.locks.acquire(template_id).await;
        let Some(entry) = self.ctx.store.get(template_id)? else {
            return Ok(Outcome::Skipped {
                reason: "mapping already removed",
            });
        };
        let Some(snapshot) = self.ctx.gateway.fetch_companion(&entry.companion_id).await? else {
            return self.drop_stale(&entry);
        };

        match entry.kind {
            CompanionKind::EventThread => {
                if entry.ends_at.is_some_and(|ends_at| ends_at <= now_ms()) {
                    info!(template_id = %entry.template_id, "Event ended, locking thread");
                    return self.lock_entry(entry).await;
                }
                let added = self.add_missing_subscribers(&entry, &snapshot).await?;
                if added.is_empty() {
                    Ok(Outcome::Skipped {
                        reason: "thread in sync",
                    })
                } else {
                    Ok(Outcome::MembersAdded {
                        template_id: entry.template_id,
                        companion_id: entry.companion_id,
                        added,
                    })
                }
            }
            CompanionKind::VoiceRoom => self.reclaim_by_verdict(entry, Some(&snapshot)).await,
        }
    }

    /// Delete empty numbered rooms of a registered template that no mapping
    /// records: a creation that landed after its call timed out, or one whose
    /// mapping write and cleanup delete both failed. Returns the deleted ids.
    pub(crate) async fn sweep_orphans(&self, registered: &RegisteredTemplate) -> Result<Vec<String>> {
        let _key = self.locks.acquire(&registered.id).await;
        let placement = self.placement_for(&registered.to_template());
        let live = self
            .ctx
            .gateway
            .list_companions(placement.parent_group_id.as_deref())
            .await?;

        let mut deleted = Vec::new();
        for companion in live.iter().filter(|c| is_unused_room_of(registered, c)) {
            if self.ctx.store.find_by_companion(&companion.id)?.is_some() {
                continue;
            }
            // The listing is a hint; the fresh snapshot decides.
            let Some(fresh) = self.ctx.gateway.fetch_companion(&companion.id).await? else {
                continue;
            };
            if !is_unused_room_of(registered, &fresh) {
                continue;
            }
            match self.ctx.gateway.delete_companion(&fresh.id).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            }
            info!(
                template_id = %registered.id,
                companion_id = %fresh.id,
                name = %fresh.name,
                "Unrecorded empty room deleted"
            );
            deleted.push(fresh.id);
        }
        Ok(deleted)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Transitions (caller holds the key lock)
    // ─────────────────────────────────────────────────────────────────────────

    fn suppress_if_provisioning(&self, template_id: &str) -> Option<Outcome> {
        if self.in_flight.is(template_id, LifecycleState::Provisioning) {
            info!(template_id = %template_id, "Creation trigger suppressed, provisioning in flight");
            return Some(Outcome::ConcurrentProvisionSuppressed {
                template_id: template_id.to_string(),
            });
        }
        None
    }

    fn skip_if_ended(&self, template: &Template) -> Result<Option<Outcome>> {
        let ended = template.is_terminal
            || template.ends_at.is_some_and(|ends_at| ends_at <= now_ms())
            || self.ctx.store.get_archived(&template.id)?.is_some();
        if ended {
            debug!(template_id = %template.id, "Template already ended");
            return Ok(Some(Outcome::Skipped {
                reason: "template already ended",
            }));
        }
        Ok(None)
    }

    fn thread_entry(&self, template_id: &str) -> Result<Option<MappingEntry>> {
        Ok(self
            .ctx
            .store
            .get(template_id)?
            .filter(|e| e.kind == CompanionKind::EventThread))
    }

    fn placement_for(&self, template: &Template) -> Placement {
        let configured = match template.kind {
            CompanionKind::VoiceRoom => &self.ctx.config.voice_parent_group,
            CompanionKind::EventThread => &self.ctx.config.thread_parent_group,
        };
        Placement {
            kind: template.kind,
            parent_group_id: configured
                .clone()
                .or_else(|| template.parent_group_id.clone()),
        }
    }

    /// `Idle → Provisioning → Active`.
    async fn provision(&self, template: &Template, member_id: Option<&str>) -> Result<Outcome> {
        let _mark = self.in_flight.mark(&template.id, LifecycleState::Provisioning);
        let placement = self.placement_for(template);

        let name = match template.kind {
            CompanionKind::VoiceRoom => {
                let live = self
                    .ctx
                    .gateway
                    .list_companions(placement.parent_group_id.as_deref())
                    .await?;
                naming::next_companion_name(
                    &template.display_name,
                    live.iter().map(|c| c.name.as_str()),
                )
            }
            CompanionKind::EventThread => template.display_name.clone(),
        };

        let companion_id = match self
            .ctx
            .gateway
            .create_companion(&template.id, &name, &placement)
            .await
        {
            Ok(id) => id,
            Err(e) => {
                warn!(template_id = %template.id, error = %e, "Companion creation failed");
                return Err(e);
            }
        };

        let entry = MappingEntry {
            template_id: template.id.clone(),
            companion_id: companion_id.clone(),
            kind: template.kind,
            companion_name: name.clone(),
            created_at: now_ms(),
            ends_at: template.ends_at,
        };
        if let Err(e) = self.ctx.store.put(&entry) {
            error!(
                template_id = %template.id,
                companion_id = %companion_id,
                error = %e,
                "Failed to record mapping, deleting companion"
            );
            if let Err(cleanup) = self.ctx.gateway.delete_companion(&companion_id).await {
                if !cleanup.is_not_found() {
                    warn!(
                        companion_id = %companion_id,
                        error = %cleanup,
                        "Unrecorded companion could not be deleted"
                    );
                }
            }
            return Err(e);
        }

        info!(
            template_id = %template.id,
            companion_id = %companion_id,
            name = %name,
            kind = %template.kind,
            "Companion provisioned"
        );

        let initial_member = match template.kind {
            CompanionKind::VoiceRoom => member_id,
            CompanionKind::EventThread => template.creator_id.as_deref(),
        };
        if let Some(member) = initial_member {
            if let Err(e) = self.ctx.gateway.add_member(&companion_id, member).await {
                warn!(
                    companion_id = %companion_id,
                    member_id = %member,
                    error = %e,
                    "Companion provisioned but initial member not added"
                );
            }
        }

        Ok(Outcome::Provisioned {
            template_id: template.id.clone(),
            companion_id,
            name,
        })
    }

    async fn route_member(
        &self,
        entry: MappingEntry,
        template: &Template,
        member_id: &str,
    ) -> Result<Outcome> {
        match self.ctx.gateway.add_member(&entry.companion_id, member_id).await {
            Ok(()) => {
                debug!(
                    template_id = %entry.template_id,
                    companion_id = %entry.companion_id,
                    member_id = %member_id,
                    "Member routed into active companion"
                );
                Ok(Outcome::MemberRouted {
                    template_id: entry.template_id,
                    companion_id: entry.companion_id,
                    member_id: member_id.to_string(),
                })
            }
            Err(e) if e.is_not_found() => {
                self.confirm_vanished(&entry, e).await?;
                self.drop_stale(&entry)?;
                self.provision(template, Some(member_id)).await
            }
            Err(e) => Err(e),
        }
    }

    async fn reclaim_if_eligible(&self, entry: MappingEntry) -> Result<Outcome> {
        let snapshot = self.ctx.gateway.fetch_companion(&entry.companion_id).await?;
        self.reclaim_by_verdict(entry, snapshot.as_ref()).await
    }

    async fn reclaim_by_verdict(
        &self,
        entry: MappingEntry,
        snapshot: Option<&CompanionSnapshot>,
    ) -> Result<Outcome> {
        match membership::assess(&entry, snapshot) {
            Eligibility::Reclaim => self.reclaim_entry(entry).await,
            Eligibility::Vanished => self.drop_stale(&entry),
            Eligibility::Occupied(members) => {
                debug!(
                    companion_id = %entry.companion_id,
                    members = members,
                    "Companion still occupied"
                );
                Ok(Outcome::Skipped {
                    reason: "companion still occupied",
                })
            }
            Eligibility::NotReclaimable(reason) => Ok(Outcome::Skipped { reason }),
        }
    }

    /// `Active → Reclaiming → Idle`.
    async fn reclaim_entry(&self, entry: MappingEntry) -> Result<Outcome> {
        let _mark = self.in_flight.mark(&entry.template_id, LifecycleState::Reclaiming);

        match self.ctx.gateway.delete_companion(&entry.companion_id).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                debug!(companion_id = %entry.companion_id, "Companion already deleted");
            }
            Err(e) => {
                warn!(
                    template_id = %entry.template_id,
                    companion_id = %entry.companion_id,
                    error = %e,
                    "Companion deletion failed"
                );
                return Err(e);
            }
        }

        self.ctx.store.delete(&entry.template_id)?;
        info!(
            template_id = %entry.template_id,
            companion_id = %entry.companion_id,
            "Companion reclaimed"
        );
        Ok(Outcome::Reclaimed {
            template_id: entry.template_id,
            companion_id: entry.companion_id,
        })
    }

    /// `Active → Locked`.
    async fn lock_entry(&self, entry: MappingEntry) -> Result<Outcome> {
        let reason = &self.ctx.config.lock_reason;
        match self.ctx.gateway.lock_companion(&entry.companion_id, reason).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                self.confirm_vanished(&entry, e).await?;
                return self.drop_stale(&entry);
            }
            Err(e) => {
                warn!(
                    template_id = %entry.template_id,
                    companion_id = %entry.companion_id,
                    error = %e,
                    "Companion lock failed"
                );
                return Err(e);
            }
        }

        self.ctx.store.archive(&entry.template_id, reason)?;
        info!(
            template_id = %entry.template_id,
            companion_id = %entry.companion_id,
            reason = %reason,
            "Companion locked and archived"
        );
        Ok(Outcome::Locked {
            template_id: entry.template_id,
            companion_id: entry.companion_id,
        })
    }

    /// A companion operation answered NotFound. Only a fresh fetch that
    /// also finds nothing makes the mapping stale; a live companion means
    /// the member (or route) was unknown and `err` is surfaced.
    async fn confirm_vanished(&self, entry: &MappingEntry, err: Error) -> Result<()> {
        match self.ctx.gateway.fetch_companion(&entry.companion_id).await? {
            None => Ok(()),
            Some(_) => {
                warn!(
                    template_id = %entry.template_id,
                    companion_id = %entry.companion_id,
                    error = %err,
                    "NotFound from a live companion, keeping mapping"
                );
                Err(err)
            }
        }
    }

    /// Mapping present, companion absent: forget the mapping without
    /// touching the gateway.
    fn drop_stale(&self, entry: &MappingEntry) -> Result<Outcome> {
        self.ctx.store.delete(&entry.template_id)?;
        warn!(
            template_id = %entry.template_id,
            companion_id = %entry.companion_id,
            "Companion no longer exists, stale mapping dropped"
        );
        Ok(Outcome::StaleMappingDropped {
            template_id: entry.template_id.clone(),
            companion_id: entry.companion_id.clone(),
        })
    }

    /// Add every subscriber the thread is missing. Never removes anyone.
    async fn add_missing_subscribers(
        &self,
        entry: &MappingEntry,
        snapshot: &CompanionSnapshot,
    ) -> Result<Vec<String>> {
        let subscribers = self.ctx.gateway.list_subscribers(&entry.template_id).await?;
        let mut added = Vec::new();
        for identity in subscribers.into_iter().filter(|s| !snapshot.has_member(s)) {
            self.ctx
                .gateway
                .add_member(&entry.companion_id, &identity)
                .await?;
            added.push(identity);
        }
        if !added.is_empty() {
            info!(
                template_id = %entry.template_id,
                companion_id = %entry.companion_id,
                added = added.len(),
                "Missing subscribers added to thread"
            );
        }
        Ok(added)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::InMemoryGateway;
    use crate::store::SqliteMappingStore;

    fn setup() -> (LifecycleManager, Arc<InMemoryGateway>, Arc<SqliteMappingStore>) {
        let store = Arc::new(SqliteMappingStore::open_in_memory().unwrap());
        let gateway = Arc::new(InMemoryGateway::new());
        let ctx = LifecycleContext::new(store.clone(), gateway.clone(), LifecycleConfig::default());
        (LifecycleManager::new(ctx), gateway, store)
    }

    fn register(store: &SqliteMappingStore, id: &str, name: &str) {
        store
            .register_template(&RegisteredTemplate {
                id: id.into(),
                display_name: name.into(),
                parent_group_id: Some("cat-1".into()),
                created_at: 0,
            })
            .unwrap();
    }

    #[tokio::test]
    async fn test_join_provisions_and_moves_member() {
        let (manager, gateway, store) = setup();
        register(&store, "t-1", "Lounge");

        let outcome = manager
            .on_template_membership_trigger("t-1", MembershipKind::Joined, Some("u-1"))
            .await
            .unwrap();

        let (companion_id, name) = match outcome {
            Outcome::Provisioned {
                companion_id, name, ..
            } => (companion_id, name),
            other => panic!("expected provisioning, got {:?}", other),
        };
        assert_eq!(name, "Lounge #1");
        assert!(gateway.companion(&companion_id).unwrap().has_member("u-1"));
        assert_eq!(manager.state("t-1").unwrap(), LifecycleState::Active);
    }

    #[tokio::test]
    async fn test_second_join_routes_into_existing_room() {
        let (manager, gateway, store) = setup();
        register(&store, "t-1", "Lounge");

        manager
            .on_template_membership_trigger("t-1", MembershipKind::Joined, Some("u-1"))
            .await
            .unwrap();
        let outcome = manager
            .on_template_membership_trigger("t-1", MembershipKind::Joined, Some("u-2"))
            .await
            .unwrap();

        assert!(matches!(outcome, Outcome::MemberRouted { ref member_id, .. } if member_id == "u-2"));
        assert_eq!(gateway.companions_of("t-1").len(), 1);
    }

    #[tokio::test]
    async fn test_left_template_is_noop() {
        let (manager, gateway, store) = setup();
        register(&store, "t-1", "Lounge");

        let outcome = manager
            .on_template_membership_trigger("t-1", MembershipKind::Left, Some("u-1"))
            .await
            .unwrap();
        assert!(matches!(outcome, Outcome::Skipped { .. }));
        assert_eq!(gateway.call_count("delete_companion"), 0);
    }

    #[tokio::test]
    async fn test_create_failure_reverts_to_idle() {
        let (manager, gateway, store) = setup();
        register(&store, "t-1", "Lounge");
        gateway.fail_next("create_companion", 1);

        let err = manager
            .on_template_membership_trigger("t-1", MembershipKind::Joined, Some("u-1"))
            .await
            .unwrap_err();
        assert!(err.is_recoverable());
        assert_eq!(manager.state("t-1").unwrap(), LifecycleState::Idle);
        assert!(store.get("t-1").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_event_created_adds_creator() {
        let (manager, gateway, _store) = setup();
        let mut event = Template::event("e-1", "Raid Night", None);
        event.creator_id = Some("owner".into());

        let outcome = manager.on_template_created(&event).await.unwrap();
        let (companion_id, name) = match outcome {
            Outcome::Provisioned {
                companion_id, name, ..
            } => (companion_id, name),
            other => panic!("expected provisioning, got {:?}", other),
        };
        assert_eq!(name, "Raid Night");
        assert!(gateway.companion(&companion_id).unwrap().has_member("owner"));

        let again = manager.on_template_created(&event).await.unwrap();
        assert!(matches!(again, Outcome::Skipped { .. }));
        assert_eq!(gateway.companions_of("e-1").len(), 1);
    }

    #[tokio::test]
    async fn test_ended_event_not_provisioned() {
        let (manager, gateway, _store) = setup();
        let event = Template::event("e-1", "Raid Night", Some(now_ms() - 1_000));

        let outcome = manager.on_template_created(&event).await.unwrap();
        assert_eq!(
            outcome,
            Outcome::Skipped {
                reason: "template already ended"
            }
        );
        assert_eq!(gateway.call_count("create_companion"), 0);
    }

    #[tokio::test]
    async fn test_terminal_locks_and_archives() {
        let (manager, gateway, store) = setup();
        let event = Template::event("e-1", "Raid Night", None);
        manager.on_template_created(&event).await.unwrap();
        let companion_id = store.get("e-1").unwrap().unwrap().companion_id;

        let outcome = manager.on_template_terminal("e-1").await.unwrap();
        assert!(matches!(outcome, Outcome::Locked { .. }));
        assert!(gateway.companion(&companion_id).unwrap().locked);
        assert_eq!(
            gateway.lock_reason(&companion_id).as_deref(),
            Some("Event has ended")
        );
        assert_eq!(manager.state("e-1").unwrap(), LifecycleState::Locked);

        let again = manager.on_template_terminal("e-1").await.unwrap();
        assert_eq!(
            again,
            Outcome::Skipped {
                reason: "companion already locked"
            }
        );
    }

    #[tokio::test]
    async fn test_update_refreshes_end_time() {
        let (manager, _gateway, store) = setup();
        let mut event = Template::event("e-1", "Raid Night", None);
        manager.on_template_created(&event).await.unwrap();

        event.ends_at = Some(now_ms() + 3_600_000);
        let outcome = manager.on_template_updated(&event).await.unwrap();
        assert!(matches!(outcome, Outcome::Refreshed { .. }));
        assert_eq!(store.get("e-1").unwrap().unwrap().ends_at, event.ends_at);
    }

    #[tokio::test]
    async fn test_subscriber_added_and_removed() {
        let (manager, gateway, store) = setup();
        manager
            .on_template_created(&Template::event("e-1", "Raid Night", None))
            .await
            .unwrap();
        let companion_id = store.get("e-1").unwrap().unwrap().companion_id;

        manager.on_subscriber_added("e-1", "u-7").await.unwrap();
        assert!(gateway.companion(&companion_id).unwrap().has_member("u-7"));

        let outcome = manager.on_subscriber_removed("e-1", "u-7").await.unwrap();
        assert!(matches!(outcome, Outcome::MemberRemoved { .. }));
        assert!(!gateway.companion(&companion_id).unwrap().has_member("u-7"));
    }

    #[tokio::test]
    async fn test_reclaim_occupied_room_is_skipped() {
        let (manager, gateway, store) = setup();
        register(&store, "t-1", "Lounge");
        manager
            .on_template_membership_trigger("t-1", MembershipKind::Joined, Some("u-1"))
            .await
            .unwrap();

        let outcome = manager.reclaim("t-1").await.unwrap();
        assert_eq!(
            outcome,
            Outcome::Skipped {
                reason: "companion still occupied"
            }
        );
        assert_eq!(gateway.call_count("delete_companion"), 0);
    }

    #[tokio::test]
    async fn test_restore_drops_vanished_companions() {
        let (manager, gateway, store) = setup();
        register(&store, "t-1", "Lounge");
        manager
            .on_template_membership_trigger("t-1", MembershipKind::Joined, None)
            .await
            .unwrap();
        let companion_id = store.get("t-1").unwrap().unwrap().companion_id;
        gateway.remove_companion(&companion_id);

        let report = manager.restore().await.unwrap();
        assert_eq!(
            report,
            RestoreReport {
                loaded: 1,
                dropped: 1,
                unverified: 0
            }
        );
        assert!(store.get("t-1").unwrap().is_none());
        assert_eq!(gateway.call_count("delete_companion"), 0);
    }
}
