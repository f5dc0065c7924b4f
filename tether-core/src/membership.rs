//! Membership tracking.
//!
//! Two concerns live here:
//! - normalizing raw voice-state changes into lifecycle triggers
//! - deciding whether a tracked companion may be reclaimed
//!
//! The member count carried by a notification is only a hint. Reclaim is
//! decided from a freshly fetched snapshot.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::error::Result;
use crate::gateway::CompanionSnapshot;
use crate::lifecycle::Notification;
use crate::naming;
use crate::store::MappingStore;
use crate::types::{MappingEntry, MembershipKind};

/// Verdict on whether a companion can be reclaimed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eligibility {
    /// Empty derived companion of a kind that reclaims when empty.
    Reclaim,
    /// Still has members.
    Occupied(usize),
    /// Never reclaimed by emptiness (base resource, thread, locked).
    NotReclaimable(&'static str),
    /// The platform no longer has the companion; the mapping is stale.
    Vanished,
}

/// Assess a mapping against the companion's current snapshot.
pub fn assess(entry: &MappingEntry, snapshot: Option<&CompanionSnapshot>) -> Eligibility {
    let Some(snapshot) = snapshot else {
        return Eligibility::Vanished;
    };
    if !entry.kind.reclaims_when_empty() {
        return Eligibility::NotReclaimable("kind is not reclaimed when empty");
    }
    if !naming::is_derived_name(&snapshot.name) {
        return Eligibility::NotReclaimable("base resource");
    }
    if snapshot.locked {
        return Eligibility::NotReclaimable("locked");
    }
    match snapshot.member_count() {
        0 => Eligibility::Reclaim,
        n => Eligibility::Occupied(n),
    }
}

/// One side of a voice-state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRef {
    pub id: String,
    /// Members remaining after the change, when the platform reports it.
    #[serde(default)]
    pub member_count: Option<usize>,
}

/// Raw voice-state change as reported by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceStateChange {
    pub member_id: String,
    #[serde(default)]
    pub left: Option<ChannelRef>,
    #[serde(default)]
    pub joined: Option<ChannelRef>,
}

/// Turns voice-state changes into notifications for the state machine.
pub struct MembershipTracker {
    store: Arc<dyn MappingStore>,
}

impl MembershipTracker {
    pub fn new(store: Arc<dyn MappingStore>) -> Self {
        Self { store }
    }

    /// Normalize a change into zero or more notifications.
    ///
    /// Leaving a tracked companion yields a companion-membership trigger;
    /// joining a registered template yields a creation trigger. A change
    /// within the same channel (mute, deafen) yields nothing.
    pub fn normalize(&self, change: &VoiceStateChange) -> Result<Vec<Notification>> {
        let left_id = change.left.as_ref().map(|c| c.id.as_str());
        let joined_id = change.joined.as_ref().map(|c| c.id.as_str());
        if left_id.is_some() && left_id == joined_id {
            return Ok(Vec::new());
        }

        let mut triggers = Vec::new();

        if let Some(left) = &change.left {
            if self.store.find_by_companion(&left.id)?.is_some() {
                triggers.push(Notification::CompanionMembership {
                    companion_id: left.id.clone(),
                    // Unknown counts still prompt a fetch-based check.
                    member_count: left.member_count.unwrap_or(0),
                });
            } else if self.store.get_template(&left.id)?.is_some() {
                triggers.push(Notification::TemplateMembership {
                    template_id: left.id.clone(),
                    kind: MembershipKind::Left,
                    member_id: Some(change.member_id.clone()),
                });
            }
        }

        if let Some(joined) = &change.joined {
            if self.store.get_template(&joined.id)?.is_some() {
                triggers.push(Notification::TemplateMembership {
                    template_id: joined.id.clone(),
                    kind: MembershipKind::Joined,
                    member_id: Some(change.member_id.clone()),
                });
            }
        }

        debug!(
            member_id = %change.member_id,
            triggers = triggers.len(),
            "Voice state normalized"
        );
        Ok(triggers)
    }
}
