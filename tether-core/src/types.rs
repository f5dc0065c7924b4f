//! Core domain types for templates, companions and their mappings.
//!
//! Timestamps are epoch milliseconds (UTC), matching the store layout.

use serde::{Deserialize, Serialize};
use std::fmt;

// ─────────────────────────────────────────────────────────────────────────────
// Kinds & States
// ─────────────────────────────────────────────────────────────────────────────

/// Which flavour of companion a template spawns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompanionKind {
    /// Numbered duplicate of a base voice channel.
    VoiceRoom,
    /// Private discussion thread for a scheduled event.
    EventThread,
}

impl CompanionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompanionKind::VoiceRoom => "voice_room",
            CompanionKind::EventThread => "event_thread",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "voice_room" => Some(CompanionKind::VoiceRoom),
            "event_thread" => Some(CompanionKind::EventThread),
            _ => None,
        }
    }

    /// Voice rooms are deleted once empty; threads live until their event ends.
    pub fn reclaims_when_empty(&self) -> bool {
        matches!(self, CompanionKind::VoiceRoom)
    }
}

impl fmt::Display for CompanionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-template lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Idle,
    Provisioning,
    Active,
    Reclaiming,
    Locked,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Idle => "idle",
            LifecycleState::Provisioning => "provisioning",
            LifecycleState::Active => "active",
            LifecycleState::Reclaiming => "reclaiming",
            LifecycleState::Locked => "locked",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of a membership change on a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipKind {
    Joined,
    Left,
}

// ─────────────────────────────────────────────────────────────────────────────
// Entity Types
// ─────────────────────────────────────────────────────────────────────────────

/// A long-lived resource companions are derived from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub id: String,
    pub display_name: String,
    pub parent_group_id: Option<String>,
    pub kind: CompanionKind,
    #[serde(default)]
    pub is_terminal: bool,
    /// Scheduled end (event templates).
    #[serde(default)]
    pub ends_at: Option<i64>,
    /// Identity added to the companion on provisioning (event creator).
    #[serde(default)]
    pub creator_id: Option<String>,
}

impl Template {
    pub fn voice(id: impl Into<String>, name: impl Into<String>, parent: Option<&str>) -> Self {
        Self {
            id: id.into(),
            display_name: name.into(),
            parent_group_id: parent.map(String::from),
            kind: CompanionKind::VoiceRoom,
            is_terminal: false,
            ends_at: None,
            creator_id: None,
        }
    }

    pub fn event(id: impl Into<String>, name: impl Into<String>, ends_at: Option<i64>) -> Self {
        Self {
            id: id.into(),
            display_name: name.into(),
            parent_group_id: None,
            kind: CompanionKind::EventThread,
            is_terminal: false,
            ends_at,
            creator_id: None,
        }
    }
}

/// Durable template → companion record (active index).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingEntry {
    pub template_id: String,
    pub companion_id: String,
    pub kind: CompanionKind,
    pub companion_name: String,
    pub created_at: i64,
    pub ends_at: Option<i64>,
}

/// Locked companion retained for audit (archive index).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivedEntry {
    pub template_id: String,
    pub companion_id: String,
    pub kind: CompanionKind,
    pub companion_name: String,
    pub created_at: i64,
    pub archived_at: i64,
    pub reason: String,
}

/// Base voice channel registered to spawn duplicates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredTemplate {
    pub id: String,
    pub display_name: String,
    pub parent_group_id: Option<String>,
    pub created_at: i64,
}

impl RegisteredTemplate {
    pub fn to_template(&self) -> Template {
        Template::voice(
            self.id.clone(),
            self.display_name.clone(),
            self.parent_group_id.as_deref(),
        )
    }
}
