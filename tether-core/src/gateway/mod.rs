//! Platform gateway boundary.
//!
//! The lifecycle manager never talks to the chat platform directly; every
//! mutation and lookup goes through a [`Gateway`]. Implementations:
//!
//! - [`HttpGateway`]: thin client to the platform bridge process
//! - [`InMemoryGateway`]: in-process platform model (tests, dry runs)
//! - [`TimedGateway`]: decorator bounding every call with a timeout

#[cfg(feature = "client")]
mod http;
mod memory;
mod timed;

#[cfg(feature = "client")]
pub use http::HttpGateway;
pub use memory::InMemoryGateway;
pub use timed::TimedGateway;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::Result;
use crate::types::CompanionKind;

/// Where and how a companion should be created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub kind: CompanionKind,
    /// Category (voice rooms) or parent channel (threads).
    pub parent_group_id: Option<String>,
}

/// Live view of a companion as reported by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanionSnapshot {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub owner_template_id: Option<String>,
    #[serde(default)]
    pub parent_group_id: Option<String>,
    #[serde(default)]
    pub members: BTreeSet<String>,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub created_at: i64,
}

impl CompanionSnapshot {
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn has_member(&self, identity_id: &str) -> bool {
        self.members.contains(identity_id)
    }
}

/// Operations the lifecycle manager needs from the platform.
///
/// `delete_companion` on an unknown id returns `Error::NotFound`;
/// `fetch_companion` reports a missing companion as `Ok(None)`.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Create a companion and return its platform id.
    async fn create_companion(
        &self,
        template_id: &str,
        name: &str,
        placement: &Placement,
    ) -> Result<String>;

    /// Delete a companion.
    async fn delete_companion(&self, companion_id: &str) -> Result<()>;

    /// Fetch a fresh snapshot of a companion.
    async fn fetch_companion(&self, companion_id: &str) -> Result<Option<CompanionSnapshot>>;

    /// List the live companions placed under a group (naming rescan).
    async fn list_companions(&self, parent_group_id: Option<&str>)
        -> Result<Vec<CompanionSnapshot>>;

    /// Add (or move) an identity into a companion.
    async fn add_member(&self, companion_id: &str, identity_id: &str) -> Result<()>;

    /// Remove an identity from a companion.
    async fn remove_member(&self, companion_id: &str, identity_id: &str) -> Result<()>;

    /// Freeze a companion read-only.
    async fn lock_companion(&self, companion_id: &str, reason: &str) -> Result<()>;

    /// Identities subscribed to a template.
    async fn list_subscribers(&self, template_id: &str) -> Result<BTreeSet<String>>;
}
