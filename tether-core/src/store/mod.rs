//! Persistent mapping store.
//!
//! Durable `template → companion` records (active index), the archive of
//! locked companions, and the registry of base voice templates.
//!
//! The store only persists; single-writer-per-key discipline is enforced by
//! the lifecycle manager, which performs every mutation under the template's
//! key lock.

mod sqlite;

pub use sqlite::SqliteMappingStore;

use crate::error::Result;
use crate::types::{ArchivedEntry, MappingEntry, RegisteredTemplate};

/// Storage backend for companion mappings.
pub trait MappingStore: Send + Sync {
    /// Active mapping for a template.
    fn get(&self, template_id: &str) -> Result<Option<MappingEntry>>;

    /// Reverse lookup: the active mapping owning a companion.
    fn find_by_companion(&self, companion_id: &str) -> Result<Option<MappingEntry>>;

    /// Insert or replace the active mapping for `entry.template_id`.
    fn put(&self, entry: &MappingEntry) -> Result<()>;

    /// Update the recorded end time. Returns false if no mapping exists.
    fn set_ends_at(&self, template_id: &str, ends_at: Option<i64>) -> Result<bool>;

    /// Delete the active mapping. Returns false if none existed.
    fn delete(&self, template_id: &str) -> Result<bool>;

    /// All active mappings.
    fn list(&self) -> Result<Vec<MappingEntry>>;

    /// Move the active mapping to the archive index in one step.
    fn archive(&self, template_id: &str, reason: &str) -> Result<Option<ArchivedEntry>>;

    /// Most recent archived entry for a template.
    fn get_archived(&self, template_id: &str) -> Result<Option<ArchivedEntry>>;

    /// All archived entries, newest first.
    fn list_archived(&self) -> Result<Vec<ArchivedEntry>>;

    /// Register a base voice template.
    fn register_template(&self, template: &RegisteredTemplate) -> Result<()>;

    /// Remove a base voice template. Returns false if it was not registered.
    fn unregister_template(&self, template_id: &str) -> Result<bool>;

    /// Look up a registered template.
    fn get_template(&self, template_id: &str) -> Result<Option<RegisteredTemplate>>;

    /// All registered templates.
    fn list_templates(&self) -> Result<Vec<RegisteredTemplate>>;

    /// Check store connectivity.
    fn ping(&self) -> Result<()>;
}
