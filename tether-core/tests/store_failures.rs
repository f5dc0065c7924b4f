//! Store write failures after the platform already acted.

use std::sync::Arc;

use tether_core::gateway::InMemoryGateway;
use tether_core::types::{
    ArchivedEntry, LifecycleState, MappingEntry, MembershipKind, RegisteredTemplate, Template,
};
use tether_core::{
    Error, LifecycleConfig, LifecycleContext, LifecycleManager, MappingStore, Result,
    SqliteMappingStore,
};

/// Store whose `put` always fails.
struct ReadOnlyPuts {
    inner: SqliteMappingStore,
}

impl MappingStore for ReadOnlyPuts {
    fn get(&self, template_id: &str) -> Result<Option<MappingEntry>> {
        self.inner.get(template_id)
    }
    fn find_by_companion(&self, companion_id: &str) -> Result<Option<MappingEntry>> {
        self.inner.find_by_companion(companion_id)
    }
    fn put(&self, _entry: &MappingEntry) -> Result<()> {
        Err(Error::Other("disk full".into()))
    }
    fn set_ends_at(&self, template_id: &str, ends_at: Option<i64>) -> Result<bool> {
        self.inner.set_ends_at(template_id, ends_at)
    }
    fn delete(&self, template_id: &str) -> Result<bool> {
        self.inner.delete(template_id)
    }
    fn list(&self) -> Result<Vec<MappingEntry>> {
        self.inner.list()
    }
    fn archive(&self, template_id: &str, reason: &str) -> Result<Option<ArchivedEntry>> {
        self.inner.archive(template_id, reason)
    }
    fn get_archived(&self, template_id: &str) -> Result<Option<ArchivedEntry>> {
        self.inner.get_archived(template_id)
    }
    fn list_archived(&self) -> Result<Vec<ArchivedEntry>> {
        self.inner.list_archived()
    }
    fn register_template(&self, template: &RegisteredTemplate) -> Result<()> {
        self.inner.register_template(template)
    }
    fn unregister_template(&self, template_id: &str) -> Result<bool> {
        self.inner.unregister_template(template_id)
    }
    fn get_template(&self, template_id: &str) -> Result<Option<RegisteredTemplate>> {
        self.inner.get_template(template_id)
    }
    fn list_templates(&self) -> Result<Vec<RegisteredTemplate>> {
        self.inner.list_templates()
    }
    fn ping(&self) -> Result<()> {
        self.inner.ping()
    }
}

#[tokio::test]
async fn unrecorded_companion_is_deleted() {
    let store = Arc::new(ReadOnlyPuts {
        inner: SqliteMappingStore::open_in_memory().unwrap(),
    });
    let gateway = Arc::new(InMemoryGateway::new());
    let manager = LifecycleManager::new(LifecycleContext::new(
        store,
        gateway.clone(),
        LifecycleConfig::default(),
    ));

    let err = manager
        .on_template_created(&Template::event("e-1", "Raid Night", None))
        .await
        .unwrap_err();

    assert!(!err.is_recoverable());
    assert_eq!(gateway.call_count("create_companion"), 1);
    assert_eq!(gateway.call_count("delete_companion"), 1);
    assert!(gateway.companions_of("e-1").is_empty());
    assert_eq!(manager.state("e-1").unwrap(), LifecycleState::Idle);
}

#[tokio::test]
async fn stranded_room_is_deleted_by_sweep() {
    let store = Arc::new(ReadOnlyPuts {
        inner: SqliteMappingStore::open_in_memory().unwrap(),
    });
    store
        .register_template(&RegisteredTemplate {
            id: "t-1".into(),
            display_name: "Lounge".into(),
            parent_group_id: Some("cat-1".into()),
            created_at: 0,
        })
        .unwrap();
    let gateway = Arc::new(InMemoryGateway::new());
    gateway.fail_next("delete_companion", 1);
    let manager = LifecycleManager::new(LifecycleContext::new(
        store,
        gateway.clone(),
        LifecycleConfig::default(),
    ));

    manager
        .on_template_membership_trigger("t-1", MembershipKind::Joined, Some("u-1"))
        .await
        .unwrap_err();
    assert_eq!(gateway.companions_of("t-1").len(), 1);

    let report = manager.run_sweep().await.unwrap();

    assert_eq!(report.examined, 0);
    assert_eq!(report.orphans_deleted, 1);
    assert!(gateway.companions_of("t-1").is_empty());
}
