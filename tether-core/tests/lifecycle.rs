//! End-to-end behaviour of the lifecycle manager against the in-memory
//! platform and an SQLite store.

use std::sync::Arc;
use std::time::Duration;

use tether_core::gateway::{CompanionSnapshot, InMemoryGateway};
use tether_core::types::{
    ArchivedEntry, LifecycleState, MappingEntry, MembershipKind, RegisteredTemplate, Template,
};
use tether_core::{
    Error, LifecycleConfig, LifecycleContext, LifecycleManager, MappingStore, Outcome, Result,
    SqliteMappingStore,
};

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

struct Harness {
    manager: Arc<LifecycleManager>,
    gateway: Arc<InMemoryGateway>,
    store: Arc<SqliteMappingStore>,
}

impl Harness {
    fn new() -> Self {
        Self::with_config(LifecycleConfig::default())
    }

    fn with_config(config: LifecycleConfig) -> Self {
        let store = Arc::new(SqliteMappingStore::open_in_memory().unwrap());
        Self::with_store(store, config)
    }

    fn with_store(store: Arc<SqliteMappingStore>, config: LifecycleConfig) -> Self {
        let gateway = Arc::new(InMemoryGateway::new());
        let ctx = LifecycleContext::new(store.clone(), gateway.clone(), config);
        Self {
            manager: Arc::new(LifecycleManager::new(ctx)),
            gateway,
            store,
        }
    }

    fn register(&self, id: &str, name: &str) {
        self.store
            .register_template(&RegisteredTemplate {
                id: id.into(),
                display_name: name.into(),
                parent_group_id: Some("cat-1".into()),
                created_at: now_ms(),
            })
            .unwrap();
    }

    async fn join(&self, template_id: &str, member: &str) -> Result<Outcome> {
        self.manager
            .on_template_membership_trigger(template_id, MembershipKind::Joined, Some(member))
            .await
    }

    fn companion_id(&self, template_id: &str) -> String {
        self.store.get(template_id).unwrap().unwrap().companion_id
    }
}

fn live_companion(id: &str, name: &str) -> CompanionSnapshot {
    CompanionSnapshot {
        id: id.into(),
        name: name.into(),
        owner_template_id: Some("t-1".into()),
        parent_group_id: Some("cat-1".into()),
        members: Default::default(),
        locked: false,
        created_at: 0,
    }
}

#[tokio::test]
async fn concurrent_joins_create_one_room() {
    let h = Harness::new();
    h.register("t-1", "Lounge");
    h.gateway
        .set_delay("create_companion", Duration::from_millis(20));

    let mut tasks = Vec::new();
    for i in 0..10 {
        let manager = Arc::clone(&h.manager);
        tasks.push(tokio::spawn(async move {
            manager
                .on_template_membership_trigger(
                    "t-1",
                    MembershipKind::Joined,
                    Some(&format!("u-{}", i)),
                )
                .await
        }));
    }

    let mut provisioned = 0;
    for task in tasks {
        match task.await.unwrap().unwrap() {
            Outcome::Provisioned { .. } => provisioned += 1,
            Outcome::ConcurrentProvisionSuppressed { .. } | Outcome::MemberRouted { .. } => {}
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    assert_eq!(provisioned, 1);
    assert_eq!(h.gateway.companions_of("t-1").len(), 1);
    assert_eq!(h.gateway.call_count("create_companion"), 1);
    assert_eq!(h.store.list().unwrap().len(), 1);
}

#[tokio::test]
async fn concurrent_event_creations_create_one_thread() {
    let h = Harness::new();
    h.gateway
        .set_delay("create_companion", Duration::from_millis(20));
    let event = Template::event("e-1", "Raid Night", None);

    let tasks: Vec<_> = (0..10)
        .map(|_| {
            let manager = Arc::clone(&h.manager);
            let event = event.clone();
            tokio::spawn(async move { manager.on_template_created(&event).await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(h.gateway.companions_of("e-1").len(), 1);
}

#[tokio::test]
async fn trigger_during_provisioning_is_suppressed() {
    let h = Harness::new();
    h.register("t-1", "Lounge");
    h.gateway
        .set_delay("create_companion", Duration::from_millis(300));

    let manager = Arc::clone(&h.manager);
    let first = tokio::spawn(async move {
        manager
            .on_template_membership_trigger("t-1", MembershipKind::Joined, Some("u-1"))
            .await
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.manager.state("t-1").unwrap(), LifecycleState::Provisioning);

    let second = h.join("t-1", "u-2").await.unwrap();
    assert_eq!(
        second,
        Outcome::ConcurrentProvisionSuppressed {
            template_id: "t-1".into()
        }
    );

    assert!(matches!(
        first.await.unwrap().unwrap(),
        Outcome::Provisioned { .. }
    ));
    assert_eq!(h.manager.state("t-1").unwrap(), LifecycleState::Active);
}

#[tokio::test]
async fn naming_fills_lowest_gap() {
    let h = Harness::new();
    h.register("t-1", "Lounge");
    h.gateway.insert_companion(live_companion("x-1", "Lounge #1"));
    h.gateway.insert_companion(live_companion("x-3", "Lounge #3"));
    h.gateway.insert_companion(live_companion("x-9", "Lobby #2"));

    match h.join("t-1", "u-1").await.unwrap() {
        Outcome::Provisioned { name, .. } => assert_eq!(name, "Lounge #2"),
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[tokio::test]
async fn naming_appends_after_contiguous_run() {
    let h = Harness::new();
    h.register("t-1", "Lounge");
    h.gateway.insert_companion(live_companion("x-1", "Lounge #1"));
    h.gateway.insert_companion(live_companion("x-2", "Lounge #2"));

    match h.join("t-1", "u-1").await.unwrap() {
        Outcome::Provisioned { name, .. } => assert_eq!(name, "Lounge #3"),
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[tokio::test]
async fn reclaim_is_idempotent() {
    let h = Harness::new();
    h.register("t-1", "Lounge");
    h.join("t-1", "u-1").await.unwrap();
    let companion_id = h.companion_id("t-1");
    h.gateway.set_members(&companion_id, Vec::<String>::new());

    let first = h.manager.reclaim("t-1").await.unwrap();
    let second = h.manager.reclaim("t-1").await.unwrap();

    assert!(matches!(first, Outcome::Reclaimed { .. }));
    assert!(matches!(second, Outcome::Skipped { .. }));
    assert_eq!(h.gateway.call_count("delete_companion"), 1);
    assert_eq!(h.manager.state("t-1").unwrap(), LifecycleState::Idle);
}

#[tokio::test]
async fn replayed_empty_notification_is_harmless() {
    let h = Harness::new();
    h.register("t-1", "Lounge");
    h.join("t-1", "u-1").await.unwrap();
    let companion_id = h.companion_id("t-1");
    h.gateway.set_members(&companion_id, Vec::<String>::new());

    let first = h
        .manager
        .on_companion_membership_changed(&companion_id, 0)
        .await
        .unwrap();
    let replay = h
        .manager
        .on_companion_membership_changed(&companion_id, 0)
        .await
        .unwrap();

    assert!(matches!(first, Outcome::Reclaimed { .. }));
    assert!(matches!(replay, Outcome::Skipped { .. }));
    assert_eq!(h.gateway.call_count("delete_companion"), 1);
}

#[tokio::test]
async fn stale_count_hint_is_rechecked() {
    let h = Harness::new();
    h.register("t-1", "Lounge");
    h.join("t-1", "u-1").await.unwrap();
    let companion_id = h.companion_id("t-1");

    // The notification claims the room is empty, but u-1 is still inside.
    let outcome = h
        .manager
        .on_companion_membership_changed(&companion_id, 0)
        .await
        .unwrap();

    assert!(matches!(outcome, Outcome::Skipped { .. }));
    assert!(h.gateway.companion(&companion_id).is_some());
    assert_eq!(h.manager.state("t-1").unwrap(), LifecycleState::Active);
}

#[tokio::test]
async fn sweeper_locks_ended_events() {
    let h = Harness::new();
    let mut event = Template::event("e-1", "Raid Night", Some(now_ms() + 60_000));
    h.manager.on_template_created(&event).await.unwrap();
    let companion_id = h.companion_id("e-1");

    event.ends_at = Some(now_ms() - 1_000);
    h.manager.on_template_updated(&event).await.unwrap();

    let report = h.manager.run_sweep().await.unwrap();

    assert_eq!(report.locked, 1);
    assert_eq!(h.manager.state("e-1").unwrap(), LifecycleState::Locked);
    assert!(h.store.get("e-1").unwrap().is_none());
    let archived: ArchivedEntry = h.store.get_archived("e-1").unwrap().unwrap();
    assert_eq!(archived.companion_id, companion_id);
    assert!(h.gateway.companion(&companion_id).unwrap().locked);

    let again = h.manager.run_sweep().await.unwrap();
    assert_eq!(again.examined, 0);
}

#[tokio::test]
async fn subscribers_are_only_ever_added() {
    let h = Harness::new();
    h.manager
        .on_template_created(&Template::event("e-1", "Raid Night", None))
        .await
        .unwrap();
    let companion_id = h.companion_id("e-1");
    h.gateway.set_members(&companion_id, ["A", "B"]);

    h.gateway.set_subscribers("e-1", ["A", "B", "C"]);
    let report = h.manager.run_sweep().await.unwrap();
    assert_eq!(report.members_added, 1);

    h.gateway.set_subscribers("e-1", ["A"]);
    h.manager.run_sweep().await.unwrap();

    let members: Vec<String> = h
        .gateway
        .companion(&companion_id)
        .unwrap()
        .members
        .into_iter()
        .collect();
    assert_eq!(members, vec!["A", "B", "C"]);
    assert_eq!(h.gateway.call_count("remove_member"), 0);
}

#[tokio::test]
async fn explicit_unsubscribe_removes_member() {
    let h = Harness::new();
    h.manager
        .on_template_created(&Template::event("e-1", "Raid Night", None))
        .await
        .unwrap();
    let companion_id = h.companion_id("e-1");
    h.gateway.set_members(&companion_id, ["A", "B"]);

    h.manager.on_subscriber_removed("e-1", "B").await.unwrap();

    let companion = h.gateway.companion(&companion_id).unwrap();
    assert!(companion.has_member("A"));
    assert!(!companion.has_member("B"));
}

#[tokio::test]
async fn crash_between_delete_and_unmap_is_healed() {
    let h = Harness::new();
    h.register("t-1", "Lounge");
    h.join("t-1", "u-1").await.unwrap();
    let companion_id = h.companion_id("t-1");

    // Companion deleted on the platform, mapping never removed.
    h.gateway.remove_companion(&companion_id);

    let report = h.manager.run_sweep().await.unwrap();
    assert_eq!(report.stale_dropped, 1);
    assert_eq!(h.gateway.call_count("delete_companion"), 0);
    assert_eq!(h.manager.state("t-1").unwrap(), LifecycleState::Idle);
}

#[tokio::test]
async fn vanished_room_is_replaced_on_next_join() {
    let h = Harness::new();
    h.register("t-1", "Lounge");
    h.join("t-1", "u-1").await.unwrap();
    let first = h.companion_id("t-1");
    h.gateway.remove_companion(&first);

    let outcome = h.join("t-1", "u-2").await.unwrap();

    assert!(matches!(outcome, Outcome::Provisioned { .. }));
    assert_ne!(h.companion_id("t-1"), first);
}

#[tokio::test]
async fn gateway_timeout_reverts_to_idle() {
    let h = Harness::with_config(LifecycleConfig {
        adapter_timeout_ms: 50,
        ..Default::default()
    });
    h.register("t-1", "Lounge");
    h.gateway
        .set_delay("create_companion", Duration::from_secs(5));

    let err = h.join("t-1", "u-1").await.unwrap_err();

    assert!(err.is_timeout());
    assert_eq!(h.manager.state("t-1").unwrap(), LifecycleState::Idle);
    assert!(h.store.get("t-1").unwrap().is_none());
    assert!(h.gateway.companions_of("t-1").is_empty());
}

#[tokio::test]
async fn failed_delete_keeps_mapping() {
    let h = Harness::new();
    h.register("t-1", "Lounge");
    h.join("t-1", "u-1").await.unwrap();
    let companion_id = h.companion_id("t-1");
    h.gateway.set_members(&companion_id, Vec::<String>::new());
    h.gateway.fail_next("delete_companion", 1);

    let err = h.manager.reclaim("t-1").await.unwrap_err();

    assert!(matches!(err, Error::AdapterRejected { .. }));
    assert_eq!(h.manager.state("t-1").unwrap(), LifecycleState::Active);

    let report = h.manager.run_sweep().await.unwrap();
    assert_eq!(report.reclaimed, 1);
}

#[tokio::test]
async fn unregistered_voice_channel_is_ignored() {
    let h = Harness::new();

    let outcome = h.join("random-channel", "u-1").await.unwrap();

    assert_eq!(
        outcome,
        Outcome::Skipped {
            reason: "template not registered"
        }
    );
    assert_eq!(h.gateway.call_count("create_companion"), 0);
}

#[tokio::test]
async fn base_template_room_is_never_reclaimed() {
    let h = Harness::new();
    h.store
        .put(&MappingEntry {
            template_id: "t-1".into(),
            companion_id: "base".into(),
            kind: tether_core::types::CompanionKind::VoiceRoom,
            companion_name: "Lounge".into(),
            created_at: 0,
            ends_at: None,
        })
        .unwrap();
    h.gateway.insert_companion(live_companion("base", "Lounge"));

    let outcome = h.manager.reclaim("t-1").await.unwrap();

    assert_eq!(outcome, Outcome::Skipped { reason: "base resource" });
    assert!(h.gateway.companion("base").is_some());
}

#[tokio::test]
async fn mappings_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tether.db");

    let companion_id = {
        let store = Arc::new(SqliteMappingStore::open(&path).unwrap());
        let h = Harness::with_store(store, LifecycleConfig::default());
        h.register("t-1", "Lounge");
        h.join("t-1", "u-1").await.unwrap();
        h.companion_id("t-1")
    };

    let store = Arc::new(SqliteMappingStore::open(&path).unwrap());
    let h = Harness::with_store(store, LifecycleConfig::default());
    // The new platform model has never heard of the old companion.
    let report = h.manager.restore().await.unwrap();
    assert_eq!(report.loaded, 1);
    assert_eq!(report.dropped, 1);

    assert!(h.store.get_template("t-1").unwrap().is_some());
    assert!(h.store.get("t-1").unwrap().is_none());
    assert!(h.gateway.companion(&companion_id).is_none());
}
