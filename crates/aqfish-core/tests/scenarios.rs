//! End-to-end scenarios against a single node, driven entirely through
//! `aqfish-core`'s public surface: a real `InMemoryStore`, a real
//! `DriverRegistry` with the in-memory `TestDriver`, and `PickupLoop::tick`.
//! These correspond to the single-node properties of §8.

use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use aqfish_config::{Config, DriverConfig, DriversConfig, ElectionConfig};
use aqfish_core::{ApplicationMailbox, PickupLoop};
use aqfish_domain::{
    Application, ApplicationStatus, ApplicationUid, Definition, Label, LabelUid, NodeUid,
    ResourceRequest,
};
use aqfish_driver::{DriverRegistry, TestDriver};
use aqfish_store::{InMemoryStore, StateStore};

fn config(driver_cpu_limit: Option<u32>, driver_ram_limit: Option<u32>) -> Config {
    let mut providers = HashMap::new();
    providers.insert(
        "test".to_string(),
        DriverConfig {
            cpu_limit: driver_cpu_limit,
            ram_limit: driver_ram_limit,
            is_remote: false,
            fail_allocate: false,
            delay_available_capacity: None,
            options: serde_json::Value::Null,
        },
    );
    Config {
        node_name: "n1".into(),
        node_location: "local".into(),
        api_address: "127.0.0.1:0".into(),
        cluster_auto: false,
        disable_auth: true,
        db_cleanup_interval: Duration::from_secs(3600),
        cleanup_startup_grace: Duration::from_secs(0),
        label_remove_at_max: Duration::from_secs(3600),
        node_slots_limit: None,
        allocation_retry: 2,
        cpu_limit: None,
        mem_target: None,
        drivers: DriversConfig { gates: HashMap::new(), providers },
        election: ElectionConfig {
            vote_window: Duration::from_millis(0),
            retry_backoff: Duration::from_millis(10),
        },
    }
}

fn label_with(uid_seed: u8, cpu: u32, ram: u32) -> Label {
    Label {
        uid: LabelUid::new_derived([uid_seed; 6]),
        name: format!("label-{uid_seed}"),
        version: 1,
        owner_name: "alice".into(),
        visible_for: vec![],
        remove_at: None,
        definitions: vec![Definition {
            provider: "test".into(),
            instance: None,
            resources: ResourceRequest { cpu, ram, disks: 0 },
            options: serde_json::Value::Null,
        }],
        created_at: chrono::Utc::now(),
    }
}

async fn new_application(
    store: &Arc<dyn StateStore>,
    mailbox: &Arc<ApplicationMailbox>,
    label: &Label,
    uid_seed: u8,
) -> Application {
    let app = Application {
        uid: ApplicationUid::new_derived([uid_seed; 6]),
        label_uid: label.uid,
        owner_name: "alice".into(),
        metadata: serde_json::Value::Null,
        created_at: chrono::Utc::now(),
    };
    store.upsert_application(&app).await.unwrap();
    mailbox
        .append_validated(store, app.uid, ApplicationStatus::New, [uid_seed; 6], "created")
        .await
        .unwrap();
    app
}

fn registry() -> Arc<DriverRegistry> {
    let mut registry = DriverRegistry::new();
    registry.register("test", Arc::new(TestDriver::new("default")));
    Arc::new(registry)
}

/// §8 scenario 1: single node, one Application reaches ALLOCATED with a
/// resource, then DEALLOCATED with the resource released.
#[tokio::test]
async fn simple_allocate_then_deallocate() {
    let store: Arc<dyn StateStore> = Arc::new(InMemoryStore::new());
    let node_uid = NodeUid::new_derived([1; 6]);
    let label = label_with(1, 1, 2);
    store.upsert_label(&label).await.unwrap();
    let mailbox = Arc::new(ApplicationMailbox::new());
    let app = new_application(&store, &mailbox, &label, 1).await;

    let maintenance = Arc::new(AtomicBool::new(false));
    let pickup = PickupLoop::new(store.clone(), registry(), &config(None, None), node_uid, maintenance, mailbox.clone());

    pickup.tick().await.unwrap();
    assert_eq!(store.current_status(&app.uid).await.unwrap(), Some(ApplicationStatus::Allocated));
    let resource = store.get_application_resource(&app.uid).await.unwrap();
    assert!(resource.is_some() && !resource.unwrap().identifier.is_empty());

    mailbox
        .append_validated(&store, app.uid, ApplicationStatus::Deallocate, [1; 6], "release requested")
        .await
        .unwrap();
    pickup.tick().await.unwrap();
    assert_eq!(store.current_status(&app.uid).await.unwrap(), Some(ApplicationStatus::Deallocated));
    assert!(store.get_application_resource(&app.uid).await.unwrap().is_none());
}

/// §8 scenario 2: node capacity `{cpu:4,ram:8}`, three Applications each
/// requesting `{cpu:2,ram:4}` — only two can fit, the third is left in NEW.
#[tokio::test]
async fn three_applications_with_a_capacity_limit() {
    let store: Arc<dyn StateStore> = Arc::new(InMemoryStore::new());
    let node_uid = NodeUid::new_derived([2; 6]);
    let label = label_with(2, 2, 4);
    store.upsert_label(&label).await.unwrap();
    let mailbox = Arc::new(ApplicationMailbox::new());

    let app_a = new_application(&store, &mailbox, &label, 10).await;
    let app_b = new_application(&store, &mailbox, &label, 11).await;
    let app_c = new_application(&store, &mailbox, &label, 12).await;

    let maintenance = Arc::new(AtomicBool::new(false));
    let pickup = PickupLoop::new(
        store.clone(),
        registry(),
        &config(Some(4), Some(8)),
        node_uid,
        maintenance,
        mailbox.clone(),
    );

    for _ in 0..3 {
        pickup.tick().await.unwrap();
    }

    let mut statuses = Vec::new();
    for app in [&app_a, &app_b, &app_c] {
        statuses.push(store.current_status(&app.uid).await.unwrap().unwrap());
    }
    let allocated = statuses.iter().filter(|s| **s == ApplicationStatus::Allocated).count();
    let still_new = statuses.iter().filter(|s| **s == ApplicationStatus::New).count();
    assert_eq!(allocated, 2, "only two of three should fit in cpu:4,ram:8");
    assert_eq!(still_new, 1);
}

/// §8 scenario 3: a Label requesting more than the node's limit never gets
/// elected; deallocating it while still NEW moves it straight to RECALLED.
#[tokio::test]
async fn a_label_too_big_for_the_node_is_recalled_without_ever_allocating() {
    let store: Arc<dyn StateStore> = Arc::new(InMemoryStore::new());
    let node_uid = NodeUid::new_derived([3; 6]);
    let label = label_with(3, 5, 9);
    store.upsert_label(&label).await.unwrap();
    let mailbox = Arc::new(ApplicationMailbox::new());
    let app = new_application(&store, &mailbox, &label, 13).await;

    let maintenance = Arc::new(AtomicBool::new(false));
    let pickup = PickupLoop::new(
        store.clone(),
        registry(),
        &config(Some(4), Some(8)),
        node_uid,
        maintenance,
        mailbox.clone(),
    );

    for _ in 0..3 {
        pickup.tick().await.unwrap();
    }
    assert_eq!(store.current_status(&app.uid).await.unwrap(), Some(ApplicationStatus::New));

    mailbox
        .append_validated(&store, app.uid, ApplicationStatus::Recalled, [3; 6], "never owned")
        .await
        .unwrap();
    assert_eq!(store.current_status(&app.uid).await.unwrap(), Some(ApplicationStatus::Recalled));
}

/// §8 scenario 6: a node in maintenance casts no available vote, so an
/// Application stays NEW; once maintenance lifts, a later Application
/// allocates normally on the same node.
#[tokio::test]
async fn maintenance_gates_elections_until_lifted() {
    let store: Arc<dyn StateStore> = Arc::new(InMemoryStore::new());
    let node_uid = NodeUid::new_derived([4; 6]);
    let label = label_with(4, 1, 1);
    store.upsert_label(&label).await.unwrap();
    let mailbox = Arc::new(ApplicationMailbox::new());
    let gated = new_application(&store, &mailbox, &label, 14).await;

    let maintenance = Arc::new(AtomicBool::new(true));
    let pickup = PickupLoop::new(
        store.clone(),
        registry(),
        &config(None, None),
        node_uid,
        maintenance.clone(),
        mailbox.clone(),
    );

    for _ in 0..3 {
        pickup.tick().await.unwrap();
    }
    assert_eq!(store.current_status(&gated.uid).await.unwrap(), Some(ApplicationStatus::New));

    maintenance.store(false, std::sync::atomic::Ordering::Relaxed);
    let after_lift = new_application(&store, &mailbox, &label, 15).await;
    pickup.tick().await.unwrap();
    assert_eq!(store.current_status(&after_lift.uid).await.unwrap(), Some(ApplicationStatus::Allocated));
    assert_eq!(store.current_status(&gated.uid).await.unwrap(), Some(ApplicationStatus::New));
}
