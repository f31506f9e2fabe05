//! End-to-end reconciliation properties against the SQLite store

use std::sync::Arc;
use std::time::Duration;

use larder_core::remote::memory::Operation;
use larder_core::remote::{RemoteItem, RemoteLocation};
use larder_core::sync::{EntityReconciler, ItemStrategy, KindCounters, LocationStrategy};
use larder_core::{
    BearerToken, CancelToken, InMemoryRemote, LocalStore, Location, SqliteStore, StorageItem,
    SyncOrchestrator, SyncState, SyncStatus, User, UserStore,
};
use tempfile::TempDir;

const EMAIL: &str = "cook@example.com";

struct Harness {
    _dir: TempDir,
    store: Arc<SqliteStore>,
    remote: Arc<InMemoryRemote>,
    orchestrator: SyncOrchestrator<SqliteStore, InMemoryRemote>,
}

impl Harness {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(SqliteStore::open_path(&dir.path().join("larder.db")).unwrap());
        store.log_in(&User::demo(EMAIL, "Cook")).unwrap();
        let remote = Arc::new(InMemoryRemote::with_user(EMAIL));
        let orchestrator = SyncOrchestrator::new(store.clone(), remote.clone());
        Self {
            _dir: dir,
            store,
            remote,
            orchestrator,
        }
    }

    fn add_location(&self, name: &str) -> Location {
        let mut location = Location::new(EMAIL, name);
        LocalStore::<Location>::upsert(&*self.store, &mut location, SyncState::Pending).unwrap();
        location
    }

    fn add_item(&self, location: &Location, name: &str) -> StorageItem {
        let mut item = StorageItem::new(EMAIL, location.local_id, name);
        LocalStore::<StorageItem>::upsert(&*self.store, &mut item, SyncState::Pending).unwrap();
        item
    }

    fn location(&self, location: &Location) -> Location {
        LocalStore::<Location>::get(&*self.store, location.local_id)
            .unwrap()
            .unwrap()
    }

    fn item(&self, item: &StorageItem) -> StorageItem {
        LocalStore::<StorageItem>::get(&*self.store, item.local_id)
            .unwrap()
            .unwrap()
    }

    fn local_record_count(&self) -> usize {
        LocalStore::<Location>::list_active(&*self.store, EMAIL)
            .unwrap()
            .len()
            + LocalStore::<StorageItem>::list_active(&*self.store, EMAIL)
                .unwrap()
                .len()
    }
}

#[tokio::test]
async fn second_run_without_changes_uploads_nothing() {
    let h = Harness::new();
    let pantry = h.add_location("Pantry");
    h.add_item(&pantry, "Rice");
    h.remote.seed(RemoteLocation {
        id: "r-garage".into(),
        name: "Garage".into(),
        ..Default::default()
    });

    let first = h.orchestrator.run_sync(EMAIL).await;
    assert!(first.success, "{}", first.message);
    let records_after_first = h.local_record_count();
    h.remote.clear_calls();

    let second = h.orchestrator.run_sync(EMAIL).await;
    assert!(second.success, "{}", second.message);
    assert_eq!(second.uploaded(), 0);
    assert_eq!(h.local_record_count(), records_after_first);
    assert_eq!(h.remote.write_count(), 0);
}

#[tokio::test]
async fn pending_local_edit_wins_over_remote_values() {
    let h = Harness::new();
    let mut pantry = h.add_location("Pantry");
    LocalStore::<Location>::mark_synced(&*h.store, pantry.local_id, Some("r-1")).unwrap();
    pantry = h.location(&pantry);
    pantry.set_description("Left of the stove");
    LocalStore::<Location>::upsert(&*h.store, &mut pantry, SyncState::Pending).unwrap();

    h.remote.seed(RemoteLocation {
        id: "r-1".into(),
        name: "Renamed elsewhere".into(),
        description: "Somewhere else".into(),
        user_id: EMAIL.into(),
    });

    let outcome = h.orchestrator.run_sync(EMAIL).await;
    assert!(outcome.success, "{}", outcome.message);

    let stored = h.location(&pantry);
    assert_eq!(stored.name, "Pantry");
    assert_eq!(stored.description, "Left of the stove");
    assert_eq!(stored.sync_state, SyncState::Synced);
    assert_eq!(stored.remote_id(), Some("r-1"));
}

#[tokio::test]
async fn item_is_pushed_once_its_location_has_a_remote_id() {
    let h = Harness::new();
    let pantry = h.add_location("Pantry");
    let rice = h.add_item(&pantry, "Rice");

    let token = BearerToken::new("demo_token").unwrap();
    let cancel = CancelToken::new();
    let reconciler = EntityReconciler::new(&*h.store, &*h.remote, &token, EMAIL, &cancel);

    // Items first: the location has no remote id yet
    let strategy = ItemStrategy::build(&*h.store, EMAIL).unwrap();
    let mut counters = KindCounters::default();
    reconciler
        .reconcile::<StorageItem, _>(&strategy, &mut counters)
        .await
        .unwrap();
    assert_eq!(counters.uploaded, 1);
    assert_eq!(h.remote.count("items", Operation::Create), 0);
    assert_eq!(h.item(&rice).sync_state, SyncState::Pending);

    let mut counters = KindCounters::default();
    reconciler
        .reconcile::<Location, _>(&LocationStrategy, &mut counters)
        .await
        .unwrap();
    assert!(h.location(&pantry).remote_id().is_some());

    let strategy = ItemStrategy::build(&*h.store, EMAIL).unwrap();
    let mut counters = KindCounters::default();
    reconciler
        .reconcile::<StorageItem, _>(&strategy, &mut counters)
        .await
        .unwrap();

    let stored = h.item(&rice);
    assert_eq!(stored.sync_state, SyncState::Synced);
    let remote_items = h.remote.records::<RemoteItem>();
    assert_eq!(remote_items.len(), 1);
    assert_eq!(stored.remote_id(), Some(remote_items[0].id.as_str()));
}

#[tokio::test]
async fn item_left_behind_by_failed_location_push_follows_next_run() {
    let h = Harness::new();
    let pantry = h.add_location("Pantry");
    let rice = h.add_item(&pantry, "Rice");
    h.remote.fail_on("locations", Operation::Create, 1);

    let failed = h.orchestrator.run_sync(EMAIL).await;
    assert!(!failed.success);
    assert_eq!(h.item(&rice).sync_state, SyncState::Pending);

    let retried = h.orchestrator.run_sync(EMAIL).await;
    assert!(retried.success, "{}", retried.message);
    assert_eq!(h.item(&rice).sync_state, SyncState::Synced);
    assert_eq!(h.remote.records::<RemoteItem>().len(), 1);
}

#[tokio::test]
async fn discovered_records_get_exactly_one_shadow() {
    let h = Harness::new();
    h.remote.seed(RemoteLocation {
        id: "r-cellar".into(),
        name: "Cellar".into(),
        ..Default::default()
    });
    h.remote.seed(RemoteItem {
        id: "r-wine".into(),
        name: "Wine".into(),
        location_id: "r-cellar".into(),
        ..Default::default()
    });

    for _ in 0..3 {
        let outcome = h.orchestrator.run_sync(EMAIL).await;
        assert!(outcome.success, "{}", outcome.message);
        assert_eq!(outcome.downloaded(), 2);
    }

    let locations = LocalStore::<Location>::list_active(&*h.store, EMAIL).unwrap();
    assert_eq!(locations.len(), 1);
    assert_eq!(locations[0].remote_id(), Some("r-cellar"));

    let items = h.store.list_active_items_with_location_names(EMAIL).unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].remote_id(), Some("r-wine"));
    assert_eq!(items[0].location_name.as_deref(), Some("Cellar"));
    assert_eq!(h.remote.write_count(), 0);
}

#[tokio::test]
async fn pushed_tombstone_is_synced_and_kept() {
    let h = Harness::new();
    let pantry = h.add_location("Pantry");
    let rice = h.add_item(&pantry, "Rice");
    assert!(h.orchestrator.run_sync(EMAIL).await.success);

    LocalStore::<StorageItem>::mark_deleted_locally(&*h.store, rice.local_id).unwrap();
    let outcome = h.orchestrator.run_sync(EMAIL).await;
    assert!(outcome.success, "{}", outcome.message);
    assert_eq!(outcome.items_uploaded, 1);
    assert!(h.remote.records::<RemoteItem>().is_empty());

    let stored = h.item(&rice);
    assert!(stored.tombstoned);
    assert_eq!(stored.sync_state, SyncState::Synced);
    assert!(LocalStore::<StorageItem>::list_active(&*h.store, EMAIL)
        .unwrap()
        .is_empty());

    // Nothing left to do on the next run
    assert_eq!(h.orchestrator.run_sync(EMAIL).await.uploaded(), 0);
}

#[tokio::test]
async fn counts_new_and_edited_locations() {
    let h = Harness::new();
    let fresh = h.add_location("Freezer");

    let mut edited = h.add_location("Pantry");
    LocalStore::<Location>::mark_synced(&*h.store, edited.local_id, Some("r-pantry")).unwrap();
    edited = h.location(&edited);
    edited.set_name("Walk-in pantry");
    LocalStore::<Location>::upsert(&*h.store, &mut edited, SyncState::Pending).unwrap();

    let outcome = h.orchestrator.run_sync(EMAIL).await;
    assert!(outcome.success, "{}", outcome.message);
    assert_eq!(outcome.locations_uploaded, 2);
    assert_eq!(outcome.locations_downloaded, 0);

    let fresh = h.location(&fresh);
    let edited = h.location(&edited);
    assert_eq!(fresh.sync_state, SyncState::Synced);
    assert_eq!(edited.sync_state, SyncState::Synced);
    assert!(fresh.remote_id().is_some_and(|id| !id.is_empty()));
    assert_eq!(edited.remote_id(), Some("r-pantry"));
}

#[tokio::test]
async fn cancelling_mid_run_keeps_completed_records() {
    let h = Harness::new();
    let first = h.add_location("First");
    let second = h.add_location("Second");

    let cancel = CancelToken::new();
    let trigger = cancel.clone();
    h.remote.on_call(move |call| {
        if call.operation == Operation::Create {
            trigger.cancel();
        }
    });

    let outcome = h.orchestrator.run_sync_cancellable(EMAIL, &cancel).await;
    assert!(!outcome.success);
    assert_eq!(outcome.message, "Sync cancelled");
    assert_eq!(outcome.locations_uploaded, 2);
    assert_eq!(h.location(&first).sync_state, SyncState::Synced);
    assert_eq!(h.location(&second).sync_state, SyncState::Pending);
    assert!(h.store.current_user().unwrap().unwrap().last_sync_at.is_none());
}

#[tokio::test]
async fn concurrent_runs_do_not_double_create() {
    let h = Harness::new();
    h.add_location("Pantry");
    h.remote.set_latency(Duration::from_millis(20));

    let mut status = h.orchestrator.subscribe_status();
    let (first, second) = tokio::join!(h.orchestrator.run_sync(EMAIL), async {
        status
            .wait_for(|s| *s == SyncStatus::Running)
            .await
            .unwrap();
        h.orchestrator.run_sync(EMAIL).await
    });

    assert!(first.success, "{}", first.message);
    assert_eq!(second.message, "Sync already in progress");
    assert_eq!(h.remote.records::<RemoteLocation>().len(), 1);
}
