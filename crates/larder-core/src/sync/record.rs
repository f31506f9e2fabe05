//! Local records the reconciler can push and pull

use uuid::Uuid;

use crate::models::{EntityKind, Location, StorageItem, SyncState};
use crate::remote::{RemoteItem, RemoteLocation, RemoteRecord};

/// A locally stored record paired with its remote representation
pub trait SyncRecord: Clone + Send + Sync + 'static {
    const KIND: EntityKind;

    /// What the server stores for this kind
    type Remote: RemoteRecord;

    fn local_id(&self) -> Uuid;
    fn remote_id(&self) -> Option<&str>;
    fn sync_state(&self) -> SyncState;
    fn is_tombstoned(&self) -> bool;
}

impl SyncRecord for Location {
    const KIND: EntityKind = EntityKind::Location;
    type Remote = RemoteLocation;

    fn local_id(&self) -> Uuid {
        self.local_id
    }

    fn remote_id(&self) -> Option<&str> {
        Location::remote_id(self)
    }

    fn sync_state(&self) -> SyncState {
        self.sync_state
    }

    fn is_tombstoned(&self) -> bool {
        self.tombstoned
    }
}

impl SyncRecord for StorageItem {
    const KIND: EntityKind = EntityKind::StorageItem;
    type Remote = RemoteItem;

    fn local_id(&self) -> Uuid {
        self.local_id
    }

    fn remote_id(&self) -> Option<&str> {
        StorageItem::remote_id(self)
    }

    fn sync_state(&self) -> SyncState {
        self.sync_state
    }

    fn is_tombstoned(&self) -> bool {
        self.tombstoned
    }
}
