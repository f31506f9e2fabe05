//! Data models for Larder
//!
//! Defines the core data structures: Location, StorageItem and User.
//! Every locally mutated record carries a `SyncState` so the reconciler can
//! find what still has to be pushed to the remote service.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Token assigned by the demo login flow
pub const DEMO_TOKEN: &str = "demo_token";

/// Whether a record has unpushed local mutations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    /// Local mutations exist that the remote service has not seen
    Pending,
    /// Local and remote agree (as far as this device knows)
    Synced,
}

impl SyncState {
    /// Persisted text form
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Pending => "pending",
            SyncState::Synced => "synced",
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SyncState::Pending),
            "synced" => Ok(SyncState::Synced),
            other => Err(format!("unknown sync state '{}'", other)),
        }
    }
}

/// The two entity kinds that get reconciled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Location,
    StorageItem,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Location => f.write_str("location"),
            EntityKind::StorageItem => f.write_str("item"),
        }
    }
}

/// Treat an empty server id the same as no id at all
fn non_empty(id: &Option<String>) -> Option<&str> {
    id.as_deref().filter(|s| !s.is_empty())
}

/// A place where items are stored (pantry shelf, freezer, garage box...)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Location {
    /// Stable local key, generated on creation
    pub local_id: Uuid,
    /// Identifier assigned by the remote service
    pub remote_id: Option<String>,
    pub name: String,
    pub description: String,
    /// Owning user
    pub owner_id: String,
    pub sync_state: SyncState,
    pub last_modified: DateTime<Utc>,
    /// Soft-delete marker; tombstones are never purged
    pub tombstoned: bool,
}

impl Location {
    /// Create a new, not yet pushed location
    pub fn new(owner_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            local_id: Uuid::new_v4(),
            remote_id: None,
            name: name.into(),
            description: String::new(),
            owner_id: owner_id.into(),
            sync_state: SyncState::Pending,
            last_modified: Utc::now(),
            tombstoned: false,
        }
    }

    /// Server id, if one has been assigned
    pub fn remote_id(&self) -> Option<&str> {
        non_empty(&self.remote_id)
    }

    /// Update the name
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
        self.touch();
    }

    /// Update the description
    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = description.into();
        self.touch();
    }

    /// Whether local mutations are waiting to be pushed
    pub fn is_pending(&self) -> bool {
        self.sync_state == SyncState::Pending
    }

    fn touch(&mut self) {
        self.sync_state = SyncState::Pending;
        self.last_modified = Utc::now();
    }
}

/// Something kept in a location
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageItem {
    pub local_id: Uuid,
    pub remote_id: Option<String>,
    pub name: String,
    pub brand: String,
    pub size: String,
    pub nutritional_info: String,
    pub date_purchased: String,
    pub expiration_date: String,
    pub ingredients: String,
    pub other_info: String,
    /// Local id of the location holding this item
    pub location_local_id: Uuid,
    pub owner_id: String,
    pub sync_state: SyncState,
    pub last_modified: DateTime<Utc>,
    pub tombstoned: bool,
    /// Display-only; never persisted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_name: Option<String>,
}

impl StorageItem {
    /// Create a new, not yet pushed item in the given location
    pub fn new(
        owner_id: impl Into<String>,
        location_local_id: Uuid,
        name: impl Into<String>,
    ) -> Self {
        Self {
            local_id: Uuid::new_v4(),
            remote_id: None,
            name: name.into(),
            brand: String::new(),
            size: String::new(),
            nutritional_info: String::new(),
            date_purchased: String::new(),
            expiration_date: String::new(),
            ingredients: String::new(),
            other_info: String::new(),
            location_local_id,
            owner_id: owner_id.into(),
            sync_state: SyncState::Pending,
            last_modified: Utc::now(),
            tombstoned: false,
            location_name: None,
        }
    }

    /// Server id, if one has been assigned
    pub fn remote_id(&self) -> Option<&str> {
        non_empty(&self.remote_id)
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
        self.touch();
    }

    pub fn set_brand(&mut self, brand: impl Into<String>) {
        self.brand = brand.into();
        self.touch();
    }

    pub fn set_size(&mut self, size: impl Into<String>) {
        self.size = size.into();
        self.touch();
    }

    pub fn set_nutritional_info(&mut self, info: impl Into<String>) {
        self.nutritional_info = info.into();
        self.touch();
    }

    pub fn set_date_purchased(&mut self, date: impl Into<String>) {
        self.date_purchased = date.into();
        self.touch();
    }

    pub fn set_expiration_date(&mut self, date: impl Into<String>) {
        self.expiration_date = date.into();
        self.touch();
    }

    pub fn set_ingredients(&mut self, ingredients: impl Into<String>) {
        self.ingredients = ingredients.into();
        self.touch();
    }

    pub fn set_other_info(&mut self, info: impl Into<String>) {
        self.other_info = info.into();
        self.touch();
    }

    /// Move the item to another location
    pub fn move_to(&mut self, location_local_id: Uuid) {
        self.location_local_id = location_local_id;
        self.location_name = None;
        self.touch();
    }

    /// Whether local mutations are waiting to be pushed
    pub fn is_pending(&self) -> bool {
        self.sync_state == SyncState::Pending
    }

    fn touch(&mut self) {
        self.sync_state = SyncState::Pending;
        self.last_modified = Utc::now();
    }
}

/// A user known to this device
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    /// Bearer credential for the remote service
    pub access_token: Option<String>,
    pub token_expiry: Option<DateTime<Utc>>,
    pub is_logged_in: bool,
    pub last_sync_at: Option<DateTime<Utc>>,
}

impl User {
    /// Create a logged-out user record
    pub fn new(id: impl Into<String>, email: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            name: name.into(),
            access_token: None,
            token_expiry: None,
            is_logged_in: false,
            last_sync_at: None,
        }
    }

    /// Demo login without an identity provider
    ///
    /// The email doubles as the user id; the token is valid for 30 days.
    pub fn demo(email: impl Into<String>, name: impl Into<String>) -> Self {
        let email = email.into();
        let mut user = Self::new(email.clone(), email, name);
        user.access_token = Some(DEMO_TOKEN.to_string());
        user.token_expiry = Some(Utc::now() + Duration::days(30));
        user.is_logged_in = true;
        user
    }

    /// The access token, if present and non-empty
    pub fn credential(&self) -> Option<&str> {
        non_empty(&self.access_token)
    }
}
