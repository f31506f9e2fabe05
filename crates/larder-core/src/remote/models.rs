//! Wire types for the remote inventory service
//!
//! The server identifies records by `_id` and their owner by `user_id`.
//! Missing fields deserialize as empty strings.

use serde::{Deserialize, Serialize};

use super::RemoteRecord;

/// A location as the server returns it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteLocation {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub description: String,
    pub user_id: String,
}

/// An item as the server returns it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteItem {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub brand: String,
    pub size: String,
    pub nutritional_info: String,
    pub date_purchased: String,
    pub expiration_date: String,
    pub ingredients: String,
    pub other_info: String,
    /// Server id of the holding location
    pub location_id: String,
    pub user_id: String,
}

/// Body of `POST /locations/add` and `POST /locations/{id}/edit`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationPayload {
    pub name: String,
    pub description: String,
}

/// Body of `POST /items/add` and `POST /items/{id}/edit`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemPayload {
    pub name: String,
    pub brand: String,
    pub size: String,
    pub nutritional_info: String,
    pub date_purchased: String,
    pub expiration_date: String,
    pub ingredients: String,
    pub other_info: String,
    pub location_id: String,
}

impl RemoteRecord for RemoteLocation {
    type Payload = LocationPayload;
    const COLLECTION: &'static str = "locations";

    fn remote_id(&self) -> &str {
        &self.id
    }
}

impl RemoteRecord for RemoteItem {
    type Payload = ItemPayload;
    const COLLECTION: &'static str = "items";

    fn remote_id(&self) -> &str {
        &self.id
    }
}
