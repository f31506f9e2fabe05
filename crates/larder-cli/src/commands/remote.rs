//! Direct remote queries, bypassing the local store

use anyhow::{bail, Context, Result};

use larder_core::remote::{RemoteCollection, RemoteItem, RemoteLocation, RemoteRecord};
use larder_core::{BearerToken, Config, HttpRemoteClient, SqliteStore};

use super::require_user;
use crate::output::Output;

/// List remote locations, or fetch one by remote id
pub async fn locations(
    store: &SqliteStore,
    config: &Config,
    id: Option<String>,
    output: &Output,
) -> Result<()> {
    let records = query::<RemoteLocation>(store, config, id).await?;
    output.print_remote_locations(&records);
    Ok(())
}

/// List remote items, or fetch one by remote id
pub async fn items(
    store: &SqliteStore,
    config: &Config,
    id: Option<String>,
    output: &Output,
) -> Result<()> {
    let records = query::<RemoteItem>(store, config, id).await?;
    output.print_remote_items(&records);
    Ok(())
}

async fn query<R>(store: &SqliteStore, config: &Config, id: Option<String>) -> Result<Vec<R>>
where
    R: RemoteRecord,
    HttpRemoteClient: RemoteCollection<R>,
{
    let token = credential(store)?;
    let remote = HttpRemoteClient::from_config(config).context("Failed to create HTTP client")?;

    match id {
        Some(id) => {
            let record = RemoteCollection::<R>::fetch(&remote, &token, &id)
                .await
                .with_context(|| format!("Failed to fetch {} {}", R::COLLECTION, id))?;
            match record {
                Some(record) => Ok(vec![record]),
                None => bail!("No remote record in {} with id {}", R::COLLECTION, id),
            }
        }
        None => RemoteCollection::<R>::list_all(&remote, &token)
            .await
            .with_context(|| format!("Failed to list remote {}", R::COLLECTION)),
    }
}

fn credential(store: &SqliteStore) -> Result<BearerToken> {
    let user = require_user(store)?;
    user.credential()
        .and_then(BearerToken::new)
        .ok_or_else(|| anyhow::anyhow!("No access token for {}. Log in again.", user.email))
}

#[cfg(test)]
mod tests {
    use super::*;
    use larder_core::{User, UserStore};

    #[test]
    fn test_credential_requires_token() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(credential(&store).is_err());

        let mut user = User::demo("cook@example.com", "Cook");
        user.access_token = Some(String::new());
        store.log_in(&user).unwrap();
        let err = credential(&store).unwrap_err();
        assert!(err.to_string().contains("No access token"));

        store.log_in(&User::demo("cook@example.com", "Cook")).unwrap();
        assert_eq!(credential(&store).unwrap().as_str(), "demo_token");
    }
}
