//! Command handlers

pub mod auth;
pub mod config;
pub mod item;
pub mod location;
pub mod remote;
pub mod status;
pub mod sync;

use anyhow::{bail, Context, Result};
use uuid::Uuid;

use larder_core::{SqliteStore, User, UserStore};

/// The logged-in user, or an error telling how to log in
pub fn require_user(store: &SqliteStore) -> Result<User> {
    store
        .current_user()
        .context("Failed to read current user")?
        .ok_or_else(|| anyhow::anyhow!("Not logged in. Run `larder login <email>` first."))
}

/// Resolve a full UUID or an unambiguous prefix of one
///
/// A full UUID is returned as-is; callers still have to look it up.
pub fn resolve_id(
    input: &str,
    candidates: impl IntoIterator<Item = Uuid>,
    kind: &str,
) -> Result<Uuid> {
    let input = input.trim();
    if input.is_empty() {
        bail!("Empty {} ID", kind);
    }

    if let Ok(uuid) = Uuid::parse_str(input) {
        return Ok(uuid);
    }

    let prefix = input.to_lowercase();
    let matches: Vec<Uuid> = candidates
        .into_iter()
        .filter(|id| id.to_string().starts_with(&prefix))
        .collect();

    match matches.as_slice() {
        [] => bail!("No {} found matching '{}'", kind, input),
        [only] => Ok(*only),
        many => bail!(
            "Ambiguous {} ID '{}' matches {} records. Use more characters.",
            kind,
            input,
            many.len()
        ),
    }
}
