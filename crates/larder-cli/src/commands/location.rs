//! Location commands

use anyhow::{bail, Context, Result};

use larder_core::{LocalStore, Location, SqliteStore, SyncState};

use super::{require_user, resolve_id};
use crate::editor::{confirm, is_interactive, prompt_with_default};
use crate::output::{short_id, Output};

/// Create a new location
pub fn add(
    store: &SqliteStore,
    name: String,
    description: Option<String>,
    output: &Output,
) -> Result<()> {
    let user = require_user(store)?;

    let name = name.trim();
    if name.is_empty() {
        bail!("Location name cannot be empty");
    }

    let mut location = Location::new(&user.id, name);
    if let Some(description) = description {
        location.description = description.trim().to_string();
    }

    LocalStore::<Location>::upsert(store, &mut location, SyncState::Pending)
        .context("Failed to save location")?;

    output.success(&format!("Location created: {}", location.name));
    output.print_location(&location, &[]);

    Ok(())
}

/// List active locations
pub fn list(store: &SqliteStore, output: &Output) -> Result<()> {
    let user = require_user(store)?;
    let locations = LocalStore::<Location>::list_active(store, &user.id)?;
    output.print_locations(&locations);
    Ok(())
}

/// Show a single location and the items it holds
pub fn show(store: &SqliteStore, id: String, output: &Output) -> Result<()> {
    let user = require_user(store)?;
    let location = find_location(store, &user.id, &id)?;
    let mut items = store.list_items_in_location(&user.id, location.local_id)?;
    for item in &mut items {
        item.location_name = Some(location.name.clone());
    }
    output.print_location(&location, &items);
    Ok(())
}

/// Edit a location
///
/// Without flags, prompts for each field when attached to a terminal.
pub fn edit(
    store: &SqliteStore,
    id: String,
    name: Option<String>,
    description: Option<String>,
    output: &Output,
) -> Result<()> {
    let user = require_user(store)?;
    let mut location = find_location(store, &user.id, &id)?;

    let (name, description) =
        if name.is_none() && description.is_none() && output.should_prompt() && is_interactive() {
            (
                prompt_with_default("Name", &location.name)?,
                prompt_with_default("Description", &location.description)?,
            )
        } else {
            (name, description)
        };

    let mut changed = false;
    if let Some(name) = name.map(|n| n.trim().to_string()) {
        if name.is_empty() {
            bail!("Location name cannot be empty");
        }
        if name != location.name {
            location.set_name(name);
            changed = true;
        }
    }
    if let Some(description) = description.map(|d| d.trim().to_string()) {
        if description != location.description {
            location.set_description(description);
            changed = true;
        }
    }

    if !changed {
        output.message("No changes made.");
        return Ok(());
    }

    LocalStore::<Location>::upsert(store, &mut location, SyncState::Pending)
        .context("Failed to update location")?;

    output.success("Location updated");
    output.print_location(&location, &[]);

    Ok(())
}

/// Soft-delete a location
///
/// Refuses while active items still reference it.
pub fn delete(store: &SqliteStore, id: String, yes: bool, output: &Output) -> Result<()> {
    let user = require_user(store)?;
    let location = find_location(store, &user.id, &id)?;

    let items = store.list_items_in_location(&user.id, location.local_id)?;
    if !items.is_empty() {
        bail!(
            "Location '{}' still holds {} item(s). Move or delete them first.",
            location.name,
            items.len()
        );
    }

    if output.should_prompt() && !yes {
        println!(
            "Delete location: {} - {}",
            short_id(&location.local_id),
            location.name
        );
        if !confirm("Are you sure?")? {
            println!("Cancelled.");
            return Ok(());
        }
    }

    let found = LocalStore::<Location>::mark_deleted_locally(store, location.local_id)
        .context("Failed to delete location")?;
    if !found {
        bail!("Location not found: {}", id);
    }

    output.success(&format!("Deleted location: {}", location.local_id));

    Ok(())
}

/// Resolve an id or prefix to an active location owned by `owner_id`
pub fn find_location(store: &SqliteStore, owner_id: &str, id: &str) -> Result<Location> {
    let active = LocalStore::<Location>::list_active(store, owner_id)?;
    let local_id = resolve_id(id, active.iter().map(|l| l.local_id), "location")?;

    match LocalStore::<Location>::get(store, local_id)? {
        Some(location) if location.owner_id == owner_id && !location.tombstoned => Ok(location),
        _ => bail!("Location not found: {}", id),
    }
}
