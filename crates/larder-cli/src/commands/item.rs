//! Storage item commands

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::Args;

use larder_core::{LocalStore, SqliteStore, StorageItem, SyncState};

use super::location::find_location;
use super::{require_user, resolve_id};
use crate::editor::{confirm, is_interactive, prompt_with_default};
use crate::output::{short_id, Output};

/// Optional item fields shared by `item add` and `item edit`
#[derive(Args, Clone, Debug, Default)]
pub struct ItemFields {
    /// Brand name
    #[arg(long)]
    pub brand: Option<String>,
    /// Package size, e.g. "500g"
    #[arg(long)]
    pub size: Option<String>,
    /// Nutritional information
    #[arg(long)]
    pub nutrition: Option<String>,
    /// Purchase date (YYYY-MM-DD)
    #[arg(long)]
    pub purchased: Option<String>,
    /// Expiration date (YYYY-MM-DD)
    #[arg(long)]
    pub expires: Option<String>,
    /// Ingredients list
    #[arg(long)]
    pub ingredients: Option<String>,
    /// Anything else worth noting
    #[arg(long)]
    pub other: Option<String>,
}

impl ItemFields {
    fn is_empty(&self) -> bool {
        self.brand.is_none()
            && self.size.is_none()
            && self.nutrition.is_none()
            && self.purchased.is_none()
            && self.expires.is_none()
            && self.ingredients.is_none()
            && self.other.is_none()
    }

    /// Apply every given field to `item`; returns whether anything changed
    fn apply(self, item: &mut StorageItem) -> Result<bool> {
        let mut changed = false;

        if let Some(brand) = differs(self.brand, &item.brand) {
            item.set_brand(brand);
            changed = true;
        }
        if let Some(size) = differs(self.size, &item.size) {
            item.set_size(size);
            changed = true;
        }
        if let Some(info) = differs(self.nutrition, &item.nutritional_info) {
            item.set_nutritional_info(info);
            changed = true;
        }
        if let Some(date) = differs(self.purchased, &item.date_purchased) {
            item.set_date_purchased(validate_date(&date, "purchase")?);
            changed = true;
        }
        if let Some(date) = differs(self.expires, &item.expiration_date) {
            item.set_expiration_date(validate_date(&date, "expiration")?);
            changed = true;
        }
        if let Some(ingredients) = differs(self.ingredients, &item.ingredients) {
            item.set_ingredients(ingredients);
            changed = true;
        }
        if let Some(other) = differs(self.other, &item.other_info) {
            item.set_other_info(other);
            changed = true;
        }

        Ok(changed)
    }

    fn prompt(item: &StorageItem) -> Result<Self> {
        Ok(Self {
            brand: prompt_with_default("Brand", &item.brand)?,
            size: prompt_with_default("Size", &item.size)?,
            nutrition: prompt_with_default("Nutrition", &item.nutritional_info)?,
            purchased: prompt_with_default("Purchased (YYYY-MM-DD)", &item.date_purchased)?,
            expires: prompt_with_default("Expires (YYYY-MM-DD)", &item.expiration_date)?,
            ingredients: prompt_with_default("Ingredients", &item.ingredients)?,
            other: prompt_with_default("Other", &item.other_info)?,
        })
    }
}

/// Create a new item in a location
pub fn add(
    store: &SqliteStore,
    name: String,
    location: String,
    fields: ItemFields,
    output: &Output,
) -> Result<()> {
    let user = require_user(store)?;

    let name = name.trim();
    if name.is_empty() {
        bail!("Item name cannot be empty");
    }
    let location = find_location(store, &user.id, &location)?;

    let mut item = StorageItem::new(&user.id, location.local_id, name);
    fields.apply(&mut item)?;

    LocalStore::<StorageItem>::upsert(store, &mut item, SyncState::Pending)
        .context("Failed to save item")?;
    item.location_name = Some(location.name);

    output.success(&format!("Item created: {}", item.name));
    output.print_item(&item);

    Ok(())
}

/// List active items, optionally only those in one location
pub fn list(store: &SqliteStore, location: Option<String>, output: &Output) -> Result<()> {
    let user = require_user(store)?;

    let items = match location {
        Some(location) => {
            let location = find_location(store, &user.id, &location)?;
            let mut items = store.list_items_in_location(&user.id, location.local_id)?;
            for item in &mut items {
                item.location_name = Some(location.name.clone());
            }
            items
        }
        None => store.list_active_items_with_location_names(&user.id)?,
    };

    output.print_items(&items);
    Ok(())
}

/// Show a single item
pub fn show(store: &SqliteStore, id: String, output: &Output) -> Result<()> {
    let user = require_user(store)?;
    let item = find_item(store, &user.id, &id)?;
    output.print_item(&item);
    Ok(())
}

/// Edit an item, optionally moving it to another location
///
/// Without flags, prompts for each field when attached to a terminal.
pub fn edit(
    store: &SqliteStore,
    id: String,
    name: Option<String>,
    location: Option<String>,
    fields: ItemFields,
    output: &Output,
) -> Result<()> {
    let user = require_user(store)?;
    let mut item = find_item(store, &user.id, &id)?;

    let nothing_given = name.is_none() && location.is_none() && fields.is_empty();
    let (name, fields) = if nothing_given && output.should_prompt() && is_interactive() {
        (
            prompt_with_default("Name", &item.name)?,
            ItemFields::prompt(&item)?,
        )
    } else {
        (name, fields)
    };

    let mut changed = false;
    if let Some(name) = name.map(|n| n.trim().to_string()) {
        if name.is_empty() {
            bail!("Item name cannot be empty");
        }
        if name != item.name {
            item.set_name(name);
            changed = true;
        }
    }

    let mut location_name = item.location_name.clone();
    if let Some(location) = location {
        let target = find_location(store, &user.id, &location)?;
        if target.local_id != item.location_local_id {
            item.move_to(target.local_id);
            changed = true;
        }
        location_name = Some(target.name);
    }

    changed |= fields.apply(&mut item)?;

    if !changed {
        output.message("No changes made.");
        return Ok(());
    }

    LocalStore::<StorageItem>::upsert(store, &mut item, SyncState::Pending)
        .context("Failed to update item")?;
    item.location_name = location_name;

    output.success("Item updated");
    output.print_item(&item);

    Ok(())
}

/// Soft-delete an item
pub fn delete(store: &SqliteStore, id: String, yes: bool, output: &Output) -> Result<()> {
    let user = require_user(store)?;
    let item = find_item(store, &user.id, &id)?;

    if output.should_prompt() && !yes {
        println!("Delete item: {} - {}", short_id(&item.local_id), item.name);
        if !confirm("Are you sure?")? {
            println!("Cancelled.");
            return Ok(());
        }
    }

    let found = LocalStore::<StorageItem>::mark_deleted_locally(store, item.local_id)
        .context("Failed to delete item")?;
    if !found {
        bail!("Item not found: {}", id);
    }

    output.success(&format!("Deleted item: {}", item.local_id));

    Ok(())
}

/// Resolve an id or prefix to an active item owned by `owner_id`
///
/// The returned item carries its location name.
fn find_item(store: &SqliteStore, owner_id: &str, id: &str) -> Result<StorageItem> {
    let active = store.list_active_items_with_location_names(owner_id)?;
    let local_id = resolve_id(id, active.iter().map(|i| i.local_id), "item")?;

    active
        .into_iter()
        .find(|item| item.local_id == local_id)
        .ok_or_else(|| anyhow::anyhow!("Item not found: {}", id))
}

/// Trimmed `value` if it differs from `current`
fn differs(value: Option<String>, current: &str) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| v != current)
}

/// Accept empty (clears the date) or YYYY-MM-DD
fn validate_date(value: &str, what: &str) -> Result<String> {
    if value.is_empty() {
        return Ok(String::new());
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .with_context(|| format!("Invalid {} date '{}', expected YYYY-MM-DD", what, value))?;
    Ok(value.to_string())
}
