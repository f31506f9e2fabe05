//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use serde::Serialize;

use larder_core::remote::{RemoteItem, RemoteLocation};
use larder_core::{Location, StorageItem, SyncOutcome, SyncState};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Print a single location with its items
    pub fn print_location(&self, location: &Location, items: &[StorageItem]) {
        match self.format {
            OutputFormat::Human => {
                println!("ID:          {}", location.local_id);
                println!("Name:        {}", location.name);
                if !location.description.is_empty() {
                    println!("Description: {}", location.description);
                }
                println!("Sync:        {}", sync_label(location.sync_state, location.remote_id()));
                println!(
                    "Modified:    {}",
                    location.last_modified.format("%Y-%m-%d %H:%M")
                );

                if !items.is_empty() {
                    println!();
                    println!("── Items ({}) ──", items.len());
                    for item in items {
                        println!("{} {}", short_id(&item.local_id), item.name);
                    }
                }
            }
            OutputFormat::Json => {
                print_json(&serde_json::json!({
                    "location": location,
                    "items": items,
                }));
            }
            OutputFormat::Quiet => {
                println!("{}", location.local_id);
            }
        }
    }

    /// Print a list of locations
    pub fn print_locations(&self, locations: &[Location]) {
        match self.format {
            OutputFormat::Human => {
                if locations.is_empty() {
                    println!("No locations found.");
                    return;
                }
                for location in locations {
                    println!(
                        "{}{} | {} | {}",
                        short_id(&location.local_id),
                        pending_marker(location.sync_state),
                        truncate(&location.name, 30),
                        truncate(&location.description, 40)
                    );
                }
                println!("\n{} location(s)", locations.len());
            }
            OutputFormat::Json => print_json(locations),
            OutputFormat::Quiet => {
                for location in locations {
                    println!("{}", location.local_id);
                }
            }
        }
    }

    /// Print a single item
    pub fn print_item(&self, item: &StorageItem) {
        match self.format {
            OutputFormat::Human => {
                println!("ID:           {}", item.local_id);
                println!("Name:         {}", item.name);
                println!(
                    "Location:     {}",
                    item.location_name
                        .clone()
                        .unwrap_or_else(|| item.location_local_id.to_string())
                );
                for (label, value) in [
                    ("Brand", &item.brand),
                    ("Size", &item.size),
                    ("Nutrition", &item.nutritional_info),
                    ("Purchased", &item.date_purchased),
                    ("Expires", &item.expiration_date),
                    ("Ingredients", &item.ingredients),
                    ("Other", &item.other_info),
                ] {
                    if !value.is_empty() {
                        println!("{:<13} {}", format!("{}:", label), value);
                    }
                }
                println!("Sync:         {}", sync_label(item.sync_state, item.remote_id()));
                println!(
                    "Modified:     {}",
                    item.last_modified.format("%Y-%m-%d %H:%M")
                );
            }
            OutputFormat::Json => print_json(item),
            OutputFormat::Quiet => {
                println!("{}", item.local_id);
            }
        }
    }

    /// Print a list of items
    pub fn print_items(&self, items: &[StorageItem]) {
        match self.format {
            OutputFormat::Human => {
                if items.is_empty() {
                    println!("No items found.");
                    return;
                }
                for item in items {
                    println!(
                        "{}{} | {} | {} | {}",
                        short_id(&item.local_id),
                        pending_marker(item.sync_state),
                        truncate(&item.name, 30),
                        truncate(item.location_name.as_deref().unwrap_or("?"), 20),
                        item.expiration_date
                    );
                }
                println!("\n{} item(s)", items.len());
            }
            OutputFormat::Json => print_json(items),
            OutputFormat::Quiet => {
                for item in items {
                    println!("{}", item.local_id);
                }
            }
        }
    }

    /// Print the result of a sync run
    pub fn print_outcome(&self, outcome: &SyncOutcome) {
        match self.format {
            OutputFormat::Human => {
                if outcome.success {
                    println!("✓ {}", outcome.message);
                } else {
                    println!("✗ {}", outcome.message);
                }
                println!(
                    "  Locations: {} uploaded, {} downloaded",
                    outcome.locations_uploaded, outcome.locations_downloaded
                );
                println!(
                    "  Items:     {} uploaded, {} downloaded",
                    outcome.items_uploaded, outcome.items_downloaded
                );
            }
            OutputFormat::Json => print_json(outcome),
            OutputFormat::Quiet => {}
        }
    }

    /// Print locations as the server returns them
    pub fn print_remote_locations(&self, locations: &[RemoteLocation]) {
        match self.format {
            OutputFormat::Human => {
                if locations.is_empty() {
                    println!("No remote locations.");
                    return;
                }
                for location in locations {
                    println!("{} | {}", location.id, truncate(&location.name, 40));
                }
                println!("\n{} remote location(s)", locations.len());
            }
            OutputFormat::Json => print_json(locations),
            OutputFormat::Quiet => {
                for location in locations {
                    println!("{}", location.id);
                }
            }
        }
    }

    /// Print items as the server returns them
    pub fn print_remote_items(&self, items: &[RemoteItem]) {
        match self.format {
            OutputFormat::Human => {
                if items.is_empty() {
                    println!("No remote items.");
                    return;
                }
                for item in items {
                    println!(
                        "{} | {} | location {}",
                        item.id,
                        truncate(&item.name, 30),
                        item.location_id
                    );
                }
                println!("\n{} remote item(s)", items.len());
            }
            OutputFormat::Json => print_json(items),
            OutputFormat::Quiet => {
                for item in items {
                    println!("{}", item.id);
                }
            }
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Check if we should prompt for confirmation
    pub fn should_prompt(&self) -> bool {
        self.format == OutputFormat::Human
    }

    /// Print an informational message
    pub fn message(&self, msg: &str) {
        match self.format {
            OutputFormat::Human => println!("{}", msg),
            OutputFormat::Json => {
                println!("{}", serde_json::json!({"message": msg}));
            }
            OutputFormat::Quiet => {}
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Failed to serialize output: {}", e),
    }
}

/// First eight characters of a local id
pub fn short_id(id: &uuid::Uuid) -> String {
    id.to_string()[..8].to_string()
}

fn pending_marker(state: SyncState) -> &'static str {
    match state {
        SyncState::Pending => "*",
        SyncState::Synced => " ",
    }
}

fn sync_label(state: SyncState, remote_id: Option<&str>) -> String {
    match (state, remote_id) {
        (SyncState::Synced, Some(id)) => format!("synced ({})", id),
        (SyncState::Synced, None) => "synced".to_string(),
        (SyncState::Pending, Some(id)) => format!("pending ({})", id),
        (SyncState::Pending, None) => "pending (never pushed)".to_string(),
    }
}

/// Truncate a string to max length, adding "..." if truncated
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_flags() {
        assert_eq!(OutputFormat::from_flags(false, false), OutputFormat::Human);
        assert_eq!(OutputFormat::from_flags(true, false), OutputFormat::Json);
        assert_eq!(OutputFormat::from_flags(false, true), OutputFormat::Quiet);
        // Quiet takes precedence
        assert_eq!(OutputFormat::from_flags(true, true), OutputFormat::Quiet);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("this is a long string", 10), "this is...");
        assert_eq!(truncate("crème brûlée au four", 8), "crème...");
    }

    #[test]
    fn test_sync_label() {
        assert_eq!(sync_label(SyncState::Synced, Some("r1")), "synced (r1)");
        assert_eq!(
            sync_label(SyncState::Pending, None),
            "pending (never pushed)"
        );
    }

    #[test]
    fn test_short_id() {
        let id = uuid::Uuid::new_v4();
        assert_eq!(short_id(&id).len(), 8);
        assert!(id.to_string().starts_with(&short_id(&id)));
    }
}
