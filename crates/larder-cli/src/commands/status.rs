//! Status command handler

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};

use larder_core::storage::StoreCounts;
use larder_core::{Config, SqliteStore, UserStore};

use crate::output::{Output, OutputFormat};

/// Show who is logged in, when they last synced and what is waiting
pub fn show(store: &SqliteStore, config: &Config, output: &Output) -> Result<()> {
    let user = store.current_user().context("Failed to read current user")?;
    let counts = match &user {
        Some(user) => store.counts(&user.id)?,
        None => StoreCounts::default(),
    };

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "user": user.as_ref().map(|u| serde_json::json!({
                        "id": u.id,
                        "email": u.email,
                        "name": u.name,
                        "token_expiry": u.token_expiry,
                    })),
                    "last_sync_at": user.as_ref().and_then(|u| u.last_sync_at),
                    "api_url": config.api_url,
                    "data_dir": config.data_dir,
                    "counts": counts,
                })
            );
        }
        OutputFormat::Quiet => {
            let pending = counts.pending_locations + counts.pending_items;
            println!("{}", pending);
        }
        OutputFormat::Human => {
            println!("Larder Status");
            println!("=============");
            println!();
            println!("User:");
            match &user {
                Some(user) => {
                    println!("  {} <{}>", user.name, user.email);
                    println!("  Last sync: {}", format_time(user.last_sync_at));
                }
                None => println!("  Not logged in"),
            }
            println!();
            println!("Server:");
            println!("  URL: {}", config.api_url);
            println!();
            println!("Storage:");
            println!("  Database: {}", config.sqlite_path().display());
            println!();
            println!("Contents:");
            println!(
                "  Locations: {} ({} pending)",
                counts.locations, counts.pending_locations
            );
            println!(
                "  Items:     {} ({} pending)",
                counts.items, counts.pending_items
            );
        }
    }

    Ok(())
}

fn format_time(at: Option<DateTime<Utc>>) -> String {
    match at {
        Some(at) => at
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M")
            .to_string(),
        None => "never".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_time_never() {
        assert_eq!(format_time(None), "never");
    }

    #[test]
    fn test_show_without_login() {
        let store = SqliteStore::open_in_memory().unwrap();
        let output = Output::new(OutputFormat::Quiet);
        assert!(show(&store, &Config::default(), &output).is_ok());
    }
}
