//! Login and logout

use anyhow::{bail, Context, Result};

use larder_core::{SqliteStore, User, UserStore};

use crate::output::Output;

/// Demo login: record the user as the only logged-in user on this device
pub fn login(
    store: &SqliteStore,
    email: String,
    name: Option<String>,
    token: Option<String>,
    output: &Output,
) -> Result<()> {
    let user = demo_user(&email, name, token)?;

    store.log_in(&user).context("Failed to save login")?;
    tracing::info!(user = %user.id, "logged in");

    output.success(&format!("Logged in as {} <{}>", user.name, user.email));
    Ok(())
}

/// Log every user out; local records stay on disk
pub fn logout(store: &SqliteStore, output: &Output) -> Result<()> {
    let current = store.current_user().context("Failed to read current user")?;
    store.log_out().context("Failed to log out")?;

    match current {
        Some(user) => {
            tracing::info!(user = %user.id, "logged out");
            output.success(&format!("Logged out {}", user.email));
        }
        None => output.message("Nobody was logged in."),
    }
    Ok(())
}

fn demo_user(email: &str, name: Option<String>, token: Option<String>) -> Result<User> {
    let email = email.trim();
    let Some((local_part, domain)) = email.split_once('@') else {
        bail!("Invalid email address: '{}'", email);
    };
    if local_part.is_empty() || domain.is_empty() {
        bail!("Invalid email address: '{}'", email);
    }

    let name = name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| local_part.to_string());

    let mut user = User::demo(email, name);
    if let Some(token) = token {
        let token = token.trim();
        if token.is_empty() {
            bail!("Token cannot be empty");
        }
        user.access_token = Some(token.to_string());
    }
    Ok(user)
}
