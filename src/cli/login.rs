// src/cli/login.rs — Credential exchange commands

use std::sync::Arc;

use crate::auth::{JwtAuthClient, SessionGateway};
use crate::infra::config::Config;
use crate::infra::session::CredentialStore;

pub async fn run_login(config: &Config, username: Option<String>) -> anyhow::Result<()> {
    let username = match username {
        Some(u) => u,
        None => inquire::Text::new("Username:").prompt()?,
    };
    let password = inquire::Password::new("Password:")
        .without_confirmation()
        .prompt()?;

    let gateway = SessionGateway::new(
        Arc::new(JwtAuthClient::new(config.endpoints.auth_url.clone())),
        CredentialStore::new(),
    );

    match gateway.login(&username, &password).await {
        Ok(session) => {
            eprintln!(
                "Logged in as {} <{}>{}",
                session.display_name,
                session.email,
                session
                    .vendor_slug
                    .as_deref()
                    .map(|s| format!(" (vendor: {s})"))
                    .unwrap_or_default()
            );
            Ok(())
        }
        Err(e) => {
            eprintln!("Login failed: {e}");
            std::process::exit(1);
        }
    }
}

pub fn run_logout() -> anyhow::Result<()> {
    let store = CredentialStore::new();
    store.clear()?;
    eprintln!("Logged out.");
    Ok(())
}
