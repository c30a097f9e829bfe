// src/cli/status.rs — Session status

use crate::infra::config::Config;
use crate::infra::session::CredentialStore;

pub fn show_status(config: &Config) -> anyhow::Result<()> {
    match CredentialStore::new().load() {
        Some(session) => {
            eprintln!("  Logged in: {} <{}>", session.display_name, session.email);
            if let Some(slug) = &session.vendor_slug {
                eprintln!("  Vendor: {slug}");
            }
            eprintln!(
                "  Roles: {}",
                session.roles.iter().cloned().collect::<Vec<_>>().join(", ")
            );
        }
        None => eprintln!("  Not logged in. Run `vendora login`."),
    }
    eprintln!("  Assistant: {}", config.endpoints.assistant_url);
    eprintln!("  Persistence: {}", config.endpoints.persistence_url);
    eprintln!(
        "  Lookup sources: {}",
        config.lookup.sources.join(", ")
    );
    Ok(())
}
