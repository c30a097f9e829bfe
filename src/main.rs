// src/main.rs — Vendora entry point

use clap::Parser;
use std::sync::Arc;

use vendora::cli::{Cli, Commands};
use vendora::infra::config::Config;
use vendora::infra::logger;
use vendora::infra::session::{CredentialStore, Session};
use vendora::reports::ReportParams;

#[tokio::main]
async fn main() {
    // Initialize logging (respects RUST_LOG)
    logger::init_logging("warn");

    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn require_session() -> anyhow::Result<Session> {
    CredentialStore::new()
        .load()
        .ok_or_else(|| anyhow::anyhow!("Not logged in. Run `vendora login`."))
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load config (falls back to defaults if no config.toml)
    let config = if let Some(ref path) = cli.config {
        Config::load_from(std::path::Path::new(path))?
    } else {
        Config::load()?
    };

    match cli.command {
        Some(Commands::Login { username }) => vendora::cli::login::run_login(&config, username).await,

        Some(Commands::Logout) => vendora::cli::login::run_logout(),

        Some(Commands::Status) => vendora::cli::status::show_status(&config),

        Some(Commands::Conversations) => {
            let session = require_session()?;
            let store = vendora::store::RestConversationStore::new(
                config.endpoints.persistence_url.clone(),
                Some(session.token.clone()),
            );
            use vendora::store::ConversationStore;
            let conversations = store.list_conversations(&session.email).await?;
            if conversations.is_empty() {
                eprintln!("No stored conversations.");
            }
            for c in conversations {
                println!("{}  {}  {}", c.id, c.updated_at.format("%Y-%m-%d %H:%M"), c.title);
            }
            Ok(())
        }

        Some(Commands::Delete { conversation_id }) => {
            let session = require_session()?;
            let id: uuid::Uuid = conversation_id.parse()?;
            let store = vendora::store::RestConversationStore::new(
                config.endpoints.persistence_url.clone(),
                Some(session.token.clone()),
            );
            use vendora::store::ConversationStore;
            store.delete_conversation(id).await?;
            eprintln!("Deleted {id}.");
            Ok(())
        }

        Some(Commands::Report {
            kind,
            months,
            min_quality,
            limit,
            csv,
        }) => {
            let session = require_session()?;
            let params = ReportParams {
                vendor_id: None,
                months,
                min_quality,
                limit,
                skip: None,
            };
            vendora::cli::report::run_report(&config, &session, kind.into(), params, csv).await
        }

        Some(Commands::Lookup { name, sku, source }) => {
            let session = require_session()?;
            vendora::cli::lookup::run_lookup(&config, &session, name, sku, source).await
        }

        Some(Commands::Handoff) => {
            let handoff = config.handoff.clone().unwrap_or_default();
            vendora::api::run_handoff_listener(&handoff, Arc::new(CredentialStore::new())).await?;
            eprintln!("Session received. Run `vendora chat` to pick it up.");
            Ok(())
        }

        Some(Commands::Chat) | None => {
            let session = require_session()?;
            vendora::cli::chat::run_chat(&config, session).await
        }
    }
}
