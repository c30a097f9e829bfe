// src/cli/chat.rs — Interactive chat REPL

use std::sync::Arc;

use crate::assistant::WorkflowClient;
use crate::auth::UserIdentity;
use crate::core::coordinator::{Coordinator, CoordinatorTuning, SessionContext};
use crate::core::types::{Conversation, QuickActionPayload};
use crate::infra::config::Config;
use crate::infra::session::{CredentialStore, Session};
use crate::render;
use crate::reports::{ReportClient, ReportKind, ReportParams};
use crate::store::RestConversationStore;

/// Mutable REPL state that slash commands can modify.
struct ChatState {
    current: Option<Conversation>,
    conversations: Vec<Conversation>,
    exchanges: u32,
}

/// Run the interactive chat REPL.
pub async fn run_chat(config: &Config, session: Session) -> anyhow::Result<()> {
    let token = Some(session.token.clone());

    let assistant = Arc::new(WorkflowClient::new(
        config.endpoints.assistant_url.clone(),
        token.clone(),
        &config.run,
        config.history.clone(),
    ));
    let store = Arc::new(RestConversationStore::new(
        config.endpoints.persistence_url.clone(),
        token.clone(),
    ));
    let coordinator = Coordinator::new(
        assistant,
        store,
        CoordinatorTuning::from_config(&config.run, &config.history),
    );
    let ctx = SessionContext {
        identity: UserIdentity::from_session(&session),
    };
    let reports = ReportClient::new(
        config.endpoints.report_webhook_url.clone(),
        config.endpoints.report_api_url.clone(),
        token,
    );

    let mut state = ChatState {
        current: None,
        conversations: Vec::new(),
        exchanges: 0,
    };

    match coordinator.list_conversations(&session.email).await {
        Ok(conversations) => state.conversations = conversations,
        // An error is not "no conversations" — say so instead of showing an
        // empty list.
        Err(e) => eprintln!("[warn] could not load conversation list: {e}"),
    }

    eprintln!(
        "vendora v{} | {} | {} stored conversation(s)\n",
        env!("CARGO_PKG_VERSION"),
        session.email,
        state.conversations.len(),
    );

    while let Some(input) = read_input() {
        let trimmed = input.trim();

        if trimmed == "quit" || trimmed == "exit" || trimmed == "/quit" {
            break;
        }

        if trimmed.starts_with('/') {
            let keep_going =
                handle_slash_command(trimmed, &mut state, &coordinator, &ctx, &reports, &session)
                    .await?;
            if !keep_going {
                break;
            }
            continue;
        }

        if trimmed.is_empty() {
            continue;
        }

        if !send_and_render(&coordinator, &ctx, &mut state, &session, trimmed, None).await? {
            break;
        }
    }

    eprintln!("\nSession total: {} exchange(s)", state.exchanges);
    Ok(())
}

/// Send one message through the coordinator and render the outcome.
/// Returns false when the session was rejected and the REPL must stop.
async fn send_and_render(
    coordinator: &Coordinator,
    ctx: &SessionContext,
    state: &mut ChatState,
    session: &Session,
    text: &str,
    quick_action: Option<QuickActionPayload>,
) -> anyhow::Result<bool> {
    eprintln!("[assistant is thinking...]");
    match coordinator
        .send(ctx, state.current.clone(), text, Vec::new(), quick_action)
        .await
    {
        Ok(outcome) => {
            state.current = Some(outcome.conversation.clone());
            state.exchanges += 1;
            if outcome.retried {
                eprintln!("[note] older history was trimmed to fit the context limit");
            }
            match &outcome.reply {
                Some(reply) => render::print_message(reply),
                None => render::print_assistant_error(
                    "I'm sorry, I couldn't generate a response. Please try again or rephrase your question.",
                ),
            }
            // Keep the sidebar equivalent fresh.
            if let Ok(conversations) = coordinator.list_conversations(&session.email).await {
                state.conversations = conversations;
            }
            Ok(true)
        }
        Err(e) if e.is_unauthorized() => {
            // A 401 forces a logout; the stored session is no longer valid.
            CredentialStore::new().clear()?;
            eprintln!("Session expired. Run `vendora login`.");
            Ok(false)
        }
        Err(e) => {
            render::print_assistant_error(&format!("Sorry, I encountered an error: {e}"));
            Ok(true)
        }
    }
}

async fn quick_action_report(
    kind: ReportKind,
    state: &mut ChatState,
    coordinator: &Coordinator,
    ctx: &SessionContext,
    reports: &ReportClient,
    session: &Session,
) -> anyhow::Result<bool> {
    let params = ReportParams {
        vendor_id: (!session.is_administrator()).then_some(session.user_id),
        ..Default::default()
    };

    let rows = match reports.fetch_products(kind, &params).await {
        Ok(rows) => rows,
        Err(e) if e.is_unauthorized() => {
            CredentialStore::new().clear()?;
            eprintln!("Session expired. Run `vendora login`.");
            return Ok(false);
        }
        Err(e) => {
            render::print_assistant_error(&e.to_string());
            return Ok(true);
        }
    };

    if rows.is_empty() {
        render::print_assistant_error(&format!(
            "No {} found. Please try again later.",
            kind.label()
        ));
        return Ok(true);
    }

    // The CSV export is a bonus — its absence never blocks the preview.
    let csv = reports.fetch_csv_url(kind, &params).await.ok();

    let prompt = match kind {
        ReportKind::NearlyExpired => "Show me my nearly expired products",
        ReportKind::Recalled => "Show me my recalled products",
        ReportKind::HighQuality => "Show me my high quality products",
    };

    send_and_render(
        coordinator,
        ctx,
        state,
        session,
        prompt,
        Some(QuickActionPayload { rows, csv }),
    )
    .await
}

fn read_input() -> Option<String> {
    use std::io::{self, BufRead, Write};

    print!("> ");
    io::stdout().flush().ok();

    let stdin = io::stdin();
    let mut line = String::new();
    match stdin.lock().read_line(&mut line) {
        Ok(0) => None, // EOF
        Ok(_) => Some(line),
        Err(_) => None,
    }
}

fn pick_conversation<'a>(state: &'a ChatState, arg: &str) -> Option<&'a Conversation> {
    let index: usize = arg.parse().ok()?;
    state.conversations.get(index.checked_sub(1)?)
}

/// Returns false when the REPL must stop (forced logout).
async fn handle_slash_command(
    input: &str,
    state: &mut ChatState,
    coordinator: &Coordinator,
    ctx: &SessionContext,
    reports: &ReportClient,
    session: &Session,
) -> anyhow::Result<bool> {
    let parts: Vec<&str> = input.splitn(2, ' ').collect();
    let cmd = parts[0];
    let arg = parts.get(1).map(|s| s.trim()).unwrap_or("");

    match cmd {
        "/conversations" => {
            match coordinator.list_conversations(&session.email).await {
                Ok(conversations) => state.conversations = conversations,
                Err(e) => {
                    eprintln!("  Could not load conversations: {e}");
                    return Ok(true);
                }
            }
            if state.conversations.is_empty() {
                eprintln!("  No stored conversations yet.");
            } else {
                for (i, c) in state.conversations.iter().enumerate() {
                    let marker = match &state.current {
                        Some(current) if current.id == c.id => " *",
                        _ => "",
                    };
                    eprintln!(
                        "  {}. {} ({}){}",
                        i + 1,
                        c.title,
                        c.updated_at.format("%Y-%m-%d %H:%M"),
                        marker
                    );
                }
            }
        }

        "/open" => match pick_conversation(state, arg) {
            Some(conversation) => {
                let conversation = conversation.clone();
                match coordinator.open_conversation(&conversation).await {
                    Ok(messages) => {
                        eprintln!("  -- {} --", conversation.title);
                        for message in &messages {
                            render::print_message(message);
                        }
                        state.current = Some(conversation);
                    }
                    Err(e) => eprintln!("  Could not open conversation: {e}"),
                }
            }
            None => eprintln!("  Usage: /open <n>  (see /conversations)"),
        },

        "/new" => {
            state.current = None;
            eprintln!("  Started a new chat.");
        }

        "/delete" => match pick_conversation(state, arg) {
            Some(conversation) => {
                let conversation = conversation.clone();
                match coordinator.delete_conversation(conversation.id).await {
                    Ok(()) => {
                        state.conversations.retain(|c| c.id != conversation.id);
                        if state
                            .current
                            .as_ref()
                            .is_some_and(|c| c.id == conversation.id)
                        {
                            state.current = None;
                        }
                        eprintln!("  Deleted \"{}\".", conversation.title);
                    }
                    Err(e) => eprintln!("  Could not delete conversation: {e}"),
                }
            }
            None => eprintln!("  Usage: /delete <n>  (see /conversations)"),
        },

        "/report" => {
            let kind = match arg {
                "nearly-expired" => Some(ReportKind::NearlyExpired),
                "recalled" => Some(ReportKind::Recalled),
                "high-quality" => Some(ReportKind::HighQuality),
                _ => None,
            };
            match kind {
                Some(kind) => {
                    return quick_action_report(kind, state, coordinator, ctx, reports, session)
                        .await;
                }
                None => eprintln!("  Usage: /report <nearly-expired|recalled|high-quality>"),
            }
        }

        "/status" => {
            eprintln!("  User: {} <{}>", session.display_name, session.email);
            match &state.current {
                Some(c) => eprintln!("  Conversation: {} ({})", c.title, c.id),
                None => eprintln!("  Conversation: (new chat)"),
            }
            eprintln!("  Exchanges this session: {}", state.exchanges);
        }

        "/help" => {
            eprintln!("Slash commands:");
            eprintln!("  /conversations     List stored conversations");
            eprintln!("  /open <n>          Open a stored conversation");
            eprintln!("  /new               Start a new chat");
            eprintln!("  /delete <n>        Delete a stored conversation");
            eprintln!("  /report <kind>     Fetch a report and discuss it");
            eprintln!("  /status            Show session status");
            eprintln!("  /help              Show this help");
            eprintln!("  /quit, quit, exit  End session");
        }

        _ => {
            eprintln!("Unknown command: {cmd}. Type /help for commands.");
        }
    }

    Ok(true)
}
