// src/cli/mod.rs — CLI definition (clap derive)

pub mod chat;
pub mod login;
pub mod lookup;
pub mod report;
pub mod status;

use clap::{Parser, Subcommand, ValueEnum};

use crate::reports::ReportKind;

#[derive(Parser)]
#[command(name = "vendora", about = "Marketplace vendor assistant", version)]
pub struct Cli {
    /// Config file path
    #[arg(long)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Log in against the marketplace auth endpoint
    Login {
        /// Username (prompted interactively when omitted)
        username: Option<String>,
    },
    /// Clear the stored session
    Logout,
    /// Interactive chat session (default command)
    Chat,
    /// List stored conversations
    Conversations,
    /// Delete a stored conversation and its messages
    Delete {
        /// Conversation id (UUID)
        conversation_id: String,
    },
    /// Fetch a vendor report
    Report {
        /// Which report to fetch
        #[arg(value_enum)]
        kind: ReportKindArg,
        /// Expiry window in months (nearly-expired)
        #[arg(long)]
        months: Option<u32>,
        /// Minimum quality score (high-quality)
        #[arg(long)]
        min_quality: Option<f64>,
        /// Row cap
        #[arg(long)]
        limit: Option<u32>,
        /// Fetch the hosted CSV URL instead of the spreadsheet blob
        #[arg(long)]
        csv: bool,
    },
    /// Look up market values for an item
    Lookup {
        /// Item name
        name: String,
        /// Item SKU
        #[arg(long)]
        sku: Option<String>,
        /// Override the configured search sources
        #[arg(long)]
        source: Vec<String>,
    },
    /// Show session status
    Status,
    /// Wait for a one-time session handoff from the marketplace dashboard
    Handoff,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ReportKindArg {
    NearlyExpired,
    Recalled,
    HighQuality,
}

impl From<ReportKindArg> for ReportKind {
    fn from(arg: ReportKindArg) -> Self {
        match arg {
            ReportKindArg::NearlyExpired => ReportKind::NearlyExpired,
            ReportKindArg::Recalled => ReportKind::Recalled,
            ReportKindArg::HighQuality => ReportKind::HighQuality,
        }
    }
}
