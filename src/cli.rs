use clap::{Parser, Subcommand};

/// Command-line options for gmail-ingest.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the Google consent flow and print an ingest request with the granted tokens
    Authorize {
        /// User id to embed in the printed request
        #[arg(long)]
        user_id: String,
    },
    /// Scan recent transaction emails and archive them once
    Ingest {
        #[arg(long)]
        user_id: String,

        /// Delegated Gmail access token
        #[arg(long, env = "GMAIL_ACCESS_TOKEN", hide_env_values = true)]
        access_token: String,

        /// Carried with the request but never used by ingestion
        #[arg(long, env = "GMAIL_REFRESH_TOKEN", hide_env_values = true)]
        refresh_token: Option<String>,
    },
}
