//! QoS Adaptor CLI
//!
//! A command-line tool for inspecting rule catalogs offline and for
//! querying a running adaptor's health and adaptation history.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{adaptations, rules, status};
use std::path::PathBuf;

const DEFAULT_API_URL: &str = "http://localhost:8080";

/// QoS Adaptor CLI
#[derive(Parser)]
#[command(name = "adaptctl")]
#[command(author, version, about = "CLI for the QoS Adaptor", long_about = None)]
pub struct Cli {
    /// Adaptor API URL (can also be set via ADAPTOR_API_URL env var)
    #[arg(long, env = "ADAPTOR_API_URL")]
    pub api_url: Option<String>,

    /// Output format
    #[arg(long, short)]
    pub format: Option<output::OutputFormat>,

    /// Enable verbose output
    #[arg(long, short)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Inspect a rule catalog
    #[command(subcommand)]
    Rules(RulesCommands),

    /// Show the adaptor's health and readiness
    Status,

    /// Show the adaptor's live adaptation history
    Adaptations {
        /// Only the newest N entries
        #[arg(long, short)]
        limit: Option<usize>,

        /// Filter by guarantee id
        #[arg(long)]
        guarantee_id: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum RulesCommands {
    /// List the rules of a catalog in order
    List {
        /// Rule catalog file
        catalog: PathBuf,
    },

    /// Validate a catalog
    Check {
        /// Rule catalog file
        catalog: PathBuf,
    },

    /// Show which rules would fire for an event right now
    Match {
        /// Rule catalog file
        catalog: PathBuf,

        /// Agreement term of the event
        #[arg(long)]
        term: String,

        /// Comparison operator (LT, LTE, EQ, GT, GTE)
        #[arg(long)]
        operator: String,

        /// Observed value
        #[arg(long)]
        raw: f64,

        /// Guaranteed value
        #[arg(long)]
        guaranteed: f64,

        /// Event type (breach, warning, other)
        #[arg(long = "type", default_value = "breach")]
        event_type: String,

        /// Scope the event to an application
        #[arg(long)]
        application: Option<String>,

        /// Deployment of the application
        #[arg(long, default_value = "")]
        deployment: String,

        /// Show every matching rule instead of the first
        #[arg(long)]
        all: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let settings = config::Config::load()?;

    let format = cli
        .format
        .or_else(|| settings.default_format())
        .unwrap_or_default();
    let api_url = cli
        .api_url
        .or(settings.api_url)
        .unwrap_or_else(|| DEFAULT_API_URL.to_string());

    match cli.command {
        Commands::Rules(rules_cmd) => match rules_cmd {
            RulesCommands::List { catalog } => {
                rules::list_rules(&catalog, format)?;
            }
            RulesCommands::Check { catalog } => {
                rules::check_rules(&catalog, cli.verbose)?;
            }
            RulesCommands::Match {
                catalog,
                term,
                operator,
                raw,
                guaranteed,
                event_type,
                application,
                deployment,
                all,
            } => {
                let query = rules::EventQuery {
                    term,
                    operator,
                    raw,
                    guaranteed,
                    event_type,
                    application,
                    deployment,
                };
                rules::match_rules(&catalog, &query, all, format)?;
            }
        },
        Commands::Status => {
            let client = client::ApiClient::new(&api_url)?;
            status::show_status(&client, format).await?;
        }
        Commands::Adaptations { limit, guarantee_id } => {
            let client = client::ApiClient::new(&api_url)?;
            adaptations::show_adaptations(&client, limit, guarantee_id, format).await?;
        }
    }

    Ok(())
}
