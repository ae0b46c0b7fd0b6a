//! PolicyGate CLI: the main entry point.
//!
//! Commands:
//! - `init`: Write a default config and create the data directory
//! - `ingest`: Chunk and index a policy document into a layer
//! - `approve`: Activate a draft policy version
//! - `policies`: List registered policy versions
//! - `retrieve`: Assemble the labeled snippet bundle for a case
//! - `escalate`: Record a case escalation in the audit log
//! - `status`: Show configuration and index status

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "policygate",
    about = "PolicyGate: layered policy retrieval and governance",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config and create the data directory
    Init,

    /// Ingest a UTF-8 text policy document
    Ingest {
        /// Path to the extracted policy text
        file: std::path::PathBuf,

        /// base_policy | state_rules | sector_rules | environment (or BASE/STATE/SECTOR/ENV)
        #[arg(short, long)]
        layer: String,

        /// State the policy applies to
        #[arg(long, default_value = "ALL")]
        state: String,

        /// Sector the policy applies to
        #[arg(long, default_value = "ALL")]
        sector: String,

        /// Version label, e.g. an effective date
        #[arg(long)]
        version: String,

        /// draft | active
        #[arg(long, default_value = "draft")]
        status: String,

        /// Document name recorded in the registry (defaults to the file name)
        #[arg(long)]
        doc_name: Option<String>,
    },

    /// Approve a policy version (draft → active)
    Approve {
        /// Policy id, `state::sector::layer::version`
        policy_id: String,

        /// Who approved it
        #[arg(long = "by")]
        approved_by: Option<String>,
    },

    /// List registered policy versions
    Policies {
        /// Show every registry record instead of the latest per id
        #[arg(long)]
        all: bool,

        /// Print JSON
        #[arg(long)]
        json: bool,
    },

    /// Retrieve the labeled policy snippets for a case
    Retrieve {
        #[arg(long)]
        state: String,

        #[arg(long)]
        sector: String,

        /// Retrieval query (defaults to `retrieval.default_query`)
        #[arg(short, long)]
        query: Option<String>,

        /// Snippets per layer (defaults to `retrieval.k_per_layer`)
        #[arg(short)]
        k: Option<usize>,

        /// Case reference recorded in the audit log
        #[arg(long)]
        case_id: Option<String>,

        /// Print the bundle as JSON instead of the grounding context
        #[arg(long)]
        json: bool,
    },

    /// Record a case escalation
    Escalate {
        /// Why the case is escalated
        #[arg(short, long)]
        reason: String,

        #[arg(long)]
        case_id: Option<String>,

        /// Who escalated it
        #[arg(long = "by")]
        raised_by: Option<String>,
    },

    /// Show configuration and index status
    Status,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Init => commands::init::run().await?,
        Commands::Ingest {
            file,
            layer,
            state,
            sector,
            version,
            status,
            doc_name,
        } => {
            let args = commands::ingest::IngestArgs {
                file,
                layer,
                state,
                sector,
                version,
                status,
                doc_name,
            };
            commands::ingest::run(args).await?
        }
        Commands::Approve {
            policy_id,
            approved_by,
        } => commands::approve::run(&policy_id, approved_by.as_deref()).await?,
        Commands::Policies { all, json } => commands::policies::run(all, json).await?,
        Commands::Retrieve {
            state,
            sector,
            query,
            k,
            case_id,
            json,
        } => {
            let args = commands::retrieve::RetrieveArgs {
                state,
                sector,
                query,
                k,
                case_id,
                json,
            };
            commands::retrieve::run(args).await?
        }
        Commands::Escalate {
            reason,
            case_id,
            raised_by,
        } => commands::escalate::run(&reason, case_id.as_deref(), raised_by.as_deref()).await?,
        Commands::Status => commands::status::run().await?,
    }

    Ok(())
}
