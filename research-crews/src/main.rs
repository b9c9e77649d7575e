//! research-crews: run a research crew, or drive its delivery tools directly.
//!
//!   research-crews run --crew deep-researcher --topic "solid-state batteries"
//!   research-crews run --crew-file my_crew.toml --topic ...
//!   research-crews notify --title "Hello" --message "..."
//!   research-crews init-db
//!
//! Secrets come from flags or the environment (PUSHOVER_USER, PUSHOVER_TOKEN,
//! TURSO_DATABASE_URL, TURSO_AUTH_TOKEN, SERPER_API_KEY, ANTHROPIC_API_KEY).

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use research_crews::config::Secrets;
use research_crews::crew::{self, CrewConfig};
use research_crews::llm::{self, LlmClient};
use research_crews::notify::Notifier;
use research_crews::store::RecordStore;
use research_crews::tools::{self, Toolbox};

#[derive(Parser)]
#[command(name = "research-crews", about = "Multi-agent research crews")]
struct Args {
    #[command(flatten)]
    secrets: Secrets,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a crew end to end
    Run {
        /// Built-in crew name
        #[arg(long, default_value = "deep-researcher")]
        crew: String,

        /// Load the crew from a TOML file instead
        #[arg(long)]
        crew_file: Option<PathBuf>,

        /// Research topic
        #[arg(long, env = "CREW_TOPIC")]
        topic: Option<String>,

        /// Directory task output files are written under
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,

        /// Claude model to use
        #[arg(long, default_value = llm::DEFAULT_MODEL)]
        model: String,

        /// Anthropic API key (or set ANTHROPIC_API_KEY env var)
        #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
        api_key: String,
    },

    /// Send one push notification and print the per-part results
    Notify {
        #[arg(long)]
        title: String,

        #[arg(long)]
        message: String,
    },

    /// Create the research tables in the configured database
    InitDb,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "research_crews=info".into()),
        )
        .init();

    let args = Args::parse();

    match args.command {
        Command::Run {
            crew,
            crew_file,
            topic,
            output_dir,
            model,
            api_key,
        } => {
            let config = match &crew_file {
                Some(path) => CrewConfig::load(path)?,
                None => CrewConfig::builtin(&crew)?,
            };
            let inputs = crew::run_inputs(topic.as_deref(), &chrono::Local::now());
            let prepared = config.prepare(&inputs)?;

            let toolbox = Toolbox::new(&args.secrets);
            let uses_store = prepared.tasks.iter().any(|t| {
                t.tools.iter().any(|name| {
                    [
                        tools::SAVE_RESEARCH_RECORD,
                        tools::SAVE_REPORT,
                        tools::SAVE_RESEARCH_SOURCES,
                    ]
                    .contains(&name.as_str())
                })
            });
            if uses_store {
                toolbox
                    .store()
                    .ensure_schema()
                    .await
                    .context("Database not ready")?;
            }

            let llm = LlmClient::new(api_key).with_model(&model);
            tracing::info!(crew = %prepared.name, model = %model, "Starting crew");
            let output = crew::kickoff(&prepared, &llm, &toolbox, &output_dir).await?;
            println!("{}", output.final_output());
        }

        Command::Notify { title, message } => {
            let report = Notifier::new(&args.secrets).send(&title, &message).await?;
            println!("{}", serde_json::to_string_pretty(&report.to_json())?);
            if !report.all_ok() {
                tracing::warn!("Some parts failed to send");
            }
        }

        Command::InitDb => {
            RecordStore::new(&args.secrets).ensure_schema().await?;
            tracing::info!("Schema applied");
        }
    }

    Ok(())
}
