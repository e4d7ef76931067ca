// Gram background CLI
//
// Offline tooling for the background procedures: derive workflow ids, dry-run
// the command router, print step policies and verify recorded histories
// against the current workflow code.

mod output;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use gram_background::identity::{custom_domain_registration_identity, slack_event_identity};
use gram_background::telemetry::{init_telemetry, TelemetryConfig};
use gram_background::{route, workflows, BackgroundConfig, ChannelType, Intent, Step};
use gram_durable::WorkflowEvent;
use serde_json::json;

use output::{print_field, print_table_header, print_table_row, OutputFormat};

#[derive(Parser)]
#[command(name = "gram-background")]
#[command(about = "Gram background workflows - identities, routing and replay")]
#[command(version)]
struct Cli {
    /// Output format
    #[arg(long, short, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Derive the workflow id for a request
    Identity {
        #[command(subcommand)]
        command: IdentityCommand,
    },

    /// Show how a chat message would be routed
    Route {
        /// Message text
        text: String,

        /// Bot user id a leading mention is stripped for
        #[arg(long)]
        bot_user_id: Option<String>,

        /// Channel the message was posted in
        #[arg(long, value_enum, default_value_t = ChannelArg::Direct)]
        channel_type: ChannelArg,

        /// Project default toolset
        #[arg(long)]
        default_toolset: Option<String>,

        /// Toolset slugs known to the project (repeatable)
        #[arg(long = "toolset")]
        toolsets: Vec<String>,
    },

    /// List step timeouts and attempt budgets
    Policies,

    /// Show the effective background configuration
    Config,

    /// Replay a recorded history and check it for non-determinism
    Replay {
        /// Registered workflow type
        #[arg(long)]
        workflow_type: String,

        /// JSON file holding the run's event list
        history: PathBuf,
    },
}

#[derive(Subcommand)]
enum IdentityCommand {
    /// Custom domain registration
    CustomDomain {
        #[arg(long)]
        org_id: String,
        #[arg(long)]
        domain: String,
    },

    /// Slack event
    SlackEvent {
        #[arg(long)]
        event_id: String,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ChannelArg {
    Direct,
    Group,
    Public,
    Mention,
}

impl From<ChannelArg> for ChannelType {
    fn from(arg: ChannelArg) -> Self {
        match arg {
            ChannelArg::Direct => ChannelType::Direct,
            ChannelArg::Group => ChannelType::Group,
            ChannelArg::Public => ChannelType::Public,
            ChannelArg::Mention => ChannelType::Mention,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let _telemetry = init_telemetry(TelemetryConfig::from_env());

    let cli = Cli::parse();
    let format = cli.output;

    match cli.command {
        Commands::Identity { command } => identity(command, format),
        Commands::Route {
            text,
            bot_user_id,
            channel_type,
            default_toolset,
            toolsets,
        } => {
            let intent = route(
                &text,
                bot_user_id.as_deref(),
                channel_type.into(),
                default_toolset.as_deref(),
                &toolsets[..],
            );
            print_intent(&intent, format)
        }
        Commands::Policies => policies(format),
        Commands::Config => config(format),
        Commands::Replay {
            workflow_type,
            history,
        } => replay(&workflow_type, &history, format),
    }
}

fn identity(command: IdentityCommand, format: OutputFormat) -> anyhow::Result<()> {
    let identity = match command {
        IdentityCommand::CustomDomain { org_id, domain } => {
            custom_domain_registration_identity(&org_id, &domain)
        }
        IdentityCommand::SlackEvent { event_id } => slack_event_identity(&event_id),
    };

    if format.is_text() {
        println!("{identity}");
        return Ok(());
    }
    format.print_value(&json!({ "workflow_id": identity }))
}

fn print_intent(intent: &Intent, format: OutputFormat) -> anyhow::Result<()> {
    if !format.is_text() {
        return format.print_value(intent);
    }

    match intent {
        Intent::ListToolsets => print_field("Intent", "list_toolsets"),
        Intent::RunPrompt {
            toolset_slug,
            prompt,
        } => {
            print_field("Intent", "run_prompt");
            print_field("Toolset", toolset_slug.as_deref().unwrap_or("-"));
            print_field("Prompt", prompt);
        }
        Intent::Empty { reason } => {
            print_field("Intent", "empty");
            print_field("Reason", &reason.to_string());
        }
    }
    Ok(())
}

fn policies(format: OutputFormat) -> anyhow::Result<()> {
    if !format.is_text() {
        let rows: Vec<_> = Step::ALL
            .iter()
            .map(|step| {
                let policy = step.policy();
                json!({
                    "activity_type": step.activity_type(),
                    "timeout_secs": policy.timeout.as_secs(),
                    "max_attempts": policy.max_attempts,
                })
            })
            .collect();
        return format.print_value(&rows);
    }

    print_table_header(&[("ACTIVITY", 28), ("TIMEOUT", 8), ("ATTEMPTS", 8)]);
    for step in Step::ALL {
        let policy = step.policy();
        let timeout = format!("{}s", policy.timeout.as_secs());
        let attempts = policy.max_attempts.to_string();
        print_table_row(&[
            (step.activity_type(), 28),
            (&timeout, 8),
            (&attempts, 8),
        ]);
    }
    Ok(())
}

fn config(format: OutputFormat) -> anyhow::Result<()> {
    let config = BackgroundConfig::from_env()?;

    if format.is_text() {
        print_field("Task queue", &config.task_queue);
        print_field("Run timeout", &format!("{}s", config.run_timeout.as_secs()));
        return Ok(());
    }
    format.print_value(&json!({
        "task_queue": config.task_queue,
        "run_timeout_secs": config.run_timeout.as_secs(),
    }))
}

fn replay(workflow_type: &str, path: &Path, format: OutputFormat) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read history from {}", path.display()))?;
    let history: Vec<WorkflowEvent> =
        serde_json::from_str(&raw).context("history is not a list of workflow events")?;

    let registry = workflows::registry();
    let outcome = gram_durable::replay(&registry, workflow_type, &history)
        .with_context(|| format!("replay of {workflow_type} failed"))?;

    if format.is_text() {
        print_field("Workflow", workflow_type);
        print_field("Events", &outcome.events_replayed.to_string());
        print_field("Activities", &outcome.activities_verified.to_string());
        print_field("Completed", &outcome.completed.to_string());
        return Ok(());
    }
    format.print_value(&outcome)
}
