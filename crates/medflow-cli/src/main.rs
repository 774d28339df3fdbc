//! MedFlow CLI — run the medicine assistant workflows from the terminal.
//!
//! Reuses the same workflows (medflow-core) and server bootstrap
//! (medflow-server) that back the HTTP API.

use clap::{Parser, Subcommand};

use medflow_cli::commands;

/// MedFlow CLI — Medicine assistant workflows
#[derive(Parser)]
#[command(name = "medflow", version, about = "MedFlow CLI — Medicine assistant workflows")]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the MedFlow HTTP backend server
    Server {
        /// Host to bind to
        #[arg(long, env = "MEDFLOW_HOST", default_value = "127.0.0.1")]
        host: String,
        /// Port to listen on
        #[arg(long, env = "MEDFLOW_PORT", default_value_t = 4111)]
        port: u16,
        /// Path to static frontend directory
        #[arg(long)]
        static_dir: Option<String>,
    },

    /// List, describe and run workflows
    Workflow {
        #[command(subcommand)]
        action: WorkflowAction,
    },

    /// Inspect agent profiles
    Agent {
        #[command(subcommand)]
        action: AgentAction,
    },

    /// List the registered tools
    Tools,
}

#[derive(Subcommand)]
enum WorkflowAction {
    /// List the built-in workflows
    List,
    /// Show a workflow's stages and schemas
    Describe {
        /// Workflow path (e.g. "medicine")
        name: String,
    },
    /// Run a workflow and print its output
    Run {
        /// Workflow path (e.g. "medicine")
        name: String,
        /// Workflow input as a JSON string
        #[arg(long, short = 'i', default_value = "{}")]
        input: String,
        /// Print incremental output as it is produced
        #[arg(long)]
        stream: bool,
        /// Resume input for a suspension, used in order before prompting
        #[arg(long = "resume")]
        resume: Vec<String>,
    },
}

#[derive(Subcommand)]
enum AgentAction {
    /// List agent profiles (built-in and loaded from disk)
    List,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "medflow_core=warn,medflow_server=info,medflow_cli=info".into()),
        )
        .init();

    let result = match cli.command {
        Commands::Server {
            host,
            port,
            static_dir,
        } => commands::server::run(host, port, static_dir).await,

        Commands::Workflow { action } => match commands::init_state() {
            Ok(state) => match action {
                WorkflowAction::List => commands::workflow::list(&state).await,
                WorkflowAction::Describe { name } => commands::workflow::describe(&state, &name).await,
                WorkflowAction::Run {
                    name,
                    input,
                    stream,
                    resume,
                } => commands::workflow::run(&state, &name, &input, stream, resume).await,
            },
            Err(e) => Err(e),
        },

        Commands::Agent { action } => match commands::init_state() {
            Ok(state) => match action {
                AgentAction::List => commands::agent::list(&state).await,
            },
            Err(e) => Err(e),
        },

        Commands::Tools => match commands::init_state() {
            Ok(state) => commands::agent::list_tools(&state).await,
            Err(e) => Err(e),
        },
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
