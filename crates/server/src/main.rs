mod api;
mod router;
mod state;

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::state::AppState;

/// Tool-calling chat service for the oikos finance assistant.
#[derive(Parser, Debug)]
#[command(name = "oikos-server", version, about = "Tool-calling chat service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the HTTP API (default)
    Serve {
        /// Override the configured bind host
        #[arg(long)]
        host: Option<String>,
        /// Override the configured port
        #[arg(long)]
        port: Option<u16>,
    },
    /// Run one non-streaming tool-calling turn and print the answer
    Run {
        /// User whose ledger the tools act on
        #[arg(long, env = "OIKOS_USER_ID", default_value_t = 1)]
        user: i64,
        /// System prompt override
        #[arg(long)]
        system: Option<String>,
        message: String,
    },
}

fn load_config() -> oikos_core::Config {
    oikos_core::config::load_dotenv();
    oikos_core::Config::from_env()
}

async fn serve(state: Arc<AppState>, host: String, port: u16) -> anyhow::Result<()> {
    let app = router::build_router(state);
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_level(true)
        .init();

    let cli = Cli::parse();
    let config = load_config();
    config.log_summary();

    let state = Arc::new(AppState::from_config(&config)?);

    match cli.command {
        None => serve(state, config.server.host.clone(), config.server.port).await,
        Some(Command::Serve { host, port }) => {
            let host = host.unwrap_or_else(|| config.server.host.clone());
            serve(state, host, port.unwrap_or(config.server.port)).await
        }
        Some(Command::Run { user, system, message }) => {
            let system = system.unwrap_or_else(|| config.chat.system_prompt.clone());
            let answer = state.agent.run_with_tools(user, &system, &message).await;
            println!("{answer}");
            Ok(())
        }
    }
}
