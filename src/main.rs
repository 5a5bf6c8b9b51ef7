use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use browser_warden::config::GatewayConfig;
use browser_warden::session::SessionContext;
use browser_warden::{diagnostics, server};

#[derive(Parser)]
#[command(name = "browser-warden", version, about = "Multi-agent gateway onto a shared browser")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve tool calls over stdio (default).
    Serve,
    /// Print resolved configuration and session diagnostics, then exit.
    Doctor,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("WARDEN_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let context = match GatewayConfig::from_env() {
        Ok(config) => SessionContext::new(config),
        Err(err) => {
            warn!(target: "warden", %err, "configuration is invalid");
            Err(err)
        }
    };

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => server::serve(context).await?,
        Command::Doctor => match context {
            Ok(ctx) => {
                let state = ctx.lock_state().await;
                let diag = diagnostics::collect(&ctx, &state).await;
                println!("{}", serde_json::to_string_pretty(&diag)?);
            }
            Err(err) => {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "ok": false,
                        "error": "config_error",
                        "message": err.to_string(),
                    }))?
                );
            }
        },
    }

    Ok(())
}
