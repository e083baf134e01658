// Slipstream entry point.
//
// Startup sequence:
// 1. Initialize tracing (log to file, not the terminal)
// 2. Load config
// 3. Build the app (HTTP backend, session client, channel manager)
// 4. Create command/auth channels
// 5. Sign in if a session token is configured
// 6. Forward Ctrl+C as a quit command
// 7. Run the event loop until quit

use slipstream_client::app::{App, AuthEvent, UserCommand};
use slipstream_client::config;

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing()?;
    info!("slipstream starting up");

    let config = config::load_config().context("failed to load configuration")?;
    info!(
        "config loaded: league={}, race={}, team={}",
        config.league.league_id, config.league.race_id, config.league.team_id
    );

    let session_token = config.credentials.session_token.clone();
    let (command_tx, command_rx) = mpsc::channel(64);
    let (auth_tx, auth_rx) = mpsc::channel(8);

    let app = App::new(config);

    match session_token {
        Some(token) => {
            auth_tx
                .send(AuthEvent::SignedIn {
                    session_token: token,
                })
                .await
                .ok();
        }
        None => warn!("no session token configured; staying signed out (see credentials.toml)"),
    }

    // Ctrl+C becomes a clean shutdown through the command channel.
    let quit_tx = command_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, shutting down");
            let _ = quit_tx.send(UserCommand::Quit).await;
        }
    });
    drop(command_tx);

    app.run(command_rx, auth_rx).await?;

    info!("slipstream shut down cleanly");
    Ok(())
}

/// Initialize tracing to log to a file so stdout stays clean for whatever
/// hosts the client.
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = std::env::current_dir()?.join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let log_file = std::fs::File::create(log_dir.join("slipstream.log"))?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("slipstream_client=info,warn")),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
