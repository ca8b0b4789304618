// rostersync entry point.
//
// Startup sequence:
// 1. Initialize tracing (log to file; stdin/stdout belong to the operator)
// 2. Load config
// 3. Build the game client adapter
// 4. Start the roster engines and their monitor controllers
// 5. Forward stdin lines to the app loop until `quit`, EOF or Ctrl+C
// 6. Shut the controllers down

use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info};

use rostersync_app::app;
use rostersync_app::client::GameClient;
use rostersync_core::config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize tracing
    init_tracing()?;
    info!("rostersync starting up");

    // 2. Load config
    let config = config::load_config().context("failed to load configuration")?;
    info!(
        "Config loaded: client={}, poll every {}ms, check floor {}ms",
        config.client.base_url, config.polling.interval_ms, config.polling.min_check_interval_ms
    );

    // 3. Game client adapter
    let client = Arc::new(GameClient::from_config(&config).context("failed to build HTTP client")?);
    if config.credentials.auth_token.is_none() {
        info!("No auth token configured; requests are sent without credentials");
    }

    // 4. Engines and controllers
    let app = app::App::start(&config, client);

    // 5. Input loop
    let (line_tx, line_rx) = mpsc::unbounded_channel();
    let reader_handle = tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if line_tx.send(line).is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    error!("Failed to read stdin: {}", e);
                    break;
                }
            }
        }
    });

    let mut app_handle = tokio::spawn(app::run(app, line_rx));
    tokio::select! {
        result = &mut app_handle => {
            match result {
                Ok(Err(e)) => error!("Application loop error: {}", e),
                Err(e) => error!("Application task failed: {}", e),
                Ok(Ok(())) => {}
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl+C received, shutting down");
            // Closing the input channel lets the loop shut the engines down.
            reader_handle.abort();
            let _ = tokio::time::timeout(std::time::Duration::from_secs(5), app_handle).await;
        }
    }

    info!("rostersync shut down cleanly");
    Ok(())
}

/// Initialize tracing to log to a file.
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = std::env::current_dir()?.join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let log_file = std::fs::File::create(log_dir.join("rostersync.log"))?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("rostersync=info,warn")),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
