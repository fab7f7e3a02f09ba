use std::sync::Arc;

use anyhow::{Context, Result};
use liquifan::{
    arg_parser::ArgsOptions, config::DaemonConfig, controller::Controller,
    diagnostics::TracingSink, logger,
};
use tokio::signal::ctrl_c;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse the command line arguments
    let args_options = ArgsOptions::parse();

    logger::init_logging(args_options.verbose);

    let config =
        DaemonConfig::load_or_default(args_options.config_file_path.as_deref())
            .with_context(|| "Failed to load the daemon configuration")?;

    // A curve or configuration error stops the daemon before any fan is touched
    let mut controller = Controller::from_config(
        &args_options.curve_file_path,
        &config,
        Arc::new(TracingSink),
    )
    .with_context(|| {
        format!(
            "Failed to load fan curve \"{}\"",
            args_options.curve_file_path.display()
        )
    })?;

    // This token and tracker will be used to handle graceful shutdown
    let tracker = TaskTracker::new();
    let token = CancellationToken::new();

    // Start the fan controller
    {
        let token = token.clone();

        tracker.spawn(async move {
            controller.run(token).await;
        });
    }

    let reason = wait_for_shutdown().await?;
    info!("Stopping: {reason}");

    // Cancel the token to communicate the program
    // termination to the running tasks
    token.cancel();

    // Wait for the tasks to finish
    tracker.close();
    tracker.wait().await;

    Ok(())
}

// Wait for Ctrl-C or SIGTERM and return which one was received
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .with_context(|| "Failed to install the SIGTERM handler")?;

    tokio::select! {
        res = ctrl_c() => {
            res.with_context(|| "Failed to listen for Ctrl-C")?;
            Ok("received Ctrl-C")
        },
        _ = sigterm.recv() => Ok("received SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    ctrl_c()
        .await
        .with_context(|| "Failed to listen for Ctrl-C")?;

    Ok("received Ctrl-C")
}
