use anyhow::{Context, Result};
use clap::Parser;
use media_relay::{
    create_router, AppState, CaptureSource, Config, NatsConnector, SessionController,
    SessionEvent, WavFileSource,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

/// Relay a capture source to a remote transcoding service
#[derive(Debug, Parser)]
#[command(name = "media-relay", version)]
struct Cli {
    /// Config file, extension optional
    #[arg(short, long, default_value = "config/media-relay")]
    config: String,

    /// Remote host (overrides session.host)
    #[arg(long)]
    host: Option<String>,

    /// WAV file to relay (overrides capture.input)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Stop after this many seconds instead of waiting for Ctrl-C
    #[arg(short, long)]
    duration: Option<u64>,

    /// Serve the HTTP control API and wait for commands instead of starting
    #[arg(long)]
    serve: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let mut cfg = Config::load(&cli.config)?;

    if let Some(host) = cli.host {
        cfg.session.host = Some(host);
    }

    let input = cli
        .input
        .or(cfg.capture.input.take())
        .context("No input: pass --input or set capture.input")?;

    info!("Media relay v{}", env!("CARGO_PKG_VERSION"));
    info!("Capture source: {}", input.display());

    let source: Arc<dyn CaptureSource> = Arc::new(WavFileSource::new(input));
    let controller =
        Arc::new(SessionController::connect(cfg.session, Arc::downgrade(&source), &NatsConnector).await?);

    let events = tokio::spawn(log_events(controller.subscribe()));

    if cli.serve {
        let addr = format!("{}:{}", cfg.http.bind, cfg.http.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;

        info!("HTTP control API listening on {}", addr);

        axum::serve(listener, create_router(AppState::new(Arc::clone(&controller))))
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("HTTP server failed")?;
    } else {
        controller.start().await?;

        match cli.duration {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => shutdown_signal().await,
        }
    }

    controller.stop().await?;

    let status = controller.status();
    info!(
        "Relayed {} chunks ({} rejected by the remote)",
        status.chunks_sent, status.chunk_errors
    );

    match Arc::try_unwrap(controller) {
        Ok(controller) => controller.destroy().await,
        Err(_) => warn!("Session controller still shared at shutdown; skipping teardown"),
    }

    let _ = events.await;

    Ok(())
}

async fn log_events(mut events: tokio::sync::broadcast::Receiver<SessionEvent>) {
    loop {
        match events.recv().await {
            Ok(SessionEvent::Error(descriptor)) => warn!("Remote error: {}", descriptor),
            Ok(SessionEvent::FfmpegOutput(text)) => info!(target: "ffmpeg", "{}", text.trim_end()),
            Ok(SessionEvent::Destroyed) => break,
            Err(RecvError::Lagged(skipped)) => warn!("Dropped {} session events", skipped),
            Err(RecvError::Closed) => break,
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
    }
    info!("Shutting down");
}
