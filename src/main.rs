use clap::Parser;
use matcam::{create_router, ClusterConfig, CoordinationLoop, Coordinator};
use std::path::PathBuf;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "matcam")]
#[command(about = "Matcam - camera recording coordinator for a small server cluster", long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Node id (defaults to the last digit of the hostname)
    #[arg(long)]
    node_id: Option<u8>,

    /// Share directory holding the per-day data
    #[arg(long)]
    data_root: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Capture program started per owned camera
    #[arg(long)]
    capture_exec: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "matcam=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = match &args.config {
        Some(path) => ClusterConfig::from_file(path)?,
        None => ClusterConfig::new(args.node_id, args.data_root.clone()),
    };
    if let Some(node_id) = args.node_id {
        config.node_id = node_id;
    }
    if let Some(data_root) = args.data_root {
        config.data_root = data_root;
    }
    if let Some(port) = args.port {
        config.listen_port = port;
    }
    if let Some(capture_exec) = args.capture_exec {
        config.capture_exec = capture_exec;
    }
    if config.node_id == 0 || config.node_id > config.max_nodes {
        anyhow::bail!("node id {} is outside 1..={}", config.node_id, config.max_nodes);
    }
    tracing::info!("Node ID: {}", config.node_id);

    let addr = config.listen_addr();
    let coordinator = Coordinator::from_config(config);
    coordinator.init().await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let control_loop = tokio::spawn(CoordinationLoop::new(coordinator.clone(), shutdown_rx).run());

    let app = create_router(coordinator);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .await?;

    // The loop stops every running capture before returning
    if let Err(e) = control_loop.await {
        tracing::error!("Coordination loop panicked: {}", e);
    }
    tracing::info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal(shutdown: watch::Sender<bool>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, stopping captures...");
    let _ = shutdown.send(true);
}
