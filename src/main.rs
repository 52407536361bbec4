use clap::Parser;
use content_hub::config::AppConfig;
use content_hub::infrastructure::{database, storage};
use content_hub::services::worker::BackgroundWorker;
use content_hub::{AppState, create_app};
use dotenvy::dotenv;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Service type to run (api, worker, all)
    #[arg(short, long, default_value = "all")]
    mode: String,

    /// Port for the API server, overrides PORT
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initial Environment & Logging Setup
    dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "content_hub=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let run_api = matches!(args.mode.as_str(), "api" | "all");
    let run_worker = matches!(args.mode.as_str(), "worker" | "all");
    if !run_api && !run_worker {
        anyhow::bail!("unknown mode '{}', expected api, worker or all", args.mode);
    }

    info!("🚀 Starting Content Hub [Mode: {}]...", args.mode);

    // 2. Setup Common Infrastructure
    let mut config = AppConfig::load()?;
    if let Some(port) = args.port {
        config.port = port;
    }
    if config.jwt_secret == AppConfig::default().jwt_secret {
        warn!("⚠️  JWT_SECRET is not set, using an insecure default");
    }

    let db = database::setup_database(&config).await?;
    let storage_service = storage::setup_storage(&config).await?;

    // 3. Setup Graceful Shutdown Channel
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    // 4. Initialize Worker Service
    if run_worker {
        if config.share_cleanup_interval_secs > 0 {
            let worker = BackgroundWorker::new(
                db.clone(),
                storage_service.clone(),
                Duration::from_secs(config.share_cleanup_interval_secs),
                shutdown_rx.clone(),
            );
            tokio::spawn(worker.run());
            info!("👷 Worker service initialized.");
        } else {
            info!("👷 Share cleanup disabled (SHARE_CLEANUP_INTERVAL_SECS=0)");
        }
    }

    // 5. Initialize API Service
    if run_api {
        let port = config.port;
        let state = AppState {
            db: db.clone(),
            storage: storage_service.clone(),
            config,
        };

        let app = create_app(state);
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let listener = tokio::net::TcpListener::bind(addr).await?;

        info!("✅ API Server listening on: http://0.0.0.0:{}", port);
        info!("📖 Swagger UI documentation: http://localhost:{}/swagger-ui", port);

        let mut server_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = server_shutdown.changed().await;
                })
                .await
            {
                error!("❌ Server runtime error: {}", e);
            }
        });
    }

    // 6. Wait for Shutdown Signal
    shutdown_signal().await;
    let _ = shutdown_tx.send(true);

    info!("🛑 Shutting down services...");
    info!("👋 Exited cleanly.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("⌨️  Ctrl+C received, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("💤 SIGTERM received, initiating graceful shutdown...");
        },
    }
}
