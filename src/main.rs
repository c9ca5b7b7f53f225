use lumasync::config::{Cli, Config, default_config_path};
use lumasync::engine::{Settings, SyncLoop};
use lumasync::handler::AppState;
use lumasync::hue::HueBridge;
use lumasync::plex::PlexServer;
use clap::Parser;
use tokio::signal;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let args = Cli::parse();

    let config_path = match args.config_path {
        Some(path) => std::path::PathBuf::from(path),
        None => default_config_path(),
    };

    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    tracing::info!("lumasync.svc starting");

    let cfg = Config::new(&config_path.to_string_lossy()).unwrap_or_else(|e| {
        tracing::error!(error = %e, path = ?config_path, "failed to load config file");
        std::process::exit(1);
    });
    let plex = PlexServer::new(&cfg.plex).unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to setup plex client");
        std::process::exit(1);
    });
    let bridge = HueBridge::new(&cfg.bridge).unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to setup hue bridge client");
        std::process::exit(1);
    });
    let (sync, engine) = SyncLoop::new(plex, bridge, Settings::from_config(&cfg)).unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to setup sync loop");
        std::process::exit(1);
    });

    if args.armed {
        engine.arm();
    }
    let worker = tokio::spawn(sync.run());

    let address = format!("0.0.0.0:{}", cfg.app.get_port());
    let app = lumasync::router(AppState { engine: engine.clone() });

    let listener = tokio::net::TcpListener::bind(&address).await.unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to setup tcp listener");
        std::process::exit(1);
    });

    tracing::info!("lumasync.svc running on {}", &address);
    tokio::select! {
        result = axum::serve(listener, app) => {
            if let Err(err) = result {
                tracing::error!(error = %err, "http server stopped");
            }
        }
        _ = signal::ctrl_c() => {
            tracing::info!("ctrl+c signal received, preparing to shutdown");
        }
    }

    engine.shutdown();
    if let Err(e) = worker.await {
        tracing::error!(error = %e, "sync worker panicked");
    }
    tracing::info!("lumasync.svc going off, graceful shutdown complete");
}
