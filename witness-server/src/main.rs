use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use witness_server::embedding::GeminiEmbedder;
use witness_server::{persistence, router, ServerConfig};

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize tracing subscriber for logging
    let mut filter = EnvFilter::from_default_env();
    for directive in ["witness_server=info", "witness_core=info"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Initializing Witness Server...");
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Server failed");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = ServerConfig::from_env()?;
    info!(
        data_path = ?config.data_path,
        model = %config.embedding_model,
        dimensions = config.embedding_dimensions,
        retrieval = ?config.retrieval,
        "Configuration loaded"
    );

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let embedder = Arc::new(GeminiEmbedder::new(&config)?);
    let app_state = persistence::load_on_startup(config, embedder)?;
    info!("Application state created.");

    let app = router(app_state.clone());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Starting server on {}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // In-flight requests have drained; nothing writes after this.
    persistence::save_on_shutdown(&app_state);
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
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
                error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>(); // On non-Unix, just wait for Ctrl+C

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("Received terminate signal, initiating graceful shutdown...");
        },
    }
}
