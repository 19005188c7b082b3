use std::net::SocketAddr;

use hirewise::notification::{NotificationRepository, sweeper};
use hirewise::telemetry;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const DEFAULT_PORT: u16 = 5000;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,hirewise=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => {}
                    _ = sigint.recv() => {}
                }
            },
            _ => {
                let _ = tokio::signal::ctrl_c().await;
            },
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    tracing::info!("shutdown signal received");
}

#[tokio::main]
async fn main() {
    init_tracing();

    // OTLP export only when a collector is configured.
    let tracer = if std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok() {
        match telemetry::setup_tracer() {
            Ok(provider) => {
                opentelemetry::global::set_tracer_provider(provider.clone());
                Some(provider)
            },
            Err(err) => {
                tracing::warn!(error = %err, "cannot create OTLP tracer");
                None
            },
        }
    } else {
        None
    };

    let metrics = match telemetry::setup_metrics_recorder() {
        Ok(handle) => Some(handle),
        Err(err) => {
            tracing::warn!(error = %err, "cannot install Prometheus recorder");
            None
        },
    };

    let state = match hirewise::initialize_state(metrics).await {
        Ok(state) => state,
        Err(err) => {
            tracing::error!(error = %err, "cannot initialize application state");
            std::process::exit(1);
        },
    };

    let sweeper = sweeper::spawn(
        NotificationRepository::new(state.db.postgres.clone()),
        sweeper::SWEEP_INTERVAL,
    );

    let port = std::env::var("PORT")
        .ok()
        .and_then(|port| port.parse::<u16>().ok())
        .unwrap_or(DEFAULT_PORT);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(%addr, error = %err, "cannot bind port");
            std::process::exit(1);
        },
    };
    tracing::info!(%addr, "server started");

    if let Err(err) = axum::serve(listener, hirewise::app(state))
        .with_graceful_shutdown(wait_for_shutdown_signal())
        .await
    {
        tracing::error!(error = %err, "server stopped unexpectedly");
    }

    sweeper.abort();
    if let Some(provider) = tracer {
        if let Err(err) = provider.shutdown() {
            tracing::warn!(error = %err, "cannot flush OTLP spans");
        }
    }
}
