use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::oneshot;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use shelter_loadtest::api;
use shelter_loadtest::catalog::Catalog;
use shelter_loadtest::client::build_client;
use shelter_loadtest::config::{print_config_help, EngineConfig};
use shelter_loadtest::executor::RequestExecutor;
use shelter_loadtest::metrics::register_metrics;
use shelter_loadtest::run::LoadRunner;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,hyper=warn,reqwest=warn"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
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
                error!(error = %e, "Failed to listen for SIGTERM");
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
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    init_tracing();
    register_metrics()?;

    let config = match EngineConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}\n", e);
            print_config_help();
            std::process::exit(1);
        }
    };
    config.log_summary();

    let client_result = build_client(&config.to_client_config())?;
    for (name, value) in client_result.parsed_headers.iter() {
        info!(header = %name, value_len = value.len(), "Custom header applied");
    }
    let executor = RequestExecutor::new(client_result.client, &config.target_url);
    let runner = Arc::new(LoadRunner::new(
        executor,
        Catalog::animal_shelter(),
        config.to_runner_settings(),
    ));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let mut server = tokio::spawn(api::serve(addr, runner.clone(), async move {
        let _ = shutdown_rx.await;
    }));

    tokio::select! {
        result = &mut server => {
            // Server exited on its own, usually a bind failure
            runner.force_stop().await;
            return match result {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(e.into()),
                Err(e) => Err(e.into()),
            };
        }
        _ = shutdown_signal() => {}
    }

    runner.force_stop().await;
    let _ = shutdown_tx.send(());
    match server.await {
        Ok(Ok(())) => info!("Control server stopped"),
        Ok(Err(e)) => warn!(error = %e, "Control server exited with error"),
        Err(e) => warn!(error = %e, "Control server task failed"),
    }

    Ok(())
}
