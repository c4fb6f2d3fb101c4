use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use clap::Parser;
use scopekeeper::{
    config::ScopekeeperConfig,
    declared::Declaration,
    events::{EventBus, EventLog, EventSink},
    jobs,
    observability,
    provider::HttpScopeProvider,
    reconcile::{PassContext, ScopeReconciler},
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

/// CLI arguments for Scopekeeper
#[derive(Parser, Debug)]
#[command(version, about = "Reconciles declared API scopes with an identity provider", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Path to config file
    #[arg(short, long, global = true, default_value = "scopekeeper.toml")]
    config: PathBuf,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Run one reconciliation pass for a declaration and print the report
    Reconcile {
        /// Declaration file of the owning resource
        #[arg(short, long)]
        declaration: PathBuf,
    },
    /// Deactivate every registered scope of a declaration
    Finalize {
        /// Declaration file of the owning resource
        #[arg(short, long)]
        declaration: PathBuf,
    },
    /// Run the periodic sync worker until interrupted
    Run,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let config = match ScopekeeperConfig::from_file(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!(
                "Failed to load config from {}: {}",
                args.config.display(),
                e
            );
            std::process::exit(1);
        }
    };

    if let Err(e) = observability::init_tracing(&config.observability.logging) {
        eprintln!("Failed to initialize tracing: {e}");
        std::process::exit(1);
    }

    if let Err(e) = observability::metrics::init_metrics(&config.observability.metrics) {
        tracing::warn!(error = %e, "Failed to initialize metrics");
    }

    let provider = match HttpScopeProvider::new(&config.provider) {
        Ok(p) => Arc::new(p),
        Err(e) => {
            tracing::error!(error = %e, "Failed to create provider client");
            std::process::exit(1);
        }
    };

    tracing::info!(
        config_file = %args.config.display(),
        cluster = %config.cluster_name,
        endpoint = %config.provider.endpoint,
        "Starting scopekeeper"
    );

    match args.command {
        Command::Reconcile { declaration } => {
            let events = Arc::new(EventLog::new());
            let reconciler =
                ScopeReconciler::new(provider, events.clone(), config.cluster_name.clone());
            let declaration = load_declaration(&declaration);
            let ctx = PassContext::with_cancellation(declaration.owner.clone(), ctrl_c_token());

            let result = reconciler.process(&ctx, &declaration.scopes).await;
            log_events(events.drain());
            match result {
                Ok(report) => print_json(&report),
                Err(e) => exit_with_error("Reconciliation failed", &e),
            }
        }
        Command::Finalize { declaration } => {
            let events = Arc::new(EventLog::new());
            let reconciler =
                ScopeReconciler::new(provider, events.clone(), config.cluster_name.clone());
            let declaration = load_declaration(&declaration);
            let ctx = PassContext::with_cancellation(declaration.owner.clone(), ctrl_c_token());

            let result = reconciler.finalize(&ctx, &declaration.scopes).await;
            log_events(events.drain());
            match result {
                Ok(report) => print_json(&report),
                Err(e) => exit_with_error("Finalization failed", &e),
            }
        }
        Command::Run => {
            let bus = Arc::new(EventBus::new());
            let mut receiver = bus.subscribe();
            tokio::spawn(async move {
                loop {
                    match receiver.recv().await {
                        Ok(event) => log_events([event]),
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "Event logger lagged behind");
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    }
                }
            });

            let sink: Arc<dyn EventSink> = bus;
            let reconciler = ScopeReconciler::new(provider, sink, config.cluster_name.clone());
            let shutdown = ctrl_c_token();
            jobs::start_scope_sync_worker(reconciler, config.sync.clone(), shutdown).await;
        }
    }
}

/// A token cancelled on Ctrl-C or SIGTERM.
fn ctrl_c_token() -> CancellationToken {
    let token = CancellationToken::new();
    let cancel = token.clone();

    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "Failed to install Ctrl+C handler");
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
                    tracing::warn!(error = %e, "Failed to install SIGTERM handler");
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

        tracing::info!("Shutdown signal received, cancelling in-flight work");
        cancel.cancel();
    });

    token
}

fn load_declaration(path: &Path) -> Declaration {
    match Declaration::from_file(path) {
        Ok(d) => d,
        Err(e) => {
            tracing::error!(error = %e, path = %path.display(), "Failed to load declaration");
            std::process::exit(1);
        }
    }
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => tracing::warn!(error = %e, "Failed to serialize report"),
    }
}

fn exit_with_error(context: &str, error: &dyn std::error::Error) -> ! {
    tracing::error!(error = %error, "{context}");
    std::process::exit(1);
}

fn log_events(events: impl IntoIterator<Item = scopekeeper::events::ReconcileEvent>) {
    for event in events {
        tracing::info!(
            owner = %event.owner,
            severity = ?event.severity,
            reason = %event.reason,
            "{}",
            event.message
        );
    }
}
