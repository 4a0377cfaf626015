//! svcwatch controller binary

use std::sync::Arc;

use clap::Parser;
use k8s_openapi::api::core::v1::{Endpoints, Service};
use kube::{Api, Client};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use svcwatch::cache::ObjectCache;
use svcwatch::config::ControllerConfig;
use svcwatch::controller::Controller;
use svcwatch::dispatch::Dispatcher;
use svcwatch::informer::run_informer;
use svcwatch::key::ResourceKind;
use svcwatch::queue::WorkQueue;
use svcwatch::sink::{EventSink, TracingSink};
use svcwatch::translator::EventTranslator;

/// svcwatch - watch Services and Endpoints and reconcile them
#[derive(Parser, Debug)]
#[command(name = "svcwatch", version, about, long_about = None)]
struct Cli {
    /// Namespace to watch
    #[arg(long, env = "SVCWATCH_NAMESPACE", default_value = svcwatch::DEFAULT_NAMESPACE)]
    namespace: String,

    /// Number of concurrent reconcile workers
    #[arg(long, default_value_t = svcwatch::DEFAULT_WORKERS)]
    workers: usize,

    /// Initial per-key retry backoff in milliseconds
    #[arg(long, default_value_t = svcwatch::DEFAULT_BASE_BACKOFF.as_millis() as u64)]
    base_backoff_ms: u64,

    /// Maximum per-key retry backoff in seconds
    #[arg(long, default_value_t = svcwatch::DEFAULT_MAX_BACKOFF.as_secs())]
    max_backoff_secs: u64,
}

impl From<Cli> for ControllerConfig {
    fn from(cli: Cli) -> Self {
        Self {
            namespace: cli.namespace,
            workers: cli.workers,
            base_backoff: std::time::Duration::from_millis(cli.base_backoff_ms),
            max_backoff: std::time::Duration::from_secs(cli.max_backoff_secs),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let config = ControllerConfig::from(Cli::parse());
    tracing::info!(
        namespace = %config.namespace,
        workers = config.workers,
        "Starting svcwatch controller"
    );

    let client = Client::try_default().await?;

    // One token, cancelled exactly once on the first termination signal.
    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            termination_signal().await;
            tracing::info!("Termination signal received, shutting down");
            shutdown.cancel();
        });
    }

    let queue: WorkQueue<String> = WorkQueue::new(config.base_backoff, config.max_backoff);
    let sink: Arc<dyn EventSink> = Arc::new(TracingSink);
    let services: Arc<ObjectCache<Service>> = Arc::new(ObjectCache::new());
    let endpoints: Arc<ObjectCache<Endpoints>> = Arc::new(ObjectCache::new());
    let translator = Arc::new(EventTranslator::new(queue.clone(), Arc::clone(&sink)));
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&services),
        Arc::clone(&endpoints),
        Arc::clone(&sink),
    ));

    let service_api: Api<Service> = Api::namespaced(client.clone(), &config.namespace);
    let endpoints_api: Api<Endpoints> = Api::namespaced(client, &config.namespace);

    tokio::spawn(run_informer(
        ResourceKind::Service,
        service_api,
        Arc::clone(&services),
        Arc::clone(&translator),
        Arc::clone(&sink),
        shutdown.clone(),
    ));
    tokio::spawn(run_informer(
        ResourceKind::Endpoints,
        endpoints_api,
        Arc::clone(&endpoints),
        Arc::clone(&translator),
        Arc::clone(&sink),
        shutdown.clone(),
    ));

    let controller = Controller::new(queue, dispatcher, services, endpoints);
    controller.run(config.workers, shutdown).await?;

    tracing::info!("svcwatch controller shut down");
    Ok(())
}

/// Wait for the first SIGINT or SIGTERM.
///
/// Returning translates the OS signal into the cancellation token exactly
/// once; a second signal has nothing left to fire.
async fn termination_signal() {
    use tokio::signal;

    #[cfg(unix)]
    {
        let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(err) => {
                tracing::error!(error = %err, "Failed to install SIGTERM handler");
                let _ = signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = signal::ctrl_c().await;
    }
}
