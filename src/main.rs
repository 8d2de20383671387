//! vcluster syncer
//!
//! Main entry point. Loads configuration, connects to the virtual and host
//! API servers, and runs one pair of sync controllers per enabled kind.

use std::path::Path;

use k8s_openapi::api::core::v1::Namespace;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Client};
use tokio::signal;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use vcluster_syncer::config::{LoggingConfig, SyncerConfig};
use vcluster_syncer::controllers::{sync_controller, Context};
use vcluster_syncer::resources::{
    ConfigMapSyncer, PodDisruptionBudgetSyncer, SecretSyncer, ServiceAccountSyncer,
};
use vcluster_syncer::retry::{retry_with_backoff, RetryConfig};
use vcluster_syncer::{metrics, Error};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = SyncerConfig::load()?;
    init_tracing(&config.logging);

    config.validate()?;
    let translator = config.translator()?;
    info!(
        name = %config.name,
        mode = ?translator.mode(),
        "Starting vcluster syncer"
    );

    let virtual_client = connect(config.virtual_kubeconfig.as_deref()).await?;
    info!("Connected to virtual API server");
    let host_client = connect(config.host_kubeconfig.as_deref()).await?;
    info!("Connected to host API server");

    if let Some(namespace) = translator.host_namespace_scope() {
        wait_for_namespace(&host_client, namespace).await?;
    }

    let metrics_port = config.metrics_port;
    let toggles = config.sync.clone();
    let context = Context::new(virtual_client, host_client, translator, config);
    let shutdown = CancellationToken::new();

    let metrics_handle = tokio::spawn(metrics::serve(metrics_port, shutdown.clone()));
    info!("Metrics server starting on port {}", metrics_port);

    let mut controllers = JoinSet::new();
    let translator = context.translator.clone();
    if toggles.pod_disruption_budgets {
        context.register_kind();
        controllers.spawn(sync_controller::run(
            context.clone(),
            PodDisruptionBudgetSyncer::new(translator.clone()),
        ));
    }
    if toggles.service_accounts {
        context.register_kind();
        controllers.spawn(sync_controller::run(
            context.clone(),
            ServiceAccountSyncer::new(translator.clone()),
        ));
    }
    if toggles.secrets {
        context.register_kind();
        controllers.spawn(sync_controller::run(
            context.clone(),
            SecretSyncer::new(translator.clone()),
        ));
    }
    if toggles.config_maps {
        context.register_kind();
        controllers.spawn(sync_controller::run(
            context.clone(),
            ConfigMapSyncer::new(translator.clone()),
        ));
    }
    if controllers.is_empty() {
        anyhow::bail!("no resource kinds are enabled for syncing");
    }

    tokio::select! {
        _ = controllers.join_next() => {
            error!("Sync controller exited unexpectedly");
        }
        _ = metrics_handle => {
            error!("Metrics server exited unexpectedly");
        }
        _ = shutdown_signal() => {
            info!("Received shutdown signal, stopping syncer");
        }
    }

    shutdown.cancel();
    controllers.shutdown().await;

    info!("vcluster syncer stopped");
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let registry = tracing_subscriber::registry().with(env_filter);
    if logging.json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Client for the cluster in `kubeconfig`, or the in-cluster/default config
async fn connect(kubeconfig: Option<&Path>) -> anyhow::Result<Client> {
    let Some(path) = kubeconfig else {
        return Ok(Client::try_default().await?);
    };

    let kubeconfig = Kubeconfig::read_from(path)?;
    let config = kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default()).await?;
    Ok(Client::try_from(config)?)
}

/// Block until the target namespace can be read. A namespace that does not
/// exist is a configuration error and is not retried.
async fn wait_for_namespace(client: &Client, namespace: &str) -> anyhow::Result<()> {
    let namespaces: Api<Namespace> = Api::all(client.clone());
    let namespaces = &namespaces;

    retry_with_backoff(
        &RetryConfig::startup(),
        "check target namespace",
        Error::is_transient,
        move || async move {
            match namespaces.get_opt(namespace).await {
                Ok(Some(_)) => Ok(()),
                Ok(None) => Err(Error::ConfigError(format!(
                    "target namespace '{}' does not exist on the host cluster",
                    namespace
                ))),
                Err(e) => Err(Error::KubeError(e.to_string())),
            }
        },
    )
    .await?;

    info!("Target namespace {} is available", namespace);
    Ok(())
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install CTRL+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received CTRL+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
