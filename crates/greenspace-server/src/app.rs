//! Process wiring: builds every component from the configuration and runs
//! the long-lived tasks under one cancellation token.

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use greenspace_auth::{AuthRepository, DisabledAuth, OidcClient, OidcConfig};
use greenspace_control::{spawn_subscribers, PluginRegistry, RouteService, Services};
use greenspace_events::EventBus;
use greenspace_routing::{
    DisabledRouting, FsBucket, GpxBucket, OptimizationClient, OrsRouter, RoutePlanner,
    RoutingRepository, ValhallaRouter,
};
use greenspace_scheduler::Scheduler;
use greenspace_store::{RocksStore, StoreError};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{Config, ConfigError, RoutingProvider};
use crate::health::{self, HealthState};
use crate::mqtt::MqttIngress;

/// Startup failures.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The database could not be opened.
    #[error("failed to open database: {0}")]
    Store(#[from] StoreError),

    /// Opening the database took too long.
    #[error("timed out opening database at {0}")]
    StoreTimeout(PathBuf),

    /// GPX export is enabled but its bucket is missing.
    #[error("GPX bucket {0} does not exist")]
    MissingBucket(PathBuf),

    /// Binding or serving HTTP failed.
    #[error("HTTP server error: {0}")]
    Io(#[from] std::io::Error),

    /// A blocking task panicked.
    #[error("startup task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Every component of a running backend.
pub struct App {
    config: Config,
    /// The event bus.
    pub bus: Arc<EventBus>,
    /// Store-backed services.
    pub services: Services<RocksStore>,
    /// Route planning and GPX export.
    pub routes: Arc<RouteService<RocksStore>>,
    /// Registered plugins.
    pub plugins: Arc<PluginRegistry>,
    health: HealthState,
}

impl App {
    /// Open the database and build every component.
    ///
    /// # Errors
    ///
    /// Returns an error if the database can't be opened in time or an
    /// enabled GPX bucket is missing.
    pub async fn build(config: Config) -> Result<Self, AppError> {
        let store = open_store(&config).await?;
        let bus = Arc::new(EventBus::with_all_types());
        let services = Services::new(Arc::clone(&store), Arc::clone(&bus), config.control());

        let auth: Arc<dyn AuthRepository> = if config.auth.enable {
            tracing::info!(base_url = %config.auth.oidc_provider.base_url, "Authentication enabled");
            Arc::new(OidcClient::new(OidcConfig::from(&config.auth.oidc_provider)))
        } else {
            tracing::warn!("Authentication disabled; plugin registration is unavailable");
            Arc::new(DisabledAuth)
        };
        let plugins = Arc::new(PluginRegistry::new(auth, config.control()));

        let routes = Arc::new(RouteService::new(
            store,
            routing_backend(&config),
            gpx_bucket(&config).await?,
        ));

        let health = HealthState {
            mqtt_enabled: config.mqtt.enable,
            mqtt_connected: Arc::new(AtomicBool::new(false)),
        };

        Ok(Self {
            config,
            bus,
            services,
            routes,
            plugins,
            health,
        })
    }

    /// Run until `cancel` fires, then wait for every task to finish.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP listener can't be bound or the MQTT
    /// broker address is invalid.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), AppError> {
        let mut tasks: Vec<JoinHandle<()>> = Vec::new();

        {
            let bus = Arc::clone(&self.bus);
            let cancel = cancel.clone();
            tasks.push(tokio::spawn(async move {
                if let Err(e) = bus.run(cancel).await {
                    tracing::error!(error = %e, "Event bus stopped");
                }
            }));
        }
        tasks.extend(spawn_subscribers(&self.bus, &self.services, &cancel));
        tasks.extend(Scheduler::new(&self.services, self.config.scheduler.jobs.clone()).spawn(&cancel));
        {
            let plugins = Arc::clone(&self.plugins);
            let cancel = cancel.clone();
            tasks.push(tokio::spawn(async move { plugins.start_cleanup(cancel).await }));
        }

        if self.config.mqtt.enable {
            let ingress = MqttIngress::new(
                &self.config.mqtt,
                Arc::clone(&self.services.sensors),
                Arc::clone(&self.health.mqtt_connected),
            )?;
            tasks.push(tokio::spawn(ingress.run(cancel.clone())));
        } else {
            tracing::warn!("MQTT disabled; no telemetry will be ingested");
        }

        let listen_addr = self.config.server.listen_addr();
        let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
        tracing::info!(listen_addr = %listen_addr, "Starting HTTP server");
        let server = axum::serve(listener, health::router(self.health.clone()))
            .with_graceful_shutdown(cancel.clone().cancelled_owned());

        let served = server.await;
        cancel.cancel();
        for task in tasks {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Task panicked");
            }
        }
        tracing::info!("Shutdown complete");
        Ok(served?)
    }
}

async fn open_store(config: &Config) -> Result<Arc<RocksStore>, AppError> {
    let path = config.server.database.path.clone();
    tracing::info!(path = %path.display(), "Opening RocksDB store");
    let opening = tokio::task::spawn_blocking({
        let path = path.clone();
        move || RocksStore::open(path)
    });
    match tokio::time::timeout(config.server.database.timeout(), opening).await {
        Ok(joined) => Ok(Arc::new(joined??)),
        Err(_) => Err(AppError::StoreTimeout(path)),
    }
}

fn routing_backend(config: &Config) -> Arc<dyn RoutingRepository> {
    let routing = &config.routing;
    if !routing.enable {
        tracing::warn!("Routing disabled");
        return Arc::new(DisabledRouting);
    }
    let optimizer = OptimizationClient::new(routing.optimization.host.clone());
    tracing::info!(provider = ?routing.provider, host = %routing.provider_host(), "Routing enabled");
    match routing.provider {
        RoutingProvider::Ors => Arc::new(RoutePlanner::new(
            optimizer,
            OrsRouter::new(routing.ors.host.clone()),
            routing.endpoints(),
        )),
        RoutingProvider::Valhalla => Arc::new(RoutePlanner::new(
            optimizer,
            ValhallaRouter::new(routing.valhalla.host.clone()),
            routing.endpoints(),
        )),
    }
}

async fn gpx_bucket(config: &Config) -> Result<Option<Arc<dyn GpxBucket>>, AppError> {
    if !config.s3.enable {
        return Ok(None);
    }
    let root = config.s3.route_gpx.bucket.clone();
    let bucket = FsBucket::new(root.clone());
    if !bucket.bucket_exists().await {
        return Err(AppError::MissingBucket(root));
    }
    tracing::info!(bucket = %root.display(), "GPX export enabled");
    Ok(Some(Arc::new(bucket)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(dir: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.server.database.path = dir.join("db");
        config.server.port = 0;
        config
    }

    #[tokio::test]
    async fn builds_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let app = App::build(config(dir.path())).await.unwrap();
        assert!(app.plugins.get_all().is_empty());
        assert!(app.services.trees.get_all(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_gpx_bucket_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.s3.enable = true;
        config.s3.route_gpx.bucket = dir.path().join("absent");
        assert!(matches!(
            App::build(config).await,
            Err(AppError::MissingBucket(_))
        ));
    }

    #[tokio::test]
    async fn runs_until_cancelled() {
        let dir = tempfile::tempdir().unwrap();
        let app = App::build(config(dir.path())).await.unwrap();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(app.run(cancel.clone()));

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        cancel.cancel();
        handle.await.unwrap().unwrap();
    }
}
