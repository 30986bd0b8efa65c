//! Runtime registry of external plugins.
//!
//! Plugins register with credentials checked against the identity provider
//! and must keep sending heartbeats. A cleanup loop evicts plugins that have
//! been silent for longer than the configured timeout.

use std::collections::HashMap;
use std::sync::Arc;

use greenspace_auth::{AuthRepository, ClientToken};
use greenspace_core::{Result, ServiceError};
use parking_lot::RwLock;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::types::{ControlConfig, Plugin};

#[derive(Default)]
struct Registry {
    plugins: HashMap<String, Plugin>,
    heartbeats: HashMap<String, Instant>,
}

/// Registered plugins and their last heartbeat.
pub struct PluginRegistry {
    auth: Arc<dyn AuthRepository>,
    config: ControlConfig,
    state: RwLock<Registry>,
}

impl PluginRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new(auth: Arc<dyn AuthRepository>, config: ControlConfig) -> Self {
        Self {
            auth,
            config,
            state: RwLock::new(Registry::default()),
        }
    }

    /// Register a plugin and return the token it authenticates with.
    ///
    /// # Errors
    ///
    /// Returns `BadRequest` for missing fields, `Unauthorized` for rejected
    /// credentials and `Conflict` if the slug is taken.
    pub async fn register(&self, plugin: Plugin) -> Result<ClientToken> {
        plugin.validate()?;
        self.ensure_free(&plugin.slug)?;

        let token = self
            .auth
            .get_access_token_from_password(&plugin.auth.username, &plugin.auth.password)
            .await
            .map_err(|e| {
                tracing::warn!(slug = %plugin.slug, error = %e, "Plugin login failed");
                ServiceError::from(e)
            })?;

        let mut state = self.state.write();
        if state.plugins.contains_key(&plugin.slug) {
            return Err(already_registered(&plugin.slug));
        }
        state.heartbeats.insert(plugin.slug.clone(), Instant::now());
        tracing::info!(slug = %plugin.slug, name = %plugin.name, "Registered plugin");
        state.plugins.insert(plugin.slug.clone(), plugin);
        Ok(token)
    }

    /// Record a sign of life.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the plugin is not registered.
    pub fn heartbeat(&self, slug: &str) -> Result<()> {
        let mut state = self.state.write();
        match state.heartbeats.get_mut(slug) {
            Some(last) => {
                *last = Instant::now();
                tracing::trace!(slug, "Plugin heartbeat");
                Ok(())
            }
            None => Err(not_registered(slug)),
        }
    }

    /// Exchange a plugin's refresh token for a new token.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the plugin is not registered and `Unauthorized`
    /// if the refresh token is rejected.
    pub async fn refresh_token(&self, slug: &str, refresh_token: &str) -> Result<ClientToken> {
        if !self.state.read().plugins.contains_key(slug) {
            return Err(not_registered(slug));
        }
        Ok(self.auth.refresh_token(refresh_token).await?)
    }

    /// Get a plugin by slug.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the plugin is not registered.
    pub fn get(&self, slug: &str) -> Result<Plugin> {
        self.state
            .read()
            .plugins
            .get(slug)
            .cloned()
            .ok_or_else(|| not_registered(slug))
    }

    /// Snapshot of every registered plugin, ordered by slug.
    #[must_use]
    pub fn get_all(&self) -> Vec<Plugin> {
        let mut plugins: Vec<Plugin> = self.state.read().plugins.values().cloned().collect();
        plugins.sort_by(|a, b| a.slug.cmp(&b.slug));
        plugins
    }

    /// Remove a plugin. Unknown slugs are ignored.
    pub fn unregister(&self, slug: &str) {
        let mut state = self.state.write();
        state.heartbeats.remove(slug);
        if state.plugins.remove(slug).is_some() {
            tracing::info!(slug, "Unregistered plugin");
        }
    }

    /// Evict plugins silent for longer than the timeout. Returns their slugs.
    pub fn evict_expired(&self) -> Vec<String> {
        let timeout = self.config.plugin_timeout();
        let now = Instant::now();
        let mut state = self.state.write();

        let expired: Vec<String> = state
            .heartbeats
            .iter()
            .filter(|(_, last)| now.duration_since(**last) > timeout)
            .map(|(slug, _)| slug.clone())
            .collect();
        for slug in &expired {
            state.heartbeats.remove(slug);
            state.plugins.remove(slug);
            tracing::warn!(slug = %slug, timeout_secs = timeout.as_secs(), "Evicted silent plugin");
        }
        expired
    }

    /// Evict silent plugins every interval until `cancel` fires.
    pub async fn start_cleanup(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.plugin_interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tracing::debug!(interval_secs = self.config.plugin_interval().as_secs(), "Plugin cleanup started");

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.evict_expired();
                }
            }
        }
        tracing::debug!("Plugin cleanup stopped");
    }

    fn ensure_free(&self, slug: &str) -> Result<()> {
        if self.state.read().plugins.contains_key(slug) {
            Err(already_registered(slug))
        } else {
            Ok(())
        }
    }
}

fn not_registered(slug: &str) -> ServiceError {
    ServiceError::not_found(format!("plugin {slug} is not registered"))
}

fn already_registered(slug: &str) -> ServiceError {
    ServiceError::conflict(format!("plugin {slug} is already registered"))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::types::PluginAuth;
    use greenspace_auth::MockAuthRepository;
    use greenspace_core::ErrorKind;

    fn plugin(slug: &str) -> Plugin {
        Plugin {
            slug: slug.to_string(),
            name: format!("{slug} importer"),
            path: format!("https://plugins.example.org/{slug}"),
            version: "1.0.0".to_string(),
            description: String::new(),
            auth: PluginAuth {
                username: "plugin".to_string(),
                password: "secret".to_string(),
            },
        }
    }

    fn registry() -> PluginRegistry {
        PluginRegistry::new(
            Arc::new(MockAuthRepository::with_user("plugin", "secret")),
            ControlConfig::default(),
        )
    }

    #[tokio::test]
    async fn register_returns_token() {
        let registry = registry();
        let token = registry.register(plugin("csv")).await.unwrap();
        assert_eq!(token.access_token, "access-plugin-1");
        assert_eq!(registry.get("csv").unwrap().name, "csv importer");
        assert_eq!(registry.get_all().len(), 1);
    }

    #[tokio::test]
    async fn duplicate_slug_conflicts() {
        let registry = registry();
        registry.register(plugin("csv")).await.unwrap();
        let err = registry.register(plugin("csv")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn bad_credentials_are_unauthorized() {
        let registry = registry();
        let mut bad = plugin("csv");
        bad.auth.password = "wrong".to_string();
        let err = registry.register(bad).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        assert!(registry.get_all().is_empty());
    }

    #[tokio::test]
    async fn missing_fields_are_rejected() {
        let registry = registry();
        let mut bad = plugin("csv");
        bad.path = "ftp://plugins.example.org".to_string();
        assert_eq!(
            registry.register(bad).await.unwrap_err().kind(),
            ErrorKind::BadRequest
        );
    }

    #[tokio::test]
    async fn heartbeat_and_unregister() {
        let registry = registry();
        assert_eq!(
            registry.heartbeat("csv").unwrap_err().kind(),
            ErrorKind::NotFound
        );
        registry.register(plugin("csv")).await.unwrap();
        registry.heartbeat("csv").unwrap();

        registry.unregister("csv");
        registry.unregister("csv");
        assert_eq!(registry.get("csv").unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn refresh_requires_registration() {
        let registry = registry();
        assert_eq!(
            registry
                .refresh_token("csv", "refresh-plugin-1")
                .await
                .unwrap_err()
                .kind(),
            ErrorKind::NotFound
        );
        let token = registry.register(plugin("csv")).await.unwrap();
        let refreshed = registry
            .refresh_token("csv", &token.refresh_token)
            .await
            .unwrap();
        assert_ne!(refreshed.access_token, token.access_token);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_plugins_are_evicted() {
        let registry = registry();
        registry.register(plugin("quiet")).await.unwrap();
        registry.register(plugin("chatty")).await.unwrap();

        tokio::time::advance(Duration::from_secs(200)).await;
        registry.heartbeat("chatty").unwrap();
        tokio::time::advance(Duration::from_secs(200)).await;

        assert_eq!(registry.evict_expired(), vec!["quiet".to_string()]);
        assert!(registry.get("chatty").is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn cleanup_loop_runs_until_cancelled() {
        let registry = Arc::new(registry());
        registry.register(plugin("quiet")).await.unwrap();

        let cancel = CancellationToken::new();
        let handle = {
            let registry = Arc::clone(&registry);
            let cancel = cancel.clone();
            tokio::spawn(async move { registry.start_cleanup(cancel).await })
        };

        tokio::time::sleep(Duration::from_secs(361)).await;
        assert!(registry.get_all().is_empty());

        cancel.cancel();
        handle.await.unwrap();
    }
}
