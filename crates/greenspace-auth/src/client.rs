//! OpenID Connect client for password grants, introspection and refresh.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::{AuthError, Result};
use crate::OidcConfig;

/// Tokens issued by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientToken {
    /// Bearer access token.
    pub access_token: String,
    /// Token for obtaining a new access token.
    pub refresh_token: String,
    /// Token type, usually `Bearer`.
    pub token_type: String,
    /// When the access token expires.
    pub expires_at: DateTime<Utc>,
    /// When the refresh token expires.
    pub refresh_expires_at: DateTime<Utc>,
}

/// Result of a token introspection.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IntrospectionResult {
    /// Whether the token is currently active.
    pub active: bool,
    /// Subject identifier.
    #[serde(default)]
    pub sub: Option<String>,
    /// Preferred username.
    #[serde(default)]
    pub username: Option<String>,
    /// Client the token was issued to.
    #[serde(default)]
    pub client_id: Option<String>,
    /// Expiry as a unix timestamp.
    #[serde(default)]
    pub exp: Option<i64>,
}

/// Credential checks the services rely on.
#[async_trait]
pub trait AuthRepository: Send + Sync {
    /// Exchange a username and password for tokens.
    ///
    /// # Errors
    ///
    /// Returns `InvalidCredentials` when the provider rejects the login.
    async fn get_access_token_from_password(
        &self,
        username: &str,
        password: &str,
    ) -> Result<ClientToken>;

    /// Ask the provider whether a token is active.
    ///
    /// # Errors
    ///
    /// Returns `TokenInactive` for inactive tokens.
    async fn retrospect_token(&self, token: &str) -> Result<IntrospectionResult>;

    /// Exchange a refresh token for new tokens.
    ///
    /// # Errors
    ///
    /// Returns `InvalidToken` when the refresh token is rejected.
    async fn refresh_token(&self, refresh_token: &str) -> Result<ClientToken>;
}

/// Raw token endpoint response.
#[derive(Debug, Deserialize)]
struct RawTokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: String,
    #[serde(default = "default_token_type")]
    token_type: String,
    expires_in: u64,
    #[serde(default)]
    refresh_expires_in: u64,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// Error body returned by the token endpoint.
#[derive(Debug, Deserialize)]
struct OidcErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

impl RawTokenResponse {
    fn into_token(self) -> ClientToken {
        let now = Utc::now();
        let seconds = |s: u64| chrono::Duration::seconds(i64::try_from(s).unwrap_or(i64::MAX / 1000));
        ClientToken {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            token_type: self.token_type,
            expires_at: now + seconds(self.expires_in),
            refresh_expires_at: now + seconds(self.refresh_expires_in),
        }
    }
}

/// HTTP client for an OpenID Connect provider with Keycloak-style endpoints.
pub struct OidcClient {
    config: OidcConfig,
    client: reqwest::Client,
}

impl OidcClient {
    /// Create a new client.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be created (should never happen with default TLS).
    #[must_use]
    pub fn new(config: OidcConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("failed to create HTTP client");

        Self { config, client }
    }

    /// Get the configuration.
    #[must_use]
    pub const fn config(&self) -> &OidcConfig {
        &self.config
    }

    async fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<reqwest::Response> {
        self.client
            .post(url)
            .form(form)
            .send()
            .await
            .map_err(|e| AuthError::Internal(format!("request failed: {e}")))
    }

    async fn token_request(&self, form: &[(&str, &str)], on_reject: AuthError) -> Result<ClientToken> {
        let response = self.post_form(&self.config.token_url(), form).await?;
        let status = response.status();

        if status.is_success() {
            let raw: RawTokenResponse = response
                .json()
                .await
                .map_err(|e| AuthError::Provider(format!("invalid token response: {e}")))?;
            return Ok(raw.into_token());
        }

        let body: Option<OidcErrorResponse> = response.json().await.ok();
        if let Some(body) = &body {
            tracing::debug!(
                error = %body.error,
                description = ?body.error_description,
                "Token request rejected"
            );
        }
        match (status.as_u16(), body.as_ref().map(|b| b.error.as_str())) {
            (429, _) => Err(AuthError::RateLimited),
            (400 | 401, Some("invalid_grant" | "unauthorized_client") | None) | (401, _) => {
                Err(on_reject)
            }
            (_, Some(code)) => Err(AuthError::Provider(format!("HTTP {status}: {code}"))),
            (_, None) => Err(AuthError::Provider(format!("HTTP {status}"))),
        }
    }
}

#[async_trait]
impl AuthRepository for OidcClient {
    async fn get_access_token_from_password(
        &self,
        username: &str,
        password: &str,
    ) -> Result<ClientToken> {
        let form = [
            ("grant_type", "password"),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("username", username),
            ("password", password),
        ];
        let token = self.token_request(&form, AuthError::InvalidCredentials).await?;
        tracing::debug!(username = %username, "Obtained access token");
        Ok(token)
    }

    async fn retrospect_token(&self, token: &str) -> Result<IntrospectionResult> {
        let form = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("token", token),
        ];
        let response = self.post_form(&self.config.introspect_url(), &form).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(match status.as_u16() {
                401 => AuthError::InvalidToken("introspection rejected".to_string()),
                429 => AuthError::RateLimited,
                _ => AuthError::Provider(format!("HTTP {status}")),
            });
        }

        let result: IntrospectionResult = response
            .json()
            .await
            .map_err(|e| AuthError::Provider(format!("invalid introspection response: {e}")))?;
        if !result.active {
            return Err(AuthError::TokenInactive);
        }
        Ok(result)
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<ClientToken> {
        let form = [
            ("grant_type", "refresh_token"),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("refresh_token", refresh_token),
        ];
        self.token_request(&form, AuthError::InvalidToken("refresh token rejected".to_string()))
            .await
    }
}

/// Provider used when authentication is switched off. Every call fails
/// with `Disabled`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledAuth;

#[async_trait]
impl AuthRepository for DisabledAuth {
    async fn get_access_token_from_password(&self, _: &str, _: &str) -> Result<ClientToken> {
        Err(AuthError::Disabled)
    }

    async fn retrospect_token(&self, _: &str) -> Result<IntrospectionResult> {
        Err(AuthError::Disabled)
    }

    async fn refresh_token(&self, _: &str) -> Result<ClientToken> {
        Err(AuthError::Disabled)
    }
}

/// In-memory provider for tests.
///
/// Accepts the configured username/password pairs and issues tokens of the
/// form `access-<username>-<n>`.
#[cfg(any(test, feature = "test-utils"))]
#[derive(Debug, Default)]
pub struct MockAuthRepository {
    credentials: parking_lot::RwLock<std::collections::HashMap<String, String>>,
    issued: parking_lot::Mutex<Vec<ClientToken>>,
}

#[cfg(any(test, feature = "test-utils"))]
impl MockAuthRepository {
    /// Create a provider that accepts one username/password pair.
    #[must_use]
    pub fn with_user(username: &str, password: &str) -> Self {
        let mock = Self::default();
        mock.add_user(username, password);
        mock
    }

    /// Accept another username/password pair.
    pub fn add_user(&self, username: &str, password: &str) {
        self.credentials
            .write()
            .insert(username.to_string(), password.to_string());
    }

    /// Tokens issued so far.
    #[must_use]
    pub fn issued(&self) -> Vec<ClientToken> {
        self.issued.lock().clone()
    }

    fn issue(&self, subject: &str) -> ClientToken {
        let mut issued = self.issued.lock();
        let n = issued.len() + 1;
        let now = Utc::now();
        let token = ClientToken {
            access_token: format!("access-{subject}-{n}"),
            refresh_token: format!("refresh-{subject}-{n}"),
            token_type: "Bearer".to_string(),
            expires_at: now + chrono::Duration::minutes(5),
            refresh_expires_at: now + chrono::Duration::minutes(30),
        };
        issued.push(token.clone());
        token
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl AuthRepository for MockAuthRepository {
    async fn get_access_token_from_password(
        &self,
        username: &str,
        password: &str,
    ) -> Result<ClientToken> {
        let accepted = self
            .credentials
            .read()
            .get(username)
            .is_some_and(|p| p == password);
        if !accepted {
            return Err(AuthError::InvalidCredentials);
        }
        Ok(self.issue(username))
    }

    async fn retrospect_token(&self, token: &str) -> Result<IntrospectionResult> {
        let issued = self.issued.lock();
        let found = issued.iter().find(|t| t.access_token == token);
        match found {
            Some(t) if t.expires_at > Utc::now() => Ok(IntrospectionResult {
                active: true,
                sub: None,
                username: token
                    .strip_prefix("access-")
                    .and_then(|rest| rest.rsplit_once('-'))
                    .map(|(user, _)| user.to_string()),
                client_id: None,
                exp: Some(t.expires_at.timestamp()),
            }),
            _ => Err(AuthError::TokenInactive),
        }
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<ClientToken> {
        let subject = refresh_token
            .strip_prefix("refresh-")
            .and_then(|rest| rest.rsplit_once('-'))
            .map(|(user, _)| user.to_string())
            .ok_or_else(|| AuthError::InvalidToken("unknown refresh token".to_string()))?;
        let known = self
            .issued
            .lock()
            .iter()
            .any(|t| t.refresh_token == refresh_token);
        if !known {
            return Err(AuthError::InvalidToken("unknown refresh token".to_string()));
        }
        Ok(self.issue(&subject))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(server: &MockServer) -> OidcConfig {
        OidcConfig {
            base_url: server.uri(),
            domain_name: "greenspace".to_string(),
            client_id: "backend".to_string(),
            client_secret: "s3cret".to_string(),
        }
    }

    #[tokio::test]
    async fn password_grant_returns_tokens() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/realms/greenspace/protocol/openid-connect/token"))
            .and(body_string_contains("grant_type=password"))
            .and(body_string_contains("username=plugin-a"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "at",
                "refresh_token": "rt",
                "token_type": "Bearer",
                "expires_in": 300,
                "refresh_expires_in": 1800
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = OidcClient::new(config(&server));
        let token = client
            .get_access_token_from_password("plugin-a", "pw")
            .await
            .unwrap();
        assert_eq!(token.access_token, "at");
        assert_eq!(token.refresh_token, "rt");
        assert!(token.expires_at > Utc::now());
        assert!(token.refresh_expires_at > token.expires_at);
    }

    #[tokio::test]
    async fn rejected_login_is_invalid_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": "invalid_grant",
                "error_description": "Invalid user credentials"
            })))
            .mount(&server)
            .await;

        let client = OidcClient::new(config(&server));
        let result = client.get_access_token_from_password("plugin-a", "bad").await;
        assert!(matches!(result, Err(AuthError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn inactive_token_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(
                "/realms/greenspace/protocol/openid-connect/token/introspect",
            ))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "active": false })),
            )
            .mount(&server)
            .await;

        let client = OidcClient::new(config(&server));
        assert!(matches!(
            client.retrospect_token("stale").await,
            Err(AuthError::TokenInactive)
        ));
    }

    #[tokio::test]
    async fn refresh_rejection_is_invalid_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("grant_type=refresh_token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant"
            })))
            .mount(&server)
            .await;

        let client = OidcClient::new(config(&server));
        assert!(matches!(
            client.refresh_token("rt").await,
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[tokio::test]
    async fn mock_repository_round_trip() {
        let mock = MockAuthRepository::with_user("plugin-a", "pw");
        assert!(matches!(
            mock.get_access_token_from_password("plugin-a", "nope").await,
            Err(AuthError::InvalidCredentials)
        ));

        let token = mock
            .get_access_token_from_password("plugin-a", "pw")
            .await
            .unwrap();
        let info = mock.retrospect_token(&token.access_token).await.unwrap();
        assert!(info.active);
        assert_eq!(info.username.as_deref(), Some("plugin-a"));

        let refreshed = mock.refresh_token(&token.refresh_token).await.unwrap();
        assert_ne!(refreshed.access_token, token.access_token);
        assert_eq!(mock.issued().len(), 2);
    }

    #[tokio::test]
    async fn disabled_provider_is_gone() {
        assert!(matches!(
            DisabledAuth.get_access_token_from_password("u", "p").await,
            Err(AuthError::Disabled)
        ));
        assert!(matches!(
            DisabledAuth.refresh_token("rt").await,
            Err(AuthError::Disabled)
        ));
    }
}
