//! OpenID Connect integration for greenspace.
//!
//! The services only need three capabilities from the identity provider,
//! bundled in [`AuthRepository`]:
//!
//! - exchange a username and password for a [`ClientToken`]
//! - introspect a token
//! - refresh a token
//!
//! [`OidcClient`] implements them against a Keycloak-style realm.
//!
//! # Example
//!
//! ```no_run
//! use greenspace_auth::{AuthRepository, OidcClient, OidcConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = OidcClient::new(OidcConfig {
//!     base_url: "https://auth.example.org".to_string(),
//!     domain_name: "greenspace".to_string(),
//!     client_id: "backend".to_string(),
//!     client_secret: "secret".to_string(),
//! });
//!
//! let token = client.get_access_token_from_password("plugin", "pw").await?;
//! println!("expires at {}", token.expires_at);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod client;
pub mod error;

pub use client::{AuthRepository, ClientToken, DisabledAuth, IntrospectionResult, OidcClient};
pub use error::{AuthError, Result};

#[cfg(any(test, feature = "test-utils"))]
pub use client::MockAuthRepository;

/// Connection settings for the identity provider.
#[derive(Debug, Clone)]
pub struct OidcConfig {
    /// Base URL of the provider (e.g., `https://auth.example.org`).
    pub base_url: String,
    /// Realm name.
    pub domain_name: String,
    /// Confidential client id.
    pub client_id: String,
    /// Confidential client secret.
    pub client_secret: String,
}

impl OidcConfig {
    fn realm_url(&self) -> String {
        format!(
            "{}/realms/{}/protocol/openid-connect",
            self.base_url.trim_end_matches('/'),
            self.domain_name
        )
    }

    /// Get the token endpoint URL.
    #[must_use]
    pub fn token_url(&self) -> String {
        format!("{}/token", self.realm_url())
    }

    /// Get the introspection endpoint URL.
    #[must_use]
    pub fn introspect_url(&self) -> String {
        format!("{}/token/introspect", self.realm_url())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_urls() {
        let config = OidcConfig {
            base_url: "https://auth.example.org/".to_string(),
            domain_name: "greenspace".to_string(),
            client_id: "backend".to_string(),
            client_secret: String::new(),
        };
        assert_eq!(
            config.token_url(),
            "https://auth.example.org/realms/greenspace/protocol/openid-connect/token"
        );
        assert_eq!(
            config.introspect_url(),
            "https://auth.example.org/realms/greenspace/protocol/openid-connect/token/introspect"
        );
    }
}
