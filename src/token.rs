use crate::errors::AppError;
use crate::models::{Credential, TokenResponse};
use chrono::Utc;
use moka::future::Cache;
use moka::Expiry;
use std::time::{Duration, Instant};

/// Lifetime assumed when the token endpoint does not report `expires_in`.
pub const DEFAULT_TOKEN_LIFETIME_SECS: u64 = 3600;

/// Cached credentials are dropped at 35/36 of their nominal lifetime
/// (3600s -> 3500s) so a token never expires mid-flight.
pub fn validity_window(lifetime: Duration) -> Duration {
    lifetime * 35 / 36
}

#[derive(Clone, PartialEq, Eq, Hash)]
struct CredentialKey {
    client_id: String,
    client_secret: String,
}

/// Expires each cached credential at `issued_at + validity_window`.
///
/// The entry is inserted once the exchange completes, after `issued_at`, so
/// the time already spent waiting on the token endpoint is deducted.
struct CredentialExpiry;

impl Expiry<CredentialKey, Credential> for CredentialExpiry {
    fn expire_after_create(
        &self,
        _key: &CredentialKey,
        value: &Credential,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(remaining_validity(value))
    }
}

fn remaining_validity(credential: &Credential) -> Duration {
    (credential.expires_at() - Utc::now())
        .to_std()
        .unwrap_or(Duration::ZERO)
}

/// Exchanges client credentials for bearer tokens and caches them.
///
/// Concurrent `acquire` calls for the same credential pair share one upstream
/// exchange; failures are never cached.
#[derive(Clone)]
pub struct TokenProvider {
    client: reqwest::Client,
    auth_url: String,
    timeout: Duration,
    cache: Cache<CredentialKey, Credential>,
}

impl TokenProvider {
    /// Creates a new `TokenProvider`.
    ///
    /// # Arguments
    ///
    /// * `client` - Shared HTTP client.
    /// * `auth_url` - OAuth2 token endpoint.
    /// * `timeout` - Upper bound for one token exchange.
    pub fn new(client: reqwest::Client, auth_url: impl Into<String>, timeout: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(16)
            .expire_after(CredentialExpiry)
            .build();

        Self {
            client,
            auth_url: auth_url.into(),
            timeout,
            cache,
        }
    }

    /// Returns a live credential for the pair, exchanging only when none is cached.
    pub async fn acquire(
        &self,
        client_id: &str,
        client_secret: &str,
    ) -> Result<Credential, AppError> {
        if client_id.trim().is_empty() || client_secret.trim().is_empty() {
            return Err(AppError::Configuration(
                "client id and client secret must not be empty".to_string(),
            ));
        }

        let key = CredentialKey {
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
        };

        let credential = self
            .cache
            .try_get_with(key.clone(), self.exchange(client_id, client_secret))
            .await
            .map_err(|e| e.as_ref().clone())?;

        if credential.is_valid_at(Utc::now()) {
            return Ok(credential);
        }

        // Expired between lookup and return; never hand it out.
        tracing::debug!(
            "Cached credential expired at {}, re-exchanging",
            credential.expires_at()
        );
        self.cache.invalidate(&key).await;
        self.cache
            .try_get_with(key, self.exchange(client_id, client_secret))
            .await
            .map_err(|e| e.as_ref().clone())
    }

    /// Drops any cached credential for the pair.
    pub async fn invalidate(&self, client_id: &str, client_secret: &str) {
        let key = CredentialKey {
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
        };
        self.cache.invalidate(&key).await;
    }

    async fn exchange(&self, client_id: &str, client_secret: &str) -> Result<Credential, AppError> {
        tracing::info!("Requesting Sellsy access token: {}", self.auth_url);

        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", client_id),
            ("client_secret", client_secret),
        ];

        let issued_at = Utc::now();
        let response = self
            .client
            .post(&self.auth_url)
            .form(&form)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| AppError::Transport {
                offset: None,
                message: format!("Token request failed: {}", e),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            tracing::error!("Sellsy token endpoint returned {}: {}", status, body);
            return Err(AppError::Authentication {
                status: status.as_u16(),
                body,
            });
        }

        let token: TokenResponse = response.json().await.map_err(|e| AppError::Transport {
            offset: None,
            message: format!("Failed to parse token response: {}", e),
        })?;

        let access_token = token
            .access_token
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| AppError::Authentication {
                status: status.as_u16(),
                body: "token response has no access_token".to_string(),
            })?;

        let lifetime =
            Duration::from_secs(token.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS));
        let credential = Credential {
            access_token,
            issued_at,
            validity_window: validity_window(lifetime),
        };

        tracing::info!(
            "✓ Access token acquired, cached until {}",
            credential.expires_at()
        );
        Ok(credential)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validity_window_is_shorter_than_lifetime() {
        assert_eq!(
            validity_window(Duration::from_secs(3600)),
            Duration::from_secs(3500)
        );
        assert!(validity_window(Duration::from_secs(60)) < Duration::from_secs(60));
        assert_eq!(validity_window(Duration::ZERO), Duration::ZERO);
    }

    #[test]
    fn test_remaining_validity_deducts_exchange_latency() {
        let credential = Credential {
            access_token: "tok".to_string(),
            issued_at: Utc::now() - chrono::Duration::seconds(10),
            validity_window: Duration::from_secs(60),
        };
        let remaining = remaining_validity(&credential);
        assert!(remaining <= Duration::from_secs(50));
        assert!(remaining > Duration::from_secs(45));

        let expired = Credential {
            issued_at: Utc::now() - chrono::Duration::seconds(120),
            ..credential
        };
        assert_eq!(remaining_validity(&expired), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_empty_credentials_fail_fast() {
        let provider = TokenProvider::new(
            reqwest::Client::new(),
            "http://127.0.0.1:9/token",
            Duration::from_secs(1),
        );

        let result = provider.acquire("", "secret").await;
        assert!(matches!(result, Err(AppError::Configuration(_))));

        let result = provider.acquire("id", "  ").await;
        assert!(matches!(result, Err(AppError::Configuration(_))));
    }
}
