//! Access-token handling for the catalog API.
//!
//! The resolver never runs an interactive OAuth flow. It either receives a
//! token from outside ([`StaticTokenProvider`]) or obtains one with the
//! client-credentials grant ([`ClientCredentialsTokenProvider`]).

use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::RwLock;
use reqwest::{header::AUTHORIZATION, Client, StatusCode};
use tracing::{debug, error, info};

use super::client::retry_after_from;
use super::models::TokenResponse;
use crate::error::CatalogError;

/// Tokens are treated as expired this long before the real expiry.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Longer lifetimes announced by the accounts service are cut down to this.
const MAX_TOKEN_LIFETIME_SECS: i64 = 24 * 60 * 60;

/// Fuente del bearer token usado por el cliente del catálogo.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Current bearer token, refreshing first if it is known to be expired.
    async fn access_token(&self) -> Result<String, CatalogError>;

    fn is_access_token_expired(&self) -> bool;

    async fn refresh_access_token(&self) -> Result<(), CatalogError>;
}

#[derive(Debug, Clone)]
struct StoredToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl StoredToken {
    fn is_expired(&self) -> bool {
        Utc::now() + ChronoDuration::seconds(EXPIRY_MARGIN_SECS) >= self.expires_at
    }
}

/// Client-credentials grant against `{accounts_url}/api/token`.
pub struct ClientCredentialsTokenProvider {
    client: Client,
    accounts_url: String,
    client_id: String,
    client_secret: String,
    token: RwLock<Option<StoredToken>>,
    refresh_lock: tokio::sync::Mutex<()>,
}

impl ClientCredentialsTokenProvider {
    pub fn new(
        client: Client,
        accounts_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            client,
            accounts_url: accounts_url.into().trim_end_matches('/').to_string(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            token: RwLock::new(None),
            refresh_lock: tokio::sync::Mutex::new(()),
        }
    }

    fn basic_auth_header(&self) -> String {
        let credentials = format!("{}:{}", self.client_id, self.client_secret);
        format!(
            "Basic {}",
            base64::engine::general_purpose::STANDARD.encode(credentials)
        )
    }

    fn store(&self, token: StoredToken) {
        info!("🔑 Token de acceso renovado (expira {})", token.expires_at);
        *self.token.write() = Some(token);
    }

    async fn request_token(&self) -> Result<StoredToken, CatalogError> {
        let url = format!("{}/api/token", self.accounts_url);
        debug!("🔑 Solicitando token de acceso a {}", url);

        let response = self
            .client
            .post(&url)
            .header(AUTHORIZATION, self.basic_auth_header())
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| {
                error!("❌ Error de red al pedir token: {}", e);
                CatalogError::TokenUnavailable(e.to_string())
            })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(CatalogError::RateLimited {
                retry_after: retry_after_from(response.headers()),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("❌ El servidor de cuentas rechazó las credenciales: {} - {}", status, body);
            return Err(CatalogError::TokenUnavailable(format!("{status}: {body}")));
        }

        let token: TokenResponse = response.json().await.map_err(|e| {
            error!("❌ Respuesta de token inválida: {}", e);
            CatalogError::TokenUnavailable(e.to_string())
        })?;

        if token.expires_in <= 0 {
            error!("❌ Token recibido ya expirado (expires_in = {})", token.expires_in);
            return Err(CatalogError::TokenUnavailable(format!(
                "invalid expires_in: {}",
                token.expires_in
            )));
        }

        let lifetime = token.expires_in.min(MAX_TOKEN_LIFETIME_SECS);
        let expires_at = ChronoDuration::try_seconds(lifetime)
            .and_then(|d| Utc::now().checked_add_signed(d))
            .ok_or_else(|| {
                CatalogError::TokenUnavailable(format!("invalid expires_in: {}", token.expires_in))
            })?;

        Ok(StoredToken {
            access_token: token.access_token,
            expires_at,
        })
    }
}

#[async_trait]
impl TokenProvider for ClientCredentialsTokenProvider {
    async fn access_token(&self) -> Result<String, CatalogError> {
        if self.is_access_token_expired() {
            let _guard = self.refresh_lock.lock().await;
            // Otra tarea pudo refrescarlo mientras esperábamos el lock
            if self.is_access_token_expired() {
                self.store(self.request_token().await?);
            }
        }

        self.token
            .read()
            .as_ref()
            .map(|t| t.access_token.clone())
            .ok_or_else(|| CatalogError::TokenUnavailable("no access token available".to_string()))
    }

    fn is_access_token_expired(&self) -> bool {
        self.token
            .read()
            .as_ref()
            .map(StoredToken::is_expired)
            .unwrap_or(true)
    }

    /// Always asks for a new token, e.g. after the catalog rejected the current one.
    async fn refresh_access_token(&self) -> Result<(), CatalogError> {
        let _guard = self.refresh_lock.lock().await;
        self.store(self.request_token().await?);
        Ok(())
    }
}

/// Fixed token managed by someone else.
#[derive(Debug, Clone)]
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn access_token(&self) -> Result<String, CatalogError> {
        Ok(self.token.clone())
    }

    fn is_access_token_expired(&self) -> bool {
        false
    }

    async fn refresh_access_token(&self) -> Result<(), CatalogError> {
        Ok(())
    }
}
