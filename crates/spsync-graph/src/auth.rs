//! OAuth2 client-credentials authentication for Microsoft Graph API
//!
//! Acquires app-only tokens from the Microsoft identity platform using a
//! client id and secret. Tokens are cached and refreshed shortly before they
//! expire, so long runs never present an expired bearer token.
//!
//! ## Components
//!
//! - [`ClientCredentialsConfig`] - Tenant, client, and endpoint settings
//! - [`ClientCredentialsAuth`] - Token acquisition and caching
//! - [`AuthFailure`] - Classified token errors with remediation hints

use chrono::{DateTime, Duration, Utc};
use oauth2::{
    basic::{BasicClient, BasicErrorResponseType},
    AuthType, ClientId, ClientSecret, EndpointNotSet, EndpointSet, RequestTokenError, Scope,
    TokenResponse, TokenUrl,
};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Refresh this long before the token expires.
const REFRESH_MARGIN_MINUTES: i64 = 5;

// ============================================================================
// Tokens
// ============================================================================

/// An access token and its expiry.
#[derive(Debug, Clone)]
pub struct Tokens {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

impl Tokens {
    /// Returns true if the access token will expire within the given duration
    pub fn expires_within(&self, duration: Duration) -> bool {
        Utc::now() + duration >= self.expires_at
    }
}

// ============================================================================
// AuthFailure
// ============================================================================

/// Why the identity platform refused to issue a token.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthFailure {
    #[error("invalid client credentials: {description}")]
    InvalidClient { description: String },

    #[error("application not authorized: {description}")]
    UnauthorizedClient { description: String },

    #[error("invalid scope: {description}")]
    InvalidScope { description: String },

    #[error("invalid request: {description}")]
    InvalidRequest { description: String },

    #[error("{error}: {description}")]
    Other { error: String, description: String },

    #[error("could not reach the token endpoint: {0}")]
    Transport(String),

    #[error("invalid authentication configuration: {0}")]
    Configuration(String),
}

impl AuthFailure {
    /// Whether a later attempt could succeed without operator action.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// What the operator should check.
    pub fn hint(&self) -> &'static str {
        match self {
            Self::InvalidClient { .. } => {
                "Verify the client id and secret (no stray whitespace), check that the secret \
                 has not expired, and confirm the tenant id."
            }
            Self::UnauthorizedClient { .. } => {
                "Grant the app registration Microsoft Graph Sites.ReadWrite.All (and \
                 Sites.Manage.All for the FileHash column), then grant admin consent."
            }
            Self::InvalidScope { .. } => {
                "Check the Graph endpoint: graph.microsoft.com for commercial cloud, \
                 graph.microsoft.us for GovCloud."
            }
            Self::InvalidRequest { .. } => {
                "Check that the tenant id is a GUID and the login endpoint is correct: \
                 login.microsoftonline.com for commercial cloud, login.microsoftonline.us \
                 for GovCloud."
            }
            Self::Other { .. } | Self::Transport(_) => {
                "Check network connectivity, firewall rules for the identity platform, and \
                 the tenant and endpoint configuration."
            }
            Self::Configuration(_) => "Check the login endpoint and tenant id settings.",
        }
    }
}

// ============================================================================
// ClientCredentialsConfig
// ============================================================================

/// Settings for the client-credentials grant.
#[derive(Debug, Clone)]
pub struct ClientCredentialsConfig {
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub scope: String,
}

impl ClientCredentialsConfig {
    /// Token URL `https://{login}/{tenant}/oauth2/v2.0/token`,
    /// scope `https://{graph}/.default`.
    pub fn new(
        tenant_id: &str,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        login_endpoint: &str,
        graph_endpoint: &str,
    ) -> Self {
        Self {
            token_url: format!("https://{login_endpoint}/{tenant_id}/oauth2/v2.0/token"),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            scope: format!("https://{graph_endpoint}/.default"),
        }
    }
}

// ============================================================================
// ClientCredentialsAuth
// ============================================================================

type CredentialsClient =
    BasicClient<EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// Acquires and caches app-only access tokens.
pub struct ClientCredentialsAuth {
    client: CredentialsClient,
    scope: String,
    http: reqwest::Client,
    cached: Mutex<Option<Tokens>>,
}

impl ClientCredentialsAuth {
    pub fn new(config: ClientCredentialsConfig) -> Result<Self, AuthFailure> {
        let token_url = TokenUrl::new(config.token_url.clone())
            .map_err(|e| AuthFailure::Configuration(format!("{}: {e}", config.token_url)))?;

        let client = BasicClient::new(ClientId::new(config.client_id))
            .set_client_secret(ClientSecret::new(config.client_secret))
            .set_auth_type(AuthType::RequestBody)
            .set_token_uri(token_url);

        // Token endpoints must not be followed through redirects.
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| AuthFailure::Configuration(e.to_string()))?;

        Ok(Self {
            client,
            scope: config.scope,
            http,
            cached: Mutex::new(None),
        })
    }

    /// A valid access token, fetching a new one when the cached token is
    /// missing or within five minutes of expiry.
    pub async fn access_token(&self) -> Result<String, AuthFailure> {
        let mut cached = self.cached.lock().await;
        if let Some(tokens) = cached.as_ref() {
            if !tokens.expires_within(Duration::minutes(REFRESH_MARGIN_MINUTES)) {
                return Ok(tokens.access_token.clone());
            }
            debug!("Cached token near expiry, refreshing");
        }

        let tokens = self.acquire().await?;
        let token = tokens.access_token.clone();
        *cached = Some(tokens);
        Ok(token)
    }

    /// Request a fresh token from the identity platform.
    pub async fn acquire(&self) -> Result<Tokens, AuthFailure> {
        info!("Acquiring app-only access token");

        let response = self
            .client
            .exchange_client_credentials()
            .add_scope(Scope::new(self.scope.clone()))
            .request_async(&self.http)
            .await
            .map_err(classify_token_error)?;

        let expires_at = response
            .expires_in()
            .map(|d| Utc::now() + Duration::seconds(d.as_secs() as i64))
            .unwrap_or_else(|| Utc::now() + Duration::hours(1));

        info!(%expires_at, "Access token acquired");
        Ok(Tokens {
            access_token: response.access_token().secret().to_string(),
            expires_at,
        })
    }
}

fn classify_token_error<RE>(
    err: RequestTokenError<RE, oauth2::StandardErrorResponse<BasicErrorResponseType>>,
) -> AuthFailure
where
    RE: std::error::Error + 'static,
{
    match err {
        RequestTokenError::ServerResponse(response) => {
            let description = response
                .error_description()
                .cloned()
                .unwrap_or_else(|| "No description provided".to_string());
            match response.error() {
                BasicErrorResponseType::InvalidClient => AuthFailure::InvalidClient { description },
                BasicErrorResponseType::UnauthorizedClient => {
                    AuthFailure::UnauthorizedClient { description }
                }
                BasicErrorResponseType::InvalidScope => AuthFailure::InvalidScope { description },
                BasicErrorResponseType::InvalidRequest => {
                    AuthFailure::InvalidRequest { description }
                }
                other => AuthFailure::Other {
                    error: other.to_string(),
                    description,
                },
            }
        }
        RequestTokenError::Request(e) => AuthFailure::Transport(e.to_string()),
        RequestTokenError::Parse(e, _) => AuthFailure::Other {
            error: "invalid_token_response".to_string(),
            description: e.to_string(),
        },
        RequestTokenError::Other(message) => AuthFailure::Other {
            error: "unknown_error".to_string(),
            description: message,
        },
    }
}
