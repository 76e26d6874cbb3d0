//! Token broker: authorization-code exchange and refresh.
//!
//! Holds only the immutable OAuth client. Credentials are returned to the
//! caller and never retained here.

use std::time::Duration;

use oauth2::basic::{BasicClient, BasicErrorResponse, BasicErrorResponseType, BasicTokenResponse};
use oauth2::{
    AuthType, AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, RedirectUrl,
    RefreshToken, RequestTokenError, Scope, TokenResponse, TokenUrl,
};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info, warn};

use super::credential::Credential;
use crate::error::{AuthError, ConfigError, Error, ProviderError, Result, ValidationError};

/// Scope requested at consent time; covers reading and sending.
pub const GMAIL_SCOPE: &str = "https://www.googleapis.com/auth/gmail.modify";

/// Lifetime assumed when the token endpoint omits `expires_in`.
const DEFAULT_EXPIRES_IN: Duration = Duration::from_secs(3600);

const TOKEN_ENDPOINT: &str = "token";

/// OAuth client identity, loaded once at start-up.
#[derive(Debug, Clone)]
pub struct OAuthClientConfig {
    pub client_id: String,
    pub client_secret: SecretString,
    /// Callback address registered with the provider.
    pub redirect_uri: String,
    /// Consent page the user is sent to.
    pub auth_url: String,
    /// Token endpoint for code and refresh grants.
    pub token_url: String,
}

/// Which grant a token request was made with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Grant {
    AuthorizationCode,
    RefreshToken,
}

impl Grant {
    fn as_str(self) -> &'static str {
        match self {
            Grant::AuthorizationCode => "authorization_code",
            Grant::RefreshToken => "refresh_token",
        }
    }
}

/// Exchanges codes and refresh tokens for live credentials.
pub struct TokenBroker {
    client: BasicClient,
    timeout: Duration,
}

impl TokenBroker {
    /// Build the OAuth client. Every token request is bounded by `timeout`.
    pub fn new(config: OAuthClientConfig, timeout: Duration) -> std::result::Result<Self, ConfigError> {
        let invalid = |key: &str| {
            let key = key.to_string();
            move |e: oauth2::url::ParseError| ConfigError::InvalidValue {
                key,
                message: e.to_string(),
            }
        };

        let client = BasicClient::new(
            ClientId::new(config.client_id),
            Some(ClientSecret::new(config.client_secret.expose_secret().to_string())),
            AuthUrl::new(config.auth_url).map_err(invalid("GOOGLE_AUTH_URL"))?,
            Some(TokenUrl::new(config.token_url).map_err(invalid("GOOGLE_TOKEN_URL"))?),
        )
        .set_auth_type(AuthType::RequestBody)
        .set_redirect_uri(RedirectUrl::new(config.redirect_uri).map_err(invalid("OAUTH_REDIRECT_URI"))?);

        Ok(Self { client, timeout })
    }

    /// Consent URL the client redirects the user to.
    ///
    /// Offline access with forced consent, so the exchange yields a refresh
    /// token even for a user who consented before.
    pub fn authorization_url(&self) -> String {
        let (url, _state) = self
            .client
            .authorize_url(CsrfToken::new_random)
            .add_scope(Scope::new(GMAIL_SCOPE.to_string()))
            .add_extra_param("access_type", "offline")
            .add_extra_param("prompt", "consent")
            .url();
        url.to_string()
    }

    /// Exchange a single-use authorization code for a credential.
    pub async fn exchange_code(&self, code: &str) -> Result<Credential> {
        let code = code.trim();
        if code.is_empty() {
            return Err(ValidationError::MissingField("code").into());
        }

        let request = self
            .client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .request_async(oauth2::reqwest::async_http_client);
        let token = self.bounded(request, Grant::AuthorizationCode).await?;

        if token.refresh_token().is_none() {
            warn!("Token endpoint issued no refresh token; session cannot be resumed later");
        }
        info!("Authorization code exchanged");

        let refresh = token
            .refresh_token()
            .map(|t| SecretString::from(t.secret().clone()));
        Ok(credential_from(&token, refresh))
    }

    /// Mint a fresh credential from a previously issued refresh token.
    ///
    /// Refresh tokens are reusable, so calling this twice with the same
    /// token yields two independently valid credentials.
    pub async fn restore_from_refresh_token(&self, refresh_token: &SecretString) -> Result<Credential> {
        let supplied = refresh_token.expose_secret().trim();
        if supplied.is_empty() {
            return Err(ValidationError::MissingField("refresh_token").into());
        }

        let supplied = RefreshToken::new(supplied.to_string());
        let request = self
            .client
            .exchange_refresh_token(&supplied)
            .request_async(oauth2::reqwest::async_http_client);
        let token = self.bounded(request, Grant::RefreshToken).await?;
        debug!("Access token refreshed");

        // The endpoint may rotate the refresh token; otherwise keep the caller's.
        let refresh = token
            .refresh_token()
            .map(|t| SecretString::from(t.secret().clone()))
            .unwrap_or_else(|| refresh_token.clone());
        Ok(credential_from(&token, Some(refresh)))
    }

    /// Return a credential that is safe to use right now.
    pub async fn ensure_live(&self, credential: &Credential) -> Result<Credential> {
        if !credential.is_expired() {
            return Ok(credential.clone());
        }
        let refresh_token = credential
            .refresh_token()
            .ok_or(AuthError::NotRenewable)?;
        info!(expired_at = %credential.expires_at(), "Renewing expired access token");
        self.restore_from_refresh_token(refresh_token).await
    }

    async fn bounded<F, RE>(&self, request: F, grant: Grant) -> Result<BasicTokenResponse>
    where
        F: std::future::Future<Output = std::result::Result<BasicTokenResponse, RequestTokenError<RE, BasicErrorResponse>>>,
        RE: std::error::Error + 'static,
    {
        match tokio::time::timeout(self.timeout, request).await {
            Ok(Ok(token)) => Ok(token),
            Ok(Err(e)) => {
                warn!(grant = grant.as_str(), error = %e, "Token request rejected");
                Err(classify_token_failure(e, grant))
            }
            Err(_) => Err(ProviderError::Timeout {
                endpoint: TOKEN_ENDPOINT.into(),
            }
            .into()),
        }
    }
}

fn credential_from(token: &BasicTokenResponse, refresh: Option<SecretString>) -> Credential {
    Credential::issued_now(
        SecretString::from(token.access_token().secret().clone()),
        refresh,
        token.expires_in().unwrap_or(DEFAULT_EXPIRES_IN).as_secs(),
    )
}

/// Map a failed token request onto the error taxonomy.
///
/// RFC 6749 error codes are the caller's problem (re-authenticate); anything
/// else is the provider's.
fn classify_token_failure<RE>(err: RequestTokenError<RE, BasicErrorResponse>, grant: Grant) -> Error
where
    RE: std::error::Error + 'static,
{
    match err {
        RequestTokenError::ServerResponse(response) => {
            let reason = match response.error_description() {
                Some(desc) => format!("{}: {}", response.error(), desc),
                None => response.error().to_string(),
            };
            match response.error() {
                BasicErrorResponseType::InvalidClient | BasicErrorResponseType::UnauthorizedClient => {
                    AuthError::InvalidClient { reason }.into()
                }
                BasicErrorResponseType::Extension(_) => {
                    ProviderError::TokenEndpoint { reason }.into()
                }
                _ => match grant {
                    Grant::AuthorizationCode => AuthError::InvalidCode { reason }.into(),
                    Grant::RefreshToken => AuthError::InvalidRefreshToken { reason }.into(),
                },
            }
        }
        RequestTokenError::Request(e) => ProviderError::Transport {
            endpoint: TOKEN_ENDPOINT.into(),
            reason: e.to_string(),
        }
        .into(),
        RequestTokenError::Parse(e, body) => ProviderError::InvalidResponse {
            endpoint: TOKEN_ENDPOINT.into(),
            reason: format!("{e}: {}", String::from_utf8_lossy(&body)),
        }
        .into(),
        RequestTokenError::Other(reason) => ProviderError::TokenEndpoint { reason }.into(),
    }
}
