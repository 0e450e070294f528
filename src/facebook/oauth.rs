//! Graph API OAuth endpoints: authorization dialog URL, code exchange,
//! long-lived upgrade and token introspection.

use chrono::{DateTime, Utc};
use tracing::{debug, instrument};
use url::Url;

use super::types::{GraphDebugTokenResponse, GraphErrorEnvelope, GraphTokenResponse};
use super::{FacebookAppConfig, GraphApiConfig, http_client};
use crate::crypto::SecretToken;
use crate::error::{AdsError, Result};

/// Access token returned by an exchange.
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub access_token: SecretToken,
    /// Lifetime in seconds, when the provider reported one
    pub expires_in: Option<i64>,
}

/// Outcome of `debug_token` for a user token.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenIntrospection {
    pub is_valid: bool,
    /// Revised expiry; `None` when the provider reported 0 or nothing
    pub expires_at: Option<DateTime<Utc>>,
    pub scopes: Vec<String>,
}

/// Client for the app-authenticated OAuth endpoints.
#[derive(Clone)]
pub struct GraphOAuthClient {
    http: reqwest::Client,
    app: FacebookAppConfig,
    graph_base: String,
}

impl GraphOAuthClient {
    pub fn new(app: FacebookAppConfig, graph: &GraphApiConfig) -> Self {
        Self::with_http_client(http_client(), app, graph)
    }

    pub fn with_http_client(
        http: reqwest::Client,
        app: FacebookAppConfig,
        graph: &GraphApiConfig,
    ) -> Self {
        Self {
            http,
            app,
            graph_base: graph.base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn app(&self) -> &FacebookAppConfig {
        &self.app
    }

    fn graph_url(&self, path: &str) -> Result<Url> {
        let raw = format!("{}/{}", self.graph_base, path.trim_start_matches('/'));
        Url::parse(&raw)
            .map_err(|e| AdsError::Configuration(format!("invalid Graph API URL {raw}: {e}")))
    }

    /// Provider consent URL carrying the PKCE challenge.
    pub fn authorize_url(&self, state: &str, code_challenge: &str) -> Result<Url> {
        let raw = format!("{}/dialog/oauth", self.app.dialog_base.trim_end_matches('/'));
        let mut url = Url::parse(&raw)
            .map_err(|e| AdsError::Configuration(format!("invalid dialog URL {raw}: {e}")))?;

        url.query_pairs_mut()
            .append_pair("client_id", &self.app.app_id)
            .append_pair("redirect_uri", &self.app.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &self.app.scopes.join(","))
            .append_pair("state", state)
            .append_pair("code_challenge", code_challenge)
            .append_pair("code_challenge_method", "S256");

        Ok(url)
    }

    /// Exchange an authorization code plus verifier for a short-lived token.
    #[instrument(skip_all)]
    pub async fn exchange_code(&self, code: &str, code_verifier: &str) -> Result<TokenGrant> {
        let url = self.graph_url("oauth/access_token")?;
        let params = [
            ("client_id", self.app.app_id.as_str()),
            ("client_secret", self.app.app_secret.as_str()),
            ("redirect_uri", self.app.redirect_uri.as_str()),
            ("code", code),
            ("code_verifier", code_verifier),
        ];

        let response = self
            .http
            .post(url)
            .header("Accept", "application/json")
            .form(&params)
            .send()
            .await?;

        let token: GraphTokenResponse = read_json(response).await?;
        debug!(expires_in = ?token.expires_in, "Exchanged authorization code");
        Ok(token.into())
    }

    /// Upgrade a short-lived token to a long-lived one.
    #[instrument(skip_all)]
    pub async fn exchange_long_lived(&self, short_lived: &SecretToken) -> Result<TokenGrant> {
        let mut url = self.graph_url("oauth/access_token")?;
        url.query_pairs_mut()
            .append_pair("grant_type", "fb_exchange_token")
            .append_pair("client_id", &self.app.app_id)
            .append_pair("client_secret", &self.app.app_secret)
            .append_pair("fb_exchange_token", short_lived.expose());

        let response = self.http.get(url).send().await?;
        let token: GraphTokenResponse = read_json(response).await?;
        Ok(token.into())
    }

    /// Ask the provider whether `token` is still valid, using the app token.
    #[instrument(skip_all)]
    pub async fn debug_token(&self, token: &SecretToken) -> Result<TokenIntrospection> {
        let mut url = self.graph_url("debug_token")?;
        url.query_pairs_mut()
            .append_pair("input_token", token.expose())
            .append_pair("access_token", &self.app.app_access_token());

        let response = self.http.get(url).send().await?;
        let payload: GraphDebugTokenResponse = read_json(response).await?;

        let expires_at = payload
            .data
            .expires_at
            .filter(|ts| *ts > 0)
            .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0));

        Ok(TokenIntrospection {
            is_valid: payload.data.is_valid,
            expires_at,
            scopes: payload.data.scopes.unwrap_or_default(),
        })
    }
}

impl From<GraphTokenResponse> for TokenGrant {
    fn from(value: GraphTokenResponse) -> Self {
        Self {
            access_token: SecretToken::new(value.access_token),
            expires_in: value.expires_in.filter(|secs| *secs > 0),
        }
    }
}

/// Decode a success body, or turn a failure into [`AdsError::Upstream`].
async fn read_json<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        let message = serde_json::from_str::<GraphErrorEnvelope>(&body)
            .ok()
            .and_then(|envelope| envelope.error)
            .and_then(|error| error.message);
        return Err(AdsError::upstream(status.as_u16(), message, Some(&body)));
    }

    serde_json::from_str(&body).map_err(|e| AdsError::MalformedResponse(e.to_string()))
}
