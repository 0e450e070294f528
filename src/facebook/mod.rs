//! # Facebook Graph API integration
//!
//! The only ad platform modeled by this crate. [`client`] holds the
//! paginated entity and insight reads behind the [`AdsApi`] seam, [`oauth`]
//! the token exchange and introspection endpoints, and [`types`] the wire
//! shapes plus the records handed to the sync engine.

use std::fmt;

pub mod client;
pub mod oauth;
pub mod types;

pub use client::{AdsApi, AdsApiFactory, GraphAdsClient, GraphAdsClientFactory};
pub use oauth::GraphOAuthClient;
pub use types::{AdAccountRecord, AdRecord, AdSetRecord, CampaignRecord, InsightRecord};

/// User-Agent sent with every provider request.
pub const USER_AGENT: &str = "ads-sync/0.1";

/// Versioned Graph API base and pagination limits.
#[derive(Debug, Clone)]
pub struct GraphApiConfig {
    /// `{graph_base}/{version}` without a trailing slash
    pub base_url: String,
    pub page_size: u32,
    pub max_pages: usize,
}

/// Registered app identity used for the OAuth legs and `debug_token`.
#[derive(Clone)]
pub struct FacebookAppConfig {
    pub app_id: String,
    pub app_secret: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    /// Host serving `/dialog/oauth`
    pub dialog_base: String,
    pub state_ttl_seconds: u64,
}

impl FacebookAppConfig {
    /// App access token in the `app_id|app_secret` form `debug_token` expects.
    pub fn app_access_token(&self) -> String {
        format!("{}|{}", self.app_id, self.app_secret)
    }
}

impl fmt::Debug for FacebookAppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FacebookAppConfig")
            .field("app_id", &self.app_id)
            .field("app_secret", &"[REDACTED]")
            .field("redirect_uri", &self.redirect_uri)
            .field("scopes", &self.scopes)
            .field("dialog_base", &self.dialog_base)
            .field("state_ttl_seconds", &self.state_ttl_seconds)
            .finish()
    }
}

/// Build an HTTP client with the crate's User-Agent.
pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}
