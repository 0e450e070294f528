//! Paginated Graph API reads for the ad entity hierarchy and insights.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use metrics::counter;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, instrument};
use url::Url;

use super::types::{
    AdAccountRecord, AdRecord, AdSetRecord, CampaignRecord, GraphAd, GraphAdAccount, GraphAdSet,
    GraphCampaign, GraphEnvelope, GraphErrorEnvelope, GraphInsight, InsightRecord,
};
use super::{GraphApiConfig, http_client};
use crate::crypto::SecretToken;
use crate::error::{AdsError, Result};
use crate::models::InsightLevel;

const ACCOUNT_FIELDS: &str = "id,account_id,name,currency,account_status,timezone_name";
const CAMPAIGN_FIELDS: &str = "id,name,status,objective,buying_type,start_time,stop_time";
const AD_SET_FIELDS: &str = "id,name,status,campaign_id,optimization_goal,daily_budget,lifetime_budget,start_time,end_time";
const AD_FIELDS: &str = "id,name,status,campaign_id,adset_id,creative{id}";
const INSIGHT_FIELDS: &str = "campaign_id,adset_id,ad_id,date_start,spend,impressions,clicks,cpa,purchase_roas,purchase_conversion_value,account_currency";

/// Read access to one user's ad data.
///
/// Every call drains all pages before returning.
#[async_trait]
pub trait AdsApi: Send + Sync {
    async fn accounts(&self) -> Result<Vec<AdAccountRecord>>;

    async fn campaigns(&self, account_id: &str) -> Result<Vec<CampaignRecord>>;

    async fn ad_sets(&self, account_id: &str) -> Result<Vec<AdSetRecord>>;

    async fn ads(&self, account_id: &str) -> Result<Vec<AdRecord>>;

    /// Daily rows for `level`; `since` restricts the window to `since..=today`.
    async fn insights(
        &self,
        account_id: &str,
        level: InsightLevel,
        since: Option<NaiveDate>,
    ) -> Result<Vec<InsightRecord>>;
}

/// Builds an [`AdsApi`] bound to one user's token.
pub trait AdsApiFactory: Send + Sync {
    fn for_token(&self, token: SecretToken) -> Arc<dyn AdsApi>;
}

/// Factory producing [`GraphAdsClient`]s that share one HTTP connection pool.
#[derive(Clone)]
pub struct GraphAdsClientFactory {
    http: reqwest::Client,
    config: GraphApiConfig,
}

impl GraphAdsClientFactory {
    pub fn new(config: GraphApiConfig) -> Self {
        Self {
            http: http_client(),
            config,
        }
    }
}

impl AdsApiFactory for GraphAdsClientFactory {
    fn for_token(&self, token: SecretToken) -> Arc<dyn AdsApi> {
        Arc::new(GraphAdsClient::with_http_client(
            self.http.clone(),
            self.config.clone(),
            token,
        ))
    }
}

/// [`AdsApi`] backed by the Graph API, authenticated with one user's token.
#[derive(Clone)]
pub struct GraphAdsClient {
    http: reqwest::Client,
    config: GraphApiConfig,
    token: SecretToken,
}

impl GraphAdsClient {
    pub fn new(config: GraphApiConfig, token: SecretToken) -> Self {
        Self::with_http_client(http_client(), config, token)
    }

    pub fn with_http_client(http: reqwest::Client, config: GraphApiConfig, token: SecretToken) -> Self {
        Self {
            http,
            config,
            token,
        }
    }

    fn endpoint(&self, path: &str, params: &[(&str, String)]) -> Result<Url> {
        let raw = format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        let mut url = Url::parse(&raw)
            .map_err(|e| AdsError::Configuration(format!("invalid Graph API URL {raw}: {e}")))?;
        {
            let mut query = url.query_pairs_mut();
            for (key, value) in params {
                query.append_pair(key, value);
            }
            query.append_pair("limit", &self.config.page_size.to_string());
        }
        Ok(url)
    }

    /// Parse a `paging.next` cursor, refusing any URL outside the configured
    /// Graph API origin so the bearer token never leaves it.
    fn next_page_url(&self, raw: &str) -> Result<Url> {
        let base = Url::parse(&self.config.base_url).map_err(|e| {
            AdsError::Configuration(format!("invalid Graph API URL {}: {e}", self.config.base_url))
        })?;
        let next = Url::parse(raw)
            .map_err(|e| AdsError::MalformedResponse(format!("invalid paging cursor: {e}")))?;

        if next.origin() != base.origin() {
            return Err(AdsError::MalformedResponse(format!(
                "paging cursor points outside {}",
                base.origin().ascii_serialization()
            )));
        }
        Ok(next)
    }

    /// Follow `paging.next` until exhausted, accumulating every page.
    async fn fetch_all<T: DeserializeOwned>(&self, url: Url) -> Result<Vec<T>> {
        let mut results = Vec::new();
        let mut next = Some(url);
        let mut pages = 0usize;

        while let Some(page_url) = next.take() {
            if pages >= self.config.max_pages {
                return Err(AdsError::PaginationLimit {
                    max_pages: self.config.max_pages,
                });
            }
            pages += 1;

            let response = self
                .http
                .get(page_url)
                .bearer_auth(self.token.expose())
                .send()
                .await?;
            let status = response.status();
            let body = response.text().await?;

            if !status.is_success() {
                let message = serde_json::from_str::<GraphErrorEnvelope>(&body)
                    .ok()
                    .and_then(|envelope| envelope.error)
                    .and_then(|error| error.message);
                return Err(AdsError::upstream(status.as_u16(), message, Some(&body)));
            }

            let envelope: GraphEnvelope<T> = serde_json::from_str(&body)
                .map_err(|e| AdsError::MalformedResponse(e.to_string()))?;

            if let Some(error) = envelope.error {
                return Err(AdsError::upstream(status.as_u16(), error.message, Some(&body)));
            }

            counter!("ads_api_pages_fetched_total").increment(1);
            debug!(page = pages, rows = envelope.data.len(), "Fetched Graph API page");

            results.extend(envelope.data);
            next = match envelope.paging.and_then(|paging| paging.next) {
                Some(raw) if !raw.is_empty() => Some(self.next_page_url(&raw)?),
                _ => None,
            };
        }

        Ok(results)
    }
}

#[async_trait]
impl AdsApi for GraphAdsClient {
    #[instrument(skip_all)]
    async fn accounts(&self) -> Result<Vec<AdAccountRecord>> {
        let url = self.endpoint("me/adaccounts", &[("fields", ACCOUNT_FIELDS.to_string())])?;
        let raw: Vec<GraphAdAccount> = self.fetch_all(url).await?;
        Ok(raw.into_iter().map(GraphAdAccount::into_record).collect())
    }

    #[instrument(skip_all, fields(account_id = %account_id))]
    async fn campaigns(&self, account_id: &str) -> Result<Vec<CampaignRecord>> {
        let url = self.endpoint(
            &format!("{account_id}/campaigns"),
            &[("fields", CAMPAIGN_FIELDS.to_string())],
        )?;
        let raw: Vec<GraphCampaign> = self.fetch_all(url).await?;
        Ok(raw.into_iter().map(GraphCampaign::into_record).collect())
    }

    #[instrument(skip_all, fields(account_id = %account_id))]
    async fn ad_sets(&self, account_id: &str) -> Result<Vec<AdSetRecord>> {
        let url = self.endpoint(
            &format!("{account_id}/adsets"),
            &[("fields", AD_SET_FIELDS.to_string())],
        )?;
        let raw: Vec<GraphAdSet> = self.fetch_all(url).await?;
        Ok(raw.into_iter().map(GraphAdSet::into_record).collect())
    }

    #[instrument(skip_all, fields(account_id = %account_id))]
    async fn ads(&self, account_id: &str) -> Result<Vec<AdRecord>> {
        let url = self.endpoint(
            &format!("{account_id}/ads"),
            &[("fields", AD_FIELDS.to_string())],
        )?;
        let raw: Vec<GraphAd> = self.fetch_all(url).await?;
        Ok(raw.into_iter().map(GraphAd::into_record).collect())
    }

    #[instrument(skip_all, fields(account_id = %account_id, level = %level))]
    async fn insights(
        &self,
        account_id: &str,
        level: InsightLevel,
        since: Option<NaiveDate>,
    ) -> Result<Vec<InsightRecord>> {
        let mut params = vec![
            ("level", level.as_provider_param().to_string()),
            ("fields", INSIGHT_FIELDS.to_string()),
            ("time_increment", "1".to_string()),
        ];
        if let Some(since) = since {
            let until = Utc::now().date_naive();
            params.push((
                "time_range",
                json!({
                    "since": since.format("%Y-%m-%d").to_string(),
                    "until": until.format("%Y-%m-%d").to_string(),
                })
                .to_string(),
            ));
        }

        let url = self.endpoint(&format!("{account_id}/insights"), &params)?;
        let raw: Vec<GraphInsight> = self.fetch_all(url).await?;
        let fetched = raw.len();
        let records: Vec<InsightRecord> = raw
            .into_iter()
            .filter_map(|row| row.into_record(level))
            .collect();

        if records.len() < fetched {
            debug!(
                dropped = fetched - records.len(),
                "Dropped insight rows without entity id or date"
            );
        }

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(max_pages: usize) -> GraphAdsClient {
        GraphAdsClient::new(
            GraphApiConfig {
                base_url: "https://graph.example.test/v19.0/".to_string(),
                page_size: 500,
                max_pages,
            },
            SecretToken::new("token"),
        )
    }

    #[test]
    fn endpoint_appends_fields_and_limit() {
        let url = client(10)
            .endpoint("act_1/campaigns", &[("fields", "id,name".to_string())])
            .unwrap();
        assert_eq!(url.path(), "/v19.0/act_1/campaigns");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("fields".to_string(), "id,name".to_string())));
        assert!(pairs.contains(&("limit".to_string(), "500".to_string())));
        assert!(!url.as_str().contains("access_token"));
    }

    #[test]
    fn paging_cursor_must_stay_on_graph_origin() {
        let client = client(10);
        assert!(
            client
                .next_page_url("https://graph.example.test/v19.0/act_1/campaigns?after=abc")
                .is_ok()
        );
        for foreign in [
            "https://attacker.example.test/v19.0/act_1/campaigns",
            "http://graph.example.test/v19.0/act_1/campaigns",
            "https://graph.example.test:8443/v19.0/act_1/campaigns",
            "not a url",
        ] {
            assert!(
                matches!(
                    client.next_page_url(foreign),
                    Err(AdsError::MalformedResponse(_))
                ),
                "{foreign} should be refused"
            );
        }
    }
}
