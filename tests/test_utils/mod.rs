//! Test utilities shared by the integration tests.
//!
//! In-memory SQLite with migrations applied, credential fixtures, a scripted
//! in-memory [`AdsApi`] and config builders pointed at a mock Graph API.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use ads_sync::config::AppConfig;
use ads_sync::crypto::{CryptoKey, SecretToken, encrypt_token};
use ads_sync::error::{AdsError, Result as AdsResult};
use ads_sync::facebook::{
    AdAccountRecord, AdRecord, AdSetRecord, AdsApi, AdsApiFactory, CampaignRecord,
    FacebookAppConfig, GraphApiConfig, InsightRecord,
};
use ads_sync::models::{InsightLevel, credential};
use ads_sync::repositories::{CredentialRepository, NewCredential};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use migration::{Migrator, MigratorTrait};
use sea_orm::{Database, DatabaseConnection};

pub const TEST_KEY_BYTES: [u8; 32] = [7u8; 32];

/// Sets up an in-memory SQLite database with all migrations applied.
///
/// Foreign keys stay enforced, so fixtures must insert parents first.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:").await?;
    Migrator::up(&db, None).await?;
    Ok(db)
}

pub fn test_crypto_key() -> CryptoKey {
    CryptoKey::new(TEST_KEY_BYTES.to_vec()).expect("32-byte key")
}

/// Config pointing every provider URL at `base_url` (usually a wiremock server).
pub fn test_config(base_url: &str) -> AppConfig {
    AppConfig {
        profile: "test".to_string(),
        database_url: "sqlite::memory:".to_string(),
        crypto_key: Some(TEST_KEY_BYTES.to_vec()),
        facebook_app_id: Some("test-app".to_string()),
        facebook_app_secret: Some("test-secret".to_string()),
        facebook_redirect_uri: Some("https://app.example.test/oauth/callback".to_string()),
        facebook_graph_base: base_url.to_string(),
        facebook_dialog_base: base_url.to_string(),
        ..AppConfig::default()
    }
}

pub fn graph_config(base_url: &str, max_pages: usize) -> GraphApiConfig {
    GraphApiConfig {
        max_pages,
        ..test_config(base_url).graph_api_config()
    }
}

pub fn app_config(base_url: &str) -> FacebookAppConfig {
    test_config(base_url)
        .facebook_app()
        .expect("test config has app credentials")
}

/// Store a credential for `user_id` holding `token`, encrypted with the test key.
pub async fn create_credential(
    db: &DatabaseConnection,
    user_id: &str,
    token: &str,
    expires_at: DateTime<Utc>,
) -> Result<credential::Model> {
    let repo = CredentialRepository::new(db.clone());
    let ciphertext = encrypt_token(&test_crypto_key(), user_id, token)?;
    let model = repo
        .upsert_for_user(NewCredential {
            user_id: user_id.to_string(),
            account_ids: vec![],
            access_token_ciphertext: ciphertext,
            refresh_token_ciphertext: None,
            expires_at,
        })
        .await?;
    Ok(model)
}

/// Credential valid for another hour.
pub async fn create_live_credential(
    db: &DatabaseConnection,
    user_id: &str,
) -> Result<credential::Model> {
    create_credential(db, user_id, "user-token", Utc::now() + Duration::hours(1)).await
}

pub fn day(offset: i64) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 5, 1).expect("valid date") + Duration::days(offset)
}

pub fn account(id: &str) -> AdAccountRecord {
    AdAccountRecord {
        id: id.to_string(),
        account_id: id.strip_prefix("act_").map(str::to_string),
        name: format!("Account {id}"),
        currency: Some("USD".to_string()),
        status: Some("1".to_string()),
        timezone_name: Some("America/New_York".to_string()),
    }
}

pub fn campaign(id: &str) -> CampaignRecord {
    CampaignRecord {
        id: id.to_string(),
        name: format!("Campaign {id}"),
        status: Some("ACTIVE".to_string()),
        objective: Some("OUTCOME_SALES".to_string()),
        buying_type: Some("AUCTION".to_string()),
        start_time: None,
        stop_time: None,
    }
}

pub fn ad_set(id: &str, campaign_id: Option<&str>) -> AdSetRecord {
    AdSetRecord {
        id: id.to_string(),
        campaign_id: campaign_id.map(str::to_string),
        name: format!("Ad set {id}"),
        status: Some("ACTIVE".to_string()),
        optimization_goal: Some("OFFSITE_CONVERSIONS".to_string()),
        daily_budget: Some(5000.0),
        lifetime_budget: None,
        start_time: None,
        end_time: None,
    }
}

pub fn ad(id: &str, campaign_id: Option<&str>, ad_set_id: Option<&str>) -> AdRecord {
    AdRecord {
        id: id.to_string(),
        campaign_id: campaign_id.map(str::to_string),
        ad_set_id: ad_set_id.map(str::to_string),
        name: format!("Ad {id}"),
        status: Some("ACTIVE".to_string()),
        creative_id: Some(format!("creative_{id}")),
    }
}

pub fn insight(entity_id: &str, level: InsightLevel, date: NaiveDate) -> InsightRecord {
    InsightRecord {
        entity_id: entity_id.to_string(),
        level,
        date,
        spend: Some(12.5),
        impressions: Some(1000),
        clicks: Some(40),
        cpa: Some(3.1),
        roas: Some(2.4),
        purchase_value: Some(30.0),
        currency: Some("USD".to_string()),
    }
}

/// In-memory [`AdsApi`] answering from fixed data, with optional failures.
#[derive(Clone, Default)]
pub struct ScriptedAdsApi {
    pub accounts: Vec<AdAccountRecord>,
    pub campaigns: HashMap<String, Vec<CampaignRecord>>,
    pub ad_sets: HashMap<String, Vec<AdSetRecord>>,
    pub ads: HashMap<String, Vec<AdRecord>>,
    pub insights: HashMap<(String, InsightLevel), Vec<InsightRecord>>,
    failures: HashMap<(String, &'static str), (u16, String)>,
    insight_calls: Arc<Mutex<Vec<(String, InsightLevel, Option<NaiveDate>)>>>,
}

impl ScriptedAdsApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an account with 2 campaigns, 3 ad sets, 5 ads and 5 days of
    /// insights at each level, ids prefixed by the account id.
    pub fn with_standard_account(mut self, account_id: &str) -> Self {
        let c = |n: u32| format!("{account_id}_c{n}");
        let s = |n: u32| format!("{account_id}_s{n}");
        let a = |n: u32| format!("{account_id}_a{n}");

        self.accounts.push(account(account_id));
        self.campaigns.insert(
            account_id.to_string(),
            vec![campaign(&c(1)), campaign(&c(2))],
        );
        self.ad_sets.insert(
            account_id.to_string(),
            vec![
                ad_set(&s(1), Some(&c(1))),
                ad_set(&s(2), Some(&c(1))),
                ad_set(&s(3), Some(&c(2))),
            ],
        );
        self.ads.insert(
            account_id.to_string(),
            vec![
                ad(&a(1), Some(&c(1)), Some(&s(1))),
                ad(&a(2), Some(&c(1)), Some(&s(1))),
                ad(&a(3), Some(&c(1)), Some(&s(2))),
                ad(&a(4), Some(&c(2)), Some(&s(3))),
                ad(&a(5), Some(&c(2)), Some(&s(3))),
            ],
        );

        for (level, entity) in [
            (InsightLevel::Campaign, c(1)),
            (InsightLevel::AdSet, s(1)),
            (InsightLevel::Ad, a(1)),
        ] {
            let rows = (0..5).map(|d| insight(&entity, level, day(d))).collect();
            self.insights.insert((account_id.to_string(), level), rows);
        }

        self
    }

    /// Make `operation` (`campaigns`, `ad_sets`, `ads` or `insights`) fail
    /// with an upstream error for `account_id`.
    pub fn failing(mut self, account_id: &str, operation: &'static str, status: u16, message: &str) -> Self {
        self.failures
            .insert((account_id.to_string(), operation), (status, message.to_string()));
        self
    }

    pub fn set_insights(&mut self, account_id: &str, level: InsightLevel, rows: Vec<InsightRecord>) {
        self.insights.insert((account_id.to_string(), level), rows);
    }

    pub fn insight_calls(&self) -> Vec<(String, InsightLevel, Option<NaiveDate>)> {
        self.insight_calls.lock().expect("calls lock").clone()
    }

    fn check(&self, account_id: &str, operation: &'static str) -> AdsResult<()> {
        match self.failures.get(&(account_id.to_string(), operation)) {
            Some((status, message)) => Err(AdsError::upstream(*status, Some(message.clone()), None)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl AdsApi for ScriptedAdsApi {
    async fn accounts(&self) -> AdsResult<Vec<AdAccountRecord>> {
        Ok(self.accounts.clone())
    }

    async fn campaigns(&self, account_id: &str) -> AdsResult<Vec<CampaignRecord>> {
        self.check(account_id, "campaigns")?;
        Ok(self.campaigns.get(account_id).cloned().unwrap_or_default())
    }

    async fn ad_sets(&self, account_id: &str) -> AdsResult<Vec<AdSetRecord>> {
        self.check(account_id, "ad_sets")?;
        Ok(self.ad_sets.get(account_id).cloned().unwrap_or_default())
    }

    async fn ads(&self, account_id: &str) -> AdsResult<Vec<AdRecord>> {
        self.check(account_id, "ads")?;
        Ok(self.ads.get(account_id).cloned().unwrap_or_default())
    }

    async fn insights(
        &self,
        account_id: &str,
        level: InsightLevel,
        since: Option<NaiveDate>,
    ) -> AdsResult<Vec<InsightRecord>> {
        self.insight_calls
            .lock()
            .expect("calls lock")
            .push((account_id.to_string(), level, since));
        self.check(account_id, "insights")?;
        Ok(self
            .insights
            .get(&(account_id.to_string(), level))
            .cloned()
            .unwrap_or_default())
    }
}

/// Factory handing out the same scripted API regardless of token, recording
/// the tokens it was asked for.
#[derive(Clone)]
pub struct ScriptedApiFactory {
    pub api: Arc<ScriptedAdsApi>,
    pub tokens: Arc<Mutex<Vec<String>>>,
}

impl ScriptedApiFactory {
    pub fn new(api: ScriptedAdsApi) -> Self {
        Self {
            api: Arc::new(api),
            tokens: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn tokens(&self) -> Vec<String> {
        self.tokens.lock().expect("tokens lock").clone()
    }
}

impl AdsApiFactory for ScriptedApiFactory {
    fn for_token(&self, token: SecretToken) -> Arc<dyn AdsApi> {
        self.tokens
            .lock()
            .expect("tokens lock")
            .push(token.expose().to_string());
        self.api.clone()
    }
}
