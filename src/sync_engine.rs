//! # Sync Engine
//!
//! Pulls the full entity hierarchy and insights for every reachable account
//! and merges it into storage. Accounts are processed strictly in sequence;
//! each entity kind is written in its own transaction, so a failure leaves
//! earlier batches committed and aborts the rest of the pass.

use std::collections::HashSet;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::facebook::AdsApi;
use crate::facebook::types::{AdRecord, AdSetRecord};
use crate::models::InsightLevel;
use crate::repositories::AdsRepository;

/// Inputs of one refresh pass.
pub struct RefreshParams<'a> {
    pub user_id: &'a str,
    pub credential_id: Uuid,
    pub api: &'a dyn AdsApi,
    /// Restrict insights to `since..=today`
    pub since: Option<NaiveDate>,
    /// Stamp `initial_sync_completed_at` on every account
    pub mark_initial_sync: bool,
}

/// Distinct rows written per entity kind during one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncCounts {
    pub accounts: usize,
    pub campaigns: usize,
    pub ad_sets: usize,
    pub ads: usize,
    pub insights: usize,
}

#[derive(Clone)]
pub struct SyncEngine {
    ads: AdsRepository,
}

impl SyncEngine {
    pub fn new(ads: AdsRepository) -> Self {
        Self { ads }
    }

    /// Run one pass. Re-entrant: identical upstream data yields identical rows.
    #[instrument(skip_all, fields(user_id = %params.user_id, credential_id = %params.credential_id))]
    pub async fn refresh(&self, params: RefreshParams<'_>) -> Result<SyncCounts> {
        let RefreshParams {
            user_id,
            credential_id,
            api,
            since,
            mark_initial_sync,
        } = params;

        let accounts = api.accounts().await?;
        let mut counts = SyncCounts {
            accounts: self
                .ads
                .upsert_accounts(user_id, credential_id, &accounts, mark_initial_sync)
                .await?,
            ..SyncCounts::default()
        };

        for account in &accounts {
            let account_id = account.id.as_str();

            let campaigns = api.campaigns(account_id).await?;
            counts.campaigns += self.ads.upsert_campaigns(account_id, &campaigns).await?;

            let campaign_ids: HashSet<&str> = campaigns.iter().map(|c| c.id.as_str()).collect();

            let ad_sets = link_ad_sets(api.ad_sets(account_id).await?, &campaign_ids);
            counts.ad_sets += self.ads.upsert_ad_sets(account_id, &ad_sets).await?;

            let ad_set_ids: HashSet<&str> = ad_sets.iter().map(|s| s.id.as_str()).collect();

            let ads = link_ads(api.ads(account_id).await?, &campaign_ids, &ad_set_ids);
            counts.ads += self.ads.upsert_ads(account_id, &ads).await?;

            for level in InsightLevel::ALL {
                let insights = api.insights(account_id, level, since).await?;
                counts.insights += self.ads.upsert_insights(account_id, &insights).await?;
            }

            info!(
                account_id = %account_id,
                campaigns = campaigns.len(),
                ad_sets = ad_sets.len(),
                ads = ads.len(),
                "Account synced"
            );
        }

        Ok(counts)
    }
}

/// Drop campaign references the provider did not return for this account.
fn link_ad_sets(mut ad_sets: Vec<AdSetRecord>, campaign_ids: &HashSet<&str>) -> Vec<AdSetRecord> {
    for ad_set in &mut ad_sets {
        if let Some(campaign_id) = take_dangling(&mut ad_set.campaign_id, campaign_ids) {
            warn!(ad_set_id = %ad_set.id, campaign_id = %campaign_id, "Ad set references unknown campaign; storing unlinked");
        }
    }
    ad_sets
}

/// Drop campaign and ad set references that would dangle.
fn link_ads(
    mut ads: Vec<AdRecord>,
    campaign_ids: &HashSet<&str>,
    ad_set_ids: &HashSet<&str>,
) -> Vec<AdRecord> {
    for ad in &mut ads {
        if let Some(campaign_id) = take_dangling(&mut ad.campaign_id, campaign_ids) {
            warn!(ad_id = %ad.id, campaign_id = %campaign_id, "Ad references unknown campaign; storing unlinked");
        }
        if let Some(ad_set_id) = take_dangling(&mut ad.ad_set_id, ad_set_ids) {
            warn!(ad_id = %ad.id, ad_set_id = %ad_set_id, "Ad references unknown ad set; storing unlinked");
        }
    }
    ads
}

/// Clear `reference` when it points outside `known`, returning the removed id.
fn take_dangling(reference: &mut Option<String>, known: &HashSet<&str>) -> Option<String> {
    let dangling = reference.as_deref().is_some_and(|id| !known.contains(id));
    if dangling { reference.take() } else { None }
}
