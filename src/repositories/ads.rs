//! # Ads Repository
//!
//! Idempotent bulk upserts for the mirrored entity hierarchy and daily
//! insights. Each call writes one entity kind for one account inside a single
//! transaction: either the whole batch lands or none of it does.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::hash::Hash;

use chrono::{NaiveDate, Utc};
use metrics::counter;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, IntoActiveModel,
    PaginatorTrait, QueryFilter, Set, TransactionTrait, sea_query::OnConflict,
};
use tracing::{debug, error};
use uuid::Uuid;

use crate::facebook::types::{
    AdAccountRecord, AdRecord, AdSetRecord, CampaignRecord, InsightRecord,
};
use crate::models::{InsightLevel, ad, ad_account, ad_set, campaign, insight};

/// Default rows per INSERT statement.
pub const DEFAULT_CHUNK_SIZE: usize = 200;

/// Repository for the ad hierarchy and insight tables
#[derive(Clone)]
pub struct AdsRepository {
    db: DatabaseConnection,
    chunk_size: usize,
}

impl AdsRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self::with_chunk_size(db, DEFAULT_CHUNK_SIZE)
    }

    pub fn with_chunk_size(db: DatabaseConnection, chunk_size: usize) -> Self {
        Self {
            db,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Upsert accounts keyed by provider id.
    ///
    /// `initial_sync_completed_at` is stamped (and overwritten on conflict)
    /// only when `mark_initial_sync` is set; otherwise existing stamps are
    /// left untouched.
    pub async fn upsert_accounts(
        &self,
        user_id: &str,
        credential_id: Uuid,
        accounts: &[AdAccountRecord],
        mark_initial_sync: bool,
    ) -> Result<usize, DbErr> {
        let now = Utc::now().fixed_offset();
        let stamp = mark_initial_sync.then_some(now);

        let rows = dedupe_by_key(accounts.iter().collect(), |a| a.id.clone())
            .into_iter()
            .map(|account| ad_account::ActiveModel {
                id: Set(account.id.clone()),
                user_id: Set(user_id.to_string()),
                credential_id: Set(credential_id),
                name: Set(account.name.clone()),
                currency: Set(account.currency.clone()),
                status: Set(account.status.clone()),
                timezone_name: Set(account.timezone_name.clone()),
                initial_sync_completed_at: Set(stamp),
                created_at: Set(now),
                updated_at: Set(now),
            })
            .collect::<Vec<_>>();

        let mut update_columns = vec![
            ad_account::Column::UserId,
            ad_account::Column::CredentialId,
            ad_account::Column::Name,
            ad_account::Column::Currency,
            ad_account::Column::Status,
            ad_account::Column::TimezoneName,
            ad_account::Column::UpdatedAt,
        ];
        if mark_initial_sync {
            update_columns.push(ad_account::Column::InitialSyncCompletedAt);
        }

        let on_conflict = OnConflict::column(ad_account::Column::Id)
            .update_columns(update_columns)
            .to_owned();

        self.write_batch::<ad_account::Entity, _>("ad_accounts", rows, on_conflict)
            .await
    }

    /// Upsert one account's campaigns keyed by provider id.
    pub async fn upsert_campaigns(
        &self,
        account_id: &str,
        campaigns: &[CampaignRecord],
    ) -> Result<usize, DbErr> {
        let now = Utc::now().fixed_offset();

        let rows = dedupe_by_key(campaigns.iter().collect(), |c| c.id.clone())
            .into_iter()
            .map(|c| campaign::ActiveModel {
                id: Set(c.id.clone()),
                account_id: Set(account_id.to_string()),
                name: Set(c.name.clone()),
                status: Set(c.status.clone()),
                objective: Set(c.objective.clone()),
                buying_type: Set(c.buying_type.clone()),
                start_time: Set(c.start_time.map(|t| t.fixed_offset())),
                stop_time: Set(c.stop_time.map(|t| t.fixed_offset())),
                created_at: Set(now),
                updated_at: Set(now),
            })
            .collect::<Vec<_>>();

        let on_conflict = OnConflict::column(campaign::Column::Id)
            .update_columns([
                campaign::Column::AccountId,
                campaign::Column::Name,
                campaign::Column::Status,
                campaign::Column::Objective,
                campaign::Column::BuyingType,
                campaign::Column::StartTime,
                campaign::Column::StopTime,
                campaign::Column::UpdatedAt,
            ])
            .to_owned();

        self.write_batch::<campaign::Entity, _>("campaigns", rows, on_conflict)
            .await
    }

    /// Upsert one account's ad sets. `campaign_id` must already reference a
    /// stored campaign or be `None`.
    pub async fn upsert_ad_sets(
        &self,
        account_id: &str,
        ad_sets: &[AdSetRecord],
    ) -> Result<usize, DbErr> {
        let now = Utc::now().fixed_offset();

        let rows = dedupe_by_key(ad_sets.iter().collect(), |s| s.id.clone())
            .into_iter()
            .map(|s| ad_set::ActiveModel {
                id: Set(s.id.clone()),
                account_id: Set(account_id.to_string()),
                campaign_id: Set(s.campaign_id.clone()),
                name: Set(s.name.clone()),
                status: Set(s.status.clone()),
                optimization_goal: Set(s.optimization_goal.clone()),
                daily_budget: Set(s.daily_budget),
                lifetime_budget: Set(s.lifetime_budget),
                start_time: Set(s.start_time.map(|t| t.fixed_offset())),
                end_time: Set(s.end_time.map(|t| t.fixed_offset())),
                created_at: Set(now),
                updated_at: Set(now),
            })
            .collect::<Vec<_>>();

        let on_conflict = OnConflict::column(ad_set::Column::Id)
            .update_columns([
                ad_set::Column::AccountId,
                ad_set::Column::CampaignId,
                ad_set::Column::Name,
                ad_set::Column::Status,
                ad_set::Column::OptimizationGoal,
                ad_set::Column::DailyBudget,
                ad_set::Column::LifetimeBudget,
                ad_set::Column::StartTime,
                ad_set::Column::EndTime,
                ad_set::Column::UpdatedAt,
            ])
            .to_owned();

        self.write_batch::<ad_set::Entity, _>("ad_sets", rows, on_conflict)
            .await
    }

    /// Upsert one account's ads. Parent references must already exist or be `None`.
    pub async fn upsert_ads(&self, account_id: &str, ads: &[AdRecord]) -> Result<usize, DbErr> {
        let now = Utc::now().fixed_offset();

        let rows = dedupe_by_key(ads.iter().collect(), |a| a.id.clone())
            .into_iter()
            .map(|a| ad::ActiveModel {
                id: Set(a.id.clone()),
                account_id: Set(account_id.to_string()),
                campaign_id: Set(a.campaign_id.clone()),
                ad_set_id: Set(a.ad_set_id.clone()),
                name: Set(a.name.clone()),
                status: Set(a.status.clone()),
                creative_id: Set(a.creative_id.clone()),
                created_at: Set(now),
                updated_at: Set(now),
            })
            .collect::<Vec<_>>();

        let on_conflict = OnConflict::column(ad::Column::Id)
            .update_columns([
                ad::Column::AccountId,
                ad::Column::CampaignId,
                ad::Column::AdSetId,
                ad::Column::Name,
                ad::Column::Status,
                ad::Column::CreativeId,
                ad::Column::UpdatedAt,
            ])
            .to_owned();

        self.write_batch::<ad::Entity, _>("ads", rows, on_conflict).await
    }

    /// Upsert insight rows keyed by `(account_id, entity_id, level, date)`.
    ///
    /// Every metric is overwritten from the latest fetch. Missing spend,
    /// impressions and clicks are written as zero; cpa, roas and purchase
    /// value stay null.
    pub async fn upsert_insights(
        &self,
        account_id: &str,
        insights: &[InsightRecord],
    ) -> Result<usize, DbErr> {
        let now = Utc::now().fixed_offset();

        let rows = dedupe_by_key(insights.iter().collect(), |i| {
            (i.entity_id.clone(), i.level, i.date)
        })
        .into_iter()
        .map(|i| insight::ActiveModel {
            id: Set(Uuid::new_v4()),
            account_id: Set(account_id.to_string()),
            entity_id: Set(i.entity_id.clone()),
            level: Set(i.level.as_str().to_string()),
            date: Set(i.date),
            spend: Set(i.spend.unwrap_or(0.0)),
            impressions: Set(i.impressions.unwrap_or(0)),
            clicks: Set(i.clicks.unwrap_or(0)),
            cpa: Set(i.cpa),
            roas: Set(i.roas),
            purchase_value: Set(i.purchase_value),
            currency: Set(i.currency.clone()),
            created_at: Set(now),
            updated_at: Set(now),
        })
        .collect::<Vec<_>>();

        let on_conflict = OnConflict::columns([
            insight::Column::AccountId,
            insight::Column::EntityId,
            insight::Column::Level,
            insight::Column::Date,
        ])
        .update_columns([
            insight::Column::Spend,
            insight::Column::Impressions,
            insight::Column::Clicks,
            insight::Column::Cpa,
            insight::Column::Roas,
            insight::Column::PurchaseValue,
            insight::Column::Currency,
            insight::Column::UpdatedAt,
        ])
        .to_owned();

        self.write_batch::<insight::Entity, _>("ad_insights", rows, on_conflict)
            .await
    }

    /// Run one batch in a single transaction, chunked into multi-row inserts.
    async fn write_batch<E, A>(
        &self,
        kind: &'static str,
        rows: Vec<A>,
        on_conflict: OnConflict,
    ) -> Result<usize, DbErr>
    where
        E: EntityTrait,
        E::Model: IntoActiveModel<A>,
        A: ActiveModelTrait<Entity = E> + Send,
    {
        if rows.is_empty() {
            return Ok(0);
        }

        let total = rows.len();
        let txn = self.db.begin().await?;

        let mut remaining = rows.into_iter().peekable();
        while remaining.peek().is_some() {
            let chunk: Vec<A> = remaining.by_ref().take(self.chunk_size).collect();
            if let Err(e) = E::insert_many(chunk)
                .on_conflict(on_conflict.clone())
                .exec_without_returning(&txn)
                .await
            {
                error!(kind, "Bulk upsert failed, rolling back batch: {}", e);
                txn.rollback().await?;
                return Err(e);
            }
        }

        txn.commit().await?;

        counter!("ads_sync_rows_upserted_total", "kind" => kind).increment(total as u64);
        debug!(kind, rows = total, "Bulk upsert committed");

        Ok(total)
    }

    pub async fn find_account(&self, id: &str) -> Result<Option<ad_account::Model>, DbErr> {
        ad_account::Entity::find_by_id(id.to_string())
            .one(&self.db)
            .await
    }

    pub async fn find_campaign(&self, id: &str) -> Result<Option<campaign::Model>, DbErr> {
        campaign::Entity::find_by_id(id.to_string()).one(&self.db).await
    }

    pub async fn find_ad_set(&self, id: &str) -> Result<Option<ad_set::Model>, DbErr> {
        ad_set::Entity::find_by_id(id.to_string()).one(&self.db).await
    }

    pub async fn find_ad(&self, id: &str) -> Result<Option<ad::Model>, DbErr> {
        ad::Entity::find_by_id(id.to_string()).one(&self.db).await
    }

    /// Look up one insight row by its natural key.
    pub async fn find_insight(
        &self,
        account_id: &str,
        entity_id: &str,
        level: InsightLevel,
        date: NaiveDate,
    ) -> Result<Option<insight::Model>, DbErr> {
        insight::Entity::find()
            .filter(insight::Column::AccountId.eq(account_id))
            .filter(insight::Column::EntityId.eq(entity_id))
            .filter(insight::Column::Level.eq(level.as_str()))
            .filter(insight::Column::Date.eq(date))
            .one(&self.db)
            .await
    }

    pub async fn list_accounts_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<ad_account::Model>, DbErr> {
        ad_account::Entity::find()
            .filter(ad_account::Column::UserId.eq(user_id))
            .all(&self.db)
            .await
    }

    pub async fn count_insights_for_account(&self, account_id: &str) -> Result<u64, DbErr> {
        insight::Entity::find()
            .filter(insight::Column::AccountId.eq(account_id))
            .count(&self.db)
            .await
    }
}

/// Collapse duplicate keys, keeping the first position and the last value.
///
/// A single `INSERT .. ON CONFLICT DO UPDATE` may not touch one row twice.
fn dedupe_by_key<T, K, F>(items: Vec<T>, key: F) -> Vec<T>
where
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let mut positions: HashMap<K, usize> = HashMap::with_capacity(items.len());
    let mut unique: Vec<T> = Vec::with_capacity(items.len());

    for item in items {
        match positions.entry(key(&item)) {
            Entry::Occupied(slot) => unique[*slot.get()] = item,
            Entry::Vacant(slot) => {
                slot.insert(unique.len());
                unique.push(item);
            }
        }
    }

    unique
}
