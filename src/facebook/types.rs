//! Provider payload shapes and the internal records the rest of the crate
//! consumes.
//!
//! Raw `Graph*` structs mirror the JSON the Graph API returns and never leave
//! the `facebook` module; `into_record` conversions apply field renaming and
//! numeric/date coercion.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::models::InsightLevel;

/// Paginated response envelope shared by every Graph read endpoint.
#[derive(Debug, Deserialize)]
pub struct GraphEnvelope<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
    #[serde(default)]
    pub paging: Option<GraphPaging>,
    #[serde(default)]
    pub error: Option<GraphErrorBody>,
}

#[derive(Debug, Deserialize)]
pub struct GraphPaging {
    #[serde(default)]
    pub next: Option<String>,
}

/// Error object the Graph API embeds in failed responses.
#[derive(Debug, Deserialize)]
pub struct GraphErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, rename = "type")]
    pub error_type: Option<String>,
    #[serde(default)]
    pub code: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct GraphErrorEnvelope {
    #[serde(default)]
    pub error: Option<GraphErrorBody>,
}

#[derive(Debug, Deserialize)]
pub struct GraphAdAccount {
    pub id: String,
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub account_status: Option<JsonValue>,
    #[serde(default)]
    pub timezone_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GraphCampaign {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub objective: Option<String>,
    #[serde(default)]
    pub buying_type: Option<String>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub stop_time: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GraphAdSet {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub campaign_id: Option<String>,
    #[serde(default)]
    pub optimization_goal: Option<String>,
    #[serde(default)]
    pub daily_budget: Option<JsonValue>,
    #[serde(default)]
    pub lifetime_budget: Option<JsonValue>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GraphCreativeRef {
    #[serde(default)]
    pub id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GraphAd {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub campaign_id: Option<String>,
    #[serde(default)]
    pub adset_id: Option<String>,
    #[serde(default)]
    pub creative: Option<GraphCreativeRef>,
}

#[derive(Debug, Deserialize)]
pub struct GraphActionValue {
    #[serde(default)]
    pub value: Option<JsonValue>,
}

#[derive(Debug, Deserialize)]
pub struct GraphInsight {
    #[serde(default)]
    pub campaign_id: Option<String>,
    #[serde(default)]
    pub adset_id: Option<String>,
    #[serde(default)]
    pub ad_id: Option<String>,
    #[serde(default)]
    pub date_start: Option<String>,
    #[serde(default)]
    pub spend: Option<JsonValue>,
    #[serde(default)]
    pub impressions: Option<JsonValue>,
    #[serde(default)]
    pub clicks: Option<JsonValue>,
    #[serde(default)]
    pub cpa: Option<JsonValue>,
    #[serde(default)]
    pub purchase_roas: Option<Vec<GraphActionValue>>,
    #[serde(default)]
    pub purchase_conversion_value: Option<JsonValue>,
    #[serde(default)]
    pub account_currency: Option<String>,
}

/// Response of the code and long-lived token exchanges.
#[derive(Debug, Deserialize)]
pub struct GraphTokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct GraphDebugTokenResponse {
    pub data: GraphDebugTokenData,
}

#[derive(Debug, Deserialize)]
pub struct GraphDebugTokenData {
    #[serde(default)]
    pub is_valid: bool,
    #[serde(default)]
    pub expires_at: Option<i64>,
    #[serde(default)]
    pub scopes: Option<Vec<String>>,
}

/// Ad account as the sync engine sees it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdAccountRecord {
    pub id: String,
    pub account_id: Option<String>,
    pub name: String,
    pub currency: Option<String>,
    pub status: Option<String>,
    pub timezone_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignRecord {
    pub id: String,
    pub name: String,
    pub status: Option<String>,
    pub objective: Option<String>,
    pub buying_type: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub stop_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdSetRecord {
    pub id: String,
    pub campaign_id: Option<String>,
    pub name: String,
    pub status: Option<String>,
    pub optimization_goal: Option<String>,
    pub daily_budget: Option<f64>,
    pub lifetime_budget: Option<f64>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdRecord {
    pub id: String,
    pub campaign_id: Option<String>,
    pub ad_set_id: Option<String>,
    pub name: String,
    pub status: Option<String>,
    pub creative_id: Option<String>,
}

/// One day of performance for one entity at one level.
///
/// Metric fields stay `None` when the provider omitted them; zero-filling of
/// the counters happens when the row is written.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsightRecord {
    pub entity_id: String,
    pub level: InsightLevel,
    pub date: NaiveDate,
    pub spend: Option<f64>,
    pub impressions: Option<i64>,
    pub clicks: Option<i64>,
    pub cpa: Option<f64>,
    pub roas: Option<f64>,
    pub purchase_value: Option<f64>,
    pub currency: Option<String>,
}

impl GraphAdAccount {
    pub fn into_record(self) -> AdAccountRecord {
        AdAccountRecord {
            name: self.name.unwrap_or_else(|| self.id.clone()),
            id: self.id,
            account_id: self.account_id,
            currency: self.currency,
            status: self.account_status.as_ref().and_then(coerce_string),
            timezone_name: self.timezone_name,
        }
    }
}

impl GraphCampaign {
    pub fn into_record(self) -> CampaignRecord {
        CampaignRecord {
            name: self.name.unwrap_or_else(|| self.id.clone()),
            id: self.id,
            status: self.status,
            objective: self.objective,
            buying_type: self.buying_type,
            start_time: self.start_time.as_deref().and_then(parse_timestamp),
            stop_time: self.stop_time.as_deref().and_then(parse_timestamp),
        }
    }
}

impl GraphAdSet {
    pub fn into_record(self) -> AdSetRecord {
        AdSetRecord {
            name: self.name.unwrap_or_else(|| self.id.clone()),
            id: self.id,
            campaign_id: non_empty(self.campaign_id),
            status: self.status,
            optimization_goal: self.optimization_goal,
            daily_budget: self.daily_budget.as_ref().and_then(coerce_f64),
            lifetime_budget: self.lifetime_budget.as_ref().and_then(coerce_f64),
            start_time: self.start_time.as_deref().and_then(parse_timestamp),
            end_time: self.end_time.as_deref().and_then(parse_timestamp),
        }
    }
}

impl GraphAd {
    pub fn into_record(self) -> AdRecord {
        AdRecord {
            name: self.name.unwrap_or_else(|| self.id.clone()),
            id: self.id,
            campaign_id: non_empty(self.campaign_id),
            ad_set_id: non_empty(self.adset_id),
            status: self.status,
            creative_id: self.creative.and_then(|c| non_empty(c.id)),
        }
    }
}

impl GraphInsight {
    /// Convert to an internal record, or `None` when the row has no id for
    /// the requested level or an unusable `date_start`.
    pub fn into_record(self, level: InsightLevel) -> Option<InsightRecord> {
        let entity_id = match level {
            InsightLevel::Campaign => self.campaign_id,
            InsightLevel::AdSet => self.adset_id,
            InsightLevel::Ad => self.ad_id,
        };
        let entity_id = non_empty(entity_id)?;
        let date = self.date_start.as_deref().and_then(parse_date)?;

        let roas = self
            .purchase_roas
            .as_ref()
            .and_then(|values| values.first())
            .and_then(|first| first.value.as_ref())
            .and_then(coerce_f64);

        Some(InsightRecord {
            entity_id,
            level,
            date,
            spend: self.spend.as_ref().and_then(coerce_f64),
            impressions: self.impressions.as_ref().and_then(coerce_i64),
            clicks: self.clicks.as_ref().and_then(coerce_i64),
            cpa: self.cpa.as_ref().and_then(coerce_f64),
            roas,
            purchase_value: self.purchase_conversion_value.as_ref().and_then(coerce_f64),
            currency: self.account_currency,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Parse provider timestamps such as `2024-01-01T00:00:00+0000`.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%z")
        .or_else(|_| DateTime::parse_from_rfc3339(value))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

/// Parse a `YYYY-MM-DD` day, tolerating a trailing time component.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .or_else(|| parse_timestamp(value).map(|dt| dt.date_naive()))
}

/// Numbers arrive either as JSON numbers or as decimal strings.
pub fn coerce_f64(value: &JsonValue) -> Option<f64> {
    match value {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    }
}

pub fn coerce_i64(value: &JsonValue) -> Option<i64> {
    match value {
        JsonValue::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        JsonValue::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
        }
        _ => None,
    }
}

fn coerce_string(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
