//! # Data Models
//!
//! SeaORM entities for the credential store, the mirrored ad entity
//! hierarchy, daily insights and sync job audit rows.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub mod ad;
pub mod ad_account;
pub mod ad_set;
pub mod campaign;
pub mod credential;
pub mod insight;
pub mod oauth_session;
pub mod sync_job;

pub use ad::Entity as Ad;
pub use ad_account::Entity as AdAccount;
pub use ad_set::Entity as AdSet;
pub use campaign::Entity as Campaign;
pub use credential::Entity as Credential;
pub use insight::Entity as Insight;
pub use oauth_session::Entity as OAuthSession;
pub use sync_job::Entity as SyncJob;

/// Granularity of an insight row.
///
/// Stored as `CAMPAIGN`, `ADSET` or `AD`; sent to the provider in lowercase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InsightLevel {
    Campaign,
    #[serde(rename = "ADSET")]
    AdSet,
    Ad,
}

impl InsightLevel {
    /// All levels in the order the sync engine pulls them.
    pub const ALL: [InsightLevel; 3] = [
        InsightLevel::Campaign,
        InsightLevel::AdSet,
        InsightLevel::Ad,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InsightLevel::Campaign => "CAMPAIGN",
            InsightLevel::AdSet => "ADSET",
            InsightLevel::Ad => "AD",
        }
    }

    /// Value of the provider's `level` query parameter.
    pub fn as_provider_param(&self) -> &'static str {
        match self {
            InsightLevel::Campaign => "campaign",
            InsightLevel::AdSet => "adset",
            InsightLevel::Ad => "ad",
        }
    }
}

impl fmt::Display for InsightLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InsightLevel {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_uppercase().as_str() {
            "CAMPAIGN" => Ok(InsightLevel::Campaign),
            "ADSET" => Ok(InsightLevel::AdSet),
            "AD" => Ok(InsightLevel::Ad),
            other => Err(format!("unknown insight level '{other}'")),
        }
    }
}

/// Lifecycle of a sync job row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncJobStatus {
    Pending,
    Running,
    Success,
    Failed,
}

impl SyncJobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncJobStatus::Pending => "PENDING",
            SyncJobStatus::Running => "RUNNING",
            SyncJobStatus::Success => "SUCCESS",
            SyncJobStatus::Failed => "FAILED",
        }
    }

    /// Terminal statuses never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncJobStatus::Success | SyncJobStatus::Failed)
    }
}

impl fmt::Display for SyncJobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncJobStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "PENDING" => Ok(SyncJobStatus::Pending),
            "RUNNING" => Ok(SyncJobStatus::Running),
            "SUCCESS" => Ok(SyncJobStatus::Success),
            "FAILED" => Ok(SyncJobStatus::Failed),
            other => Err(format!("unknown sync job status '{other}'")),
        }
    }
}
