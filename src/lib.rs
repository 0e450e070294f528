//! # Ads Sync Library
//!
//! Credential lifecycle and incremental synchronization for a user's
//! Facebook ad accounts: the PKCE authorization flow, credential validation,
//! a paginated Graph API client, and a sync engine that idempotently mirrors
//! accounts, campaigns, ad sets, ads and daily insights into a relational
//! store while recording every run as a sync job.

pub mod config;
pub mod crypto;
pub mod db;
pub mod error;
pub mod facebook;
pub mod job_tracker;
pub mod models;
pub mod oauth;
pub mod repositories;
pub mod scheduler;
pub mod sync_engine;
pub mod sync_service;
pub mod telemetry;
pub mod validator;
pub use migration;

pub use error::{AdsError, InvalidReason, Result};
