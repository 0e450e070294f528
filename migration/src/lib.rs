//! Database migrations for the ads sync store.
//!
//! This module contains all database migrations using SeaORM Migration.

pub use sea_orm_migration::prelude::*;

mod m2025_01_10_000001_create_ad_credentials;
mod m2025_01_10_000002_create_oauth_sessions;
mod m2025_01_10_000003_create_ad_hierarchy;
mod m2025_01_10_000004_create_ad_insights;
mod m2025_01_10_000005_create_sync_jobs;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2025_01_10_000001_create_ad_credentials::Migration),
            Box::new(m2025_01_10_000002_create_oauth_sessions::Migration),
            Box::new(m2025_01_10_000003_create_ad_hierarchy::Migration),
            Box::new(m2025_01_10_000004_create_ad_insights::Migration),
            Box::new(m2025_01_10_000005_create_sync_jobs::Migration),
        ]
    }
}
