//! # Repository Layer
//!
//! Repository implementations that encapsulate SeaORM operations for the
//! credential store, PKCE sessions, the mirrored ad hierarchy and sync jobs.
//! Every method takes the owning user or account explicitly.

pub mod ads;
pub mod credential;
pub mod oauth_session;
pub mod sync_job;

pub use ads::AdsRepository;
pub use credential::{CredentialRepository, NewCredential};
pub use oauth_session::OAuthSessionRepository;
pub use sync_job::SyncJobRepository;
