//! git-backup core library: domain types, tracking store, drift, resolution.
//!
//! - [`types`]: repository names and remote targets
//! - [`error`]: [`CoreError`]
//! - [`config`]: repos-root [`Layout`] and `config.yaml`
//! - [`store`]: load / save / init of the tracking store
//! - [`scan`]: directories present under the repos root
//! - [`drift`]: tracked vs. local set differences
//! - [`resolve`]: canonical remote list for a repository

pub mod config;
pub mod drift;
pub mod error;
pub mod resolve;
pub mod scan;
pub mod store;
pub mod types;

pub use config::{BackupConfig, Layout, Visibility};
pub use drift::{compute_drift, DriftReport};
pub use error::CoreError;
pub use resolve::{resolve, ResolveOptions};
pub use store::TrackingStore;
pub use types::{RemoteTarget, RepoName, TrackedRepository, HOSTED_ALIAS, HOSTED_DOMAIN};
