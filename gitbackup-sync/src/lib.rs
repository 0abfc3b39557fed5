//! # gitbackup-sync
//!
//! Remote reconciliation and the batch command engine.
//!
//! - [`tools`]: git / hosted CLI / ssh / shell collaborators
//! - [`reconcile`]: reset or add-missing on a working tree's remotes
//! - [`executor`]: bounded per-repository worker pool
//! - [`actions`]: what each command does to one repository
//! - [`engine`]: one entrypoint per command, store load and save
//!
//! Call [`Engine::load`] with a [`Layout`](gitbackup_core::Layout) and a
//! [`Toolkit`], then one of its command methods.

pub mod actions;
pub mod engine;
pub mod error;
pub mod executor;
pub mod outcome;
pub mod reconcile;
pub mod tools;

pub use engine::{Engine, HostedChoice, Listing};
pub use error::SyncError;
pub use executor::{CancelToken, Executor, RepoAction, RepoJob};
pub use outcome::{BatchReport, Outcome, RepoReport, Unit, UnitReport};
pub use reconcile::{add_missing, reset, ReconcileReport};
pub use tools::{ToolError, ToolOutput, Toolkit};
