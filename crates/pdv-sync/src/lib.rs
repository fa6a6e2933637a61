//! # pdv-sync: Remote API Sync for the PDV Terminal
//!
//! The terminal sells offline against its SQLite cache. This crate carries
//! those changes to the central API and brings the catalog back.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Sync Architecture                               │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                 SyncWorker (background task)                     │  │
//! │  │  interval tick / trigger ──► SyncPass::run_once ──► SyncReport   │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │         ┌─────────────────────┼─────────────────────┐                  │
//! │         ▼                     ▼                     ▼                   │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │ pdv-db         │  │ wire           │  │ RemoteClient           │    │
//! │  │                │  │                │  │                        │    │
//! │  │ list_unsynced  │  │ rows ⇄ JSON    │  │ HttpRemoteClient       │    │
//! │  │ mark_synced    │  │ cents ⇄ 10.99  │  │ (reqwest), retried     │    │
//! │  │ upsert_remote  │  │ local ⇄ remote │  │ with backoff           │    │
//! │  └────────────────┘  └────────────────┘  └────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`config`] - The `api` config domain
//! - [`error`] - `ApiError` per call, `SyncError` per pass
//! - [`http`] - reqwest implementation of [`RemoteClient`]
//! - [`pass`] - One push-then-pull exchange
//! - [`remote`] - The [`RemoteClient`] boundary
//! - [`retry`] - Backoff and timing wrappers
//! - [`wire`] - JSON payloads and record parsing
//! - [`worker`] - Interval / on-demand background runner
//!
//! ## Usage
//!
//! ```rust,ignore
//! use pdv_sync::{ApiSettings, HttpRemoteClient, SyncPass, SyncWorker};
//! use std::sync::Arc;
//!
//! let settings = ApiSettings::from_resolver(&config);
//! let remote = Arc::new(HttpRemoteClient::new(&settings)?);
//! let pass = SyncPass::new(database, remote, settings.clone());
//!
//! let (worker, handle) = SyncWorker::new(pass, settings.sync.interval());
//! tokio::spawn(worker.run());
//! handle.trigger()?;
//! ```

pub mod config;
pub mod error;
pub mod http;
pub mod pass;
pub mod remote;
pub mod retry;
pub mod wire;
pub mod worker;

pub use config::{ApiSettings, Endpoints, SyncSchedule};
pub use error::{ApiError, ApiResult, SyncError, SyncResult};
pub use http::HttpRemoteClient;
pub use pass::{PullStats, PushStats, SyncPass, SyncReport};
pub use remote::RemoteClient;
pub use retry::RetryPolicy;
pub use worker::{SyncWorker, SyncWorkerHandle};
