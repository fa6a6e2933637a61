//! # Sync Pass
//!
//! One full exchange with the remote API: push every dirty row, then pull
//! the catalog.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          SyncPass::run_once                             │
//! │                                                                         │
//! │  PUSH (in dependency order)                                             │
//! │    customers ──► products ──► cashier_sessions ──► sales                │
//! │                                                                         │
//! │    per dirty row, at the version that was read:                         │
//! │      no remote_id ──► POST endpoint        ──► remote_id from response  │
//! │      remote_id    ──► PUT  endpoint/{id}                                │
//! │        ✓ mark_synced(version)   row edited meanwhile → stays dirty      │
//! │        ✗ mark_failed(error)     row stays dirty, retried next pass      │
//! │                                                                         │
//! │    a sale waits (deferred) until its customer and session have          │
//! │    remote ids                                                           │
//! │                                                                         │
//! │  PULL (when sync.pull)                                                  │
//! │    GET products, GET customers ──► upsert_remote                        │
//! │      inserted | updated | kept_local (pending local edit wins)          │
//! │      rejected: the local store refused it (e.g. sku clash), skipped     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Remote failures are never fatal to the pass: they are counted in the
//! [`SyncReport`]. Only a local store failure while pushing aborts it.

use chrono::{DateTime, Utc};
use pdv_core::{LocalId, Sale, SyncState};
use pdv_db::{Database, SyncTable, UpsertOutcome};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::ApiSettings;
use crate::error::{ApiError, ApiResult, SyncResult};
use crate::remote::RemoteClient;
use crate::retry::{retry, timed, RetryPolicy};
use crate::wire::{self, SaleRefs};

// =============================================================================
// Report
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PushStats {
    pub pushed: u32,
    /// Acknowledged, but the row was edited while in flight.
    pub stale: u32,
    pub failed: u32,
    /// Sales held back until their references sync.
    pub deferred: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PullStats {
    pub inserted: u32,
    pub updated: u32,
    pub kept_local: u32,
    /// Records the API sent that could not be read.
    pub invalid: u32,
    /// Readable records the local store refused, e.g. a sku clash.
    pub rejected: u32,
}

impl PullStats {
    fn record(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Inserted => self.inserted += 1,
            UpsertOutcome::Updated => self.updated += 1,
            UpsertOutcome::KeptLocal => self.kept_local += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub customers: PushStats,
    pub products: PushStats,
    pub cashier_sessions: PushStats,
    pub sales: PushStats,
    pub pulled_products: PullStats,
    pub pulled_customers: PullStats,
    /// Pull failures and refused records, one line each.
    pub errors: Vec<String>,
}

impl SyncReport {
    fn start() -> Self {
        SyncReport {
            started_at: Utc::now(),
            finished_at: None,
            customers: PushStats::default(),
            products: PushStats::default(),
            cashier_sessions: PushStats::default(),
            sales: PushStats::default(),
            pulled_products: PullStats::default(),
            pulled_customers: PullStats::default(),
            errors: Vec::new(),
        }
    }

    fn push_stats(&self) -> [&PushStats; 4] {
        [&self.customers, &self.products, &self.cashier_sessions, &self.sales]
    }

    pub fn total_pushed(&self) -> u32 {
        self.push_stats().iter().map(|s| s.pushed).sum()
    }

    pub fn total_failed(&self) -> u32 {
        self.push_stats().iter().map(|s| s.failed).sum()
    }

    /// Nothing failed and no pull errors.
    pub fn is_clean(&self) -> bool {
        self.total_failed() == 0 && self.errors.is_empty()
    }
}

// =============================================================================
// Pass
// =============================================================================

/// Pushes local changes and pulls the remote catalog.
#[derive(Clone)]
pub struct SyncPass {
    db: Database,
    remote: Arc<dyn RemoteClient>,
    settings: ApiSettings,
    policy: RetryPolicy,
}

impl SyncPass {
    pub fn new(db: Database, remote: Arc<dyn RemoteClient>, settings: ApiSettings) -> Self {
        let policy = settings.retry_policy();
        SyncPass {
            db,
            remote,
            settings,
            policy,
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn settings(&self) -> &ApiSettings {
        &self.settings
    }

    pub async fn run_once(&self) -> SyncResult<SyncReport> {
        let mut report = SyncReport::start();
        info!("Sync pass starting");

        report.customers = timed("push customers", self.push_customers()).await?;
        report.products = timed("push products", self.push_products()).await?;
        report.cashier_sessions = timed("push sessions", self.push_sessions()).await?;
        report.sales = timed("push sales", self.push_sales()).await?;

        if self.settings.sync.pull {
            report.pulled_products =
                timed("pull products", self.pull_products(&mut report.errors)).await;
            report.pulled_customers =
                timed("pull customers", self.pull_customers(&mut report.errors)).await;
        }

        report.finished_at = Some(Utc::now());
        info!(
            pushed = report.total_pushed(),
            failed = report.total_failed(),
            deferred = report.sales.deferred,
            pull_errors = report.errors.len(),
            "Sync pass finished"
        );
        Ok(report)
    }

    // =========================================================================
    // Push
    // =========================================================================

    async fn push_customers(&self) -> SyncResult<PushStats> {
        let mut stats = PushStats::default();
        let endpoint = &self.settings.endpoints.customers;
        for customer in self.db.customers().list_unsynced(self.batch_size()).await? {
            let payload = wire::customer_payload(&customer);
            let (id, sync) = (customer.id, &customer.sync);
            self.push_row(SyncTable::Customers, id, sync, endpoint, payload, &mut stats)
                .await?;
        }
        Ok(stats)
    }

    async fn push_products(&self) -> SyncResult<PushStats> {
        let mut stats = PushStats::default();
        let endpoint = &self.settings.endpoints.products;
        for product in self.db.products().list_unsynced(self.batch_size()).await? {
            let payload = wire::product_payload(&product);
            let (id, sync) = (product.id, &product.sync);
            self.push_row(SyncTable::Products, id, sync, endpoint, payload, &mut stats)
                .await?;
        }
        Ok(stats)
    }

    async fn push_sessions(&self) -> SyncResult<PushStats> {
        let mut stats = PushStats::default();
        let endpoint = &self.settings.endpoints.cashier_sessions;
        for session in self.db.sessions().list_unsynced(self.batch_size()).await? {
            let payload = wire::session_payload(&session);
            let (id, sync) = (session.id, &session.sync);
            self.push_row(SyncTable::CashierSessions, id, sync, endpoint, payload, &mut stats)
                .await?;
        }
        Ok(stats)
    }

    async fn push_sales(&self) -> SyncResult<PushStats> {
        let mut stats = PushStats::default();
        let endpoint = &self.settings.endpoints.sales;
        for sale in self.db.sales().list_unsynced(self.batch_size()).await? {
            let Some(refs) = self.sale_refs(&sale).await? else {
                debug!(sale = %sale.sale_number, "Sale waits for its customer or session to sync");
                stats.deferred += 1;
                continue;
            };
            let payload = wire::sale_payload(&sale, &refs);
            let (id, sync) = (sale.id, &sale.sync);
            self.push_row(SyncTable::Sales, id, sync, endpoint, payload, &mut stats)
                .await?;
        }
        Ok(stats)
    }

    /// Remote ids for a sale's references, or `None` while the customer or
    /// session it points at has not reached the API yet. Unsynced products
    /// go out as `null` with their sku.
    async fn sale_refs(&self, sale: &Sale) -> SyncResult<Option<SaleRefs>> {
        let sync_state = self.db.sync_state();
        let mut refs = SaleRefs::default();

        if let Some(customer_id) = sale.customer_id {
            match sync_state.remote_id(SyncTable::Customers, customer_id).await? {
                Some(remote) => refs.customer = Some(remote),
                None => return Ok(None),
            }
        }
        if let Some(session_id) = sale.cashier_session_id {
            match sync_state.remote_id(SyncTable::CashierSessions, session_id).await? {
                Some(remote) => refs.session = Some(remote),
                None => return Ok(None),
            }
        }

        let mut products: HashMap<LocalId, i64> = HashMap::new();
        for item in &sale.items {
            if products.contains_key(&item.product_id) {
                continue;
            }
            let remote = sync_state
                .remote_id(SyncTable::Products, item.product_id)
                .await?;
            if let Some(remote) = remote {
                products.insert(item.product_id, remote);
            }
        }
        refs.products = products;
        Ok(Some(refs))
    }

    async fn push_row(
        &self,
        table: SyncTable,
        id: LocalId,
        sync: &SyncState,
        endpoint: &str,
        payload: Value,
        stats: &mut PushStats,
    ) -> SyncResult<()> {
        let sync_state = self.db.sync_state();

        match self.send(endpoint, sync.remote_id, &payload).await {
            Ok(assigned) => {
                let acked = sync_state
                    .mark_synced(table, id, sync.sync_version, assigned)
                    .await?;
                if acked {
                    debug!(table = %table, id, remote_id = ?assigned, "Pushed");
                    stats.pushed += 1;
                } else {
                    debug!(table = %table, id, "Row changed during push; stays dirty");
                    stats.stale += 1;
                }
            }
            Err(e) => {
                warn!(table = %table, id, error = %e, "Push failed");
                sync_state.mark_failed(table, id, &e.to_string()).await?;
                stats.failed += 1;
            }
        }
        Ok(())
    }

    /// POSTs a new row or PUTs a known one; yields the row's remote id.
    async fn send(
        &self,
        endpoint: &str,
        remote_id: Option<i64>,
        payload: &Value,
    ) -> ApiResult<Option<i64>> {
        let remote = &self.remote;
        match remote_id {
            Some(existing) => {
                let target = format!("{}/{existing}", endpoint.trim_end_matches('/'));
                let target = target.as_str();
                retry(&self.policy, "PUT", move || remote.put(target, payload)).await?;
                Ok(Some(existing))
            }
            None => {
                let body =
                    retry(&self.policy, "POST", move || remote.post(endpoint, payload)).await?;
                // without an id the next pass would create a duplicate
                wire::remote_id_from(&body).map(Some).ok_or_else(|| {
                    ApiError::InvalidResponse(format!("{endpoint}: response has no id"))
                })
            }
        }
    }

    // =========================================================================
    // Pull
    // =========================================================================

    async fn fetch(&self, endpoint: &str) -> ApiResult<Vec<Value>> {
        let remote = &self.remote;
        let body = retry(&self.policy, "GET", move || remote.get(endpoint)).await?;
        wire::records_from(body)
    }

    /// Pulls the product catalog. Failures land in `errors`; a record the
    /// local store refuses is skipped so the rest still arrive.
    async fn pull_products(&self, errors: &mut Vec<String>) -> PullStats {
        let mut stats = PullStats::default();
        let records = match self.fetch(&self.settings.endpoints.products).await {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "Product pull failed");
                errors.push(format!("pull products: {e}"));
                return stats;
            }
        };

        let products = self.db.products();
        for record in &records {
            let (remote_id, data) = match wire::product_from_remote(record) {
                Ok(parsed) => parsed,
                Err(e) => {
                    debug!(error = %e, "Skipping unreadable product");
                    stats.invalid += 1;
                    continue;
                }
            };
            match products.upsert_remote(remote_id, data).await {
                Ok(outcome) => stats.record(outcome),
                Err(e) => {
                    warn!(remote_id, error = %e, "Remote product refused by local store");
                    stats.rejected += 1;
                    errors.push(format!("pull products: remote {remote_id}: {e}"));
                }
            }
        }
        stats
    }

    async fn pull_customers(&self, errors: &mut Vec<String>) -> PullStats {
        let mut stats = PullStats::default();
        let records = match self.fetch(&self.settings.endpoints.customers).await {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "Customer pull failed");
                errors.push(format!("pull customers: {e}"));
                return stats;
            }
        };

        let customers = self.db.customers();
        for record in &records {
            let (remote_id, data) = match wire::customer_from_remote(record) {
                Ok(parsed) => parsed,
                Err(e) => {
                    debug!(error = %e, "Skipping unreadable customer");
                    stats.invalid += 1;
                    continue;
                }
            };
            match customers.upsert_remote(remote_id, data).await {
                Ok(outcome) => stats.record(outcome),
                Err(e) => {
                    warn!(remote_id, error = %e, "Remote customer refused by local store");
                    stats.rejected += 1;
                    errors.push(format!("pull customers: remote {remote_id}: {e}"));
                }
            }
        }
        stats
    }

    fn batch_size(&self) -> u32 {
        self.settings.sync.batch_size.max(1)
    }
}
