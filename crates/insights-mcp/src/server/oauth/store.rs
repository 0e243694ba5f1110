//! Transaction store: short-lived OAuth flow state with TTL expiry.
//!
//! The orchestrator only ever touches the [`TransactionStore`] trait, so a
//! Redis or SQL implementation can replace [`MemoryStore`] without touching
//! flow logic. The contract that matters for correctness: `take_transaction`
//! and `consume_code` are atomic takes — under N concurrent callers exactly
//! one receives the record. Expired records are indistinguishable from
//! absent ones at every lookup.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;

use super::types::{ProxyAuthCode, TokenRecord, Transaction};

/// Pluggable storage for flow state.
#[async_trait::async_trait]
pub trait TransactionStore: Send + Sync {
    /// Store a new transaction.
    async fn insert_transaction(&self, txn: Transaction);

    /// Atomically claim the transaction bound to an upstream state value.
    ///
    /// Removes the state binding so a replayed callback finds nothing.
    /// Expired transactions are purged and reported as absent.
    async fn take_transaction(&self, upstream_state: &str) -> Option<Transaction>;

    /// Replace a transaction (state transitions).
    async fn update_transaction(&self, txn: Transaction);

    /// Drop a transaction by primary key.
    async fn remove_transaction(&self, transaction_id: &str);

    /// Store a freshly minted proxy authorization code.
    async fn insert_code(&self, code: ProxyAuthCode);

    /// Atomically consume a proxy code. At most one caller ever receives a
    /// given code; expired codes are purged and reported as absent.
    async fn consume_code(&self, code: &str) -> Option<ProxyAuthCode>;

    /// Record an issued token bundle (hashed refresh token).
    async fn insert_token_record(&self, record: TokenRecord);

    /// Atomically remove and return the record for a refresh-token hash.
    async fn take_token_record(&self, refresh_token_hash: &str) -> Option<TokenRecord>;

    /// Drop every expired record. Returns the number removed.
    async fn purge_expired(&self) -> usize;
}

/// In-memory store.
///
/// Atomicity comes from holding the write lock across each take; a shared
/// store implementation gets the same guarantee from compare-and-delete
/// primitives (`GETDEL`, `DELETE … RETURNING`).
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

#[derive(Default)]
struct Inner {
    /// Transactions by primary key.
    txns: HashMap<String, Transaction>,
    /// upstream_state -> transaction_id.
    state_index: HashMap<String, String>,
    codes: HashMap<String, ProxyAuthCode>,
    token_records: HashMap<String, TokenRecord>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl TransactionStore for MemoryStore {
    async fn insert_transaction(&self, txn: Transaction) {
        let mut inner = self.inner.write().await;
        inner.state_index.insert(txn.upstream_state.clone(), txn.transaction_id.clone());
        inner.txns.insert(txn.transaction_id.clone(), txn);
    }

    async fn take_transaction(&self, upstream_state: &str) -> Option<Transaction> {
        let mut inner = self.inner.write().await;
        let txn_id = inner.state_index.remove(upstream_state)?;
        let txn = inner.txns.get(&txn_id)?;
        if txn.is_expired() {
            inner.txns.remove(&txn_id);
            return None;
        }
        Some(txn.clone())
    }

    async fn update_transaction(&self, txn: Transaction) {
        self.inner.write().await.txns.insert(txn.transaction_id.clone(), txn);
    }

    async fn remove_transaction(&self, transaction_id: &str) {
        let mut inner = self.inner.write().await;
        if let Some(txn) = inner.txns.remove(transaction_id) {
            inner.state_index.remove(&txn.upstream_state);
        }
    }

    async fn insert_code(&self, code: ProxyAuthCode) {
        self.inner.write().await.codes.insert(code.code.clone(), code);
    }

    async fn consume_code(&self, code: &str) -> Option<ProxyAuthCode> {
        let taken = self.inner.write().await.codes.remove(code)?;
        if taken.is_expired() {
            return None;
        }
        Some(taken)
    }

    async fn insert_token_record(&self, record: TokenRecord) {
        self.inner.write().await.token_records.insert(record.refresh_token_hash.clone(), record);
    }

    async fn take_token_record(&self, refresh_token_hash: &str) -> Option<TokenRecord> {
        self.inner.write().await.token_records.remove(refresh_token_hash)
    }

    async fn purge_expired(&self) -> usize {
        let mut inner = self.inner.write().await;
        let before = inner.txns.len() + inner.codes.len();

        inner.txns.retain(|_, txn| !txn.is_expired());
        inner.codes.retain(|_, code| !code.is_expired());

        let live_ids: std::collections::HashSet<&String> = inner.txns.keys().collect();
        let dead_states: Vec<String> = inner
            .state_index
            .iter()
            .filter(|(_, id)| !live_ids.contains(id))
            .map(|(state, _)| state.clone())
            .collect();
        for state in dead_states {
            inner.state_index.remove(&state);
        }

        before - (inner.txns.len() + inner.codes.len())
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore").finish()
    }
}

/// Spawn the background sweep evicting expired records.
pub fn start_sweep_task(store: Arc<dyn TransactionStore>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let purged = store.purge_expired().await;
            if purged > 0 {
                tracing::debug!(count = purged, "Purged expired OAuth flow records");
            }
        }
    });
}
