use crate::rest::RestClient;
use crate::types::account::{AccountSummary, fallback_display_name};
use dashmap::DashMap;
use log::{debug, warn};
use std::collections::HashMap;
use tokio::sync::{Mutex, broadcast};

/// Session-lifetime identity cache: account id to the richest known summary.
///
/// Every write is a monotonic merge (fields are enriched, never regressed),
/// so concurrent writers from the snapshot loader, the reducer, and fetch
/// completions cannot corrupt an entry regardless of ordering. There is no
/// eviction; unbounded growth is accepted at admin-session scale.
#[derive(Default)]
pub struct IdentityCache {
    entries: DashMap<String, AccountSummary>,
    /// One sender per account id with a fetch in flight. Late callers
    /// subscribe instead of issuing a duplicate request.
    inflight: Mutex<HashMap<String, broadcast::Sender<Option<AccountSummary>>>>,
}

impl IdentityCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Synchronous cache read.
    pub fn resolve(&self, id: &str) -> Option<AccountSummary> {
        self.entries.get(id).map(|entry| entry.clone())
    }

    /// Merge a summary into the cache, enriching any existing entry.
    pub fn merge(&self, summary: AccountSummary) {
        let mut entry = self
            .entries
            .entry(summary.id.clone())
            .or_insert_with(|| AccountSummary::bare(summary.id.clone()));
        entry.enrich_from(&summary);
    }

    /// Display name for an id, falling back to the id-derived placeholder
    /// when nothing is cached. Never blocks.
    pub fn display_name(&self, id: &str) -> String {
        self.resolve(id)
            .map(|summary| summary.display_name())
            .unwrap_or_else(|| fallback_display_name(id))
    }

    /// Network fallback with single-flight de-duplication: concurrent calls
    /// for the same id share one request. A failed fetch resolves to whatever
    /// the cache already holds (possibly nothing) and is retried on the next
    /// call.
    pub async fn fetch_and_cache(
        &self,
        id: &str,
        rest: &dyn RestClient,
    ) -> Option<AccountSummary> {
        if let Some(hit) = self.resolve(id)
            && hit.has_identity()
        {
            return Some(hit);
        }

        let subscription = {
            let mut inflight = self.inflight.lock().await;
            match inflight.get(id) {
                Some(tx) => Some(tx.subscribe()),
                None => {
                    let (tx, _) = broadcast::channel(1);
                    inflight.insert(id.to_string(), tx);
                    None
                }
            }
        };

        if let Some(mut rx) = subscription {
            debug!("identity fetch for {id} already in flight, waiting");
            return match rx.recv().await {
                Ok(result) => result,
                // Sender dropped without publishing; fall back to the cache.
                Err(_) => self.resolve(id),
            };
        }

        match rest.fetch_account(id).await {
            Ok(Some(summary)) => self.merge(summary),
            Ok(None) => debug!("account {id} not found"),
            Err(e) => warn!("identity fetch for {id} failed: {e}"),
        }

        let result = self.resolve(id);
        if let Some(tx) = self.inflight.lock().await.remove(id) {
            let _ = tx.send(result.clone());
        }
        result
    }
}
