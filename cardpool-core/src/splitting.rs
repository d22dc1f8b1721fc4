//! Splitting policy: turns a clearing into per-member shares, with a bounded
//! TTL+LRU cache over the wallet's configured policy so the hot clearing path
//! does not hit the store for every event.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use cardpool_common::model::{AmountMinor, CaptureSplit, SplitPolicy, UserId, Wallet, WalletId};
use cardpool_common::Result;
use cardpool_ledger::Ledger;

pub const POLICY_CACHE_TTL: Duration = Duration::from_secs(60);
pub const POLICY_CACHE_CAPACITY: usize = 1_000;

/// Computes the splits for a capture. `members` must be in wallet join order;
/// the equal-split remainder lands one minor unit at a time along that order
/// so the result is deterministic. The shares always sum to `amount` exactly;
/// zero shares (amount smaller than the member count) are dropped.
pub fn compute_splits(
    policy: SplitPolicy,
    cardholder: &str,
    members: &[UserId],
    amount: AmountMinor,
) -> Vec<CaptureSplit> {
    match policy {
        SplitPolicy::PayerOnly => vec![CaptureSplit {
            user_id: cardholder.to_string(),
            amount,
        }],
        SplitPolicy::EqualSplit => {
            if members.is_empty() {
                return vec![CaptureSplit {
                    user_id: cardholder.to_string(),
                    amount,
                }];
            }
            let n = members.len() as i64;
            let base = amount / n;
            let remainder = amount % n;
            members
                .iter()
                .enumerate()
                .map(|(idx, user_id)| CaptureSplit {
                    user_id: user_id.clone(),
                    amount: base + if (idx as i64) < remainder { 1 } else { 0 },
                })
                .filter(|split| split.amount > 0)
                .collect()
        }
    }
}

struct CacheEntry {
    policy: SplitPolicy,
    inserted_at: Instant,
    last_used: u64,
}

#[derive(Default)]
struct CacheInner {
    entries: HashMap<WalletId, CacheEntry>,
    clock: u64,
}

/// Bounded in-memory policy cache. TTL is the safety net; writes invalidate
/// explicitly. Eviction removes the least recently used entry.
pub struct PolicyCache {
    ttl: Duration,
    capacity: usize,
    inner: Mutex<CacheInner>,
}

impl PolicyCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity,
            inner: Mutex::new(CacheInner::default()),
        }
    }

    pub fn get(&self, wallet_id: &str) -> Option<SplitPolicy> {
        let mut inner = self.inner.lock().unwrap();
        inner.clock += 1;
        let clock = inner.clock;
        let expired = match inner.entries.get(wallet_id) {
            Some(entry) => entry.inserted_at.elapsed() >= self.ttl,
            None => return None,
        };
        if expired {
            inner.entries.remove(wallet_id);
            return None;
        }
        let entry = inner.entries.get_mut(wallet_id)?;
        entry.last_used = clock;
        Some(entry.policy)
    }

    pub fn put(&self, wallet_id: &str, policy: SplitPolicy) {
        let mut inner = self.inner.lock().unwrap();
        inner.clock += 1;
        let clock = inner.clock;
        if !inner.entries.contains_key(wallet_id) && inner.entries.len() >= self.capacity {
            if let Some(oldest) = inner
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_used)
                .map(|(k, _)| k.clone())
            {
                inner.entries.remove(&oldest);
            }
        }
        inner.entries.insert(
            wallet_id.to_string(),
            CacheEntry {
                policy,
                inserted_at: Instant::now(),
                last_used: clock,
            },
        );
    }

    pub fn invalidate(&self, wallet_id: &str) {
        self.inner.lock().unwrap().entries.remove(wallet_id);
    }
}

/// Policy reads and writes, cache in front of the store.
pub struct PolicyService {
    ledger: Arc<Ledger>,
    cache: PolicyCache,
}

impl PolicyService {
    pub fn new(ledger: Arc<Ledger>) -> Self {
        Self {
            ledger,
            cache: PolicyCache::new(POLICY_CACHE_TTL, POLICY_CACHE_CAPACITY),
        }
    }

    pub async fn policy_for(&self, wallet_id: &str) -> Result<SplitPolicy> {
        if let Some(policy) = self.cache.get(wallet_id) {
            return Ok(policy);
        }
        let policy = self.ledger.split_policy(wallet_id).await?;
        self.cache.put(wallet_id, policy);
        Ok(policy)
    }

    pub async fn set_policy(&self, wallet_id: &str, policy: SplitPolicy) -> Result<Wallet> {
        let wallet = self.ledger.set_split_policy(wallet_id, policy).await?;
        self.cache.invalidate(wallet_id);
        Ok(wallet)
    }
}
