//! Decision cache: SIEVE eviction with a TTL and per-fingerprint
//! single-flight.
//!
//! # Eviction
//!
//! - On hit: set the entry's `visited` bit.
//! - On insert when full: scan from the `hand`, clearing `visited` bits,
//!   and evict the first unvisited (or expired) entry.
//!
//! # Concurrency
//!
//! Concurrent misses for the same fingerprint serialize on a per-fingerprint
//! gate, so only the first computes and the rest observe its cached result.
//! Different fingerprints never wait on each other. A poisoned cache lock is
//! logged and the request is computed directly.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dive_types::{AccessRequest, AuthorizationDecision, DecisionError};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

// ============================================================================
// Fingerprint
// ============================================================================

/// Stable fingerprint of the decision-relevant parts of a request.
///
/// Covers subject identity and attributes, the resource label and the
/// action. The request id, source IP and timestamp are excluded.
pub fn fingerprint(request: &AccessRequest) -> String {
    fn sorted(values: &[String]) -> Vec<&str> {
        let mut out: Vec<&str> = values.iter().map(String::as_str).collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    let subject = &request.subject;
    let resource = &request.resource;
    let canonical = serde_json::json!({
        "subject": {
            "uniqueID": subject.unique_id,
            "clearance": subject.clearance,
            "clearanceOriginal": subject.clearance_original,
            "country": subject.country_of_affiliation,
            "acpCOI": sorted(&subject.acp_coi),
            "originInstance": subject.origin_instance,
            "authenticated": subject.authenticated,
        },
        "resource": {
            "resourceId": resource.resource_id,
            "instanceId": resource.instance_id,
            "classification": resource.classification.as_str(),
            "releasabilityTo": sorted(&resource.releasability_to),
            "COI": sorted(&resource.coi),
            "creationDate": resource.creation_date.map(|d| d.timestamp()),
            "encrypted": resource.encrypted,
        },
        "action": request.action.as_str(),
    });

    format!("{:x}", Sha256::digest(canonical.to_string().as_bytes()))
}

// ============================================================================
// SIEVE store
// ============================================================================

#[derive(Debug)]
struct Entry {
    key: String,
    decision: AuthorizationDecision,
    expires_at: Instant,
    visited: bool,
}

#[derive(Debug)]
struct Sieve {
    slots: Vec<Option<Entry>>,
    index: HashMap<String, usize>,
    hand: usize,
    len: usize,
}

impl Sieve {
    fn new(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            index: HashMap::with_capacity(capacity),
            hand: 0,
            len: 0,
        }
    }

    fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn get(&mut self, key: &str, now: Instant) -> Option<AuthorizationDecision> {
        let &idx = self.index.get(key)?;
        let expired = self.slots[idx].as_ref().is_none_or(|e| e.expires_at <= now);
        if expired {
            self.remove_at(idx);
            return None;
        }
        let entry = self.slots[idx].as_mut()?;
        entry.visited = true;
        Some(entry.decision.clone())
    }

    fn insert(&mut self, key: String, decision: AuthorizationDecision, expires_at: Instant) {
        if let Some(&idx) = self.index.get(&key) {
            if let Some(entry) = self.slots[idx].as_mut() {
                entry.decision = decision;
                entry.expires_at = expires_at;
                entry.visited = true;
                return;
            }
        }

        let idx = if self.len < self.capacity() {
            self.slots.iter().position(Option::is_none)
        } else {
            None
        };
        let idx = match idx {
            Some(idx) => idx,
            None => {
                let target = self.find_eviction_target();
                self.remove_at(target);
                target
            }
        };

        self.slots[idx] = Some(Entry {
            key: key.clone(),
            decision,
            expires_at,
            visited: false,
        });
        self.index.insert(key, idx);
        self.len += 1;
    }

    fn remove_at(&mut self, idx: usize) {
        if let Some(entry) = self.slots[idx].take() {
            self.index.remove(&entry.key);
            self.len -= 1;
        }
    }

    /// At most two passes: the first clears visited bits, the second finds
    /// a target.
    fn find_eviction_target(&mut self) -> usize {
        let capacity = self.capacity();
        let now = Instant::now();

        for _ in 0..capacity * 2 {
            let current = self.hand;
            self.hand = (self.hand + 1) % capacity;
            match self.slots[current].as_mut() {
                Some(entry) if entry.visited && entry.expires_at > now => entry.visited = false,
                _ => return current,
            }
        }

        let target = self.hand;
        self.hand = (self.hand + 1) % capacity;
        target
    }

    fn clear(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
        self.index.clear();
        self.hand = 0;
        self.len = 0;
    }
}

// ============================================================================
// Decision cache
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
    pub capacity: usize,
    pub ttl_secs: u64,
    /// `hits / (hits + misses)`, 0 when nothing was looked up.
    pub hit_rate: f64,
}

#[derive(Debug)]
struct Inner {
    store: Sieve,
    hits: u64,
    misses: u64,
}

/// Outcome of [`DecisionCache::get_or_compute`].
#[derive(Debug)]
pub struct Cached {
    pub decision: AuthorizationDecision,
    pub cache_hit: bool,
}

/// Releases a single-flight gate when the computing future finishes or is
/// dropped.
struct GateRelease<'a> {
    cache: &'a DecisionCache,
    key: &'a str,
    gate: Arc<tokio::sync::Mutex<()>>,
}

impl Drop for GateRelease<'_> {
    fn drop(&mut self) {
        self.cache.release_gate(self.key, &self.gate);
    }
}

#[derive(Debug)]
pub struct DecisionCache {
    inner: Mutex<Inner>,
    gates: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    ttl: Duration,
}

impl DecisionCache {
    /// A zero `capacity` is raised to 1.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                store: Sieve::new(capacity.max(1)),
                hits: 0,
                misses: 0,
            }),
            gates: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn unavailable(context: &str) -> DecisionError {
        DecisionError::CacheUnavailable(format!("decision cache lock poisoned during {context}"))
    }

    /// Looks up a live entry and counts the hit or miss.
    pub fn get(&self, key: &str) -> Option<AuthorizationDecision> {
        let mut inner = match self.inner.lock() {
            Ok(inner) => inner,
            Err(_) => {
                warn!(error = %Self::unavailable("get"), "computing without cache");
                return None;
            }
        };
        let found = inner.store.get(key, Instant::now());
        if found.is_some() {
            inner.hits += 1;
        } else {
            inner.misses += 1;
        }
        found
    }

    /// Looks up without touching the statistics.
    fn peek(&self, key: &str) -> Option<AuthorizationDecision> {
        self.inner.lock().ok()?.store.get(key, Instant::now())
    }

    pub fn insert(&self, key: &str, decision: AuthorizationDecision) {
        match self.inner.lock() {
            Ok(mut inner) => {
                let expires_at = Instant::now() + self.ttl;
                inner.store.insert(key.to_string(), decision, expires_at);
            }
            Err(_) => warn!(error = %Self::unavailable("insert"), "decision not cached"),
        }
    }

    /// Returns the cached decision for `key` or runs `compute` once.
    ///
    /// Errors from `compute` are returned and never cached.
    pub async fn get_or_compute<F, Fut>(&self, key: &str, compute: F) -> Result<Cached, DecisionError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<AuthorizationDecision, DecisionError>>,
    {
        if let Some(decision) = self.get(key) {
            debug!(fingerprint = %key, "decision cache hit");
            return Ok(Cached {
                decision,
                cache_hit: true,
            });
        }

        let gate = self.gate(key);
        let _release = gate.as_ref().map(|gate| GateRelease {
            cache: self,
            key,
            gate: Arc::clone(gate),
        });
        let _permit = match &gate {
            Some(gate) => Some(gate.lock().await),
            None => None,
        };

        // Another caller may have filled the entry while we waited.
        if gate.is_some() {
            if let Some(decision) = self.peek(key) {
                debug!(fingerprint = %key, "decision computed by concurrent request");
                return Ok(Cached {
                    decision,
                    cache_hit: true,
                });
            }
        }

        let result = compute().await;
        if let Ok(decision) = &result {
            self.insert(key, decision.clone());
        }

        result.map(|decision| Cached {
            decision,
            cache_hit: false,
        })
    }

    fn gate(&self, key: &str) -> Option<Arc<tokio::sync::Mutex<()>>> {
        match self.gates.lock() {
            Ok(mut gates) => Some(Arc::clone(gates.entry(key.to_string()).or_default())),
            Err(_) => {
                warn!(error = %Self::unavailable("single-flight"), "computing without single-flight");
                None
            }
        }
    }

    /// Removes `key`'s gate unless a newer one has replaced it.
    fn release_gate(&self, key: &str, gate: &Arc<tokio::sync::Mutex<()>>) {
        if let Ok(mut gates) = self.gates.lock() {
            if gates.get(key).is_some_and(|current| Arc::ptr_eq(current, gate)) {
                gates.remove(key);
            }
        }
    }

    pub fn stats(&self) -> CacheStats {
        let ttl_secs = self.ttl.as_secs();
        match self.inner.lock() {
            Ok(inner) => {
                let lookups = inner.hits + inner.misses;
                CacheStats {
                    hits: inner.hits,
                    misses: inner.misses,
                    size: inner.store.len,
                    capacity: inner.store.capacity(),
                    ttl_secs,
                    hit_rate: if lookups == 0 {
                        0.0
                    } else {
                        inner.hits as f64 / lookups as f64
                    },
                }
            }
            Err(_) => CacheStats {
                hits: 0,
                misses: 0,
                size: 0,
                capacity: 0,
                ttl_secs,
                hit_rate: 0.0,
            },
        }
    }

    /// Drops every entry and resets the statistics.
    pub fn clear(&self) {
        match self.inner.lock() {
            Ok(mut inner) => {
                inner.store.clear();
                inner.hits = 0;
                inner.misses = 0;
            }
            Err(_) => warn!(error = %Self::unavailable("clear"), "cache not cleared"),
        }
    }
}
