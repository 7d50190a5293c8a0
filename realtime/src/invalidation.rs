//! Cache Invalidation Router.
//!
//! A static table maps event domains to the cache keys an event of that
//! domain makes stale. Every event is routed, whether or not any application
//! handler is registered for it.

use events::{panic_message, EventType, RealtimeEvent};
use log::*;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// The application's key-addressed read-through cache.
///
/// Calls are fire-and-forget: the router neither retries nor waits on them.
/// A call that panics is logged and skipped like a failing handler.
pub trait Cache: Send + Sync {
    fn invalidate(&self, key: &str);

    /// Every cached key starting with `prefix`.
    fn keys_with_prefix(&self, prefix: &str) -> Vec<String>;
}

/// A key to drop from the cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Exact(String),
    /// Expanded through [`Cache::keys_with_prefix`].
    Prefix(String),
}

pub struct InvalidationRule {
    pub domain: &'static str,
    pub invalidate: fn(&RealtimeEvent) -> Vec<CacheKey>,
}

/// Default routing table.
pub static RULES: &[InvalidationRule] = &[
    InvalidationRule {
        domain: "resource",
        invalidate: entity_keys,
    },
    InvalidationRule {
        domain: "workspace",
        invalidate: workspace_keys,
    },
    InvalidationRule {
        domain: "member",
        invalidate: member_keys,
    },
];

/// Key of the cached list of every entity in `domain`.
pub fn collection_key(domain: &str) -> String {
    domain.to_string()
}

/// Key of one cached entity.
pub fn entity_key(domain: &str, entity_id: &str) -> String {
    format!("{domain}:{entity_id}")
}

/// The collection key, plus the entity key when the event names an entity.
fn entity_keys(event: &RealtimeEvent) -> Vec<CacheKey> {
    let domain = event.domain();
    let mut keys = vec![CacheKey::Exact(collection_key(domain))];
    if let Some(entity_id) = &event.entity_id {
        keys.push(CacheKey::Exact(entity_key(domain, entity_id)));
    }
    keys
}

fn workspace_keys(event: &RealtimeEvent) -> Vec<CacheKey> {
    let mut keys = entity_keys(event);
    if event.event_type == EventType::WorkspaceDeleted {
        if let Some(entity_id) = &event.entity_id {
            // Everything cached under the workspace is gone with it.
            keys.push(CacheKey::Prefix(format!(
                "{}:",
                entity_key(event.domain(), entity_id)
            )));
        }
    }
    keys
}

fn member_keys(event: &RealtimeEvent) -> Vec<CacheKey> {
    let mut keys = entity_keys(event);
    if let Some(organization_id) = &event.organization_id {
        keys.push(CacheKey::Exact(format!(
            "organization:{organization_id}:members"
        )));
    }
    keys
}

/// Keys `event` invalidates under `rules`, in table order.
pub fn keys_for(rules: &[InvalidationRule], event: &RealtimeEvent) -> Vec<CacheKey> {
    let domain = event.domain();
    rules
        .iter()
        .filter(|rule| rule.domain == domain)
        .flat_map(|rule| (rule.invalidate)(event))
        .collect()
}

/// Applies a rule table to an external cache.
pub struct InvalidationRouter {
    cache: Arc<dyn Cache>,
    rules: &'static [InvalidationRule],
}

impl InvalidationRouter {
    pub fn new(cache: Arc<dyn Cache>) -> Self {
        Self::with_rules(cache, RULES)
    }

    pub fn with_rules(cache: Arc<dyn Cache>, rules: &'static [InvalidationRule]) -> Self {
        Self { cache, rules }
    }

    /// Invalidate every key `event` makes stale. Returns how many cache keys
    /// were invalidated.
    pub fn route(&self, event: &RealtimeEvent) -> usize {
        let mut invalidated = 0;
        for key in keys_for(self.rules, event) {
            match key {
                CacheKey::Exact(key) => {
                    debug!("Invalidating cache key {} for {}", key, event.event_type);
                    if self.call(event, |cache| cache.invalidate(&key)).is_some() {
                        invalidated += 1;
                    }
                }
                CacheKey::Prefix(prefix) => {
                    let keys = self
                        .call(event, |cache| cache.keys_with_prefix(&prefix))
                        .unwrap_or_default();
                    for key in keys {
                        debug!(
                            "Invalidating cache key {} (prefix {}) for {}",
                            key, prefix, event.event_type
                        );
                        if self.call(event, |cache| cache.invalidate(&key)).is_some() {
                            invalidated += 1;
                        }
                    }
                }
            }
        }
        invalidated
    }

    /// Run one cache call, containing a panic so it never reaches the
    /// connection task.
    fn call<T, F>(&self, event: &RealtimeEvent, f: F) -> Option<T>
    where
        F: FnOnce(&dyn Cache) -> T,
    {
        match catch_unwind(AssertUnwindSafe(|| f(self.cache.as_ref()))) {
            Ok(value) => Some(value),
            Err(panic) => {
                error!(
                    "Cache panicked while invalidating for {} ({}): {}",
                    event.event_type,
                    event.id,
                    panic_message(panic.as_ref())
                );
                None
            }
        }
    }
}
