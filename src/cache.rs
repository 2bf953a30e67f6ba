//! In-process cache of evaluation results.
//!
//! [`EvaluationCache`] is a bounded map from (flag, type, context) to the resolved value. Entries
//! expire after a TTL and, when the cache is full, the least-recently-used entry is evicted.
//! [`CachedProvider`] puts the cache in front of any [`FeatureProvider`].
use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use crate::{
    config::{self, ConfigLookup, ProcessEnv},
    hooks::Hook,
    EvaluationContext, EvaluationError, FeatureProvider, FlagType, FlagValue, ProviderMetadata,
    ProviderStatus, Reason, ResolutionDetail, Result,
};

pub const DEFAULT_TTL: Duration = Duration::from_secs(60);
pub const DEFAULT_MAX_SIZE: usize = 10_000;

/// Configuration for [`EvaluationCache`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    pub(crate) enabled: bool,
    pub(crate) ttl: Duration,
    pub(crate) max_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            enabled: true,
            ttl: DEFAULT_TTL,
            max_size: DEFAULT_MAX_SIZE,
        }
    }
}

impl CacheConfig {
    /// A configuration that never caches anything.
    pub fn disabled() -> CacheConfig {
        CacheConfig {
            enabled: false,
            ..CacheConfig::default()
        }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// How long a cached result stays valid.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Maximum number of cached results. Zero disables the cache.
    pub fn max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    /// Load configuration from `OPENFEATURE_CACHE_ENABLED`, `OPENFEATURE_CACHE_TTL_MS`, and
    /// `OPENFEATURE_CACHE_MAX_SIZE`, falling back to defaults for unset variables.
    pub fn from_env() -> Result<CacheConfig> {
        CacheConfig::from_lookup(&ProcessEnv)
    }

    pub fn from_lookup(lookup: &impl ConfigLookup) -> Result<CacheConfig> {
        let defaults = CacheConfig::default();
        Ok(CacheConfig {
            enabled: config::parse_bool(lookup, "OPENFEATURE_CACHE_ENABLED")?
                .unwrap_or(defaults.enabled),
            ttl: config::parse_millis(lookup, "OPENFEATURE_CACHE_TTL_MS")?.unwrap_or(defaults.ttl),
            max_size: config::parse(lookup, "OPENFEATURE_CACHE_MAX_SIZE")?
                .unwrap_or(defaults.max_size),
        })
    }
}

struct Entry {
    detail: ResolutionDetail<serde_json::Value>,
    inserted_at: Instant,
    /// Position in `CacheState::recency`.
    last_used: u64,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, Entry>,
    /// Usage tick → key. The first entry is the least recently used.
    recency: BTreeMap<u64, String>,
    tick: u64,
}

impl CacheState {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn remove(&mut self, key: &str) {
        if let Some(entry) = self.entries.remove(key) {
            self.recency.remove(&entry.last_used);
        }
    }
}

/// A thread-safe TTL + LRU cache of evaluation results.
///
/// Only error-free results are stored. A single mutex guards the map.
pub struct EvaluationCache {
    config: CacheConfig,
    state: Mutex<CacheState>,
}

impl EvaluationCache {
    pub fn new(config: CacheConfig) -> EvaluationCache {
        EvaluationCache {
            config,
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled && self.config.max_size > 0
    }

    /// Get a cached result for `flag_key` evaluated as `T` in `context`.
    pub fn get<T: FlagValue>(
        &self,
        flag_key: &str,
        context: &EvaluationContext,
    ) -> Option<ResolutionDetail<T>> {
        self.get_at(flag_key, context, Instant::now())
    }

    /// Store `detail`. Results carrying an error are ignored.
    pub fn insert<T: FlagValue>(
        &self,
        flag_key: &str,
        context: &EvaluationContext,
        detail: &ResolutionDetail<T>,
    ) {
        self.insert_at(flag_key, context, detail, Instant::now())
    }

    pub fn clear(&self) {
        let mut state = self.lock();
        state.entries.clear();
        state.recency.clear();
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get_at<T: FlagValue>(
        &self,
        flag_key: &str,
        context: &EvaluationContext,
        now: Instant,
    ) -> Option<ResolutionDetail<T>> {
        if !self.is_enabled() {
            return None;
        }

        let key = cache_key(flag_key, T::TYPE, context);
        let mut state = self.lock();

        let inserted_at = state.entries.get(&key)?.inserted_at;
        if now.saturating_duration_since(inserted_at) >= self.config.ttl {
            state.remove(&key);
            return None;
        }

        let tick = state.next_tick();
        let entry = state.entries.get_mut(&key)?;
        let previous = std::mem::replace(&mut entry.last_used, tick);
        let detail = entry.detail.clone();
        state.recency.remove(&previous);
        state.recency.insert(tick, key);
        drop(state);

        let value = T::from_json(&detail.value)?;
        Some(detail.map(|_| value))
    }

    fn insert_at<T: FlagValue>(
        &self,
        flag_key: &str,
        context: &EvaluationContext,
        detail: &ResolutionDetail<T>,
        now: Instant,
    ) {
        if !self.is_enabled() || detail.is_error() {
            return;
        }

        let key = cache_key(flag_key, T::TYPE, context);
        let detail = detail.to_json();

        let mut state = self.lock();
        state.remove(&key);
        let tick = state.next_tick();
        state.recency.insert(tick, key.clone());
        state.entries.insert(
            key,
            Entry {
                detail,
                inserted_at: now,
                last_used: tick,
            },
        );

        while state.entries.len() > self.config.max_size {
            let Some((_, evicted)) = state.recency.pop_first() else {
                break;
            };
            state.entries.remove(&evicted);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheState> {
        self.state
            .lock()
            .expect("thread holding cache lock should not panic")
    }
}

/// Cache key: flag key, requested type, and a digest of the serialized context.
fn cache_key(flag_key: &str, flag_type: FlagType, context: &EvaluationContext) -> String {
    let digest = md5::compute(context.canonical_bytes());
    format!("{flag_key}\u{0}{flag_type}\u{0}{digest:x}")
}

/// A provider wrapper that serves repeated evaluations from an [`EvaluationCache`].
///
/// Cache hits keep the original value, variant, and metadata, with reason `CACHED`.
///
/// ```
/// # use openfeature_contrib::{CacheConfig, CachedProvider};
/// # use openfeature_contrib::providers::InMemoryProvider;
/// # use std::time::Duration;
/// let provider = CachedProvider::new(
///     InMemoryProvider::default(),
///     CacheConfig::default().ttl(Duration::from_secs(30)).max_size(1_000),
/// );
/// ```
pub struct CachedProvider<P> {
    inner: P,
    cache: Arc<EvaluationCache>,
}

impl<P: FeatureProvider> CachedProvider<P> {
    pub fn new(inner: P, config: CacheConfig) -> CachedProvider<P> {
        CachedProvider::with_cache(inner, Arc::new(EvaluationCache::new(config)))
    }

    /// Use an existing (possibly shared) cache.
    pub fn with_cache(inner: P, cache: Arc<EvaluationCache>) -> CachedProvider<P> {
        CachedProvider { inner, cache }
    }

    pub fn cache(&self) -> &Arc<EvaluationCache> {
        &self.cache
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    fn evaluate<T: FlagValue>(
        &self,
        flag_key: &str,
        default_value: T,
        context: &EvaluationContext,
    ) -> ResolutionDetail<T> {
        if let Some(cached) = self.cache.get::<T>(flag_key, context) {
            log::trace!(target: "openfeature", flag_key; "serving flag from cache");
            return cached.with_reason(Reason::Cached);
        }

        let detail = T::resolve(&self.inner, flag_key, default_value, context);
        self.cache.insert(flag_key, context, &detail);
        detail
    }
}

impl<P: FeatureProvider> FeatureProvider for CachedProvider<P> {
    fn metadata(&self) -> ProviderMetadata {
        self.inner.metadata()
    }

    fn status(&self) -> ProviderStatus {
        self.inner.status()
    }

    fn initialize(&self, context: &EvaluationContext) -> std::result::Result<(), EvaluationError> {
        self.cache.clear();
        self.inner.initialize(context)
    }

    fn shutdown(&self) {
        self.cache.clear();
        self.inner.shutdown()
    }

    fn hooks(&self) -> Vec<Arc<dyn Hook>> {
        self.inner.hooks()
    }

    fn resolve_boolean_value(
        &self,
        flag_key: &str,
        default_value: bool,
        context: &EvaluationContext,
    ) -> ResolutionDetail<bool> {
        self.evaluate(flag_key, default_value, context)
    }

    fn resolve_string_value(
        &self,
        flag_key: &str,
        default_value: String,
        context: &EvaluationContext,
    ) -> ResolutionDetail<String> {
        self.evaluate(flag_key, default_value, context)
    }

    fn resolve_integer_value(
        &self,
        flag_key: &str,
        default_value: i64,
        context: &EvaluationContext,
    ) -> ResolutionDetail<i64> {
        self.evaluate(flag_key, default_value, context)
    }

    fn resolve_float_value(
        &self,
        flag_key: &str,
        default_value: f64,
        context: &EvaluationContext,
    ) -> ResolutionDetail<f64> {
        self.evaluate(flag_key, default_value, context)
    }

    fn resolve_object_value(
        &self,
        flag_key: &str,
        default_value: serde_json::Value,
        context: &EvaluationContext,
    ) -> ResolutionDetail<serde_json::Value> {
        self.evaluate(flag_key, default_value, context)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        time::{Duration, Instant},
    };

    use super::{CacheConfig, CachedProvider, EvaluationCache};
    use crate::{
        providers::{InMemoryFlag, InMemoryProvider},
        EvaluationContext, EvaluationError, FeatureProvider, Reason, ResolutionDetail,
    };

    fn user(id: &str) -> EvaluationContext {
        EvaluationContext::new().with_targeting_key(id)
    }

    #[test]
    fn hit_after_insert() {
        let cache = EvaluationCache::new(CacheConfig::default());
        let detail = ResolutionDetail::new(true)
            .with_variant("on")
            .with_reason(Reason::TargetingMatch);

        cache.insert("flag", &user("a"), &detail);

        assert_eq!(cache.get::<bool>("flag", &user("a")), Some(detail));
        assert_eq!(cache.get::<bool>("flag", &user("b")), None);
        assert_eq!(cache.get::<bool>("other", &user("a")), None);
    }

    #[test]
    fn type_is_part_of_the_key() {
        let cache = EvaluationCache::new(CacheConfig::default());
        cache.insert("flag", &user("a"), &ResolutionDetail::new(1_i64));

        assert_eq!(cache.get::<f64>("flag", &user("a")), None);
        assert_eq!(cache.get::<i64>("flag", &user("a")).map(|it| it.value), Some(1));
    }

    #[test]
    fn entries_expire_after_ttl() {
        let cache = EvaluationCache::new(CacheConfig::default().ttl(Duration::from_secs(10)));
        let start = Instant::now();
        cache.insert_at("flag", &user("a"), &ResolutionDetail::new(true), start);

        assert!(cache
            .get_at::<bool>("flag", &user("a"), start + Duration::from_secs(9))
            .is_some());
        assert!(cache
            .get_at::<bool>("flag", &user("a"), start + Duration::from_secs(10))
            .is_none());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn least_recently_used_entry_is_evicted() {
        let cache = EvaluationCache::new(CacheConfig::default().max_size(2));
        cache.insert("flag", &user("a"), &ResolutionDetail::new(true));
        cache.insert("flag", &user("b"), &ResolutionDetail::new(true));

        // Touch "a" so that "b" becomes the least recently used.
        assert!(cache.get::<bool>("flag", &user("a")).is_some());
        cache.insert("flag", &user("c"), &ResolutionDetail::new(true));

        assert_eq!(cache.len(), 2);
        assert!(cache.get::<bool>("flag", &user("a")).is_some());
        assert!(cache.get::<bool>("flag", &user("b")).is_none());
        assert!(cache.get::<bool>("flag", &user("c")).is_some());
    }

    #[test]
    fn reinserting_refreshes_entry() {
        let cache = EvaluationCache::new(CacheConfig::default().max_size(2));
        cache.insert("flag", &user("a"), &ResolutionDetail::new(false));
        cache.insert("flag", &user("b"), &ResolutionDetail::new(true));
        cache.insert("flag", &user("a"), &ResolutionDetail::new(true));
        cache.insert("flag", &user("c"), &ResolutionDetail::new(true));

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get::<bool>("flag", &user("a")).map(|it| it.value), Some(true));
        assert!(cache.get::<bool>("flag", &user("b")).is_none());
    }

    #[test]
    fn errors_are_not_cached() {
        let cache = EvaluationCache::new(CacheConfig::default());
        cache.insert(
            "flag",
            &user("a"),
            &ResolutionDetail::from_error(false, EvaluationError::flag_not_found("flag")),
        );
        assert!(cache.is_empty());
    }

    #[test]
    fn disabled_cache_stores_nothing() {
        for config in [CacheConfig::disabled(), CacheConfig::default().max_size(0)] {
            let cache = EvaluationCache::new(config);
            cache.insert("flag", &user("a"), &ResolutionDetail::new(true));
            assert!(cache.get::<bool>("flag", &user("a")).is_none());
            assert!(cache.is_empty());
        }
    }

    #[test]
    fn config_from_lookup() {
        let vars = HashMap::from([
            ("OPENFEATURE_CACHE_TTL_MS", "1500"),
            ("OPENFEATURE_CACHE_MAX_SIZE", "42"),
        ]);
        let config =
            CacheConfig::from_lookup(&|name: &str| vars.get(name).map(|it| it.to_string()))
                .unwrap();
        assert_eq!(
            config,
            CacheConfig::default()
                .ttl(Duration::from_millis(1500))
                .max_size(42)
        );

        let vars = HashMap::from([("OPENFEATURE_CACHE_ENABLED", "nope")]);
        assert!(
            CacheConfig::from_lookup(&|name: &str| vars.get(name).map(|it| it.to_string()))
                .is_err()
        );
    }

    #[test]
    fn cached_provider_marks_hits() {
        let inner = InMemoryProvider::new([(
            "flag".to_owned(),
            InMemoryFlag::new("on", [("on", "value-1")]),
        )]);
        let provider = CachedProvider::new(inner, CacheConfig::default());

        let first = provider.resolve_string_value("flag", String::new(), &user("a"));
        assert_eq!(first.reason, Some(Reason::Static));

        // Changing the backend does not affect cached results.
        provider.inner().set_flag("flag", InMemoryFlag::new("on", [("on", "value-2")]));

        let second = provider.resolve_string_value("flag", String::new(), &user("a"));
        assert_eq!(second.value, "value-1");
        assert_eq!(second.variant.as_deref(), Some("on"));
        assert_eq!(second.reason, Some(Reason::Cached));

        // A new context misses and sees the new value.
        let third = provider.resolve_string_value("flag", String::new(), &user("b"));
        assert_eq!(third.value, "value-2");

        provider.cache().clear();
        let fourth = provider.resolve_string_value("flag", String::new(), &user("a"));
        assert_eq!(fourth.value, "value-2");
    }
}
