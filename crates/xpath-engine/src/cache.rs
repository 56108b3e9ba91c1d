//! Cache of compiled expressions.
//!
//! Entries are keyed by source (text, or a syntax tree by identity), language and debug flag.
//! Each key keeps the half-compiled tree and every binding of it produced so far; a binding is
//! reused when the caller's static context answers the same lookups the same way.

use core::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use lru::LruCache;
use tracing::debug;

use crate::compiler::{self, CompiledExpression, Expr, Language};
use crate::engine::runtime::{Error, StaticContext};
use crate::parser::{self, ast};

#[derive(Debug, Clone)]
pub enum CacheSource {
    Text(Arc<str>),
    /// A caller-owned syntax tree, compared by pointer identity.
    Tree(Arc<ast::Expr>),
}

impl PartialEq for CacheSource {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (CacheSource::Text(a), CacheSource::Text(b)) => a == b,
            (CacheSource::Tree(a), CacheSource::Tree(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Eq for CacheSource {}

impl Hash for CacheSource {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            CacheSource::Text(text) => {
                0u8.hash(state);
                text.hash(state);
            }
            CacheSource::Tree(tree) => {
                1u8.hash(state);
                Arc::as_ptr(tree).hash(state);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub source: CacheSource,
    pub language: Language,
    pub debug: bool,
}

#[derive(Debug, Default)]
pub struct CacheEntry {
    pub half_compiled: Option<Arc<Expr>>,
    pub fully_compiled: Vec<Arc<CompiledExpression>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered by an existing binding.
    pub full_hits: u64,
    /// Lookups that rebound an existing half-compiled tree.
    pub half_reuses: u64,
    /// Lookups that had to parse.
    pub cold_compiles: u64,
    pub binding_passes: u64,
}

impl CacheStats {
    pub fn lookups(&self) -> u64 {
        self.full_hits + self.half_reuses + self.cold_compiles
    }
}

/// Thread-safe compiled-expression cache, shared between evaluators through an `Arc`.
pub struct CompiledExpressionCache {
    entries: Mutex<LruCache<CacheKey, CacheEntry>>,
    stats: Mutex<CacheStats>,
}

impl Default for CompiledExpressionCache {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for CompiledExpressionCache {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CompiledExpressionCache")
            .field("keys", &self.len())
            .field("stats", &self.stats())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Outcome of the locked lookup phase.
enum Probe {
    Hit(Arc<CompiledExpression>),
    Half(Arc<Expr>),
    Cold,
}

impl CompiledExpressionCache {
    /// An unbounded cache.
    pub fn new() -> Self {
        Self { entries: Mutex::new(LruCache::unbounded()), stats: Mutex::new(CacheStats::default()) }
    }

    /// A cache holding at most `capacity` keys; the least recently used key is evicted first.
    pub fn with_capacity(capacity: NonZeroUsize) -> Self {
        Self { entries: Mutex::new(LruCache::new(capacity)), stats: Mutex::new(CacheStats::default()) }
    }

    pub fn stats(&self) -> CacheStats {
        *lock(&self.stats)
    }

    /// Number of cached keys.
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every entry and resets the statistics.
    pub fn clear(&self) {
        lock(&self.entries).clear();
        *lock(&self.stats) = CacheStats::default();
    }

    /// Compiles `text`, reusing earlier work for the same text when possible.
    pub fn compile(
        &self,
        text: &str,
        ctx: &StaticContext,
        language: Language,
        debug: bool,
    ) -> Result<Arc<CompiledExpression>, Error> {
        let source: Arc<str> = Arc::from(text);
        let key = CacheKey { source: CacheSource::Text(source.clone()), language, debug };
        self.get_or_compile(key, ctx, Some(source), || compiler::lower(&parser::parse(text, language)?))
    }

    /// Compiles an already parsed tree. Only the same `Arc` hits the cache.
    pub fn compile_tree(
        &self,
        tree: &Arc<ast::Expr>,
        ctx: &StaticContext,
        language: Language,
        debug: bool,
    ) -> Result<Arc<CompiledExpression>, Error> {
        let key = CacheKey { source: CacheSource::Tree(Arc::clone(tree)), language, debug };
        self.get_or_compile(key, ctx, None, || compiler::lower(tree))
    }

    fn probe(&self, key: &CacheKey, ctx: &StaticContext) -> Probe {
        let mut entries = lock(&self.entries);
        let Some(entry) = entries.get(key) else {
            return Probe::Cold;
        };
        if let Some(hit) = entry.fully_compiled.iter().find(|c| c.bindings.is_satisfied_by(ctx)) {
            return Probe::Hit(Arc::clone(hit));
        }
        match &entry.half_compiled {
            Some(half) => Probe::Half(Arc::clone(half)),
            None => Probe::Cold,
        }
    }

    fn get_or_compile(
        &self,
        key: CacheKey,
        ctx: &StaticContext,
        source: Option<Arc<str>>,
        lower: impl FnOnce() -> Result<Arc<Expr>, Error>,
    ) -> Result<Arc<CompiledExpression>, Error> {
        let half = match self.probe(&key, ctx) {
            Probe::Hit(compiled) => {
                debug!(source = ?compiled.source, "compiled expression cache hit");
                lock(&self.stats).full_hits += 1;
                return Ok(compiled);
            }
            Probe::Half(half) => {
                debug!(source = ?source, "reusing half-compiled expression");
                lock(&self.stats).half_reuses += 1;
                half
            }
            Probe::Cold => {
                debug!(source = ?source, "compiled expression cache miss");
                lock(&self.stats).cold_compiles += 1;
                lower()?
            }
        };

        let bound = compiler::bind(&half, ctx, key.language, key.debug);
        lock(&self.stats).binding_passes += 1;
        let mut compiled = bound?;
        compiled.source = source;
        let compiled = Arc::new(compiled);

        let mut entries = lock(&self.entries);
        let entry = entries.get_or_insert_mut(key, CacheEntry::default);
        entry.half_compiled.get_or_insert(half);
        entry.fully_compiled.push(Arc::clone(&compiled));
        Ok(compiled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::runtime::StaticContextBuilder;
    use rstest::rstest;

    #[rstest]
    fn text_keys_compare_by_content() {
        let cache = CompiledExpressionCache::new();
        let ctx = StaticContextBuilder::new().build();
        let a = cache.compile("1 + 1", &ctx, Language::XPath3, false).unwrap();
        let b = cache.compile(&String::from("1 + 1"), &ctx, Language::XPath3, false).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.stats().full_hits, 1);
    }

    #[rstest]
    fn language_and_debug_are_part_of_the_key() {
        let cache = CompiledExpressionCache::new();
        let ctx = StaticContextBuilder::new().build();
        cache.compile("1", &ctx, Language::XPath3, false).unwrap();
        cache.compile("1", &ctx, Language::XPath2, false).unwrap();
        cache.compile("1", &ctx, Language::XPath3, true).unwrap();
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.stats().cold_compiles, 3);
    }

    #[rstest]
    fn trees_compare_by_identity() {
        let cache = CompiledExpressionCache::new();
        let ctx = StaticContextBuilder::new().build();
        let first = Arc::new(parser::parse("1", Language::XPath3).unwrap());
        let second = Arc::new(parser::parse("1", Language::XPath3).unwrap());
        cache.compile_tree(&first, &ctx, Language::XPath3, false).unwrap();
        cache.compile_tree(&first, &ctx, Language::XPath3, false).unwrap();
        cache.compile_tree(&second, &ctx, Language::XPath3, false).unwrap();
        let stats = cache.stats();
        assert_eq!((stats.full_hits, stats.cold_compiles), (1, 2));
    }

    #[rstest]
    fn parse_errors_are_not_cached() {
        let cache = CompiledExpressionCache::new();
        let ctx = StaticContextBuilder::new().build();
        assert!(cache.compile("1 +", &ctx, Language::XPath3, false).is_err());
        assert!(cache.is_empty());
    }

    #[rstest]
    fn bounded_cache_evicts_least_recently_used() {
        let cache = CompiledExpressionCache::with_capacity(NonZeroUsize::MIN.saturating_add(1));
        let ctx = StaticContextBuilder::new().build();
        for text in ["1", "2", "3"] {
            cache.compile(text, &ctx, Language::XPath3, false).unwrap();
        }
        assert_eq!(cache.len(), 2);
        cache.compile("1", &ctx, Language::XPath3, false).unwrap();
        assert_eq!(cache.stats().cold_compiles, 4);
    }
}
