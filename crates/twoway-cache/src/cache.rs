//! Template cache keyed by text digest
//!
//! Each distinct template text maps to one slot that is filled exactly once,
//! even when many threads ask for the same text at the same moment. Parse
//! failures are cached as well: a broken template stays broken.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, RwLock};
use twoway_template::{ParseError, Template, TemplateId, TemplateParser};

type Slot = Arc<OnceLock<Result<Arc<Template>, ParseError>>>;

/// Cache counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

/// Parsed-template cache
///
/// ## Usage
///
/// ```rust,ignore
/// let cache = TemplateCache::new();
///
/// let template = cache.get_or_parse_named(Some("users.sql"), &text)?;
/// let sql = evaluator.evaluate(&template, &context)?;
/// ```
///
/// The key is the SHA-256 digest of the text alone, so the first name a
/// text was parsed under is the one its template and errors carry.
pub struct TemplateCache {
    parser: TemplateParser,
    slots: RwLock<HashMap<String, Slot>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl TemplateCache {
    pub fn new() -> Self {
        Self::with_parser(TemplateParser::new())
    }

    /// Cache backed by a custom parser
    pub fn with_parser(parser: TemplateParser) -> Self {
        Self {
            parser,
            slots: RwLock::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Parsed template for `text`, parsing it on first request
    pub fn get_or_parse(&self, text: &str) -> Result<Arc<Template>, ParseError> {
        self.get_or_parse_named(None, text)
    }

    /// Like [`TemplateCache::get_or_parse`], naming the template on first parse
    pub fn get_or_parse_named(&self, name: Option<&str>, text: &str) -> Result<Arc<Template>, ParseError> {
        let key = TemplateId::for_text(text, None).digest;
        let slot = self.slot(&key);

        let mut parsed_here = false;
        let result = slot.get_or_init(|| {
            parsed_here = true;
            self.parser.parse_named(name, text).map(Arc::new)
        });

        if parsed_here {
            self.misses.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(digest = %&key[..12], ok = result.is_ok(), "template cache miss");
        } else {
            self.hits.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(digest = %&key[..12], "template cache hit");
        }

        result.clone()
    }

    /// Shared slot for a digest, created on demand
    fn slot(&self, key: &str) -> Slot {
        if let Ok(slots) = self.slots.read() {
            if let Some(slot) = slots.get(key) {
                return Arc::clone(slot);
            }
        }

        match self.slots.write() {
            Ok(mut slots) => Arc::clone(slots.entry(key.to_string()).or_default()),
            // poisoned map: parse without caching
            Err(_) => Arc::new(OnceLock::new()),
        }
    }

    /// Drop the entry for `text`; returns whether one existed
    pub fn evict(&self, text: &str) -> bool {
        let key = TemplateId::for_text(text, None).digest;

        if let Ok(mut slots) = self.slots.write() {
            slots.remove(&key).is_some()
        } else {
            false
        }
    }

    /// Clear all entries; counters are kept
    pub fn clear(&self) {
        if let Ok(mut slots) = self.slots.write() {
            slots.clear();
        }
    }

    /// Number of cached texts (successful and failed parses)
    pub fn len(&self) -> usize {
        if let Ok(slots) = self.slots.read() {
            slots.len()
        } else {
            0
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

impl Default for TemplateCache {
    fn default() -> Self {
        Self::new()
    }
}
