//! Parse-once template caching
//!
//! Parsed templates are immutable, so the intended strategy is to parse a
//! template text once and evaluate the shared tree per request.

pub mod cache;

pub use cache::{CacheStats, TemplateCache};
