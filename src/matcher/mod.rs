//! URL matchers.
//!
//! Two kinds of matching happen on a URL: the host-side filter that decides
//! whether an event is observed at all ([`UrlFilter`]), and the rule lookup
//! that picks the directives for a response ([`KeyMatcher`]).

mod pattern;
mod substring;

pub use pattern::{FilterPattern, UrlFilter, ALL_URLS};
pub use substring::{normalize_key, KeyMatcher};

/// Trait for matching a request URL.
pub trait UrlMatcher: Send + Sync {
    /// Check if this matcher matches the given URL.
    fn matches(&self, url: &str) -> bool;

    /// Get the matcher name for debugging.
    fn name(&self) -> &'static str;
}

/// Errors that can occur during matcher compilation.
#[derive(Debug, thiserror::Error)]
pub enum MatcherError {
    #[error("Invalid URL filter pattern: {0}")]
    InvalidPattern(#[from] glob::PatternError),
}
