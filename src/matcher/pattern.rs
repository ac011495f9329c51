//! URL filter patterns used to scope observation points.

use super::{MatcherError, UrlMatcher};
use glob::Pattern as GlobPattern;

/// Special filter pattern accepted by hosts to observe every URL.
pub const ALL_URLS: &str = "<all_urls>";

/// Compiled URL filter pattern.
///
/// Only `*` is a wildcard (matching any run of characters, `/` included);
/// every other character, `?` and `[` among them, is literal. A run of
/// several `*` behaves like a single one.
#[derive(Debug, Clone)]
pub enum FilterPattern {
    /// Matches every URL
    Any,
    /// Pattern without wildcard; matches only the identical URL
    Exact(String),
    /// Wildcard pattern over the whole URL
    Glob(GlobPattern),
}

impl FilterPattern {
    /// Compile a filter pattern from a configured URL pattern.
    pub fn compile(pattern: &str) -> Result<Self, MatcherError> {
        if pattern == ALL_URLS {
            return Ok(Self::Any);
        }
        if !pattern.contains('*') {
            return Ok(Self::Exact(pattern.to_string()));
        }

        // glob rejects `**` outside a whole path component
        let mut escaped = String::with_capacity(pattern.len());
        for (i, segment) in pattern.split('*').enumerate() {
            if i > 0 && !escaped.ends_with('*') {
                escaped.push('*');
            }
            escaped.push_str(&GlobPattern::escape(segment));
        }

        Ok(Self::Glob(GlobPattern::new(&escaped)?))
    }

    /// Whether the pattern only matches one literal URL.
    pub fn is_exact(&self) -> bool {
        matches!(self, Self::Exact(_))
    }
}

impl UrlMatcher for FilterPattern {
    fn matches(&self, url: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(pattern) => pattern == url,
            Self::Glob(pattern) => pattern.matches(url),
        }
    }

    fn name(&self) -> &'static str {
        "filter_pattern"
    }
}

/// The URL filter an observation point is registered with.
///
/// An event is delivered when any pattern matches its URL.
#[derive(Debug, Clone, Default)]
pub struct UrlFilter {
    /// Raw patterns as configured, handed to the host on registration
    urls: Vec<String>,
    patterns: Vec<FilterPattern>,
}

impl UrlFilter {
    /// Compile a filter from the configured URL patterns.
    pub fn compile<I, S>(urls: I) -> Result<Self, MatcherError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let urls: Vec<String> = urls.into_iter().map(Into::into).collect();
        let patterns = urls
            .iter()
            .map(|url| FilterPattern::compile(url))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { urls, patterns })
    }

    /// Raw patterns in configuration order.
    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Configured patterns without any wildcard.
    pub fn exact_urls(&self) -> impl Iterator<Item = &str> {
        self.urls
            .iter()
            .zip(&self.patterns)
            .filter(|(_, p)| p.is_exact())
            .map(|(url, _)| url.as_str())
    }
}

impl UrlMatcher for UrlFilter {
    fn matches(&self, url: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(url))
    }

    fn name(&self) -> &'static str {
        "url_filter"
    }
}
