//! Rule index: URL key to ordered header directives.

use crate::config::{HeaderDirective, SiteRule};
use crate::matcher::{KeyMatcher, UrlMatcher};
use tracing::{debug, trace};

/// Compiled lookup structure over the configured site rules.
///
/// Entries are kept in first-insertion order. Lookup returns the first entry
/// whose key occurs in the URL, not the longest or most specific one.
#[derive(Debug, Clone, Default)]
pub struct RuleIndex {
    entries: Vec<IndexEntry>,
}

/// One key of the index with its directives.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    matcher: KeyMatcher,
    directives: Vec<HeaderDirective>,
}

impl IndexEntry {
    /// Normalized key (pattern without `*`).
    pub fn key(&self) -> &str {
        self.matcher.key()
    }

    pub fn directives(&self) -> &[HeaderDirective] {
        &self.directives
    }
}

impl RuleIndex {
    /// Build the index from the configured rules.
    ///
    /// A later rule whose normalized key equals an earlier one replaces its
    /// directives; the entry keeps the earlier position.
    pub fn build(rules: &[SiteRule]) -> Self {
        let mut entries: Vec<IndexEntry> = Vec::with_capacity(rules.len());

        for rule in rules {
            let matcher = KeyMatcher::from_pattern(&rule.url_pattern);

            let existing = entries.iter().position(|e| e.matcher == matcher);
            match existing {
                Some(pos) => {
                    debug!(
                        key = matcher.key(),
                        "Duplicate rule key, later directives replace earlier ones"
                    );
                    entries[pos].directives = rule.headers.clone();
                }
                None => entries.push(IndexEntry {
                    matcher,
                    directives: rule.headers.clone(),
                }),
            }
        }

        Self { entries }
    }

    /// Find the entry applying to `url`.
    pub fn find(&self, url: &str) -> Option<&IndexEntry> {
        let entry = self.entries.iter().find(|e| e.matcher.matches(url));
        trace!(url, matched = entry.map(|e| e.key()), "Rule lookup");
        entry
    }

    /// Directives applying to `url`, if any rule matches.
    pub fn lookup(&self, url: &str) -> Option<&[HeaderDirective]> {
        self.find(url).map(IndexEntry::directives)
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys in index order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(IndexEntry::key)
    }
}
