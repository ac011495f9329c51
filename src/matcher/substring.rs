//! Rule key matching.

use super::UrlMatcher;

/// Matches URLs containing a rule key.
///
/// The key is the configured pattern with every `*` removed, so
/// `http://www.foo.com/*` matches `http://www.foo.com/?x=1`. Patterns are a
/// substring hint, not a wildcard grammar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyMatcher {
    key: String,
}

impl KeyMatcher {
    /// Normalize a configured URL pattern into a key matcher.
    pub fn from_pattern(pattern: &str) -> Self {
        Self {
            key: normalize_key(pattern),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

/// Strip wildcard characters from a URL pattern.
pub fn normalize_key(pattern: &str) -> String {
    pattern.replace('*', "")
}

impl UrlMatcher for KeyMatcher {
    fn matches(&self, url: &str) -> bool {
        url.contains(self.key.as_str())
    }

    fn name(&self) -> &'static str {
        "key_matcher"
    }
}
