//! Configuration types for the header override agent.

use serde::{Deserialize, Serialize};

/// Default lifetime of a correlation entry, in host timestamp units (ms).
pub const DEFAULT_CORRELATION_TTL_MS: i64 = 10_000;

/// Main configuration for the agent process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Configuration version
    pub version: String,
    /// Global settings
    pub settings: Settings,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            version: "1".to_string(),
            settings: Settings::default(),
        }
    }
}

/// Global settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Path of the JSON file backing the settings store
    pub store_path: String,
    /// Lifetime of a recorded request origin (ms)
    pub correlation_ttl_ms: i64,
    /// Apply the registered URL filters before dispatching events
    pub apply_url_filter: bool,
    /// Enable debug headers (X-Header-Rule)
    pub debug_headers: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            store_path: "settings.json".to_string(),
            correlation_ttl_ms: DEFAULT_CORRELATION_TTL_MS,
            apply_url_filter: true,
            debug_headers: false,
        }
    }
}

/// Header overrides configured for one URL pattern.
///
/// This is the persisted shape written by the options page, hence the
/// upper-case `URL` key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteRule {
    /// URL pattern; `*` characters are wildcards for the host filter and are
    /// stripped to form the lookup key.
    #[serde(rename = "URL")]
    pub url_pattern: String,
    /// Header directives, applied in order
    pub headers: Vec<HeaderDirective>,
}

impl SiteRule {
    pub fn new(url_pattern: impl Into<String>, headers: Vec<HeaderDirective>) -> Self {
        Self {
            url_pattern: url_pattern.into(),
            headers,
        }
    }
}

/// Header name-value directive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderDirective {
    /// Header name
    pub name: String,
    /// Header value, or the `HTTP_ORIGIN` placeholder
    pub value: String,
}

impl HeaderDirective {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// A directive with neither name nor value contributes nothing.
    pub fn is_blank(&self) -> bool {
        self.name.is_empty() && self.value.is_empty()
    }
}
