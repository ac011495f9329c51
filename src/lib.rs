//! Response header override agent.
//!
//! Rewrites response headers (typically CORS headers) for requests whose URL
//! matches a configured rule:
//!
//! - Per-URL header directives, replacing or appending response headers
//! - `HTTP_ORIGIN` placeholder resolved from the request's `Origin` or
//!   `Referer` header
//! - Self-expiring correlation between request and response events
//! - Wholesale rebinding when the stored settings change
//!
//! ## Settings Example
//!
//! ```json
//! [
//!   {
//!     "URL": "http://api.example.com/*",
//!     "headers": [
//!       { "name": "Access-Control-Allow-Origin", "value": "HTTP_ORIGIN" },
//!       { "name": "Access-Control-Allow-Credentials", "value": "true" }
//!     ]
//!   }
//! ]
//! ```

pub mod agent;
pub mod config;
pub mod context;
pub mod correlation;
pub mod matcher;
pub mod rule;
pub mod store;
pub mod transformer;

pub use agent::{AgentError, HeaderAgent, InterceptionController};
pub use config::{AgentConfig, HeaderDirective, SiteRule};
pub use context::{Header, HostEvent, HostReply, ResponseDecision};
pub use correlation::CorrelationCache;
pub use rule::RuleIndex;
pub use store::{FileStore, MemoryStore, SettingsError, SettingsStore};
