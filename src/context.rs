//! Host events and replies exchanged at the observation points.

use crate::config::{HeaderDirective, SiteRule};
use crate::agent::Registration;
use serde::{Deserialize, Serialize};

/// An HTTP header as delivered by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub name: String,
    #[serde(default)]
    pub value: String,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

impl From<HeaderDirective> for Header {
    fn from(directive: HeaderDirective) -> Self {
        Self {
            name: directive.name,
            value: directive.value,
        }
    }
}

/// Kind of resource a request was issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    MainFrame,
    SubFrame,
    Stylesheet,
    Script,
    Image,
    Font,
    Object,
    Xmlhttprequest,
    Ping,
    CspReport,
    Media,
    Websocket,
    #[serde(other)]
    Other,
}

/// Current host time in milliseconds, for events that carry no timestamp.
fn now_millis() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64
}

/// Outbound request about to be sent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestSentEvent {
    pub request_id: String,
    pub url: String,
    /// Host timestamp (ms)
    #[serde(default = "now_millis")]
    pub timestamp: f64,
    #[serde(default)]
    pub request_headers: Vec<Header>,
}

/// Response headers received for a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseHeadersEvent {
    pub request_id: String,
    pub url: String,
    /// Host timestamp (ms)
    #[serde(default = "now_millis")]
    pub timestamp: f64,
    #[serde(default)]
    pub response_headers: Vec<Header>,
}

/// A request failed inside the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestErrorEvent {
    pub request_id: String,
    pub url: String,
    #[serde(rename = "type")]
    pub resource_type: ResourceType,
    pub error: String,
}

/// Decision returned for a response.
///
/// `response_headers` is `None` when the response passes through untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseDecision {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_headers: Option<Vec<Header>>,
    /// New badge text, when the altered counter is displayed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub badge: Option<String>,
}

impl ResponseDecision {
    /// Leave the response as the host received it.
    pub fn pass_through() -> Self {
        Self::default()
    }

    pub fn is_pass_through(&self) -> bool {
        self.response_headers.is_none()
    }
}

/// Line-oriented event envelope read by the agent binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HostEvent {
    RequestSent(RequestSentEvent),
    ResponseHeadersReceived(ResponseHeadersEvent),
    RequestError(RequestErrorEvent),
    /// The options page saved new settings
    SettingsChanged,
    /// Save settings through the store, then reconfigure
    StoreSettings {
        sites: Vec<SiteRule>,
        #[serde(default)]
        display_count: Option<bool>,
    },
}

/// Reply written for each host event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "reply", rename_all = "snake_case")]
pub enum HostReply {
    RequestSent {
        request_headers: Vec<Header>,
    },
    ResponseHeaders(ResponseDecision),
    Ack,
    Bindings {
        bindings: Vec<Registration>,
    },
    Error {
        message: String,
    },
}
