//! Header override agent implementation.

use crate::config::{AgentConfig, Settings, SiteRule};
use crate::context::{
    Header, HostEvent, HostReply, RequestErrorEvent, RequestSentEvent, ResourceType,
    ResponseDecision, ResponseHeadersEvent,
};
use crate::correlation::{origin_signal, CorrelationCache};
use crate::matcher::{MatcherError, UrlFilter, UrlMatcher};
use crate::rule::RuleIndex;
use crate::store::{SettingsError, SettingsStore};
use crate::transformer::HeaderMerger;
use arc_swap::ArcSwapOption;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, trace, warn};

/// Debug header naming the rule key applied to a response.
pub const DEBUG_RULE_HEADER: &str = "X-Header-Rule";

/// Host event an observation point is registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservationPoint {
    RequestSent,
    ResponseHeadersReceived,
    RequestError,
}

/// What the host must install for one observation point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub point: ObservationPoint,
    /// URL filter patterns
    pub urls: Vec<String>,
    /// Extra host options (blocking, header access)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_info: Vec<String>,
}

/// One configuration generation of the interception logic.
///
/// Rules, filter and display flag are fixed for the lifetime of the
/// controller; the correlation cache and altered counter start empty.
/// Reconfiguration builds a new controller instead of mutating this one.
pub struct InterceptionController {
    rules: RuleIndex,
    filter: UrlFilter,
    cache: Mutex<CorrelationCache>,
    altered: AtomicU64,
    display_count: bool,
    debug_headers: bool,
}

impl InterceptionController {
    /// Compile a controller from the configured rules.
    pub fn new(
        rules: &[SiteRule],
        display_count: bool,
        settings: &Settings,
    ) -> Result<Self, MatcherError> {
        let filter = UrlFilter::compile(rules.iter().map(|r| r.url_pattern.clone()))?;

        if settings.apply_url_filter {
            for url in filter.exact_urls() {
                warn!(
                    pattern = url,
                    "Rule pattern has no '*', only this exact URL passes the URL filter"
                );
            }
        }

        Ok(Self {
            rules: RuleIndex::build(rules),
            filter,
            cache: Mutex::new(CorrelationCache::new(settings.correlation_ttl_ms)),
            altered: AtomicU64::new(0),
            display_count,
            debug_headers: settings.debug_headers,
        })
    }

    /// A controller without rules; every response passes through.
    pub fn empty(settings: &Settings) -> Self {
        Self {
            rules: RuleIndex::default(),
            filter: UrlFilter::default(),
            cache: Mutex::new(CorrelationCache::new(settings.correlation_ttl_ms)),
            altered: AtomicU64::new(0),
            display_count: true,
            debug_headers: settings.debug_headers,
        }
    }

    /// Observation points the host must register for this generation.
    pub fn registrations(&self) -> Vec<Registration> {
        let urls = self.filter.urls().to_vec();
        vec![
            Registration {
                point: ObservationPoint::ResponseHeadersReceived,
                urls: urls.clone(),
                extra_info: vec!["blocking".to_string(), "responseHeaders".to_string()],
            },
            Registration {
                point: ObservationPoint::RequestSent,
                urls: urls.clone(),
                extra_info: vec!["requestHeaders".to_string()],
            },
            Registration {
                point: ObservationPoint::RequestError,
                urls,
                extra_info: vec![],
            },
        ]
    }

    /// Whether the registered URL filter lets `url` through.
    pub fn observes(&self, url: &str) -> bool {
        let observed = self.filter.matches(url);
        trace!(url, matcher = self.filter.name(), observed, "URL filter check");
        observed
    }

    pub fn rules(&self) -> &RuleIndex {
        &self.rules
    }

    /// Requests with a recorded origin and no response yet.
    pub fn pending(&self) -> usize {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Responses altered since this generation was bound.
    pub fn altered_count(&self) -> u64 {
        self.altered.load(Ordering::Relaxed)
    }

    pub fn display_count(&self) -> bool {
        self.display_count
    }

    /// Badge text: empty until the first altered response, or when the
    /// counter is hidden.
    pub fn badge_text(&self) -> String {
        match self.altered_count() {
            0 => String::new(),
            n if self.display_count => n.to_string(),
            _ => String::new(),
        }
    }

    /// Handle an outbound request. Returns whether an origin was recorded.
    ///
    /// Request headers are never modified.
    pub fn on_request_sent(&self, event: &RequestSentEvent) -> bool {
        let Some(origin) = origin_signal(&event.request_headers) else {
            trace!(request_id = %event.request_id, "No origin signal on request");
            return false;
        };

        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record(&event.request_id, origin, event.timestamp);

        debug!(
            request_id = %event.request_id,
            url = %event.url,
            origin,
            "Recorded request origin"
        );
        true
    }

    /// Handle received response headers.
    pub fn on_response_headers(&self, event: &ResponseHeadersEvent) -> ResponseDecision {
        let Some(entry) = self.rules.find(&event.url) else {
            trace!(request_id = %event.request_id, url = %event.url, "No matching rule");
            return ResponseDecision::pass_through();
        };

        let pending = self
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take_and_sweep(&event.request_id, event.timestamp);
        let origin = pending.as_ref().map(|p| p.origin.as_str());

        let badge = if self.display_count {
            let altered = self.altered.fetch_add(1, Ordering::Relaxed) + 1;
            Some(altered.to_string())
        } else {
            None
        };

        let mut headers =
            HeaderMerger::new(entry.directives()).merge(&event.response_headers, origin);

        if self.debug_headers {
            headers.push(Header::new(DEBUG_RULE_HEADER, entry.key()));
        }

        debug!(
            request_id = %event.request_id,
            url = %event.url,
            rule = entry.key(),
            origin = origin.unwrap_or("*"),
            directives = entry.directives().len(),
            "Applied response header overrides"
        );

        ResponseDecision {
            response_headers: Some(headers),
            badge,
        }
    }

    /// Handle a failed request.
    ///
    /// Failures of XHR requests are routine when headers were overridden and
    /// are not reported.
    pub fn on_request_error(&self, event: &RequestErrorEvent) {
        if event.resource_type != ResourceType::Xmlhttprequest {
            warn!(
                request_id = %event.request_id,
                url = %event.url,
                error = %event.error,
                "Unable to modify headers"
            );
        } else {
            trace!(request_id = %event.request_id, error = %event.error, "XHR request failed");
        }
    }
}

/// Counters kept across configuration generations.
#[derive(Debug, Default)]
struct AgentCounters {
    requests_observed: AtomicU64,
    origins_recorded: AtomicU64,
    responses_observed: AtomicU64,
    responses_altered: AtomicU64,
    host_errors: AtomicU64,
    reconfigurations: AtomicU64,
}

/// Snapshot of the agent statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentStats {
    pub requests_observed: u64,
    pub origins_recorded: u64,
    pub responses_observed: u64,
    pub responses_altered: u64,
    pub host_errors: u64,
    pub reconfigurations: u64,
    pub pending_requests: usize,
    pub rules: usize,
    pub bound: bool,
}

/// Header override agent.
///
/// Holds the settings store and the currently bound controller. Handlers
/// load the bound controller once per call and work on that snapshot only,
/// so a reconfiguration racing with an event never mixes two generations.
pub struct HeaderAgent {
    /// Configuration
    settings: Settings,
    /// Persisted rules
    store: Arc<dyn SettingsStore>,
    /// Bound controller; `None` while unbound
    current: ArcSwapOption<InterceptionController>,
    counters: AgentCounters,
}

impl HeaderAgent {
    /// Create an agent and bind it to the rules found in `store`.
    ///
    /// Unreadable settings leave the agent bound with no rules.
    pub fn new(config: AgentConfig, store: Arc<dyn SettingsStore>) -> Result<Self, AgentError> {
        let settings = config.settings;

        let controller = match load_controller(store.as_ref(), &settings) {
            Ok(controller) => controller,
            Err(e @ (AgentError::Settings(_) | AgentError::Matcher(_))) => {
                warn!(error = %e, "Failed to load settings, starting without rules");
                InterceptionController::empty(&settings)
            }
            Err(e) => return Err(e),
        };

        info!(
            rules = controller.rules().len(),
            display_count = controller.display_count(),
            debug_headers = settings.debug_headers,
            "Header override agent initialized"
        );

        Ok(Self {
            settings,
            store,
            current: ArcSwapOption::from_pointee(controller),
            counters: AgentCounters::default(),
        })
    }

    /// Create from a YAML configuration string.
    pub fn from_yaml(yaml: &str, store: Arc<dyn SettingsStore>) -> Result<Self, AgentError> {
        let config: AgentConfig = serde_yaml::from_str(yaml)?;
        Self::new(config, store)
    }

    /// Create from a JSON configuration string.
    pub fn from_json(json: &str, store: Arc<dyn SettingsStore>) -> Result<Self, AgentError> {
        let config: AgentConfig = serde_json::from_str(json)?;
        Self::new(config, store)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Reload the settings and rebind every observation point.
    ///
    /// The new generation starts with an empty correlation cache and a reset
    /// counter. On failure the current generation stays bound.
    pub fn reconfigure(&self) -> Result<Vec<Registration>, AgentError> {
        let controller = match load_controller(self.store.as_ref(), &self.settings) {
            Ok(controller) => controller,
            Err(e) => {
                warn!(error = %e, "Reconfiguration failed, keeping current rules");
                return Err(e);
            }
        };

        let registrations = controller.registrations();
        let rules = controller.rules().len();
        self.rebind(Arc::new(controller));
        self.counters.reconfigurations.fetch_add(1, Ordering::Relaxed);

        info!(rules, "Agent reconfigured");
        Ok(registrations)
    }

    /// Persist new rules through the store, then reconfigure.
    pub fn store_settings(
        &self,
        sites: &[SiteRule],
        display_count: Option<bool>,
    ) -> Result<Vec<Registration>, AgentError> {
        self.store.store_rules(sites)?;
        if let Some(display) = display_count {
            self.store.store_display_count(display)?;
        }
        self.reconfigure()
    }

    /// Swap in a new controller, returning the previously bound one.
    pub fn rebind(
        &self,
        controller: Arc<InterceptionController>,
    ) -> Option<Arc<InterceptionController>> {
        let previous = self.current.swap(Some(controller));
        if let Some(ref previous) = previous {
            debug!(
                discarded_pending = previous.pending(),
                altered = previous.altered_count(),
                "Previous generation unbound"
            );
        }
        previous
    }

    /// Detach every observation point. Events pass through until rebound.
    pub fn unbind(&self) -> Option<Arc<InterceptionController>> {
        let previous = self.current.swap(None);
        info!("Observation points unbound");
        previous
    }

    /// The bound controller, if any.
    pub fn snapshot(&self) -> Option<Arc<InterceptionController>> {
        self.current.load_full()
    }

    /// Observation points currently registered.
    pub fn bindings(&self) -> Vec<Registration> {
        self.snapshot()
            .map(|c| c.registrations())
            .unwrap_or_default()
    }

    /// Current badge text.
    pub fn badge_text(&self) -> String {
        self.snapshot().map(|c| c.badge_text()).unwrap_or_default()
    }

    /// Handle an outbound request. Request headers are returned unchanged.
    pub fn on_request_sent(&self, event: RequestSentEvent) -> Vec<Header> {
        self.counters.requests_observed.fetch_add(1, Ordering::Relaxed);

        if let Some(controller) = self.snapshot() {
            if controller.on_request_sent(&event) {
                self.counters.origins_recorded.fetch_add(1, Ordering::Relaxed);
            }
        }

        event.request_headers
    }

    /// Handle received response headers.
    pub fn on_response_headers(&self, event: &ResponseHeadersEvent) -> ResponseDecision {
        self.counters.responses_observed.fetch_add(1, Ordering::Relaxed);

        let Some(controller) = self.snapshot() else {
            return ResponseDecision::pass_through();
        };

        let decision = controller.on_response_headers(event);
        if !decision.is_pass_through() {
            self.counters.responses_altered.fetch_add(1, Ordering::Relaxed);
        }
        decision
    }

    /// Handle a failed request.
    pub fn on_request_error(&self, event: &RequestErrorEvent) {
        self.counters.host_errors.fetch_add(1, Ordering::Relaxed);

        if let Some(controller) = self.snapshot() {
            controller.on_request_error(event);
        }
    }

    /// Dispatch one host event, applying the registered URL filters first
    /// when the host does not.
    pub fn handle_event(&self, event: HostEvent) -> HostReply {
        match event {
            HostEvent::RequestSent(e) => {
                if !self.is_observed(&e.url) {
                    return HostReply::RequestSent {
                        request_headers: e.request_headers,
                    };
                }
                HostReply::RequestSent {
                    request_headers: self.on_request_sent(e),
                }
            }
            HostEvent::ResponseHeadersReceived(e) => {
                if !self.is_observed(&e.url) {
                    return HostReply::ResponseHeaders(ResponseDecision::pass_through());
                }
                HostReply::ResponseHeaders(self.on_response_headers(&e))
            }
            HostEvent::RequestError(e) => {
                if self.is_observed(&e.url) {
                    self.on_request_error(&e);
                }
                HostReply::Ack
            }
            HostEvent::SettingsChanged => bindings_reply(self.reconfigure()),
            HostEvent::StoreSettings {
                sites,
                display_count,
            } => bindings_reply(self.store_settings(&sites, display_count)),
        }
    }

    fn is_observed(&self, url: &str) -> bool {
        if !self.settings.apply_url_filter {
            return true;
        }
        self.snapshot().is_some_and(|c| c.observes(url))
    }

    /// Current statistics.
    pub fn stats(&self) -> AgentStats {
        let snapshot = self.snapshot();
        AgentStats {
            requests_observed: self.counters.requests_observed.load(Ordering::Relaxed),
            origins_recorded: self.counters.origins_recorded.load(Ordering::Relaxed),
            responses_observed: self.counters.responses_observed.load(Ordering::Relaxed),
            responses_altered: self.counters.responses_altered.load(Ordering::Relaxed),
            host_errors: self.counters.host_errors.load(Ordering::Relaxed),
            reconfigurations: self.counters.reconfigurations.load(Ordering::Relaxed),
            pending_requests: snapshot.as_ref().map_or(0, |c| c.pending()),
            rules: snapshot.as_ref().map_or(0, |c| c.rules().len()),
            bound: snapshot.is_some(),
        }
    }
}

fn bindings_reply(result: Result<Vec<Registration>, AgentError>) -> HostReply {
    match result {
        Ok(bindings) => HostReply::Bindings { bindings },
        Err(e) => HostReply::Error {
            message: e.to_string(),
        },
    }
}

/// Build a controller from the rules and display flag held in `store`.
fn load_controller(
    store: &dyn SettingsStore,
    settings: &Settings,
) -> Result<InterceptionController, AgentError> {
    let rules = store.load_rules()?.unwrap_or_default();

    let display_count = store.display_count().unwrap_or_else(|e| {
        warn!(error = %e, "Invalid display flag, showing the counter");
        true
    });

    Ok(InterceptionController::new(&rules, display_count, settings)?)
}

/// Agent errors.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error("Matcher error: {0}")]
    Matcher(#[from] MatcherError),
}
