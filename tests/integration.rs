//! Integration tests for the header override agent.

use cors_override_agent::agent::ObservationPoint;
use cors_override_agent::context::{RequestSentEvent, ResponseHeadersEvent};
use cors_override_agent::store::SITES_KEY;
use cors_override_agent::transformer::HTTP_ORIGIN_PLACEHOLDER;
use cors_override_agent::{
    AgentConfig, FileStore, Header, HeaderAgent, HeaderDirective, HostEvent, HostReply,
    MemoryStore, SettingsStore, SiteRule,
};
use std::sync::Arc;

fn request(id: &str, url: &str, ts: f64, headers: Vec<Header>) -> RequestSentEvent {
    RequestSentEvent {
        request_id: id.to_string(),
        url: url.to_string(),
        timestamp: ts,
        request_headers: headers,
    }
}

fn response(id: &str, url: &str, ts: f64, headers: Vec<Header>) -> ResponseHeadersEvent {
    ResponseHeadersEvent {
        request_id: id.to_string(),
        url: url.to_string(),
        timestamp: ts,
        response_headers: headers,
    }
}

fn agent_with(rules: &[SiteRule]) -> (HeaderAgent, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::with_rules(rules).unwrap());
    let agent = HeaderAgent::new(AgentConfig::default(), store.clone()).unwrap();
    (agent, store)
}

fn reply_headers(reply: HostReply) -> Option<Vec<Header>> {
    match reply {
        HostReply::ResponseHeaders(decision) => decision.response_headers,
        other => panic!("unexpected reply: {:?}", other),
    }
}

// =============================================================================
// Configuration Parsing Tests
// =============================================================================

#[test]
fn test_parse_minimal_config() {
    let yaml = r#"
version: "1"
"#;
    let config: AgentConfig = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(config.version, "1");
    assert_eq!(config.settings.store_path, "settings.json");
}

#[test]
fn test_parse_json_config() {
    let json = r#"{
        "version": "1",
        "settings": {
            "store_path": "/tmp/agent.json",
            "correlation_ttl_ms": 5000,
            "apply_url_filter": false
        }
    }"#;
    let config: AgentConfig = serde_json::from_str(json).unwrap();
    assert_eq!(config.settings.correlation_ttl_ms, 5000);
    assert!(!config.settings.apply_url_filter);
}

// =============================================================================
// End-to-End Tests
// =============================================================================

#[test]
fn test_end_to_end_append() {
    let (agent, _) = agent_with(&[SiteRule::new(
        "http://a.test/*",
        vec![HeaderDirective::new("X-Test", "1")],
    )]);

    let headers = reply_headers(agent.handle_event(HostEvent::ResponseHeadersReceived(
        response(
            "1",
            "http://a.test/page",
            1000.0,
            vec![Header::new("Content-Type", "text/html")],
        ),
    )))
    .unwrap();

    assert_eq!(
        headers,
        vec![
            Header::new("Content-Type", "text/html"),
            Header::new("X-Test", "1"),
        ]
    );
}

#[test]
fn test_end_to_end_origin_placeholder() {
    let (agent, _) = agent_with(&[SiteRule::new(
        "http://api.test/*",
        vec![
            HeaderDirective::new("Access-Control-Allow-Origin", HTTP_ORIGIN_PLACEHOLDER),
            HeaderDirective::new("Access-Control-Allow-Credentials", "true"),
        ],
    )]);

    let reply = agent.handle_event(HostEvent::RequestSent(request(
        "42",
        "http://api.test/users",
        1000.0,
        vec![
            Header::new("Referer", "https://app.test/dashboard"),
            Header::new("Origin", "https://app.test"),
        ],
    )));
    assert!(matches!(reply, HostReply::RequestSent { ref request_headers } if request_headers.len() == 2));

    let headers = reply_headers(agent.handle_event(HostEvent::ResponseHeadersReceived(
        response(
            "42",
            "http://api.test/users",
            1050.0,
            vec![
                Header::new("Access-Control-Allow-Origin", "https://other.test"),
                Header::new("Content-Type", "application/json"),
            ],
        ),
    )))
    .unwrap();

    assert_eq!(
        headers,
        vec![
            Header::new("Access-Control-Allow-Origin", "https://app.test"),
            Header::new("Content-Type", "application/json"),
            Header::new("Access-Control-Allow-Credentials", "true"),
        ]
    );
}

#[test]
fn test_interleaved_requests() {
    let (agent, _) = agent_with(&[SiteRule::new(
        "http://api.test/*",
        vec![HeaderDirective::new(
            "Access-Control-Allow-Origin",
            HTTP_ORIGIN_PLACEHOLDER,
        )],
    )]);

    agent.on_request_sent(request(
        "a",
        "http://api.test/1",
        1000.0,
        vec![Header::new("Origin", "https://one.test")],
    ));
    agent.on_request_sent(request(
        "b",
        "http://api.test/2",
        1001.0,
        vec![Header::new("Referer", "https://two.test/page")],
    ));

    let b = agent.on_response_headers(&response("b", "http://api.test/2", 1010.0, vec![]));
    let a = agent.on_response_headers(&response("a", "http://api.test/1", 1020.0, vec![]));

    assert_eq!(b.response_headers.unwrap()[0].value, "https://two.test/page");
    assert_eq!(a.response_headers.unwrap()[0].value, "https://one.test");
    assert_eq!(a.badge.as_deref(), Some("2"));
}

#[test]
fn test_orphaned_origin_expires() {
    let (agent, _) = agent_with(&[SiteRule::new(
        "http://api.test/*",
        vec![HeaderDirective::new(
            "Access-Control-Allow-Origin",
            HTTP_ORIGIN_PLACEHOLDER,
        )],
    )]);

    agent.on_request_sent(request(
        "orphan",
        "http://api.test/",
        1000.0,
        vec![Header::new("Origin", "https://app.test")],
    ));
    assert_eq!(agent.stats().pending_requests, 1);

    // another response within the TTL window keeps the entry
    agent.on_response_headers(&response("x", "http://api.test/", 11_000.0, vec![]));
    assert_eq!(agent.stats().pending_requests, 1);

    // past the TTL it is swept
    agent.on_response_headers(&response("y", "http://api.test/", 11_001.0, vec![]));
    assert_eq!(agent.stats().pending_requests, 0);

    let late = agent.on_response_headers(&response("orphan", "http://api.test/", 11_002.0, vec![]));
    assert_eq!(late.response_headers.unwrap()[0].value, "*");
}

// =============================================================================
// Reconfiguration Tests
// =============================================================================

#[test]
fn test_reconfiguration_isolation() {
    let (agent, store) = agent_with(&[SiteRule::new(
        "http://a.test/*",
        vec![HeaderDirective::new("X-Generation", "old")],
    )]);

    let in_flight = agent.snapshot().unwrap();

    store
        .store_rules(&[SiteRule::new(
            "http://b.test/*",
            vec![HeaderDirective::new("X-Generation", "new")],
        )])
        .unwrap();
    agent.reconfigure().unwrap();

    // a handler that captured the previous generation completes against it
    let decision = in_flight.on_response_headers(&response("1", "http://a.test/", 1000.0, vec![]));
    assert_eq!(
        decision.response_headers.unwrap(),
        vec![Header::new("X-Generation", "old")]
    );

    // new events see only the new rules
    assert!(agent
        .on_response_headers(&response("2", "http://a.test/", 1000.0, vec![]))
        .is_pass_through());
    let decision = agent.on_response_headers(&response("3", "http://b.test/", 1000.0, vec![]));
    assert_eq!(
        decision.response_headers.unwrap(),
        vec![Header::new("X-Generation", "new")]
    );
}

#[test]
fn test_reconfiguration_discards_pending() {
    let (agent, _) = agent_with(&[SiteRule::new(
        "http://api.test/*",
        vec![HeaderDirective::new(
            "Access-Control-Allow-Origin",
            HTTP_ORIGIN_PLACEHOLDER,
        )],
    )]);

    agent.on_request_sent(request(
        "1",
        "http://api.test/",
        1000.0,
        vec![Header::new("Origin", "https://app.test")],
    ));
    agent.handle_event(HostEvent::SettingsChanged);

    let decision = agent.on_response_headers(&response("1", "http://api.test/", 1100.0, vec![]));
    assert_eq!(decision.response_headers.unwrap()[0].value, "*");
}

#[test]
fn test_store_settings_event_rebinds() {
    let (agent, store) = agent_with(&[]);
    assert!(agent
        .on_response_headers(&response("1", "http://a.test/", 1000.0, vec![]))
        .is_pass_through());

    let reply = agent.handle_event(HostEvent::StoreSettings {
        sites: vec![SiteRule::new(
            "http://a.test/*",
            vec![HeaderDirective::new("X-Test", "1")],
        )],
        display_count: Some(false),
    });

    match reply {
        HostReply::Bindings { bindings } => {
            assert_eq!(bindings.len(), 3);
            assert!(bindings
                .iter()
                .any(|b| b.point == ObservationPoint::RequestSent
                    && b.urls == vec!["http://a.test/*".to_string()]));
        }
        other => panic!("unexpected reply: {:?}", other),
    }

    assert_eq!(store.load_rules().unwrap().unwrap().len(), 1);
    assert!(!store.display_count().unwrap());

    let decision = agent.on_response_headers(&response("2", "http://a.test/", 1000.0, vec![]));
    assert!(decision.response_headers.is_some());
    assert!(decision.badge.is_none());
}

#[test]
fn test_malformed_settings_reply_error() {
    let (agent, store) = agent_with(&[SiteRule::new(
        "http://a.test/*",
        vec![HeaderDirective::new("X-Test", "1")],
    )]);

    store.set(SITES_KEY, "{broken".to_string()).unwrap();
    let reply = agent.handle_event(HostEvent::SettingsChanged);
    assert!(matches!(reply, HostReply::Error { .. }));

    // last-known-good rules remain in effect
    let decision = agent.on_response_headers(&response("1", "http://a.test/x", 1000.0, vec![]));
    assert_eq!(
        decision.response_headers.unwrap(),
        vec![Header::new("X-Test", "1")]
    );
}

// =============================================================================
// File Store Tests
// =============================================================================

#[test]
fn test_file_store_agent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.json");
    std::fs::write(
        &path,
        serde_json::json!({
            "corsSites": r#"[{"URL":"http://a.test/*","headers":[{"name":"X-Test","value":"1"}]}]"#,
            "displayInterceptCount": "true"
        })
        .to_string(),
    )
    .unwrap();

    let mut config = AgentConfig::default();
    config.settings.store_path = path.to_string_lossy().to_string();
    let store = Arc::new(FileStore::new(&path));
    let agent = HeaderAgent::new(config, store).unwrap();

    assert_eq!(agent.stats().rules, 1);
    let decision = agent.on_response_headers(&response("1", "http://a.test/", 1000.0, vec![]));
    assert_eq!(decision.badge.as_deref(), Some("1"));
}

// =============================================================================
// Host Envelope Tests
// =============================================================================

#[test]
fn test_json_line_roundtrip() {
    let (agent, _) = agent_with(&[SiteRule::new(
        "http://a.test/*",
        vec![HeaderDirective::new("X-Test", "1")],
    )]);

    let line = r#"{"event":"response_headers_received","request_id":"5","url":"http://a.test/p","timestamp":1.0,"response_headers":[]}"#;
    let event: HostEvent = serde_json::from_str(line).unwrap();
    let reply = serde_json::to_value(agent.handle_event(event)).unwrap();

    assert_eq!(reply["reply"], "response_headers");
    assert_eq!(reply["response_headers"][0]["name"], "X-Test");
    assert_eq!(reply["badge"], "1");
}
