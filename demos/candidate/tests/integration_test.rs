//! Integration tests for the candidate slice with Store and Dispatcher
//!
//! These tests run the full flow: intent, transport, lifecycle messages,
//! slice state.

#![allow(clippy::unwrap_used)] // Test code can unwrap

use candidate::{CANDIDATE_LOAD_ERROR, CandidateState, FETCH_CANDIDATE, SLICE};
use serde_json::json;
use slate_core::Method;
use slate_runtime::http::{HttpTransport, HttpTransportConfig};
use slate_runtime::{Dispatcher, Store};
use slate_testing::{RecordingListener, ScriptedTransport};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn candidate(store: &Store) -> CandidateState {
    store
        .get_state::<CandidateState>(SLICE)
        .unwrap()
        .into_option()
        .map(|state| (*state).clone())
        .unwrap()
}

#[tokio::test]
async fn test_fetch_candidate_success() {
    let store = Store::new();
    candidate::register(&store).unwrap();

    let transport = ScriptedTransport::new();
    transport.succeed(
        Method::Get,
        "/api/candidates/ZTF21aaqjmps",
        json!({"id": "ZTF21aaqjmps", "ra": 234.22, "dec": -22.33, "redshift": 3}),
    );

    let recorder = RecordingListener::new();
    let _subscription = recorder.attach(&store);

    let dispatcher = Dispatcher::new(store.clone(), transport.clone());
    let terminal = dispatcher
        .dispatch_and_wait(candidate::fetch_candidate("ZTF21aaqjmps"))
        .await
        .unwrap();

    assert_eq!(terminal.kind(), &FETCH_CANDIDATE);
    assert_eq!(recorder.phases(), vec!["started", "succeeded"]);

    let state = candidate(&store);
    assert_eq!(state.id.as_deref(), Some("ZTF21aaqjmps"));
    assert_eq!(state.ra, Some(234.22));
    assert_eq!(state.load_error, "");
    assert_eq!(transport.requests()[0].path, "/api/candidates/ZTF21aaqjmps");
}

#[tokio::test]
async fn test_fetch_candidate_errors() {
    let store = Store::new();
    candidate::register(&store).unwrap();

    let transport = ScriptedTransport::new();
    transport
        .fail_application(Method::Get, "/api/candidates/nope", "Invalid candidate ID")
        .fail_transport(Method::Get, "/api/candidates/down");

    let dispatcher = Dispatcher::new(store.clone(), transport);

    dispatcher
        .dispatch_and_wait(candidate::fetch_candidate("nope"))
        .await
        .unwrap();
    assert_eq!(candidate(&store).load_error, "Invalid candidate ID");

    dispatcher
        .dispatch_and_wait(candidate::fetch_candidate("down"))
        .await
        .unwrap();
    assert_eq!(candidate(&store).load_error, CANDIDATE_LOAD_ERROR);
}

#[tokio::test]
async fn test_late_registration_sees_no_earlier_messages() {
    let store = Store::new();
    let transport = ScriptedTransport::new();
    transport.succeed(Method::Get, "/api/candidates/a", json!({"id": "a"}));

    let dispatcher = Dispatcher::new(store.clone(), transport);
    dispatcher
        .dispatch_and_wait(candidate::fetch_candidate("a"))
        .await
        .unwrap();

    assert!(!store.get_state::<CandidateState>(SLICE).unwrap().is_registered());

    candidate::register(&store).unwrap();
    assert_eq!(candidate(&store), CandidateState::default());
}

#[tokio::test]
async fn test_reregistration_keeps_loaded_candidate() {
    let store = Store::new();
    candidate::register(&store).unwrap();

    let transport = ScriptedTransport::new();
    transport.succeed(Method::Get, "/api/candidates/a", json!({"id": "a", "ra": 1.5}));
    let dispatcher = Dispatcher::new(store.clone(), transport);
    dispatcher
        .dispatch_and_wait(candidate::fetch_candidate("a"))
        .await
        .unwrap();

    candidate::register(&store).unwrap();

    let state = candidate(&store);
    assert_eq!(state.id.as_deref(), Some("a"));
    assert_eq!(state.ra, Some(1.5));
}

#[tokio::test]
async fn test_fetch_candidate_over_http() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/candidates/ZTF21aaqjmps"))
        .and(header("authorization", "token view-only"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "data": {"id": "ZTF21aaqjmps", "ra": 234.22, "dec": -22.33, "redshift": 3, "dm": 44.1}
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/candidates/missing"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "status": "error",
            "message": "Invalid candidate ID"
        })))
        .mount(&server)
        .await;

    let store = Store::new();
    candidate::register(&store).unwrap();

    let transport =
        HttpTransport::new(HttpTransportConfig::new(server.uri()).with_token("view-only")).unwrap();
    let dispatcher = Dispatcher::new(store.clone(), transport);

    dispatcher
        .dispatch_and_wait(candidate::fetch_candidate("ZTF21aaqjmps"))
        .await
        .unwrap();

    let state = candidate(&store);
    assert_eq!(state.id.as_deref(), Some("ZTF21aaqjmps"));
    assert_eq!(state.extra.get("dm"), Some(&json!(44.1)));
    assert_eq!(state.load_error, "");

    dispatcher
        .dispatch_and_wait(candidate::fetch_candidate("missing"))
        .await
        .unwrap();

    let state = candidate(&store);
    assert_eq!(state.load_error, "Invalid candidate ID");
    assert_eq!(state.id.as_deref(), Some("ZTF21aaqjmps"));
}
