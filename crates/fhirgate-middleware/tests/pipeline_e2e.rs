//! End-to-end tests of the four-stage pipeline against mocked remotes.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use bytes::Bytes;
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use http::{Method, StatusCode};
use http_body_util::{BodyExt, Full};
use serde_json::{json, Value};
use wiremock::matchers::{any, body_partial_json, header, method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

use fhirgate_config::{DispatchMode, GateConfig};
use fhirgate_middleware::{
    AuthGateMiddleware, AuthenticatorClient, BoxFuture, CapabilityFilterMiddleware,
    NotifierClient, NotifierMiddleware, Pipeline, Request, RequestContext, ResourceGateMiddleware,
    Response, Stage,
};

const AUTH_PATH: &str = "/api/authenticate-user";
const NOTIFY_PATH: &str = "/api/notifications";

fn config(server: &MockServer, validate_patient: bool) -> GateConfig {
    let mut config = GateConfig::default();
    config.gate.validate_patient = validate_patient;
    config.remote.base_url = server.uri();
    config.remote.authenticate_user_path = AUTH_PATH.to_string();
    config.remote.notifications_path = NOTIFY_PATH.to_string();
    config.remote.client_grant_access_token = "svc-token".to_string();
    config.remote.request_timeout = Duration::from_secs(2);
    config.notifier.dispatch = DispatchMode::Inline;
    config
}

fn pipeline(config: &GateConfig) -> Pipeline {
    Pipeline::gate(
        config,
        AuthenticatorClient::new(&config.remote).unwrap(),
        NotifierClient::new(&config.remote).unwrap(),
    )
}

fn request(method: Method, uri: &str, bearer: Option<&str>, body: &str) -> Request {
    let mut builder = http::Request::builder().method(method).uri(uri);
    if let Some(token) = bearer {
        builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
    }
    builder
        .header(CONTENT_TYPE, "application/fhir+json")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap()
}

fn fhir_response(status: StatusCode, body: &str) -> Response {
    http::Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/fhir+json; fhirVersion=4.0")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap()
}

/// Runs the pipeline with an upstream that answers with a fixed response.
async fn run(pipeline: &Pipeline, request: Request, status: StatusCode, body: &str) -> Response {
    let body = body.to_string();
    let ctx = RequestContext::for_request(&request);
    pipeline
        .process(
            ctx,
            request,
            move |_ctx: &mut RequestContext, _request: Request| -> BoxFuture<'static, Response> {
                Box::pin(async move { fhir_response(status, &body) })
            },
        )
        .await
}

async fn body_text(response: Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn diagnostics(response: Response) -> String {
    let outcome: Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(outcome["resourceType"], "OperationOutcome");
    outcome["issue"][0]["diagnostics"]
        .as_str()
        .unwrap()
        .to_string()
}

async fn mount_authenticator(server: &MockServer, http_method: &str, status: u16, body: &str) {
    Mock::given(method(http_method))
        .and(path(AUTH_PATH))
        .respond_with(ResponseTemplate::new(status).set_body_string(body))
        .mount(server)
        .await;
}

async fn forbid_notifications(server: &MockServer) {
    Mock::given(any())
        .and(path_regex("^/api/notifications"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(server)
        .await;
}

fn patient(id: &str) -> String {
    json!({
        "resourceType": "Patient",
        "id": id,
        "telecom": [
            {"system": "phone", "value": "555-0100"},
            {"system": "email", "value": "jane@example.org"}
        ]
    })
    .to_string()
}

#[tokio::test]
async fn missing_bearer_is_rejected_without_remote_calls() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    let pipeline = pipeline(&config(&server, true));

    let response = run(
        &pipeline,
        request(Method::POST, "/fhir/Patient", None, &patient("p1")),
        StatusCode::CREATED,
        &patient("p1"),
    )
    .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        diagnostics(response).await,
        "Invalid or missing Authorization header."
    );
}

#[tokio::test]
async fn non_bearer_scheme_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    let pipeline = pipeline(&config(&server, false));

    let request = http::Request::builder()
        .uri("/fhir/Patient/p1")
        .header(AUTHORIZATION, "Basic dXNlcjpwYXNz")
        .body(Full::new(Bytes::new()))
        .unwrap();
    let response = run(&pipeline, request, StatusCode::OK, "{}").await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unknown_resource_type_is_rejected_before_authentication() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    let pipeline = pipeline(&config(&server, false));

    let response = run(
        &pipeline,
        request(Method::GET, "/fhir/Observation/1", Some("user-token"), ""),
        StatusCode::OK,
        "{}",
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        diagnostics(response).await,
        "HAPI-0302: Unknown resource type 'Observation/1' - Server knows how to handle: [Patient]"
    );
}

#[tokio::test]
async fn meta_routes_pass_the_resource_gate() {
    let server = MockServer::start().await;
    mount_authenticator(&server, "GET", 200, r#"{"id":"abc123"}"#).await;
    let pipeline = pipeline(&config(&server, false));

    let response = run(
        &pipeline,
        request(Method::GET, "/fhir/swagger-ui/index.html", Some("t"), ""),
        StatusCode::OK,
        "<html></html>",
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "<html></html>");
}

#[tokio::test]
async fn missing_contacts_are_reported_before_any_remote_call() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    let pipeline = pipeline(&config(&server, true));

    let cases = [
        (
            json!({"resourceType": "Patient", "telecom": [{"system": "phone", "value": "555"}]}),
            "The Email is required.",
        ),
        (
            json!({"resourceType": "Patient", "telecom": [{"system": "email", "value": "a@example.org"}]}),
            "The phone number is required.",
        ),
        (json!({"resourceType": "Patient", "telecom": []}), "The Email is required."),
        (
            json!({"resourceType": "Patient", "telecom": [
                {"system": "email", "value": "a@example.org"},
                {"system": "phone", "value": ""},
                {"system": "phone", "value": "555"}
            ]}),
            "The phone number is required.",
        ),
    ];

    for (body, expected) in cases {
        let response = run(
            &pipeline,
            request(Method::POST, "/fhir/Patient", Some("t"), &body.to_string()),
            StatusCode::CREATED,
            "{}",
        )
        .await;

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(diagnostics(response).await, expected);
    }
}

#[tokio::test]
async fn unreadable_payload_is_an_internal_error() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    let pipeline = pipeline(&config(&server, true));

    for body in ["{not json", r#"{"resourceType":"Patient"}"#] {
        let response = run(
            &pipeline,
            request(Method::PATCH, "/fhir/Patient/p1", Some("t"), body),
            StatusCode::OK,
            "{}",
        )
        .await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(diagnostics(response).await, "Internal Server error.");
    }
}

#[tokio::test]
async fn remote_rejections_map_to_fixed_messages() {
    let cases = [
        (401, "ignored", StatusCode::UNAUTHORIZED, "Unauthenticated."),
        (403, "ignored", StatusCode::FORBIDDEN, "Unauthorized."),
        (
            422,
            r#"{"errors":{"email":["taken"]}}"#,
            StatusCode::UNPROCESSABLE_ENTITY,
            r#"{"errors":{"email":["taken"]}}"#,
        ),
        (
            500,
            "boom",
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal Server error.",
        ),
    ];

    for (remote_status, remote_body, expected_status, expected_message) in cases {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(AUTH_PATH))
            .and(header("authorization", "Bearer user-token"))
            .respond_with(ResponseTemplate::new(remote_status).set_body_string(remote_body))
            .expect(1)
            .mount(&server)
            .await;
        forbid_notifications(&server).await;
        let pipeline = pipeline(&config(&server, true));

        let response = run(
            &pipeline,
            request(Method::POST, "/fhir/Patient", Some("user-token"), &patient("p1")),
            StatusCode::CREATED,
            &patient("p1"),
        )
        .await;

        assert_eq!(response.status(), expected_status);
        assert_eq!(diagnostics(response).await, expected_message);
    }
}

#[tokio::test]
async fn success_without_string_id_is_an_internal_error() {
    let server = MockServer::start().await;
    mount_authenticator(&server, "GET", 200, r#"{"id":42}"#).await;
    forbid_notifications(&server).await;
    let pipeline = pipeline(&config(&server, false));

    let response = run(
        &pipeline,
        request(Method::GET, "/fhir/Patient/p1", Some("t"), ""),
        StatusCode::OK,
        &patient("p1"),
    )
    .await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(diagnostics(response).await, "Internal Server error.");
}

#[tokio::test]
async fn unreachable_authenticator_is_an_internal_error() {
    let server = MockServer::start().await;
    let mut config = config(&server, false);
    config.remote.base_url = "http://127.0.0.1:9".to_string();
    let pipeline = pipeline(&config);

    let response = run(
        &pipeline,
        request(Method::GET, "/fhir/Patient/p1", Some("t"), ""),
        StatusCode::OK,
        "{}",
    )
    .await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn authenticator_timeout_is_an_internal_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(AUTH_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"{"id":"abc123"}"#)
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;
    forbid_notifications(&server).await;
    let mut config = config(&server, false);
    config.remote.request_timeout = Duration::from_millis(200);
    let pipeline = pipeline(&config);

    let started = Instant::now();
    let response = run(
        &pipeline,
        request(Method::GET, "/fhir/Patient/p1", Some("t"), ""),
        StatusCode::OK,
        &patient("p1"),
    )
    .await;

    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(diagnostics(response).await, "Internal Server error.");
}

#[tokio::test]
async fn create_forwards_login_id_exactly_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(AUTH_PATH))
        .and(body_partial_json(json!({
            "email": "jane@example.org",
            "phone": "555-0100",
            "requestHttpMethod": "POST"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"id":"abc123"}"#))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(NOTIFY_PATH))
        .and(header("authorization", "Bearer svc-token"))
        .and(body_partial_json(json!({
            "resourceType": "Patient",
            "id": "p1",
            "authenticatedUserLoginId": "abc123"
        })))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;
    let pipeline = pipeline(&config(&server, true));

    let response = run(
        &pipeline,
        request(Method::POST, "/fhir/Patient", Some("user-token"), &patient("")),
        StatusCode::CREATED,
        &patient("p1"),
    )
    .await;

    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(body_text(response).await, patient("p1"));
}

#[tokio::test]
async fn update_patches_the_resource_id() {
    let server = MockServer::start().await;
    mount_authenticator(&server, "GET", 200, r#"{"id":"abc123"}"#).await;
    Mock::given(method("PATCH"))
        .and(path("/api/notifications/p1"))
        .and(body_partial_json(json!({"authenticatedUserLoginId": "abc123"})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    let pipeline = pipeline(&config(&server, false));

    let response = run(
        &pipeline,
        request(Method::PUT, "/fhir/Patient/p1", Some("t"), &patient("p1")),
        StatusCode::OK,
        &patient("p1"),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn delete_sends_one_delete_without_body() {
    let server = MockServer::start().await;
    mount_authenticator(&server, "GET", 200, r#"{"id":"abc123"}"#).await;
    Mock::given(method("DELETE"))
        .and(path("/api/notifications/p1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(NOTIFY_PATH))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;
    let pipeline = pipeline(&config(&server, false));

    let outcome = r#"{"resourceType":"OperationOutcome","issue":[]}"#;
    let response = run(
        &pipeline,
        request(Method::DELETE, "/fhir/Patient/p1", Some("t"), ""),
        StatusCode::OK,
        outcome,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, outcome);

    let received = server.received_requests().await.unwrap();
    let deletes: Vec<_> = received
        .iter()
        .filter(|r| r.url.path() == "/api/notifications/p1")
        .collect();
    assert_eq!(deletes.len(), 1);
    assert!(deletes[0].body.is_empty());
}

#[tokio::test]
async fn reads_and_failed_mutations_are_not_forwarded() {
    let server = MockServer::start().await;
    mount_authenticator(&server, "GET", 200, r#"{"id":"abc123"}"#).await;
    forbid_notifications(&server).await;
    let pipeline = pipeline(&config(&server, false));

    let read = run(
        &pipeline,
        request(Method::GET, "/fhir/Patient/p1", Some("t"), ""),
        StatusCode::OK,
        &patient("p1"),
    )
    .await;
    assert_eq!(read.status(), StatusCode::OK);

    let failed = run(
        &pipeline,
        request(Method::PUT, "/fhir/Patient/p1", Some("t"), &patient("p1")),
        StatusCode::BAD_REQUEST,
        r#"{"resourceType":"OperationOutcome"}"#,
    )
    .await;
    assert_eq!(failed.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn notifier_failure_leaves_response_unchanged() {
    let server = MockServer::start().await;
    mount_authenticator(&server, "GET", 200, r#"{"id":"abc123"}"#).await;
    Mock::given(method("POST"))
        .and(path(NOTIFY_PATH))
        .respond_with(ResponseTemplate::new(500).set_body_string("down"))
        .expect(1)
        .mount(&server)
        .await;
    let pipeline = pipeline(&config(&server, false));

    let response = run(
        &pipeline,
        request(Method::POST, "/fhir/Patient", Some("t"), &patient("")),
        StatusCode::CREATED,
        &patient("p1"),
    )
    .await;

    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(body_text(response).await, patient("p1"));
}

#[tokio::test]
async fn notifier_timeout_leaves_response_unchanged() {
    let server = MockServer::start().await;
    mount_authenticator(&server, "GET", 200, r#"{"id":"abc123"}"#).await;
    Mock::given(method("POST"))
        .and(path(NOTIFY_PATH))
        .respond_with(ResponseTemplate::new(201).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;
    let mut config = config(&server, false);
    config.remote.request_timeout = Duration::from_millis(200);
    let pipeline = pipeline(&config);

    let started = Instant::now();
    let response = run(
        &pipeline,
        request(Method::POST, "/fhir/Patient", Some("t"), &patient("")),
        StatusCode::CREATED,
        &patient("p1"),
    )
    .await;

    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(body_text(response).await, patient("p1"));
}

#[tokio::test]
async fn detached_dispatch_delivers_exactly_once() {
    let server = MockServer::start().await;
    mount_authenticator(&server, "GET", 200, r#"{"id":"abc123"}"#).await;
    Mock::given(method("POST"))
        .and(path(NOTIFY_PATH))
        .and(body_partial_json(json!({"id": "p1", "authenticatedUserLoginId": "abc123"})))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;
    let mut config = config(&server, false);
    config.notifier.dispatch = DispatchMode::Detached;
    let pipeline = pipeline(&config);

    let response = run(
        &pipeline,
        request(Method::POST, "/fhir/Patient", Some("t"), &patient("")),
        StatusCode::CREATED,
        &patient("p1"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(body_text(response).await, patient("p1"));

    let notifications = || async {
        server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|received| received.url.path() == NOTIFY_PATH)
            .count()
    };
    for _ in 0..100 {
        if notifications().await > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(notifications().await, 1);
}

#[tokio::test]
async fn unreachable_notifier_leaves_response_unchanged() {
    let server = MockServer::start().await;
    mount_authenticator(&server, "GET", 200, r#"{"id":"abc123"}"#).await;
    let config = config(&server, false);

    let authenticator = Arc::new(AuthenticatorClient::new(&config.remote).unwrap());
    let notifier = Arc::new(
        NotifierClient::with_url("http://127.0.0.1:9/notify", "svc", Duration::from_secs(1))
            .unwrap(),
    );
    let pipeline = Pipeline::builder()
        .stage(Stage::ResourceGate, ResourceGateMiddleware::new("/fhir"))
        .stage(
            Stage::AuthGate,
            AuthGateMiddleware::new("/fhir", false, authenticator),
        )
        .stage(Stage::CapabilityFilter, CapabilityFilterMiddleware::new("/fhir"))
        .stage(
            Stage::OutboundNotifier,
            NotifierMiddleware::new("/fhir", "4.0", DispatchMode::Inline, notifier),
        )
        .build();

    let response = run(
        &pipeline,
        request(Method::POST, "/fhir/Patient", Some("t"), &patient("")),
        StatusCode::CREATED,
        &patient("p1"),
    )
    .await;

    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(body_text(response).await, patient("p1"));
}

#[tokio::test]
async fn unsupported_schema_version_skips_notification() {
    let server = MockServer::start().await;
    mount_authenticator(&server, "GET", 200, r#"{"id":"abc123"}"#).await;
    forbid_notifications(&server).await;
    let pipeline = pipeline(&config(&server, false));

    let request = request(Method::POST, "/fhir/Patient", Some("t"), &patient(""));
    let ctx = RequestContext::for_request(&request);
    let response = pipeline
        .process(
            ctx,
            request,
            |_ctx: &mut RequestContext, _request: Request| -> BoxFuture<'static, Response> {
                Box::pin(async {
                    http::Response::builder()
                        .status(StatusCode::CREATED)
                        .header(CONTENT_TYPE, "application/fhir+json; fhirVersion=6.0")
                        .body(Full::new(Bytes::from(patient("p1"))))
                        .unwrap()
                })
            },
        )
        .await;

    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn handler_sees_the_same_payload_bytes() {
    let server = MockServer::start().await;
    mount_authenticator(&server, "POST", 200, r#"{"id":"abc123"}"#).await;
    Mock::given(any())
        .and(path_regex("^/api/notifications"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&server)
        .await;
    let pipeline = pipeline(&config(&server, true));

    let payload = patient("");
    let seen = Arc::new(Mutex::new(None::<(Bytes, Option<String>)>));
    let sink = Arc::clone(&seen);

    let request = request(Method::POST, "/fhir/Patient", Some("t"), &payload);
    let ctx = RequestContext::for_request(&request);
    let response = pipeline
        .process(
            ctx,
            request,
            move |ctx: &mut RequestContext, request: Request| -> BoxFuture<'static, Response> {
                let login_id = ctx.authenticated_user_login_id().map(ToString::to_string);
                let cached = ctx.cached_body().map(fhirgate_core::CachedBody::bytes);
                Box::pin(async move {
                    let bytes = request.into_body().collect().await.unwrap().to_bytes();
                    assert_eq!(cached.as_ref(), Some(&bytes));
                    *sink.lock().unwrap() = Some((bytes, login_id));
                    fhir_response(StatusCode::CREATED, &patient("p1"))
                })
            },
        )
        .await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let (bytes, login_id) = seen.lock().unwrap().take().unwrap();
    assert_eq!(bytes, payload.as_bytes());
    assert_eq!(login_id.as_deref(), Some("abc123"));
}

#[tokio::test]
async fn capability_statement_is_filtered_idempotently() {
    let server = MockServer::start().await;
    mount_authenticator(&server, "GET", 200, r#"{"id":"abc123"}"#).await;
    let pipeline = pipeline(&config(&server, false));

    let statement = json!({
        "resourceType": "CapabilityStatement",
        "rest": [{
            "mode": "server",
            "resource": [
                {"type": "Observation"},
                {"type": "Patient", "interaction": [{"code": "read"}]},
                {"type": "Practitioner"}
            ]
        }]
    })
    .to_string();

    let first = run(
        &pipeline,
        request(Method::GET, "/fhir/metadata", Some("t"), ""),
        StatusCode::OK,
        &statement,
    )
    .await;
    let first = body_text(first).await;
    let filtered: Value = serde_json::from_str(&first).unwrap();
    let resources = filtered["rest"][0]["resource"].as_array().unwrap();
    assert_eq!(resources.len(), 1);
    assert_eq!(resources[0]["type"], "Patient");

    let second = run(
        &pipeline,
        request(Method::GET, "/fhir/metadata", Some("t"), ""),
        StatusCode::OK,
        &first,
    )
    .await;
    assert_eq!(body_text(second).await, first);
}
