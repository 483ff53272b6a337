use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use jobrelay_api::app::{AppServices, build_app};
use jobrelay_api::config::AppConfig;
use jobrelay_auth::{JwtClaims, PrincipalId, Role};
use jobrelay_infra::OrchestratorConfig;
use jobrelay_infra::dispatcher::InMemoryTaskDispatcher;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::{Value, json};

const SECRET: &str = "test-secret";

struct TestServer {
    base_url: String,
    dispatcher: InMemoryTaskDispatcher,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        Self::spawn_with(OrchestratorConfig::default()).await
    }

    async fn spawn_with(orchestrator: OrchestratorConfig) -> Self {
        // Same router as prod, in-memory adapters, ephemeral port.
        let mut config = AppConfig::in_memory(SECRET);
        config.orchestrator = orchestrator;
        let (services, dispatcher) = AppServices::in_memory(config.orchestrator);
        let app = build_app(&config, Arc::new(services));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            dispatcher,
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn mint_jwt(jwt_secret: &str, sub: &str, roles: Vec<Role>) -> String {
    let now = Utc::now() - ChronoDuration::seconds(1);
    let claims = JwtClaims {
        sub: PrincipalId::new(sub).unwrap(),
        roles,
        issued_at: now,
        expires_at: now + ChronoDuration::minutes(10),
    };

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(jwt_secret.as_bytes()),
    )
    .expect("failed to encode jwt")
}

fn user_token(sub: &str) -> String {
    mint_jwt(SECRET, sub, vec![])
}

fn dispatcher_token() -> String {
    mint_jwt(SECRET, "task-queue", vec![Role::dispatcher()])
}

async fn create_job(client: &reqwest::Client, srv: &TestServer, token: &str, payload: Value) -> Value {
    let res = client
        .post(srv.url("/jobs"))
        .bearer_auth(token)
        .json(&json!({ "payload": payload }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    res.json().await.unwrap()
}

async fn callback(client: &reqwest::Client, srv: &TestServer, id: &str, body: Value) -> reqwest::Response {
    client
        .post(srv.url(&format!("/internal/jobs/{id}/callback")))
        .bearer_auth(dispatcher_token())
        .json(&body)
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn health_is_public() {
    let srv = TestServer::spawn().await;
    let res = reqwest::get(srv.url("/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn auth_required_for_protected_endpoints() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client.get(srv.url("/jobs")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let forged = mint_jwt("other-secret", "mallory", vec![]);
    let res = client
        .get(srv.url("/jobs"))
        .bearer_auth(forged)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn job_lifecycle_through_callbacks() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let token = user_token("alice");

    let job = create_job(&client, &srv, &token, json!({"x": 1})).await;
    assert_eq!(job["status"], "queued");
    assert_eq!(job["attempt_count"], 0);
    assert!(job.get("dispatch_token").is_none());
    assert!(job.get("result").is_none());
    let id = job["id"].as_str().unwrap().to_string();

    let tasks = srv.dispatcher.drain();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].job_id.to_string(), id);

    let res = callback(&client, &srv, &id, json!({"outcome": "begin_processing"})).await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["applied"], true);
    assert_eq!(body["job"]["status"], "processing");

    let res = callback(&client, &srv, &id, json!({"outcome": "success", "result": {"y": 2}})).await;
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["applied"], true);
    assert_eq!(body["job"]["status"], "completed");

    // Duplicate delivery is acknowledged without effect.
    let res = callback(&client, &srv, &id, json!({"outcome": "success", "result": {"y": 9}})).await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["applied"], false);

    let res = client
        .get(srv.url(&format!("/jobs/{id}")))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let view: Value = res.json().await.unwrap();
    assert_eq!(view["status"], "completed");
    assert_eq!(view["result"], json!({"y": 2}));
    assert!(view.get("error").is_none());
    assert!(view["started_at"].is_string());
    assert!(view["completed_at"].is_string());
}

#[tokio::test]
async fn retryable_failures_hit_the_ceiling() {
    let srv = TestServer::spawn_with(OrchestratorConfig::default().with_max_attempts(2)).await;
    let client = reqwest::Client::new();
    let token = user_token("alice");

    let job = create_job(&client, &srv, &token, json!("work")).await;
    let id = job["id"].as_str().unwrap().to_string();
    let failure = json!({"outcome": "failure", "error": "boom", "retryable": true});

    callback(&client, &srv, &id, json!({"outcome": "begin_processing"})).await;
    let body: Value = callback(&client, &srv, &id, failure.clone()).await.json().await.unwrap();
    assert_eq!(body["job"]["status"], "queued");
    assert_eq!(body["job"]["attempt_count"], 1);

    callback(&client, &srv, &id, json!({"outcome": "begin_processing"})).await;
    let body: Value = callback(&client, &srv, &id, failure).await.json().await.unwrap();
    assert_eq!(body["job"]["status"], "failed");
    assert_eq!(body["job"]["attempt_count"], 2);
    assert_eq!(body["job"]["error"], "boom");
}

#[tokio::test]
async fn callbacks_require_dispatcher_role() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let token = user_token("alice");
    let job = create_job(&client, &srv, &token, json!({"x": 1})).await;
    let id = job["id"].as_str().unwrap();

    let res = client
        .post(srv.url(&format!("/internal/jobs/{id}/callback")))
        .bearer_auth(&token)
        .json(&json!({"outcome": "begin_processing"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "forbidden");
}

#[tokio::test]
async fn callback_validation() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = callback(&client, &srv, "not-a-uuid", json!({"outcome": "begin_processing"})).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let unknown = uuid_like();
    let res = callback(&client, &srv, &unknown, json!({"outcome": "begin_processing"})).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = callback(&client, &srv, &unknown, json!({"outcome": "explode"})).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "validation_error");
}

fn uuid_like() -> String {
    jobrelay_core::JobId::new().to_string()
}

#[tokio::test]
async fn invalid_payloads_are_rejected() {
    let srv = TestServer::spawn_with(OrchestratorConfig::default().with_max_payload_bytes(32)).await;
    let client = reqwest::Client::new();
    let token = user_token("alice");

    for body in [json!({"payload": {}}), json!({}), json!({"payload": "x".repeat(64)})] {
        let res = client
            .post(srv.url("/jobs"))
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST, "body: {body}");
        let err: Value = res.json().await.unwrap();
        assert_eq!(err["error"], "validation_error");
    }
    assert!(srv.dispatcher.is_empty());
}

#[tokio::test]
async fn configured_payload_limit_governs_large_bodies() {
    let srv =
        TestServer::spawn_with(OrchestratorConfig::default().with_max_payload_bytes(8_000_000))
            .await;
    let client = reqwest::Client::new();
    let token = user_token("alice");

    let job = create_job(&client, &srv, &token, json!("x".repeat(3_000_000))).await;
    assert_eq!(job["status"], "queued");

    let res = client
        .post(srv.url("/jobs"))
        .bearer_auth(&token)
        .json(&json!({ "payload": "x".repeat(8_010_000) }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let err: Value = res.json().await.unwrap();
    assert_eq!(err["error"], "validation_error");
    assert!(err["message"].as_str().unwrap().contains("limit 8000000"), "{err}");
}

#[tokio::test]
async fn success_callback_without_result_is_rejected() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let job = create_job(&client, &srv, &user_token("alice"), json!({"x": 1})).await;
    let id = job["id"].as_str().unwrap().to_string();
    callback(&client, &srv, &id, json!({"outcome": "begin_processing"})).await;

    let res = callback(&client, &srv, &id, json!({"outcome": "success"})).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let body: Value = callback(&client, &srv, &id, json!({"outcome": "success", "result": null}))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["applied"], true);
    assert_eq!(body["job"]["status"], "completed");
}

#[tokio::test]
async fn failed_enqueue_is_a_degraded_success() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    srv.dispatcher.set_failing(true);

    let job = create_job(&client, &srv, &user_token("alice"), json!({"x": 1})).await;
    assert_eq!(job["status"], "pending");
}

#[tokio::test]
async fn jobs_are_owner_scoped() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let alice = user_token("alice");
    let bob = user_token("bob");

    let job = create_job(&client, &srv, &alice, json!({"x": 1})).await;
    create_job(&client, &srv, &alice, json!({"x": 2})).await;
    create_job(&client, &srv, &bob, json!({"x": 3})).await;
    let id = job["id"].as_str().unwrap();

    let res = client
        .get(srv.url(&format!("/jobs/{id}")))
        .bearer_auth(&bob)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let list: Value = client
        .get(srv.url("/jobs?limit=1"))
        .bearer_auth(&alice)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(list["limit"], 1);
    assert_eq!(list["total"], 2);
    assert_eq!(list["offset"], 0);
    assert_eq!(list["items"].as_array().unwrap().len(), 1);
    assert_eq!(list["items"][0]["payload"], Value::Null);

    let stats: Value = client
        .get(srv.url("/jobs/stats"))
        .bearer_auth(&alice)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["queued"], 2);
    assert_eq!(stats["completed"], 0);

    let res = client
        .get(srv.url("/jobs?status=bogus"))
        .bearer_auth(&alice)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}
