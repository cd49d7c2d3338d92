//! HTTP API tests driven through the router without a listener.

mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use tower::ServiceExt;

use ara_delivery_engine::auth::{Claims, ROLE_DELIVERY_ADMIN, ROLE_DELIVERY_SUBMIT};
use ara_delivery_engine::config::{
    DeliverySettings, JwtConfig, OtelConfig, ServerConfig, Settings, ShutdownSettings, SmtpConfig,
    TemplateSettings,
};
use ara_delivery_engine::server::{create_app, AppState};
use ara_delivery_engine::template::TemplateStore;

use common::{create_test_environment, FakeSender, TestEnvironment};

const SECRET: &str = "http-api-test-secret";

fn settings() -> Settings {
    Settings {
        server: ServerConfig::default(),
        jwt: JwtConfig {
            secret: SECRET.to_string(),
            issuer: None,
            audience: None,
        },
        delivery: DeliverySettings::default(),
        smtp: SmtpConfig::default(),
        templates: TemplateSettings::default(),
        otel: OtelConfig::default(),
        shutdown: ShutdownSettings::default(),
    }
}

fn token(roles: &[&str]) -> String {
    let now = chrono::Utc::now().timestamp();
    let claims = Claims {
        sub: "checkout-service".to_string(),
        exp: now + 300,
        iat: now,
        roles: roles.iter().map(|r| r.to_string()).collect(),
        extra: Default::default(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

fn setup() -> (Router, TestEnvironment) {
    let env = create_test_environment(FakeSender::new(), 3, Duration::from_secs(30));
    let state = AppState::new(
        settings(),
        env.engine.clone(),
        Arc::new(TemplateStore::with_builtin()),
    );
    (create_app(state), env)
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn test_health_is_public() {
    let (app, _env) = setup();

    let (status, body) = send(&app, Method::GET, "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    // workers are not started in this environment
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["templates"], 7);
    assert_eq!(body["engine"]["queue"]["pending"], 0);
}

#[tokio::test]
async fn test_api_requires_token() {
    let (app, _env) = setup();

    let (status, body) = send(&app, Method::GET, "/api/v1/templates", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    let (status, _) = send(&app, Method::GET, "/api/v1/templates", Some("not-a-jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_wrong_role_is_forbidden() {
    let (app, _env) = setup();
    let submitter = token(&[ROLE_DELIVERY_SUBMIT]);

    let (status, body) = send(&app, Method::GET, "/api/v1/dead-letters", Some(&submitter), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "FORBIDDEN");

    let operator = token(&[ROLE_DELIVERY_ADMIN]);
    let (status, _) = send(
        &app,
        Method::POST,
        "/api/v1/deliveries",
        Some(&operator),
        Some(json!({"recipient": "a@x.com", "template_id": "welcome"})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_submit_deduplicates_and_reports_status() {
    let (app, env) = setup();
    let submitter = token(&[ROLE_DELIVERY_SUBMIT]);
    let body = json!({
        "recipient": "a@x.com",
        "template_id": "activation-code",
        "context": {"code": "123456", "expires_minutes": 10},
        "dedup_key": "activation:42"
    });

    let (status, first) = send(&app, Method::POST, "/api/v1/deliveries", Some(&submitter), Some(body.clone())).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(first["deduplicated"], false);

    let (status, second) = send(&app, Method::POST, "/api/v1/deliveries", Some(&submitter), Some(body)).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(second["deduplicated"], true);
    assert_eq!(second["job_id"], first["job_id"]);

    let uri = format!("/api/v1/deliveries/{}", first["job_id"].as_str().unwrap());
    let (status, pending) = send(&app, Method::GET, &uri, Some(&submitter), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(pending["state"], "pending");

    env.engine.process_once().await.unwrap();

    let (_, delivered) = send(&app, Method::GET, &uri, Some(&submitter), None).await;
    assert_eq!(delivered["state"], "delivered");
    assert_eq!(delivered["dedup_key"], "activation:42");
    assert_eq!(env.sender.sent().len(), 1);
}

#[tokio::test]
async fn test_submit_rejects_invalid_request() {
    let (app, _env) = setup();
    let submitter = token(&[ROLE_DELIVERY_SUBMIT]);

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/deliveries",
        Some(&submitter),
        Some(json!({"recipient": "", "template_id": "welcome"})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_unknown_delivery_is_not_found() {
    let (app, _env) = setup();
    let submitter = token(&[ROLE_DELIVERY_SUBMIT]);

    let uri = format!("/api/v1/deliveries/{}", uuid::Uuid::new_v4());
    let (status, body) = send(&app, Method::GET, &uri, Some(&submitter), None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_cancel_pending_delivery() {
    let (app, env) = setup();
    let submitter = token(&[ROLE_DELIVERY_SUBMIT]);

    let (_, submitted) = send(
        &app,
        Method::POST,
        "/api/v1/deliveries",
        Some(&submitter),
        Some(json!({"recipient": "a@x.com", "template_id": "welcome"})),
    )
    .await;
    let uri = format!("/api/v1/deliveries/{}", submitted["job_id"].as_str().unwrap());

    let (status, cancelled) = send(&app, Method::DELETE, &uri, Some(&submitter), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["state"], "cancelled");

    let (status, _) = send(&app, Method::DELETE, &uri, Some(&submitter), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    assert!(env.engine.process_once().await.unwrap().is_empty());
    assert_eq!(env.sender.attempts(), 0);
}

#[tokio::test]
async fn test_dead_letter_listing_and_redrive() {
    let (app, env) = setup();
    let submitter = token(&[ROLE_DELIVERY_SUBMIT]);
    let operator = token(&[ROLE_DELIVERY_ADMIN]);

    let (_, submitted) = send(
        &app,
        Method::POST,
        "/api/v1/deliveries",
        Some(&submitter),
        Some(json!({"recipient": "a@x.com", "template_id": "password-reset"})),
    )
    .await;
    let job_id = submitted["job_id"].as_str().unwrap().to_string();

    // missing `code` is a permanent render failure
    env.engine.process_once().await.unwrap();

    let (status, listed) = send(&app, Method::GET, "/api/v1/dead-letters?kind=permanent", Some(&operator), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed["total"], 1);
    assert_eq!(listed["dead_letters"][0]["request"]["id"], job_id.as_str());

    let (status, _) = send(&app, Method::GET, "/api/v1/dead-letters?kind=transient", Some(&operator), None).await;
    assert_eq!(status, StatusCode::OK);

    let uri = format!("/api/v1/dead-letters/{}/redrive", job_id);
    let (status, redriven) = send(&app, Method::POST, &uri, Some(&operator), None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(redriven["redriven_from"], job_id.as_str());
    assert_ne!(redriven["job_id"], job_id.as_str());

    let (status, _) = send(&app, Method::POST, &uri, Some(&operator), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, listed) = send(&app, Method::GET, "/api/v1/dead-letters", Some(&operator), None).await;
    assert_eq!(listed["total"], 0);
}

#[tokio::test]
async fn test_list_templates() {
    let (app, _env) = setup();
    let submitter = token(&[ROLE_DELIVERY_SUBMIT]);

    let (status, body) = send(&app, Method::GET, "/api/v1/templates", Some(&submitter), None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 7);
    let ids: Vec<&str> = body["templates"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["id"].as_str().unwrap())
        .collect();
    assert!(ids.contains(&"invoice"));
    assert!(ids.contains(&"welcome"));
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let (app, _env) = setup();

    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/plain"));

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("ara_delivery_jobs_pending"));
}
