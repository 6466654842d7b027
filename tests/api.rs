use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
    response::Response,
};
use serde_json::{Value, json};
use tower::ServiceExt;
use trendtap::{
    AppState, cache::MemoryStore, config::Config, create_router, utils::SystemClock,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct TestApp {
    router: Router,
    state: AppState,
}

fn test_app(extra: &[(&str, &str)]) -> TestApp {
    let mut vars: HashMap<String, String> = [
        ("REDIS_URL", "memory://"),
        ("JWT_SECRET", "integration-secret"),
        ("RETRY_MAX_RETRIES", "0"),
        ("RETRY_BASE_DELAY_MS", "1"),
        ("INTEGRATION_TIMEOUT_SECS", "5"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    for (k, v) in extra {
        vars.insert(k.to_string(), v.to_string());
    }

    let config = Config::from_vars(|key| vars.get(key).cloned()).unwrap();
    let state = AppState::new(config, Arc::new(MemoryStore::new()), Arc::new(SystemClock)).unwrap();
    TestApp {
        router: create_router(state.clone()),
        state,
    }
}

impl TestApp {
    fn token(&self, user_id: &str) -> String {
        self.state.jwt.generate_token(user_id).unwrap().0
    }

    async fn send(&self, req: Request<Body>) -> Response {
        self.router.clone().oneshot(req).await.unwrap()
    }
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

fn post_json(uri: &str, token: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_is_public() {
    let app = test_app(&[]);
    let response = app.send(get("/api/health", None)).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    assert!(response.headers().contains_key("x-ratelimit-limit"));
    let body = body_json(response).await;
    assert_eq!(body["code"], 0);
    assert_eq!(body["resp_data"]["status"], "ok");
    assert_eq!(body["resp_data"]["store"], "up");
    assert_eq!(body["resp_data"]["circuit_breaker"]["state"], "closed");
}

#[tokio::test]
async fn missing_token_is_rejected_with_request_id() {
    let app = test_app(&[]);
    let response = app.send(get("/api/auth/check-token", None)).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let request_id = response.headers()["x-request-id"]
        .to_str()
        .unwrap()
        .to_string();
    let body = body_json(response).await;
    assert_eq!(body["code"], "E002");
    assert_eq!(body["request_id"], request_id.as_str());
}

#[tokio::test]
async fn garbage_token_is_rejected() {
    let app = test_app(&[]);
    let response = app.send(get("/api/auth/check-token", Some("not-a-jwt"))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["code"], "E002");
}

#[tokio::test]
async fn check_token_returns_claims() {
    let app = test_app(&[]);
    let token = app.token("alice");

    let response = app.send(get("/api/auth/check-token", Some(&token))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["resp_data"]["user_id"], "alice");
    assert!(body["resp_data"]["expires_at"].as_i64().unwrap() > 0);
}

#[tokio::test]
async fn token_is_unusable_after_logout() {
    let app = test_app(&[]);
    let token = app.token("alice");

    // Warm the validation cache first.
    let response = app.send(get("/api/auth/check-token", Some(&token))).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .send(post_json("/api/auth/logout", &token, json!({})))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.send(get("/api/auth/check-token", Some(&token))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["code"], "E002");
}

#[tokio::test]
async fn logout_all_revokes_every_session() {
    let app = test_app(&[]);
    let laptop = app.token("alice");
    let phone = app.token("alice");
    let other_user = app.token("bob");

    for token in [&laptop, &phone] {
        let response = app.send(get("/api/auth/check-token", Some(token))).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .send(post_json("/api/auth/logout-all", &laptop, json!({})))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["resp_data"]["sessions_cleared"], 2);

    let response = app.send(get("/api/auth/check-token", Some(&phone))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let response = app.send(get("/api/auth/check-token", Some(&other_user))).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn refresh_issues_a_working_token() {
    let app = test_app(&[]);
    let token = app.token("alice");

    let response = app
        .send(post_json("/api/auth/refresh-token", &token, json!({})))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let fresh = body["resp_data"]["token"].as_str().unwrap().to_string();
    assert_ne!(fresh, token);

    let response = app.send(get("/api/auth/check-token", Some(&fresh))).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn exceeding_the_limit_returns_429() {
    let app = test_app(&[("RATE_LIMIT_RULES", "/api/health=sliding_window:2:60")]);

    for remaining in ["1", "0"] {
        let response = app.send(get("/api/health", None)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-ratelimit-limit"], "2");
        assert_eq!(response.headers()["x-ratelimit-remaining"], remaining);
    }

    let response = app.send(get("/api/health", None)).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = response.headers()[header::RETRY_AFTER]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!((1..=60).contains(&retry_after));
    let body = body_json(response).await;
    assert_eq!(body["code"], "E005");
    assert!(body["request_id"].is_string());

    // Other clients are counted separately.
    let req = Request::builder()
        .uri("/api/health")
        .header("x-real-ip", "203.0.113.9")
        .body(Body::empty())
        .unwrap();
    assert_eq!(app.send(req).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn related_keywords_degrades_per_seed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v3/dataforseo_labs/google/related_keywords/live"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status_code": 20000,
            "status_message": "Ok.",
            "tasks": [{
                "status_code": 20000,
                "status_message": "Ok.",
                "result": [{ "items": [
                    { "keyword_data": { "keyword": "cold brew", "keyword_info": {
                        "search_volume": 1000, "cpc": 0.5, "competition": 0.2 } } }
                ] }]
            }]
        })))
        .mount(&server)
        .await;

    let uri = server.uri();
    let app = test_app(&[
        ("DATAFORSEO_LOGIN", "login"),
        ("DATAFORSEO_PASSWORD", "password"),
        ("DATAFORSEO_BASE_URL", uri.as_str()),
    ]);
    let token = app.token("alice");

    let response = app
        .send(post_json(
            "/api/keywords/related",
            &token,
            json!({ "keywords": ["coffee", "tea"], "limit": 5 }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let results = body["resp_data"]["results"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["seed"], "coffee");
    assert_eq!(results[0]["status"], "ok");
    assert_eq!(results[0]["keywords"][0]["keyword"], "cold brew");
}

#[tokio::test]
async fn related_keywords_reports_upstream_failure_inline() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let uri = server.uri();
    let app = test_app(&[
        ("DATAFORSEO_LOGIN", "login"),
        ("DATAFORSEO_PASSWORD", "password"),
        ("DATAFORSEO_BASE_URL", uri.as_str()),
    ]);
    let token = app.token("alice");

    let response = app
        .send(post_json(
            "/api/keywords/related",
            &token,
            json!({ "keywords": ["coffee"] }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let entry = &body["resp_data"]["results"][0];
    assert_eq!(entry["status"], "failed");
    assert_eq!(entry["keywords"], json!([]));
    assert!(entry["error"].as_str().unwrap().contains("500"));
}

#[tokio::test]
async fn related_keywords_validates_input() {
    let app = test_app(&[]);
    let token = app.token("alice");

    let response = app
        .send(post_json(
            "/api/keywords/related",
            &token,
            json!({ "keywords": [] }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(response).await;
    assert_eq!(body["code"], "E001");
    assert!(body["request_id"].is_string());

    let response = app
        .send(post_json(
            "/api/keywords/related",
            &token,
            json!({ "keywords": "coffee" }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}
