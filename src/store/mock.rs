//! In-process stand-in for the Supabase REST and auth endpoints, for tests

use std::sync::{Arc, Mutex};

use axum::{
    body::{to_bytes, Body, Bytes},
    extract::State,
    http::{HeaderMap, HeaderValue, Method, Request, StatusCode, Uri},
    response::{IntoResponse, Json, Response},
    Router,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower::ServiceExt;
use uuid::Uuid;

use crate::app::AppState;
use crate::config::Config;
use crate::http::build_router;
use crate::http::middleware::tests::sign;

pub const TEST_JWT_SECRET: &str = "mock-jwt-secret";

const CREATED_AT: &str = "2024-05-01T08:00:00Z";
const DEADLINE: &str = "2024-05-15T08:00:00Z";

/// One request seen by the mock
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: Method,
    pub path: String,
    pub query: String,
    pub body: Value,
}

struct Rule {
    method: Method,
    path: String,
    query: Vec<String>,
    counting: bool,
    status: StatusCode,
    body: Value,
    content_range: Option<String>,
}

#[derive(Default)]
struct Shared {
    rules: Vec<Rule>,
    log: Vec<Recorded>,
}

/// Canned replies keyed on method, path and query fragments.
/// Unmatched requests get what an empty database would return.
#[derive(Clone)]
pub struct MockSupabase {
    url: String,
    shared: Arc<Mutex<Shared>>,
}

impl MockSupabase {
    pub async fn start() -> Self {
        let shared = Arc::new(Mutex::new(Shared::default()));
        let app = Router::new().fallback(respond).with_state(shared.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self {
            url: format!("http://{}", addr),
            shared,
        }
    }

    /// Reply to requests whose query contains every fragment; earlier rules win
    pub fn on(&self, method: Method, path: &str, query: &[&str], status: u16, body: Value) -> &Self {
        self.push(Rule {
            method,
            path: path.to_string(),
            query: query.iter().map(|q| q.to_string()).collect(),
            counting: false,
            status: StatusCode::from_u16(status).unwrap(),
            body,
            content_range: None,
        })
    }

    /// Exact-count reply for `Prefer: count=exact` requests
    pub fn count(&self, path: &str, query: &[&str], total: u64) -> &Self {
        self.push(Rule {
            method: Method::GET,
            path: path.to_string(),
            query: query.iter().map(|q| q.to_string()).collect(),
            counting: true,
            status: StatusCode::OK,
            body: json!([]),
            content_range: Some(if total == 0 {
                "*/0".to_string()
            } else {
                format!("0-0/{}", total)
            }),
        })
    }

    fn push(&self, rule: Rule) -> &Self {
        self.shared.lock().unwrap().rules.push(rule);
        self
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.shared.lock().unwrap().log.clone()
    }

    pub fn requests_to(&self, method: Method, path: &str) -> Vec<Recorded> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == method && r.path == path)
            .collect()
    }

    /// Application state wired to this mock, verifying tokens with `TEST_JWT_SECRET`
    pub fn state(&self) -> AppState {
        let url = self.url.clone();
        let config = Config::from_lookup(move |key| match key {
            "SUPABASE_URL" => Some(url.clone()),
            "SUPABASE_ANON_KEY" => Some("anon".to_string()),
            "SUPABASE_SERVICE_ROLE_KEY" => Some("service".to_string()),
            "SUPABASE_JWT_SECRET" => Some(TEST_JWT_SECRET.to_string()),
            _ => None,
        })
        .unwrap();
        AppState::new(config)
    }
}

async fn respond(
    State(shared): State<Arc<Mutex<Shared>>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = uri.path().to_string();
    let query = uri.query().unwrap_or_default().to_string();
    let counting = header_has(&headers, "prefer", "count=exact");
    let single = header_has(&headers, "accept", "vnd.pgrst.object");
    let returning = header_has(&headers, "prefer", "return=representation");

    let mut shared = shared.lock().unwrap();
    shared.log.push(Recorded {
        method: method.clone(),
        path: path.clone(),
        query: query.clone(),
        body: serde_json::from_slice(&body).unwrap_or(Value::Null),
    });

    let rule = shared.rules.iter().find(|rule| {
        rule.method == method
            && rule.path == path
            && rule.counting == counting
            && rule.query.iter().all(|part| query.contains(part.as_str()))
    });
    if let Some(rule) = rule {
        let mut response = if rule.body.is_null() {
            rule.status.into_response()
        } else {
            (rule.status, Json(rule.body.clone())).into_response()
        };
        if let Some(range) = &rule.content_range {
            response
                .headers_mut()
                .insert("Content-Range", HeaderValue::from_str(range).unwrap());
        }
        return response;
    }

    if counting {
        return (StatusCode::OK, [("Content-Range", "*/0")], Json(json!([]))).into_response();
    }
    if method == Method::GET && single {
        return StatusCode::NOT_ACCEPTABLE.into_response();
    }
    if method == Method::PATCH && !returning {
        return StatusCode::NO_CONTENT.into_response();
    }
    if method == Method::POST {
        return (StatusCode::CREATED, Json(json!([]))).into_response();
    }
    Json(json!([])).into_response()
}

fn header_has(headers: &HeaderMap, name: &str, needle: &str) -> bool {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains(needle))
}

/// `Authorization` value for a user, signed with `TEST_JWT_SECRET`
pub fn bearer(user_id: Uuid) -> String {
    let token = sign(
        &json!({"sub": user_id, "exp": 4_000_000_000u64, "email": "user@example.org"}),
        TEST_JWT_SECRET,
    );
    format!("Bearer {}", token)
}

/// Send one request through the full router
pub async fn call(
    state: AppState,
    method: Method,
    uri: &str,
    caller: Option<Uuid>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(id) = caller {
        builder = builder.header("Authorization", bearer(id));
    }
    let body = match body {
        Some(value) => {
            builder = builder.header("Content-Type", "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };

    let response = build_router(state)
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

pub fn profile(id: Uuid, role: &str, civic_points: i64) -> Value {
    json!({
        "id": id,
        "display_name": format!("{} {}", role, &id.to_string()[..8]),
        "role": role,
        "verified": role == "politician",
        "mu": 25.0,
        "sigma": 8.333,
        "civic_points": civic_points,
        "created_at": CREATED_AT
    })
}

pub fn question(id: Uuid, citizen_id: Uuid, politician_id: Uuid, status: &str, bounty: i64) -> Value {
    json!({
        "id": id,
        "title": "Why were the bus lanes removed?",
        "body": "The council voted for them last spring.",
        "citizen_id": citizen_id,
        "target_politician_id": politician_id,
        "total_bounty": bounty,
        "status": status,
        "ai_directness_score": null,
        "created_at": CREATED_AT,
        "deadline": DEADLINE
    })
}

pub fn escrow(id: Uuid, citizen_id: Uuid, question_id: Uuid, amount: i64, status: &str) -> Value {
    json!({
        "id": id,
        "citizen_id": citizen_id,
        "question_id": question_id,
        "amount": amount,
        "status": status,
        "charity_id": null,
        "released_at": null,
        "created_at": CREATED_AT
    })
}

pub fn answer(id: Uuid, question_id: Uuid, politician_id: Uuid, directness: f64) -> Value {
    json!({
        "id": id,
        "question_id": question_id,
        "politician_id": politician_id,
        "content": "They are coming back in March.",
        "video_url": null,
        "ai_analysis": {"directness_score": directness, "summary": "Scored", "flags": []},
        "created_at": "2024-05-02T08:00:00Z"
    })
}

pub fn vote(id: Uuid, answer_id: Uuid, citizen_id: Uuid, is_helpful: bool) -> Value {
    json!({
        "id": id,
        "answer_id": answer_id,
        "citizen_id": citizen_id,
        "is_helpful": is_helpful,
        "created_at": "2024-05-03T08:00:00Z"
    })
}
