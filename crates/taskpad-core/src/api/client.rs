//! API client for the remote task service.
//!
//! Every call is a single JSON round trip. Responses are normalized (see
//! `api::normalize`) before they are turned into model types, so callers
//! never see which backend flavour answered.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::{header, Client, Method};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::models::{
    AuthResponse, Credentials, ProtectedResponse, RegisterResponse, Registration, Task,
    TaskCreate, TaskStats, TaskUpdate, User, UserUpdate,
};

use super::normalize::{normalize_all, normalize_record};
use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// API client for the task service.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    /// Create a new API client for `base_url` (e.g. `https://host/api`)
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn clear_token(&mut self) {
        self.token = None;
    }

    /// Create a new ApiClient with the given token, sharing the connection pool.
    pub fn with_token(&self, token: impl Into<String>) -> Self {
        Self {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            token: Some(token.into()),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn auth_headers(&self) -> Result<header::HeaderMap> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );
        if let Some(ref token) = self.token {
            headers.insert(
                header::AUTHORIZATION,
                header::HeaderValue::from_str(&format!("Bearer {}", token))?,
            );
        }
        Ok(headers)
    }

    /// Returns Ok(Some(response)) for success, Ok(None) for rate limit (should retry),
    /// or Err for other errors.
    async fn check_response_for_retry(
        response: reqwest::Response,
    ) -> Result<Option<reqwest::Response>> {
        if response.status().is_success() {
            Ok(Some(response))
        } else if response.status().as_u16() == 429 {
            Ok(None)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body).into())
        }
    }

    /// Send one request and return its JSON body (`Null` for empty bodies).
    async fn request<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<Value> {
        let url = self.url(path);
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let mut builder = self
                .client
                .request(method.clone(), &url)
                .headers(self.auth_headers()?);
            if let Some(body) = body {
                builder = builder.json(body);
            }

            let response = builder
                .send()
                .await
                .map_err(ApiError::from)
                .with_context(|| format!("Failed to send {} request to {}", method, url))?;

            match Self::check_response_for_retry(response).await? {
                Some(response) => {
                    debug!(%method, url = %url, status = %response.status(), "Request complete");
                    let text = response
                        .text()
                        .await
                        .map_err(ApiError::from)
                        .with_context(|| format!("Failed to read response from {}", url))?;
                    return Ok(parse_body(&text));
                }
                None => {
                    retries += 1;
                    if retries > MAX_RATE_LIMIT_RETRIES {
                        return Err(ApiError::RateLimited.into());
                    }
                    warn!(
                        url = %url,
                        retry = retries,
                        backoff_ms = backoff_ms,
                        "Rate limited, backing off"
                    );
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2; // Exponential backoff
                }
            }
        }
    }

    async fn get(&self, path: &str) -> Result<Value> {
        self.request::<Value>(Method::GET, path, None).await
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<Value> {
        self.request(method, path, Some(body)).await
    }

    // ===== Auth =====

    /// Create an account. Some deployments log the user in straight away
    /// and include a token.
    pub async fn register(&self, registration: &Registration) -> Result<RegisterResponse> {
        let body = self.send(Method::POST, "/register", registration).await?;
        decode(normalize_nested_user(body)).context("Failed to parse register response")
    }

    /// Exchange credentials for a bearer token
    pub async fn login(&self, credentials: &Credentials) -> Result<AuthResponse> {
        let body = self.send(Method::POST, "/login", credentials).await?;
        decode(normalize_nested_user(body)).context("Failed to parse login response")
    }

    /// Ask the server whether the current token is accepted
    pub async fn check_protected(&self) -> Result<ProtectedResponse> {
        let body = self.get("/protected").await?;
        decode(normalize_nested_user(body)).context("Failed to parse protected response")
    }

    // ===== Tasks =====

    pub async fn fetch_tasks(&self) -> Result<Vec<Task>> {
        let body = self.get("/tasks").await?;
        parse_task_list(body)
    }

    pub async fn fetch_task(&self, task_id: &str) -> Result<Task> {
        let body = self.get(&task_path(task_id)?).await?;
        parse_task(body)
    }

    pub async fn create_task(&self, task: &TaskCreate) -> Result<Task> {
        let body = self.send(Method::POST, "/tasks", task).await?;
        parse_task(body)
    }

    /// Full update (PUT)
    pub async fn update_task(&self, task_id: &str, update: &TaskUpdate) -> Result<Task> {
        let body = self.send(Method::PUT, &task_path(task_id)?, update).await?;
        parse_task(body)
    }

    /// Partial update (PATCH)
    pub async fn patch_task(&self, task_id: &str, update: &TaskUpdate) -> Result<Task> {
        let body = self.send(Method::PATCH, &task_path(task_id)?, update).await?;
        parse_task(body)
    }

    pub async fn delete_task(&self, task_id: &str) -> Result<()> {
        self.request::<Value>(Method::DELETE, &task_path(task_id)?, None)
            .await?;
        Ok(())
    }

    pub async fn fetch_task_stats(&self) -> Result<TaskStats> {
        let body = self.get("/tasks/stats").await?;
        let stats = take_envelope(body, "stats");
        decode(stats).context("Failed to parse task stats")
    }

    // ===== Users =====

    pub async fn fetch_users(&self) -> Result<Vec<User>> {
        let body = self.get("/users").await?;
        parse_user_list(body)
    }

    pub async fn fetch_user(&self, user_id: &str) -> Result<User> {
        let body = self.get(&user_path(user_id)?).await?;
        parse_user(body)
    }

    pub async fn update_user(&self, user_id: &str, changes: &UserUpdate) -> Result<User> {
        let body = self.send(Method::PUT, &user_path(user_id)?, changes).await?;
        parse_user(body)
    }

    pub async fn delete_user(&self, user_id: &str) -> Result<()> {
        self.request::<Value>(Method::DELETE, &user_path(user_id)?, None)
            .await?;
        Ok(())
    }
}

// ============================================================================
// Response parsing
// ============================================================================

/// Empty and non-JSON bodies read as `Null`.
fn parse_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|e| {
        debug!(error = %e, "Response body is not JSON, ignoring");
        Value::Null
    })
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| ApiError::InvalidResponse(e.to_string()).into())
}

/// Unwrap `{"<key>": ...}` envelopes; bare payloads pass through.
fn take_envelope(body: Value, key: &str) -> Value {
    match body {
        Value::Object(mut obj) if obj.get(key).is_some_and(|v| v.is_object() || v.is_array()) => {
            obj.remove(key).unwrap_or(Value::Null)
        }
        other => other,
    }
}

fn normalize_nested_user(body: Value) -> Value {
    match body {
        Value::Object(mut obj) => {
            if let Some(user) = obj.remove("user") {
                obj.insert("user".to_string(), normalize_record(user));
            }
            Value::Object(obj)
        }
        other => other,
    }
}

fn parse_task(body: Value) -> Result<Task> {
    let record = normalize_record(take_envelope(body, "task"));
    decode(record).context("Failed to parse task")
}

fn parse_task_list(body: Value) -> Result<Vec<Task>> {
    let tasks = match take_envelope(body, "tasks") {
        list @ Value::Array(_) => list,
        other => bail!(ApiError::InvalidResponse(format!(
            "expected a task list, got {}",
            json_kind(&other)
        ))),
    };
    decode(normalize_all(tasks)).context("Failed to parse task list")
}

fn parse_user_list(body: Value) -> Result<Vec<User>> {
    let users = match take_envelope(body, "users") {
        list @ Value::Array(_) => list,
        other => bail!(ApiError::InvalidResponse(format!(
            "expected a user list, got {}",
            json_kind(&other)
        ))),
    };
    decode(normalize_all(users)).context("Failed to parse user list")
}

fn parse_user(body: Value) -> Result<User> {
    let record = normalize_record(take_envelope(body, "user"));
    decode(record).context("Failed to parse user")
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "nothing",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

/// Identifiers come from the server; refuse anything that would change the
/// shape of the URL.
fn path_segment(id: &str) -> Result<&str> {
    let id = id.trim();
    if id.is_empty() {
        bail!("Identifier must not be empty");
    }
    if id.contains(['/', '?', '#', '%']) || id.chars().any(char::is_whitespace) {
        bail!("Invalid identifier: {:?}", id);
    }
    Ok(id)
}

fn task_path(task_id: &str) -> Result<String> {
    Ok(format!("/tasks/{}", path_segment(task_id)?))
}

fn user_path(user_id: &str) -> Result<String> {
    Ok(format!("/users/{}", path_segment(user_id)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TaskStatus;
    use serde_json::json;

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let client = ApiClient::new("https://example.com/api/").unwrap();
        assert_eq!(client.base_url(), "https://example.com/api");
        assert_eq!(client.url("/tasks"), "https://example.com/api/tasks");
    }

    #[test]
    fn test_auth_headers() {
        let client = ApiClient::new("https://example.com").unwrap();
        assert!(client.auth_headers().unwrap().get(header::AUTHORIZATION).is_none());

        let client = client.with_token("abc");
        let headers = client.auth_headers().unwrap();
        assert_eq!(headers[header::AUTHORIZATION], "Bearer abc");

        let mut client = client;
        client.clear_token();
        assert!(client.auth_headers().unwrap().get(header::AUTHORIZATION).is_none());
    }

    #[test]
    fn test_parse_task_list_from_both_backends() {
        let body = json!({
            "message": "ok",
            "count": 2,
            "tasks": [
                {"_id": "65f0", "title": "Mongo task", "userId": "u1", "createdAt": "2024-01-01"},
                {
                    "id": 7,
                    "title": "Postgres task",
                    "user_id": 3,
                    "created_at": "2024-01-02",
                    "completed": true,
                },
            ]
        });

        let tasks = parse_task_list(body).unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].id, "65f0");
        assert_eq!(tasks[0].user_id.as_deref(), Some("u1"));
        assert_eq!(tasks[1].id, "7");
        assert_eq!(tasks[1].user_id.as_deref(), Some("3"));
        assert_eq!(tasks[1].created_at.as_deref(), Some("2024-01-02"));
        assert!(tasks[1].is_done());
    }

    #[test]
    fn test_parse_task_list_accepts_bare_array() {
        let tasks = parse_task_list(json!([{"id": "1", "title": "x"}])).unwrap();
        assert_eq!(tasks[0].id, "1");
    }

    #[test]
    fn test_parse_task_list_rejects_other_shapes() {
        let err = parse_task_list(json!({"message": "nope"})).unwrap_err();
        assert!(err.to_string().contains("expected a task list, got an object"));
        assert!(parse_task_list(Value::Null).is_err());
    }

    #[test]
    fn test_parse_task_enveloped_or_bare() {
        let task =
            parse_task(json!({"task": {"id": 1, "title": "x", "status": "completed"}})).unwrap();
        assert_eq!(task.id, "1");
        assert_eq!(task.status, Some(TaskStatus::Completed));

        let task = parse_task(json!({"_id": "a", "title": "y"})).unwrap();
        assert_eq!(task.id, "a");
    }

    #[test]
    fn test_parse_task_without_title_fails() {
        assert!(parse_task(json!({"_id": "a"})).is_err());
    }

    #[test]
    fn test_stats_envelope() {
        let body = json!({"stats": {"total": 3, "completed": 1, "pending": 2}});
        let stats: TaskStats = decode(take_envelope(body, "stats")).unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.pending, 2);
    }

    #[test]
    fn test_nested_user_is_normalized() {
        let body = normalize_nested_user(json!({
            "token": "t",
            "user": {"id": 5, "name": "Ada", "email": "a@b.c", "created_at": "2024-01-01"},
        }));
        let resp: AuthResponse = decode(body).unwrap();
        let user = resp.user.unwrap();
        assert_eq!(user.id, "5");
        assert_eq!(user.created_at.as_deref(), Some("2024-01-01"));
    }

    #[test]
    fn test_parse_user_list_enveloped_or_bare() {
        let users = parse_user_list(json!({
            "users": [
                {"_id": "65f0", "name": "Ada", "email": "ada@example.com"},
                {"id": 2, "username": "grace", "created_at": "2024-01-02"},
            ]
        }))
        .unwrap();
        assert_eq!(users.len(), 2);
        assert_eq!(users[0].id, "65f0");
        assert_eq!(users[1].id, "2");
        assert_eq!(users[1].name, "grace");
        assert_eq!(users[1].created_at.as_deref(), Some("2024-01-02"));

        let users = parse_user_list(json!([{"id": "u1", "name": "Ada"}])).unwrap();
        assert_eq!(users[0].id, "u1");

        let err = parse_user_list(json!({"message": "nope"})).unwrap_err();
        assert!(err.to_string().contains("expected a user list, got an object"));
    }

    #[test]
    fn test_parse_user_enveloped_or_bare() {
        let user = parse_user(json!({"user": {"id": 5, "name": "Ada", "updated_at": "2024-02-01"}}))
            .unwrap();
        assert_eq!(user.id, "5");
        assert_eq!(user.updated_at.as_deref(), Some("2024-02-01"));

        let user = parse_user(json!({"_id": "u1", "email": "a@b.c"})).unwrap();
        assert_eq!(user.id, "u1");
        assert_eq!(user.email, "a@b.c");
    }

    #[test]
    fn test_user_update_body() {
        let update = UserUpdate {
            name: Some("Ada L".to_string()),
            ..Default::default()
        };
        assert_eq!(serde_json::to_value(&update).unwrap(), json!({"name": "Ada L"}));
        assert!(UserUpdate::default().is_empty());
    }

    #[test]
    fn test_parse_body() {
        assert_eq!(parse_body(""), Value::Null);
        assert_eq!(parse_body("  \n"), Value::Null);
        assert_eq!(parse_body("<html>"), Value::Null);
        assert_eq!(parse_body(r#"{"a":1}"#), json!({"a": 1}));
    }

    #[test]
    fn test_paths_reject_unsafe_ids() {
        assert_eq!(task_path("65f0a1").unwrap(), "/tasks/65f0a1");
        assert_eq!(user_path(" 7 ").unwrap(), "/users/7");
        assert!(task_path("").is_err());
        assert!(task_path("../users").is_err());
        assert!(task_path("a?b").is_err());
        assert!(task_path("a b").is_err());
    }
}
