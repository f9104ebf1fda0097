//! REST adapter for the event store (PostgREST-style query interface).
//!
//! Filters are rendered as `column=eq.value`, rows are JSON objects in the
//! camelCase wire shape. Every call goes through the retry policy, and
//! transport errors are translated into the crate taxonomy here so callers
//! never see raw `reqwest` failures.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde_json::Value;
use tracing::debug;

use super::retry::RetryPolicy;
use super::traits::EventStore;
use crate::domain::{Resource, RowFilter};
use crate::error::{CourtsideError, Result};

/// Error codes the store uses for a missing table
const MISSING_RELATION_CODES: [&str; 2] = ["42P01", "PGRST205"];

#[derive(Clone)]
pub struct RestEventStore {
    http: Client,
    base_url: String,
    retry: RetryPolicy,
}

impl RestEventStore {
    pub fn new(base_url: &str, api_key: Option<&str>, retry: RetryPolicy) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = api_key {
            let key_value = HeaderValue::from_str(key)
                .map_err(|e| CourtsideError::Validation(format!("invalid api key: {e}")))?;
            let bearer = HeaderValue::from_str(&format!("Bearer {key}"))
                .map_err(|e| CourtsideError::Validation(format!("invalid api key: {e}")))?;
            headers.insert(HeaderName::from_static("apikey"), key_value);
            headers.insert(AUTHORIZATION, bearer);
        }

        let http = Client::builder()
            .user_agent(concat!("courtside/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .timeout(retry.attempt_timeout)
            .build()
            .map_err(|e| CourtsideError::Internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            retry,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, resource: Resource) -> String {
        format!("{}/{}", self.base_url, resource.table())
    }

    fn request(&self, method: Method, resource: Resource) -> RequestBuilder {
        self.http.request(method, self.url(resource))
    }

    /// Send once and translate the outcome.
    async fn send(resource: Resource, builder: RequestBuilder) -> Result<Value> {
        let response = builder.send().await.map_err(translate_transport_error)?;
        let status = response.status();
        let body = response.text().await.map_err(translate_transport_error)?;

        if status.is_success() {
            if body.trim().is_empty() {
                return Ok(Value::Array(Vec::new()));
            }
            return Ok(serde_json::from_str(&body)?);
        }

        Err(translate_status(resource, status, &body))
    }

    async fn rows_or_not_found(
        &self,
        operation: &str,
        resource: Resource,
        id: &str,
        make: impl Fn() -> RequestBuilder,
    ) -> Result<()> {
        let value = self
            .retry
            .run(operation, || Self::send(resource, make()))
            .await?;

        match value {
            Value::Array(rows) if rows.is_empty() => {
                Err(CourtsideError::EventNotFound(format!("{resource}/{id}")))
            }
            _ => Ok(()),
        }
    }
}

fn translate_transport_error(e: reqwest::Error) -> CourtsideError {
    let status = e.status().map(|s| s.as_u16());
    let message = if e.is_timeout() {
        format!("timed out: {e}")
    } else if e.is_connect() {
        format!("connection failed: {e}")
    } else {
        e.to_string()
    };
    CourtsideError::request(status, message)
}

fn translate_status(resource: Resource, status: StatusCode, body: &str) -> CourtsideError {
    let code = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("code").and_then(Value::as_str).map(str::to_string));

    let missing_relation = code
        .as_deref()
        .map(|c| MISSING_RELATION_CODES.contains(&c))
        .unwrap_or(false);

    if status == StatusCode::NOT_FOUND || missing_relation {
        return CourtsideError::ResourceAbsent(resource.table().to_string());
    }

    let snippet: String = body.chars().take(200).collect();
    CourtsideError::request(Some(status.as_u16()), snippet)
}

#[async_trait]
impl EventStore for RestEventStore {
    async fn fetch_rows(&self, resource: Resource, filter: &RowFilter) -> Result<Vec<Value>> {
        let (column, expr) = filter.query_pair();
        let mut query = vec![(column, expr), ("select".to_string(), "*".to_string())];
        if resource != Resource::GameRosters {
            query.push(("order".to_string(), "createdAt.asc,id.asc".to_string()));
        }

        let value = self
            .retry
            .run(&format!("fetch {resource}"), || {
                Self::send(resource, self.request(Method::GET, resource).query(&query))
            })
            .await?;

        match value {
            Value::Array(rows) => {
                debug!("Fetched {} {} rows ({})", rows.len(), resource, filter.expression());
                Ok(rows)
            }
            other => Err(CourtsideError::DataInconsistency(format!(
                "expected an array of {resource} rows, got {other}"
            ))),
        }
    }

    async fn insert_row(&self, resource: Resource, row: Value) -> Result<Value> {
        let value = self
            .retry
            .run(&format!("insert {resource}"), || {
                Self::send(
                    resource,
                    self.request(Method::POST, resource)
                        .header("Prefer", "return=representation")
                        .json(&row),
                )
            })
            .await?;

        match value {
            Value::Array(mut rows) if !rows.is_empty() => Ok(rows.swap_remove(0)),
            Value::Object(_) => Ok(value),
            _ => Ok(row),
        }
    }

    async fn update_row(&self, resource: Resource, id: &str, patch: Value) -> Result<()> {
        let query = [("id".to_string(), format!("eq.{id}"))];
        self.rows_or_not_found(&format!("update {resource}"), resource, id, || {
            self.request(Method::PATCH, resource)
                .query(&query)
                .header("Prefer", "return=representation")
                .json(&patch)
        })
        .await
    }

    async fn delete_row(&self, resource: Resource, id: &str) -> Result<()> {
        let query = [("id".to_string(), format!("eq.{id}"))];
        self.rows_or_not_found(&format!("delete {resource}"), resource, id, || {
            self.request(Method::DELETE, resource)
                .query(&query)
                .header("Prefer", "return=representation")
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_table_is_resource_absent() {
        let err = translate_status(
            Resource::GameRosters,
            StatusCode::NOT_FOUND,
            r#"{"code":"42P01","message":"relation does not exist"}"#,
        );
        assert!(err.is_resource_absent());

        let err = translate_status(
            Resource::GameRosters,
            StatusCode::BAD_REQUEST,
            r#"{"code":"PGRST205","message":"Could not find the table"}"#,
        );
        assert!(err.is_resource_absent());
    }

    #[test]
    fn test_server_error_is_retryable_request_error() {
        let err = translate_status(Resource::GameEvents, StatusCode::BAD_GATEWAY, "upstream down");
        assert!(matches!(err, CourtsideError::Request { status: Some(502), .. }));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_client_error_is_final() {
        let err = translate_status(
            Resource::GameEvents,
            StatusCode::UNPROCESSABLE_ENTITY,
            r#"{"code":"22P02","message":"invalid input"}"#,
        );
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let store = RestEventStore::new(
            "http://localhost:54321/rest/v1/",
            Some("anon-key"),
            RetryPolicy::default(),
        )
        .unwrap();
        assert_eq!(store.base_url(), "http://localhost:54321/rest/v1");
        assert_eq!(
            store.url(Resource::Substitutions),
            "http://localhost:54321/rest/v1/substitutions"
        );
    }
}
