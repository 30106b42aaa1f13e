use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};

use crate::result::{QueryResult, StatementResponse, server_error};
use crate::transport::Transport;
use crate::{Error, Result};

const STATEMENTS_PATH: &str = "/api/v2/statements";

/// One SQL statement to run, with its target warehouse and namespace.
///
/// `timeout` is enforced by Snowflake. `fetch_timeout` bounds only the
/// submission HTTP call made by this client.
#[derive(Debug, Clone)]
pub struct StatementRequest {
    statement: String,
    warehouse: String,
    database: Option<String>,
    schema: Option<String>,
    role: Option<String>,
    timeout: Duration,
    fetch_timeout: Duration,
    bindings: BTreeMap<String, Binding>,
}

impl StatementRequest {
    pub fn new(statement: impl Into<String>, warehouse: impl Into<String>) -> Self {
        Self {
            statement: statement.into(),
            warehouse: warehouse.into(),
            database: None,
            schema: None,
            role: None,
            timeout: Duration::from_secs(60),
            fetch_timeout: Duration::from_secs(10),
            bindings: BTreeMap::new(),
        }
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    /// Server-side execution limit. Rounded down to whole seconds on the wire.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_fetch_timeout(mut self, fetch_timeout: Duration) -> Self {
        self.fetch_timeout = fetch_timeout;
        self
    }

    /// Bind the next `?` placeholder. Placeholders are numbered from 1 in call order.
    pub fn with_binding(mut self, binding_type: BindingType, value: Option<String>) -> Self {
        let position = (self.bindings.len() + 1).to_string();
        self.bindings.insert(
            position,
            Binding {
                binding_type,
                value,
            },
        );
        self
    }

    pub fn statement(&self) -> &str {
        &self.statement
    }

    pub fn warehouse(&self) -> &str {
        &self.warehouse
    }

    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    pub fn role(&self) -> Option<&str> {
        self.role.as_deref()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn fetch_timeout(&self) -> Duration {
        self.fetch_timeout
    }

    fn body(&self) -> StatementBody<'_> {
        StatementBody {
            statement: &self.statement,
            timeout: self.timeout.as_secs(),
            warehouse: &self.warehouse,
            database: self.database.as_deref(),
            schema: self.schema.as_deref(),
            role: self.role.as_deref(),
            bindings: (!self.bindings.is_empty()).then_some(&self.bindings),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BindingType {
    Fixed,
    Real,
    Text,
    Binary,
    Boolean,
    Date,
    Time,
    TimestampLtz,
    TimestampNtz,
    TimestampTz,
}

#[derive(Debug, Clone, Serialize)]
struct Binding {
    #[serde(rename = "type")]
    binding_type: BindingType,
    value: Option<String>,
}

#[derive(Serialize)]
struct StatementBody<'a> {
    statement: &'a str,
    timeout: u64,
    warehouse: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    database: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    schema: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    bindings: Option<&'a BTreeMap<String, Binding>>,
}

/// Server-issued reference to a statement that is still executing.
///
/// Serializable so a caller can persist it and check on it from a later invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementHandle {
    id: String,
    status_url: String,
}

impl StatementHandle {
    pub fn new(id: impl Into<String>, status_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status_url: status_url.into(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn status_url(&self) -> &str {
        &self.status_url
    }

    pub(crate) fn cancel_url(&self) -> String {
        match self.status_url.split_once('?') {
            Some((path, query)) => format!("{path}/cancel?{query}"),
            None => format!("{}/cancel", self.status_url),
        }
    }
}

/// What the submission call returned.
#[derive(Debug)]
pub enum SubmitResponse {
    /// The statement finished inside the submission call.
    Result(QueryResult),
    /// The statement is still running; poll the handle.
    Handle(StatementHandle),
}

pub(crate) async fn submit(transport: &Transport, request: &StatementRequest) -> Result<SubmitResponse> {
    let url = transport.resolve(STATEMENTS_PATH)?;
    let body = serde_json::to_value(request.body())
        .map_err(|e| Error::Json(e, request.statement.clone()))?;
    let request_id = uuid::Uuid::new_v4().to_string();

    tracing::info!(warehouse = %request.warehouse, %request_id, "submitting statement");
    let raw = transport
        .send(
            Method::POST,
            url,
            &[("requestId", request_id)],
            Some(&body),
            request.fetch_timeout,
        )
        .await?;

    if !raw.status.is_success() {
        let error = server_error(&raw);
        tracing::info!(status = %raw.status, code = %error.code, "statement rejected");
        return Err(Error::SubmissionFailed(error));
    }

    let response = StatementResponse::parse(&raw.body)?;
    if response.is_error() {
        let error = response.server_error(raw.status.as_str());
        tracing::info!(status = %raw.status, code = %error.code, "statement rejected");
        return Err(Error::SubmissionFailed(error));
    }
    if raw.status != StatusCode::ACCEPTED && !response.is_running() && response.data.is_some() {
        tracing::info!("statement completed synchronously");
        return Ok(SubmitResponse::Result(response.into_query_result()?));
    }
    match response.statement_status_url {
        Some(status_url) => {
            let id = response.statement_handle.ok_or_else(|| {
                Error::UnexpectedResponse("status URL without statement handle".to_string())
            })?;
            tracing::info!(statement_handle = %id, "statement running asynchronously");
            Ok(SubmitResponse::Handle(StatementHandle::new(id, status_url)))
        }
        None => Err(Error::UnexpectedResponse(format!(
            "submission answered {} with neither data nor a status URL",
            raw.status
        ))),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn body_uses_whole_seconds_and_skips_unset_fields() {
        let request = StatementRequest::new("SELECT 1", "COMPUTE_WH")
            .with_timeout(Duration::from_millis(45_900))
            .with_fetch_timeout(Duration::from_secs(3));
        let body = serde_json::to_value(request.body()).unwrap();
        assert_eq!(
            body,
            json!({"statement": "SELECT 1", "timeout": 45, "warehouse": "COMPUTE_WH"})
        );
    }

    #[test]
    fn bindings_are_numbered_in_order() {
        let request = StatementRequest::new("SELECT ?, ?", "WH")
            .with_database("DB")
            .with_schema("PUBLIC")
            .with_role("ANALYST")
            .with_binding(BindingType::Fixed, Some("42".to_string()))
            .with_binding(BindingType::TimestampNtz, None);
        let body = serde_json::to_value(request.body()).unwrap();
        assert_eq!(body["database"], "DB");
        assert_eq!(body["schema"], "PUBLIC");
        assert_eq!(body["role"], "ANALYST");
        assert_eq!(
            body["bindings"],
            json!({
                "1": {"type": "FIXED", "value": "42"},
                "2": {"type": "TIMESTAMP_NTZ", "value": null}
            })
        );
    }

    #[test]
    fn cancel_url_keeps_query_string() {
        let handle = StatementHandle::new("01b2", "/api/v2/statements/01b2?requestId=abc");
        assert_eq!(
            handle.cancel_url(),
            "/api/v2/statements/01b2/cancel?requestId=abc"
        );
        let handle = StatementHandle::new("01b2", "/api/v2/statements/01b2");
        assert_eq!(handle.cancel_url(), "/api/v2/statements/01b2/cancel");
    }

    #[test]
    fn handle_round_trips_through_json() {
        let handle = StatementHandle::new("01b2", "/api/v2/statements/01b2");
        let persisted = serde_json::to_string(&handle).unwrap();
        let restored: StatementHandle = serde_json::from_str(&persisted).unwrap();
        assert_eq!(restored, handle);
    }
}
