#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::header::CONTENT_TYPE;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{HeaderMap, Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::{Value, json};
use snowflake_sql_api_rs::{
    Result, SnowflakeAuthMethod, SnowflakeClientConfig, SnowflakeSqlClient, SnowflakeSqlSession,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub const HANDLE: &str = "01b2c3d4-0000-4a5b-0000-000000000001";

pub fn status_path() -> String {
    format!("/api/v2/statements/{HANDLE}")
}

pub fn cancel_path() -> String {
    format!("/api/v2/statements/{HANDLE}/cancel")
}

#[derive(Debug, Clone)]
pub struct MockResponse {
    status: u16,
    body: String,
    delay: Duration,
    headers: Vec<(&'static str, String)>,
}

impl MockResponse {
    pub fn json(status: u16, body: Value) -> Self {
        Self {
            status,
            body: body.to_string(),
            delay: Duration::ZERO,
            headers: vec![],
        }
    }

    pub fn empty(status: u16) -> Self {
        Self {
            status,
            body: String::new(),
            delay: Duration::ZERO,
            headers: vec![],
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_header(mut self, name: &'static str, value: &str) -> Self {
        self.headers.push((name, value.to_string()));
        self
    }

    pub fn running() -> Self {
        Self::json(
            202,
            json!({
                "code": "333334",
                "message": "Asynchronous execution in progress. Use provided query id to perform query monitoring and management.",
                "statementHandle": HANDLE,
                "statementStatusUrl": status_path(),
            }),
        )
    }

    pub fn rate_limited() -> Self {
        Self::empty(429).with_header("retry-after", "1")
    }

    /// A finished single-column `NUMBER` result with one row per value.
    pub fn completed(column: &str, values: &[i64]) -> Self {
        Self::json(
            200,
            json!({
                "code": "090001",
                "sqlState": "00000",
                "message": "Statement executed successfully.",
                "statementHandle": HANDLE,
                "resultSetMetaData": {
                    "numRows": values.len(),
                    "format": "jsonv2",
                    "partitionInfo": [{"rowCount": values.len(), "uncompressedSize": 16}],
                    "rowType": [{
                        "name": column,
                        "database": "",
                        "schema": "",
                        "table": "",
                        "type": "fixed",
                        "nullable": false,
                        "precision": 38,
                        "scale": 0
                    }]
                },
                "data": values.iter().map(|v| vec![v.to_string()]).collect::<Vec<_>>(),
            }),
        )
    }

    pub fn failed(status: u16, code: &str, message: &str) -> Self {
        Self::json(
            status,
            json!({
                "code": code,
                "message": message,
                "sqlState": "42000",
                "statementHandle": HANDLE,
            }),
        )
    }
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: String,
}

impl RecordedRequest {
    pub fn json(&self) -> Value {
        serde_json::from_str(&self.body).unwrap()
    }
}

#[derive(Default)]
struct State {
    routes: HashMap<(Method, String), VecDeque<MockResponse>>,
    requests: Vec<RecordedRequest>,
}

impl State {
    /// Pop the next scripted response. The last one repeats forever.
    fn next_response(&mut self, method: &Method, path: &str) -> MockResponse {
        match self.routes.get_mut(&(method.clone(), path.to_string())) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) if queue.len() == 1 => queue[0].clone(),
            _ => MockResponse::json(404, json!({"code": "404", "message": "no such route"})),
        }
    }
}

/// A local stand-in for the SQL API that replays scripted responses and records every request.
pub struct MockSnowflake {
    addr: SocketAddr,
    state: Arc<Mutex<State>>,
    task: JoinHandle<()>,
}

impl MockSnowflake {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(Mutex::new(State::default()));

        let accept_state = state.clone();
        let task = tokio::spawn(async move {
            loop {
                let Ok((stream, _peer)) = listener.accept().await else {
                    continue;
                };
                let state = accept_state.clone();
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);
                    let svc = service_fn(move |req| handler(req, state.clone()));
                    let _ = http1::Builder::new().serve_connection(io, svc).await;
                });
            }
        });

        Self { addr, state, task }
    }

    pub fn on(&self, method: Method, path: &str, responses: Vec<MockResponse>) {
        self.state
            .lock()
            .unwrap()
            .routes
            .insert((method, path.to_string()), responses.into());
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn requests_to(&self, method: Method, path: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == method && r.path == path)
            .collect()
    }

    pub fn client(&self) -> Result<SnowflakeSqlClient> {
        SnowflakeSqlClient::new(
            SnowflakeAuthMethod::Oauth {
                token: "test-token".to_string(),
            },
            SnowflakeClientConfig {
                account: "testaccount".to_string(),
                user: "tester".to_string(),
                user_agent: None,
            },
        )
        .map(|client| {
            client.with_address(
                &self.addr.ip().to_string(),
                Some(self.addr.port()),
                Some("http".to_string()),
            )
        })
    }

    pub fn session(&self) -> Result<SnowflakeSqlSession> {
        self.client()?.create_session()
    }
}

impl Drop for MockSnowflake {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn handler(
    req: Request<Incoming>,
    state: Arc<Mutex<State>>,
) -> std::result::Result<Response<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();
    let body = body
        .collect()
        .await
        .map(|b| b.to_bytes())
        .unwrap_or_default();

    let response = {
        let mut state = state.lock().unwrap();
        state.requests.push(RecordedRequest {
            method: parts.method.clone(),
            path: parts.uri.path().to_string(),
            query: parts.uri.query().map(str::to_string),
            headers: parts.headers.clone(),
            body: String::from_utf8_lossy(&body).into_owned(),
        });
        state.next_response(&parts.method, parts.uri.path())
    };

    if !response.delay.is_zero() {
        tokio::time::sleep(response.delay).await;
    }

    let mut builder = Response::builder()
        .status(StatusCode::from_u16(response.status).unwrap())
        .header(CONTENT_TYPE, "application/json");
    for (name, value) in &response.headers {
        builder = builder.header(*name, value.as_str());
    }
    Ok(builder.body(Full::new(Bytes::from(response.body))).unwrap())
}
