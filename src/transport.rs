use std::time::Duration;

use http::HeaderMap;
use http::header::{
    ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderName, HeaderValue, RETRY_AFTER, USER_AGENT,
};
use reqwest::{Client, Method, StatusCode, Url};

use crate::auth::BearerCredential;
use crate::error::TransportError;
use crate::{Error, Result};

const TOKEN_TYPE_HEADER: HeaderName =
    HeaderName::from_static("x-snowflake-authorization-token-type");
const APPLICATION_JSON: &str = "application/json";

/// Build the header set sent on every SQL API call.
///
/// This is the only place headers are assembled, so no call can go out
/// without `Accept: application/json` (the server answers 406 otherwise).
pub(crate) fn build_headers(credential: &BearerCredential, user_agent: &str) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    let mut authorization = HeaderValue::from_str(&format!("Bearer {}", credential.token))?;
    authorization.set_sensitive(true);
    headers.insert(AUTHORIZATION, authorization);
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON));
    headers.insert(ACCEPT, HeaderValue::from_static(APPLICATION_JSON));
    headers.insert(USER_AGENT, HeaderValue::from_str(user_agent)?);
    if let Some(token_type) = credential.token_type {
        headers.insert(
            TOKEN_TYPE_HEADER,
            HeaderValue::from_static(token_type.as_header_value()),
        );
    }
    Ok(headers)
}

/// Status, rate-limit hint and body of one HTTP exchange.
#[derive(Debug, Clone)]
pub(crate) struct RawResponse {
    pub(crate) status: StatusCode,
    pub(crate) retry_after: Option<Duration>,
    pub(crate) body: String,
}

/// Performs single outbound calls against one SQL API endpoint with a fixed header set.
#[derive(Clone)]
pub(crate) struct Transport {
    http: Client,
    base_url: Url,
    headers: HeaderMap,
}

impl Transport {
    pub(crate) fn new(
        http: Client,
        base_url: Url,
        credential: &BearerCredential,
        user_agent: &str,
    ) -> Result<Self> {
        Ok(Self {
            http,
            base_url,
            headers: build_headers(credential, user_agent)?,
        })
    }

    /// Resolve a path or a server-issued status URL against the base URL.
    ///
    /// Absolute URLs pointing at another origin are refused so the bearer
    /// token only ever goes to the configured account.
    pub(crate) fn resolve(&self, path: &str) -> Result<Url> {
        let url = self.base_url.join(path)?;
        if url.origin() != self.base_url.origin() {
            return Err(Error::Url(format!(
                "refusing to send credentials to foreign origin: {url}"
            )));
        }
        Ok(url)
    }

    /// Resolve `collection` and append `segment` as one percent-encoded path segment.
    pub(crate) fn resolve_segment(&self, collection: &str, segment: &str) -> Result<Url> {
        let mut url = self.resolve(collection)?;
        url.path_segments_mut()
            .map_err(|_| Error::Url("base url cannot hold a path".to_string()))?
            .pop_if_empty()
            .push(segment);
        Ok(url)
    }

    /// Perform exactly one call. `timeout` bounds the whole exchange, body included.
    pub(crate) async fn send(
        &self,
        method: Method,
        url: Url,
        query: &[(&str, String)],
        body: Option<&serde_json::Value>,
        timeout: Duration,
    ) -> Result<RawResponse> {
        tracing::debug!(%method, %url, ?timeout, "sending SQL API request");

        let mut request = self
            .http
            .request(method, url)
            .headers(self.headers.clone())
            .timeout(timeout);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(TransportError::from)?;
        let status = response.status();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let body = response.text().await.map_err(TransportError::from)?;

        tracing::debug!(%status, body_len = body.len(), "received SQL API response");
        Ok(RawResponse {
            status,
            retry_after,
            body,
        })
    }

    #[cfg(test)]
    pub(crate) fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}
