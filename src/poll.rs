use std::time::Duration;

use reqwest::{Method, StatusCode, Url};
use tokio::time::sleep;

use crate::cancel::cancel;
use crate::error::ServerError;
use crate::result::{QueryResult, StatementResponse, server_error};
use crate::transport::{RawResponse, Transport};
use crate::{Error, PollingConfig, Result, StatementHandle};

/// What a single status check said about a running statement.
#[derive(Debug)]
pub enum PollOutcome {
    Completed(QueryResult),
    StillRunning,
    /// The server asked us to slow down. Carries the `Retry-After` hint if one was sent.
    RateLimited(Option<Duration>),
    Failed(ServerError),
}

/// Map one raw status response onto exactly one [`PollOutcome`].
pub(crate) fn classify(raw: RawResponse) -> PollOutcome {
    match raw.status {
        StatusCode::TOO_MANY_REQUESTS => PollOutcome::RateLimited(raw.retry_after),
        StatusCode::ACCEPTED => PollOutcome::StillRunning,
        StatusCode::OK => {
            let fallback_code = raw.status.as_u16().to_string();
            let response = match StatementResponse::parse(&raw.body) {
                Ok(response) => response,
                Err(e) => {
                    return PollOutcome::Failed(ServerError {
                        code: fallback_code,
                        message: e.to_string(),
                        sql_state: None,
                    });
                }
            };
            if response.is_error() {
                return PollOutcome::Failed(response.server_error(&fallback_code));
            }
            if response.is_running() {
                return PollOutcome::StillRunning;
            }
            match response.into_query_result() {
                Ok(result) => PollOutcome::Completed(result),
                Err(e) => PollOutcome::Failed(ServerError {
                    code: fallback_code,
                    message: e.to_string(),
                    sql_state: None,
                }),
            }
        }
        _ => PollOutcome::Failed(server_error(&raw)),
    }
}

async fn status_call(transport: &Transport, url: Url, fetch_timeout: Duration) -> Result<PollOutcome> {
    let raw = transport
        .send(Method::GET, url, &[], None, fetch_timeout)
        .await?;
    Ok(classify(raw))
}

/// One classified status check, for callers that keep the handle across invocations.
pub(crate) async fn check_status(
    transport: &Transport,
    handle: &StatementHandle,
    fetch_timeout: Duration,
) -> Result<PollOutcome> {
    let url = transport.resolve(handle.status_url())?;
    status_call(transport, url, fetch_timeout).await
}

/// Poll `handle` until it completes, fails, or `config` runs out of attempts.
///
/// On exhaustion the statement is cancelled once, best-effort, and
/// `Error::PollTimeout` is returned whatever the cancellation did.
pub(crate) async fn poll_until_complete(
    transport: &Transport,
    handle: &StatementHandle,
    config: &PollingConfig,
) -> Result<QueryResult> {
    let url = transport.resolve(handle.status_url())?;
    let mut attempts = 0u32;
    let mut rate_limited = 0u32;
    let mut last_error = None;

    while attempts < config.max_attempts() {
        match status_call(transport, url.clone(), config.fetch_timeout()).await {
            Ok(PollOutcome::Completed(result)) => {
                tracing::info!(statement_handle = %handle.id(), attempts = attempts + 1, "statement completed");
                return Ok(result);
            }
            Ok(PollOutcome::Failed(e)) => {
                tracing::info!(statement_handle = %handle.id(), code = %e.code, "statement failed");
                return Err(Error::QueryFailed(e));
            }
            Ok(PollOutcome::RateLimited(hint)) => {
                if rate_limited >= config.rate_limit_allowance() {
                    tracing::warn!(statement_handle = %handle.id(), rate_limited, "rate-limit allowance exhausted");
                    break;
                }
                rate_limited += 1;
                tracing::warn!(statement_handle = %handle.id(), ?hint, "status check rate limited");
                sleep(config.rate_limit_delay()).await;
                continue;
            }
            Ok(PollOutcome::StillRunning) => {
                attempts += 1;
                tracing::debug!(statement_handle = %handle.id(), attempts, "statement still running");
            }
            Err(Error::Transport(e)) => {
                attempts += 1;
                tracing::warn!(statement_handle = %handle.id(), attempts, error = %e, "status check failed, retrying");
                last_error = Some(e.to_string());
            }
            Err(e) => return Err(e),
        }

        if attempts < config.max_attempts() {
            sleep(config.interval()).await;
        }
    }

    tracing::warn!(statement_handle = %handle.id(), attempts, "poll budget exhausted, cancelling statement");
    let cancel_outcome = cancel(transport, handle, config.cancel_timeout()).await;
    tracing::debug!(statement_handle = %handle.id(), ?cancel_outcome, "cancel outcome does not change the timeout");

    Err(Error::PollTimeout {
        handle: handle.clone(),
        attempts,
        last_error,
    })
}
