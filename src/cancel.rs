use std::time::Duration;

use reqwest::Method;

use crate::StatementHandle;
use crate::result::server_error;
use crate::transport::Transport;

/// Result of a best-effort cancellation. Never turned into an `Error`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelOutcome {
    Cancelled,
    /// The statement may still be running on the warehouse.
    Failed(String),
}

impl CancelOutcome {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, CancelOutcome::Cancelled)
    }
}

/// Ask Snowflake to stop `handle`. One call, bounded by `timeout`.
///
/// Cancelling an already finished or cancelled statement is harmless.
pub(crate) async fn cancel(
    transport: &Transport,
    handle: &StatementHandle,
    timeout: Duration,
) -> CancelOutcome {
    let url = match transport.resolve(&handle.cancel_url()) {
        Ok(url) => url,
        Err(e) => {
            tracing::warn!(statement_handle = %handle.id(), error = %e, "cannot build cancel URL");
            return CancelOutcome::Failed(e.to_string());
        }
    };

    match transport.send(Method::POST, url, &[], None, timeout).await {
        Ok(raw) if raw.status.is_success() => {
            tracing::info!(statement_handle = %handle.id(), "statement cancelled");
            CancelOutcome::Cancelled
        }
        Ok(raw) => {
            let e = server_error(&raw);
            tracing::warn!(statement_handle = %handle.id(), code = %e.code, message = %e.message, "cancel rejected");
            CancelOutcome::Failed(e.to_string())
        }
        Err(e) => {
            tracing::warn!(statement_handle = %handle.id(), error = %e, "cancel call failed");
            CancelOutcome::Failed(e.to_string())
        }
    }
}
