use std::time::Duration;

use reqwest::Method;

use crate::result::server_error;
use crate::transport::Transport;
use crate::{Error, Result};

const WAREHOUSES_PATH: &str = "/api/v2/warehouses/";

/// Resume `warehouse` and wait for the server to acknowledge it. Does not poll.
pub(crate) async fn resume_warehouse(
    transport: &Transport,
    warehouse: &str,
    timeout: Duration,
) -> Result<()> {
    let url = transport.resolve_segment(WAREHOUSES_PATH, &format!("{warehouse}:resume"))?;

    tracing::info!(%warehouse, "resuming warehouse");
    let raw = transport
        .send(Method::POST, url, &[], None, timeout)
        .await?;
    if !raw.status.is_success() {
        return Err(Error::ResumeFailed(server_error(&raw)));
    }
    Ok(())
}
