use std::time::Duration;

use crate::cancel::{CancelOutcome, cancel};
use crate::poll::{PollOutcome, check_status, poll_until_complete};
use crate::result::{QueryResult, fetch_partition};
use crate::statement::{StatementHandle, StatementRequest, SubmitResponse, submit};
use crate::transport::Transport;
use crate::warehouse::resume_warehouse;
use crate::{BudgetUsage, InvocationBudget, PollingConfig, Result, SnowflakeRow};

/// One invocation's view of the SQL API: a resolved credential and a fixed header set.
///
/// Every method runs in the caller's task. Nothing is spawned and nothing
/// outlives the call.
pub struct SnowflakeSqlSession {
    pub(super) transport: Transport,
}

impl SnowflakeSqlSession {
    /// Submit, then poll if the statement did not finish inside the submission call.
    pub async fn execute(
        &self,
        request: &StatementRequest,
        config: &PollingConfig,
    ) -> Result<QueryResult> {
        match self.submit(request).await? {
            SubmitResponse::Result(result) => Ok(result),
            SubmitResponse::Handle(handle) => self.poll(&handle, config).await,
        }
    }

    /// [`execute`](Self::execute), refusing to start when `config` could overrun `budget`.
    pub async fn execute_within(
        &self,
        request: &StatementRequest,
        config: &PollingConfig,
        budget: &InvocationBudget,
    ) -> Result<QueryResult> {
        let submission = BudgetUsage::default().plus_call(request.fetch_timeout());
        config.check_budget(budget, &submission)?;
        self.execute(request, config).await
    }

    pub async fn submit(&self, request: &StatementRequest) -> Result<SubmitResponse> {
        submit(&self.transport, request).await
    }

    pub async fn poll(
        &self,
        handle: &StatementHandle,
        config: &PollingConfig,
    ) -> Result<QueryResult> {
        poll_until_complete(&self.transport, handle, config).await
    }

    /// A single status check. Does not sleep and never cancels.
    pub async fn check_status(
        &self,
        handle: &StatementHandle,
        fetch_timeout: Duration,
    ) -> Result<PollOutcome> {
        check_status(&self.transport, handle, fetch_timeout).await
    }

    /// Best-effort cancellation. Failures are logged and reported in the outcome only.
    pub async fn cancel(&self, handle: &StatementHandle, timeout: Duration) -> CancelOutcome {
        cancel(&self.transport, handle, timeout).await
    }

    /// Wake `warehouse` ahead of a submission so the statement does not pay for a cold start.
    pub async fn resume_warehouse(&self, warehouse: &str, timeout: Duration) -> Result<()> {
        resume_warehouse(&self.transport, warehouse, timeout).await
    }

    pub async fn fetch_partition(
        &self,
        result: &QueryResult,
        partition: usize,
        timeout: Duration,
    ) -> Result<Vec<SnowflakeRow>> {
        fetch_partition(&self.transport, result, partition, timeout).await
    }
}
