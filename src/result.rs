use std::time::Duration;
use std::{collections::HashMap, sync::Arc};

use reqwest::Method;
use serde::Deserialize;

use crate::error::ServerError;
use crate::transport::{RawResponse, Transport};
use crate::{Error, Result, SnowflakeRow};

/// `code` of a statement that finished successfully.
const STATEMENT_SUCCESS_CODE: &str = "090001";
const QUERY_IN_PROGRESS_CODE: &str = "333333";
const QUERY_IN_PROGRESS_ASYNC_CODE: &str = "333334";
const STATEMENTS_PATH: &str = "/api/v2/statements/";

/// Rows and metadata of a finished statement.
#[derive(Debug)]
pub struct QueryResult {
    statement_handle: Option<String>,
    metadata: ResultSetMetaData,
    rows: Vec<SnowflakeRow>,
}

impl QueryResult {
    pub fn statement_handle(&self) -> Option<&str> {
        self.statement_handle.as_deref()
    }

    pub fn metadata(&self) -> &ResultSetMetaData {
        &self.metadata
    }

    /// Rows of the first partition.
    pub fn rows(&self) -> &[SnowflakeRow] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<SnowflakeRow> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of result partitions. Partitions after the first are fetched
    /// with `SnowflakeSqlSession::fetch_partition`.
    pub fn partition_count(&self) -> usize {
        self.metadata.partition_info.len().max(1)
    }

    pub(crate) fn columns(&self) -> Arc<HashMap<String, usize>> {
        self.rows
            .first()
            .map(|row| Arc::clone(&row.column_names))
            .unwrap_or_else(|| Arc::new(self.metadata.column_index()))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultSetMetaData {
    pub num_rows: Option<u64>,
    pub format: Option<String>,
    #[serde(default)]
    pub row_type: Vec<ColumnMetaData>,
    #[serde(default)]
    pub partition_info: Vec<PartitionInfo>,
}

impl ResultSetMetaData {
    fn column_index(&self) -> HashMap<String, usize> {
        self.row_type
            .iter()
            .enumerate()
            .map(|(i, column)| (column.name.to_ascii_uppercase(), i))
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnMetaData {
    pub name: String,
    pub database: Option<String>,
    pub schema: Option<String>,
    pub table: Option<String>,
    #[serde(rename = "type")]
    pub data_type: String,
    #[serde(default)]
    pub nullable: bool,
    pub length: Option<i64>,
    pub precision: Option<i64>,
    pub scale: Option<i64>,
    pub byte_length: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionInfo {
    pub row_count: u64,
    pub uncompressed_size: Option<u64>,
    pub compressed_size: Option<u64>,
}

/// Body shared by the submit and status endpoints.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StatementResponse {
    pub(crate) code: Option<String>,
    pub(crate) sql_state: Option<String>,
    pub(crate) message: Option<String>,
    pub(crate) statement_handle: Option<String>,
    pub(crate) statement_status_url: Option<String>,
    pub(crate) result_set_meta_data: Option<ResultSetMetaData>,
    pub(crate) data: Option<Vec<Vec<Option<String>>>>,
}

impl StatementResponse {
    pub(crate) fn parse(body: &str) -> Result<Self> {
        serde_json::from_str(body).map_err(|e| Error::Json(e, body.to_string()))
    }

    /// Whether a body that still names a status URL is in fact a finished result.
    ///
    /// Snowflake echoes `statementStatusUrl` on completed results; the success
    /// code together with `data` tells the two apart.
    pub(crate) fn is_echoed_completion(&self) -> bool {
        self.data.is_some() && self.code.as_deref() == Some(STATEMENT_SUCCESS_CODE)
    }

    /// Whether `code` reports a failure. Checked before anything else, a
    /// status URL next to an error code does not make the statement running.
    pub(crate) fn is_error(&self) -> bool {
        !matches!(
            self.code.as_deref(),
            None | Some(
                STATEMENT_SUCCESS_CODE | QUERY_IN_PROGRESS_CODE | QUERY_IN_PROGRESS_ASYNC_CODE
            )
        )
    }

    /// Whether this body still refers to a running statement.
    pub(crate) fn is_running(&self) -> bool {
        matches!(
            self.code.as_deref(),
            Some(QUERY_IN_PROGRESS_CODE | QUERY_IN_PROGRESS_ASYNC_CODE)
        ) || (self.statement_status_url.is_some() && !self.is_echoed_completion())
    }

    pub(crate) fn into_query_result(self) -> Result<QueryResult> {
        let metadata = self.result_set_meta_data.unwrap_or_default();
        if let Some(format) = metadata.format.as_deref() {
            if !format.eq_ignore_ascii_case("jsonv2") {
                return Err(Error::UnexpectedResponse(format!(
                    "unsupported result format: {format}"
                )));
            }
        }
        let column_names = Arc::new(metadata.column_index());
        let rows = rows_from(self.data.unwrap_or_default(), &column_names);
        Ok(QueryResult {
            statement_handle: self.statement_handle,
            metadata,
            rows,
        })
    }

    pub(crate) fn server_error(&self, fallback_code: &str) -> ServerError {
        ServerError {
            code: self
                .code
                .clone()
                .unwrap_or_else(|| fallback_code.to_string()),
            message: self.message.clone().unwrap_or_default(),
            sql_state: self.sql_state.clone(),
        }
    }
}

/// Body of `GET {statementStatusUrl}?partition=N`.
#[derive(Debug, Deserialize)]
pub(crate) struct PartitionResponse {
    #[serde(default)]
    pub(crate) data: Vec<Vec<Option<String>>>,
}

pub(crate) fn rows_from(
    data: Vec<Vec<Option<String>>>,
    column_names: &Arc<HashMap<String, usize>>,
) -> Vec<SnowflakeRow> {
    data.into_iter()
        .map(|row| SnowflakeRow {
            row,
            column_names: Arc::clone(column_names),
        })
        .collect()
}

/// Fetch partition `partition` of a finished statement. Partition 0 already came with the result.
pub(crate) async fn fetch_partition(
    transport: &Transport,
    result: &QueryResult,
    partition: usize,
    timeout: Duration,
) -> Result<Vec<SnowflakeRow>> {
    let handle = result.statement_handle().ok_or_else(|| {
        Error::UnexpectedResponse("result carries no statement handle".to_string())
    })?;
    if partition >= result.partition_count() {
        return Err(Error::Decode(format!(
            "partition {partition} out of range, result has {}",
            result.partition_count()
        )));
    }

    let url = transport.resolve_segment(STATEMENTS_PATH, handle)?;
    tracing::debug!(statement_handle = %handle, partition, "fetching result partition");
    let raw = transport
        .send(
            Method::GET,
            url,
            &[("partition", partition.to_string())],
            None,
            timeout,
        )
        .await?;
    if !raw.status.is_success() {
        return Err(Error::QueryFailed(server_error(&raw)));
    }
    let response: PartitionResponse =
        serde_json::from_str(&raw.body).map_err(|e| Error::Json(e, raw.body.clone()))?;
    Ok(rows_from(response.data, &result.columns()))
}

/// Extract the server's error code and message from a non-success response.
///
/// Bodies that are not SQL API JSON fall back to the HTTP status as the code.
pub(crate) fn server_error(raw: &RawResponse) -> ServerError {
    let fallback_code = raw.status.as_u16().to_string();
    match StatementResponse::parse(&raw.body) {
        Ok(response) if response.code.is_some() || response.message.is_some() => {
            response.server_error(&fallback_code)
        }
        _ => ServerError {
            code: fallback_code,
            message: if raw.body.trim().is_empty() {
                raw.status
                    .canonical_reason()
                    .unwrap_or("unknown error")
                    .to_string()
            } else {
                raw.body.clone()
            },
            sql_state: None,
        },
    }
}
