mod common;

use std::time::Duration;

use common::{HANDLE, MockResponse, MockSnowflake, cancel_path, status_path};
use hyper::Method;
use serde_json::json;
use snowflake_sql_api_rs::{
    Error, InvocationBudget, PollOutcome, PollingConfig, Result, StatementHandle,
    StatementRequest, SubmitResponse,
};

#[tokio::test]
async fn test_cancel_twice_is_safe() -> Result<()> {
    // Arrange
    let server = MockSnowflake::start().await;
    server.on(
        Method::POST,
        &cancel_path(),
        vec![
            MockResponse::json(200, json!({"code": "000604", "message": "SQL execution canceled"})),
            MockResponse::failed(422, "000605", "Identified SQL statement is not currently executing."),
        ],
    );
    let session = server.session()?;
    let handle = StatementHandle::new(HANDLE, status_path());

    // Act
    let first = session.cancel(&handle, Duration::from_secs(1)).await;
    let second = session.cancel(&handle, Duration::from_secs(1)).await;

    // Assert
    assert!(first.is_cancelled());
    assert!(!second.is_cancelled());
    assert_eq!(server.requests_to(Method::POST, &cancel_path()).len(), 2);

    Ok(())
}

#[tokio::test]
async fn test_resume_warehouse() -> Result<()> {
    // Arrange
    let server = MockSnowflake::start().await;
    server.on(
        Method::POST,
        "/api/v2/warehouses/COMPUTE_WH:resume",
        vec![MockResponse::json(200, json!({"status": "Statement executed successfully."}))],
    );
    server.on(
        Method::POST,
        "/api/v2/warehouses/MISSING:resume",
        vec![MockResponse::failed(404, "002003", "Warehouse 'MISSING' does not exist.")],
    );
    let session = server.session()?;

    // Act
    session
        .resume_warehouse("COMPUTE_WH", Duration::from_secs(1))
        .await?;
    let err = session
        .resume_warehouse("MISSING", Duration::from_secs(1))
        .await
        .unwrap_err();

    // Assert
    assert!(matches!(err, Error::ResumeFailed(ref e) if e.code == "002003"));
    let resumes = server.requests();
    assert_eq!(resumes.len(), 2);
    assert_eq!(resumes[0].headers["accept"], "application/json");

    Ok(())
}

#[tokio::test]
async fn test_check_status_from_persisted_handle() -> Result<()> {
    // Arrange
    let server = MockSnowflake::start().await;
    server.on(Method::POST, "/api/v2/statements", vec![MockResponse::running()]);
    server.on(
        Method::GET,
        &status_path(),
        vec![MockResponse::running(), MockResponse::completed("N", &[1, 2])],
    );
    let session = server.session()?;

    let SubmitResponse::Handle(handle) = session
        .submit(&StatementRequest::new("SELECT 1", "COMPUTE_WH"))
        .await?
    else {
        panic!("expected a handle");
    };
    let persisted = serde_json::to_string(&handle).unwrap();

    // Act: a later invocation with a fresh session
    let handle: StatementHandle = serde_json::from_str(&persisted).unwrap();
    let session = server.session()?;
    let first = session.check_status(&handle, Duration::from_secs(1)).await?;
    let second = session.check_status(&handle, Duration::from_secs(1)).await?;

    // Assert
    assert!(matches!(first, PollOutcome::StillRunning));
    match second {
        PollOutcome::Completed(result) => assert_eq!(result.len(), 2),
        other => panic!("expected Completed, got {other:?}"),
    }
    assert!(server.requests_to(Method::POST, &cancel_path()).is_empty());

    Ok(())
}

#[tokio::test]
async fn test_execute_within_rejects_config_over_budget() -> Result<()> {
    // Arrange
    let server = MockSnowflake::start().await;
    let session = server.session()?;
    let config = PollingConfig::from_millis(1_000, 49, 1_000)?.with_rate_limit_allowance(0);
    let request = StatementRequest::new("SELECT 1", "COMPUTE_WH")
        .with_fetch_timeout(Duration::from_secs(1));

    // Act: 1 submit + 49 polls + 1 cancel = 51 calls
    let err = session
        .execute_within(
            &request,
            &config,
            &InvocationBudget::new(50, Duration::from_secs(600)),
        )
        .await
        .unwrap_err();

    // Assert
    assert!(matches!(err, Error::BudgetExceeded(_)));
    assert!(server.requests().is_empty());

    Ok(())
}

#[tokio::test]
async fn test_execute_within_runs_when_budget_fits() -> Result<()> {
    // Arrange
    let server = MockSnowflake::start().await;
    server.on(
        Method::POST,
        "/api/v2/statements",
        vec![MockResponse::completed("ONE", &[1])],
    );
    let session = server.session()?;
    let config = PollingConfig::from_millis(10, 5, 1_000)?.with_rate_limit_allowance(1);
    let request = StatementRequest::new("SELECT 1", "COMPUTE_WH")
        .with_fetch_timeout(Duration::from_secs(1));

    // Act
    let result = session
        .execute_within(
            &request,
            &config,
            &InvocationBudget::new(8, Duration::from_secs(30)),
        )
        .await?;

    // Assert
    assert_eq!(result.len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_fetch_second_partition() -> Result<()> {
    // Arrange
    let server = MockSnowflake::start().await;
    server.on(
        Method::POST,
        "/api/v2/statements",
        vec![MockResponse::json(
            200,
            json!({
                "code": "090001",
                "statementHandle": HANDLE,
                "statementStatusUrl": status_path(),
                "resultSetMetaData": {
                    "numRows": 3,
                    "format": "jsonv2",
                    "partitionInfo": [{"rowCount": 2}, {"rowCount": 1}],
                    "rowType": [{"name": "SEQ", "type": "fixed", "nullable": false}]
                },
                "data": [["0"], ["1"]]
            }),
        )],
    );
    server.on(
        Method::GET,
        &status_path(),
        vec![MockResponse::json(200, json!({"data": [["2"]]}))],
    );
    let session = server.session()?;
    let config = PollingConfig::from_millis(10, 5, 1_000)?;

    // Act
    let result = session
        .execute(&StatementRequest::new("SELECT SEQ8() AS SEQ", "COMPUTE_WH"), &config)
        .await?;
    let rest = session
        .fetch_partition(&result, 1, Duration::from_secs(1))
        .await?;

    // Assert
    assert_eq!(result.partition_count(), 2);
    assert_eq!(result.len(), 2);
    assert_eq!(rest.len(), 1);
    assert_eq!(rest[0].get::<u64>("seq")?, 2);
    let fetches = server.requests_to(Method::GET, &status_path());
    assert_eq!(fetches.len(), 1);
    assert_eq!(fetches[0].query.as_deref(), Some("partition=1"));
    assert!(
        session
            .fetch_partition(&result, 2, Duration::from_secs(1))
            .await
            .is_err()
    );

    Ok(())
}
