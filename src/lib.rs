//! # Snowflake SQL API client
//!
//! Runs SQL statements through the Snowflake SQL REST API (`/api/v2/statements`)
//! on hosts that cap how many outbound calls and how much wall-clock time one
//! invocation may use. A statement is submitted, polled a bounded number of
//! times, and cancelled if the poll budget runs out.
//!
//! ```rust
//! # use std::time::Duration;
//! # use snowflake_sql_api_rs::{
//! #     InvocationBudget, PollingConfig, Result, SnowflakeAuthMethod, SnowflakeClientConfig,
//! #     SnowflakeSqlClient, StatementRequest,
//! # };
//! # async fn run() -> Result<()> {
//! let client = SnowflakeSqlClient::new(
//!     SnowflakeAuthMethod::ProgrammaticAccessToken {
//!         token: "TOKEN".to_string(),
//!     },
//!     SnowflakeClientConfig {
//!         account: "ACCOUNT".to_string(),
//!         user: "USER".to_string(),
//!         user_agent: None,
//!     },
//! )?;
//! let session = client.create_session()?;
//!
//! // 50 calls and 30 seconds per invocation
//! let budget = InvocationBudget::new(50, Duration::from_secs(30));
//! let config = PollingConfig::new(Duration::from_millis(500), 10, Duration::from_secs(1))?
//!     .with_rate_limit_allowance(2);
//!
//! let request = StatementRequest::new("SELECT 1 AS ONE", "COMPUTE_WH")
//!     .with_database("ANALYTICS")
//!     .with_schema("PUBLIC")
//!     .with_fetch_timeout(Duration::from_secs(5));
//! let result = session.execute_within(&request, &config, &budget).await?;
//! assert_eq!(result.rows()[0].get::<i64>("ONE")?, 1);
//! # Ok(())
//! # }
//! ```

mod auth;
mod cancel;
mod config;
mod error;
mod poll;
mod result;
mod row;
mod session;
mod statement;
mod transport;
mod warehouse;

pub use auth::{BearerCredential, SnowflakeAuthMethod, TokenType};
pub use cancel::CancelOutcome;
pub use config::{BudgetUsage, InvocationBudget, PollingConfig};
pub use error::{Error, Result, ServerError, TransportError};
pub use poll::PollOutcome;
pub use result::{ColumnMetaData, PartitionInfo, QueryResult, ResultSetMetaData};
pub use row::{SnowflakeDecode, SnowflakeRow};
pub use session::SnowflakeSqlSession;
pub use statement::{BindingType, StatementHandle, StatementRequest, SubmitResponse};

use auth::{default_user_agent, resolve_credential};
use transport::Transport;

use reqwest::{Client, ClientBuilder, Proxy, Url};

#[derive(Clone)]
pub struct SnowflakeSqlClient {
    http: Client,

    auth: SnowflakeAuthMethod,
    config: SnowflakeClientConfig,
    connection_config: Option<SnowflakeConnectionConfig>,
}

#[derive(Default, Clone)]
pub struct SnowflakeClientConfig {
    /// Account identifier, e.g. `myorg-myaccount` or `xy12345.ap-northeast-1.aws`.
    pub account: String,
    /// Login name. Only used to issue key-pair JWTs.
    pub user: String,
    /// Overrides the default `snowflake-sql-api-rs/<version>` user agent.
    pub user_agent: Option<String>,
}

#[derive(Default, Clone)]
pub(crate) struct SnowflakeConnectionConfig {
    pub(crate) host: String,
    pub(crate) port: Option<u16>,
    pub(crate) protocol: Option<String>,
}

impl SnowflakeSqlClient {
    pub fn new(auth: SnowflakeAuthMethod, config: SnowflakeClientConfig) -> Result<Self> {
        let client = ClientBuilder::new().gzip(true).build()?;
        Ok(Self {
            http: client,
            auth,
            config,
            connection_config: None,
        })
    }

    pub fn with_proxy(self, host: &str, port: u16, username: &str, password: &str) -> Result<Self> {
        let proxy =
            Proxy::all(format!("http://{host}:{port}").as_str())?.basic_auth(username, password);

        let client = ClientBuilder::new().gzip(true).proxy(proxy).build()?;
        Ok(Self {
            http: client,
            auth: self.auth,
            config: self.config,
            connection_config: self.connection_config,
        })
    }

    /// Talk to `protocol://host:port` instead of `https://{account}.snowflakecomputing.com`.
    ///
    /// The address is only parsed by [`create_session`](Self::create_session).
    pub fn with_address(self, host: &str, port: Option<u16>, protocol: Option<String>) -> Self {
        Self {
            connection_config: Some(SnowflakeConnectionConfig {
                host: host.to_string(),
                port,
                protocol,
            }),
            ..self
        }
    }

    /// Resolve the credential and fix the header set for one invocation.
    ///
    /// Makes no network call.
    pub fn create_session(&self) -> Result<SnowflakeSqlSession> {
        let credential = resolve_credential(&self.auth, &self.config)?;
        let user_agent = self
            .config
            .user_agent
            .clone()
            .unwrap_or_else(default_user_agent);
        let transport = Transport::new(
            self.http.clone(),
            self.base_url()?,
            &credential,
            &user_agent,
        )?;
        Ok(SnowflakeSqlSession { transport })
    }

    pub(crate) fn base_url(&self) -> Result<Url> {
        if let Some(connection_config) = &self.connection_config {
            let host = &connection_config.host;
            let protocol = connection_config.protocol.as_deref().unwrap_or("https");
            let mut url = Url::parse(&format!("{protocol}://{host}"))?;
            if let Some(port) = connection_config.port {
                url.set_port(Some(port))
                    .map_err(|_| Error::Url("invalid base url port".to_string()))?;
            }
            Ok(url)
        } else {
            Ok(Url::parse(&format!(
                "https://{}.snowflakecomputing.com",
                self.config.account
            ))?)
        }
    }
}
