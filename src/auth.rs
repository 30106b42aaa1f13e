mod client;
mod key_pair;

use std::fmt;

use chrono::Utc;

use crate::{Result, SnowflakeClientConfig};

pub(crate) use self::client::default_user_agent;
use self::key_pair::generate_jwt_from_key_pair;

/// How each SQL API call is authenticated.
#[derive(Clone)]
pub enum SnowflakeAuthMethod {
    /// RSA key pair registered on the user. A JWT is issued locally for every session.
    KeyPair {
        encrypted_pem: String,
        password: Option<Vec<u8>>,
    },
    Oauth {
        token: String,
    },
    ProgrammaticAccessToken {
        token: String,
    },
}

impl fmt::Debug for SnowflakeAuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnowflakeAuthMethod::KeyPair { .. } => f.write_str("KeyPair { .. }"),
            SnowflakeAuthMethod::Oauth { .. } => f.write_str("Oauth { .. }"),
            SnowflakeAuthMethod::ProgrammaticAccessToken { .. } => {
                f.write_str("ProgrammaticAccessToken { .. }")
            }
        }
    }
}

/// Value of the `X-Snowflake-Authorization-Token-Type` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenType {
    KeyPairJwt,
    Oauth,
    ProgrammaticAccessToken,
}

impl TokenType {
    pub fn as_header_value(&self) -> &'static str {
        match self {
            TokenType::KeyPairJwt => "KEYPAIR_JWT",
            TokenType::Oauth => "OAUTH",
            TokenType::ProgrammaticAccessToken => "PROGRAMMATIC_ACCESS_TOKEN",
        }
    }
}

/// A bearer token ready to be put on the wire.
#[derive(Clone)]
pub struct BearerCredential {
    pub(crate) token: String,
    pub(crate) token_type: Option<TokenType>,
}

impl BearerCredential {
    pub fn new(token: impl Into<String>, token_type: Option<TokenType>) -> Self {
        Self {
            token: token.into(),
            token_type,
        }
    }

    pub fn token_type(&self) -> Option<TokenType> {
        self.token_type
    }
}

impl fmt::Debug for BearerCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BearerCredential")
            .field("token", &"<redacted>")
            .field("token_type", &self.token_type)
            .finish()
    }
}

/// Resolve the configured auth method into a bearer credential. Never touches the network.
pub(crate) fn resolve_credential(
    auth: &SnowflakeAuthMethod,
    config: &SnowflakeClientConfig,
) -> Result<BearerCredential> {
    match auth {
        SnowflakeAuthMethod::KeyPair {
            encrypted_pem,
            password,
        } => {
            let jwt = generate_jwt_from_key_pair(
                encrypted_pem,
                password.as_deref(),
                &config.user,
                &config.account,
                Utc::now().timestamp(),
            )?;
            Ok(BearerCredential::new(jwt, Some(TokenType::KeyPairJwt)))
        }
        SnowflakeAuthMethod::Oauth { token } => {
            Ok(BearerCredential::new(token.clone(), Some(TokenType::Oauth)))
        }
        SnowflakeAuthMethod::ProgrammaticAccessToken { token } => Ok(BearerCredential::new(
            token.clone(),
            Some(TokenType::ProgrammaticAccessToken),
        )),
    }
}
