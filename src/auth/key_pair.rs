use base64::{Engine, engine::general_purpose::STANDARD};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use pkcs8::{DecodePrivateKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::RsaPrivateKey;
use rsa::pkcs1::DecodeRsaPrivateKey;
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::{Error, Result};

/// Snowflake rejects key-pair JWTs that live longer than one hour.
const JWT_LIFETIME_SECONDS: i64 = 3600;

pub(super) fn generate_jwt_from_key_pair(
    pem: &str,
    password: Option<&[u8]>,
    username: &str,
    account: &str,
    timestamp: i64,
) -> Result<String> {
    let account = account
        .split('.')
        .next()
        .map(|s| s.to_ascii_uppercase())
        .unwrap_or_default();
    let username = username.to_ascii_uppercase();

    let private = try_parse_private_key(pem, password)?;

    let public = private.to_public_key();
    let der = public
        .to_public_key_der()
        .map_err(|e| Error::Credential(format!("failed to encode public key: {e}")))?;
    let mut hasher = Sha256::new();
    hasher.update(der.as_bytes());
    let hash = hasher.finalize();
    let fingerprint = STANDARD.encode(hash);

    let payload = json!({
        "iss": format!("{}.{}.SHA256:{}", account, username, fingerprint),
        "sub": format!("{}.{}", account, username),
        "iat": timestamp,
        "exp": timestamp + JWT_LIFETIME_SECONDS
    });
    let pem = private
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| Error::Credential(format!("failed to re-encode private key: {e}")))?;
    let key = EncodingKey::from_rsa_pem(pem.as_bytes())
        .map_err(|e| Error::Credential(format!("invalid signing key: {e}")))?;
    jsonwebtoken::encode(
        &Header {
            alg: Algorithm::RS256,
            ..Default::default()
        },
        &payload,
        &key,
    )
    .map_err(|e| Error::Credential(format!("failed to sign JWT: {e}")))
}

fn try_parse_private_key(pem: &str, password: Option<&[u8]>) -> Result<RsaPrivateKey> {
    if let Some(password) = password {
        if let Ok(private) = RsaPrivateKey::from_pkcs8_encrypted_pem(pem, password) {
            return Ok(private);
        }
    }

    RsaPrivateKey::from_pkcs8_pem(pem)
        .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
        .map_err(|e| Error::Credential(format!("failed to parse private key: {e}")))
}
