//! Service-account token exchange
//!
//! Signs an RS256 JWT assertion with the key's private key and trades it at
//! the key's `token_uri` for a short-lived OAuth access token.

use crate::credentials::ServiceAccountKey;
use crate::error::CredentialError;
use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const BIGQUERY_SCOPE: &str = "https://www.googleapis.com/auth/bigquery";
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// Claims of the signed assertion
#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct Claims {
    iss: String,
    scope: String,
    aud: String,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct TokenError {
    #[serde(default)]
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

fn token_uri(key: &ServiceAccountKey) -> &str {
    key.token_uri
        .as_deref()
        .filter(|uri| !uri.trim().is_empty())
        .unwrap_or(DEFAULT_TOKEN_URI)
}

/// Build the signed assertion for `key`, issued at `issued_at` (unix seconds)
fn build_assertion(key: &ServiceAccountKey, issued_at: i64) -> Result<String, CredentialError> {
    let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
        .map_err(|e| CredentialError::InvalidPrivateKey(e.to_string()))?;

    let mut header = Header::new(Algorithm::RS256);
    header.kid = key.private_key_id.clone();

    let claims = Claims {
        iss: key.client_email.clone(),
        scope: BIGQUERY_SCOPE.to_string(),
        aud: token_uri(key).to_string(),
        iat: issued_at,
        exp: issued_at + ASSERTION_LIFETIME_SECS,
    };

    jsonwebtoken::encode(&header, &claims, &encoding_key)
        .map_err(|e| CredentialError::InvalidPrivateKey(e.to_string()))
}

/// Exchange the key for an access token
pub async fn fetch_access_token(
    http: &reqwest::Client,
    key: &ServiceAccountKey,
) -> Result<String, CredentialError> {
    let assertion = build_assertion(key, Utc::now().timestamp())?;
    let uri = token_uri(key);
    debug!("Requesting access token for {} from {}", key.client_email, uri);

    let response = http
        .post(uri)
        .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
        .send()
        .await
        .map_err(|e| CredentialError::TokenExchange(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let detail = match serde_json::from_str::<TokenError>(&body) {
            Ok(TokenError {
                error_description: Some(description),
                ..
            }) => description,
            Ok(TokenError { error, .. }) if !error.is_empty() => error,
            _ => body.trim().to_string(),
        };
        return Err(CredentialError::TokenExchange(format!(
            "{} {}",
            status.as_u16(),
            detail
        )));
    }

    let token: TokenResponse = response
        .json()
        .await
        .map_err(|e| CredentialError::TokenExchange(format!("Failed to parse response: {}", e)))?;
    Ok(token.access_token)
}
