// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! Service-account authentication glue: mint a signed custom-token assertion
//! and exchange it for an identity-platform bearer token.
//!
//! Neither half talks to the streaming engine directly — callers mint a
//! token with [`custom_token_from_service_account`], exchange it with
//! [`id_token_from_custom_token`], and use the resulting [`BearerToken`] to
//! authenticate whatever upstream collaborator backs an
//! `rtdb_upstream::UpstreamSource`.

use std::collections::BTreeMap;

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use rtdb_error::{ErrorCode, RtdbError};

const IDENTITYTOOLKIT_AUDIENCE: &str =
    "https://identitytoolkit.googleapis.com/google.identity.identitytoolkit.v1.IdentityToolkit";
const VERIFY_CUSTOM_TOKEN_URL: &str =
    "https://www.googleapis.com/identitytoolkit/v3/relyingparty/verifyCustomToken";
const CUSTOM_TOKEN_LIFETIME_SECS: i64 = 3600;
const MAX_UID_LEN: usize = 128;

/// Credentials lifted from a Google service-account JSON key file.
#[derive(Debug, Clone)]
pub struct ServiceAccount {
    /// The GCP project ID the service account belongs to.
    pub project_id: String,
    /// The service account's email, used as both `iss` and `sub`.
    pub client_email: String,
    /// The PEM-encoded RSA private key backing the account.
    pub private_key: String,
}

impl ServiceAccount {
    fn validate(&self) -> Result<(), RtdbError> {
        if self.project_id.is_empty() || self.client_email.is_empty() || self.private_key.is_empty()
        {
            return Err(RtdbError::new(
                ErrorCode::MissingCredentialField,
                "google service account credentials missing project_id, client_email or private_key",
            ));
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct Claims {
    iat: i64,
    exp: i64,
    aud: &'static str,
    iss: String,
    sub: String,
    uid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    claims: Option<BTreeMap<String, String>>,
}

/// Mint a custom-token assertion for `uid`, signed RS256 with `account`'s
/// private key.
///
/// Rejects an empty `uid`, a `uid` longer than 128 characters, or a service
/// account missing any of `project_id`/`client_email`/`private_key`.
pub fn custom_token_from_service_account(
    account: &ServiceAccount,
    uid: &str,
    extra_claims: Option<&BTreeMap<String, String>>,
) -> Result<String, RtdbError> {
    account.validate()?;
    tracing::debug!(uid, client_email = %account.client_email, "minting custom token");

    if uid.is_empty() {
        return Err(RtdbError::new(
            ErrorCode::EmptyUid,
            "custom token must have non-empty uid assigned",
        ));
    }
    if uid.len() > MAX_UID_LEN {
        return Err(RtdbError::new(
            ErrorCode::UidTooLong,
            "custom token uid length must be less than or equal to 128 characters",
        ));
    }

    let signer = EncodingKey::from_rsa_pem(account.private_key.as_bytes()).map_err(|err| {
        tracing::warn!(client_email = %account.client_email, "could not build RS256 signer");
        RtdbError::with_source(ErrorCode::SignerConstruction, "could not build RS256 signer", err)
    })?;

    let now = Utc::now().timestamp();
    let claims = Claims {
        iat: now,
        exp: now + CUSTOM_TOKEN_LIFETIME_SECS,
        aud: IDENTITYTOOLKIT_AUDIENCE,
        iss: account.client_email.clone(),
        sub: account.client_email.clone(),
        uid: uid.to_owned(),
        claims: extra_claims.filter(|c| !c.is_empty()).cloned(),
    };

    encode(&Header::new(Algorithm::RS256), &claims, &signer).map_err(|err| {
        RtdbError::with_source(ErrorCode::TokenEncodingFailed, "could not encode claims", err)
    })
}

/// An identity-platform bearer token, exchanged from a custom-token
/// assertion.
#[derive(Debug, Clone)]
pub struct BearerToken {
    /// The bearer ID token itself.
    pub id_token: String,
    /// A refresh token that can later mint a new `id_token`.
    pub refresh_token: String,
    /// The token's expiry, read from its own `exp` claim rather than trusted
    /// from `expiresIn` (the two may disagree by clock skew).
    pub expiry: DateTime<Utc>,
}

#[derive(Deserialize)]
struct VerifyCustomTokenResponse {
    #[serde(rename = "idToken")]
    id_token: String,
    #[serde(rename = "refreshToken")]
    refresh_token: String,
}

/// Exchange a custom-token assertion for a [`BearerToken`] via the identity
/// platform's `verifyCustomToken` endpoint.
pub async fn id_token_from_custom_token(
    http: &reqwest::Client,
    token: &str,
    api_key: &str,
) -> Result<BearerToken, RtdbError> {
    tracing::debug!("exchanging custom token for bearer token");
    let response: VerifyCustomTokenResponse = http
        .post(VERIFY_CUSTOM_TOKEN_URL)
        .query(&[("key", api_key)])
        .json(&serde_json::json!({"token": token, "returnSecureToken": true}))
        .send()
        .await
        .map_err(|err| {
            tracing::warn!(error = %err, "custom token exchange request failed");
            RtdbError::with_source(ErrorCode::TokenExchangeFailed, "could not verify custom token", err)
        })?
        .error_for_status()
        .map_err(|err| {
            tracing::warn!(error = %err, "custom token exchange returned an error status");
            RtdbError::with_source(ErrorCode::TokenExchangeFailed, "could not verify custom token", err)
        })?
        .json()
        .await
        .map_err(|err| {
            RtdbError::with_source(ErrorCode::TokenExchangeFailed, "could not parse verify response", err)
        })?;

    let expiry = expiry_from_id_token(&response.id_token)?;

    Ok(BearerToken {
        id_token: response.id_token,
        refresh_token: response.refresh_token,
        expiry,
    })
}

/// Read the `exp` claim straight out of an id token's JWT payload segment,
/// tolerating unpadded base64url (the form Google's identity platform
/// actually returns).
fn expiry_from_id_token(id_token: &str) -> Result<DateTime<Utc>, RtdbError> {
    let payload_segment = id_token.split('.').nth(1).ok_or_else(|| {
        RtdbError::new(ErrorCode::TokenExpiryUnreadable, "cannot fetch exp from jwt token")
    })?;

    let decoded = decode_segment(payload_segment)?;
    let payload: Value = serde_json::from_slice(&decoded).map_err(|err| {
        RtdbError::with_source(ErrorCode::TokenExpiryUnreadable, "cannot parse jwt json", err)
    })?;

    let exp = payload.get("exp").and_then(Value::as_i64).ok_or_else(|| {
        RtdbError::new(ErrorCode::TokenExpiryUnreadable, "cannot fetch exp from jwt token")
    })?;

    DateTime::from_timestamp(exp, 0)
        .ok_or_else(|| RtdbError::new(ErrorCode::TokenExpiryUnreadable, "exp claim out of range"))
}

fn decode_segment(segment: &str) -> Result<Vec<u8>, RtdbError> {
    let mut padded = segment.to_owned();
    let remainder = padded.len() % 4;
    if remainder > 0 {
        padded.push_str(&"=".repeat(4 - remainder));
    }
    URL_SAFE
        .decode(padded)
        .map_err(|err| RtdbError::with_source(ErrorCode::TokenExpiryUnreadable, "cannot parse token", err))
}
