//! Unverified decoding of bearer token claims.
//!
//! Tokens are issued by the remote auth service as three base64url segments
//! (`header.payload.signature`). Only the payload is read, and only for
//! display and expiry bookkeeping. The signature is never checked; the
//! server remains the authority on whether a token is accepted.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::debug;

/// Claims read from a token payload. Unknown claims are ignored.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Claims {
    #[serde(default, deserialize_with = "epoch_seconds")]
    pub exp: Option<i64>,
    #[serde(default, deserialize_with = "epoch_seconds")]
    pub iat: Option<i64>,
    #[serde(default, rename = "userId", deserialize_with = "string_or_number")]
    pub user_id: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub sub: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl Claims {
    /// User identifier, trying `userId`, then `sub`, then `id`.
    pub fn subject(&self) -> Option<&str> {
        self.user_id
            .as_deref()
            .or(self.sub.as_deref())
            .or(self.id.as_deref())
            .filter(|s| !s.is_empty())
    }

    /// Display name, preferring `name` over `username`.
    pub fn display_name(&self) -> Option<&str> {
        self.name
            .as_deref()
            .or(self.username.as_deref())
            .filter(|s| !s.is_empty())
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.exp.and_then(|exp| Utc.timestamp_opt(exp, 0).single())
    }
}

/// Decode the payload of a token without verifying its signature.
///
/// Returns `None` for anything that is not a three-segment token whose
/// middle segment is base64url-encoded JSON object.
pub fn decode(token: &str) -> Option<Claims> {
    let mut segments = token.trim().split('.');
    let (Some(_header), Some(payload), Some(_signature), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        debug!("Token does not have three segments");
        return None;
    };

    let bytes = match URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')) {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!(error = %e, "Token payload is not valid base64url");
            return None;
        }
    };

    // Claims would also deserialize from a JSON array, field by position
    let payload = match serde_json::from_slice::<Value>(&bytes) {
        Ok(value @ Value::Object(_)) => value,
        Ok(_) => {
            debug!("Token payload is not a JSON object");
            return None;
        }
        Err(e) => {
            debug!(error = %e, "Token payload is not JSON");
            return None;
        }
    };

    match serde_json::from_value::<Claims>(payload) {
        Ok(claims) => Some(claims),
        Err(e) => {
            debug!(error = %e, "Token payload is not a claims object");
            None
        }
    }
}

/// Expiry instant of a token, if it decodes and carries `exp`.
pub fn expiration_date(token: &str) -> Option<DateTime<Utc>> {
    decode(token).and_then(|claims| claims.expires_at())
}

/// Time left before `token` expires, clamped at zero.
/// Zero as well when the token is undecodable or has no expiry.
pub fn time_remaining(token: &str, now: DateTime<Utc>) -> Duration {
    match expiration_date(token) {
        Some(expires_at) => (expires_at - now).max(Duration::zero()),
        None => Duration::zero(),
    }
}

fn epoch_seconds<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        _ => None,
    })
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Build an unsigned token around `payload`. Test helper only.
#[cfg(test)]
pub(crate) fn encode_unsigned(payload: &Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let body = URL_SAFE_NO_PAD.encode(payload.to_string());
    format!("{}.{}.signature", header, body)
}
