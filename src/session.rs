use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::truncate_body;
use crate::{Error, Result};

/// Tokens are treated as stale this many seconds before `expires_at`.
const EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Debug, Default)]
struct TokenState {
    access_token: Option<String>,
    expires_at: Option<DateTime<Utc>>,
}

impl TokenState {
    fn usable(&self, now: DateTime<Utc>) -> Option<&str> {
        let token = self.access_token.as_deref()?;
        match self.expires_at {
            // No expiry reported: valid until a request says otherwise.
            None => Some(token),
            Some(at) if now + Duration::seconds(EXPIRY_MARGIN_SECS) < at => Some(token),
            Some(_) => None,
        }
    }
}

/// Owns the credentials and the access-token lifecycle for one account.
///
/// The mutex is held across the whole login exchange: concurrent callers
/// of [`Session::ensure_authenticated`] queue behind a single in-flight
/// sign-in and observe the token it produced.
pub(crate) struct Session {
    email: String,
    password: String,
    state: Mutex<TokenState>,
}

impl Session {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            state: Mutex::new(TokenState::default()),
        }
    }

    /// Returns a usable bearer token, signing in first if none exists or
    /// the current one is past its freshness margin.
    pub async fn ensure_authenticated(
        &self,
        http: &reqwest::Client,
        base_url: &str,
    ) -> Result<String> {
        let mut state = self.state.lock().await;
        if let Some(token) = state.usable(Utc::now()) {
            return Ok(token.to_string());
        }

        let url = format!("{base_url}/auth/signin");
        debug!(url = %url, email = %self.email, "signing in");

        let resp = http
            .post(&url)
            .json(&serde_json::json!({
                "grant_type": "password",
                "email": self.email,
                "password": self.password,
            }))
            .send()
            .await?;

        let status = resp.status().as_u16();
        let body = resp.text().await?;

        if !(200..300).contains(&status) {
            warn!(status, "sign-in rejected");
            return Err(Error::Auth {
                message: format!("sign-in returned status {status}"),
                body: truncate_body(&body),
            });
        }

        let parsed: Value = serde_json::from_str(&body).map_err(|e| Error::Auth {
            message: format!("sign-in body is not JSON: {e}"),
            body: truncate_body(&body),
        })?;

        let token = extract_token(&parsed).ok_or_else(|| Error::Auth {
            message: "sign-in body carries no recognizable token".to_string(),
            body: truncate_body(&body),
        })?;

        state.access_token = Some(token.clone());
        state.expires_at = extract_expires_in(&parsed)
            .map(|secs| Utc::now() + Duration::seconds(secs));

        debug!(expires_at = ?state.expires_at, "sign-in succeeded");
        Ok(token)
    }

    /// Forcibly drops the token, forcing the next call to sign in again.
    /// Called after a request observes an authorization failure.
    pub async fn invalidate(&self) {
        let mut state = self.state.lock().await;
        state.access_token = None;
        state.expires_at = None;
    }
}

/// The backend has been seen nesting the token under several keys
/// depending on dialect. Tried in order.
fn extract_token(body: &Value) -> Option<String> {
    for candidate in [
        body.get("access_token"),
        body.get("token"),
        body.pointer("/data/access_token"),
        body.pointer("/data/token"),
    ] {
        if let Some(token) = candidate.and_then(|v| v.as_str())
            && !token.is_empty()
        {
            return Some(token.to_string());
        }
    }
    None
}

fn extract_expires_in(body: &Value) -> Option<i64> {
    body.get("expires_in")
        .or_else(|| body.pointer("/data/expires_in"))
        .and_then(|v| v.as_i64())
        .filter(|secs| *secs > 0)
}
