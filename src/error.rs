use std::fmt;

#[derive(Debug)]
pub enum Error {
    /// Credential rejected or token exchange malformed. Carries the
    /// truncated response body, never the password.
    Auth { message: String, body: String },
    /// Non-2xx application response.
    Api { status: u16, body: String },
    /// Connection/timeout-level failure, no status available.
    Transport(reqwest::Error),
    /// Response structure the client cannot make sense of.
    Protocol(String),
}

impl Error {
    /// Server-class (5xx) application error. Triggers the degraded
    /// device-list fallback path.
    pub fn is_server_error(&self) -> bool {
        matches!(self, Error::Api { status, .. } if (500..600).contains(status))
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Auth { message, body } => write!(f, "authentication failed: {message}: {body}"),
            Error::Api { status, body } => write!(f, "API error {status}: {body}"),
            Error::Transport(e) => write!(f, "transport error: {e}"),
            Error::Protocol(msg) => write!(f, "protocol error: {msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Transport(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Transport(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Bound the response text quoted in error messages to 200 characters,
/// truncation marker included: enough to diagnose, not enough to flood a
/// log line.
pub(crate) fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.chars().count() <= MAX {
        body.to_string()
    } else {
        let cut: String = body.chars().take(MAX - 1).collect();
        format!("{cut}…")
    }
}
