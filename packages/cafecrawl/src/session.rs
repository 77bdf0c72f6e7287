//! Credentials for the platform's authenticated endpoints.
//!
//! Logging in happens outside this crate; a provider only hands over the
//! resulting cookie header.

use std::{fmt, future::Future};

use crate::Error;

#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    cookie: String,
}

impl Session {
    pub fn new(cookie: impl Into<String>) -> Self {
        Self {
            cookie: cookie.into(),
        }
    }

    /// Value of the `cookie` request header.
    pub fn cookie(&self) -> &str {
        &self.cookie
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("cookie", &format_args!("<{} bytes>", self.cookie.len()))
            .finish()
    }
}

pub trait SessionProvider {
    fn acquire_session(&self) -> impl Future<Output = Result<Session, Error>> + Send;
}

/// A cookie string captured ahead of time.
pub struct StaticSession(pub String);

impl SessionProvider for StaticSession {
    async fn acquire_session(&self) -> Result<Session, Error> {
        session_from(&self.0, "static cookie")
    }
}

/// Reads the cookie string from an environment variable.
pub struct EnvSession {
    var: String,
}

impl EnvSession {
    pub const DEFAULT_VAR: &'static str = "NAVER_COOKIE";

    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl Default for EnvSession {
    fn default() -> Self {
        Self::new(Self::DEFAULT_VAR)
    }
}

impl SessionProvider for EnvSession {
    async fn acquire_session(&self) -> Result<Session, Error> {
        let cookie = std::env::var(&self.var)
            .map_err(|e| Error::Session(format!("{}: {e}", self.var)))?;
        session_from(&cookie, &self.var)
    }
}

fn session_from(cookie: &str, origin: &str) -> Result<Session, Error> {
    let cookie = cookie.trim();
    if cookie.is_empty() {
        return Err(Error::Session(format!("{origin} is empty")));
    }
    Ok(Session::new(cookie))
}
