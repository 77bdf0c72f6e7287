use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Failed to build runtime: {0}")]
    Runtime(std::io::Error),

    #[error(transparent)]
    Fetch(Box<FetchError>),
}

impl From<FetchError> for Error {
    fn from(err: FetchError) -> Self {
        Error::Fetch(Box::new(err))
    }
}

/// A failure to fetch or decode a single remote resource.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind:?} error for {url}: {message}")]
pub struct FetchError {
    kind: FetchErrorKind,
    url: String,
    message: String,
    excerpt: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum FetchErrorKind {
    /// Timeout, connection failure or non-2xx status.
    Request,
    /// Body is not the expected JSON shape.
    Decode,
    /// Body carries the platform's login error code.
    Session,
}

impl FetchError {
    const EXCERPT_LEN: usize = 200;

    pub fn request(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::Request,
            url: url.into(),
            message: message.into(),
            excerpt: None,
        }
    }

    pub fn decode(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::Decode,
            url: url.into(),
            message: message.into(),
            excerpt: None,
        }
    }

    pub fn session(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::Session,
            url: url.into(),
            message: message.into(),
            excerpt: None,
        }
    }

    /// Attaches the head of the raw body for diagnosis.
    pub fn with_excerpt(mut self, body: &str) -> Self {
        self.excerpt = Some(body.chars().take(Self::EXCERPT_LEN).collect());
        self
    }

    pub fn kind(&self) -> FetchErrorKind {
        self.kind
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn excerpt(&self) -> Option<&str> {
        self.excerpt.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excerpt_is_truncated_on_char_boundary() {
        let body = "가".repeat(300);
        let err = FetchError::decode("https://example.com", "bad json").with_excerpt(&body);
        assert_eq!(err.excerpt().map(|e| e.chars().count()), Some(200));
        assert_eq!(err.kind(), FetchErrorKind::Decode);
    }

    #[test]
    fn fetch_error_converts_into_boxed_error() {
        let err: Error = FetchError::request("https://example.com", "HTTP 500").into();
        assert!(matches!(err, Error::Fetch(ref e) if e.kind() == FetchErrorKind::Request));
    }
}
