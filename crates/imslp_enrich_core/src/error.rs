use thiserror::Error;

/// Failure taxonomy shared by the fetcher, the resolver and the wiki client.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EnrichError {
    /// Connection failure, timeout or unreadable body. The only retried kind.
    #[error("transport error for {url}: {message}")]
    Transport { url: String, message: String },
    /// Bad JSON or a payload without the expected shape.
    #[error("malformed response from {url}: {message}")]
    MalformedResponse { url: String, message: String },
    /// The page or identifier does not exist on the wiki.
    #[error("resource missing: {0}")]
    ResourceMissing(String),
    /// The wiki client could not be built.
    #[error("wiki client unavailable: {0}")]
    Construction(String),
}

impl EnrichError {
    pub fn transport(url: &str, message: impl Into<String>) -> Self {
        Self::Transport {
            url: url.to_string(),
            message: message.into(),
        }
    }

    pub fn malformed(url: &str, message: impl Into<String>) -> Self {
        Self::MalformedResponse {
            url: url.to_string(),
            message: message.into(),
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_message_names_the_url() {
        let error = EnrichError::transport("https://imslp.org/w/api.php", "connection reset");
        assert!(error.is_transport());
        assert_eq!(
            error.to_string(),
            "transport error for https://imslp.org/w/api.php: connection reset"
        );
    }

    #[test]
    fn malformed_is_not_transport() {
        let error = EnrichError::malformed("https://imslp.org/w/api.php", "expected value");
        assert!(!error.is_transport());
        assert!(error.to_string().starts_with("malformed response"));
    }
}
