use std::fmt;

/// Errors raised while answering a query from an upstream route server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// Connection failure, timeout or non-success HTTP status
    Transport {
        url: String,
        /// HTTP status when the upstream did answer
        status: Option<u16>,
        message: String,
    },
    /// Malformed JSON or an unexpected shape
    Decode { url: String, message: String },
    /// The requested neighbour is not part of the current protocols listing
    UnknownNeighbour(String),
    /// An optional upstream module is missing or failing
    ModuleUnavailable { module: String, message: String },
    /// The source is misconfigured
    Config(String),
    /// The source failed unexpectedly while answering
    Internal(String),
}

pub type SourceResult<T> = Result<T, SourceError>;

impl SourceError {
    pub fn transport(url: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Transport {
            url: url.into(),
            status: None,
            message: message.to_string(),
        }
    }

    /// The upstream answered with a non-success HTTP status
    pub fn status(url: impl Into<String>, status: u16) -> Self {
        Self::Transport {
            url: url.into(),
            status: Some(status),
            message: format!("http status: {}", status),
        }
    }

    pub fn decode(url: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Decode {
            url: url.into(),
            message: message.to_string(),
        }
    }

    pub fn module_unavailable(module: &str, cause: &SourceError) -> Self {
        Self::ModuleUnavailable {
            module: module.to_string(),
            message: cause.to_string(),
        }
    }

    /// Whether the upstream was reached and answered, even if unusably
    pub fn upstream_answered(&self) -> bool {
        matches!(
            self,
            Self::Transport {
                status: Some(_),
                ..
            } | Self::Decode { .. }
        )
    }

    /// Whether the error comes from talking to the upstream at all
    pub fn is_upstream(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Decode { .. })
    }
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceError::Transport { url, message, .. } => {
                write!(f, "Request to {} failed: {}", url, message)
            }
            SourceError::Decode { url, message } => {
                write!(f, "Invalid response from {}: {}", url, message)
            }
            SourceError::UnknownNeighbour(id) => write!(f, "Invalid neighbour: {}", id),
            SourceError::ModuleUnavailable { module, message } => {
                write!(f, "Module '{}' unavailable: {}", module, message)
            }
            SourceError::Config(message) => write!(f, "Invalid source configuration: {}", message),
            SourceError::Internal(message) => write!(f, "Internal source failure: {}", message),
        }
    }
}

impl std::error::Error for SourceError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = SourceError::UnknownNeighbour("R192_1".to_string());
        assert_eq!(err.to_string(), "Invalid neighbour: R192_1");

        let err = SourceError::transport("http://rs1/status", "timed out");
        assert_eq!(err.to_string(), "Request to http://rs1/status failed: timed out");
        assert!(err.is_upstream());
        assert!(!err.upstream_answered());

        let err = SourceError::status("http://rs1/neighbors/summary", 404);
        assert_eq!(
            err.to_string(),
            "Request to http://rs1/neighbors/summary failed: http status: 404"
        );
        assert!(err.upstream_answered());

        let cause = SourceError::decode("http://rs1/routes/filtered/R1", "expected value");
        let err = SourceError::module_unavailable("routes_filtered", &cause);
        assert!(!err.is_upstream());
        assert!(err.to_string().starts_with("Module 'routes_filtered' unavailable"));
    }
}
