//! Error types for the tile cache.

use thiserror::Error;

/// Result type alias using CacheError.
pub type CacheResult<T> = Result<T, CacheError>;

/// Primary error type shared by every cache crate.
#[derive(Debug, Error)]
pub enum CacheError {
    // === Caller Errors ===
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Invalid parameter value for '{param}': {message}")]
    InvalidParameter { param: String, message: String },

    #[error("Incompatible content '{table}': {message}")]
    Incompatible { table: String, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Container is read-only, cannot {0}")]
    ReadOnly(String),

    // === Remote Service Errors ===
    #[error("Negotiation failed for '{layer}': {message}")]
    Negotiation { layer: String, message: String },

    #[error("HTTP request to {url} failed: {message}")]
    Http { url: String, message: String },

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Service exception: {0}")]
    ServiceException(String),

    #[error("Invalid XML document: {0}")]
    Xml(String),

    // === Storage Errors ===
    #[error("Database error: {0}")]
    Database(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Codec error: {0}")]
    Codec(String),
}

impl CacheError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn incompatible(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Incompatible {
            table: table.into(),
            message: message.into(),
        }
    }

    pub fn negotiation(layer: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Negotiation {
            layer: layer.into(),
            message: message.into(),
        }
    }

    pub fn http(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Http {
            url: url.into(),
            message: message.into(),
        }
    }

    pub fn invalid_parameter(param: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            param: param.into(),
            message: message.into(),
        }
    }

    /// Errors a later retry may not hit again. A failed tile stays a miss and
    /// is fetched again on the next request.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CacheError::Http { .. } | CacheError::Timeout(_) | CacheError::Io(_)
        )
    }

    /// Short label used for log fields and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            CacheError::Validation(_) => "validation",
            CacheError::InvalidParameter { .. } => "invalid_parameter",
            CacheError::Incompatible { .. } => "incompatible",
            CacheError::NotFound(_) => "not_found",
            CacheError::ReadOnly(_) => "read_only",
            CacheError::Negotiation { .. } => "negotiation",
            CacheError::Http { .. } => "http",
            CacheError::Timeout(_) => "timeout",
            CacheError::ServiceException(_) => "service_exception",
            CacheError::Xml(_) => "xml",
            CacheError::Database(_) => "database",
            CacheError::Io(_) => "io",
            CacheError::Codec(_) => "codec",
        }
    }
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(CacheError::http("http://x", "503").is_transient());
        assert!(CacheError::Timeout("GetMap".into()).is_transient());
        assert!(!CacheError::negotiation("layer", "no CRS").is_transient());
        assert!(!CacheError::ReadOnly("write tile".into()).is_transient());
    }

    #[test]
    fn test_messages() {
        let err = CacheError::incompatible("srtm", "tile width differs");
        assert_eq!(
            err.to_string(),
            "Incompatible content 'srtm': tile width differs"
        );
        assert_eq!(err.kind(), "incompatible");
    }
}
