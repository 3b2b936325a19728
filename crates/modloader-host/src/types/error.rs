//! Error types and JSON-RPC error codes for the host bridge.

use modloader::{HijackError, LoaderError};

use super::message::{JsonRpcError, RequestId};

/// Standard JSON-RPC 2.0 error codes.
pub mod error_codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
}

/// Bridge-specific error codes.
pub mod host_error_codes {
    /// The bundle could not be hooked; run it unmodified.
    pub const HIJACK_FAILED: i32 = -32850;
    /// The asset pipeline reported an error.
    pub const LOADER_ERROR: i32 = -32851;
}

#[derive(thiserror::Error, Debug)]
pub enum HostError {
    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Hijack failed: {0}")]
    HijackFailed(#[from] HijackError),

    #[error("Loader error: {0}")]
    Loader(#[from] LoaderError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl HostError {
    pub fn code(&self) -> i32 {
        use error_codes::*;
        use host_error_codes::*;
        match self {
            HostError::ParseError(_) | HostError::Json(_) => PARSE_ERROR,
            HostError::InvalidRequest(_) => INVALID_REQUEST,
            HostError::MethodNotFound(_) => METHOD_NOT_FOUND,
            HostError::InvalidParams(_) => INVALID_PARAMS,
            HostError::InternalError(_) | HostError::Io(_) => INTERNAL_ERROR,
            HostError::HijackFailed(_) => HIJACK_FAILED,
            HostError::Loader(_) => LOADER_ERROR,
        }
    }

    pub fn to_json_rpc_error(&self, id: RequestId) -> JsonRpcError {
        JsonRpcError::new(id, self.code(), self.to_string())
    }
}

pub type HostResult<T> = Result<T, HostError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        assert_eq!(
            HostError::HijackFailed(HijackError::AnchorNotFound).code(),
            host_error_codes::HIJACK_FAILED
        );
        assert_eq!(
            HostError::Loader(LoaderError::Config("bad".into())).code(),
            host_error_codes::LOADER_ERROR
        );
        assert_eq!(
            HostError::MethodNotFound("x".into()).code(),
            error_codes::METHOD_NOT_FOUND
        );
    }

    #[test]
    fn test_to_json_rpc_error_carries_message() {
        let err = HostError::InvalidParams("text required".into())
            .to_json_rpc_error(RequestId::Number(7));
        assert_eq!(err.id, RequestId::Number(7));
        assert_eq!(err.error.code, error_codes::INVALID_PARAMS);
        assert_eq!(err.error.message, "Invalid params: text required");
    }
}
