//! Request validation.

use crate::types::{HostError, HostResult, JsonRpcRequest, JSONRPC_VERSION};

/// Validate that a JSON-RPC request is well-formed.
pub fn validate_request(request: &JsonRpcRequest) -> HostResult<()> {
    if request.jsonrpc != JSONRPC_VERSION {
        return Err(HostError::InvalidRequest(format!(
            "Expected jsonrpc version \"{JSONRPC_VERSION}\", got \"{}\"",
            request.jsonrpc
        )));
    }

    if request.method.is_empty() {
        return Err(HostError::InvalidRequest(
            "Method name must not be empty".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RequestId;

    fn request(jsonrpc: &str, method: &str) -> JsonRpcRequest {
        JsonRpcRequest {
            jsonrpc: jsonrpc.to_string(),
            id: RequestId::Number(1),
            method: method.to_string(),
            params: None,
        }
    }

    #[test]
    fn test_rejects_wrong_version_and_empty_method() {
        assert!(validate_request(&request("2.0", "ping")).is_ok());
        assert!(matches!(
            validate_request(&request("1.0", "ping")),
            Err(HostError::InvalidRequest(_))
        ));
        assert!(matches!(
            validate_request(&request("2.0", "")),
            Err(HostError::InvalidRequest(_))
        ));
    }
}
