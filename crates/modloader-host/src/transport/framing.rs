//! Message framing for newline-delimited JSON.

use crate::types::{HostError, HostResult, JsonRpcMessage};

/// Parse a single line of text as a JSON-RPC message.
pub fn parse_message(line: &str) -> HostResult<JsonRpcMessage> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Err(HostError::ParseError("Empty message".to_string()));
    }

    serde_json::from_str(trimmed).map_err(|e| HostError::ParseError(e.to_string()))
}

/// Serialize a value to a JSON line (with trailing newline).
pub fn frame_message(value: &serde_json::Value) -> HostResult<String> {
    let mut json = serde_json::to_string(value).map_err(HostError::Json)?;
    json.push('\n');
    Ok(json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_rejects_empty_and_garbage() {
        assert!(matches!(parse_message("   "), Err(HostError::ParseError(_))));
        assert!(matches!(parse_message("{not json"), Err(HostError::ParseError(_))));
    }

    #[test]
    fn test_frame_is_single_line() {
        let framed = frame_message(&json!({"text": "a\nb"})).unwrap();
        assert_eq!(framed, "{\"text\":\"a\\nb\"}\n");
    }
}
