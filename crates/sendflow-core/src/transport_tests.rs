//! Tests for transport result serialization.

use super::*;
use crate::descriptor::{BuiltRequest, HttpMethod};

fn request() -> BuiltRequest {
    BuiltRequest {
        method: HttpMethod::Get,
        url: "https://example.com/a".to_string(),
        headers: Default::default(),
        body: None,
        timeout_seconds: 30.0,
    }
}

/// The parsed body flattens to sibling `data_type` and `data` keys.
#[test]
fn test_body_flattens_into_result() {
    let mut result = TransportResult::failure(&request(), 0.1, "placeholder", ErrorKind::Unknown);
    result.success = true;
    result.error = None;
    result.error_kind = None;
    result.status_code = Some(200);
    result.body = Some(ResponseBody::Json(serde_json::json!({"ok": true})));

    let value = serde_json::to_value(&result).unwrap();
    assert_eq!(value["data_type"], "json");
    assert_eq!(value["data"]["ok"], true);
    assert_eq!(value["status_code"], 200);
    assert!(value.get("error").is_none());
}

#[test]
fn test_result_round_trips() {
    let mut result = TransportResult::failure(&request(), 0.25, "HTTP 503", ErrorKind::Unknown);
    result.status_code = Some(503);
    result.body = Some(ResponseBody::Text("service unavailable".to_string()));

    let json = serde_json::to_string(&result).unwrap();
    let restored: TransportResult = serde_json::from_str(&json).unwrap();
    assert_eq!(restored, result);
}

#[test]
fn test_binary_body_uses_base64() {
    let mut result = TransportResult::failure(&request(), 0.1, "placeholder", ErrorKind::Unknown);
    result.body = Some(ResponseBody::Binary(vec![0, 1, 2, 255]));

    let value = serde_json::to_value(&result).unwrap();
    assert_eq!(value["data_type"], "binary");
    assert_eq!(value["data"], "AAEC/w==");

    let restored: TransportResult = serde_json::from_value(value).unwrap();
    assert_eq!(restored.body, Some(ResponseBody::Binary(vec![0, 1, 2, 255])));
}

#[test]
fn test_absent_body_omits_data_keys() {
    let result = TransportResult::failure(&request(), 0.1, "connection reset", ErrorKind::ClientError);
    let value = serde_json::to_value(&result).unwrap();
    assert!(value.get("data_type").is_none());
    assert!(value.get("data").is_none());
    assert_eq!(value["error"], "connection reset");
    assert_eq!(value["error_kind"], "client_error");
}
