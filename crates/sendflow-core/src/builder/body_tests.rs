//! Tests for body serialization.

use super::serialize_body;
use crate::descriptor::{BodyFormat, RequestDescriptor};

fn post_with_format(body: serde_json::Value, format: BodyFormat) -> RequestDescriptor {
    let mut descriptor = RequestDescriptor::post("https://example.com", body);
    descriptor.body_format = format;
    descriptor
}

#[test]
fn test_no_body_serializes_to_none() {
    let mut descriptor = RequestDescriptor::get("https://example.com");
    descriptor.method = crate::descriptor::HttpMethod::Post;
    assert!(serialize_body(&descriptor).unwrap().is_none());
}

#[test]
fn test_json_body() {
    let descriptor = post_with_format(
        serde_json::json!({"name": "widget", "count": 3}),
        BodyFormat::Json,
    );
    let body = serialize_body(&descriptor).unwrap().unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(parsed["name"], "widget");
    assert_eq!(parsed["count"], 3);
}

#[test]
fn test_form_body_repeats_list_values() {
    let descriptor = post_with_format(
        serde_json::json!({"tag": ["a", "b"], "page": 2}),
        BodyFormat::Form,
    );
    let body = serialize_body(&descriptor).unwrap().unwrap();
    assert!(body.contains("tag=a"));
    assert!(body.contains("tag=b"));
    assert!(body.contains("page=2"));
}

#[test]
fn test_form_body_requires_an_object() {
    let descriptor = post_with_format(serde_json::json!([1, 2, 3]), BodyFormat::Form);
    assert!(serialize_body(&descriptor).is_err());
}

#[test]
fn test_xml_body_nests_objects_and_repeats_arrays() {
    let descriptor = post_with_format(
        serde_json::json!({"item": {"name": "widget"}, "tag": ["a", "b"]}),
        BodyFormat::Xml,
    );
    let body = serialize_body(&descriptor).unwrap().unwrap();
    assert!(body.starts_with("<root>"));
    assert!(body.ends_with("</root>"));
    assert!(body.contains("<item><name>widget</name></item>"));
    assert!(body.contains("<tag>a</tag><tag>b</tag>"));
}

#[test]
fn test_xml_escapes_text_content() {
    let descriptor = post_with_format(
        serde_json::json!({"note": "a < b & c"}),
        BodyFormat::Xml,
    );
    let body = serialize_body(&descriptor).unwrap().unwrap();
    assert!(body.contains("a &lt; b &amp; c"));
}

#[test]
fn test_yaml_body() {
    let descriptor = post_with_format(serde_json::json!({"name": "widget"}), BodyFormat::Yaml);
    let body = serialize_body(&descriptor).unwrap().unwrap();
    assert!(body.contains("name: widget"));
}

#[test]
fn test_raw_string_passes_through() {
    let descriptor = post_with_format(
        serde_json::Value::String("opaque-payload".to_string()),
        BodyFormat::Raw,
    );
    assert_eq!(
        serialize_body(&descriptor).unwrap().unwrap(),
        "opaque-payload"
    );
}

#[test]
fn test_text_string_passes_through() {
    let descriptor = post_with_format(
        serde_json::Value::String("hello".to_string()),
        BodyFormat::Text,
    );
    assert_eq!(serialize_body(&descriptor).unwrap().unwrap(), "hello");
}
