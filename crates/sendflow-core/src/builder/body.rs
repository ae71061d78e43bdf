//! Body serialization by declared format.

use crate::descriptor::{BodyFormat, RequestDescriptor};
use crate::{BuildError, BuildResult};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

#[cfg(test)]
#[path = "body_tests.rs"]
mod tests;

/// Serialize the descriptor body for body-carrying methods.
///
/// Returns `None` when the descriptor has no body. `raw` string bodies pass
/// through untouched; structured bodies under `raw`, `text`, or `multipart`
/// fall back to their JSON rendering (the transport does not build
/// multipart streams).
pub(crate) fn serialize_body(descriptor: &RequestDescriptor) -> BuildResult<Option<String>> {
    let Some(body) = &descriptor.body else {
        return Ok(None);
    };

    let rendered = match descriptor.body_format {
        BodyFormat::Json | BodyFormat::Multipart => serde_json::to_string(body)?,
        BodyFormat::Xml => to_xml(body)?,
        BodyFormat::Form => to_form(body)?,
        BodyFormat::Yaml => {
            serde_yaml::to_string(body).map_err(|error| BuildError::BodySerialization {
                message: error.to_string(),
            })?
        }
        BodyFormat::Text | BodyFormat::Raw => match body {
            serde_json::Value::String(text) => text.clone(),
            other => serde_json::to_string(other)?,
        },
    };

    Ok(Some(rendered))
}

/// Render an object as `application/x-www-form-urlencoded` pairs.
/// List values repeat the key; scalars are stringified.
fn to_form(body: &serde_json::Value) -> BuildResult<String> {
    let serde_json::Value::Object(map) = body else {
        return Err(BuildError::BodySerialization {
            message: "form bodies must be objects".to_string(),
        });
    };

    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in map {
        match value {
            serde_json::Value::Array(items) => {
                for item in items {
                    serializer.append_pair(key, &scalar_text(item));
                }
            }
            other => {
                serializer.append_pair(key, &scalar_text(other));
            }
        }
    }
    Ok(serializer.finish())
}

/// Render a value as XML under a `root` element.
///
/// Objects become nested elements, arrays repeat their parent's element
/// name, scalars become text content.
fn to_xml(body: &serde_json::Value) -> BuildResult<String> {
    let mut writer = Writer::new(Vec::new());
    write_element(&mut writer, "root", body)?;
    String::from_utf8(writer.into_inner()).map_err(|error| BuildError::BodySerialization {
        message: error.to_string(),
    })
}

fn write_element(
    writer: &mut Writer<Vec<u8>>,
    name: &str,
    value: &serde_json::Value,
) -> BuildResult<()> {
    match value {
        serde_json::Value::Object(map) => {
            write_event(writer, Event::Start(BytesStart::new(name)))?;
            for (key, child) in map {
                match child {
                    serde_json::Value::Array(items) => {
                        for item in items {
                            write_element(writer, key, item)?;
                        }
                    }
                    other => write_element(writer, key, other)?,
                }
            }
            write_event(writer, Event::End(BytesEnd::new(name)))
        }
        serde_json::Value::Array(items) => {
            for item in items {
                write_element(writer, name, item)?;
            }
            Ok(())
        }
        scalar => {
            write_event(writer, Event::Start(BytesStart::new(name)))?;
            let text = scalar_text(scalar);
            write_event(writer, Event::Text(BytesText::new(&text)))?;
            write_event(writer, Event::End(BytesEnd::new(name)))
        }
    }
}

fn write_event(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> BuildResult<()> {
    writer
        .write_event(event)
        .map_err(|error| BuildError::BodySerialization {
            message: error.to_string(),
        })
}

fn scalar_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(text) => text.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}
