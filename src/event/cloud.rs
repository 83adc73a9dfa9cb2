//! # Cloud event envelopes (CloudEvents 0.1).
//!
//! Two encodings are recognised:
//!
//! - **structured**: the content type starts with `application/cloudevents` and
//!   the body is a JSON document carrying both attributes and `data`;
//! - **binary**: the `CE-CloudEventsVersion` header is present, attributes are
//!   carried in `CE-*` headers and the body is the payload as-is.
//!
//! Wrapping rewrites the event in place so that the runtime sees the envelope's
//! identifier, payload, content type and timestamp, and keeps the remaining
//! attributes in [`Event::cloud_event`](super::Event::cloud_event).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{Event, EventId};
use crate::error::CloudEventError;

/// Content type prefix of structured cloud events.
pub const STRUCTURED_CONTENT_TYPE_PREFIX: &str = "application/cloudevents";

/// Header whose presence marks a binary cloud event.
pub const BINARY_VERSION_HEADER: &str = "CE-CloudEventsVersion";

const BINARY_EXTENSION_PREFIX: &str = "CE-X-";

/// How the envelope was encoded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloudEventMode {
    /// Attributes and data in a JSON body.
    Structured,
    /// Attributes in `CE-*` headers, data in the body.
    Binary,
}

/// Cloud event attributes that have no direct counterpart on [`Event`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CloudEventAttributes {
    /// Encoding the event arrived in.
    pub mode: CloudEventMode,
    /// `cloudEventsVersion`.
    pub cloud_events_version: String,
    /// `eventType`.
    pub event_type: String,
    /// `eventTypeVersion`.
    pub event_type_version: Option<String>,
    /// `source`.
    pub source: String,
    /// `schemaURL`.
    pub schema_url: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StructuredEnvelope {
    #[serde(default)]
    cloud_events_version: String,
    #[serde(default)]
    event_type: String,
    #[serde(default)]
    event_type_version: Option<String>,
    #[serde(default)]
    source: String,
    #[serde(rename = "eventID", default)]
    event_id: Option<String>,
    #[serde(default)]
    event_time: Option<String>,
    #[serde(rename = "schemaURL", default)]
    schema_url: Option<String>,
    #[serde(default)]
    content_type: Option<String>,
    #[serde(default)]
    extensions: HashMap<String, serde_json::Value>,
    #[serde(default)]
    data: serde_json::Value,
}

/// Detects whether `event` is wrapped in a cloud event envelope.
pub fn detect(event: &Event) -> Option<CloudEventMode> {
    if event
        .content_type
        .starts_with(STRUCTURED_CONTENT_TYPE_PREFIX)
    {
        return Some(CloudEventMode::Structured);
    }
    match event.header(BINARY_VERSION_HEADER) {
        Some(version) if !version.is_empty() => Some(CloudEventMode::Binary),
        _ => None,
    }
}

/// Unwraps the envelope of `event` in place.
///
/// Returns `Ok(false)` when the event is not a cloud event (it is left untouched).
pub fn wrap(event: &mut Event) -> Result<bool, CloudEventError> {
    match detect(event) {
        Some(CloudEventMode::Structured) => wrap_structured(event).map(|()| true),
        Some(CloudEventMode::Binary) => wrap_binary(event).map(|()| true),
        None => Ok(false),
    }
}

fn wrap_structured(event: &mut Event) -> Result<(), CloudEventError> {
    let envelope: StructuredEnvelope = serde_json::from_slice(&event.body).map_err(|e| {
        CloudEventError::InvalidStructured {
            error: e.to_string(),
        }
    })?;

    let body = match envelope.data {
        serde_json::Value::Null => Vec::new(),
        serde_json::Value::String(text) => text.into_bytes(),
        other => serde_json::to_vec(&other).map_err(|e| CloudEventError::InvalidStructured {
            error: e.to_string(),
        })?,
    };

    event.timestamp = envelope.event_time.as_deref().map(parse_time).transpose()?;
    event.id = envelope.event_id.map(EventId::from);
    event.content_type = envelope.content_type.unwrap_or_default();
    event.body = body;
    event.headers = envelope
        .extensions
        .into_iter()
        .map(|(name, value)| match value {
            serde_json::Value::String(text) => (name, text),
            other => (name, other.to_string()),
        })
        .collect();
    event.cloud_event = Some(CloudEventAttributes {
        mode: CloudEventMode::Structured,
        cloud_events_version: envelope.cloud_events_version,
        event_type: envelope.event_type,
        event_type_version: envelope.event_type_version,
        source: envelope.source,
        schema_url: envelope.schema_url,
    });
    Ok(())
}

fn wrap_binary(event: &mut Event) -> Result<(), CloudEventError> {
    let attr = |name: &str| event.header(name).map(str::to_string);

    let timestamp = attr("CE-EventTime").as_deref().map(parse_time).transpose()?;
    let attributes = CloudEventAttributes {
        mode: CloudEventMode::Binary,
        cloud_events_version: attr(BINARY_VERSION_HEADER).unwrap_or_default(),
        event_type: attr("CE-EventType").unwrap_or_default(),
        event_type_version: attr("CE-EventTypeVersion"),
        source: attr("CE-Source").unwrap_or_default(),
        schema_url: attr("CE-SchemaURL"),
    };
    let id = attr("CE-EventID");

    if event.content_type.is_empty() {
        if let Some(content_type) = attr("Content-Type") {
            event.content_type = content_type;
        }
    }

    let extensions: Vec<(String, String)> = event
        .headers
        .iter()
        .filter_map(|(name, value)| {
            strip_prefix_ignore_case(name, BINARY_EXTENSION_PREFIX)
                .map(|ext| (ext.to_string(), value.clone()))
        })
        .collect();
    event.headers.extend(extensions);

    event.id = id.map(EventId::from);
    event.timestamp = timestamp;
    event.cloud_event = Some(attributes);
    Ok(())
}

fn parse_time(value: &str) -> Result<DateTime<Utc>, CloudEventError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| CloudEventError::InvalidTime {
            value: value.to_string(),
            error: e.to_string(),
        })
}

fn strip_prefix_ignore_case<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    let head = value.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        value.get(prefix.len()..)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STRUCTURED: &str = r#"{
        "cloudEventsVersion": "0.1",
        "eventType": "com.example.someevent",
        "eventTypeVersion": "1.0",
        "source": "/mycontext",
        "eventID": "A234-1234-1234",
        "eventTime": "2018-04-05T17:31:00Z",
        "extensions": { "comExampleExtension": "value" },
        "contentType": "text/xml",
        "data": "valid xml"
    }"#;

    #[test]
    fn structured_envelope_is_unwrapped() {
        let mut ev = Event::new(STRUCTURED).with_content_type("application/cloudevents+json");
        assert!(wrap(&mut ev).unwrap());

        assert_eq!(ev.body, b"valid xml");
        assert_eq!(ev.content_type, "text/xml");
        assert_eq!(ev.id.as_ref().map(EventId::as_str), Some("A234-1234-1234"));
        assert_eq!(ev.header("comExampleExtension"), Some("value"));
        assert_eq!(ev.trigger_kind(), Some("/mycontext"));
        assert_eq!(
            ev.timestamp.map(|t| t.to_rfc3339()),
            Some("2018-04-05T17:31:00+00:00".to_string())
        );

        let ce = ev.cloud_event.unwrap();
        assert_eq!(ce.mode, CloudEventMode::Structured);
        assert_eq!(ce.event_type, "com.example.someevent");
        assert_eq!(ce.event_type_version.as_deref(), Some("1.0"));
        assert_eq!(ce.cloud_events_version, "0.1");
    }

    #[test]
    fn structured_object_data_is_reencoded() {
        let body = r#"{"source":"s","data":{"a":1}}"#;
        let mut ev = Event::new(body).with_content_type("application/cloudevents+json");
        wrap(&mut ev).unwrap();
        assert_eq!(ev.body, br#"{"a":1}"#);
    }

    #[test]
    fn binary_envelope_reads_headers() {
        let mut ev = Event::new("valid xml")
            .with_content_type("text/xml")
            .with_header("CE-EventID", "A234-1234-1234")
            .with_header("CE-Source", "/mycontext")
            .with_header("CE-EventTime", "2018-04-05T17:31:00Z")
            .with_header("CE-EventType", "com.example.someevent")
            .with_header("CE-EventTypeVersion", "1.0")
            .with_header("CE-CloudEventsVersion", "0.1")
            .with_header("CE-X-Trace", "t1");
        assert!(wrap(&mut ev).unwrap());

        assert_eq!(ev.body, b"valid xml");
        assert_eq!(ev.content_type, "text/xml");
        assert_eq!(ev.id.as_ref().map(EventId::as_str), Some("A234-1234-1234"));
        assert_eq!(ev.header("Trace"), Some("t1"));
        assert_eq!(ev.cloud_event.as_ref().map(|c| c.mode), Some(CloudEventMode::Binary));
        assert_eq!(ev.trigger_kind(), Some("/mycontext"));
    }

    #[test]
    fn plain_event_is_left_alone() {
        let mut ev = Event::new("hello").with_content_type("text/plain");
        let before = ev.clone();
        assert!(!wrap(&mut ev).unwrap());
        assert_eq!(ev, before);
    }

    #[test]
    fn malformed_structured_body_is_rejected() {
        let mut ev = Event::new("not json").with_content_type("application/cloudevents+json");
        let err = wrap(&mut ev).unwrap_err();
        assert_eq!(err.as_label(), "cloud_event_invalid_structured");
    }

    #[test]
    fn bad_event_time_is_rejected() {
        let mut ev = Event::new("x")
            .with_header("CE-CloudEventsVersion", "0.1")
            .with_header("CE-EventTime", "yesterday");
        assert!(matches!(
            wrap(&mut ev),
            Err(CloudEventError::InvalidTime { .. })
        ));
    }
}
