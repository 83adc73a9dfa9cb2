//! # Inbound events and function responses.
//!
//! An [`Event`] is what an event source hands to the submission pipeline; a
//! [`Response`] is what user code hands back. Both are plain data: the pipeline
//! never interprets the body, it only inspects the content type and headers to
//! detect a [cloud event](cloud) envelope.
//!
//! ## Identity
//! Events arriving without an identifier get a fresh [`EventId`] (UUID v4)
//! when they are prepared for dispatch. Cloud events keep the `eventID` they carry.

pub mod cloud;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

pub use cloud::{CloudEventAttributes, CloudEventMode};

/// Identifier of a single event.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(Arc<str>);

impl EventId {
    /// Generates a fresh random identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string().into())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EventId {
    fn from(value: &str) -> Self {
        Self(value.into())
    }
}

impl From<String> for EventId {
    fn from(value: String) -> Self {
        Self(value.into())
    }
}

/// Metadata describing the event source an event came through.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TriggerInfo {
    /// User given trigger identifier.
    pub id: Arc<str>,
    /// Specific kind of source (`http`, `kafka`, `cron`, ...).
    pub kind: Arc<str>,
    /// Class of source (`sync`, `async`, ...).
    pub class: Arc<str>,
}

/// An inbound event produced by an event source.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Event {
    /// Identifier; assigned during dispatch when absent.
    pub id: Option<EventId>,
    /// Declared content type of the body.
    pub content_type: String,
    /// Protocol headers (lookups through [`Event::header`] are case-insensitive).
    pub headers: HashMap<String, String>,
    /// Raw body.
    pub body: Vec<u8>,
    /// Request method, for request/response sources.
    pub method: Option<String>,
    /// Request path, for request/response sources.
    pub path: Option<String>,
    /// Time the event was produced, if known.
    pub timestamp: Option<DateTime<Utc>>,
    /// Source trigger metadata, attached during dispatch.
    pub trigger: Option<TriggerInfo>,
    /// Cloud event attributes when the event arrived in a cloud event envelope.
    pub cloud_event: Option<CloudEventAttributes>,
}

impl Event {
    /// Creates an event with the given body.
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self {
            body: body.into(),
            ..Self::default()
        }
    }

    /// Sets the content type.
    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Sets the identifier.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<EventId>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sets method and path.
    #[must_use]
    pub fn with_request(mut self, method: impl Into<String>, path: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self.path = Some(path.into());
        self
    }

    /// Returns a header value, matching the name case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Returns the identifier, assigning a fresh one if absent.
    pub fn ensure_id(&mut self) -> &EventId {
        self.id.get_or_insert_with(EventId::generate)
    }

    /// Kind of source the event came from.
    ///
    /// For cloud events this is the envelope's `source` attribute.
    pub fn trigger_kind(&self) -> Option<&str> {
        match (&self.cloud_event, &self.trigger) {
            (Some(ce), _) => Some(ce.source.as_str()),
            (None, Some(info)) => Some(&info.kind),
            (None, None) => None,
        }
    }
}

/// Response produced by user code for one event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Response {
    /// Protocol-neutral status code (HTTP semantics).
    pub status_code: u16,
    /// Content type of the body.
    pub content_type: String,
    /// Response headers.
    pub headers: HashMap<String, String>,
    /// Response body.
    pub body: Vec<u8>,
}

impl Response {
    /// Creates a `200` response with a `text/plain` body.
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            status_code: 200,
            content_type: "text/plain".to_string(),
            headers: HashMap::new(),
            body: body.into().into_bytes(),
        }
    }

    /// Creates an empty response with the given status.
    pub fn empty(status_code: u16) -> Self {
        Self {
            status_code,
            content_type: String::new(),
            headers: HashMap::new(),
            body: Vec::new(),
        }
    }

    /// Sets the status code.
    #[must_use]
    pub fn with_status(mut self, status_code: u16) -> Self {
        self.status_code = status_code;
        self
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::empty(200)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_lookup_ignores_case() {
        let ev = Event::new("x").with_header("Content-Type", "text/xml");
        assert_eq!(ev.header("content-type"), Some("text/xml"));
        assert_eq!(ev.header("missing"), None);
    }

    #[test]
    fn ensure_id_keeps_existing_identifier() {
        let mut ev = Event::new("x").with_id("abc");
        assert_eq!(ev.ensure_id().as_str(), "abc");

        let mut fresh = Event::new("y");
        let first = fresh.ensure_id().clone();
        assert_eq!(fresh.ensure_id(), &first);
    }

    #[test]
    fn generated_ids_are_distinct() {
        assert_ne!(EventId::generate(), EventId::generate());
    }
}
