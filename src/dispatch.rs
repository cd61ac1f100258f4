//! Routing of decoded frames to accumulator actions.
//!
//! Each feature describes its upstream events as a [`RoutingProfile`]: a table
//! from event name to [`Route`], plus the events whose payload is a bare string
//! rather than JSON. The tables are data so that the idiosyncratic field names
//! of each upstream service are kept exactly as they are emitted.

use crate::sse_stream::StreamFrame;
use crate::Error;
use serde_json::{Map, Value};

/// Message used when an upstream `error` event carries no readable text.
pub const FALLBACK_ERROR_MESSAGE: &str = "An unknown error occurred during generation.";

/// How the payload of one event is merged into the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Progress text, from `message` or a string payload.
    Status,
    /// Upstream failure; ends the session.
    Error,
    /// Replace a scalar field.
    Scalar(&'static str),
    /// Replace a list field wholesale. Non-array payloads are ignored.
    List(&'static str),
    /// Push one item onto a list field, taken at an optional JSON pointer.
    Append {
        field: &'static str,
        pointer: Option<&'static str>,
    },
    /// Push `{kind, html}` onto a list field, `kind` being the event name.
    Section(&'static str),
    /// Shallow-merge an object payload into the accumulated result.
    Merge,
    /// Successful completion, optionally carrying a download URL.
    ///
    /// With `token_required` a payload without a usable URL fails the session;
    /// otherwise it completes with no artifact token.
    Terminal {
        pointer: Option<&'static str>,
        merge: bool,
        token_required: bool,
    },
}

/// Event routing table for one generation feature.
#[derive(Debug)]
pub struct RoutingProfile {
    /// Feature name used in logs.
    pub domain: &'static str,
    /// Events whose data is stored verbatim instead of parsed as JSON.
    pub plain_string_events: &'static [&'static str],
    /// Event name to route, matched exactly.
    pub routes: &'static [(&'static str, Route)],
    /// List field whose updates schedule a projection and count as content.
    pub primary_list: &'static str,
}

/// The effect one frame has on a session.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    Status(String),
    Set { field: String, value: Value },
    Append { field: String, value: Value },
    Extend(Map<String, Value>),
    Complete { token: Option<String>, merge: Option<Map<String, Value>> },
    Fail(Failure),
}

/// Why a session failed while streaming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    /// The upstream sent an `error` event.
    Upstream(String),
    /// A terminal event did not carry a usable payload or download URL.
    MalformedTerminal(String),
    /// The connection or stream failed.
    Transport(String),
    /// The stream ended without producing any content.
    Empty,
}

impl Failure {
    pub fn message(&self) -> String {
        match self {
            Failure::Upstream(message) | Failure::Transport(message) => message.clone(),
            Failure::MalformedTerminal(detail) => format!("malformed completion event: {detail}"),
            Failure::Empty => "stream ended before any content was generated".to_string(),
        }
    }

    pub fn into_error(self) -> Error {
        match self {
            Failure::Upstream(message) => Error::upstream(message),
            Failure::Transport(message) => Error::streaming(message),
            other => Error::protocol(other.message()),
        }
    }
}

impl Dispatch {
    /// Whether this action changes the given list field.
    pub fn touches(&self, field: &str) -> bool {
        match self {
            Dispatch::Set { field: f, .. } | Dispatch::Append { field: f, .. } => f == field,
            Dispatch::Extend(map) => map.contains_key(field),
            Dispatch::Complete { merge: Some(map), .. } => map.contains_key(field),
            _ => false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Dispatch::Complete { .. } | Dispatch::Fail(_))
    }
}

impl RoutingProfile {
    pub fn route(&self, event_type: &str) -> Option<Route> {
        self.routes
            .iter()
            .find(|(name, _)| *name == event_type)
            .map(|(_, route)| *route)
    }

    pub fn is_plain_string(&self, event_type: &str) -> bool {
        self.plain_string_events.contains(&event_type)
    }

    /// Decode a frame's payload: verbatim for plain-string events, JSON otherwise.
    pub fn decode_payload(&self, frame: &StreamFrame) -> Result<Value, Error> {
        if self.is_plain_string(&frame.event_type) {
            return Ok(Value::String(frame.data.clone()));
        }
        serde_json::from_str(&frame.data).map_err(|e| {
            Error::protocol(format!("event `{}` carried invalid JSON: {e}", frame.event_type))
        })
    }

    /// Turn a frame into the action it causes, if any.
    ///
    /// Malformed payloads are logged and dropped; they never fail the session.
    pub fn dispatch(&self, frame: &StreamFrame) -> Option<Dispatch> {
        let Some(route) = self.route(&frame.event_type) else {
            tracing::trace!(domain = self.domain, event = %frame.event_type, "ignoring unrouted event");
            return None;
        };

        let payload = match self.decode_payload(frame) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(domain = self.domain, event = %frame.event_type, error = %e, "dropping frame");
                return None;
            }
        };

        self.apply_route(route, &frame.event_type, payload)
    }

    fn apply_route(&self, route: Route, event_type: &str, payload: Value) -> Option<Dispatch> {
        match route {
            Route::Status => status_message(&payload).map(Dispatch::Status),
            Route::Error => Some(Dispatch::Fail(Failure::Upstream(
                error_message(&payload).unwrap_or_else(|| FALLBACK_ERROR_MESSAGE.to_string()),
            ))),
            Route::Scalar(field) => Some(Dispatch::Set {
                field: field.to_string(),
                value: payload,
            }),
            Route::List(field) => {
                if payload.is_array() {
                    Some(Dispatch::Set {
                        field: field.to_string(),
                        value: payload,
                    })
                } else {
                    tracing::warn!(domain = self.domain, event = %event_type, "expected a list payload");
                    None
                }
            }
            Route::Append { field, pointer } => {
                let item = at_pointer(payload, pointer)?;
                Some(Dispatch::Append {
                    field: field.to_string(),
                    value: item,
                })
            }
            Route::Section(field) => {
                let html = payload.get("html").and_then(Value::as_str)?;
                let mut section = Map::new();
                section.insert("kind".to_string(), Value::String(event_type.to_string()));
                section.insert("html".to_string(), Value::String(html.to_string()));
                Some(Dispatch::Append {
                    field: field.to_string(),
                    value: Value::Object(section),
                })
            }
            Route::Merge => match payload {
                Value::Object(map) => Some(Dispatch::Extend(map)),
                _ => {
                    tracing::warn!(domain = self.domain, event = %event_type, "expected an object payload");
                    None
                }
            },
            Route::Terminal { pointer, merge, token_required } => {
                let Some(payload) = at_pointer(payload, pointer) else {
                    return Some(Dispatch::Fail(Failure::MalformedTerminal(format!(
                        "`{event_type}` has no completion payload"
                    ))));
                };
                // A completion whose result is an error object reports a failed parse upstream.
                if let Some(message) = payload.get("error").and_then(Value::as_str) {
                    return Some(Dispatch::Fail(Failure::Upstream(message.to_string())));
                }
                let token = match download_url(&payload) {
                    Some(url) => match extract_token(&url) {
                        Some(token) => Some(token),
                        None if token_required => {
                            return Some(Dispatch::Fail(Failure::MalformedTerminal(format!(
                                "no token in download URL `{url}`"
                            ))));
                        }
                        None => None,
                    },
                    None if token_required => {
                        return Some(Dispatch::Fail(Failure::MalformedTerminal(format!(
                            "`{event_type}` carries no download URL"
                        ))));
                    }
                    None => None,
                };
                let merge = match (merge, payload) {
                    (true, Value::Object(map)) => Some(map),
                    _ => None,
                };
                Some(Dispatch::Complete { token, merge })
            }
        }
    }
}

fn at_pointer(payload: Value, pointer: Option<&str>) -> Option<Value> {
    match pointer {
        None => Some(payload),
        Some(pointer) => payload.pointer(pointer).cloned(),
    }
}

fn status_message(payload: &Value) -> Option<String> {
    match payload {
        Value::String(text) => Some(text.clone()),
        Value::Object(map) => map.get("message").and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

fn error_message(payload: &Value) -> Option<String> {
    match payload {
        Value::String(text) if !text.is_empty() => Some(text.clone()),
        Value::Object(map) => ["message", "error"]
            .iter()
            .filter_map(|key| map.get(*key).and_then(Value::as_str))
            .find(|text| !text.is_empty())
            .map(str::to_string),
        _ => None,
    }
}

/// The download URL carried by a completion payload: the payload itself when
/// it is a string, else its `download_url` or `url` field.
pub fn download_url(payload: &Value) -> Option<String> {
    match payload {
        Value::String(url) => Some(url.clone()),
        Value::Object(map) => ["download_url", "url"]
            .iter()
            .filter_map(|key| map.get(*key).and_then(Value::as_str))
            .next()
            .map(str::to_string),
        _ => None,
    }
}

/// Last `/`-separated segment of a download URL.
pub fn extract_token(url: &str) -> Option<String> {
    url.rsplit('/')
        .next()
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    static PROFILE: RoutingProfile = RoutingProfile {
        domain: "test",
        plain_string_events: &["doc_title", "doc_subject"],
        routes: &[
            ("status", Route::Status),
            ("error", Route::Error),
            ("doc_title", Route::Scalar("title")),
            ("doc_subject", Route::Scalar("subject")),
            ("doc_items", Route::List("items")),
            ("item", Route::Append { field: "items", pointer: Some("/detail") }),
            ("para", Route::Section("sections")),
            ("doc_json", Route::Merge),
            ("download_url", Route::Terminal { pointer: None, merge: false, token_required: true }),
            ("Done", Route::Terminal { pointer: Some("/detail"), merge: true, token_required: false }),
        ],
        primary_list: "items",
    };

    fn frame(event: &str, data: &str) -> StreamFrame {
        StreamFrame::new(event, data)
    }

    #[test]
    fn test_plain_string_events_are_stored_verbatim() {
        for event in PROFILE.plain_string_events {
            let action = PROFILE.dispatch(&frame(event, "Kiểm tra: {not json")).unwrap();
            match action {
                Dispatch::Set { value, .. } => assert_eq!(value, json!("Kiểm tra: {not json")),
                other => panic!("unexpected action {other:?}"),
            }
        }
    }

    #[test]
    fn test_invalid_json_is_dropped() {
        assert!(PROFILE.dispatch(&frame("doc_items", "[{broken")).is_none());
        assert!(PROFILE.dispatch(&frame("status", "not json")).is_none());
        assert!(matches!(
            PROFILE.decode_payload(&frame("doc_items", "[{broken")),
            Err(Error::Protocol(_))
        ));
    }

    #[test]
    fn test_unrouted_events_are_ignored() {
        assert!(PROFILE.dispatch(&frame("heartbeat", "{}")).is_none());
    }

    #[test]
    fn test_status_and_error_messages() {
        assert_eq!(
            PROFILE.dispatch(&frame("status", r#"{"message":"starting"}"#)),
            Some(Dispatch::Status("starting".to_string()))
        );
        assert_eq!(
            PROFILE.dispatch(&frame("error", r#"{"error":"quota"}"#)),
            Some(Dispatch::Fail(Failure::Upstream("quota".to_string())))
        );
        assert_eq!(
            PROFILE.dispatch(&frame("error", r#"{"stage":"build_docx"}"#)),
            Some(Dispatch::Fail(Failure::Upstream(FALLBACK_ERROR_MESSAGE.to_string())))
        );
    }

    #[test]
    fn test_list_route_requires_array() {
        let action = PROFILE.dispatch(&frame("doc_items", r#"[{"a":1},{"a":2}]"#)).unwrap();
        assert!(action.touches("items"));
        assert!(PROFILE.dispatch(&frame("doc_items", r#"{"a":1}"#)).is_none());
    }

    #[test]
    fn test_append_and_section_routes() {
        assert_eq!(
            PROFILE.dispatch(&frame("item", r#"{"detail":{"question":"2+2?"}}"#)),
            Some(Dispatch::Append {
                field: "items".to_string(),
                value: json!({"question": "2+2?"}),
            })
        );
        assert!(PROFILE.dispatch(&frame("item", r#"{"other":1}"#)).is_none());
        assert_eq!(
            PROFILE.dispatch(&frame("para", r#"{"html":"<p>x</p>"}"#)),
            Some(Dispatch::Append {
                field: "sections".to_string(),
                value: json!({"kind": "para", "html": "<p>x</p>"}),
            })
        );
    }

    #[test]
    fn test_token_extraction() {
        assert_eq!(extract_token("https://x/api/download/abc123").as_deref(), Some("abc123"));
        assert_eq!(download_url(&json!({"url": "/d/download/xyz"})).as_deref(), Some("/d/download/xyz"));
        assert_eq!(extract_token("https://x/download/"), None);

        assert_eq!(
            PROFILE.dispatch(&frame("download_url", r#"".../download/abc123""#)),
            Some(Dispatch::Complete { token: Some("abc123".to_string()), merge: None })
        );
        assert_eq!(
            PROFILE.dispatch(&frame("download_url", r#"{"url": ".../download/xyz", "message": "ready"}"#)),
            Some(Dispatch::Complete { token: Some("xyz".to_string()), merge: None })
        );
    }

    #[test]
    fn test_terminal_with_merge() {
        let action = PROFILE
            .dispatch(&frame(
                "Done",
                r#"{"detail":{"download_url":"/download/quiz_1.docx","items":[1,2]}}"#,
            ))
            .unwrap();
        match action {
            Dispatch::Complete { token, merge: Some(map) } => {
                assert_eq!(token.as_deref(), Some("quiz_1.docx"));
                assert_eq!(map["items"], json!([1, 2]));
            }
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn test_malformed_terminal_fails() {
        let action = PROFILE.dispatch(&frame("download_url", r#"{"message":"ready"}"#)).unwrap();
        assert!(matches!(action, Dispatch::Fail(Failure::MalformedTerminal(_))));
        assert!(action.is_terminal());

        let action = PROFILE.dispatch(&frame("Done", r#"{"ok":true}"#)).unwrap();
        assert!(matches!(action, Dispatch::Fail(Failure::MalformedTerminal(_))));
    }

    #[test]
    fn test_terminal_without_url_completes_when_token_optional() {
        let action = PROFILE
            .dispatch(&frame("Done", r#"{"detail":{"name":"Quiz","items":[1]}}"#))
            .unwrap();
        match action {
            Dispatch::Complete { token: None, merge: Some(map) } => {
                assert_eq!(map["name"], json!("Quiz"));
                assert_eq!(map["items"], json!([1]));
            }
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn test_terminal_error_detail_fails() {
        let action = PROFILE
            .dispatch(&frame("Done", r#"{"detail":{"error":"JSON parse failed","raw_output":"..."}}"#))
            .unwrap();
        assert_eq!(action, Dispatch::Fail(Failure::Upstream("JSON parse failed".to_string())));
    }
}
