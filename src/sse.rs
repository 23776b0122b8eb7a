//! Server-Sent Events (SSE) processing for the Messages API stream.
//!
//! Turns the raw byte stream of an HTTP response into [`SseEvent`]s.  Only the
//! pieces the chat relay needs are decoded: text deltas, the stop marker and
//! provider error events.  Everything else is surfaced as [`SseEvent::Other`].

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;

use crate::{Error, Result};

/// One decoded server-sent event.
#[derive(Debug, Clone, PartialEq)]
pub enum SseEvent {
    /// Keep-alive.
    Ping,
    /// The reply has started.
    MessageStart,
    /// A fragment of reply text.
    TextDelta(String),
    /// Reply-level metadata, carrying the stop reason once known.
    MessageDelta {
        /// Why generation stopped, if reported.
        stop_reason: Option<String>,
    },
    /// The reply is complete.
    MessageStop,
    /// The provider reported an error mid-stream.
    Error {
        /// Provider error type, e.g. `overloaded_error`.
        error_type: Option<String>,
        /// Human-readable message.
        message: String,
    },
    /// Any other event; carries the event name.
    Other(String),
}

/// Process a stream of bytes into a stream of server-sent events.
///
/// Events may be split across chunks; bytes are buffered until a blank line
/// terminates an event.
pub fn process_sse<S, E>(byte_stream: S) -> impl Stream<Item = Result<SseEvent>> + Send
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Unpin + Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    let stream = byte_stream.map(|result| {
        result
            .map_err(|e| Error::stream(format!("Error in HTTP stream: {e}"), Some(Box::new(e))))
    })
    .fuse();

    let buffer = String::new();
    let pending = Vec::new();

    stream::unfold(
        (stream, buffer, pending),
        move |(mut stream, mut buffer, mut pending)| async move {
            loop {
                if let Some((event, remaining)) = extract_event(&buffer) {
                    buffer = remaining;
                    return Some((event, (stream, buffer, pending)));
                }

                match stream.next().await {
                    Some(Ok(bytes)) => {
                        pending.extend_from_slice(&bytes);
                        match decode_utf8(&mut pending) {
                            Ok(text) => {
                                buffer.push_str(&text);
                                if buffer.contains("\r\n") {
                                    buffer = buffer.replace("\r\n", "\n");
                                }
                            }
                            Err(e) => return Some((Err(e), (stream, buffer, pending))),
                        }
                    }
                    Some(Err(e)) => {
                        return Some((Err(e), (stream, buffer, pending)));
                    }
                    None => {
                        if !pending.is_empty() {
                            pending.clear();
                            return Some((
                                Err(Error::serialization(
                                    "Invalid UTF-8 in stream: truncated character at end of stream",
                                    None,
                                )),
                                (stream, buffer, pending),
                            ));
                        }
                        // A trailing event without its blank line still counts.
                        if !buffer.trim().is_empty() {
                            let tail = std::mem::take(&mut buffer) + "\n\n";
                            if let Some((event, _)) = extract_event(&tail) {
                                return Some((event, (stream, buffer, pending)));
                            }
                        }
                        return None;
                    }
                }
            }
        },
    )
}

/// Decode the longest valid UTF-8 prefix of `pending`, leaving an incomplete
/// trailing character in place for the next chunk.
fn decode_utf8(pending: &mut Vec<u8>) -> Result<String> {
    let checked = std::str::from_utf8(pending).map(str::len);
    let valid = match checked {
        Ok(len) => len,
        Err(e) if e.error_len().is_none() => e.valid_up_to(),
        Err(e) => {
            pending.clear();
            return Err(Error::serialization(
                format!("Invalid UTF-8 in stream: {e}"),
                Some(Box::new(e)),
            ));
        }
    };
    let tail = pending.split_off(valid);
    let bytes = std::mem::replace(pending, tail);
    String::from_utf8(bytes).map_err(|e| {
        Error::serialization(format!("Invalid UTF-8 in stream: {e}"), Some(Box::new(e)))
    })
}

/// Extract a complete SSE event from a buffer string.
fn extract_event(buffer: &str) -> Option<(Result<SseEvent>, String)> {
    let (event_text, rest) = buffer.split_once("\n\n")?;
    let rest = rest.to_string();

    let mut event_type = None;
    let mut data = None;
    for line in event_text.lines() {
        if let Some(value) = line.strip_prefix("event:") {
            event_type = Some(value.trim());
        } else if let Some(value) = line.strip_prefix("data:") {
            data = Some(value.trim());
        }
    }

    let (Some(event_type), Some(data)) = (event_type, data) else {
        return Some((
            Err(Error::serialization(
                format!("Malformed SSE event: '{event_text}'"),
                None,
            )),
            rest,
        ));
    };

    Some((parse_event(event_type, data), rest))
}

#[derive(Deserialize)]
struct DeltaEnvelope {
    delta: Delta,
}

#[derive(Deserialize)]
struct Delta {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    #[serde(rename = "type")]
    error_type: Option<String>,
    message: Option<String>,
}

fn parse_event(event_type: &str, data: &str) -> Result<SseEvent> {
    match event_type {
        "ping" => Ok(SseEvent::Ping),
        "message_start" => Ok(SseEvent::MessageStart),
        "message_stop" => Ok(SseEvent::MessageStop),
        "content_block_delta" => {
            let envelope: DeltaEnvelope = serde_json::from_str(data)?;
            match (envelope.delta.kind.as_deref(), envelope.delta.text) {
                (Some("text_delta"), Some(text)) => Ok(SseEvent::TextDelta(text)),
                (kind, _) => Ok(SseEvent::Other(format!(
                    "content_block_delta:{}",
                    kind.unwrap_or("unknown")
                ))),
            }
        }
        "message_delta" => {
            let envelope: DeltaEnvelope = serde_json::from_str(data)?;
            Ok(SseEvent::MessageDelta {
                stop_reason: envelope.delta.stop_reason,
            })
        }
        "error" => match serde_json::from_str::<ErrorEnvelope>(data) {
            Ok(envelope) => Ok(SseEvent::Error {
                error_type: envelope.error.error_type,
                message: envelope
                    .error
                    .message
                    .unwrap_or_else(|| "provider reported an error".to_string()),
            }),
            Err(_) => Ok(SseEvent::Error {
                error_type: None,
                message: data.to_string(),
            }),
        },
        other => Ok(SseEvent::Other(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    fn chunks(
        parts: &[&'static str],
    ) -> impl Stream<Item = std::result::Result<Bytes, io::Error>> + Unpin + Send + 'static {
        stream::iter(
            parts
                .iter()
                .map(|part| Ok(Bytes::from_static(part.as_bytes())))
                .collect::<Vec<_>>(),
        )
    }

    #[tokio::test]
    async fn parse_ping_event() {
        let mut events = Box::pin(process_sse(chunks(&["event: ping\ndata: {}\n\n"])));
        let event = events.next().await.unwrap();
        assert!(matches!(event, Ok(SseEvent::Ping)));
        assert!(events.next().await.is_none());
    }

    #[tokio::test]
    async fn parse_text_deltas_and_stop() {
        let body = concat!(
            "event: message_start\ndata: {\"type\":\"message_start\"}\n\n",
            "event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Hel\"}}\n\n",
            "event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"lo\"}}\n\n",
            "event: message_delta\ndata: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"end_turn\"}}\n\n",
            "event: message_stop\ndata: {\"type\":\"message_stop\"}\n\n",
        );
        let events: Vec<SseEvent> = process_sse(chunks(&[body]))
            .map(|event| event.unwrap())
            .collect()
            .await;
        assert_eq!(
            events,
            vec![
                SseEvent::MessageStart,
                SseEvent::TextDelta("Hel".to_string()),
                SseEvent::TextDelta("lo".to_string()),
                SseEvent::MessageDelta {
                    stop_reason: Some("end_turn".to_string())
                },
                SseEvent::MessageStop,
            ]
        );
    }

    #[tokio::test]
    async fn handle_split_event() {
        let mut events = Box::pin(process_sse(chunks(&[
            "event: content_block_delta\r\ndata: {\"delta\":{\"type\":\"text_",
            "delta\",\"text\":\"hi\"}}\r\n\r\n",
        ])));
        let event = events.next().await.unwrap().unwrap();
        assert_eq!(event, SseEvent::TextDelta("hi".to_string()));
    }

    #[tokio::test]
    async fn parse_error_event() {
        let mut events = Box::pin(process_sse(chunks(&[
            "event: error\ndata: {\"type\":\"error\",\"error\":{\"type\":\"overloaded_error\",\"message\":\"Overloaded\"}}\n\n",
        ])));
        let event = events.next().await.unwrap().unwrap();
        assert_eq!(
            event,
            SseEvent::Error {
                error_type: Some("overloaded_error".to_string()),
                message: "Overloaded".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn handle_malformed_event() {
        let mut events = Box::pin(process_sse(chunks(&[
            "malformed data without proper format\n\n",
        ])));
        assert!(events.next().await.unwrap().is_err());
    }

    #[tokio::test]
    async fn unknown_event_types_pass_through() {
        let mut events = Box::pin(process_sse(chunks(&[
            "event: content_block_start\ndata: {}\n\n",
        ])));
        let event = events.next().await.unwrap().unwrap();
        assert_eq!(event, SseEvent::Other("content_block_start".to_string()));
    }

    #[tokio::test]
    async fn trailing_event_without_blank_line() {
        let mut events = Box::pin(process_sse(chunks(&["event: message_stop\ndata: {}"])));
        let event = events.next().await.unwrap().unwrap();
        assert_eq!(event, SseEvent::MessageStop);
        assert!(events.next().await.is_none());
    }

    #[tokio::test]
    async fn multibyte_character_split_across_chunks() {
        let body = "event: content_block_delta\ndata: {\"delta\":{\"type\":\"text_delta\",\"text\":\"caf\u{e9} \u{1f600}\"}}\n\n";
        let bytes = body.as_bytes();
        let first = bytes.iter().position(|b| *b == 0xC3).unwrap() + 1;
        let second = bytes.iter().position(|b| *b == 0xF0).unwrap() + 2;
        let parts: Vec<std::result::Result<Bytes, io::Error>> = vec![
            Ok(Bytes::copy_from_slice(&bytes[..first])),
            Ok(Bytes::copy_from_slice(&bytes[first..second])),
            Ok(Bytes::copy_from_slice(&bytes[second..])),
        ];
        let events: Vec<Result<SseEvent>> = process_sse(stream::iter(parts)).collect().await;
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].as_ref().unwrap(),
            &SseEvent::TextDelta("caf\u{e9} \u{1f600}".to_string())
        );
    }

    #[tokio::test]
    async fn invalid_utf8_is_an_error() {
        let parts: Vec<std::result::Result<Bytes, io::Error>> =
            vec![Ok(Bytes::from_static(b"event: ping\ndata: \xFF\n\n"))];
        let mut events = Box::pin(process_sse(stream::iter(parts)));
        assert!(events.next().await.unwrap().is_err());
    }
}
