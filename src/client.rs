use std::env;
use std::time::Duration;

use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client as ReqwestClient, Response, header};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::generate::{Generator, IncrementReceiver, IncrementSender, increment_channel};
use crate::observability::{CLIENT_REQUESTS, CLIENT_REQUEST_ERRORS};
use crate::sse::{SseEvent, process_sse};
use crate::types::{AssistantReply, Message, Role, StreamIncrement};

const DEFAULT_API_URL: &str = "https://api.anthropic.com/v1/";
const ANTHROPIC_API_VERSION: &str = "2023-06-01";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_MODEL: &str = "claude-haiku-4-5";
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "COLLOQUY_API_KEY";

/// [`Generator`] backed by the Anthropic Messages API.
#[derive(Debug, Clone)]
pub struct Anthropic {
    api_key: String,
    client: ReqwestClient,
    base_url: String,
    timeout: Duration,
    model: String,
    max_tokens: u32,
    system: Option<String>,
    stream_capacity: usize,
}

impl Anthropic {
    /// Create a new client with default settings.
    ///
    /// The API key can be provided directly or read from the `COLLOQUY_API_KEY`
    /// environment variable.
    pub fn new(api_key: Option<String>) -> Result<Self> {
        Self::with_options(api_key, None, None)
    }

    /// Create a new client with a custom base URL and request timeout.
    pub fn with_options(
        api_key: Option<String>,
        base_url: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let api_key = match api_key {
            Some(key) => key,
            None => env::var(API_KEY_ENV).map_err(|_| {
                Error::authentication(format!(
                    "API key not provided and {API_KEY_ENV} environment variable not set"
                ))
            })?,
        };
        HeaderValue::from_str(&api_key)
            .map_err(|_| Error::authentication("API key contains invalid header characters"))?;

        let timeout = timeout.unwrap_or(DEFAULT_TIMEOUT);
        let client = ReqwestClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                Error::http_client(
                    format!("Failed to build HTTP client: {e}"),
                    Some(Box::new(e)),
                )
            })?;

        let mut base_url = base_url.unwrap_or_else(|| DEFAULT_API_URL.to_string());
        if !base_url.ends_with('/') {
            base_url.push('/');
        }

        Ok(Self {
            api_key,
            client,
            base_url,
            timeout,
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            system: None,
            stream_capacity: crate::generate::DEFAULT_STREAM_CAPACITY,
        })
    }

    /// Sets the model used for every request.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets the maximum tokens per response.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Sets or clears the system prompt.
    pub fn with_system_prompt(mut self, system: Option<String>) -> Self {
        self.system = system;
        self
    }

    /// Sets the capacity of the increment channel returned by streaming calls.
    pub fn with_stream_capacity(mut self, capacity: usize) -> Self {
        self.stream_capacity = capacity;
        self
    }

    /// Returns the configured model.
    pub fn model(&self) -> &str {
        &self.model
    }

    fn default_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        if let Ok(key) = HeaderValue::from_str(&self.api_key) {
            headers.insert("x-api-key", key);
        }
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_API_VERSION),
        );
        headers
    }

    fn request_body<'a>(&'a self, messages: &'a [Message], stream: bool) -> MessagesRequest<'a> {
        MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            system: self.system.as_deref(),
            messages: messages
                .iter()
                .map(|m| WireMessage {
                    role: m.role,
                    content: &m.text,
                })
                .collect(),
            stream,
        }
    }

    async fn post(&self, body: &MessagesRequest<'_>, stream: bool) -> Result<Response> {
        CLIENT_REQUESTS.click();
        let url = format!("{}messages", self.base_url);
        let mut headers = self.default_headers();
        if stream {
            headers.insert(header::ACCEPT, HeaderValue::from_static("text/event-stream"));
        }

        let response = self
            .client
            .post(&url)
            .headers(headers)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                CLIENT_REQUEST_ERRORS.click();
                if e.is_timeout() {
                    Error::timeout(
                        format!("Request timed out: {e}"),
                        Some(self.timeout.as_secs_f64()),
                    )
                } else if e.is_connect() {
                    Error::connection(format!("Connection error: {e}"), Some(Box::new(e)))
                } else {
                    Error::http_client(format!("Request failed: {e}"), Some(Box::new(e)))
                }
            })?;

        if !response.status().is_success() {
            CLIENT_REQUEST_ERRORS.click();
            return Err(Self::process_error_response(response).await);
        }
        Ok(response)
    }

    async fn process_error_response(response: Response) -> Error {
        let status_code = response.status().as_u16();

        let request_id = response
            .headers()
            .get("request-id")
            .or_else(|| response.headers().get("x-request-id"))
            .and_then(|val| val.to_str().ok())
            .map(String::from);

        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|val| val.to_str().ok())
            .and_then(|val| val.parse::<u64>().ok());

        let error_body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                return Error::http_client(
                    format!("Failed to read error response: {e}"),
                    Some(Box::new(e)),
                );
            }
        };

        let detail = serde_json::from_str::<ErrorResponse>(&error_body)
            .ok()
            .and_then(|e| e.error);
        let error_type = detail.as_ref().and_then(|e| e.error_type.clone());
        let message = detail
            .and_then(|e| e.message)
            .unwrap_or_else(|| error_body.clone());

        match status_code {
            401 => Error::authentication(message),
            408 => Error::timeout(message, None),
            429 => Error::rate_limit(message, retry_after),
            _ => Error::api(status_code, error_type, message, request_id),
        }
    }
}

#[async_trait::async_trait]
impl Generator for Anthropic {
    async fn generate(
        &self,
        cancel: &CancellationToken,
        messages: &[Message],
    ) -> Result<AssistantReply> {
        let body = self.request_body(messages, false);
        let request = async {
            let response = self.post(&body, false).await?;
            let parsed: MessagesResponse = response.json().await.map_err(|e| {
                Error::serialization(format!("Failed to parse response: {e}"), Some(Box::new(e)))
            })?;
            Ok(AssistantReply::new(parsed.text()))
        };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::cancelled("request cancelled")),
            reply = request => reply,
        }
    }

    async fn generate_stream(
        &self,
        cancel: &CancellationToken,
        messages: &[Message],
    ) -> Result<IncrementReceiver> {
        let body = self.request_body(messages, true);
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::cancelled("request cancelled")),
            response = self.post(&body, true) => response?,
        };

        let (tx, rx) = increment_channel(self.stream_capacity);
        let events = process_sse(response.bytes_stream());
        tokio::spawn(pump_events(events, tx, cancel.clone()));
        Ok(rx)
    }
}

/// Translate provider events into increments until a terminal event.
///
/// Ends without a terminal increment only when the provider hangs up or the
/// turn is cancelled.
async fn pump_events<S>(events: S, tx: IncrementSender, cancel: CancellationToken)
where
    S: futures::Stream<Item = Result<SseEvent>> + Send,
{
    let mut events = Box::pin(events);
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            next = events.next() => next,
        };
        let increment = match next {
            Some(Ok(SseEvent::TextDelta(text))) => StreamIncrement::text(text),
            Some(Ok(SseEvent::MessageStop)) => StreamIncrement::done(""),
            Some(Ok(SseEvent::Error {
                error_type,
                message,
            })) => StreamIncrement::failed(Error::stream(
                message.clone(),
                Some(Box::new(Error::api(200, error_type, message, None))),
            )),
            Some(Ok(SseEvent::MessageDelta { stop_reason })) => {
                debug!(?stop_reason, "provider reported stop reason");
                continue;
            }
            Some(Ok(_)) => continue,
            Some(Err(err)) => StreamIncrement::failed(Error::stream(
                "provider stream broke",
                Some(Box::new(err)),
            )),
            None => {
                warn!("provider closed the stream without a stop event");
                return;
            }
        };
        let terminal = increment.is_terminal();
        if tx.send(increment).await.is_err() || terminal {
            return;
        }
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<WireMessage<'a>>,
    stream: bool,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: Role,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ResponseBlock>,
}

impl MessagesResponse {
    fn text(&self) -> String {
        self.content
            .iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text.as_deref())
            .collect()
    }
}

#[derive(Deserialize)]
struct ResponseBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: Option<ErrorDetail>,
}

#[derive(Deserialize)]
struct ErrorDetail {
    #[serde(rename = "type")]
    error_type: Option<String>,
    message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    #[test]
    fn client_creation() {
        let client = Anthropic::new(Some("test-key".to_string())).unwrap();
        assert_eq!(client.api_key, "test-key");
        assert_eq!(client.base_url, DEFAULT_API_URL);
        assert_eq!(client.timeout, DEFAULT_TIMEOUT);
        assert_eq!(client.model(), DEFAULT_MODEL);

        let client = Anthropic::with_options(
            Some("test-key".to_string()),
            Some("http://localhost:8080/v1".to_string()),
            Some(Duration::from_secs(30)),
        )
        .unwrap()
        .with_model("claude-sonnet-4-0");
        assert_eq!(client.base_url, "http://localhost:8080/v1/");
        assert_eq!(client.timeout, Duration::from_secs(30));
        assert_eq!(client.model(), "claude-sonnet-4-0");
    }

    #[test]
    fn request_body_serialization() {
        let client = Anthropic::new(Some("k".to_string()))
            .unwrap()
            .with_max_tokens(16)
            .with_system_prompt(Some("Be brief.".to_string()));
        let messages = vec![Message::user("Hi"), Message::assistant("Hello")];
        let body = serde_json::to_value(client.request_body(&messages, true)).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "model": "claude-haiku-4-5",
                "max_tokens": 16,
                "system": "Be brief.",
                "messages": [
                    {"role": "user", "content": "Hi"},
                    {"role": "assistant", "content": "Hello"}
                ],
                "stream": true
            })
        );
    }

    #[test]
    fn response_text_joins_text_blocks() {
        let parsed: MessagesResponse = serde_json::from_str(
            r#"{"content":[{"type":"text","text":"Hel"},{"type":"tool_use","id":"x"},{"type":"text","text":"lo"}]}"#,
        )
        .unwrap();
        assert_eq!(parsed.text(), "Hello");
    }

    #[tokio::test]
    async fn pump_translates_events() {
        let events = stream::iter(vec![
            Ok(SseEvent::MessageStart),
            Ok(SseEvent::TextDelta("Hel".to_string())),
            Ok(SseEvent::Ping),
            Ok(SseEvent::TextDelta("lo".to_string())),
            Ok(SseEvent::MessageStop),
            Ok(SseEvent::TextDelta("ignored".to_string())),
        ]);
        let (tx, mut rx) = increment_channel(8);
        pump_events(events, tx, CancellationToken::new()).await;

        let mut seen = Vec::new();
        while let Some(increment) = rx.recv().await {
            seen.push((increment.text, increment.done));
        }
        assert_eq!(
            seen,
            vec![
                ("Hel".to_string(), false),
                ("lo".to_string(), false),
                (String::new(), true)
            ]
        );
    }

    #[tokio::test]
    async fn pump_reports_provider_errors() {
        let events = stream::iter(vec![
            Ok(SseEvent::TextDelta("partial".to_string())),
            Ok(SseEvent::Error {
                error_type: Some("overloaded_error".to_string()),
                message: "Overloaded".to_string(),
            }),
        ]);
        let (tx, mut rx) = increment_channel(8);
        pump_events(events, tx, CancellationToken::new()).await;

        assert_eq!(rx.recv().await.unwrap().text, "partial");
        let failed = rx.recv().await.unwrap();
        assert!(failed.error.as_ref().is_some_and(Error::is_stream));
        assert!(rx.recv().await.is_none());
    }
}
