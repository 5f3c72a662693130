pub mod ollama;
pub mod openai;

use async_trait::async_trait;
use futures::{ Future, Stream, StreamExt };
use log::{ debug, warn };
use reqwest::Client as HttpClient;
use serde::Serialize;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::{ LlmConfig, LlmError, LlmType };
use self::ollama::OllamaClient;
use self::openai::OpenAIChatClient;
use crate::models::chat::ChatMessage;

/// Incremental text deltas produced by an upstream completion.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

const STREAM_CHANNEL_CAPACITY: usize = 32;

#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn stream_chat(&self, messages: &[ChatMessage]) -> Result<FragmentStream, LlmError>;

    fn get_model(&self) -> String;
    fn get_base_url(&self) -> String;
}

/// What a provider line parser made of one line of a streamed response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEvent {
    Fragment(String),
    Done,
    Skip,
    /// The provider reported a failure inside an otherwise successful response.
    Error(String),
}

pub fn create_streaming_response<F, Fut>(response_fn: F) -> FragmentStream
where
    F: FnOnce(mpsc::Sender<Result<String, LlmError>>) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);

    tokio::spawn(async move {
        response_fn(tx).await;
    });

    Box::pin(ReceiverStream::new(rx))
}

pub fn new_client(config: &LlmConfig) -> Result<Arc<dyn ChatClient>, LlmError> {
    let client: Arc<dyn ChatClient> = match config.llm_type {
        LlmType::OpenAI => {
            let specific_client = OpenAIChatClient::from_config(config)?;
            Arc::new(specific_client)
        }
        LlmType::Ollama => {
            let specific_client = OllamaClient::from_config(config)?;
            Arc::new(specific_client)
        }
    };
    Ok(client)
}

/// Splits a byte stream into lines, holding partial lines (and partial
/// UTF-8 sequences) until the terminating newline arrives.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            lines.push(decode_line(&raw[..raw.len() - 1]));
        }
        lines
    }

    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let raw = std::mem::take(&mut self.pending);
        Some(decode_line(&raw))
    }
}

fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

async fn read_error_body(resp: reqwest::Response) -> LlmError {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    LlmError::Status { status, body }
}

/// POSTs `payload` to `url` and turns the line-oriented streaming body into
/// fragments using `line_parser`.
pub fn http_stream_generate<P>(
    http: HttpClient,
    url: String,
    payload: P,
    line_parser: fn(&str) -> LineEvent
) -> FragmentStream
    where P: Serialize + Send + Sync + 'static
{
    create_streaming_response(move |tx| async move {
        let resp = match http.post(&url).json(&payload).send().await {
            Ok(r) => r,
            Err(e) => {
                let _ = tx.send(Err(LlmError::Http(e))).await;
                return;
            }
        };

        if !resp.status().is_success() {
            let err = read_error_body(resp).await;
            warn!("Upstream {} rejected the request: {}", url, err);
            let _ = tx.send(Err(err)).await;
            return;
        }

        let mut bytes = resp.bytes_stream();
        let mut lines = LineBuffer::new();

        while let Some(chunk) = bytes.next().await {
            let buf = match chunk {
                Ok(buf) => buf,
                Err(e) => {
                    let _ = tx.send(Err(LlmError::Http(e))).await;
                    return;
                }
            };

            for line in lines.push(&buf) {
                match line_parser(&line) {
                    LineEvent::Fragment(tok) => {
                        if tx.send(Ok(tok)).await.is_err() {
                            debug!("Fragment receiver dropped, stopping upstream read");
                            return;
                        }
                    }
                    LineEvent::Done => {
                        return;
                    }
                    LineEvent::Error(msg) => {
                        warn!("Upstream {} failed mid-stream: {}", url, msg);
                        let _ = tx.send(Err(LlmError::Stream(msg))).await;
                        return;
                    }
                    LineEvent::Skip => {}
                }
            }
        }

        if let Some(line) = lines.finish() {
            match line_parser(&line) {
                LineEvent::Fragment(tok) => {
                    let _ = tx.send(Ok(tok)).await;
                }
                LineEvent::Error(msg) => {
                    warn!("Upstream {} failed mid-stream: {}", url, msg);
                    let _ = tx.send(Err(LlmError::Stream(msg))).await;
                }
                LineEvent::Done | LineEvent::Skip => {}
            }
        }
    })
}
