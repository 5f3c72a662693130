use bytes::Bytes;
use futures::{ Stream, StreamExt };
use log::{ debug, error, info, warn };
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

use crate::config::prompt::SystemPrompt;
use crate::llm::chat::ChatClient;
use crate::llm::LlmError;
use crate::models::chat::ChatMessage;

const OUTBOUND_CHANNEL_CAPACITY: usize = 32;

#[derive(Debug, Clone, Error)]
pub enum RelayError {
    #[error("upstream completion failed: {0}")]
    Upstream(String),
}

impl From<LlmError> for RelayError {
    fn from(err: LlmError) -> Self {
        RelayError::Upstream(err.to_string())
    }
}

/// Raw UTF-8 fragments flowing back to the caller, in arrival order.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, RelayError>> + Send>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    Completed,
    Failed(String),
    Disconnected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelaySummary {
    pub request_id: Uuid,
    pub fragments: usize,
    pub bytes: usize,
    pub outcome: RelayOutcome,
}

/// Write side of one outbound stream. Closing drops the sender, which ends
/// the stream for the reader; it happens once, either explicitly or on drop.
pub struct StreamController {
    tx: Option<mpsc::Sender<Result<Bytes, RelayError>>>,
    request_id: Uuid,
    fragments: usize,
    bytes: usize,
    outcome: RelayOutcome,
}

impl StreamController {
    pub fn new(tx: mpsc::Sender<Result<Bytes, RelayError>>, request_id: Uuid) -> Self {
        Self {
            tx: Some(tx),
            request_id,
            fragments: 0,
            bytes: 0,
            outcome: RelayOutcome::Completed,
        }
    }

    pub fn channel(request_id: Uuid) -> (Self, ByteStream) {
        let (tx, rx) = mpsc::channel(OUTBOUND_CHANNEL_CAPACITY);
        (Self::new(tx, request_id), Box::pin(ReceiverStream::new(rx)))
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_none()
    }

    /// Returns false once the stream can no longer accept data.
    pub async fn enqueue(&mut self, fragment: String) -> bool {
        let Some(tx) = self.tx.as_ref() else {
            return false;
        };
        let len = fragment.len();
        if tx.send(Ok(Bytes::from(fragment))).await.is_err() {
            warn!("Relay {}: caller went away after {} bytes", self.request_id, self.bytes);
            self.outcome = RelayOutcome::Disconnected;
            self.close();
            return false;
        }
        self.fragments += 1;
        self.bytes += len;
        true
    }

    /// Aborts the stream: the reader sees `err` as its final item.
    pub async fn error(&mut self, err: RelayError) {
        error!("Relay {}: {}", self.request_id, err);
        self.outcome = RelayOutcome::Failed(err.to_string());
        if let Some(tx) = self.tx.as_ref() {
            let _ = tx.send(Err(err)).await;
        }
        self.close();
    }

    /// Closes the stream. Only the first call has an effect.
    pub fn close(&mut self) -> bool {
        match self.tx.take() {
            Some(tx) => {
                drop(tx);
                info!(
                    "Relay {} closed: {:?}, {} fragments, {} bytes",
                    self.request_id,
                    self.outcome,
                    self.fragments,
                    self.bytes
                );
                true
            }
            None => false,
        }
    }

    pub fn summary(&self) -> RelaySummary {
        RelaySummary {
            request_id: self.request_id,
            fragments: self.fragments,
            bytes: self.bytes,
            outcome: self.outcome.clone(),
        }
    }
}

impl Drop for StreamController {
    fn drop(&mut self) {
        if self.close() {
            debug!("Relay {} closed on teardown", self.request_id);
        }
    }
}

/// Forwards a conversation upstream behind the configured instruction and
/// re-streams the completion as raw text.
#[derive(Clone)]
pub struct Relay {
    client: Arc<dyn ChatClient>,
    system_prompt: SystemPrompt,
}

impl Relay {
    pub fn new(client: Arc<dyn ChatClient>, system_prompt: SystemPrompt) -> Self {
        Self { client, system_prompt }
    }

    pub fn system_prompt(&self) -> &SystemPrompt {
        &self.system_prompt
    }

    pub fn outbound_messages(&self, input: Vec<ChatMessage>) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(input.len() + 1);
        messages.push(self.system_prompt.to_message());
        messages.extend(input);
        messages
    }

    pub fn stream(&self, input: Vec<ChatMessage>) -> ByteStream {
        self.spawn(input).0
    }

    /// Starts the relay task. The handle resolves once the outbound stream
    /// has been closed.
    pub fn spawn(&self, input: Vec<ChatMessage>) -> (ByteStream, JoinHandle<RelaySummary>) {
        let request_id = Uuid::new_v4();
        let outbound = self.outbound_messages(input);
        info!(
            "Relay {}: forwarding {} messages to {}",
            request_id,
            outbound.len(),
            self.client.get_model()
        );

        let (controller, body) = StreamController::channel(request_id);
        let client = Arc::clone(&self.client);
        let handle = tokio::spawn(pump(client, outbound, controller));
        (body, handle)
    }
}

async fn pump(
    client: Arc<dyn ChatClient>,
    outbound: Vec<ChatMessage>,
    mut controller: StreamController
) -> RelaySummary {
    let mut upstream = match client.stream_chat(&outbound).await {
        Ok(s) => s,
        Err(e) => {
            controller.error(e.into()).await;
            return controller.summary();
        }
    };

    while let Some(item) = upstream.next().await {
        match item {
            Ok(fragment) => {
                if fragment.is_empty() {
                    continue;
                }
                if !controller.enqueue(fragment).await {
                    break;
                }
            }
            Err(e) => {
                controller.error(e.into()).await;
                break;
            }
        }
    }

    controller.close();
    controller.summary()
}
