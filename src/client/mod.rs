pub mod decoder;
pub mod repl;
pub mod transcript;
pub mod transport;

use futures::StreamExt;
use log::{ debug, error, warn };
use thiserror::Error;

use self::decoder::Utf8StreamDecoder;
use self::transcript::Transcript;
use self::transport::ChatTransport;
use crate::models::chat::ChatMessage;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("a reply is still streaming")]
    Busy,
    #[error("no reply is streaming")]
    NoOpenTurn,
    #[error("invalid relay URL '{0}': {1}")]
    InvalidUrl(String, #[source] url::ParseError),
    #[error("relay request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("relay returned {0}")]
    Status(reqwest::StatusCode),
    #[error("terminal write failed: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    Streaming,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Blank input; nothing was sent.
    Ignored,
    Completed,
    /// The request or the body read failed. Partial content stays in the transcript.
    Interrupted(String),
}

/// One chat window: a transcript plus the transport used to reach the relay.
pub struct ChatSession<T: ChatTransport> {
    transport: T,
    transcript: Transcript,
}

impl<T: ChatTransport> ChatSession<T> {
    pub fn new(transport: T, greeting: impl Into<String>) -> Self {
        Self {
            transport,
            transcript: Transcript::seeded(greeting),
        }
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn messages(&self) -> &[ChatMessage] {
        self.transcript.messages()
    }

    pub fn state(&self) -> TurnState {
        if self.transcript.is_streaming() { TurnState::Streaming } else { TurnState::Idle }
    }

    pub async fn submit(&mut self, text: &str) -> Result<TurnOutcome, ClientError> {
        self.submit_with(text, |_| {}).await
    }

    /// Runs one turn, calling `on_fragment` with each piece of decoded text
    /// as it is appended to the placeholder.
    pub async fn submit_with<F>(
        &mut self,
        text: &str,
        mut on_fragment: F
    ) -> Result<TurnOutcome, ClientError>
        where F: FnMut(&str) + Send
    {
        if self.transcript.is_streaming() {
            // only reachable when a previous submit future was dropped mid-stream
            warn!("Previous reply was abandoned while streaming; sealing it");
            self.transcript.finish_turn();
        }

        if !self.transcript.begin_turn(text)? {
            return Ok(TurnOutcome::Ignored);
        }

        let history = self.transcript.request_history();
        let mut decoder = Utf8StreamDecoder::new();

        let outcome = match self.transport.open(&history).await {
            Ok(mut body) => {
                loop {
                    match body.next().await {
                        Some(Ok(chunk)) => {
                            let fragment = decoder.decode(&chunk);
                            if !fragment.is_empty() {
                                self.transcript.append_fragment(&fragment)?;
                                on_fragment(&fragment);
                            }
                        }
                        Some(Err(e)) => {
                            error!("Error reading reply: {}", e);
                            break TurnOutcome::Interrupted(e.to_string());
                        }
                        None => {
                            break TurnOutcome::Completed;
                        }
                    }
                }
            }
            Err(e) => {
                error!("Chat request failed: {}", e);
                TurnOutcome::Interrupted(e.to_string())
            }
        };

        let tail = decoder.finish();
        if !tail.is_empty() {
            self.transcript.append_fragment(&tail)?;
            on_fragment(&tail);
        }

        if let Some(reply) = self.transcript.finish_turn() {
            debug!("Reply finished with {} chars: {:?}", reply.content.chars().count(), outcome);
        }
        Ok(outcome)
    }
}
