use std::fs;
use std::path::Path;
use std::sync::Arc;
use log::info;
use thiserror::Error;

use crate::models::chat::ChatMessage;

pub const DEFAULT_SYSTEM_PROMPT: &str = concat!(
    "You are an AI-powered customer support assistant for the Genesis Centre called Genix.\n\n",
    "The Genesis Centre is a non-profit organization dedicated to enriching the health, wellness, ",
    "and unity of Northeast Calgary. It is a community hub offering a wide range of services and ",
    "facilities, including:\n\n",
    "• Recreational Sports: The Centre provides various sports facilities for community members ",
    "to engage in physical activities and improve their fitness.\n",
    "• Event Bookings: The Centre’s versatile spaces are available for booking, accommodating ",
    "everything from cultural events and social gatherings to business-related activities such as ",
    "trade shows, conferences, and corporate team building.\n",
    "• Community Engagement: The Centre caters to the diverse interests of the community, offering ",
    "programs and activities that foster a sense of belonging and well-being.\n\n",
    "Genix is here to assist you with:\n",
    "• Operational Hours: Find out when the Genesis Centre is open.\n",
    "• Current Drop-In Schedule: Get information about available drop-in activities and times.\n",
    "• FAQs: Answer common questions about the Centre’s services, booking procedures, and more.\n\n",
    "Feel free to ask Genix for information or assistance related to the Genesis Centre's ",
    "offerings and operations."
);

pub const DEFAULT_GREETING: &str =
    "Hello! I am Genix, your AI-powered customer support assistant for the Genesis Centre. How can I help you today?";

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("Failed to read system prompt file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("System prompt file '{0}' is empty")]
    Empty(String),
}

/// The fixed instruction message placed in front of every relayed conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemPrompt {
    text: Arc<str>,
}

impl SystemPrompt {
    pub fn new(text: impl Into<Arc<str>>) -> Self {
        Self { text: text.into() }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, PromptError> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let raw = fs::read_to_string(path).map_err(|source| PromptError::Io {
            path: display.clone(),
            source,
        })?;

        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(PromptError::Empty(display));
        }

        info!("Loaded system prompt from '{}' ({} chars)", display, trimmed.chars().count());
        Ok(Self::new(trimmed))
    }

    /// Loads from `path` when given, otherwise falls back to the built-in instruction.
    pub fn from_optional_path(path: Option<&str>) -> Result<Self, PromptError> {
        match path {
            Some(p) if !p.trim().is_empty() => Self::load(p),
            _ => {
                info!("No system prompt file configured, using built-in instruction");
                Ok(Self::default())
            }
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn to_message(&self) -> ChatMessage {
        ChatMessage::system(self.text.as_ref())
    }
}

impl Default for SystemPrompt {
    fn default() -> Self {
        Self::new(DEFAULT_SYSTEM_PROMPT)
    }
}
