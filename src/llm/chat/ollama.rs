use async_trait::async_trait;
use log::{ debug, info };
use reqwest::Client as HttpClient;
use serde::{ Deserialize, Serialize };

use super::{ http_stream_generate, ChatClient, FragmentStream, LineEvent };
use crate::llm::{ LlmConfig, LlmError, LlmType };
use crate::models::chat::ChatMessage;

pub const DEFAULT_MODEL: &str = "llama3.2";
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

#[derive(Debug)]
pub struct OllamaClient {
    http: HttpClient,
    base_url: String,
    completion_model: String,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
}

#[derive(Deserialize)]
struct StreamResponse {
    message: Option<StreamMessage>,
    #[serde(default)]
    done: bool,
    error: Option<String>,
}

#[derive(Deserialize)]
struct StreamMessage {
    #[serde(default)]
    content: String,
}

impl OllamaClient {
    pub fn new(base_url: Option<String>, completion_model: Option<String>) -> Self {
        let model = completion_model.unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let url = base_url.unwrap_or_else(|| DEFAULT_BASE_URL.into());

        info!("Ollama chat client ready: model={}, base_url={}", model, url);

        Self {
            http: HttpClient::new(),
            base_url: url,
            completion_model: model,
        }
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        if config.llm_type != LlmType::Ollama {
            return Err(LlmError::Config("Invalid config type for OllamaClient".into()));
        }

        Ok(Self::new(config.base_url.clone(), config.completion_model.clone()))
    }
}

/// Parses one NDJSON line of a streamed `/api/chat` response.
pub fn parse_ndjson_line(line: &str) -> LineEvent {
    let line = line.trim();
    if line.is_empty() {
        return LineEvent::Skip;
    }

    match serde_json::from_str::<StreamResponse>(line) {
        Ok(StreamResponse { error: Some(err), .. }) => LineEvent::Error(err),
        Ok(resp) => {
            let content = resp.message.map(|m| m.content).unwrap_or_default();
            if !content.is_empty() {
                LineEvent::Fragment(content)
            } else if resp.done {
                LineEvent::Done
            } else {
                LineEvent::Skip
            }
        }
        Err(e) => {
            debug!("JSON parse error: {} for line: {}", e, line);
            LineEvent::Skip
        }
    }
}

#[async_trait]
impl ChatClient for OllamaClient {
    async fn stream_chat(&self, messages: &[ChatMessage]) -> Result<FragmentStream, LlmError> {
        let url = format!("{}/api/chat", self.base_url.trim_end_matches('/'));
        let req = ChatRequest {
            model: self.completion_model.clone(),
            messages: messages.to_vec(),
            stream: true,
        };

        Ok(http_stream_generate(self.http.clone(), url, req, parse_ndjson_line))
    }

    fn get_model(&self) -> String {
        self.completion_model.clone()
    }

    fn get_base_url(&self) -> String {
        self.base_url.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use wiremock::matchers::{ method, path };
    use wiremock::{ Mock, MockServer, ResponseTemplate };

    #[test]
    fn parses_message_content() {
        let line = r#"{"model":"llama3.2","message":{"role":"assistant","content":"Hi"},"done":false}"#;
        assert_eq!(parse_ndjson_line(line), LineEvent::Fragment("Hi".to_string()));
    }

    #[test]
    fn done_line_ends_stream() {
        let line = r#"{"model":"llama3.2","message":{"role":"assistant","content":""},"done":true}"#;
        assert_eq!(parse_ndjson_line(line), LineEvent::Done);
    }

    #[test]
    fn error_line_is_reported() {
        assert_eq!(
            parse_ndjson_line(r#"{"error":"model 'x' not found"}"#),
            LineEvent::Error("model 'x' not found".to_string())
        );
    }

    #[test]
    fn unset_model_falls_back_to_ollama_default() {
        let config = LlmConfig { llm_type: LlmType::Ollama, ..LlmConfig::default() };
        let client = crate::llm::chat::new_client(&config).unwrap();
        assert_eq!(client.get_model(), DEFAULT_MODEL);
        assert_eq!(client.get_base_url(), DEFAULT_BASE_URL);
    }

    #[test]
    fn rejects_foreign_config() {
        let config = LlmConfig::default();
        assert!(OllamaClient::from_config(&config).is_err());
    }

    #[tokio::test]
    async fn streams_ndjson_fragments() {
        let server = MockServer::start().await;
        let body = concat!(
            "{\"message\":{\"role\":\"assistant\",\"content\":\"We\"},\"done\":false}\n",
            "{\"message\":{\"role\":\"assistant\",\"content\":\"'re open\"},\"done\":false}\n",
            "{\"message\":{\"role\":\"assistant\",\"content\":\"\"},\"done\":true}\n"
        );
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server).await;

        let client = OllamaClient::new(Some(server.uri()), None);
        let stream = client.stream_chat(&[ChatMessage::user("hours?")]).await.unwrap();
        let out: Vec<String> = stream.map(|r| r.unwrap()).collect().await;
        assert_eq!(out, vec!["We", "'re open"]);
    }

    #[tokio::test]
    async fn error_line_after_fragment_fails_the_stream() {
        let server = MockServer::start().await;
        let body = concat!(
            "{\"message\":{\"role\":\"assistant\",\"content\":\"We\"},\"done\":false}\n",
            "{\"error\":\"model runner has unexpectedly stopped\"}\n"
        );
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server).await;

        let client = OllamaClient::new(Some(server.uri()), None);
        let mut stream = client.stream_chat(&[ChatMessage::user("hours?")]).await.unwrap();

        assert_eq!(stream.next().await.unwrap().unwrap(), "We");
        match stream.next().await {
            Some(Err(LlmError::Stream(msg))) => {
                assert_eq!(msg, "model runner has unexpectedly stopped");
            }
            other => panic!("expected stream error, got {:?}", other.map(|r| r.is_ok())),
        }
        assert!(stream.next().await.is_none());
    }
}
