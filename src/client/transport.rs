use async_trait::async_trait;
use bytes::Bytes;
use futures::{ Stream, StreamExt };
use log::debug;
use reqwest::Client as HttpClient;
use std::pin::Pin;
use url::Url;

use super::ClientError;
use crate::models::chat::ChatMessage;

pub type ResponseStream = Pin<Box<dyn Stream<Item = Result<Bytes, ClientError>> + Send>>;

#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Sends the conversation and returns the raw reply body as it arrives.
    async fn open(&self, history: &[ChatMessage]) -> Result<ResponseStream, ClientError>;
}

/// Talks to a relay endpoint over HTTP.
#[derive(Debug, Clone)]
pub struct RelayClient {
    http: HttpClient,
    endpoint: Url,
}

impl RelayClient {
    pub fn new(endpoint: &str) -> Result<Self, ClientError> {
        let endpoint = Url::parse(endpoint).map_err(|e|
            ClientError::InvalidUrl(endpoint.to_string(), e)
        )?;
        Ok(Self { http: HttpClient::new(), endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl ChatTransport for RelayClient {
    async fn open(&self, history: &[ChatMessage]) -> Result<ResponseStream, ClientError> {
        debug!("POST {} with {} messages", self.endpoint, history.len());
        let resp = self.http.post(self.endpoint.clone()).json(history).send().await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ClientError::Status(status));
        }

        Ok(Box::pin(resp.bytes_stream().map(|chunk| chunk.map_err(ClientError::Http))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{ body_json, header, method, path };
    use wiremock::{ Mock, MockServer, ResponseTemplate };

    #[test]
    fn rejects_malformed_endpoint() {
        assert!(matches!(RelayClient::new("not a url"), Err(ClientError::InvalidUrl(..))));
    }

    #[tokio::test]
    async fn posts_history_as_json_array() {
        let server = MockServer::start().await;
        let history = vec![ChatMessage::assistant("Hi"), ChatMessage::user("hours?")];
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(header("content-type", "application/json"))
            .and(body_json(serde_json::json!([
                { "role": "assistant", "content": "Hi" },
                { "role": "user", "content": "hours?" }
            ])))
            .respond_with(ResponseTemplate::new(200).set_body_string("We're open 9-5."))
            .expect(1)
            .mount(&server).await;

        let client = RelayClient::new(&format!("{}/api/chat", server.uri())).unwrap();
        let body = client.open(&history).await.unwrap();
        let chunks: Vec<Bytes> = body.map(|c| c.unwrap()).collect().await;
        assert_eq!(chunks.concat(), b"We're open 9-5.".to_vec());
    }

    #[tokio::test]
    async fn error_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server).await;

        let client = RelayClient::new(&server.uri()).unwrap();
        match client.open(&[ChatMessage::user("hi")]).await {
            Err(ClientError::Status(status)) => assert_eq!(status.as_u16(), 502),
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("expected an error status"),
        }
    }
}
