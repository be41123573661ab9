//! Hosted chat model boundary.
//!
//! [`ChatModel`] sends a prompt (a list of [`Message`]s) and hands each
//! streamed token to a callback as it arrives, returning the full text at
//! the end. [`OpenAIChat`] implements it against `/chat/completions` with
//! server-sent events; [`SseDecoder`] does the line framing.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use std::time::Duration;

use crate::config::Config;
use crate::models::Message;

#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_name(&self) -> &str;

    /// Complete `messages`, calling `on_token` for each text fragment.
    async fn complete(
        &self,
        messages: &[Message],
        on_token: &mut (dyn for<'t> FnMut(&'t str) + Send),
    ) -> Result<String>;
}

pub struct OpenAIChat {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    stream: bool,
}

impl OpenAIChat {
    pub fn from_config(config: &Config) -> Result<Self> {
        let api_key = config.openai.require_api_key()?.to_string();
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.openai.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.openai.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.chat.model.clone(),
            temperature: config.chat.temperature,
            stream: config.chat.stream,
        })
    }

    fn request_body(&self, messages: &[Message]) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "messages": messages,
            "temperature": self.temperature,
            "stream": self.stream,
            "store": false,
        })
    }
}

#[async_trait]
impl ChatModel for OpenAIChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        messages: &[Message],
        on_token: &mut (dyn for<'t> FnMut(&'t str) + Send),
    ) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(messages))
            .send()
            .await
            .with_context(|| format!("OpenAI request failed: POST {}", url))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            bail!("OpenAI chat error {}: {}", status, text);
        }

        if !self.stream {
            let json: serde_json::Value = resp.json().await?;
            let content = json["choices"][0]["message"]["content"]
                .as_str()
                .ok_or_else(|| anyhow::anyhow!("Invalid chat response: missing content"))?
                .to_string();
            on_token(&content);
            return Ok(content);
        }

        let mut full = String::new();
        let mut decoder = SseDecoder::default();
        let mut stream = resp.bytes_stream();

        'outer: while let Some(chunk) = stream.next().await {
            let chunk = chunk.context("OpenAI stream interrupted")?;
            for data in decoder.push(&chunk) {
                match parse_stream_event(&data)? {
                    StreamEvent::Token(token) => {
                        on_token(&token);
                        full.push_str(&token);
                    }
                    StreamEvent::Done => break 'outer,
                    StreamEvent::Other => {}
                }
            }
        }

        Ok(full)
    }
}

/// Splits a byte stream into SSE `data:` payloads.
///
/// Bytes are buffered until a newline, so events split across network
/// chunks (including inside a multi-byte character) decode correctly.
#[derive(Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
}

impl SseDecoder {
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(bytes);
        let mut out = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\n', '\r']);
            if let Some(data) = line.strip_prefix("data:") {
                out.push(data.trim_start().to_string());
            }
        }
        out
    }
}

#[derive(Debug, PartialEq)]
pub enum StreamEvent {
    Token(String),
    Done,
    Other,
}

pub fn parse_stream_event(data: &str) -> Result<StreamEvent> {
    if data == "[DONE]" {
        return Ok(StreamEvent::Done);
    }
    let json: serde_json::Value =
        serde_json::from_str(data).with_context(|| format!("Invalid stream event: {}", data))?;
    if let Some(err) = json.get("error") {
        bail!("OpenAI stream error: {}", err);
    }
    match json["choices"][0]["delta"]["content"].as_str() {
        Some(token) if !token.is_empty() => Ok(StreamEvent::Token(token.to_string())),
        _ => Ok(StreamEvent::Other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decoder_handles_split_events() {
        let mut d = SseDecoder::default();
        assert!(d.push(b"data: {\"a\":").is_empty());
        assert_eq!(d.push(b"1}\n\ndata: [DONE]\n"), vec!["{\"a\":1}", "[DONE]"]);
    }

    #[test]
    fn decoder_handles_crlf_and_comments() {
        let mut d = SseDecoder::default();
        let out = d.push(b": keep-alive\r\ndata: x\r\n\r\n");
        assert_eq!(out, vec!["x"]);
    }

    #[test]
    fn decoder_keeps_multibyte_chars_across_chunks() {
        let mut d = SseDecoder::default();
        let bytes = "data: héllo\n".as_bytes();
        let (a, b) = bytes.split_at(8); // inside 'é'
        assert!(d.push(a).is_empty());
        assert_eq!(d.push(b), vec!["héllo"]);
    }

    #[test]
    fn parses_tokens_done_and_role_only_deltas() {
        let token = r#"{"choices":[{"index":0,"delta":{"content":"Hi"}}]}"#;
        assert_eq!(
            parse_stream_event(token).unwrap(),
            StreamEvent::Token("Hi".to_string())
        );
        let role = r#"{"choices":[{"index":0,"delta":{"role":"assistant"}}]}"#;
        assert_eq!(parse_stream_event(role).unwrap(), StreamEvent::Other);
        assert_eq!(parse_stream_event("[DONE]").unwrap(), StreamEvent::Done);
    }

    #[test]
    fn stream_error_payload_is_an_error() {
        let err = parse_stream_event(r#"{"error":{"message":"quota"}}"#).unwrap_err();
        assert!(err.to_string().contains("quota"));
    }

    #[test]
    fn request_body_disables_storage() {
        let mut config = Config::default();
        config.openai.api_key = Some("k".to_string());
        config.chat.temperature = 0.3;
        let chat = OpenAIChat::from_config(&config).unwrap();
        let body = chat.request_body(&[Message::user("q")]);
        assert_eq!(body["store"], false);
        assert_eq!(body["stream"], true);
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["messages"][0]["role"], "user");
    }
}
