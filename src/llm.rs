//! Chat-completion providers.
//!
//! [`ChatModel`] implementations selected by `[chat].provider`. The model
//! name comes from the request when given, else `[chat].model`; for Azure it
//! is the deployment name.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use vecstore_core::chat::{ChatMessage, ChatModel};

use crate::config::ChatConfig;
use crate::embedding::DEFAULT_AZURE_API_VERSION;
use crate::http::{self, post_json_with_retry, require_env, trim_base_url};

/// One backend covers the three wire formats; only URL, auth and the reply
/// path differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flavor {
    OpenAI,
    Azure,
    Ollama,
}

pub struct HttpChatModel {
    flavor: Flavor,
    model: String,
    url: String,
    auth: Vec<(&'static str, String)>,
    temperature: f32,
    max_retries: u32,
    client: reqwest::Client,
}

impl HttpChatModel {
    fn label(&self) -> &'static str {
        match self.flavor {
            Flavor::OpenAI => "OpenAI",
            Flavor::Azure => "Azure OpenAI",
            Flavor::Ollama => "Ollama",
        }
    }

    fn request_body(&self, messages: &[ChatMessage]) -> serde_json::Value {
        match self.flavor {
            Flavor::OpenAI => serde_json::json!({
                "model": self.model,
                "messages": messages,
                "temperature": self.temperature,
            }),
            Flavor::Azure => serde_json::json!({
                "messages": messages,
                "temperature": self.temperature,
            }),
            Flavor::Ollama => serde_json::json!({
                "model": self.model,
                "messages": messages,
                "stream": false,
                "options": { "temperature": self.temperature },
            }),
        }
    }
}

#[async_trait]
impl ChatModel for HttpChatModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        tracing::debug!(
            "{} chat request: model={} messages={}",
            self.label(),
            self.model,
            messages.len()
        );
        let json = post_json_with_retry(
            &self.client,
            &self.url,
            &self.auth,
            &self.request_body(messages),
            self.max_retries,
            self.label(),
        )
        .await?;

        match self.flavor {
            Flavor::OpenAI | Flavor::Azure => parse_openai_reply(&json),
            Flavor::Ollama => parse_ollama_reply(&json),
        }
    }
}

fn parse_openai_reply(json: &serde_json::Value) -> Result<String> {
    json.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("Invalid chat response: missing choices[0].message.content"))
}

fn parse_ollama_reply(json: &serde_json::Value) -> Result<String> {
    json.pointer("/message/content")
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("Invalid Ollama chat response: missing message.content"))
}

/// Build the chat model for `model` (or the configured default when `None`).
pub fn create_chat_model(config: &ChatConfig, model: Option<&str>) -> Result<HttpChatModel> {
    let model = model
        .filter(|m| !m.trim().is_empty())
        .unwrap_or(&config.model)
        .to_string();

    let (flavor, url, auth) = match config.provider.as_str() {
        "openai" => {
            let base = config.url.as_deref().unwrap_or("https://api.openai.com/v1");
            (
                Flavor::OpenAI,
                format!("{}/chat/completions", trim_base_url(base)),
                vec![(
                    "Authorization",
                    format!("Bearer {}", require_env("OPENAI_API_KEY")?),
                )],
            )
        }
        "azure" => {
            let endpoint = match &config.url {
                Some(url) => url.clone(),
                None => require_env("AZURE_OPENAI_ENDPOINT")?,
            };
            let api_version = config
                .api_version
                .as_deref()
                .unwrap_or(DEFAULT_AZURE_API_VERSION);
            (
                Flavor::Azure,
                format!(
                    "{}/openai/deployments/{}/chat/completions?api-version={}",
                    trim_base_url(&endpoint),
                    model,
                    api_version
                ),
                vec![("api-key", require_env("AZURE_OPENAI_API_KEY")?)],
            )
        }
        "ollama" => {
            let base = config.url.as_deref().unwrap_or("http://localhost:11434");
            (
                Flavor::Ollama,
                format!("{}/api/chat", trim_base_url(base)),
                Vec::new(),
            )
        }
        other => bail!("Unknown chat provider: {}", other),
    };

    Ok(HttpChatModel {
        flavor,
        model,
        url,
        auth,
        temperature: config.temperature,
        max_retries: config.max_retries,
        client: http::client(config.timeout_secs)?,
    })
}
