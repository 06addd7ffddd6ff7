use anyhow::{anyhow, bail, Context, Result};
use async_openai::{
    config::OpenAIConfig, types::ChatCompletionRequestMessage,
    types::ChatCompletionRequestUserMessage, types::CreateChatCompletionRequestArgs, Client,
};
use async_trait::async_trait;
use serde_json::Value;

use super::Interpreter;
use crate::config::LlmConfig;

/// Asks an OpenAI-compatible chat model to turn a command into a JSON action.
pub struct LlmInterpreter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl LlmInterpreter {
    /// Build an interpreter, or `None` if no credential is configured.
    pub fn from_config(config: &LlmConfig) -> Result<Option<Self>> {
        let Some(api_key) = &config.api_key else {
            return Ok(None);
        };
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .context("Building language model client")?;
        let client = Client::with_config(
            OpenAIConfig::new()
                .with_api_key(api_key)
                .with_api_base(&config.api_base),
        )
        .with_http_client(http_client);
        Ok(Some(Self {
            client,
            model: config.model.clone(),
        }))
    }

    /// Calls the model one-shot with a given prompt and returns the text of the first choice.
    async fn call_llm(&self, prompt: &str) -> Result<String> {
        let req_args = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .temperature(0.0)
            .messages([ChatCompletionRequestMessage::User(
                ChatCompletionRequestUserMessage {
                    content: prompt.into(),
                    name: None,
                },
            )])
            .build()?;
        let text = self
            .client
            .chat()
            .create(req_args)
            .await?
            .choices
            .into_iter()
            .next()
            .ok_or(anyhow!("No response from LLM"))?
            .message
            .content
            .ok_or(anyhow!("No response from LLM"))?;
        Ok(text)
    }
}

#[async_trait]
impl Interpreter for LlmInterpreter {
    async fn propose(&self, text: &str) -> Result<Value> {
        let prompt_template = include_str!("../../prompts/interpret-command.md");
        let prompt = prompt_template.replace("{command}", text);
        tracing::debug!("Prompt: {}", prompt);
        let reply = self.call_llm(&prompt).await?;
        tracing::info!(reply = %reply, "Language model replied");
        extract_json(&reply)
    }
}

/// Pull the JSON object out of a model reply.
///
/// Tolerates a surrounding code fence and chatter around the object: if the whole reply
/// doesn't parse, the span from the first `{` to the last `}` is tried instead.
pub fn extract_json(reply: &str) -> Result<Value> {
    let body = strip_code_fence(reply.trim());
    if let Ok(value) = serde_json::from_str(body) {
        return Ok(value);
    }
    match (body.find('{'), body.rfind('}')) {
        (Some(start), Some(end)) if start < end => serde_json::from_str(&body[start..=end])
            .context("Parsing JSON object from language model reply"),
        _ => bail!("No JSON object in language model reply"),
    }
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // The opening fence may carry a language tag, e.g. ```json
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}
