use anyhow::{anyhow, ensure, Context, Result};
use base64::Engine;
use reqwest::Client;
use serde_json::json;

use crate::config::ImageGenConfig;
use crate::transforms::encode_png;

/// Client for an OpenAI-style text-to-image endpoint.
#[derive(Clone)]
pub struct ImageGenerator {
    client: Client,
    api_key: String,
    endpoint: String,
    model: String,
    size: String,
}

impl ImageGenerator {
    /// Build a generator, or `None` if no credential is configured.
    pub fn from_config(config: &ImageGenConfig) -> Result<Option<Self>> {
        let Some(api_key) = config.api_key.clone() else {
            return Ok(None);
        };
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .context("Building image generation client")?;
        Ok(Some(Self {
            client,
            api_key,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            size: config.size.clone(),
        }))
    }

    /// Generate one image for `prompt` and return it as PNG.
    pub async fn generate(&self, prompt: &str) -> Result<Vec<u8>> {
        tracing::info!(model = %self.model, "Generating image");
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": self.model,
                "prompt": prompt,
                "n": 1,
                "size": self.size,
                "response_format": "b64_json",
            }))
            .send()
            .await
            .context("Sending image generation request")?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Image generation failed with {status}: {body}"));
        }
        let body: serde_json::Value = response
            .json()
            .await
            .context("Reading image generation response")?;
        // We only care about the ["data"][0]["b64_json"] field
        let encoded = body
            .pointer("/data/0/b64_json")
            .ok_or_else(|| anyhow!("No image data in response"))?
            .as_str()
            .ok_or_else(|| anyhow!("Image data is not a string"))?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .context("Decoding base64 image data")?;
        ensure!(!bytes.is_empty(), "Image generation returned an empty image");
        let img = image::load_from_memory(&bytes).context("Decoding generated image")?;
        encode_png(&img)
    }
}
