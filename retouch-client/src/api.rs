use anyhow::{anyhow, Context, Result};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use retouch::models::{ErrorBody, StoredFile};

/// Talks to a running retouch server.
#[derive(Clone)]
pub struct RetouchClient {
    http: Client,
    server: String,
}

/// An image to send along with a request.
pub struct ImageUpload {
    pub file_name: String,
    pub content: Vec<u8>,
}

impl RetouchClient {
    pub fn new(server: &str) -> Self {
        Self {
            http: Client::new(),
            server: server.trim_end_matches('/').to_string(),
        }
    }

    /// Send a command (and optionally an image) and return the edited PNG.
    pub async fn edit(&self, command: &str, image: Option<ImageUpload>) -> Result<Vec<u8>> {
        let mut form = Form::new().text("command", command.to_string());
        if let Some(image) = image {
            form = form.part("image", Part::bytes(image.content).file_name(image.file_name));
        }
        let response = self
            .http
            .post(format!("{}/voice-command", self.server))
            .multipart(form)
            .send()
            .await
            .context("Sending command")?;
        let response = check(response).await?;
        Ok(response.bytes().await?.to_vec())
    }

    /// Keep a file in the server's storage.
    pub async fn upload(&self, file: ImageUpload) -> Result<StoredFile> {
        let form = Form::new().part("file", Part::bytes(file.content).file_name(file.file_name));
        let response = self
            .http
            .post(format!("{}/upload", self.server))
            .multipart(form)
            .send()
            .await
            .context("Uploading file")?;
        Ok(check(response).await?.json().await?)
    }

    pub async fn list(&self) -> Result<Vec<StoredFile>> {
        let response = self
            .http
            .get(format!("{}/uploads", self.server))
            .send()
            .await
            .context("Listing uploads")?;
        Ok(check(response).await?.json().await?)
    }

    pub async fn download(&self, name: &str) -> Result<Vec<u8>> {
        let response = self
            .http
            .get(format!("{}/uploads/{}", self.server, name))
            .send()
            .await
            .context("Downloading upload")?;
        Ok(check(response).await?.bytes().await?.to_vec())
    }
}

/// Turn an error response into an error carrying the server's explanation.
async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    Err(match serde_json::from_str::<ErrorBody>(&text) {
        Ok(body) => anyhow!("Server returned {status}: {body}"),
        Err(_) => anyhow!("Server returned {status}: {text}"),
    })
}
