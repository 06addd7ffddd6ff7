use anyhow::bail;
use retouch::{Action, ActionKind};
use tokio::task::JoinError;

use crate::config::ImageGenConfig;
use crate::generate::ImageGenerator;
use crate::transforms;

pub type DispatchResult<T> = std::result::Result<T, DispatchError>;

#[derive(thiserror::Error, Debug)]
pub enum DispatchError {
    #[error("Unknown or unsupported command. Try rotate, crop, blur, brightness, contrast or generate.")]
    UnknownCommand,
    #[error("No image provided, but {0} needs one")]
    MissingImage(ActionKind),
    #[error("{0} is not configured on this server")]
    NotConfigured(&'static str),
    #[error("Image processing failed: {0}")]
    ProcessingFailed(String),
    #[error("Image generation failed: {0:#}")]
    Generation(anyhow::Error),
}

impl DispatchError {
    /// Whether the caller, rather than the server, is at fault
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            DispatchError::UnknownCommand | DispatchError::MissingImage(_)
        )
    }
}

/// Routes a validated action to the transform or generator that carries it out.
#[derive(Clone)]
pub struct Dispatcher {
    generator: Option<ImageGenerator>,
}

impl Dispatcher {
    pub fn new(generator: Option<ImageGenerator>) -> Self {
        Self { generator }
    }

    pub fn from_config(config: &ImageGenConfig) -> anyhow::Result<Self> {
        Ok(Self::new(ImageGenerator::from_config(config)?))
    }

    pub fn can_generate(&self) -> bool {
        self.generator.is_some()
    }

    /// Carry out `action`, on `image` where the action edits one, and return PNG bytes.
    ///
    /// Nothing runs for an unknown action, or for an edit without an image.
    pub async fn dispatch(&self, action: &Action, image: Option<&[u8]>) -> DispatchResult<Vec<u8>> {
        tracing::info!(?action, has_image = image.is_some(), "Dispatching");
        match action {
            Action::Unknown => return Err(DispatchError::UnknownCommand),
            Action::Generate { prompt } => {
                let generator = self
                    .generator
                    .as_ref()
                    .ok_or(DispatchError::NotConfigured("Image generation"))?;
                return generator
                    .generate(prompt)
                    .await
                    .map_err(DispatchError::Generation);
            }
            _ => {}
        }
        let image = image
            .filter(|bytes| !bytes.is_empty())
            .ok_or(DispatchError::MissingImage(action.kind()))?;
        let (action, image) = (action.clone(), image.to_vec());
        run_transform(move || apply(&action, &image)).await
    }
}

/// Apply an edit synchronously.
pub fn apply(action: &Action, image: &[u8]) -> anyhow::Result<Vec<u8>> {
    match *action {
        Action::Rotate { angle } => transforms::rotate(image, angle),
        Action::Crop {
            left,
            top,
            right,
            bottom,
        } => transforms::crop(image, left, top, right, bottom),
        Action::Blur { radius } => transforms::blur(image, radius),
        Action::Brightness { level } => transforms::brightness(image, level),
        Action::Contrast { level } => transforms::contrast(image, level),
        Action::Generate { .. } | Action::Unknown => {
            bail!("{} is not an image transform", action.kind())
        }
    }
}

/// Run a transform on the blocking pool. Errors, empty output and panics all come back as
/// `ProcessingFailed` with a message.
async fn run_transform<F>(transform: F) -> DispatchResult<Vec<u8>>
where
    F: FnOnce() -> anyhow::Result<Vec<u8>> + Send + 'static,
{
    match tokio::task::spawn_blocking(transform).await {
        Ok(Ok(bytes)) if !bytes.is_empty() => Ok(bytes),
        Ok(Ok(_)) => Err(DispatchError::ProcessingFailed(
            "the transform produced no output".into(),
        )),
        Ok(Err(err)) => {
            tracing::error!("Error processing image: {err:#}");
            Err(DispatchError::ProcessingFailed(format!("{err:#}")))
        }
        Err(join_err) => {
            let message = panic_message(join_err);
            tracing::error!("Transform panicked: {message}");
            Err(DispatchError::ProcessingFailed(message))
        }
    }
}

fn panic_message(err: JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }
    let payload = err.into_panic();
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "the transform panicked".into())
}
