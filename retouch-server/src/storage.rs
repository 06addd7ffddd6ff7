use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use itertools::Itertools;
use rand::Rng;
pub use retouch::models::StoredFile;

#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("Invalid file name: {0:?}")]
    InvalidName(String),
    #[error("No such file: {0}")]
    NotFound(String),
    #[error(transparent)]
    Io(#[from] anyhow::Error),
}

/// Flat directory of uploaded files.
#[derive(Clone)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    /// Open the directory, creating it if needed.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .with_context(|| format!("Creating storage directory {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Save `content` under a fresh name derived from `original_name`.
    pub async fn save(&self, original_name: &str, content: &[u8]) -> Result<StoredFile> {
        let name = format!(
            "{}-{:08x}-{}",
            chrono::Utc::now().format("%Y%m%d%H%M%S"),
            rand::thread_rng().gen::<u32>(),
            sanitize(original_name)
        );
        let path = self.root.join(&name);
        tokio::fs::write(&path, content)
            .await
            .with_context(|| format!("Writing {}", path.display()))?;
        tracing::info!(name = %name, size = content.len(), "Stored upload");
        Ok(StoredFile {
            name,
            size: content.len() as u64,
        })
    }

    /// Read back a stored file by name.
    pub async fn read(&self, name: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.path_of(name)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(name.to_string()))
            }
            Err(err) => Err(anyhow::Error::from(err)
                .context(format!("Reading {}", path.display()))
                .into()),
        }
    }

    /// All stored files, sorted by name (and so by upload time).
    pub async fn list(&self) -> Result<Vec<StoredFile>> {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || list_dir(&root))
            .await
            .context("Listing task failed")?
    }

    fn path_of(&self, name: &str) -> Result<PathBuf, StorageError> {
        let plain = !name.is_empty()
            && !name.starts_with('.')
            && !name.contains(['/', '\\'])
            && Path::new(name).file_name().is_some_and(|n| n == name);
        if plain {
            Ok(self.root.join(name))
        } else {
            Err(StorageError::InvalidName(name.to_string()))
        }
    }
}

fn list_dir(root: &Path) -> Result<Vec<StoredFile>> {
    let root_str = root
        .to_str()
        .with_context(|| format!("Storage path {} is not UTF-8", root.display()))?;
    let pattern = Path::new(&glob::Pattern::escape(root_str)).join("*");
    let pattern = pattern.to_string_lossy();
    let mut files = vec![];
    for entry in glob::glob(&pattern)? {
        let path = entry?;
        let metadata = std::fs::metadata(&path)?;
        if !metadata.is_file() {
            continue;
        }
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            files.push(StoredFile {
                name: name.to_string(),
                size: metadata.len(),
            });
        }
    }
    Ok(files.into_iter().sorted_by(|a, b| a.name.cmp(&b.name)).collect())
}

/// Keep a name to letters, digits, dots, dashes and underscores.
fn sanitize(original_name: &str) -> String {
    let base = Path::new(original_name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "upload".into()
    } else {
        cleaned.into()
    }
}

/// Guess a content type from a file extension.
pub fn content_type(name: &str) -> &'static str {
    match name.rsplit('.').next().map(str::to_ascii_lowercase).as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("bmp") => "image/bmp",
        Some("tif") | Some("tiff") => "image/tiff",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_read_list() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open(dir.path().join("uploads")).await.unwrap();
        let first = storage.save("cat photo.png", b"first").await.unwrap();
        let second = storage.save("dog.jpg", b"second!").await.unwrap();
        assert!(first.name.ends_with("-cat_photo.png"));
        assert_eq!(second.size, 7);

        assert_eq!(storage.read(&first.name).await.unwrap(), b"first");
        let listed = storage.list().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.contains(&first));
        assert!(listed.contains(&second));
    }

    #[tokio::test]
    async fn listing_ignores_glob_characters_in_the_root() {
        let dir = tempfile::tempdir().unwrap();
        // A sibling that `[ab]` would match as a pattern
        let decoy = Storage::open(dir.path().join("a")).await.unwrap();
        decoy.save("decoy.png", b"decoy").await.unwrap();
        let storage = Storage::open(dir.path().join("[ab]*")).await.unwrap();
        let kept = storage.save("real.png", b"real").await.unwrap();
        assert_eq!(storage.list().await.unwrap(), vec![kept]);
    }

    #[tokio::test]
    async fn traversal_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open(dir.path()).await.unwrap();
        for name in ["../secret", "..", ".env", "a/b", "a\\b", ""] {
            assert!(
                matches!(storage.read(name).await, Err(StorageError::InvalidName(_))),
                "{name}"
            );
        }
    }

    #[tokio::test]
    async fn missing_files_are_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open(dir.path()).await.unwrap();
        assert!(matches!(
            storage.read("nothing.png").await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[test]
    fn names_are_sanitized() {
        assert_eq!(sanitize("../../etc/passwd"), "passwd");
        assert_eq!(sanitize("my photo (1).PNG"), "my_photo__1_.PNG");
        assert_eq!(sanitize(".hidden"), "hidden");
        assert_eq!(sanitize(""), "upload");
    }

    #[test]
    fn content_types() {
        assert_eq!(content_type("x.PNG"), "image/png");
        assert_eq!(content_type("x.jpeg"), "image/jpeg");
        assert_eq!(content_type("x"), "application/octet-stream");
    }
}
