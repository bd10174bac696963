//! Persisting generation artifacts and diagnostic snapshots

use crate::error::{ArtifactError, Error};
use crate::types::{FileData, ImageInput, OperationContext, RemoteResult};
use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default timeout for artifact downloads (5 minutes)
const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// Content to persist
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Bytes(Vec<u8>),
    LocalFile(PathBuf),
    Remote(FileData),
}

impl Payload {
    /// Payload persisting the caller's input image unchanged
    pub fn from_image(image: &ImageInput) -> Result<Self, ArtifactError> {
        match image {
            ImageInput::Bytes { data, .. } => Ok(Payload::Bytes(data.clone())),
            ImageInput::Base64(text) => decode_base64_image(text).map(Payload::Bytes),
            ImageInput::Path(path) => Ok(Payload::LocalFile(path.clone())),
            ImageInput::Url(url) => Ok(Payload::Remote(FileData::from_url(url.clone()))),
        }
    }
}

/// Decode a base64 image, stripping an optional `data:...;base64,` prefix
pub fn decode_base64_image(text: &str) -> Result<Vec<u8>, ArtifactError> {
    let encoded = match text.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => text,
    };
    base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| ArtifactError::InvalidImage(e.to_string()))
}

/// Handle to a persisted artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedFile {
    pub path: PathBuf,
}

/// Durable storage for artifacts produced by a run
#[async_trait]
pub trait ArtifactWriter: Send + Sync {
    /// Persist `payload` as `{base_name}.{extension}` (or a unique variant of
    /// it) under the run's assets directory
    async fn save(
        &self,
        payload: &Payload,
        base_name: &str,
        extension: &str,
        ctx: &OperationContext,
    ) -> Result<SavedFile, ArtifactError>;
}

/// Writes artifacts into `ctx.assets_dir`, downloading remote payloads
///
/// Files are named `{base_name}_{operation_id}.{extension}` and written via a
/// temporary file followed by a rename.
#[derive(Debug, Clone)]
pub struct FileArtifactWriter {
    client: Client,
    token: Option<String>,
    /// Only urls under this prefix receive the bearer token
    token_scope: Option<String>,
    download_timeout: Duration,
}

impl Default for FileArtifactWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl FileArtifactWriter {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            token: None,
            token_scope: None,
            download_timeout: DEFAULT_DOWNLOAD_TIMEOUT,
        }
    }

    /// Authenticate downloads from urls starting with `scope`
    pub fn with_token(mut self, token: Option<String>, scope: impl Into<String>) -> Self {
        self.token = token.filter(|t| !t.is_empty());
        self.token_scope = Some(scope.into());
        self
    }

    pub fn with_download_timeout(mut self, timeout: Duration) -> Self {
        self.download_timeout = timeout;
        self
    }

    fn token_for(&self, url: &str) -> Option<&str> {
        match (&self.token, &self.token_scope) {
            (Some(token), Some(scope)) if in_scope(url, scope) => Some(token.as_str()),
            _ => None,
        }
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, ArtifactError> {
        tracing::debug!("Downloading {}", url);
        let mut request = self.client.get(url).timeout(self.download_timeout);
        if let Some(token) = self.token_for(url) {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ArtifactError::DownloadStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response.bytes().await?.to_vec())
    }

    async fn resolve(&self, payload: &Payload) -> Result<Vec<u8>, ArtifactError> {
        match payload {
            Payload::Bytes(data) => Ok(data.clone()),
            Payload::LocalFile(path) => read(path).await,
            Payload::Remote(file) => {
                if let Some(url) = file.url.as_deref().filter(|u| !u.trim().is_empty()) {
                    return self.download(url).await;
                }
                match file.path.as_deref().map(Path::new) {
                    Some(path) if path.exists() => read(path).await,
                    _ => Err(ArtifactError::EmptyPayload),
                }
            }
        }
    }
}

#[async_trait]
impl ArtifactWriter for FileArtifactWriter {
    async fn save(
        &self,
        payload: &Payload,
        base_name: &str,
        extension: &str,
        ctx: &OperationContext,
    ) -> Result<SavedFile, ArtifactError> {
        let data = self.resolve(payload).await?;

        let dir = &ctx.assets_dir;
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|source| ArtifactError::Io {
                path: dir.clone(),
                source,
            })?;

        let path = dir.join(format!(
            "{}_{}.{}",
            base_name,
            ctx.operation_id,
            extension.trim_start_matches('.')
        ));
        write_atomic(&path, &data).await?;

        tracing::debug!("Saved {} ({} bytes)", path.display(), data.len());
        Ok(SavedFile { path })
    }
}

/// `url` is `scope` itself or a path below it
fn in_scope(url: &str, scope: &str) -> bool {
    let scope = scope.trim_end_matches('/');
    match url.strip_prefix(scope) {
        Some(rest) => rest.is_empty() || rest.starts_with(['/', '?', '#']),
        None => false,
    }
}

async fn read(path: &Path) -> Result<Vec<u8>, ArtifactError> {
    tokio::fs::read(path).await.map_err(|source| ArtifactError::Io {
        path: path.to_path_buf(),
        source,
    })
}

async fn write_atomic(path: &Path, data: &[u8]) -> Result<(), ArtifactError> {
    let tmp = path.with_extension("tmp");
    let io_err = |source: std::io::Error| ArtifactError::Io {
        path: path.to_path_buf(),
        source,
    };
    tokio::fs::write(&tmp, data).await.map_err(io_err)?;
    tokio::fs::rename(&tmp, path).await.map_err(io_err)?;
    Ok(())
}

/// Write the raw response of `step` to `{work_dir}/debug/` for troubleshooting
///
/// Callers treat the returned error as diagnostic only.
pub async fn write_debug_snapshot(
    ctx: &OperationContext,
    step: &str,
    result: &RemoteResult,
) -> Result<PathBuf, Error> {
    let dir = ctx.work_dir.join("debug");
    let path = dir.join(format!(
        "{}_{}_{}_{}.json",
        ctx.tool_name,
        ctx.operation_id,
        step.trim_start_matches('/'),
        chrono::Utc::now().format("%Y%m%dT%H%M%S%.3fZ")
    ));
    let fail = |source: std::io::Error| Error::DiagnosticWriteFailed {
        operation_id: ctx.operation_id.clone(),
        path: path.clone(),
        source,
    };

    let body = serde_json::to_vec_pretty(result).map_err(|e| fail(e.into()))?;
    tokio::fs::create_dir_all(&dir).await.map_err(fail)?;
    tokio::fs::write(&path, body).await.map_err(fail)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context(root: &Path) -> OperationContext {
        OperationContext::new("generate_3d", root, root.join("assets")).with_operation_id("op42")
    }

    #[test]
    fn test_decode_base64_image() {
        assert_eq!(decode_base64_image("aGVsbG8=").unwrap(), b"hello");
        assert_eq!(
            decode_base64_image("data:image/png;base64,aGVsbG8=").unwrap(),
            b"hello"
        );
        assert!(matches!(
            decode_base64_image("***"),
            Err(ArtifactError::InvalidImage(_))
        ));
    }

    #[test]
    fn test_payload_from_image() {
        let payload = Payload::from_image(&ImageInput::Base64("aGk=".into())).unwrap();
        assert_eq!(payload, Payload::Bytes(b"hi".to_vec()));

        let payload = Payload::from_image(&ImageInput::Url("https://x/y.png".into())).unwrap();
        assert_eq!(payload, Payload::Remote(FileData::from_url("https://x/y.png")));
    }

    #[test]
    fn test_token_scope() {
        let writer = FileArtifactWriter::new()
            .with_token(Some("hf_secret".into()), "https://owner-space.hf.space");
        assert_eq!(
            writer.token_for("https://owner-space.hf.space/gradio_api/file=/tmp/a.glb"),
            Some("hf_secret")
        );
        assert_eq!(writer.token_for("https://elsewhere.example/a.glb"), None);
        assert_eq!(
            writer.token_for("https://owner-space.hf.space.evil.example/a.glb"),
            None
        );
        assert_eq!(writer.token_for("https://owner-space.hf.spacey/a.glb"), None);
    }

    #[tokio::test]
    async fn test_save_bytes_and_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let writer = FileArtifactWriter::new();

        let saved = writer
            .save(&Payload::Bytes(b"solid".to_vec()), "mesh_obj", "obj", &ctx)
            .await
            .unwrap();
        assert_eq!(saved.path, dir.path().join("assets").join("mesh_obj_op42.obj"));
        assert_eq!(std::fs::read(&saved.path).unwrap(), b"solid");
        assert!(!saved.path.with_extension("tmp").exists());

        let copy = writer
            .save(&Payload::LocalFile(saved.path.clone()), "copy", ".glb", &ctx)
            .await
            .unwrap();
        assert_eq!(copy.path.file_name().unwrap(), "copy_op42.glb");
        assert_eq!(std::fs::read(&copy.path).unwrap(), b"solid");
    }

    #[tokio::test]
    async fn test_save_remote_without_reference_fails() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let writer = FileArtifactWriter::new();

        let payload = Payload::Remote(FileData::from_server_path("/nonexistent/gradio/a.glb"));
        let result = writer.save(&payload, "mesh_glb", "glb", &ctx).await;
        assert!(matches!(result, Err(ArtifactError::EmptyPayload)));
    }

    #[tokio::test]
    async fn test_debug_snapshot_written() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let result = RemoteResult::new(vec![json!({"url": "https://x/a.glb"}), json!(null)]);

        let path = write_debug_snapshot(&ctx, "/generation_all", &result)
            .await
            .unwrap();
        assert!(path.starts_with(dir.path().join("debug")));
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("generate_3d_op42_generation_all_"));

        let written: RemoteResult =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(written, result);
    }

    #[tokio::test]
    async fn test_debug_snapshot_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        // a file where the debug directory should go
        let blocker = dir.path().join("debug");
        std::fs::write(&blocker, b"").unwrap();
        let ctx = context(dir.path());

        let err = write_debug_snapshot(&ctx, "make3d", &RemoteResult::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DiagnosticWriteFailed { .. }));
        assert_eq!(err.operation_id(), Some("op42"));
    }
}
