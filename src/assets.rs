// ABOUTME: Local filesystem access for product assets and uploaded article images
// ABOUTME: Only the base filename of a request is honoured so lookups cannot escape their directories

use axum::{
    body::Body,
    http::Request,
    response::{IntoResponse, Response},
};
use std::path::{Path, PathBuf};
use tower::ServiceExt;
use tower_http::services::ServeFile;
use uuid::Uuid;

use crate::error::{AppError, Result};

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;
pub const UPLOADS_ROUTE: &str = "/uploads";

#[derive(Debug, Clone)]
pub struct AssetStore {
    assets_dir: PathBuf,
    uploads_dir: PathBuf,
    max_upload_bytes: usize,
}

impl AssetStore {
    pub fn new(assets_dir: PathBuf, uploads_dir: PathBuf, max_upload_bytes: usize) -> Self {
        Self {
            assets_dir,
            uploads_dir,
            max_upload_bytes,
        }
    }

    pub fn uploads_dir(&self) -> &Path {
        &self.uploads_dir
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes
    }

    /// Finds `requested` by base name in the assets directory, then among uploads.
    pub async fn resolve(&self, requested: &str) -> Option<PathBuf> {
        let name = base_name(requested)?;

        for dir in [&self.assets_dir, &self.uploads_dir] {
            let candidate = dir.join(name);
            if let Ok(meta) = tokio::fs::metadata(&candidate).await {
                if meta.is_file() {
                    return Some(candidate);
                }
            }
        }

        None
    }

    /// Streams the requested asset, or NotFound when no such file exists.
    pub async fn serve(&self, requested: &str, what: &str, request: Request<Body>) -> Result<Response> {
        let path = self
            .resolve(requested)
            .await
            .ok_or_else(|| AppError::NotFound(format!("{what} file not found")))?;

        let response = ServeFile::new(path)
            .oneshot(request)
            .await
            .unwrap_or_else(|never| match never {});

        Ok(response.map(Body::new).into_response())
    }

    /// Writes an uploaded file under a generated name and returns its public path.
    pub async fn save_upload(&self, original_name: Option<&str>, bytes: &[u8]) -> Result<String> {
        tokio::fs::create_dir_all(&self.uploads_dir).await?;

        let stem = Uuid::new_v4().simple().to_string();
        let name = match original_name.and_then(extension_of) {
            Some(ext) => format!("{stem}.{ext}"),
            None => stem,
        };

        tokio::fs::write(self.uploads_dir.join(&name), bytes).await?;
        tracing::info!(file = %name, size = bytes.len(), "stored upload");

        Ok(format!("{UPLOADS_ROUTE}/{name}"))
    }
}

fn base_name(requested: &str) -> Option<&str> {
    let name = requested.rsplit(|c: char| c == '/' || c == '\\').next()?;
    match name {
        "" | "." | ".." => None,
        name => Some(name),
    }
}

// Keeps alphanumeric extensions only; anything else is dropped.
fn extension_of(file_name: &str) -> Option<String> {
    let ext = Path::new(base_name(file_name)?).extension()?.to_str()?;
    if ext.is_empty() || ext.len() > 8 || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}
