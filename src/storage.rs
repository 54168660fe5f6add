//! Blob storage for uploaded scan images and derived thumbnails.
//!
//! Files live under the configured media root (`scans/` for originals,
//! `thumbs/` for thumbnails) and are served as static files. A failed disk
//! write degrades to an inline base64 data URL instead of failing the
//! upload; only the persistence step has this policy, callers still see
//! hard errors from everything else.

use std::path::{Path, PathBuf};

use axum::body::Bytes;
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use thiserror::Error;
use uuid::Uuid;

use crate::config::StorageConfig;
use crate::error::{AppError, AppResult};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("image decode/encode failed: {0}")]
    Image(#[from] image::ImageError),
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),
}

/// Outcome of persisting one asset. `inline` marks the data-URL fallback.
#[derive(Debug, Clone)]
pub struct StoredAsset {
    pub url: String,
    pub inline: bool,
}

#[derive(Clone)]
pub struct MediaStore {
    root: PathBuf,
    public_base: String,
    thumb_max_edge: u32,
    thumb_quality: u8,
}

impl MediaStore {
    pub fn new(cfg: &StorageConfig) -> Self {
        Self {
            root: PathBuf::from(&cfg.media_dir),
            public_base: cfg.public_base.trim_end_matches('/').to_string(),
            thumb_max_edge: cfg.thumbnail_max_edge,
            thumb_quality: cfg.thumbnail_quality,
        }
    }

    /// Filesystem root the static file service should serve.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(self.root.join("scans"))?;
        std::fs::create_dir_all(self.root.join("thumbs"))?;
        Ok(())
    }

    /// Persists the original upload.
    ///
    /// Storage failures do not propagate: the asset falls back to an inline
    /// data URL. Only task-join failures surface as errors.
    pub async fn store_original(&self, bytes: Bytes, file_name: &str, content_type: &str) -> AppResult<StoredAsset> {
        let name = unique_name(file_name, content_type);
        let path = self.root.join("scans").join(&name);
        let url = format!("{}/scans/{}", self.public_base, name);

        let write_bytes = bytes.clone();
        let result = tokio::task::spawn_blocking(move || write_file(&path, &write_bytes))
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("storage task failed: {}", e)))?;

        match result {
            Ok(()) => Ok(StoredAsset { url, inline: false }),
            Err(e) => {
                // Fallback: Datei als data-URL einbetten statt den Upload abzubrechen
                tracing::warn!("Storing original failed, falling back to inline encoding: {}", e);
                Ok(StoredAsset { url: data_url(content_type, &bytes), inline: true })
            }
        }
    }

    /// Derives and persists a bounded JPEG thumbnail.
    ///
    /// Returns `None` when the source cannot be decoded (DICOM and other
    /// non-raster payloads); a failed disk write falls back to an inline
    /// data URL like the original.
    pub async fn store_thumbnail(&self, bytes: Bytes, file_name: &str) -> AppResult<Option<StoredAsset>> {
        let name = format!("{}.jpg", stem(&unique_name(file_name, "image/jpeg")));
        let path = self.root.join("thumbs").join(&name);
        let url = format!("{}/thumbs/{}", self.public_base, name);
        let max_edge = self.thumb_max_edge;
        let quality = self.thumb_quality;

        let encoded = tokio::task::spawn_blocking(move || make_thumbnail(&bytes, max_edge, quality))
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("thumbnail task failed: {}", e)))?;

        let jpeg = match encoded {
            Ok(jpeg) => jpeg,
            Err(e) => {
                tracing::warn!("Thumbnail derivation failed, scan will have none: {}", e);
                return Ok(None);
            }
        };

        let write_jpeg = jpeg.clone();
        let result = tokio::task::spawn_blocking(move || write_file(&path, &write_jpeg))
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("storage task failed: {}", e)))?;

        match result {
            Ok(()) => Ok(Some(StoredAsset { url, inline: false })),
            Err(e) => {
                tracing::warn!("Storing thumbnail failed, falling back to inline encoding: {}", e);
                Ok(Some(StoredAsset { url: data_url("image/jpeg", &jpeg), inline: true }))
            }
        }
    }

    /// Best-effort removal of a stored asset by its public URL.
    ///
    /// Inline data URLs and foreign URLs are ignored.
    pub async fn remove_asset(&self, url: &str) {
        let Some(rel) = url.strip_prefix(self.public_base.as_str()) else {
            return;
        };
        let rel = rel.trim_start_matches('/');
        let mut parts = rel.splitn(2, '/');
        let (Some(dir), Some(file)) = (parts.next(), parts.next()) else {
            return;
        };
        if !matches!(dir, "scans" | "thumbs") || file.contains('/') || file.contains("..") {
            return;
        }
        let path = self.root.join(dir).join(file);
        if let Err(e) = tokio::fs::remove_file(&path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("Failed to remove media file {}: {}", path.display(), e);
            }
        }
    }
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    std::fs::write(path, bytes)?;
    Ok(())
}

/// Decode, bound the longest edge, re-encode as JPEG.
pub fn make_thumbnail(bytes: &[u8], max_edge: u32, quality: u8) -> Result<Vec<u8>, StorageError> {
    let img = image::load_from_memory(bytes)?;
    let thumb = img.thumbnail(max_edge, max_edge);
    let rgb = thumb.to_rgb8();
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality).encode_image(&rgb)?;
    Ok(out)
}

pub fn data_url(content_type: &str, bytes: &[u8]) -> String {
    let mime = if content_type.is_empty() { "application/octet-stream" } else { content_type };
    format!("data:{};base64,{}", mime, base64::engine::general_purpose::STANDARD.encode(bytes))
}

/// `{unix_millis}-{random}.{ext}`, mirroring the upload naming scheme the
/// frontend already relies on.
fn unique_name(file_name: &str, content_type: &str) -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let rand = Uuid::new_v4().simple().to_string();
    format!("{}-{}.{}", millis, &rand[..8], extension_for(file_name, content_type))
}

fn stem(name: &str) -> &str {
    name.rsplit_once('.').map(|(s, _)| s).unwrap_or(name)
}

fn extension_for(file_name: &str, content_type: &str) -> String {
    let from_name: String = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(8)
        .collect::<String>()
        .to_lowercase();
    if !from_name.is_empty() {
        return from_name;
    }
    match content_type {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/webp" => "webp",
        "image/dicom" => "dcm",
        _ => "bin",
    }
    .to_string()
}
