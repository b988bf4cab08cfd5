//! Upload storage under the media directory.
//!
//! Uploads are written to `<upload_dir>/<subdir>/<uuid>.<ext>` and referenced
//! from the database by the relative path `<subdir>/<uuid>.<ext>`.

use crate::error::ServiceError;
use anyhow::Result;
use std::path::{Component, Path, PathBuf};
use uuid::Uuid;

pub const COURSE_IMAGES: &str = "courses";

/// A file received from a multipart form.
#[derive(Debug, Clone)]
pub struct Upload {
    pub field: String,
    pub file_name: String,
    pub data: Vec<u8>,
}

fn check_size(upload: &Upload, max_bytes: usize) -> Result<()> {
    if upload.data.is_empty() {
        return Err(ServiceError::invalid(&upload.field, "The submitted file is empty").into());
    }
    if upload.data.len() > max_bytes {
        return Err(ServiceError::invalid(
            &upload.field,
            format!(
                "File too large: {} bytes (max {} bytes)",
                upload.data.len(),
                max_bytes
            ),
        )
        .into());
    }
    Ok(())
}

/// Content sniffing: the bytes must look like an image, whatever the name says.
pub fn ensure_image(upload: &Upload) -> Result<()> {
    let is_image = infer::get(&upload.data)
        .map(|t| t.matcher_type() == infer::MatcherType::Image)
        .unwrap_or(false);
    if !is_image {
        return Err(ServiceError::invalid(
            &upload.field,
            "Upload a valid image. The file you uploaded was either not an image or a corrupted image",
        )
        .into());
    }
    Ok(())
}

/// Writes an upload below `subdir` and returns its relative media path.
pub fn store_upload(
    upload_dir: &Path,
    subdir: &str,
    upload: &Upload,
    max_bytes: usize,
) -> Result<String> {
    check_size(upload, max_bytes)?;

    let extension = Path::new(&upload.file_name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    let filename = if extension.is_empty() {
        Uuid::new_v4().to_string()
    } else {
        format!("{}.{}", Uuid::new_v4(), extension)
    };

    let dir = upload_dir.join(subdir);
    std::fs::create_dir_all(&dir)?;
    std::fs::write(dir.join(&filename), &upload.data)?;

    Ok(format!("{}/{}", subdir, filename))
}

pub fn store_image(
    upload_dir: &Path,
    subdir: &str,
    upload: &Upload,
    max_bytes: usize,
) -> Result<String> {
    check_size(upload, max_bytes)?;
    ensure_image(upload)?;
    store_upload(upload_dir, subdir, upload, max_bytes)
}

/// Resolves a relative media path, refusing anything that escapes the media root.
pub fn resolve(upload_dir: &Path, relative: &str) -> Option<PathBuf> {
    let relative = Path::new(relative);
    let safe = relative
        .components()
        .all(|c| matches!(c, Component::Normal(_)));
    if !safe || relative.as_os_str().is_empty() {
        return None;
    }
    Some(upload_dir.join(relative))
}

/// Removes a stored upload. Missing files are not an error.
pub fn remove_upload(upload_dir: &Path, relative: &str) {
    let Some(path) = resolve(upload_dir, relative) else {
        tracing::warn!("Refusing to remove media outside the upload dir: {}", relative);
        return;
    };
    match std::fs::remove_file(&path) {
        Ok(()) => tracing::debug!("Removed media file {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Failed to remove media file {}: {}", path.display(), e),
    }
}
