use std::path::Path;

use tracing::{info, warn};
use whisperwall_config::StorageConfig;

use super::error::{ServiceError, ServiceResult};
use super::new_public_id;
use crate::routes::models::MediaFile;

pub const MAX_FILES_PER_UPLOAD: usize = 5;
const MAX_EXTENSION_LENGTH: usize = 10;

const ALLOWED_MEDIA_TYPES: &[&str] = &["image", "video", "audio"];

/// Resolve the mime type from the declared content type, falling back to the file name.
pub fn resolve_mime(original_name: &str, content_type: Option<&str>) -> String {
    content_type
        .map(str::trim)
        .filter(|value| !value.is_empty() && *value != "application/octet-stream")
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_else(|| {
            mime_guess::from_path(original_name)
                .first_or_octet_stream()
                .essence_str()
                .to_string()
        })
}

pub fn is_allowed_mime(mime: &str) -> bool {
    mime.split('/')
        .next()
        .map(|top| ALLOWED_MEDIA_TYPES.contains(&top))
        .unwrap_or(false)
}

fn sanitized_extension(original_name: &str) -> Option<String> {
    Path::new(original_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            ext.chars()
                .filter(char::is_ascii_alphanumeric)
                .collect::<String>()
                .to_ascii_lowercase()
        })
        .filter(|ext| !ext.is_empty() && ext.len() <= MAX_EXTENSION_LENGTH)
}

fn stored_filename(original_name: &str, mime: &str) -> String {
    let extension = sanitized_extension(original_name).or_else(|| {
        mime_guess::get_mime_extensions_str(mime)
            .and_then(|exts| exts.first())
            .map(|ext| ext.to_string())
    });

    match extension {
        Some(ext) => format!("{}.{ext}", new_public_id()),
        None => new_public_id(),
    }
}

/// An upload part that passed validation and has not been written yet.
#[derive(Debug)]
pub struct AcceptedUpload<B> {
    pub original_name: String,
    pub mime: String,
    pub data: B,
}

/// Check size and media type of one part without touching the disk.
pub fn accept_upload<B: AsRef<[u8]>>(
    storage: &StorageConfig,
    original_name: &str,
    content_type: Option<&str>,
    data: B,
) -> ServiceResult<AcceptedUpload<B>> {
    let len = data.as_ref().len();
    if len == 0 {
        return Err(ServiceError::bad_request("Uploaded file is empty"));
    }

    if len as u64 > storage.max_upload_bytes {
        return Err(ServiceError::bad_request(format!(
            "File exceeds the {} byte limit",
            storage.max_upload_bytes
        )));
    }

    let mime = resolve_mime(original_name, content_type);
    if !is_allowed_mime(&mime) {
        return Err(ServiceError::bad_request(
            "Only image, video and audio files are allowed",
        ));
    }

    Ok(AcceptedUpload {
        original_name: original_name.to_string(),
        mime,
        data,
    })
}

/// Write every accepted part under the upload directory. Either all files are
/// stored or none are: a failed write removes the files written before it.
pub async fn store_uploads<B: AsRef<[u8]>>(
    storage: &StorageConfig,
    uploads: &[AcceptedUpload<B>],
) -> ServiceResult<Vec<MediaFile>> {
    tokio::fs::create_dir_all(&storage.upload_dir).await?;

    let public_path = storage.public_path.trim_end_matches('/');
    let mut stored = Vec::with_capacity(uploads.len());

    for upload in uploads {
        let filename = stored_filename(&upload.original_name, &upload.mime);
        let path = Path::new(&storage.upload_dir).join(&filename);
        let bytes = upload.data.as_ref();

        if let Err(error) = tokio::fs::write(&path, bytes).await {
            remove_stored(storage, &stored).await;
            return Err(error.into());
        }

        info!(file = %filename, mime = %upload.mime, size = bytes.len(), "stored uploaded media");

        stored.push(MediaFile {
            url: format!("{public_path}/{filename}"),
            filename,
            original_name: upload.original_name.clone(),
            mimetype: upload.mime.clone(),
            size: bytes.len() as u64,
        });
    }

    Ok(stored)
}

async fn remove_stored(storage: &StorageConfig, files: &[MediaFile]) {
    for file in files {
        let path = Path::new(&storage.upload_dir).join(&file.filename);
        if let Err(error) = tokio::fs::remove_file(&path).await {
            warn!(file = %file.filename, %error, "failed to remove partial upload");
        }
    }
}
