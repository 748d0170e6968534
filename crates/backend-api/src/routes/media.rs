use axum::{
    extract::{multipart::MultipartError, Multipart, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    extract::AuthUser,
    routes::models::MediaFile,
    services::media::{self as media_service, MAX_FILES_PER_UPLOAD},
    ApiError, AppState,
};

/// Multipart body of an upload request, used for the OpenAPI document.
#[derive(Debug, ToSchema)]
pub struct MediaUploadForm {
    #[schema(value_type = Vec<String>, format = Binary)]
    pub files: Vec<Vec<u8>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MediaUploadResponse {
    pub success: bool,
    pub files: Vec<MediaFile>,
}

fn multipart_error(error: MultipartError) -> ApiError {
    ApiError::new(error.status(), error.body_text())
}

#[utoipa::path(
    post,
    path = "/api/media",
    tag = "Media",
    request_body(content = MediaUploadForm, content_type = "multipart/form-data", description = "Up to five `files` parts"),
    responses(
        (status = 201, description = "Files stored", body = MediaUploadResponse),
        (status = 400, description = "Invalid upload", body = crate::error::ErrorResponse),
        (status = 413, description = "Upload too large", body = crate::error::ErrorResponse)
    ),
    security(("bearerAuth" = []))
)]
pub async fn upload_media(
    State(state): State<AppState>,
    AuthUser { user, .. }: AuthUser,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<MediaUploadResponse>), ApiError> {
    let storage = &state.config().storage;
    let mut accepted = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let Some(original_name) = field.file_name().map(str::to_owned) else {
            continue;
        };

        if accepted.len() == MAX_FILES_PER_UPLOAD {
            return Err(ApiError::bad_request(format!(
                "At most {MAX_FILES_PER_UPLOAD} files can be uploaded at once"
            )));
        }

        let content_type = field.content_type().map(str::to_owned);
        let data = field.bytes().await.map_err(multipart_error)?;

        accepted.push(media_service::accept_upload(
            storage,
            &original_name,
            content_type.as_deref(),
            data,
        )?);
    }

    if accepted.is_empty() {
        return Err(ApiError::bad_request("No files uploaded"));
    }

    let files = media_service::store_uploads(storage, &accepted).await?;

    tracing::info!(uploader = %user.anonymous_id, count = files.len(), "media uploaded");

    Ok((
        StatusCode::CREATED,
        Json(MediaUploadResponse {
            success: true,
            files,
        }),
    ))
}
