use crate::{
    AppState,
    api::models::files::UploadResponse,
    auth::session::Session,
    errors::{Error, Result},
    uploads::{self, UploadedFile, extensions::AllowedExtensions},
};
use axum::{
    Json,
    extract::{
        Multipart, State,
        multipart::{MultipartError, MultipartRejection},
    },
    http::{HeaderMap, StatusCode, header::CONTENT_LENGTH},
};
use bytes::BytesMut;
use tracing::{debug, instrument};

/// Name of the multipart part carrying the upload
const FILE_FIELD: &str = "file";

fn multipart_error(e: MultipartError, max_file_size: u64) -> Error {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        too_large(max_file_size)
    } else {
        Error::BadRequest {
            message: format!("Failed to parse multipart data: {}", e.body_text()),
        }
    }
}

fn too_large(max_file_size: u64) -> Error {
    Error::PayloadTooLarge {
        message: format!(
            "File size exceeds maximum allowed size of {} bytes ({} MB)",
            max_file_size,
            max_file_size / (1024 * 1024)
        ),
    }
}

/// Read the first `file` part, skipping any others
async fn read_file_part(multipart: &mut Multipart, max_file_size: u64) -> Result<Option<UploadedFile>> {
    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, max_file_size))?
    {
        if field.name() != Some(FILE_FIELD) {
            debug!(field = ?field.name(), "Skipping multipart field");
            continue;
        }

        let filename = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);

        let mut content = BytesMut::new();
        while let Some(chunk) = field.chunk().await.map_err(|e| multipart_error(e, max_file_size))? {
            if (content.len() + chunk.len()) as u64 > max_file_size {
                return Err(too_large(max_file_size));
            }
            content.extend_from_slice(&chunk);
        }

        return Ok(Some(UploadedFile {
            filename,
            content_type,
            content: content.freeze(),
        }));
    }

    Ok(None)
}

#[utoipa::path(
    post,
    path = "/api/upload",
    tag = "files",
    summary = "Upload file",
    description = "Store a file in public blob storage and register it with the LLM provider for the \
                   retrieval and code interpreter tools. Send it as the `file` part of a multipart body.",
    request_body(
        content_type = "multipart/form-data",
        description = "A single `file` part"
    ),
    responses(
        (status = 201, description = "File ingested", body = UploadResponse),
        (status = 400, description = "No file, missing filename, disallowed extension, no request body, or no provider API key"),
        (status = 402, description = "File quota of the current plan reached"),
        (status = 403, description = "No valid session"),
        (status = 413, description = "Payload too large"),
        (status = 500, description = "Internal server error")
    )
)]
#[instrument(skip_all, fields(user_id = %session.user_id))]
pub async fn upload_file(
    State(state): State<AppState>,
    session: Session,
    headers: HeaderMap,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<UploadResponse>)> {
    let plan = uploads::check_quota(&state, &session).await?;

    // Chunked requests carry no length but do have a body
    let request_has_body = headers
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .is_none_or(|length| length.trim() != "0");

    // A body that is not multipart at all carries no file
    let file = match multipart {
        Ok(mut multipart) => read_file_part(&mut multipart, state.config.uploads.max_file_size).await?,
        Err(rejection) => {
            debug!("Upload body is not multipart: {}", rejection);
            None
        }
    };

    let allowed = AllowedExtensions::from_config(&state.config.uploads);
    let file = uploads::validate_file(&allowed, file, request_has_body)?;
    let api_key = uploads::require_api_key(&state, &session).await?;

    let stored = uploads::ingest(&state, &session, &plan, file, &api_key).await?;

    Ok((StatusCode::CREATED, Json(UploadResponse { url: stored.blob_url })))
}
