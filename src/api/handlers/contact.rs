//! Support contact form.

use axum::{
    extract::{
        multipart::{Field, MultipartError, MultipartRejection},
        Extension, Multipart,
    },
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use utoipa::ToSchema;

use super::MessageResponse;
use crate::api::{
    email::Attachment,
    error::AppError,
    support::{SupportDesk, SupportRequest},
};

/// Multipart fields accepted by `/support/message`.
#[derive(Debug, ToSchema)]
pub struct SupportForm {
    pub email: String,
    pub message: String,
    #[schema(value_type = Option<String>, format = Binary)]
    pub attachment: Option<Vec<u8>>,
}

impl From<MultipartRejection> for AppError {
    fn from(rejection: MultipartRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        Self::Validation(err.body_text())
    }
}

async fn attachment(field: Field<'_>) -> Result<Option<Attachment>, AppError> {
    let filename = field.file_name().unwrap_or("attachment").to_string();
    let content_type = field
        .content_type()
        .unwrap_or("application/octet-stream")
        .to_string();
    let content = field.bytes().await?;
    // Browsers send an empty part when no file was picked.
    if content.is_empty() {
        return Ok(None);
    }
    Ok(Some(Attachment {
        filename,
        content_type,
        content: content.to_vec(),
    }))
}

#[utoipa::path(
    post,
    path = "/support/message",
    request_body(content = SupportForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Support request queued", body = MessageResponse),
        (status = 400, description = "Missing sender or message, or attachment too large")
    ),
    tag = "support"
)]
pub async fn send_message(
    support: Extension<Arc<SupportDesk>>,
    form: Result<Multipart, MultipartRejection>,
) -> Result<impl IntoResponse, AppError> {
    let mut form = form?;
    let mut request = SupportRequest::default();
    while let Some(field) = form.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("email") => request.email = field.text().await?,
            Some("message") => request.message = field.text().await?,
            Some("attachment") => request.attachment = attachment(field).await?,
            _ => {}
        }
    }
    support.submit(request)?;
    Ok(Json(MessageResponse::new("Support message sent")))
}
