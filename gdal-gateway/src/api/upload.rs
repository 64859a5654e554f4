//! Multipart upload intake.

use std::collections::HashMap;

use axum::extract::Multipart;

use crate::api::error::{ApiError, ApiResult};
use crate::pipeline::Upload;

/// Name of the multipart field carrying the file.
const FILE_FIELD: &str = "file";

/// A parsed upload form: the file plus any text fields.
#[derive(Debug)]
pub(crate) struct UploadForm {
    pub upload: Upload,
    fields: HashMap<String, String>,
}

impl UploadForm {
    /// A text field, trimmed; empty values count as absent.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// Advisory file name, or a placeholder when the client sent none.
    pub fn file_name(&self) -> String {
        self.upload
            .name
            .clone()
            .unwrap_or_else(|| "upload".to_string())
    }
}

/// Drain a multipart body. Fails before any job exists when the stream is
/// unreadable or carries no non-empty `file` part.
pub(crate) async fn read_upload_form(mut multipart: Multipart) -> ApiResult<UploadForm> {
    let mut upload = None;
    let mut fields = HashMap::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Malformed multipart body: {}", e)))?
    {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        if name == FILE_FIELD {
            let file_name = field.file_name().map(str::to_string);
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::bad_request(format!("Failed to read upload: {}", e)))?;
            upload = Some(Upload::new(file_name, bytes));
        } else {
            let value = field.text().await.map_err(|e| {
                ApiError::bad_request(format!("Failed to read field '{}': {}", name, e))
            })?;
            fields.insert(name, value);
        }
    }

    let upload = upload.ok_or_else(|| ApiError::bad_request("Missing 'file' field"))?;
    if upload.bytes.is_empty() {
        return Err(ApiError::bad_request("Uploaded file is empty"));
    }

    Ok(UploadForm { upload, fields })
}
