use actix_multipart::Multipart;
use futures_util::StreamExt;
use std::collections::HashMap;

use crate::error::ApiError;

/// One multipart part, file or plain field
#[derive(Debug, Clone)]
pub struct UploadedPart {
    pub filename: Option<String>,
    pub data: Vec<u8>,
}

impl UploadedPart {
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.data).ok().map(str::trim)
    }
}

/// Multipart body buffered in memory, keyed by part name
#[derive(Debug, Default)]
pub struct MultipartForm {
    parts: HashMap<String, UploadedPart>,
}

impl MultipartForm {
    /// Read every part, failing once the total size passes `limit`
    pub async fn read(mut payload: Multipart, limit: usize) -> Result<Self, ApiError> {
        let mut form = Self::default();
        let mut total = 0usize;

        while let Some(field) = payload.next().await {
            let mut field = field?;
            let content_disposition = field.content_disposition();
            let Some(name) = content_disposition.get_name().map(str::to_string) else {
                continue;
            };
            let filename = content_disposition.get_filename().map(str::to_string);

            let mut data = Vec::new();
            while let Some(chunk) = field.next().await {
                let chunk = chunk?;
                total += chunk.len();
                if total > limit {
                    return Err(ApiError::payload_too_large(limit));
                }
                data.extend_from_slice(&chunk);
            }

            form.parts.insert(name, UploadedPart { filename, data });
        }

        Ok(form)
    }

    pub fn get(&self, name: &str) -> Option<&UploadedPart> {
        self.parts.get(name)
    }

    /// Part that must be present and non-empty
    pub fn require(&mut self, name: &str) -> Result<UploadedPart, ApiError> {
        match self.parts.remove(name) {
            Some(part) if !part.data.is_empty() => Ok(part),
            _ => Err(ApiError::bad_request(format!("Missing '{}' upload", name))),
        }
    }
}
