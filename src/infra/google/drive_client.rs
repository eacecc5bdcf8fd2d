// Google Drive client: copy/export/upload/delete for the render pipeline,
// plus find-or-create for destination folders.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;

use crate::core::render::{DriveClient, DriveFile, RenderError};

use super::auth::ServiceAccountAuth;

const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";
const PDF_MIME_TYPE: &str = "application/pdf";

// Fixed boundary for multipart/related uploads. Google only requires that it
// doesn't collide with the payload; PDF bytes can't contain this marker
// sequence followed by our suffix in the positions that matter.
const UPLOAD_BOUNDARY: &str = "docpress-upload-boundary";

#[derive(Clone)]
pub struct DriveApiClient {
    client: Client,
    auth: Arc<ServiceAccountAuth>,
    base_url: String,
    upload_url: String,
}

impl DriveApiClient {
    pub fn new(auth: Arc<ServiceAccountAuth>) -> Self {
        Self {
            client: Client::new(),
            auth,
            base_url: "https://www.googleapis.com/drive/v3".to_string(),
            upload_url: "https://www.googleapis.com/upload/drive/v3".to_string(),
        }
    }

    async fn token(&self) -> Result<String, RenderError> {
        self.auth
            .get_access_token()
            .await
            .map_err(|err| RenderError::Drive(err.to_string()))
    }

    /// Find a folder by name (optionally under a parent) or create it.
    /// Returns the folder id and whether it was created by this call.
    pub async fn ensure_folder(
        &self,
        name: &str,
        parent_id: Option<&str>,
    ) -> Result<(String, bool), RenderError> {
        let token = self.token().await?;

        let mut query = format!(
            "name = '{}' and mimeType = '{}' and trashed = false",
            escape_query_value(name),
            FOLDER_MIME_TYPE
        );
        if let Some(parent) = parent_id {
            query.push_str(&format!(" and '{}' in parents", escape_query_value(parent)));
        }

        let response = self
            .client
            .get(format!("{}/files", self.base_url))
            .header("Authorization", format!("Bearer {}", token))
            .query(&[
                ("q", query.as_str()),
                ("fields", "files(id,name)"),
                ("supportsAllDrives", "true"),
                ("includeItemsFromAllDrives", "true"),
            ])
            .send()
            .await
            .map_err(|err| RenderError::Drive(err.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RenderError::Drive(format!(
                "Drive folder search returned {}: {}",
                status, body
            )));
        }

        let listing: FileList = response
            .json()
            .await
            .map_err(|err| RenderError::Drive(err.to_string()))?;

        if let Some(existing) = listing.files.into_iter().next() {
            tracing::debug!("Found existing folder '{}' ({})", name, existing.id);
            return Ok((existing.id, false));
        }

        let mut metadata = json!({
            "name": name,
            "mimeType": FOLDER_MIME_TYPE,
        });
        if let Some(parent) = parent_id {
            metadata["parents"] = json!([parent]);
        }

        let response = self
            .client
            .post(format!("{}/files", self.base_url))
            .header("Authorization", format!("Bearer {}", token))
            .query(&[("supportsAllDrives", "true"), ("fields", "id")])
            .json(&metadata)
            .send()
            .await
            .map_err(|err| RenderError::Drive(err.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RenderError::Drive(format!(
                "Drive folder create returned {}: {}",
                status, body
            )));
        }

        let created: FileResource = response
            .json()
            .await
            .map_err(|err| RenderError::Drive(err.to_string()))?;

        tracing::info!("Created Drive folder '{}' ({})", name, created.id);
        Ok((created.id, true))
    }
}

#[async_trait]
impl DriveClient for DriveApiClient {
    async fn copy_file(&self, file_id: &str, name: &str) -> Result<String, RenderError> {
        let token = self.token().await?;

        let response = self
            .client
            .post(format!("{}/files/{}/copy", self.base_url, file_id))
            .header("Authorization", format!("Bearer {}", token))
            .query(&[("supportsAllDrives", "true"), ("fields", "id")])
            .json(&json!({ "name": name }))
            .send()
            .await
            .map_err(|err| RenderError::Drive(err.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RenderError::Drive(format!(
                "Drive copy returned {}: {}",
                status, body
            )));
        }

        let copied: FileResource = response
            .json()
            .await
            .map_err(|err| RenderError::Drive(err.to_string()))?;

        Ok(copied.id)
    }

    async fn file_exists(&self, file_id: &str) -> Result<bool, RenderError> {
        let token = self.token().await?;

        let response = self
            .client
            .get(format!("{}/files/{}", self.base_url, file_id))
            .header("Authorization", format!("Bearer {}", token))
            .query(&[("supportsAllDrives", "true"), ("fields", "id")])
            .send()
            .await
            .map_err(|err| RenderError::Drive(err.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RenderError::Drive(format!(
                "Drive get returned {}: {}",
                status, body
            )));
        }

        Ok(true)
    }

    async fn export_pdf(&self, file_id: &str) -> Result<Vec<u8>, RenderError> {
        let token = self.token().await?;

        let response = self
            .client
            .get(format!("{}/files/{}/export", self.base_url, file_id))
            .header("Authorization", format!("Bearer {}", token))
            .query(&[("mimeType", PDF_MIME_TYPE)])
            .send()
            .await
            .map_err(|err| RenderError::Drive(err.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RenderError::Drive(format!(
                "Drive export returned {}: {}",
                status, body
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|err| RenderError::Drive(err.to_string()))?;

        Ok(bytes.to_vec())
    }

    async fn upload_pdf(
        &self,
        folder_id: &str,
        name: &str,
        bytes: Vec<u8>,
    ) -> Result<DriveFile, RenderError> {
        let token = self.token().await?;

        let metadata = json!({
            "name": name,
            "mimeType": PDF_MIME_TYPE,
            "parents": [folder_id],
        });
        let body = multipart_related_body(&metadata, &bytes);

        tracing::debug!("Uploading {} byte(s) as '{}'", bytes.len(), name);

        let response = self
            .client
            .post(format!("{}/files", self.upload_url))
            .header("Authorization", format!("Bearer {}", token))
            .header(
                "Content-Type",
                format!("multipart/related; boundary={}", UPLOAD_BOUNDARY),
            )
            .query(&[
                ("uploadType", "multipart"),
                ("supportsAllDrives", "true"),
                ("fields", "id,name,webViewLink"),
            ])
            .body(body)
            .send()
            .await
            .map_err(|err| RenderError::Drive(err.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RenderError::Drive(format!(
                "Drive upload returned {}: {}",
                status, body
            )));
        }

        let uploaded: UploadedResource = response
            .json()
            .await
            .map_err(|err| RenderError::Drive(err.to_string()))?;

        Ok(DriveFile {
            id: uploaded.id,
            name: uploaded.name.unwrap_or_else(|| name.to_string()),
            web_view_link: uploaded.web_view_link,
        })
    }

    async fn delete_file(&self, file_id: &str) -> Result<(), RenderError> {
        let token = self.token().await?;

        let response = self
            .client
            .delete(format!("{}/files/{}", self.base_url, file_id))
            .header("Authorization", format!("Bearer {}", token))
            .query(&[("supportsAllDrives", "true")])
            .send()
            .await
            .map_err(|err| RenderError::Drive(err.to_string()))?;

        // Deleting an already-gone file is fine.
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RenderError::Drive(format!(
                "Drive delete returned {}: {}",
                status, body
            )));
        }

        Ok(())
    }
}

/// Drive search queries quote values with single quotes; escape backslashes
/// and quotes inside the value.
fn escape_query_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Assemble the two-part `multipart/related` body Drive expects for a
/// metadata + media upload.
fn multipart_related_body(metadata: &serde_json::Value, bytes: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(bytes.len() + 512);

    body.extend_from_slice(
        format!(
            "--{}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{}\r\n",
            UPLOAD_BOUNDARY, metadata
        )
        .as_bytes(),
    );
    body.extend_from_slice(
        format!("--{}\r\nContent-Type: {}\r\n\r\n", UPLOAD_BOUNDARY, PDF_MIME_TYPE).as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{}--\r\n", UPLOAD_BOUNDARY).as_bytes());

    body
}

#[derive(Debug, Deserialize)]
struct FileResource {
    id: String,
}

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<FileResource>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadedResource {
    id: String,
    name: Option<String>,
    web_view_link: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_values_are_escaped() {
        assert_eq!(escape_query_value("plain"), "plain");
        assert_eq!(escape_query_value("O'Brien"), "O\\'Brien");
        assert_eq!(escape_query_value("a\\b"), "a\\\\b");
    }

    #[test]
    fn multipart_body_frames_metadata_and_media() {
        let metadata = json!({"name": "x.pdf"});
        let body = multipart_related_body(&metadata, b"%PDF");
        let text = String::from_utf8_lossy(&body);

        assert!(text.starts_with(&format!("--{}\r\n", UPLOAD_BOUNDARY)));
        assert!(text.contains("Content-Type: application/json; charset=UTF-8"));
        assert!(text.contains(r#"{"name":"x.pdf"}"#));
        assert!(text.contains("Content-Type: application/pdf\r\n\r\n%PDF"));
        assert!(text.ends_with(&format!("\r\n--{}--\r\n", UPLOAD_BOUNDARY)));
    }

    #[test]
    fn uploaded_resource_tolerates_missing_link() {
        let parsed: UploadedResource = serde_json::from_str(r#"{"id": "f1"}"#).unwrap();
        assert_eq!(parsed.id, "f1");
        assert!(parsed.web_view_link.is_none());
    }
}
