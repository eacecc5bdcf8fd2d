// The render pipeline: copy the template Doc, substitute placeholders,
// export to PDF, upload, clean up. Google is only reachable through the two
// client traits so the whole sequence is testable with fakes.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use thiserror::Error;

use crate::core::catalog::Template;

use super::filename::build_filename;
use super::placeholders::{flatten_scalars, missing_placeholders};

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Missing required placeholders: {}", .0.join(", "))]
    MissingPlaceholders(Vec<String>),

    #[error("Docs API error: {0}")]
    Docs(String),

    #[error("Drive API error: {0}")]
    Drive(String),

    #[error("Copied document {0} never became visible")]
    CopyNotVisible(String),
}

// ============================================================================
// CLIENT TRAITS (PORTS)
// ============================================================================

/// The single Docs mutation the pipeline needs: replace every `{{path}}`
/// token with its value, matching case.
#[async_trait]
pub trait DocsClient: Send + Sync {
    async fn replace_text(
        &self,
        document_id: &str,
        replacements: &[(String, String)],
    ) -> Result<(), RenderError>;
}

/// A file handle as Drive reports it after an upload.
#[derive(Debug, Clone)]
pub struct DriveFile {
    pub id: String,
    pub name: String,
    pub web_view_link: Option<String>,
}

/// Drive operations used by the pipeline.
#[async_trait]
pub trait DriveClient: Send + Sync {
    async fn copy_file(&self, file_id: &str, name: &str) -> Result<String, RenderError>;
    async fn file_exists(&self, file_id: &str) -> Result<bool, RenderError>;
    async fn export_pdf(&self, file_id: &str) -> Result<Vec<u8>, RenderError>;
    async fn upload_pdf(
        &self,
        folder_id: &str,
        name: &str,
        bytes: Vec<u8>,
    ) -> Result<DriveFile, RenderError>;
    async fn delete_file(&self, file_id: &str) -> Result<(), RenderError>;
}

// ============================================================================
// RESULT MODEL
// ============================================================================

/// What a successful render hands back. Transient: nothing beyond the
/// uploaded Drive file is persisted.
#[derive(Debug, Clone)]
pub struct RenderedPdf {
    pub file_id: String,
    pub name: String,
    pub url: Option<String>,
}

// ============================================================================
// SERVICE
// ============================================================================

/// Backoff bounds for the copy-visibility poll. Drive copies are eventually
/// consistent; a freshly copied file can 404 for a moment.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub poll_attempts: u32,
    pub poll_base_delay: Duration,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            poll_attempts: 5,
            poll_base_delay: Duration::from_millis(200),
        }
    }
}

pub struct RenderService<D: DocsClient, R: DriveClient> {
    docs: D,
    drive: R,
    default_folder_id: String,
    options: RenderOptions,
}

impl<D, R> RenderService<D, R>
where
    D: DocsClient,
    R: DriveClient,
{
    pub fn new(docs: D, drive: R, default_folder_id: String) -> Self {
        Self::with_options(docs, drive, default_folder_id, RenderOptions::default())
    }

    pub fn with_options(
        docs: D,
        drive: R,
        default_folder_id: String,
        options: RenderOptions,
    ) -> Self {
        Self {
            docs,
            drive,
            default_folder_id,
            options,
        }
    }

    /// Run the full pipeline for one validated request.
    pub async fn render(
        &self,
        template: &Template,
        payload: &Value,
        folder_id: Option<&str>,
    ) -> Result<RenderedPdf, RenderError> {
        let missing = missing_placeholders(payload, &template.required_placeholders);
        if !missing.is_empty() {
            return Err(RenderError::MissingPlaceholders(missing));
        }

        let copy_name = format!(
            "{} [render {}]",
            template.name,
            Utc::now().format("%Y%m%d%H%M%S")
        );
        let copy_id = self.drive.copy_file(&template.doc_id, &copy_name).await?;
        tracing::debug!("Copied template {} to {}", template.doc_id, copy_id);

        match self
            .mutate_and_upload(template, payload, folder_id, &copy_id)
            .await
        {
            Ok(file) => {
                if template.keep_intermediate {
                    tracing::debug!("Keeping intermediate copy {}", copy_id);
                } else {
                    self.discard_copy(&copy_id).await;
                }

                tracing::info!(
                    "Rendered '{}' from template '{}' as Drive file {}",
                    file.name,
                    template.key,
                    file.id
                );

                Ok(RenderedPdf {
                    file_id: file.id,
                    name: file.name,
                    url: file.web_view_link,
                })
            }
            Err(err) => {
                // Don't leak half-rendered copies when the pipeline dies
                // midway.
                self.discard_copy(&copy_id).await;
                Err(err)
            }
        }
    }

    async fn mutate_and_upload(
        &self,
        template: &Template,
        payload: &Value,
        folder_id: Option<&str>,
        copy_id: &str,
    ) -> Result<DriveFile, RenderError> {
        self.await_copy(copy_id).await?;

        let replacements = flatten_scalars(payload);
        self.docs.replace_text(copy_id, &replacements).await?;

        let bytes = self.drive.export_pdf(copy_id).await?;

        let name = build_filename(&template.filename_pattern, payload, Utc::now());
        let folder = folder_id.unwrap_or(&self.default_folder_id);
        self.drive.upload_pdf(folder, &name, bytes).await
    }

    /// Wait for the copy to become visible, doubling the delay between
    /// bounded attempts.
    async fn await_copy(&self, file_id: &str) -> Result<(), RenderError> {
        let mut delay = self.options.poll_base_delay;

        for attempt in 1..=self.options.poll_attempts {
            if self.drive.file_exists(file_id).await? {
                return Ok(());
            }

            tracing::debug!(
                "Copy {} not visible yet (attempt {}/{})",
                file_id,
                attempt,
                self.options.poll_attempts
            );
            tokio::time::sleep(delay).await;
            delay = delay.saturating_mul(2);
        }

        Err(RenderError::CopyNotVisible(file_id.to_string()))
    }

    /// Best-effort delete; a failure here must not mask the render outcome.
    async fn discard_copy(&self, file_id: &str) {
        if let Err(err) = self.drive.delete_file(file_id).await {
            tracing::warn!("Failed to delete intermediate copy {}: {}", file_id, err);
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
