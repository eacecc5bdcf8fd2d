// CRM note logging. After a successful render the service can leave a note
// on the CRM record the request points at. The whole feature is optional:
// without a configured client every call is a no-op.

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::core::catalog::Template;
use crate::core::render::RenderedPdf;

#[derive(Debug, Error)]
pub enum CrmError {
    #[error("CRM API error: {0}")]
    Api(String),
}

/// Which CRM record the note should land on, e.g. `deal` 12345.
#[derive(Debug, Clone, Deserialize)]
pub struct CrmTarget {
    pub resource_type: String,
    pub resource_id: u64,
}

/// The single CRM operation the service needs.
#[async_trait]
pub trait CrmClient: Send + Sync {
    async fn create_note(
        &self,
        resource_type: &str,
        resource_id: u64,
        content: &str,
    ) -> Result<(), CrmError>;
}

pub struct CrmService<C: CrmClient> {
    client: Option<C>,
}

impl<C: CrmClient> CrmService<C> {
    pub fn new(client: Option<C>) -> Self {
        Self { client }
    }

    pub fn is_enabled(&self) -> bool {
        self.client.is_some()
    }

    /// Post a note describing the rendered document. Returns whether a note
    /// was actually written.
    pub async fn log_render(
        &self,
        target: &CrmTarget,
        pdf: &RenderedPdf,
        template: &Template,
        requested_by: Option<&str>,
    ) -> Result<bool, CrmError> {
        let client = match &self.client {
            Some(client) => client,
            None => {
                tracing::debug!("CRM client not configured; skipping note");
                return Ok(false);
            }
        };

        let content = render_note(pdf, template, requested_by);
        client
            .create_note(&target.resource_type, target.resource_id, &content)
            .await?;

        tracing::info!(
            "Logged CRM note on {} {} for '{}'",
            target.resource_type,
            target.resource_id,
            pdf.name
        );
        Ok(true)
    }
}

fn render_note(pdf: &RenderedPdf, template: &Template, requested_by: Option<&str>) -> String {
    let mut note = format!("Generated document: {}", pdf.name);
    if let Some(url) = &pdf.url {
        note.push_str(&format!("\nLink: {}", url));
    }
    note.push_str(&format!(
        "\nTemplate: {} (v{})",
        template.key, template.version
    ));
    if let Some(actor) = requested_by {
        note.push_str(&format!("\nRequested by: {}", actor));
    }
    note
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn make_template() -> Template {
        Template {
            key: "offer".to_string(),
            name: "Offer letter".to_string(),
            engine: "gdoc".to_string(),
            doc_id: "doc-1".to_string(),
            filename_pattern: "offer".to_string(),
            required_placeholders: Vec::new(),
            default_package: None,
            keep_intermediate: false,
            version: "2".to_string(),
            active: true,
            notes: String::new(),
        }
    }

    fn make_pdf(url: Option<&str>) -> RenderedPdf {
        RenderedPdf {
            file_id: "pdf-1".to_string(),
            name: "Offer Ada.pdf".to_string(),
            url: url.map(str::to_string),
        }
    }

    struct FakeCrm {
        notes: Mutex<Vec<(String, u64, String)>>,
    }

    impl FakeCrm {
        fn new() -> Self {
            Self {
                notes: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CrmClient for FakeCrm {
        async fn create_note(
            &self,
            resource_type: &str,
            resource_id: u64,
            content: &str,
        ) -> Result<(), CrmError> {
            self.notes.lock().unwrap().push((
                resource_type.to_string(),
                resource_id,
                content.to_string(),
            ));
            Ok(())
        }
    }

    fn target() -> CrmTarget {
        CrmTarget {
            resource_type: "deal".to_string(),
            resource_id: 42,
        }
    }

    #[tokio::test]
    async fn logs_a_note_when_configured() {
        let service = CrmService::new(Some(FakeCrm::new()));

        let logged = service
            .log_render(
                &target(),
                &make_pdf(Some("https://drive.example/pdf-1")),
                &make_template(),
                Some("ada@example.com"),
            )
            .await
            .unwrap();

        assert!(logged);
        let notes = service.client.as_ref().unwrap().notes.lock().unwrap().clone();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].0, "deal");
        assert_eq!(notes[0].1, 42);
        assert!(notes[0].2.contains("Offer Ada.pdf"));
        assert!(notes[0].2.contains("https://drive.example/pdf-1"));
        assert!(notes[0].2.contains("offer (v2)"));
        assert!(notes[0].2.contains("ada@example.com"));
    }

    #[tokio::test]
    async fn disabled_service_is_a_noop() {
        let service: CrmService<FakeCrm> = CrmService::new(None);

        let logged = service
            .log_render(&target(), &make_pdf(None), &make_template(), None)
            .await
            .unwrap();

        assert!(!logged);
        assert!(!service.is_enabled());
    }

    #[test]
    fn note_omits_absent_fields() {
        let note = render_note(&make_pdf(None), &make_template(), None);

        assert!(note.contains("Generated document: Offer Ada.pdf"));
        assert!(!note.contains("Link:"));
        assert!(!note.contains("Requested by:"));
    }
}
