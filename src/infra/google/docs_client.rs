// Google Docs client. The render pipeline needs exactly one mutation:
// replacing placeholder tokens across a document in a single batchUpdate.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use crate::core::render::{DocsClient, RenderError};

use super::auth::ServiceAccountAuth;

#[derive(Clone)]
pub struct DocsApiClient {
    client: Client,
    auth: Arc<ServiceAccountAuth>,
    base_url: String,
}

impl DocsApiClient {
    pub fn new(auth: Arc<ServiceAccountAuth>) -> Self {
        Self {
            client: Client::new(),
            auth,
            base_url: "https://docs.googleapis.com/v1".to_string(),
        }
    }
}

/// Build the `replaceAllText` requests for one batchUpdate call. Token
/// matching is case-sensitive on the full `{{path}}` form.
fn replace_requests(replacements: &[(String, String)]) -> Vec<serde_json::Value> {
    replacements
        .iter()
        .map(|(path, value)| {
            json!({
                "replaceAllText": {
                    "containsText": {
                        "text": format!("{{{{{}}}}}", path),
                        "matchCase": true
                    },
                    "replaceText": value
                }
            })
        })
        .collect()
}

#[async_trait]
impl DocsClient for DocsApiClient {
    async fn replace_text(
        &self,
        document_id: &str,
        replacements: &[(String, String)],
    ) -> Result<(), RenderError> {
        if replacements.is_empty() {
            return Ok(());
        }

        let token = self
            .auth
            .get_access_token()
            .await
            .map_err(|err| RenderError::Docs(err.to_string()))?;

        let url = format!("{}/documents/{}:batchUpdate", self.base_url, document_id);

        tracing::debug!(
            "Replacing {} placeholder token(s) in document {}",
            replacements.len(),
            document_id
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", token))
            .json(&json!({ "requests": replace_requests(replacements) }))
            .send()
            .await
            .map_err(|err| RenderError::Docs(err.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RenderError::Docs(format!(
                "Docs API returned {}: {}",
                status, body
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_wrap_paths_in_double_braces() {
        let requests = replace_requests(&[("customer.name".to_string(), "Ada".to_string())]);

        assert_eq!(requests.len(), 1);
        let contains = &requests[0]["replaceAllText"]["containsText"];
        assert_eq!(contains["text"], "{{customer.name}}");
        assert_eq!(contains["matchCase"], true);
        assert_eq!(requests[0]["replaceAllText"]["replaceText"], "Ada");
    }
}
