// Zendesk Sell REST client. It deliberately exposes only the call the core
// layer needs: creating a note on a resource.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use crate::core::crm::{CrmClient, CrmError};

pub const DEFAULT_BASE_URL: &str = "https://api.getbase.com";

pub struct ZendeskSellClient {
    client: Client,
    base_url: String,
    api_token: String,
}

impl ZendeskSellClient {
    pub fn new(base_url: String, api_token: String) -> Self {
        Self {
            client: Client::new(),
            base_url,
            api_token,
        }
    }
}

/// Request body for `POST /v2/notes`.
fn note_body(resource_type: &str, resource_id: u64, content: &str) -> serde_json::Value {
    json!({
        "data": {
            "resource_type": resource_type,
            "resource_id": resource_id,
            "content": content,
        }
    })
}

#[async_trait]
impl CrmClient for ZendeskSellClient {
    async fn create_note(
        &self,
        resource_type: &str,
        resource_id: u64,
        content: &str,
    ) -> Result<(), CrmError> {
        let url = format!("{}/v2/notes", self.base_url);

        tracing::debug!("Posting CRM note to {} {}", resource_type, resource_id);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_token))
            .json(&note_body(resource_type, resource_id, content))
            .send()
            .await
            .map_err(|err| CrmError::Api(err.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CrmError::Api(format!(
                "Zendesk Sell returned {}: {}",
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
    fn note_body_wraps_fields_in_data() {
        let body = note_body("deal", 42, "Generated document: x.pdf");

        assert_eq!(body["data"]["resource_type"], "deal");
        assert_eq!(body["data"]["resource_id"], 42);
        assert_eq!(body["data"]["content"], "Generated document: x.pdf");
    }
}
