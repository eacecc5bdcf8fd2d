// Google Sheets client. It deliberately exposes only the one call the
// catalog needs: reading an A1 range as a grid of cells.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::core::catalog::{CatalogError, SheetRangeSource};

use super::auth::ServiceAccountAuth;

#[derive(Clone)]
pub struct SheetsApiClient {
    client: Client,
    auth: Arc<ServiceAccountAuth>,
    base_url: String,
}

impl SheetsApiClient {
    pub fn new(auth: Arc<ServiceAccountAuth>) -> Self {
        Self {
            client: Client::new(),
            auth,
            base_url: "https://sheets.googleapis.com/v4".to_string(),
        }
    }
}

#[async_trait]
impl SheetRangeSource for SheetsApiClient {
    async fn read_range(
        &self,
        spreadsheet_id: &str,
        range: &str,
    ) -> Result<Vec<Vec<String>>, CatalogError> {
        let token = self
            .auth
            .get_access_token()
            .await
            .map_err(|err| CatalogError::Sheets(err.to_string()))?;

        let url = format!(
            "{}/spreadsheets/{}/values/{}",
            self.base_url, spreadsheet_id, range
        );

        tracing::debug!("Fetching sheet range {} from {}", range, spreadsheet_id);

        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", token))
            .send()
            .await
            .map_err(|err| CatalogError::Sheets(err.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CatalogError::Sheets(format!(
                "Sheets API returned {}: {}",
                status, body
            )));
        }

        let value_range: ValueRange = response
            .json()
            .await
            .map_err(|err| CatalogError::Sheets(err.to_string()))?;

        Ok(value_range
            .values
            .into_iter()
            .map(|row| row.iter().map(cell_to_string).collect())
            .collect())
    }
}

/// Sheets hands numbers and booleans back as JSON values; the catalog parser
/// wants plain text for every cell.
fn cell_to_string(cell: &serde_json::Value) -> String {
    match cell {
        serde_json::Value::String(text) => text.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn cells_render_as_plain_text() {
        assert_eq!(cell_to_string(&json!("text")), "text");
        assert_eq!(cell_to_string(&json!(12)), "12");
        assert_eq!(cell_to_string(&json!(true)), "true");
        assert_eq!(cell_to_string(&json!(null)), "");
    }

    #[test]
    fn empty_range_deserializes_without_values() {
        let value_range: ValueRange = serde_json::from_str(r#"{"range": "A1:Z"}"#).unwrap();
        assert!(value_range.values.is_empty());
    }
}
