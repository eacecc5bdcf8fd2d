// This is the entry point of the document rendering service.
//
// **Architecture Overview:**
// - `core/` = Business logic (catalog, render pipeline, CRM notes)
// - `infra/` = Implementations of core traits (Google APIs, Zendesk Sell)
// - `http/` = HTTP adapters (routes, status mapping, API key gate)
//
// This file's job is to:
// 1. Load configuration from the environment
// 2. Initialize services (dependency injection)
// 3. Wire the router and start serving

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with a pile of mod.rs files that all look the same.
#[path = "core/core_layer.rs"]
mod core;
#[path = "http/http_layer.rs"]
mod http;
#[path = "infra/infra_layer.rs"]
mod infra;

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use crate::core::catalog::{CatalogConfig, CatalogService};
use crate::core::crm::CrmService;
use crate::core::render::RenderService;
use crate::http::AppState;
use crate::infra::crm::{ZendeskSellClient, DEFAULT_BASE_URL};
use crate::infra::google::{
    DocsApiClient, DriveApiClient, ServiceAccountAuth, SheetsApiClient, DOCUMENTS_SCOPE,
    DRIVE_SCOPE, SHEETS_READONLY_SCOPE,
};

#[tokio::main]
async fn main() {
    // Initialize logging so we can see what's happening
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("docpress=info,tower_http=info")),
        )
        .init();

    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    // ========================================================================
    // DEPENDENCY INJECTION
    // ========================================================================
    // Create our services with their dependencies.
    // This is the "composition root" where we wire everything together.

    // One authenticator is shared by every Google client.
    let auth = Arc::new(
        ServiceAccountAuth::from_env(&[SHEETS_READONLY_SCOPE, DOCUMENTS_SCOPE, DRIVE_SCOPE])
            .await
            .expect("Failed to load Google service account credentials"),
    );

    // Catalog: template/package configuration out of a Google Sheet.
    let spreadsheet_id = std::env::var("CONFIG_SPREADSHEET_ID")
        .expect("Missing CONFIG_SPREADSHEET_ID environment variable!");
    let mut catalog_config = CatalogConfig::new(spreadsheet_id);
    if let Ok(range) = std::env::var("CONFIG_TEMPLATES_RANGE") {
        catalog_config.templates_range = range;
    }
    if let Ok(range) = std::env::var("CONFIG_PACKAGES_RANGE") {
        catalog_config.packages_range = range;
    }
    if let Ok(seconds) = std::env::var("CONFIG_CACHE_TTL_SECONDS") {
        if let Ok(seconds) = seconds.parse::<u64>() {
            catalog_config.cache_ttl = Duration::from_secs(seconds);
        }
    }
    let sheets = SheetsApiClient::new(Arc::clone(&auth));
    let catalog = Arc::new(CatalogService::new(sheets, catalog_config));

    // Render pipeline: Docs for token replacement, Drive for everything else.
    let output_folder_id = std::env::var("DRIVE_OUTPUT_FOLDER_ID")
        .expect("Missing DRIVE_OUTPUT_FOLDER_ID environment variable!");
    let docs = DocsApiClient::new(Arc::clone(&auth));
    let drive = DriveApiClient::new(Arc::clone(&auth));
    let render = Arc::new(RenderService::new(docs, drive.clone(), output_folder_id));

    // CRM notes are optional: without a token the notifier is disabled.
    let zendesk = std::env::var("ZENDESK_API_TOKEN").ok().map(|token| {
        let base_url =
            std::env::var("ZENDESK_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        ZendeskSellClient::new(base_url, token)
    });
    if zendesk.is_none() {
        tracing::info!("ZENDESK_API_TOKEN not set; CRM notes are disabled");
    }
    let crm = Arc::new(CrmService::new(zendesk));

    let api_key = std::env::var("API_KEY").ok();
    if api_key.is_none() {
        tracing::warn!("API_KEY not set; /v1 endpoints are unauthenticated");
    }

    let state = AppState {
        catalog,
        render,
        crm,
        drive: Arc::new(drive),
        api_key,
    };

    // ========================================================================
    // HTTP SERVER
    // ========================================================================

    let port = std::env::var("PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(3000);
    let addr = format!("0.0.0.0:{}", port);

    tracing::info!("Starting docpress on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind HTTP listener");
    axum::serve(listener, http::router(state))
        .await
        .expect("HTTP server error");
}
