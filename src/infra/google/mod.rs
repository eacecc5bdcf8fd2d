pub mod auth;
pub mod docs_client;
pub mod drive_client;
pub mod sheets_client;

pub use auth::{
    ServiceAccountAuth, DOCUMENTS_SCOPE, DRIVE_SCOPE, SHEETS_READONLY_SCOPE,
};
pub use docs_client::DocsApiClient;
pub use drive_client::DriveApiClient;
pub use sheets_client::SheetsApiClient;
