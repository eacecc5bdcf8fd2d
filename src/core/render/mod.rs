pub mod filename;
pub mod placeholders;
pub mod render_service;

pub use render_service::{
    DocsClient, DriveClient, DriveFile, RenderError, RenderOptions, RenderService, RenderedPdf,
};
