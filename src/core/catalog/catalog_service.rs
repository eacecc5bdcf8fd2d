// The catalog holds the template and package configuration that drives every
// render. It lives in a Google Sheet so non-developers can edit it; this module
// only sees rows of cells through the `SheetRangeSource` trait and never talks
// HTTP itself.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Sheets API error: {0}")]
    Sheets(String),

    #[error("Unknown template '{0}'")]
    UnknownTemplate(String),

    #[error("Unknown package '{0}'")]
    UnknownPackage(String),

    #[error("Package '{0}' has no default template")]
    PackageWithoutTemplate(String),

    #[error("Request names neither a template nor a package")]
    MissingSelector,
}

// ============================================================================
// DOMAIN MODELS
// ============================================================================
// Records are immutable once loaded; a cache refresh replaces the whole
// catalog rather than mutating individual entries.

/// One template row from the configuration sheet.
#[derive(Debug, Clone, Serialize)]
pub struct Template {
    pub key: String,
    pub name: String,
    /// Rendering engine tag. Only Google Doc templates exist today, but the
    /// column lets the sheet introduce a new engine without a schema change.
    pub engine: String,
    /// Source Google Doc that gets copied for every render.
    pub doc_id: String,
    pub filename_pattern: String,
    /// Dotted payload paths that must be present and non-empty, in the order
    /// they are declared in the sheet.
    pub required_placeholders: Vec<String>,
    pub default_package: Option<String>,
    /// Keep the intermediate Doc copy around after export instead of
    /// deleting it.
    pub keep_intermediate: bool,
    pub version: String,
    pub active: bool,
    pub notes: String,
}

/// A single exam inside a package.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamDescriptor {
    pub code: String,
    pub name: String,
}

/// A named bundle of exams that maps to a default template.
#[derive(Debug, Clone, Serialize)]
pub struct ExamPackage {
    pub key: String,
    pub name: String,
    pub exams: Vec<ExamDescriptor>,
    pub default_template: Option<String>,
    pub version: String,
    pub active: bool,
}

/// The full parsed configuration. Only active rows survive parsing, so every
/// lookup below sees active records only.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Catalog {
    pub templates: Vec<Template>,
    pub packages: Vec<ExamPackage>,
}

impl Catalog {
    pub fn template(&self, key: &str) -> Option<&Template> {
        self.templates.iter().find(|t| t.key == key)
    }

    pub fn package(&self, key: &str) -> Option<&ExamPackage> {
        self.packages.iter().find(|p| p.key == key)
    }

    /// Resolve the template a render request should use: a direct template
    /// key wins, otherwise the package's default template is followed.
    pub fn resolve_template(
        &self,
        template: Option<&str>,
        package: Option<&str>,
    ) -> Result<&Template, CatalogError> {
        if let Some(key) = template {
            return self
                .template(key)
                .ok_or_else(|| CatalogError::UnknownTemplate(key.to_string()));
        }

        if let Some(key) = package {
            let package = self
                .package(key)
                .ok_or_else(|| CatalogError::UnknownPackage(key.to_string()))?;
            let template_key = package
                .default_template
                .as_deref()
                .ok_or_else(|| CatalogError::PackageWithoutTemplate(key.to_string()))?;
            return self
                .template(template_key)
                .ok_or_else(|| CatalogError::UnknownTemplate(template_key.to_string()));
        }

        Err(CatalogError::MissingSelector)
    }
}

// ============================================================================
// SHEET SOURCE TRAIT (PORT)
// ============================================================================

/// The minimal Sheets operation the catalog needs: one A1 range as a grid of
/// cells, header row included.
#[async_trait]
pub trait SheetRangeSource: Send + Sync {
    async fn read_range(
        &self,
        spreadsheet_id: &str,
        range: &str,
    ) -> Result<Vec<Vec<String>>, CatalogError>;
}

// ============================================================================
// SERVICE
// ============================================================================

/// Where the catalog lives and how long a loaded copy stays fresh.
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    pub spreadsheet_id: String,
    pub templates_range: String,
    pub packages_range: String,
    pub cache_ttl: Duration,
}

impl CatalogConfig {
    pub fn new(spreadsheet_id: String) -> Self {
        Self {
            spreadsheet_id,
            templates_range: "Templates!A1:Z".to_string(),
            packages_range: "Packages!A1:Z".to_string(),
            cache_ttl: Duration::from_secs(60),
        }
    }
}

struct CachedCatalog {
    catalog: Arc<Catalog>,
    loaded_at: Instant,
}

/// Loads and caches the catalog. The cache is read-mostly: requests share the
/// same `Arc<Catalog>` until the TTL lapses, then the next caller refetches.
pub struct CatalogService<S: SheetRangeSource> {
    source: S,
    config: CatalogConfig,
    cache: RwLock<Option<CachedCatalog>>,
}

impl<S: SheetRangeSource> CatalogService<S> {
    pub fn new(source: S, config: CatalogConfig) -> Self {
        Self {
            source,
            config,
            cache: RwLock::new(None),
        }
    }

    /// Get the catalog, serving the cached copy while it is fresh.
    pub async fn catalog(&self) -> Result<Arc<Catalog>, CatalogError> {
        {
            let cached = self.cache.read().await;
            if let Some(entry) = cached.as_ref() {
                if entry.loaded_at.elapsed() < self.config.cache_ttl {
                    return Ok(Arc::clone(&entry.catalog));
                }
            }
        }

        self.refresh().await
    }

    /// Reload from the sheet regardless of cache freshness.
    pub async fn refresh(&self) -> Result<Arc<Catalog>, CatalogError> {
        let catalog = Arc::new(self.load().await?);

        let mut cached = self.cache.write().await;
        *cached = Some(CachedCatalog {
            catalog: Arc::clone(&catalog),
            loaded_at: Instant::now(),
        });

        tracing::info!(
            "Loaded catalog: {} template(s), {} package(s)",
            catalog.templates.len(),
            catalog.packages.len()
        );

        Ok(catalog)
    }

    async fn load(&self) -> Result<Catalog, CatalogError> {
        // The two ranges are independent, so fetch them in parallel.
        let (template_rows, package_rows) = tokio::try_join!(
            self.source
                .read_range(&self.config.spreadsheet_id, &self.config.templates_range),
            self.source
                .read_range(&self.config.spreadsheet_id, &self.config.packages_range),
        )?;

        Ok(Catalog {
            templates: parse_templates(&template_rows),
            packages: parse_packages(&package_rows),
        })
    }
}

// ============================================================================
// ROW PARSING
// ============================================================================
// The sheet is header + rows. Headers become field names (trimmed,
// lower-cased) so column order in the sheet doesn't matter.

type Record = HashMap<String, String>;

fn rows_to_records(rows: &[Vec<String>]) -> Vec<Record> {
    let mut rows_iter = rows.iter();
    let header: Vec<String> = match rows_iter.next() {
        Some(row) => row.iter().map(|cell| cell.trim().to_lowercase()).collect(),
        None => return Vec::new(),
    };

    rows_iter
        .map(|row| {
            header
                .iter()
                .enumerate()
                .map(|(i, name)| (name.clone(), row.get(i).cloned().unwrap_or_default()))
                .collect()
        })
        .collect()
}

fn field(record: &Record, name: &str) -> String {
    record
        .get(name)
        .map(|value| value.trim().to_string())
        .unwrap_or_default()
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Sheet cells hold booleans as free text; accept the spellings editors
/// actually type.
fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "true" | "yes" | "y" | "1"
    )
}

/// Parse a JSON-array cell. Malformed JSON is logged and treated as empty so
/// one bad cell can't take the whole catalog down.
fn parse_json_array<T: serde::de::DeserializeOwned>(raw: &str, context: &str) -> Vec<T> {
    if raw.trim().is_empty() {
        return Vec::new();
    }

    match serde_json::from_str(raw) {
        Ok(values) => values,
        Err(err) => {
            tracing::warn!("Ignoring malformed JSON list in row '{}': {}", context, err);
            Vec::new()
        }
    }
}

fn parse_templates(rows: &[Vec<String>]) -> Vec<Template> {
    rows_to_records(rows)
        .iter()
        .filter_map(parse_template_record)
        .filter(|template| template.active)
        .collect()
}

fn parse_template_record(record: &Record) -> Option<Template> {
    let key = field(record, "key");
    if key.is_empty() {
        tracing::warn!("Skipping template row without a key");
        return None;
    }

    let engine = field(record, "engine");
    let version = field(record, "version");

    Some(Template {
        name: field(record, "name"),
        engine: if engine.is_empty() {
            "gdoc".to_string()
        } else {
            engine
        },
        doc_id: field(record, "doc_id"),
        filename_pattern: field(record, "filename_pattern"),
        required_placeholders: parse_json_array(&field(record, "required_placeholders"), &key),
        default_package: non_empty(field(record, "default_package")),
        keep_intermediate: parse_bool(&field(record, "keep_intermediate")),
        version: if version.is_empty() {
            "1".to_string()
        } else {
            version
        },
        active: parse_bool(&field(record, "active")),
        notes: field(record, "notes"),
        key,
    })
}

fn parse_packages(rows: &[Vec<String>]) -> Vec<ExamPackage> {
    rows_to_records(rows)
        .iter()
        .filter_map(parse_package_record)
        .filter(|package| package.active)
        .collect()
}

fn parse_package_record(record: &Record) -> Option<ExamPackage> {
    let key = field(record, "key");
    if key.is_empty() {
        tracing::warn!("Skipping package row without a key");
        return None;
    }

    let version = field(record, "version");

    Some(ExamPackage {
        name: field(record, "name"),
        exams: parse_json_array(&field(record, "exams"), &key),
        default_template: non_empty(field(record, "default_template")),
        version: if version.is_empty() {
            "1".to_string()
        } else {
            version
        },
        active: parse_bool(&field(record, "active")),
        key,
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    fn template_rows() -> Vec<Vec<String>> {
        vec![
            row(&[
                "key",
                "name",
                "engine",
                "doc_id",
                "filename_pattern",
                "required_placeholders",
                "default_package",
                "keep_intermediate",
                "version",
                "active",
                "notes",
            ]),
            row(&[
                "offer",
                "Offer letter",
                "gdoc",
                "doc-offer",
                "Offer {{customer.name}} {{today}}",
                r#"["customer.name","deal.amount"]"#,
                "standard",
                "no",
                "3",
                "yes",
                "main offer template",
            ]),
            row(&[
                "retired",
                "Old offer",
                "gdoc",
                "doc-old",
                "old",
                "[]",
                "",
                "no",
                "1",
                "no",
                "",
            ]),
        ]
    }

    fn package_rows() -> Vec<Vec<String>> {
        vec![
            row(&["key", "name", "exams", "default_template", "version", "active"]),
            row(&[
                "standard",
                "Standard package",
                r#"[{"code":"BLD","name":"Blood panel"},{"code":"ECG","name":"Electrocardiogram"}]"#,
                "offer",
                "2",
                "true",
            ]),
            row(&["empty", "No template", "[]", "", "1", "true"]),
        ]
    }

    struct FakeSource {
        templates: Vec<Vec<String>>,
        packages: Vec<Vec<String>>,
        calls: AtomicUsize,
    }

    impl FakeSource {
        fn new() -> Self {
            Self {
                templates: template_rows(),
                packages: package_rows(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl SheetRangeSource for FakeSource {
        async fn read_range(
            &self,
            _spreadsheet_id: &str,
            range: &str,
        ) -> Result<Vec<Vec<String>>, CatalogError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if range.starts_with("Templates") {
                Ok(self.templates.clone())
            } else {
                Ok(self.packages.clone())
            }
        }
    }

    fn make_service() -> CatalogService<FakeSource> {
        CatalogService::new(FakeSource::new(), CatalogConfig::new("sheet-1".to_string()))
    }

    #[test]
    fn parses_template_rows_and_drops_inactive() {
        let templates = parse_templates(&template_rows());

        assert_eq!(templates.len(), 1);
        let offer = &templates[0];
        assert_eq!(offer.key, "offer");
        assert_eq!(offer.doc_id, "doc-offer");
        assert_eq!(
            offer.required_placeholders,
            vec!["customer.name".to_string(), "deal.amount".to_string()]
        );
        assert_eq!(offer.default_package.as_deref(), Some("standard"));
        assert!(!offer.keep_intermediate);
        assert_eq!(offer.version, "3");
    }

    #[test]
    fn parses_package_rows_with_exams() {
        let packages = parse_packages(&package_rows());

        assert_eq!(packages.len(), 2);
        let standard = &packages[0];
        assert_eq!(standard.exams.len(), 2);
        assert_eq!(standard.exams[0].code, "BLD");
        assert_eq!(standard.default_template.as_deref(), Some("offer"));
        assert_eq!(packages[1].default_template, None);
    }

    #[test]
    fn rows_without_a_key_are_skipped() {
        let rows = vec![row(&["key", "name", "active"]), row(&["", "nameless", "yes"])];
        assert!(parse_templates(&rows).is_empty());
    }

    #[test]
    fn short_rows_are_padded_with_empty_cells() {
        let rows = vec![row(&["key", "name", "active"]), row(&["only-key"])];
        let records = rows_to_records(&rows);

        assert_eq!(records[0].get("key").unwrap(), "only-key");
        assert_eq!(records[0].get("name").unwrap(), "");
    }

    #[test]
    fn malformed_json_array_cell_becomes_empty() {
        let parsed: Vec<String> = parse_json_array("[not json", "broken-row");
        assert!(parsed.is_empty());

        let parsed: Vec<String> = parse_json_array("   ", "blank-row");
        assert!(parsed.is_empty());
    }

    #[test]
    fn boolean_cells_accept_common_spellings() {
        assert!(parse_bool("TRUE"));
        assert!(parse_bool("Yes"));
        assert!(parse_bool(" y "));
        assert!(parse_bool("1"));
        assert!(!parse_bool("no"));
        assert!(!parse_bool(""));
        assert!(!parse_bool("maybe"));
    }

    #[tokio::test]
    async fn resolves_template_directly_and_via_package() {
        let service = make_service();
        let catalog = service.catalog().await.unwrap();

        let direct = catalog.resolve_template(Some("offer"), None).unwrap();
        assert_eq!(direct.key, "offer");

        let via_package = catalog.resolve_template(None, Some("standard")).unwrap();
        assert_eq!(via_package.key, "offer");
    }

    #[tokio::test]
    async fn resolver_reports_each_failure_mode() {
        let service = make_service();
        let catalog = service.catalog().await.unwrap();

        assert!(matches!(
            catalog.resolve_template(Some("nope"), None),
            Err(CatalogError::UnknownTemplate(_))
        ));
        assert!(matches!(
            catalog.resolve_template(None, Some("nope")),
            Err(CatalogError::UnknownPackage(_))
        ));
        assert!(matches!(
            catalog.resolve_template(None, Some("empty")),
            Err(CatalogError::PackageWithoutTemplate(_))
        ));
        assert!(matches!(
            catalog.resolve_template(None, None),
            Err(CatalogError::MissingSelector)
        ));
    }

    #[tokio::test]
    async fn inactive_templates_are_not_resolvable() {
        let service = make_service();
        let catalog = service.catalog().await.unwrap();

        assert!(matches!(
            catalog.resolve_template(Some("retired"), None),
            Err(CatalogError::UnknownTemplate(_))
        ));
    }

    #[tokio::test]
    async fn catalog_is_cached_within_ttl() {
        let service = make_service();

        service.catalog().await.unwrap();
        service.catalog().await.unwrap();

        // One load = two range reads (templates + packages).
        assert_eq!(service.source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn refresh_bypasses_the_cache() {
        let service = make_service();

        service.catalog().await.unwrap();
        service.refresh().await.unwrap();

        assert_eq!(service.source.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn expired_cache_is_reloaded() {
        let mut config = CatalogConfig::new("sheet-1".to_string());
        config.cache_ttl = Duration::ZERO;
        let service = CatalogService::new(FakeSource::new(), config);

        service.catalog().await.unwrap();
        service.catalog().await.unwrap();

        assert_eq!(service.source.calls.load(Ordering::SeqCst), 4);
    }
}
