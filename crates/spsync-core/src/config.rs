//! Configuration module for spsync.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for CLI overrides.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Upper bound on parallel upload workers (Graph concurrent-request ceiling).
pub const MAX_UPLOAD_WORKERS: usize = 10;

/// Library used when `upload_path` does not name one.
pub const DEFAULT_LIBRARY_NAME: &str = "Documents";

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for a sync run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub site: SiteConfig,
    pub auth: AuthConfig,
    pub sync: SyncConfig,
    pub markdown: MarkdownConfig,
    pub logging: LoggingConfig,
}

/// Target SharePoint site.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Site name as it appears in `/sites/{name}`.
    pub name: String,
    /// Tenant host, e.g. `company.sharepoint.com`.
    pub host: String,
}

/// App-only (client credentials) authentication settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub tenant_id: String,
    pub client_id: String,
    /// Never written back out when the config is serialized.
    #[serde(skip_serializing)]
    pub client_secret: String,
    /// Identity platform host (`login.microsoftonline.us` for GovCloud).
    pub login_endpoint: String,
    /// Graph host (`graph.microsoft.us` for GovCloud).
    pub graph_endpoint: String,
}

/// What to sync and how.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Destination inside the document library, e.g. `Documents/Reports/2024`.
    pub upload_path: String,
    /// Local file or glob pattern.
    pub file_path: String,
    /// Allow `**` to cross directories.
    pub recursive: bool,
    pub exclude_patterns: Vec<String>,
    /// Upload everything, skipping comparison.
    pub force_upload: bool,
    /// Per-file upload attempts and per-request retry ceiling.
    pub max_retry: u32,
    pub max_upload_workers: usize,
    /// Mirror mode: delete remote files with no local counterpart.
    pub sync_delete: bool,
    /// Report deletions without performing them.
    pub sync_delete_whatif: bool,
}

/// Markdown to HTML conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkdownConfig {
    pub convert_to_html: bool,
    /// Re-upload generated HTML even when the source `.md` is unchanged.
    pub force_regeneration: bool,
    /// Mermaid CLI used to render diagrams to SVG.
    pub mermaid_command: String,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Per-file decision tracing.
    pub debug: bool,
    /// Graph request/response and metadata tracing.
    pub debug_metadata: bool,
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            tenant_id: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            login_endpoint: "login.microsoftonline.com".to_string(),
            graph_endpoint: "graph.microsoft.com".to_string(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            upload_path: String::new(),
            file_path: String::new(),
            recursive: false,
            exclude_patterns: Vec::new(),
            force_upload: false,
            max_retry: 3,
            max_upload_workers: 4,
            sync_delete: false,
            sync_delete_whatif: true,
        }
    }
}

impl Default for MarkdownConfig {
    fn default() -> Self {
        Self {
            convert_to_html: true,
            force_regeneration: false,
            mermaid_command: "mmdc".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            debug: false,
            debug_metadata: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Loading and derived values
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/spsync/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("spsync")
            .join("config.yaml")
    }

    /// Worker count clamped to `1..=MAX_UPLOAD_WORKERS`.
    pub fn effective_workers(&self) -> usize {
        self.sync.max_upload_workers.clamp(1, MAX_UPLOAD_WORKERS)
    }

    /// `https://{host}/sites/{name}`
    pub fn site_url(&self) -> String {
        format!("https://{}/sites/{}", self.site.host, self.site.name)
    }

    /// Document library named by the first segment of `upload_path`.
    ///
    /// A path without a `/` does not name a library and yields
    /// [`DEFAULT_LIBRARY_NAME`].
    pub fn library_name(&self) -> String {
        let path = self.sync.upload_path.replace('\\', "/");
        match path.split_once('/') {
            Some((first, _)) if !first.is_empty() => first.to_string(),
            _ => DEFAULT_LIBRARY_NAME.to_string(),
        }
    }

    /// Whether the run will ever compare against remote state.
    ///
    /// The remote snapshot is skipped only when every file is force-uploaded
    /// and mirror deletion is off.
    pub fn needs_snapshot(&self) -> bool {
        !self.sync.force_upload || self.sync.sync_delete
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"site.host"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Highest accepted `sync.max_retry`.
const MAX_RETRY_LIMIT: u32 = 10;

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        let required = [
            ("site.name", &self.site.name),
            ("site.host", &self.site.host),
            ("auth.tenant_id", &self.auth.tenant_id),
            ("auth.client_id", &self.auth.client_id),
            ("auth.client_secret", &self.auth.client_secret),
            ("auth.login_endpoint", &self.auth.login_endpoint),
            ("auth.graph_endpoint", &self.auth.graph_endpoint),
            ("sync.upload_path", &self.sync.upload_path),
            ("sync.file_path", &self.sync.file_path),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                errors.push(ValidationError {
                    field: field.into(),
                    message: "is required".into(),
                });
            }
        }

        if self.site.host.contains("://") {
            errors.push(ValidationError {
                field: "site.host".into(),
                message: "must be a host name, not a URL".into(),
            });
        }

        if self.sync.max_retry > MAX_RETRY_LIMIT {
            errors.push(ValidationError {
                field: "sync.max_retry".into(),
                message: format!("must be between 0 and {MAX_RETRY_LIMIT}"),
            });
        }

        if self.sync.max_upload_workers == 0 {
            errors.push(ValidationError {
                field: "sync.max_upload_workers".into(),
                message: "must be greater than 0".into(),
            });
        }

        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}', expected one of: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Fluent builder for [`Config`], used by the CLI to layer flags over the file.
///
/// ```
/// use spsync_core::config::ConfigBuilder;
///
/// let cfg = ConfigBuilder::new()
///     .site("TeamSite", "contoso.sharepoint.com")
///     .upload_path("Documents/Reports")
///     .max_upload_workers(8)
///     .build();
/// assert_eq!(cfg.effective_workers(), 8);
/// ```
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Start from [`Config::default`].
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    /// Start from an already loaded configuration.
    pub fn from_config(config: Config) -> Self {
        Self { config }
    }

    pub fn site(mut self, name: impl Into<String>, host: impl Into<String>) -> Self {
        self.config.site.name = name.into();
        self.config.site.host = host.into();
        self
    }

    pub fn credentials(
        mut self,
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        self.config.auth.tenant_id = tenant_id.into();
        self.config.auth.client_id = client_id.into();
        self.config.auth.client_secret = client_secret.into();
        self
    }

    pub fn login_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.auth.login_endpoint = endpoint.into();
        self
    }

    pub fn graph_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.auth.graph_endpoint = endpoint.into();
        self
    }

    pub fn upload_path(mut self, path: impl Into<String>) -> Self {
        self.config.sync.upload_path = path.into();
        self
    }

    pub fn file_path(mut self, pattern: impl Into<String>) -> Self {
        self.config.sync.file_path = pattern.into();
        self
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.config.sync.recursive = recursive;
        self
    }

    /// Accepts the comma-separated CLI form; blank entries are dropped.
    pub fn exclude_patterns_csv(mut self, csv: &str) -> Self {
        self.config.sync.exclude_patterns = csv
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(String::from)
            .collect();
        self
    }

    pub fn force_upload(mut self, force: bool) -> Self {
        self.config.sync.force_upload = force;
        self
    }

    pub fn max_retry(mut self, n: u32) -> Self {
        self.config.sync.max_retry = n;
        self
    }

    pub fn max_upload_workers(mut self, n: usize) -> Self {
        self.config.sync.max_upload_workers = n;
        self
    }

    pub fn sync_delete(mut self, enabled: bool, whatif: bool) -> Self {
        self.config.sync.sync_delete = enabled;
        self.config.sync.sync_delete_whatif = whatif;
        self
    }

    pub fn convert_markdown(mut self, convert: bool) -> Self {
        self.config.markdown.convert_to_html = convert;
        self
    }

    pub fn force_markdown_regeneration(mut self, force: bool) -> Self {
        self.config.markdown.force_regeneration = force;
        self
    }

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn debug(mut self, debug: bool, debug_metadata: bool) -> Self {
        self.config.logging.debug = debug;
        self.config.logging.debug_metadata = debug_metadata;
        self
    }

    /// Consume the builder and return the config (no validation).
    pub fn build(self) -> Config {
        self.config
    }

    /// Consume the builder, validate, and return the config or errors.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let errors = self.config.validate();
        if errors.is_empty() {
            Ok(self.config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
