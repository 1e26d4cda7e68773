//! CLI subcommands and the configuration they share
//!
//! Every subcommand starts from the YAML file (explicit `--config`, else the
//! default path when it exists, else built-in defaults) and then applies the
//! flags in [`ConfigOverrides`].

pub mod check_config;
pub mod sync;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use spsync_core::config::{Config, ConfigBuilder};

/// Flags that take precedence over the configuration file.
#[derive(Debug, Clone, Default, Args)]
pub struct ConfigOverrides {
    /// SharePoint site name (the part after /sites/)
    #[arg(long)]
    pub site_name: Option<String>,

    /// SharePoint host, e.g. contoso.sharepoint.com
    #[arg(long)]
    pub host: Option<String>,

    /// Entra ID tenant id
    #[arg(long)]
    pub tenant_id: Option<String>,

    /// App registration client id
    #[arg(long)]
    pub client_id: Option<String>,

    /// App registration client secret
    #[arg(long, env = "SPSYNC_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<String>,

    /// Identity platform host (login.microsoftonline.us for GovCloud)
    #[arg(long)]
    pub login_endpoint: Option<String>,

    /// Microsoft Graph host (graph.microsoft.us for GovCloud)
    #[arg(long)]
    pub graph_endpoint: Option<String>,

    /// Destination inside the site, starting with the library name
    #[arg(long)]
    pub upload_path: Option<String>,

    /// Glob of local files to upload
    #[arg(long)]
    pub file_path: Option<String>,

    /// Let `**` match across directories
    #[arg(long)]
    pub recursive: bool,

    /// Comma-separated exclude patterns, e.g. "*.tmp,__pycache__,.git"
    #[arg(long, value_name = "PATTERNS")]
    pub exclude: Option<String>,

    /// Upload every file regardless of remote state
    #[arg(long)]
    pub force: bool,

    /// Attempts per remote operation
    #[arg(long)]
    pub max_retry: Option<u32>,

    /// Concurrent uploads (1-10)
    #[arg(long)]
    pub workers: Option<usize>,

    /// Delete remote files that no longer exist locally
    #[arg(long)]
    pub sync_delete: bool,

    /// With --sync-delete, actually delete instead of previewing
    #[arg(long, requires = "sync_delete")]
    pub no_whatif: bool,

    /// Upload Markdown files as-is instead of converting them to HTML
    #[arg(long)]
    pub no_convert_md: bool,

    /// Regenerate HTML for every Markdown file
    #[arg(long)]
    pub force_md: bool,

    /// Mermaid CLI used to render diagrams
    #[arg(long)]
    pub mermaid_command: Option<String>,

    /// Debug-level logging
    #[arg(long)]
    pub debug: bool,

    /// Trace every Graph metadata request and response
    #[arg(long)]
    pub debug_metadata: bool,
}

impl ConfigOverrides {
    pub fn apply(&self, config: Config) -> Config {
        let mut builder = ConfigBuilder::from_config(config);

        if let Some(path) = &self.upload_path {
            builder = builder.upload_path(path);
        }
        if let Some(pattern) = &self.file_path {
            builder = builder.file_path(pattern);
        }
        if let Some(csv) = &self.exclude {
            builder = builder.exclude_patterns_csv(csv);
        }
        if let Some(n) = self.max_retry {
            builder = builder.max_retry(n);
        }
        if let Some(n) = self.workers {
            builder = builder.max_upload_workers(n);
        }
        if let Some(endpoint) = &self.login_endpoint {
            builder = builder.login_endpoint(endpoint);
        }
        if let Some(endpoint) = &self.graph_endpoint {
            builder = builder.graph_endpoint(endpoint);
        }

        let mut config = builder.build();
        if let Some(name) = &self.site_name {
            config.site.name = name.clone();
        }
        if let Some(host) = &self.host {
            config.site.host = host.clone();
        }
        if let Some(tenant) = &self.tenant_id {
            config.auth.tenant_id = tenant.clone();
        }
        if let Some(client) = &self.client_id {
            config.auth.client_id = client.clone();
        }
        if let Some(secret) = &self.client_secret {
            config.auth.client_secret = secret.clone();
        }
        if let Some(command) = &self.mermaid_command {
            config.markdown.mermaid_command = command.clone();
        }

        // Flags only ever switch behavior on.
        config.sync.recursive |= self.recursive;
        config.sync.force_upload |= self.force;
        if self.sync_delete {
            config.sync.sync_delete = true;
            config.sync.sync_delete_whatif = !self.no_whatif;
        }
        if self.no_convert_md {
            config.markdown.convert_to_html = false;
        }
        config.markdown.force_regeneration |= self.force_md;
        config.logging.debug |= self.debug;
        config.logging.debug_metadata |= self.debug_metadata;
        config
    }
}

/// Load the configuration file and apply `overrides`.
pub fn resolve_config(path: Option<&Path>, overrides: &ConfigOverrides) -> Result<Config> {
    let config = match path {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => {
            let default = Config::default_path();
            if default.exists() {
                Config::load(&default).with_context(|| {
                    format!("Failed to load configuration from {}", default.display())
                })?
            } else {
                Config::default()
            }
        }
    };
    Ok(overrides.apply(config))
}

/// The file [`resolve_config`] reads, if any.
pub fn config_source(path: Option<&Path>) -> Option<PathBuf> {
    match path {
        Some(path) => Some(path.to_path_buf()),
        None => Some(Config::default_path()).filter(|p| p.exists()),
    }
}
