//! Check-config command - Validate settings without uploading
//!
//! Prints the merged configuration (the client secret is never shown) and
//! every validation error. With `--connect` it also authenticates and
//! resolves the site, library, and upload root.

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;
use spsync_core::config::Config;
use spsync_graph::provider::GraphLibrary;
use spsync_graph::AuthFailure;

use super::{config_source, ConfigOverrides};
use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Args)]
pub struct CheckConfigCommand {
    /// Also authenticate and resolve the upload root
    #[arg(long)]
    pub connect: bool,

    #[command(flatten)]
    pub overrides: ConfigOverrides,
}

impl CheckConfigCommand {
    pub async fn execute(
        &self,
        config: Config,
        config_path: Option<&Path>,
        format: OutputFormat,
    ) -> Result<ExitCode> {
        let formatter = get_formatter(format);
        let source = config_source(config_path);
        let errors = config.validate();

        if format.is_json() {
            let mut json = serde_json::json!({
                "source": source.as_ref().map(|p| p.display().to_string()),
                "valid": errors.is_empty(),
                "errors": errors.iter().map(ToString::to_string).collect::<Vec<_>>(),
                "config": serde_json::to_value(&config)
                    .context("Failed to serialize configuration to JSON")?,
                "client_secret_set": !config.auth.client_secret.is_empty(),
            });
            if self.connect && errors.is_empty() {
                json["connection"] = match GraphLibrary::connect(&config).await {
                    Ok(library) => {
                        let context = library.context();
                        serde_json::json!({
                            "ok": true,
                            "site_id": context.site_id,
                            "drive_id": context.drive_id,
                            "library": context.library_name,
                            "list_id": context.list_id,
                            "hash_column_available": context.hash_column_available,
                        })
                    }
                    Err(e) => serde_json::json!({ "ok": false, "error": format!("{e:#}") }),
                };
            }
            let ok = errors.is_empty() && json["connection"]["ok"] != false;
            formatter.print_json(&json);
            return Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE });
        }

        match &source {
            Some(path) => formatter.info(&format!("Configuration: {}", path.display())),
            None => formatter.info("Configuration: defaults and command-line flags"),
        }
        let yaml = serde_yaml::to_string(&config)
            .context("Failed to serialize configuration to YAML")?;
        for line in yaml.lines() {
            formatter.info(line);
        }
        formatter.info(&format!(
            "client_secret: {}",
            if config.auth.client_secret.is_empty() {
                "(not set)"
            } else {
                "(set)"
            }
        ));

        if !errors.is_empty() {
            for error in &errors {
                formatter.error(&error.to_string());
            }
            return Ok(ExitCode::FAILURE);
        }
        formatter.success("Configuration is valid");

        if !self.connect {
            return Ok(ExitCode::SUCCESS);
        }
        match GraphLibrary::connect(&config).await {
            Ok(library) => {
                let context = library.context();
                formatter.success(&format!(
                    "Connected to {} (library '{}')",
                    config.site_url(),
                    context.library_name
                ));
                if context.hash_column_available {
                    formatter.info("FileHash column available");
                } else {
                    formatter.warn("FileHash column unavailable; comparisons will use size only");
                }
                Ok(ExitCode::SUCCESS)
            }
            Err(e) => {
                formatter.error(&format!("{e:#}"));
                if let Some(auth) = e.chain().find_map(|c| c.downcast_ref::<AuthFailure>()) {
                    formatter.info(auth.hint());
                }
                Ok(ExitCode::FAILURE)
            }
        }
    }
}
