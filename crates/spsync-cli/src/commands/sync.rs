//! Sync command - Upload local files to a SharePoint document library
//!
//! Provides the `spsync sync` CLI command which:
//! 1. Validates the merged configuration
//! 2. Expands the file pattern into the local file set
//! 3. Authenticates and resolves the site, library, and upload root
//! 4. Runs the orchestrator and prints the summary
//!
//! The process exits non-zero when any file failed.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use spsync_core::config::Config;
use spsync_core::domain::format_bytes;
use spsync_graph::provider::GraphLibrary;
use spsync_graph::rate_limit::RateLimitSummary;
use spsync_graph::AuthFailure;
use spsync_sync::discovery::discover;
use spsync_sync::markdown::ComrakConverter;
use spsync_sync::orchestrator::{SyncOptions, SyncOrchestrator, SyncReport};
use tracing::info;

use super::ConfigOverrides;
use crate::output::{get_formatter, OutputFormat, OutputFormatter};

#[derive(Debug, Args)]
pub struct SyncCommand {
    #[command(flatten)]
    pub overrides: ConfigOverrides,
}

impl SyncCommand {
    pub async fn execute(&self, config: Config, format: OutputFormat) -> Result<ExitCode> {
        let formatter = get_formatter(format);

        let errors = config.validate();
        if !errors.is_empty() {
            for error in &errors {
                formatter.error(&error.to_string());
            }
            return Ok(ExitCode::FAILURE);
        }

        let discovery = match discover(
            &config.sync.file_path,
            config.sync.recursive,
            &config.sync.exclude_patterns,
        ) {
            Ok(discovery) => discovery,
            Err(e) => {
                formatter.error(&e.to_string());
                return Ok(ExitCode::FAILURE);
            }
        };
        info!(
            files = discovery.files.len(),
            base = %discovery.base_path.display(),
            "Local files discovered"
        );

        let library = match GraphLibrary::connect(&config).await {
            Ok(library) => Arc::new(library),
            Err(e) => {
                formatter.error(&format!("{e:#}"));
                if let Some(auth) = e.chain().find_map(|c| c.downcast_ref::<AuthFailure>()) {
                    formatter.info(auth.hint());
                }
                return Ok(ExitCode::FAILURE);
            }
        };
        let context = library.context();
        info!(
            library = %context.library_name,
            hash_column = context.hash_column_available,
            "Connected to {}",
            config.site_url()
        );
        if !context.hash_column_available {
            formatter.warn("FileHash column unavailable; comparing by size only");
        }

        let converter = Arc::new(ComrakConverter::new(config.markdown.mermaid_command.clone()));
        let orchestrator = SyncOrchestrator::new(
            library.clone(),
            converter,
            context.root_item_id.clone(),
            SyncOptions::from_config(&config),
        );
        formatter.info(&format!(
            "Syncing {} file{} to {}",
            discovery.files.len(),
            plural(discovery.files.len() as u64),
            config.sync.upload_path
        ));

        let report = orchestrator.run(&discovery).await;
        let rate_limits = library.monitor().summary();

        if format.is_json() {
            formatter.print_json(&report_json(&report, &rate_limits));
        } else {
            print_summary(formatter.as_ref(), &report, &rate_limits);
        }

        Ok(if report.has_failures() {
            ExitCode::FAILURE
        } else {
            ExitCode::SUCCESS
        })
    }
}

fn plural(n: u64) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}

fn percent(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{v:.1}%"))
}

fn print_summary(formatter: &dyn OutputFormatter, report: &SyncReport, rate: &RateLimitSummary) {
    let s = &report.stats;

    if let Some(reason) = &report.aborted {
        formatter.error(&format!(
            "Sync aborted after {:.1}s: {reason}",
            report.elapsed.as_secs_f64()
        ));
    } else if report.has_failures() {
        formatter.error(&format!(
            "Sync finished with {} failed file{} in {:.1}s",
            s.failed_files,
            plural(s.failed_files),
            report.elapsed.as_secs_f64()
        ));
    } else if s.new_files + s.replaced_files + s.deleted_files == 0 {
        formatter.success("Already up to date");
    } else {
        formatter.success(&format!("Sync completed in {:.1}s", report.elapsed.as_secs_f64()));
    }

    formatter.section("Files");
    formatter.info(&format!("New:        {}", s.new_files));
    formatter.info(&format!("Replaced:   {}", s.replaced_files));
    formatter.info(&format!("Skipped:    {}", s.skipped_files));
    formatter.info(&format!("Failed:     {}", s.failed_files));
    if report.orphans > 0 {
        let label = if report.whatif { "Would delete" } else { "Deleted" };
        formatter.info(&format!("{label}: {}", report.orphans));
    }

    formatter.section("Comparison");
    match s.comparison_split() {
        Some((by_hash, by_size)) => {
            formatter.info(&format!("By hash:    {} ({by_hash:.1}%)", s.compared_by_hash));
            formatter.info(&format!("By size:    {} ({by_size:.1}%)", s.compared_by_size));
        }
        None => formatter.info("No files compared"),
    }

    formatter.section("FileHash column");
    formatter.info(&format!("Saved (new):      {}", s.hash_new_saved));
    formatter.info(&format!("Updated:          {}", s.hash_updated));
    formatter.info(&format!("Matched:          {}", s.hash_matched));
    formatter.info(&format!("Backfilled:       {}", s.hash_backfilled));
    formatter.info(&format!("Empty found:      {}", s.hash_empty_found));
    if s.hash_save_failed + s.hash_backfill_failed > 0 {
        formatter.warn(&format!(
            "{} FileHash write{} failed",
            s.hash_save_failed + s.hash_backfill_failed,
            plural(s.hash_save_failed + s.hash_backfill_failed)
        ));
    }
    if s.hash_column_unavailable > 0 {
        formatter.info(&format!("Column unavailable for {} comparisons", s.hash_column_unavailable));
    }

    formatter.section("Cache");
    if report.snapshot_available {
        formatter.info(&format!(
            "Hits: {}  Misses: {}  Hit rate: {}",
            s.cache_hits,
            s.cache_misses,
            percent(s.cache_hit_percent())
        ));
    } else {
        formatter.info("Remote snapshot not used");
    }
    formatter.info(&format!("Point queries: {}", s.api_queries));

    formatter.section("Transfer");
    formatter.info(&format!("Uploaded:   {}", format_bytes(s.bytes_uploaded)));
    formatter.info(&format!("Skipped:    {}", format_bytes(s.bytes_skipped)));
    formatter.info(&format!("Efficiency: {}", percent(s.efficiency_percent())));

    if s.md_converted + s.md_no_changes + s.md_conversion_failed > 0 {
        formatter.section("Markdown");
        formatter.info(&format!("Converted:  {}", s.md_converted));
        formatter.info(&format!("Unchanged:  {}", s.md_no_changes));
        formatter.info(&format!("Failed:     {}", s.md_conversion_failed));
        formatter.info(&format!(
            "Diagrams:   {} rendered, {} failed",
            s.mermaid_diagrams_rendered, s.mermaid_diagrams_failed
        ));
    }

    formatter.section("Graph API");
    formatter.info(&format!("Requests:   {}", rate.total_requests));
    formatter.info(&format!(
        "Throttling: avg {:.1}%, max {:.1}%, {} throttled, {} HTTP 429",
        rate.average_throttle_percentage * 100.0,
        rate.max_throttle_percentage * 100.0,
        rate.throttled_requests,
        rate.status_429
    ));
    if rate.resource_units_consumed > 0 {
        formatter.info(&format!("Resource units: {}", rate.resource_units_consumed));
    }
    for (operation, count) in &rate.by_operation {
        formatter.info(&format!("  {:<16} {}", operation.label(), count));
    }

    if !report.failures.is_empty() {
        formatter.section("Failures");
        for failure in &report.failures {
            formatter.info(&format!("- {}: {}", failure.path, failure.error));
        }
    }
}

fn report_json(report: &SyncReport, rate: &RateLimitSummary) -> serde_json::Value {
    let failures: Vec<_> = report
        .failures
        .iter()
        .map(|f| serde_json::json!({ "path": f.path, "error": f.error }))
        .collect();

    serde_json::json!({
        "success": !report.has_failures(),
        "duration_ms": report.elapsed.as_millis() as u64,
        "whatif": report.whatif,
        "snapshot_available": report.snapshot_available,
        "aborted": report.aborted,
        "orphans": report.orphans,
        "stats": report.stats,
        "efficiency_percent": report.stats.efficiency_percent(),
        "cache_hit_percent": report.stats.cache_hit_percent(),
        "metadata_writes": {
            "succeeded": report.metadata.succeeded,
            "failed": report.metadata.failed,
        },
        "rate_limits": rate,
        "failures": failures,
    })
}
