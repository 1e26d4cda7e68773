//! Markdown conversion port
//!
//! Converts a Markdown document into a standalone HTML page suitable for
//! viewing inside SharePoint. Relative links are rewritten against the
//! library location described by [`LinkContext`].

use serde::Serialize;

/// Where a converted document will live, for link rewriting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkContext {
    /// Tenant host, e.g. `contoso.sharepoint.com`.
    pub host: String,
    pub site_name: String,
    /// Upload root inside the library.
    pub upload_path: String,
    /// Normalized path of the source `.md` relative to the batch base.
    pub source_rel_path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConvertedDocument {
    pub html: String,
    pub diagrams_rendered: u64,
    pub diagrams_failed: u64,
}

#[async_trait::async_trait]
pub trait IMarkdownConverter: Send + Sync {
    /// Render `markdown` to a complete HTML page.
    async fn convert(
        &self,
        markdown: &str,
        context: &LinkContext,
    ) -> anyhow::Result<ConvertedDocument>;
}
