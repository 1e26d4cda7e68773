//! Markdown to standalone HTML for SharePoint
//!
//! Relative links are rewritten to absolute library URLs before rendering,
//! fenced `mermaid` blocks are rendered to inline SVG by an external command
//! (mermaid-cli), and the result is wrapped in a page with GitHub-like
//! styling. A diagram that fails to render stays in the page as code.

use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use regex::{Captures, Regex};
use spsync_core::ports::{ConvertedDocument, IMarkdownConverter, LinkContext};
use tracing::{debug, warn};

/// Library folder behind the default document library's URL.
const LIBRARY_URL_FOLDER: &str = "Shared Documents";

pub const DEFAULT_MERMAID_TIMEOUT: Duration = Duration::from_secs(30);

fn link_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[([^\]]+)\]\(([^)]+)\)").expect("link pattern compiles"))
}

fn mermaid_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```mermaid\n(.*?)\n```").expect("mermaid pattern compiles"))
}

fn xml_declaration_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<\?xml[^>]*\?>").expect("xml declaration pattern compiles"))
}

/// [`IMarkdownConverter`] backed by comrak and mermaid-cli.
#[derive(Debug, Clone)]
pub struct ComrakConverter {
    mermaid_command: String,
    mermaid_timeout: Duration,
}

impl ComrakConverter {
    pub fn new(mermaid_command: impl Into<String>) -> Self {
        Self {
            mermaid_command: mermaid_command.into(),
            mermaid_timeout: DEFAULT_MERMAID_TIMEOUT,
        }
    }

    pub fn with_mermaid_timeout(mut self, timeout: Duration) -> Self {
        self.mermaid_timeout = timeout;
        self
    }

    /// Run the Mermaid command on `code` and return the SVG markup.
    async fn render_mermaid(&self, code: &str) -> Result<String> {
        let dir = tempfile::tempdir().context("Failed to create temporary directory")?;
        let input = dir.path().join("diagram.mmd");
        let output = dir.path().join("diagram.svg");
        tokio::fs::write(&input, code).await?;

        let run = tokio::process::Command::new(&self.mermaid_command)
            .arg("-i")
            .arg(&input)
            .arg("-o")
            .arg(&output)
            .kill_on_drop(true)
            .output();
        let result = tokio::time::timeout(self.mermaid_timeout, run)
            .await
            .with_context(|| format!("{} timed out", self.mermaid_command))?
            .with_context(|| format!("Failed to run {}", self.mermaid_command))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            bail!("{} failed: {}", self.mermaid_command, stderr.trim());
        }
        let svg = tokio::fs::read_to_string(&output)
            .await
            .with_context(|| format!("{} produced no SVG", self.mermaid_command))?;
        Ok(xml_declaration_regex().replace_all(&svg, "").trim().to_string())
    }
}

#[async_trait::async_trait]
impl IMarkdownConverter for ComrakConverter {
    async fn convert(&self, markdown: &str, context: &LinkContext) -> Result<ConvertedDocument> {
        let base_url = library_base_url(context);
        let rewritten = rewrite_links(markdown, &base_url, &context.source_rel_path);

        // Pull diagrams out before rendering so comrak never sees them.
        let mut blocks = Vec::new();
        let mut stripped = String::with_capacity(rewritten.len());
        let mut last = 0;
        for caps in mermaid_regex().captures_iter(&rewritten) {
            let (Some(whole), Some(code)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            stripped.push_str(&rewritten[last..whole.start()]);
            stripped.push_str(&placeholder(blocks.len()));
            blocks.push(code.as_str().to_string());
            last = whole.end();
        }
        stripped.push_str(&rewritten[last..]);

        let mut document = ConvertedDocument::default();
        let mut rendered = Vec::with_capacity(blocks.len());
        for code in &blocks {
            match self.render_mermaid(code).await {
                Ok(svg) => {
                    document.diagrams_rendered += 1;
                    rendered.push(svg);
                }
                Err(e) => {
                    warn!(file = %context.source_rel_path, error = %format!("{e:#}"), "Mermaid diagram kept as code");
                    document.diagrams_failed += 1;
                    rendered.push(format!("<pre><code>mermaid\n{}</code></pre>", html_escape(code)));
                }
            }
        }

        let mut body = render_markdown(&stripped);
        for (index, content) in rendered.iter().enumerate() {
            let marker = placeholder(index);
            let wrapped = format!(r#"<div class="mermaid-diagram">{content}</div>"#);
            body = body.replace(&format!("<p>{marker}</p>"), &wrapped);
            body = body.replace(&marker, &wrapped);
        }

        document.html = html_page(&page_title(&context.source_rel_path), &body);
        debug!(
            file = %context.source_rel_path,
            diagrams = blocks.len(),
            failed = document.diagrams_failed,
            "Markdown converted"
        );
        Ok(document)
    }
}

fn placeholder(index: usize) -> String {
    format!("<!--MERMAID_PLACEHOLDER_{index}-->")
}

/// CommonMark plus GitHub extensions; raw HTML passes through.
pub fn render_markdown(markdown: &str) -> String {
    use comrak::{markdown_to_html, Options};

    let mut options = Options::default();
    options.extension.strikethrough = true;
    options.extension.table = true;
    options.extension.autolink = true;
    options.extension.tasklist = true;
    options.render.r#unsafe = true;

    markdown_to_html(markdown, &options)
}

/// `https://{host}/sites/{site}/Shared%20Documents/{upload_path}`, each
/// segment percent-encoded.
pub fn library_base_url(context: &LinkContext) -> String {
    let library_path = if context.upload_path.trim_matches('/').is_empty() {
        LIBRARY_URL_FOLDER.to_string()
    } else {
        format!("{LIBRARY_URL_FOLDER}/{}", context.upload_path.trim_matches('/'))
    };
    format!(
        "https://{}/sites/{}/{}",
        context.host,
        context.site_name,
        encode_segments(&library_path)
    )
}

fn encode_segments(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Rewrite links to documents under the upload root as SharePoint URLs.
///
/// External links, `mailto:` and in-page anchors are untouched, as are
/// targets that are neither Markdown, a folder (`/` suffix), nor a file
/// with an extension. Folder links open the folder and file links open the
/// folder containing the file; `.md` targets are named by their converted
/// `.html` page.
pub fn rewrite_links(markdown: &str, base_url: &str, source_rel_path: &str) -> String {
    let current_dir = source_rel_path
        .rsplit_once('/')
        .map(|(dir, _)| dir)
        .unwrap_or("");

    link_regex()
        .replace_all(markdown, |caps: &Captures| {
            let text = &caps[1];
            let target = &caps[2];
            rewrite_link(text, target, base_url, current_dir).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

fn rewrite_link(text: &str, target: &str, base_url: &str, current_dir: &str) -> Option<String> {
    if target.contains("://") || target.starts_with("mailto:") || target.starts_with('#') {
        return None;
    }
    let is_markdown = target.ends_with(".md") || target.contains(".md#");
    let is_folder = target.ends_with('/');
    let basename = target.rsplit('/').next().unwrap_or(target);
    if !is_markdown && !is_folder && !basename.contains('.') {
        return None;
    }

    let path = target.split_once('#').map(|(p, _)| p).unwrap_or(target);
    let mut resolved = match path.strip_prefix('/') {
        Some(absolute) => normalize_posix(absolute),
        None if current_dir.is_empty() => normalize_posix(path),
        None => normalize_posix(&format!("{current_dir}/{path}")),
    };
    if let Some(stem) = resolved.strip_suffix(".md") {
        resolved = format!("{stem}.html");
    }

    if is_folder {
        return Some(format!("[{text}]({base_url}/{})", encode_segments(&resolved)));
    }

    let (folder, filename) = match resolved.rsplit_once('/') {
        Some((folder, filename)) => (folder, filename),
        None => ("", resolved.as_str()),
    };
    let url = if folder.is_empty() {
        base_url.to_string()
    } else {
        format!("{base_url}/{}", encode_segments(folder))
    };
    Some(format!(r#"[{text}]({url} "View folder containing {filename}")"#))
}

/// Lexical `.`/`..` resolution; `..` above the start is dropped.
fn normalize_posix(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            s => parts.push(s),
        }
    }
    parts.join("/")
}

fn page_title(source_rel_path: &str) -> String {
    let name = Path::new(source_rel_path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.strip_suffix(".md").unwrap_or(&name).to_string()
}

fn html_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn html_page(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <title>{title}</title>
    <style>
        body {{
            font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", "Noto Sans", Helvetica, Arial, sans-serif;
            font-size: 16px;
            line-height: 1.5;
            word-wrap: break-word;
            padding: 20px;
            max-width: 980px;
            margin: 0 auto;
            color: #1F2328;
            background-color: #ffffff;
        }}
        h1, h2 {{ padding-bottom: .3em; border-bottom: 1px solid #d1d9e0; }}
        h1, h2, h3, h4, h5, h6 {{ margin-top: 24px; margin-bottom: 16px; font-weight: 600; line-height: 1.25; }}
        a {{ color: #0969da; text-decoration: none; }}
        a:hover {{ text-decoration: underline; }}
        code {{
            font-family: ui-monospace, SFMono-Regular, "SF Mono", Consolas, "Liberation Mono", Menlo, monospace;
            font-size: 85%;
            padding: .2em .4em;
            background-color: #eff1f3;
            border-radius: 6px;
        }}
        pre {{ padding: 16px; overflow: auto; background-color: #f6f8fa; border-radius: 6px; }}
        pre code {{ padding: 0; background-color: transparent; }}
        blockquote {{ margin: 0; padding: 0 1em; color: #59636e; border-left: .25em solid #d1d9e0; }}
        table {{ border-collapse: collapse; display: block; width: max-content; max-width: 100%; overflow: auto; }}
        table th, table td {{ padding: 6px 13px; border: 1px solid #d1d9e0; }}
        table tr:nth-child(2n) {{ background-color: #f6f8fa; }}
        img {{ max-width: 100%; }}
        .mermaid-diagram {{ text-align: center; margin: 16px 0; overflow-x: auto; }}
        .mermaid-diagram svg {{ max-width: 100%; height: auto; }}
    </style>
</head>
<body>
{body}
</body>
</html>
"#,
        title = html_escape(title),
    )
}
