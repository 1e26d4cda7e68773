//! Relative path handling and SharePoint name rules
//!
//! Every path that crosses into the remote side is a normalized relative path:
//! `/` separators, no leading `./` or `/`, no empty segments. Names are made
//! SharePoint-safe with [`sanitize_name`] before they are used as keys.

use std::path::{Component, Path};

use super::errors::DomainError;

/// Longest name SharePoint accepts for a single file or folder.
const MAX_NAME_CHARS: usize = 255;

const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Full-width stand-in for a character SharePoint rejects in names.
fn fullwidth(c: char) -> Option<char> {
    Some(match c {
        '#' => '＃',
        '%' => '％',
        '&' => '＆',
        '*' => '＊',
        ':' => '：',
        '<' => '＜',
        '>' => '＞',
        '?' => '？',
        '/' => '／',
        '\\' => '＼',
        '|' => '｜',
        '"' => '＂',
        '{' => '｛',
        '}' => '｝',
        '~' => '～',
        _ => return None,
    })
}

/// Make a single file or folder name acceptable to SharePoint.
///
/// Illegal characters become their full-width look-alikes, leading `~`/`$`
/// and trailing dots/spaces are dropped, reserved device names get a `_`
/// prefix, and overlong names are truncated keeping the extension.
pub fn sanitize_name(name: &str, is_folder: bool) -> String {
    if name.is_empty() {
        return String::new();
    }

    let mapped: String = name.chars().map(|c| fullwidth(c).unwrap_or(c)).collect();
    let mut sanitized = mapped
        .trim_start_matches(&['～', '$'][..])
        .trim_end_matches(&['.', ' '][..])
        .to_string();

    let stem = if is_folder {
        sanitized.as_str()
    } else {
        sanitized.split('.').next().unwrap_or_default()
    };
    if RESERVED_NAMES.contains(&stem.to_ascii_uppercase().as_str()) {
        sanitized.insert(0, '_');
    }

    if sanitized.is_empty() {
        sanitized = "_unnamed".to_string();
    }

    if sanitized.chars().count() > MAX_NAME_CHARS {
        sanitized = match name.rsplit_once('.') {
            Some((_, ext)) if !is_folder => {
                let keep = MAX_NAME_CHARS.saturating_sub(ext.chars().count() + 1);
                let base: String = sanitized.chars().take(keep).collect();
                format!("{base}.{ext}")
            }
            _ => sanitized.chars().take(MAX_NAME_CHARS).collect(),
        };
    }

    sanitized
}

/// Sanitize each segment of a relative path, dropping empty segments.
///
/// Inner segments are folders; the last one is treated as a file when it
/// has an extension.
pub fn sanitize_path_components(path: &str) -> String {
    let normalized = path.replace('\\', "/");
    let parts: Vec<&str> = normalized.split('/').collect();
    let last = parts.len().saturating_sub(1);
    parts
        .iter()
        .enumerate()
        .filter(|(_, part)| !part.is_empty())
        .map(|(i, part)| sanitize_name(part, i < last || !part.contains('.')))
        .collect::<Vec<_>>()
        .join("/")
}

/// `\` to `/`, strip `./` and leading `/`, collapse empty segments.
pub fn normalize_rel_path(path: &str) -> String {
    path.replace('\\', "/")
        .split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// `path` relative to `base`, normalized with `/` separators.
pub fn relative_to(path: &Path, base: &Path) -> Result<String, DomainError> {
    let rel = path
        .strip_prefix(base)
        .map_err(|_| DomainError::InvalidPath(path.display().to_string()))?;
    let mut parts = Vec::new();
    for component in rel.components() {
        match component {
            Component::Normal(s) => parts.push(s.to_string_lossy().into_owned()),
            Component::CurDir => {}
            _ => return Err(DomainError::InvalidPath(path.display().to_string())),
        }
    }
    if parts.is_empty() {
        return Err(DomainError::InvalidPath(path.display().to_string()));
    }
    Ok(parts.join("/"))
}

/// Split a normalized path into `(parent, name)`; the parent is `""` at the root.
pub fn split_parent(path: &str) -> (&str, &str) {
    match path.rsplit_once('/') {
        Some((parent, name)) => (parent, name),
        None => ("", path),
    }
}

/// Lookup key for a remote relative path.
///
/// SharePoint treats names that differ only in case as the same item.
pub fn path_key(path: &str) -> String {
    path.to_lowercase()
}

/// Whether the path names a Markdown source (`.md`, any case).
pub fn is_markdown(path: &str) -> bool {
    path.rsplit_once('.')
        .is_some_and(|(_, ext)| ext.eq_ignore_ascii_case("md"))
}

/// Remote name of a converted Markdown file: `docs/readme.md` → `docs/readme.html`.
pub fn md_to_html_target(path: &str) -> String {
    match path.rsplit_once('.') {
        Some((stem, ext)) if ext.eq_ignore_ascii_case("md") => format!("{stem}.html"),
        _ => path.to_string(),
    }
}
