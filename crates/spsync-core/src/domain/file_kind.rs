//! Coarse file classification by extension
//!
//! SharePoint post-processes some uploads (HTML sanitization, PDF scanning,
//! Office conversion, thumbnails) before the list item accepts field writes.
//! The metadata batcher sizes its waits from these kinds.

use serde::{Deserialize, Serialize};

const OFFICE_EXTENSIONS: &[&str] = &["docx", "xlsx", "pptx", "doc", "xls", "ppt"];
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "svg", "webp", "tiff"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Html,
    Pdf,
    Office,
    Image,
    Other,
}

impl FileKind {
    /// Classify by the extension of `name` (case-insensitive).
    pub fn from_name(name: &str) -> Self {
        let Some((_, ext)) = name.rsplit_once('.') else {
            return Self::Other;
        };
        let ext = ext.to_ascii_lowercase();
        match ext.as_str() {
            "html" => Self::Html,
            "pdf" => Self::Pdf,
            e if OFFICE_EXTENSIONS.contains(&e) => Self::Office,
            e if IMAGE_EXTENSIONS.contains(&e) => Self::Image,
            _ => Self::Other,
        }
    }

    /// Whether SharePoint processes this kind after upload.
    pub fn is_complex(self) -> bool {
        !matches!(self, Self::Other)
    }
}
