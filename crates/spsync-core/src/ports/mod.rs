//! Port definitions (hexagonal architecture interfaces)
//!
//! The sync engine depends only on these traits; adapter crates implement them.
//!
//! ## Ports Overview
//!
//! - [`IRemoteLibrary`] - Document library operations (Microsoft Graph)
//! - [`IMarkdownConverter`] - Markdown to standalone HTML conversion

pub mod markdown;
pub mod remote_library;

pub use markdown::{ConvertedDocument, IMarkdownConverter, LinkContext};
pub use remote_library::{
    ChunkOutcome, FolderCreation, IRemoteLibrary, RemoteChild, UploadSession, UploadedItem,
};
