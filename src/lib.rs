//! Embedfs: an in-memory, optionally gzip-compressed filesystem for
//! shipping static assets inside a binary
//!
//! This library provides:
//! - A path-keyed store of files and directories ([`EmbeddedFs`])
//! - Seekable readers over gzip-compressed content, with a raw mode that
//!   hands out the stored gzip stream untouched
//! - Depth-first traversal ([`EmbeddedFs::walk`]) and extraction to disk
//!   ([`EmbeddedFs::copy`])
//! - An HTTP adapter with gzip negotiation, entity tags and ranges
//!   ([`FileServer`])
//! - A bundle writer and manifest format for producing the embedded data
//!
//! # Example
//!
//! ```
//! use embedfs::{BundleWriter, FileServer};
//! use std::sync::Arc;
//!
//! let mut writer = BundleWriter::new();
//! writer.add_file("/index.html", b"<h1>Hello</h1>")?;
//! let fs = Arc::new(writer.into_fs()?);
//!
//! let server = FileServer::new(Arc::clone(&fs));
//! let req = http::Request::builder().uri("/").body(()).unwrap();
//! let resp = server.handle(&req);
//! assert_eq!(resp.status(), 200);
//! assert_eq!(resp.body().as_ref(), b"<h1>Hello</h1>");
//! # Ok::<(), embedfs::error::EmbedError>(())
//! ```

pub mod bundle;
pub mod config;
pub mod error;
pub mod manifest;
pub mod server;
pub mod store;

pub use bundle::{BundleWriter, FileOptions};
pub use config::Config;
pub use error::{EmbedError, Result};
pub use manifest::{DirectoryRecord, FileRecord, Manifest};
pub use server::{serve_content, FileServer, Handler};
pub use store::{
    dir_mode, DirNode, EmbeddedFs, EntityTag, File, FileNode, LocalFile, Node, NodeInfo, Reader,
    WalkControl, GZIP_MARKER, MODE_DIR, MODE_PERM,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_basics() {
        let fs = EmbeddedFs::new();
        assert!(fs.is_empty());
        assert!(!fs.is_local());
        assert_eq!(Config::default().render_folders, true);
        assert_eq!(GZIP_MARKER, "-gz");
    }
}
