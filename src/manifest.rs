//! Generator output: the entry table that accompanies the data buffer
//!
//! A generator emits one contiguous buffer plus a [`Manifest`] describing
//! every file (with a byte range into the buffer) and every directory
//! (with its child paths). [`EmbeddedFs::from_manifest`] turns the pair
//! into a populated store without copying file data.
//!
//! ```no_run
//! use embedfs::{EmbeddedFs, Manifest};
//! # use embedfs::error::Result;
//!
//! # fn main() -> Result<()> {
//! let buffer = bytes::Bytes::from(std::fs::read("assets.bin")?);
//! let manifest = Manifest::from_json(&std::fs::read("assets.json")?)?;
//! let fs = EmbeddedFs::from_manifest(buffer, &manifest)?;
//! let index = fs.stat("/index.html")?;
//! # Ok(())
//! # }
//! ```

use crate::config::Config;
use crate::error::{EmbedError, Result};
use crate::store::{DirNode, EmbeddedFs, EntityTag, FileNode};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Entry table produced alongside the data buffer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    /// Files, each referencing a byte range of the buffer
    #[serde(default)]
    pub files: Vec<FileRecord>,

    /// Directories with their child paths
    #[serde(default)]
    pub directories: Vec<DirectoryRecord>,
}

/// File entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Canonical path
    pub path: String,

    /// Base name
    pub name: String,

    /// Source path on disk, used in local mode
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub local: String,

    /// Uncompressed size
    pub size: u64,

    /// Modification time (Unix epoch seconds)
    pub mod_time: i64,

    #[serde(default)]
    pub mime_type: String,

    /// Entity tag in wire form (`<base64url sha1>-gz`)
    #[serde(default)]
    pub tag: String,

    /// Stored bytes are a gzip stream
    #[serde(default)]
    pub compressed: bool,

    /// Start of the stored bytes in the buffer
    pub offset: u64,

    /// Length of the stored bytes in the buffer
    pub length: u64,
}

/// Directory entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryRecord {
    pub path: String,
    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub local: String,

    pub mod_time: i64,

    /// Canonical paths of the children
    #[serde(default)]
    pub children: Vec<String>,
}

impl Manifest {
    pub fn new() -> Self {
        Self {
            files: Vec::new(),
            directories: Vec::new(),
        }
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self).map_err(EmbedError::from)
    }

    /// Parse from JSON
    pub fn from_json(data: &[u8]) -> Result<Self> {
        serde_json::from_slice(data).map_err(EmbedError::from)
    }

    /// Serialize to TOML
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string(self)?)
    }

    /// Parse from TOML
    pub fn from_toml(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Total number of entries
    pub fn len(&self) -> usize {
        self.files.len() + self.directories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.directories.is_empty()
    }
}

impl FileRecord {
    fn slice(&self, buffer: &Bytes) -> Result<Bytes> {
        let end = self
            .offset
            .checked_add(self.length)
            .filter(|end| *end <= buffer.len() as u64)
            .ok_or_else(|| {
                EmbedError::InvalidManifest(format!(
                    "{}: range {}+{} outside buffer of {} bytes",
                    self.path,
                    self.offset,
                    self.length,
                    buffer.len()
                ))
            })?;
        Ok(buffer.slice(self.offset as usize..end as usize))
    }

    fn to_node(&self, buffer: &Bytes) -> Result<FileNode> {
        if !self.path.starts_with('/') {
            return Err(EmbedError::InvalidManifest(format!(
                "file path is not absolute: {}",
                self.path
            )));
        }

        let data = self.slice(buffer)?;
        let mut node = FileNode::new(self.path.clone(), data)
            .with_name(self.name.clone())
            .with_local(&self.local)
            .with_mod_time(self.mod_time)
            .with_mime_type(self.mime_type.clone())
            .with_tag(EntityTag::parse(&self.tag));
        if self.compressed {
            node = node.with_compression(self.size);
        } else {
            node.size = self.size;
        }
        Ok(node)
    }
}

impl DirectoryRecord {
    fn depth(&self) -> usize {
        self.path.trim_end_matches('/').matches('/').count()
    }

    fn to_node(&self) -> DirNode {
        DirNode::new(self.path.clone())
            .with_name(self.name.clone())
            .with_local(&self.local)
            .with_mod_time(self.mod_time)
            .with_children(self.children.iter().cloned())
    }
}

impl EmbeddedFs {
    /// Build a store from a generator buffer and its manifest
    ///
    /// File data stays a view into `buffer`. Directories are inserted
    /// deepest first so child directories resolve regardless of the order
    /// they appear in the manifest.
    pub fn from_manifest(buffer: Bytes, manifest: &Manifest) -> Result<Self> {
        Self::from_manifest_with_config(buffer, manifest, &Config::default())
    }

    pub fn from_manifest_with_config(
        buffer: Bytes,
        manifest: &Manifest,
        config: &Config,
    ) -> Result<Self> {
        let fs = EmbeddedFs::with_capacity(manifest.len());
        fs.use_local(config.local);

        for record in &manifest.files {
            fs.add_file(record.to_node(&buffer)?)?;
        }

        let mut directories: Vec<&DirectoryRecord> = manifest.directories.iter().collect();
        directories.sort_by_key(|d| std::cmp::Reverse(d.depth()));
        for record in directories {
            fs.add_directory(record.to_node())?;
        }

        if let Some(mod_time) = config.mod_time_override {
            fs.override_mod_times(mod_time);
        }

        info!(
            files = manifest.files.len(),
            directories = manifest.directories.len(),
            buffer = buffer.len(),
            "loaded embedded filesystem"
        );
        Ok(fs)
    }
}
