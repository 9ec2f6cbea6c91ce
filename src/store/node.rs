use crate::error::{EmbedError, Result};
use crate::store::tag::EntityTag;
use bytes::Bytes;
use flate2::read::GzDecoder;
use std::fs::Metadata;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Permission bits reported for embedded entries
pub const MODE_PERM: u32 = 0o777;

/// Directory type bit, as in `st_mode`
pub const MODE_DIR: u32 = 0o040_000;

/// Base name of a slash-separated path (`/` for the root)
pub(crate) fn base_name(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return "/";
    }
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

/// Parent of a canonical path, `None` for the root
pub(crate) fn parent_path(path: &str) -> Option<&str> {
    if path == "/" || path.is_empty() {
        return None;
    }
    match path.trim_end_matches('/').rfind('/') {
        Some(0) => Some("/"),
        Some(idx) => Some(&path[..idx]),
        None => Some("/"),
    }
}

fn local_from(local: &str) -> Option<PathBuf> {
    if local.is_empty() {
        None
    } else {
        Some(PathBuf::from(local))
    }
}

/// An embedded file
#[derive(Debug, Clone)]
pub struct FileNode {
    pub path: String,
    pub name: String,
    pub local: Option<PathBuf>,
    /// Logical (uncompressed) length
    pub size: u64,
    pub mod_time: i64,
    pub mime_type: String,
    pub tag: EntityTag,
    pub compressed: bool,
    /// Stored bytes, gzip-compressed when `compressed` is set
    pub data: Bytes,
}

impl FileNode {
    /// Uncompressed file whose name and size derive from `path` and `data`
    pub fn new(path: impl Into<String>, data: impl Into<Bytes>) -> Self {
        let path = path.into();
        let data = data.into();
        Self {
            name: base_name(&path).to_string(),
            path,
            local: None,
            size: data.len() as u64,
            mod_time: 0,
            mime_type: String::new(),
            tag: EntityTag::default(),
            compressed: false,
            data,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// On-disk source used in local mode; empty means none
    pub fn with_local(mut self, local: &str) -> Self {
        self.local = local_from(local);
        self
    }

    pub fn with_mod_time(mut self, mod_time: i64) -> Self {
        self.mod_time = mod_time;
        self
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }

    pub fn with_tag(mut self, tag: EntityTag) -> Self {
        self.tag = tag;
        self
    }

    /// Mark `data` as a gzip stream that decodes to `size` bytes
    pub fn with_compression(mut self, size: u64) -> Self {
        self.compressed = true;
        self.size = size;
        self
    }

    /// Decoded contents
    pub fn contents(&self) -> Result<Vec<u8>> {
        if !self.compressed {
            return Ok(self.data.to_vec());
        }

        let mut decoder = GzDecoder::new(&self.data[..]);
        let mut out = Vec::with_capacity(self.size as usize);
        decoder.read_to_end(&mut out).map_err(|e| {
            EmbedError::DecompressionFailed(format!("{}: {}", self.path, e))
        })?;
        Ok(out)
    }
}

/// An embedded directory
#[derive(Debug, Clone)]
pub struct DirNode {
    pub path: String,
    pub name: String,
    pub local: Option<PathBuf>,
    pub mod_time: i64,
    /// Child canonical paths, sorted by name
    pub children: Vec<String>,
}

impl DirNode {
    pub fn new(path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            name: base_name(&path).to_string(),
            path,
            local: None,
            mod_time: 0,
            children: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_local(mut self, local: &str) -> Self {
        self.local = local_from(local);
        self
    }

    pub fn with_mod_time(mut self, mod_time: i64) -> Self {
        self.mod_time = mod_time;
        self
    }

    pub fn with_children<I, S>(mut self, children: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.children = children.into_iter().map(Into::into).collect();
        self
    }

    /// Insert a child path keeping name order; returns false when present
    pub(crate) fn insert_child(&mut self, child: &str) -> bool {
        let name = base_name(child);
        match self
            .children
            .binary_search_by(|probe| base_name(probe).cmp(name))
        {
            Ok(_) => false,
            Err(idx) => {
                self.children.insert(idx, child.to_string());
                true
            }
        }
    }

    pub(crate) fn sort_children(&mut self) {
        self.children
            .sort_by(|a, b| base_name(a).cmp(base_name(b)));
        self.children.dedup();
    }
}

/// A store entry
#[derive(Debug, Clone)]
pub enum Node {
    File(FileNode),
    Directory(DirNode),
}

impl Node {
    pub fn path(&self) -> &str {
        match self {
            Node::File(f) => &f.path,
            Node::Directory(d) => &d.path,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Node::File(f) => &f.name,
            Node::Directory(d) => &d.name,
        }
    }

    pub fn local(&self) -> Option<&Path> {
        match self {
            Node::File(f) => f.local.as_deref(),
            Node::Directory(d) => d.local.as_deref(),
        }
    }

    pub fn mod_time(&self) -> i64 {
        match self {
            Node::File(f) => f.mod_time,
            Node::Directory(d) => d.mod_time,
        }
    }

    pub fn size(&self) -> u64 {
        match self {
            Node::File(f) => f.size,
            Node::Directory(_) => 0,
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, Node::Directory(_))
    }

    pub(crate) fn set_mod_time(&mut self, mod_time: i64) {
        match self {
            Node::File(f) => f.mod_time = mod_time,
            Node::Directory(d) => d.mod_time = mod_time,
        }
    }
}

#[derive(Debug, Clone)]
enum Source {
    Embedded(Arc<Node>),
    Local(PathBuf),
}

/// Metadata view of a node, or of a file opened in local mode
#[derive(Debug, Clone)]
pub struct NodeInfo {
    name: String,
    size: u64,
    mode: u32,
    mod_time: i64,
    is_dir: bool,
    source: Source,
}

impl NodeInfo {
    pub(crate) fn embedded(node: Arc<Node>) -> Self {
        let mode = if node.is_dir() {
            MODE_PERM | MODE_DIR
        } else {
            MODE_PERM
        };
        Self {
            name: node.name().to_string(),
            size: node.size(),
            mode,
            mod_time: node.mod_time(),
            is_dir: node.is_dir(),
            source: Source::Embedded(node),
        }
    }

    pub(crate) fn local(path: &Path, metadata: &Metadata) -> Self {
        let mod_time = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        #[cfg(unix)]
        let mode = {
            use std::os::unix::fs::PermissionsExt;
            metadata.permissions().mode()
        };
        #[cfg(not(unix))]
        let mode = if metadata.is_dir() {
            MODE_PERM | MODE_DIR
        } else {
            MODE_PERM
        };

        Self {
            name: base_name(&path.to_string_lossy()).to_string(),
            size: if metadata.is_dir() { 0 } else { metadata.len() },
            mode,
            mod_time,
            is_dir: metadata.is_dir(),
            source: Source::Local(path.to_path_buf()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Logical (uncompressed) length; 0 for directories
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn mode(&self) -> u32 {
        self.mode
    }

    /// Seconds since the Unix epoch
    pub fn mod_time(&self) -> i64 {
        self.mod_time
    }

    pub fn modified(&self) -> SystemTime {
        if self.mod_time >= 0 {
            UNIX_EPOCH + Duration::from_secs(self.mod_time as u64)
        } else {
            UNIX_EPOCH - Duration::from_secs(self.mod_time.unsigned_abs())
        }
    }

    pub fn is_dir(&self) -> bool {
        self.is_dir
    }

    /// Underlying embedded node, `None` for local-mode files
    pub fn node(&self) -> Option<&Node> {
        match &self.source {
            Source::Embedded(node) => Some(node),
            Source::Local(_) => None,
        }
    }

    fn file(&self) -> Option<&FileNode> {
        match self.node() {
            Some(Node::File(f)) => Some(f),
            _ => None,
        }
    }

    pub fn compressed(&self) -> bool {
        self.file().map(|f| f.compressed).unwrap_or(false)
    }

    pub fn tag(&self) -> Option<&EntityTag> {
        self.file().map(|f| &f.tag).filter(|t| !t.is_empty())
    }

    pub fn mime_type(&self) -> &str {
        self.file().map(|f| f.mime_type.as_str()).unwrap_or("")
    }

    /// Whole decoded contents
    pub fn bytes(&self) -> Result<Vec<u8>> {
        if self.is_dir {
            return Err(EmbedError::IsADirectory(self.name.clone()));
        }
        match &self.source {
            Source::Embedded(node) => match node.as_ref() {
                Node::File(f) => f.contents(),
                Node::Directory(d) => Err(EmbedError::IsADirectory(d.path.clone())),
            },
            Source::Local(path) => Ok(std::fs::read(path)?),
        }
    }

    /// Whole decoded contents as UTF-8 (lossy)
    pub fn string(&self) -> Result<String> {
        let bytes = self.bytes()?;
        Ok(match String::from_utf8(bytes) {
            Ok(s) => s,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        })
    }
}
