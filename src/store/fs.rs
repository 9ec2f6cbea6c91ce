use crate::config::Config;
use crate::error::{EmbedError, Result};
use crate::store::file::{File, LocalFile};
use crate::store::node::{parent_path, DirNode, FileNode, Node, NodeInfo};
use crate::store::reader::Reader;
use crate::store::tag::EntityTag;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Default)]
struct Inner {
    entries: HashMap<String, Arc<Node>>,
    local: bool,
}

/// In-memory filesystem keyed by canonical path
///
/// Reads take a short shared lock and hand out `Arc` snapshots of nodes, so
/// open handles never hold the lock. Mutations (`write`, `add_*`,
/// `use_local`) take the exclusive lock.
#[derive(Default)]
pub struct EmbeddedFs {
    inner: RwLock<Inner>,
}

impl EmbeddedFs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(Inner {
                entries: HashMap::with_capacity(capacity),
                local: false,
            }),
        }
    }

    /// Empty store with settings applied from `config`
    pub fn with_config(config: &Config) -> Self {
        let fs = Self::new();
        fs.use_local(config.local);
        fs
    }

    /// Insert a file node; fails if anything already lives at its path
    pub fn add_file(&self, file: FileNode) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.entries.contains_key(&file.path) {
            return Err(EmbedError::AlreadyExists(file.path));
        }
        inner
            .entries
            .insert(file.path.clone(), Arc::new(Node::File(file)));
        Ok(())
    }

    /// Insert a directory node
    ///
    /// Children must already be present; dangling references are dropped.
    pub fn add_directory(&self, mut dir: DirNode) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.entries.contains_key(&dir.path) {
            return Err(EmbedError::AlreadyExists(dir.path));
        }
        retain_present(&inner.entries, &mut dir);
        inner
            .entries
            .insert(dir.path.clone(), Arc::new(Node::Directory(dir)));
        Ok(())
    }

    /// Replace the children of an existing directory
    pub fn set_children<I, S>(&self, path: &str, children: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut inner = self.inner.write();
        let node = inner
            .entries
            .get(path)
            .ok_or_else(|| EmbedError::NotFound(path.to_string()))?;

        let mut dir = match node.as_ref() {
            Node::Directory(dir) => dir.clone(),
            Node::File(_) => return Err(EmbedError::NotADirectory(path.to_string())),
        };
        dir.children = children.into_iter().map(Into::into).collect();
        retain_present(&inner.entries, &mut dir);
        inner
            .entries
            .insert(path.to_string(), Arc::new(Node::Directory(dir)));
        Ok(())
    }

    /// Open a handle on `path`
    ///
    /// In local mode, entries with an on-disk source are opened from disk.
    pub fn open(&self, path: &str) -> Result<File> {
        let inner = self.inner.read();
        let node = inner
            .entries
            .get(path)
            .cloned()
            .ok_or_else(|| EmbedError::NotFound(path.to_string()))?;

        if inner.local {
            if let Some(local) = node.local() {
                let local = local.to_path_buf();
                drop(inner);
                debug!(path, local = %local.display(), "opening local copy");
                return LocalFile::open(&local).map(File::Local).map_err(|e| {
                    warn!(path, local = %local.display(), error = %e, "local source unavailable");
                    e
                });
            }
        }

        let entries = match node.as_ref() {
            Node::Directory(dir) => dir
                .children
                .iter()
                .filter_map(|child| inner.entries.get(child))
                .map(|child| NodeInfo::embedded(Arc::clone(child)))
                .collect(),
            Node::File(_) => Vec::new(),
        };

        Ok(File::Embedded(Reader::new(node, entries)))
    }

    /// Metadata for `path` without opening a handle
    pub fn stat(&self, path: &str) -> Result<NodeInfo> {
        self.lookup(path)
            .map(NodeInfo::embedded)
            .ok_or_else(|| EmbedError::NotFound(path.to_string()))
    }

    pub(crate) fn lookup(&self, path: &str) -> Option<Arc<Node>> {
        self.inner.read().entries.get(path).cloned()
    }

    /// Create or overwrite an uncompressed file
    ///
    /// A new file gets any missing ancestor directories. If an ancestor
    /// exists but is a file, every entry created by this call is removed
    /// again and `NotADirectory` is returned.
    pub fn write(&self, path: &str, data: &[u8]) -> Result<()> {
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{}", path)
        };
        let data = Bytes::copy_from_slice(data);
        let mut inner = self.inner.write();

        if let Some(existing) = inner.entries.get_mut(&path) {
            return match Arc::make_mut(existing) {
                Node::File(file) => {
                    file.size = data.len() as u64;
                    file.data = data;
                    file.compressed = false;
                    file.tag = EntityTag::default();
                    file.mime_type.clear();
                    debug!(path = %path, "overwrote file");
                    Ok(())
                }
                Node::Directory(_) => Err(EmbedError::IsADirectory(path)),
            };
        }

        let now = chrono::Utc::now().timestamp();
        inner.entries.insert(
            path.clone(),
            Arc::new(Node::File(FileNode::new(path.clone(), data).with_mod_time(now))),
        );

        let mut created = vec![path.clone()];
        let mut child = path.clone();
        let linked = loop {
            let parent = match parent_path(&child) {
                Some(parent) => parent.to_string(),
                None => break Ok(()),
            };

            match inner.entries.get_mut(&parent) {
                Some(node) => match Arc::make_mut(node) {
                    Node::Directory(dir) => {
                        dir.insert_child(&child);
                        break Ok(());
                    }
                    Node::File(_) => break Err(EmbedError::NotADirectory(parent)),
                },
                None => {
                    let mut dir = DirNode::new(parent.clone()).with_mod_time(now);
                    dir.insert_child(&child);
                    inner
                        .entries
                        .insert(parent.clone(), Arc::new(Node::Directory(dir)));
                    created.push(parent.clone());
                    child = parent;
                }
            }
        };

        if let Err(err) = linked {
            for created_path in &created {
                inner.entries.remove(created_path);
            }
            return Err(err);
        }

        debug!(path = %path, created = created.len(), "wrote new file");
        Ok(())
    }

    /// Toggle local passthrough for this store
    pub fn use_local(&self, enabled: bool) {
        self.inner.write().local = enabled;
    }

    pub fn is_local(&self) -> bool {
        self.inner.read().local
    }

    pub fn contains(&self, path: &str) -> bool {
        self.inner.read().entries.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().entries.is_empty()
    }

    /// All canonical paths, sorted
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.inner.read().entries.keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Check stored sizes and tags against decoded content
    pub fn verify(&self) -> Result<()> {
        let files: Vec<Arc<Node>> = self.inner.read().entries.values().cloned().collect();

        for node in files {
            let Node::File(file) = node.as_ref() else {
                continue;
            };

            let contents = file.contents()?;
            if contents.len() as u64 != file.size {
                return Err(EmbedError::IntegrityFailed {
                    path: file.path.clone(),
                    reason: format!(
                        "decoded {} bytes, expected {}",
                        contents.len(),
                        file.size
                    ),
                });
            }

            if !file.tag.is_empty() && EntityTag::compute(&contents).base() != file.tag.base() {
                return Err(EmbedError::IntegrityFailed {
                    path: file.path.clone(),
                    reason: "entity tag does not match content".to_string(),
                });
            }
        }

        Ok(())
    }

    /// Rewrite every entry's modification time
    pub(crate) fn override_mod_times(&self, mod_time: i64) {
        let mut inner = self.inner.write();
        for node in inner.entries.values_mut() {
            Arc::make_mut(node).set_mod_time(mod_time);
        }
    }
}

fn retain_present(entries: &HashMap<String, Arc<Node>>, dir: &mut DirNode) {
    let path = dir.path.clone();
    dir.children.retain(|child| {
        let present = entries.contains_key(child);
        if !present {
            warn!(dir = %path, child = %child, "dropping dangling child reference");
        }
        present
    });
    dir.sort_children();
}
