use crate::error::{EmbedError, Result};
use crate::manifest::{DirectoryRecord, FileRecord, Manifest};
use crate::store::{base_name, EmbeddedFs, EntityTag};
use bytes::Bytes;
use flate2::{write::GzEncoder, Compression};
use std::collections::BTreeMap;
use std::io::Write;

/// Normalize to an absolute, slash-separated path without `.` or `..`
fn normalize_path(path: &str) -> Result<String> {
    let path = path.replace('\\', "/");
    let mut parts = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                return Err(EmbedError::InvalidManifest(format!(
                    "path escapes root: {}",
                    path
                )))
            }
            _ => parts.push(part),
        }
    }
    if parts.is_empty() {
        return Err(EmbedError::InvalidManifest(format!(
            "path names the root: {}",
            path
        )));
    }
    Ok(format!("/{}", parts.join("/")))
}

fn parent_of(path: &str) -> String {
    match path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(idx) => path[..idx].to_string(),
    }
}

/// Per-file settings for [`BundleWriter::add_file_with`]
#[derive(Debug, Clone, Default)]
pub struct FileOptions {
    /// Defaults to a guess from the file extension
    pub mime_type: Option<String>,
    /// Defaults to the writer's setting
    pub compress: Option<bool>,
    /// Defaults to the writer's timestamp
    pub mod_time: Option<i64>,
    /// On-disk source for local mode
    pub local: Option<String>,
}

/// In-memory packer producing a data buffer and its manifest
///
/// Files are gzipped at best compression when that makes them smaller.
/// Every file's tag is computed from its uncompressed content.
pub struct BundleWriter {
    buffer: Vec<u8>,
    files: Vec<FileRecord>,
    directories: BTreeMap<String, DirectoryRecord>,
    mod_time: i64,
    compress: bool,
}

impl Default for BundleWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl BundleWriter {
    pub fn new() -> Self {
        let mod_time = chrono::Utc::now().timestamp();
        let mut directories = BTreeMap::new();
        directories.insert(
            "/".to_string(),
            DirectoryRecord {
                path: "/".to_string(),
                name: "/".to_string(),
                local: String::new(),
                mod_time,
                children: Vec::new(),
            },
        );
        Self {
            buffer: Vec::new(),
            files: Vec::new(),
            directories,
            mod_time,
            compress: true,
        }
    }

    /// Timestamp for entries added without an explicit one
    pub fn with_mod_time(mut self, mod_time: i64) -> Self {
        self.mod_time = mod_time;
        for dir in self.directories.values_mut() {
            dir.mod_time = mod_time;
        }
        self
    }

    /// Store every file uncompressed
    pub fn without_compression(mut self) -> Self {
        self.compress = false;
        self
    }

    /// Add a file with default options
    pub fn add_file(&mut self, path: &str, data: &[u8]) -> Result<()> {
        self.add_file_with(path, data, FileOptions::default())
    }

    pub fn add_file_with(&mut self, path: &str, data: &[u8], options: FileOptions) -> Result<()> {
        let path = normalize_path(path)?;
        if self.directories.contains_key(&path) || self.files.iter().any(|f| f.path == path) {
            return Err(EmbedError::AlreadyExists(path));
        }

        let mime_type = options.mime_type.unwrap_or_else(|| {
            mime_guess::from_path(&path)
                .first_or_octet_stream()
                .to_string()
        });
        let tag = EntityTag::compute(data);

        let (stored, compressed) = if options.compress.unwrap_or(self.compress) {
            let gz = Self::gzip(data)?;
            if gz.len() < data.len() {
                (gz, true)
            } else {
                (data.to_vec(), false)
            }
        } else {
            (data.to_vec(), false)
        };

        let mod_time = options.mod_time.unwrap_or(self.mod_time);
        self.link(&path)?;

        self.files.push(FileRecord {
            name: base_name(&path).to_string(),
            path,
            local: options.local.unwrap_or_default(),
            size: data.len() as u64,
            mod_time,
            mime_type,
            tag: tag.to_string(),
            compressed,
            offset: self.buffer.len() as u64,
            length: stored.len() as u64,
        });
        self.buffer.extend_from_slice(&stored);
        Ok(())
    }

    /// Add an empty directory (ancestors are created as needed)
    pub fn add_directory(&mut self, path: &str) -> Result<()> {
        let path = normalize_path(path)?;
        if self.files.iter().any(|f| f.path == path) {
            return Err(EmbedError::AlreadyExists(path));
        }
        if !self.directories.contains_key(&path) {
            self.link(&path)?;
            self.directories.insert(
                path.clone(),
                DirectoryRecord {
                    name: base_name(&path).to_string(),
                    path,
                    local: String::new(),
                    mod_time: self.mod_time,
                    children: Vec::new(),
                },
            );
        }
        Ok(())
    }

    /// Record `path` as a child of its parent, creating ancestors
    fn link(&mut self, path: &str) -> Result<()> {
        let parent = parent_of(path);
        if self.files.iter().any(|f| f.path == parent) {
            return Err(EmbedError::NotADirectory(parent));
        }
        if !self.directories.contains_key(&parent) {
            self.add_directory(&parent)?;
        }
        if let Some(dir) = self.directories.get_mut(&parent) {
            if !dir.children.iter().any(|c| c == path) {
                dir.children.push(path.to_string());
            }
        }
        Ok(())
    }

    fn gzip(data: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::best());
        encoder.write_all(data)?;
        Ok(encoder.finish()?)
    }

    /// Data buffer and manifest, children sorted by name
    pub fn finish(self) -> (Bytes, Manifest) {
        let directories = self
            .directories
            .into_values()
            .map(|mut dir| {
                dir.children
                    .sort_by(|a, b| base_name(a).cmp(base_name(b)));
                dir
            })
            .collect();

        let manifest = Manifest {
            files: self.files,
            directories,
        };
        (Bytes::from(self.buffer), manifest)
    }

    /// Finish and load straight into a store
    pub fn into_fs(self) -> Result<EmbeddedFs> {
        let (buffer, manifest) = self.finish();
        EmbeddedFs::from_manifest(buffer, &manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("a/b.txt").unwrap(), "/a/b.txt");
        assert_eq!(normalize_path("/a//./b.txt").unwrap(), "/a/b.txt");
        assert_eq!(normalize_path("a\\b.txt").unwrap(), "/a/b.txt");
        assert!(normalize_path("../etc/passwd").is_err());
        assert!(normalize_path("/").is_err());
    }

    #[test]
    fn test_compressed_record_properties() -> Result<()> {
        let text = b"<html><body>repeat repeat repeat repeat repeat</body></html>".repeat(20);
        let mut writer = BundleWriter::new().with_mod_time(1_579_282_495);
        writer.add_file("index.html", &text)?;
        let (buffer, manifest) = writer.finish();

        let record = &manifest.files[0];
        assert!(record.compressed);
        assert_eq!(record.mime_type, "text/html");
        assert_eq!(record.mod_time, 1_579_282_495);

        let stored = &buffer[record.offset as usize..(record.offset + record.length) as usize];
        let mut decoded = Vec::new();
        GzDecoder::new(stored).read_to_end(&mut decoded)?;
        assert_eq!(decoded.len() as u64, record.size);
        assert_eq!(decoded, text);
        assert_eq!(record.tag, format!("{}-gz", EntityTag::compute(&text).base()));
        Ok(())
    }

    #[test]
    fn test_incompressible_stays_plain() -> Result<()> {
        let mut writer = BundleWriter::new();
        writer.add_file("/tiny.txt", b"x")?;
        let (_, manifest) = writer.finish();
        assert!(!manifest.files[0].compressed);
        assert_eq!(manifest.files[0].length, 1);
        Ok(())
    }

    #[test]
    fn test_directories_linked_and_sorted() -> Result<()> {
        let mut writer = BundleWriter::new();
        writer.add_file("/js/b.js", b"b")?;
        writer.add_file("/js/a.js", b"a")?;
        writer.add_file("/about.html", b"about")?;
        writer.add_directory("/empty")?;
        let (_, manifest) = writer.finish();

        let root = manifest.directories.iter().find(|d| d.path == "/").unwrap();
        assert_eq!(root.children, vec!["/about.html", "/empty", "/js"]);
        let js = manifest.directories.iter().find(|d| d.path == "/js").unwrap();
        assert_eq!(js.children, vec!["/js/a.js", "/js/b.js"]);
        Ok(())
    }

    #[test]
    fn test_rejects_conflicts() -> Result<()> {
        let mut writer = BundleWriter::new();
        writer.add_file("/a", b"a")?;
        assert!(matches!(writer.add_file("/a", b"again"), Err(EmbedError::AlreadyExists(_))));
        assert!(matches!(writer.add_file("/a/b", b"b"), Err(EmbedError::NotADirectory(_))));
        Ok(())
    }
}
