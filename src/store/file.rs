use crate::error::{EmbedError, Result};
use crate::store::node::NodeInfo;
use crate::store::reader::Reader;
use std::fs;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Handle returned by [`EmbeddedFs::open`](crate::EmbeddedFs::open)
pub enum File {
    /// Backed by the embedded buffer
    Embedded(Reader),
    /// Local-mode passthrough to the on-disk source
    Local(LocalFile),
}

impl File {
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self {
            File::Embedded(reader) => reader.read(buf),
            File::Local(local) => local.read(buf),
        }
    }

    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        match self {
            File::Embedded(reader) => reader.seek(pos),
            File::Local(local) => local.seek(pos),
        }
    }

    pub fn readdir(&mut self, count: isize) -> Result<Vec<NodeInfo>> {
        match self {
            File::Embedded(reader) => reader.readdir(count),
            File::Local(local) => local.readdir(count),
        }
    }

    pub fn stat(&self) -> Result<NodeInfo> {
        match self {
            File::Embedded(reader) => reader.stat(),
            File::Local(local) => local.stat(),
        }
    }

    pub fn close(&mut self) -> Result<()> {
        match self {
            File::Embedded(reader) => reader.close(),
            File::Local(local) => local.close(),
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, File::Local(_))
    }

    pub fn as_embedded_mut(&mut self) -> Option<&mut Reader> {
        match self {
            File::Embedded(reader) => Some(reader),
            File::Local(_) => None,
        }
    }
}

impl Read for File {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        File::read(self, buf).map_err(Into::into)
    }
}

impl Seek for File {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        File::seek(self, pos).map_err(Into::into)
    }
}

/// On-disk file or directory opened in local mode
pub struct LocalFile {
    path: PathBuf,
    file: Option<fs::File>,
    is_dir: bool,
    entries: Option<Vec<NodeInfo>>,
    dir_cursor: usize,
    closed: bool,
}

impl LocalFile {
    pub(crate) fn open(path: &Path) -> Result<Self> {
        let metadata = fs::metadata(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => EmbedError::NotFound(path.display().to_string()),
            _ => EmbedError::Io(e),
        })?;

        let is_dir = metadata.is_dir();
        let file = if is_dir {
            None
        } else {
            Some(fs::File::open(path)?)
        };

        Ok(Self {
            path: path.to_path_buf(),
            file,
            is_dir,
            entries: None,
            dir_cursor: 0,
            closed: false,
        })
    }

    fn check_open(&self) -> Result<()> {
        if self.closed {
            Err(EmbedError::closed())
        } else {
            Ok(())
        }
    }

    fn handle(&mut self) -> Result<&mut fs::File> {
        self.check_open()?;
        let path = &self.path;
        self.file
            .as_mut()
            .ok_or_else(|| EmbedError::IsADirectory(path.display().to_string()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        Ok(self.handle()?.read(buf)?)
    }

    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        self.check_open()?;
        if self.is_dir {
            return match pos {
                SeekFrom::Start(0) => {
                    self.dir_cursor = 0;
                    Ok(0)
                }
                _ => Err(EmbedError::InvalidHandle(
                    "invalid seek on directory".to_string(),
                )),
            };
        }
        Ok(self.handle()?.seek(pos)?)
    }

    fn load_entries(&self) -> Result<Vec<NodeInfo>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            let metadata = entry.metadata()?;
            entries.push(NodeInfo::local(&entry.path(), &metadata));
        }
        entries.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(entries)
    }

    pub fn readdir(&mut self, count: isize) -> Result<Vec<NodeInfo>> {
        self.check_open()?;
        if !self.is_dir {
            return Err(EmbedError::NotADirectory(self.path.display().to_string()));
        }

        if self.entries.is_none() {
            self.entries = Some(self.load_entries()?);
        }
        let entries = self.entries.as_deref().unwrap_or_default();

        let remaining = entries.len() - self.dir_cursor;
        if remaining == 0 && count > 0 {
            return Err(EmbedError::EndOfDirectory);
        }

        let take = if count <= 0 {
            remaining
        } else {
            remaining.min(count as usize)
        };
        let list = entries[self.dir_cursor..self.dir_cursor + take].to_vec();
        self.dir_cursor += take;
        Ok(list)
    }

    pub fn stat(&self) -> Result<NodeInfo> {
        self.check_open()?;
        let metadata = fs::metadata(&self.path)?;
        Ok(NodeInfo::local(&self.path, &metadata))
    }

    pub fn close(&mut self) -> Result<()> {
        self.check_open()?;
        self.closed = true;
        self.file = None;
        self.entries = None;
        Ok(())
    }
}
