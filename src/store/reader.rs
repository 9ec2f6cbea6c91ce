//! Random-access reader over a single embedded node
//!
//! Compressed files are decoded strictly forward. The reader tracks two
//! cursors: `seek`, the logical position callers see, and `position`, how
//! far the decoder has progressed. A forward seek discards decoder output
//! until the cursors meet; a backward seek rebuilds the decoder from the
//! start of the stream and replays. This keeps one handle at constant
//! extra memory instead of holding a decoded copy of the file, at the cost
//! of repeated work when callers seek backwards. HTTP serving reads from 0
//! or after a single forward seek, so the replay path is rare.

use crate::error::{EmbedError, Result};
use crate::store::node::{FileNode, Node, NodeInfo};
use bytes::Bytes;
use flate2::read::GzDecoder;
use std::io::{self, Cursor, Read, Seek, SeekFrom};
use std::sync::Arc;
use tracing::trace;

/// Open handle on an embedded node
pub struct Reader {
    node: Arc<Node>,
    entries: Vec<NodeInfo>,
    closed: bool,
    /// Decoder progress into the uncompressed stream
    position: u64,
    /// Logical read cursor
    seek: u64,
    /// Logical length; the stored length in raw mode
    length: u64,
    raw: bool,
    decoder: Option<GzDecoder<Cursor<Bytes>>>,
    dir_cursor: usize,
}

impl Reader {
    /// `entries` are the resolved children of a directory node
    pub(crate) fn new(node: Arc<Node>, entries: Vec<NodeInfo>) -> Self {
        let length = node.size();
        Self {
            node,
            entries,
            closed: false,
            position: 0,
            seek: 0,
            length,
            raw: false,
            decoder: None,
            dir_cursor: 0,
        }
    }

    fn check_open(&self) -> Result<()> {
        if self.closed {
            Err(EmbedError::closed())
        } else {
            Ok(())
        }
    }

    /// Serve the stored (compressed) bytes instead of decoding them
    ///
    /// No effect on uncompressed files or directories.
    pub fn use_raw(&mut self) {
        if let Node::File(file) = self.node.as_ref() {
            if file.compressed && !self.raw {
                self.raw = true;
                self.length = file.data.len() as u64;
                self.decoder = None;
                self.position = 0;
            }
        }
    }

    pub fn is_raw(&self) -> bool {
        self.raw
    }

    /// Number of bytes this handle yields from offset 0
    pub fn len(&self) -> u64 {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.check_open()?;
        let node = Arc::clone(&self.node);
        match node.as_ref() {
            Node::Directory(dir) => Err(EmbedError::IsADirectory(dir.path.clone())),
            Node::File(file) if file.compressed && !self.raw => self.read_decoded(file, buf),
            Node::File(file) => Ok(self.read_stored(&file.data, buf)),
        }
    }

    fn read_stored(&mut self, data: &[u8], buf: &mut [u8]) -> usize {
        let end = self.length.min(data.len() as u64);
        if self.seek >= end {
            return 0;
        }
        let start = self.seek as usize;
        let n = buf.len().min((end - self.seek) as usize);
        buf[..n].copy_from_slice(&data[start..start + n]);
        self.seek += n as u64;
        n
    }

    fn read_decoded(&mut self, file: &FileNode, buf: &mut [u8]) -> Result<usize> {
        let decode_err =
            |e: io::Error| EmbedError::DecompressionFailed(format!("{}: {}", file.path, e));

        if self.seek < self.position {
            trace!(path = %file.path, from = self.position, to = self.seek, "restarting decoder");
            self.decoder = None;
            self.position = 0;
        }

        let data = &file.data;
        let decoder = self
            .decoder
            .get_or_insert_with(|| GzDecoder::new(Cursor::new(data.clone())));

        if self.position < self.seek {
            let wanted = self.seek - self.position;
            let skipped = io::copy(&mut decoder.by_ref().take(wanted), &mut io::sink())
                .map_err(decode_err)?;
            self.position += skipped;
            if skipped < wanted {
                // Seeked past the end of the decoded stream
                return Ok(0);
            }
        }

        let n = decoder.read(buf).map_err(decode_err)?;
        self.position += n as u64;
        self.seek = self.position;
        Ok(n)
    }

    /// Move the logical cursor; the decoder catches up on the next read
    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        self.check_open()?;

        if self.node.is_dir() {
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

        let target = match pos {
            SeekFrom::Start(offset) => offset as i128,
            SeekFrom::Current(delta) => self.seek as i128 + delta as i128,
            SeekFrom::End(delta) => self.length as i128 + delta as i128,
        };

        if target < 0 {
            return Err(EmbedError::InvalidHandle("negative position".to_string()));
        }
        if target > u64::MAX as i128 {
            return Err(EmbedError::InvalidHandle("position overflow".to_string()));
        }

        self.seek = target as u64;
        Ok(self.seek)
    }

    /// Next `count` directory entries, or all remaining when `count <= 0`
    pub fn readdir(&mut self, count: isize) -> Result<Vec<NodeInfo>> {
        self.check_open()?;

        if let Node::File(file) = self.node.as_ref() {
            return Err(EmbedError::NotADirectory(file.path.clone()));
        }

        let remaining = self.entries.len() - self.dir_cursor;
        if remaining == 0 && count > 0 {
            return Err(EmbedError::EndOfDirectory);
        }

        let take = if count <= 0 {
            remaining
        } else {
            remaining.min(count as usize)
        };
        let list = self.entries[self.dir_cursor..self.dir_cursor + take].to_vec();
        self.dir_cursor += take;
        Ok(list)
    }

    pub fn stat(&self) -> Result<NodeInfo> {
        self.check_open()?;
        Ok(NodeInfo::embedded(Arc::clone(&self.node)))
    }

    /// Release the decoder; a second close is an error
    pub fn close(&mut self) -> Result<()> {
        self.check_open()?;
        self.closed = true;
        self.decoder = None;
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Read for Reader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Reader::read(self, buf).map_err(Into::into)
    }
}

impl Seek for Reader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        Reader::seek(self, pos).map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::node::DirNode;
    use flate2::{write::GzEncoder, Compression};
    use std::io::Write;

    fn content() -> Vec<u8> {
        (0..5000u32).map(|i| (i % 251) as u8).collect()
    }

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::best());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn compressed_reader() -> Reader {
        let data = content();
        let file = FileNode::new("/data.bin", gzip(&data)).with_compression(data.len() as u64);
        Reader::new(Arc::new(Node::File(file)), Vec::new())
    }

    fn plain_reader() -> Reader {
        Reader::new(Arc::new(Node::File(FileNode::new("/data.bin", content()))), Vec::new())
    }

    fn read_rest(reader: &mut Reader) -> Vec<u8> {
        let mut out = Vec::new();
        Read::read_to_end(reader, &mut out).unwrap();
        out
    }

    #[test]
    fn test_seek_laws_plain_and_compressed() {
        let expect = content();
        for mut reader in [plain_reader(), compressed_reader()] {
            // Forward seeks, then backward seeks forcing a decoder restart
            for k in [0usize, 1, 10, 4096, 4999, 5000, 2500, 3, 0] {
                assert_eq!(reader.seek(SeekFrom::Start(k as u64)).unwrap(), k as u64);
                assert_eq!(read_rest(&mut reader), &expect[k..], "offset {}", k);
            }
        }
    }

    #[test]
    fn test_seek_current_and_end() {
        let expect = content();
        let mut reader = compressed_reader();

        let mut head = [0u8; 100];
        reader.read_exact(&mut head).unwrap();
        assert_eq!(&head[..], &expect[..100]);

        assert_eq!(reader.seek(SeekFrom::Current(50)).unwrap(), 150);
        assert_eq!(read_rest(&mut reader), &expect[150..]);

        assert_eq!(reader.seek(SeekFrom::End(-10)).unwrap(), 4990);
        assert_eq!(read_rest(&mut reader), &expect[4990..]);

        assert!(reader.seek(SeekFrom::End(-5001)).is_err());
        assert!(reader.seek(SeekFrom::Current(-100_000)).is_err());
    }

    #[test]
    fn test_seek_past_end() {
        let mut reader = compressed_reader();
        reader.seek(SeekFrom::Start(10_000)).unwrap();
        assert!(read_rest(&mut reader).is_empty());

        let mut reader = plain_reader();
        reader.seek(SeekFrom::Start(10_000)).unwrap();
        assert!(read_rest(&mut reader).is_empty());
    }

    #[test]
    fn test_raw_mode() {
        let data = content();
        let gz = gzip(&data);
        let mut reader = compressed_reader();
        reader.use_raw();
        assert!(reader.is_raw());
        assert_eq!(reader.len(), gz.len() as u64);
        assert_eq!(read_rest(&mut reader), gz);

        assert_eq!(reader.seek(SeekFrom::End(-4)).unwrap(), gz.len() as u64 - 4);
        assert_eq!(read_rest(&mut reader), &gz[gz.len() - 4..]);

        // Raw mode means nothing for uncompressed files
        let mut reader = plain_reader();
        reader.use_raw();
        assert!(!reader.is_raw());
        assert_eq!(read_rest(&mut reader), data);
    }

    #[test]
    fn test_directory_semantics() {
        let children = ["/d/a", "/d/b", "/d/c"]
            .iter()
            .map(|p| NodeInfo::embedded(Arc::new(Node::File(FileNode::new(*p, Vec::new())))))
            .collect();
        let dir = DirNode::new("/d").with_children(["/d/a", "/d/b", "/d/c"]);
        let mut reader = Reader::new(Arc::new(Node::Directory(dir)), children);

        let mut buf = [0u8; 4];
        assert!(matches!(reader.read(&mut buf), Err(EmbedError::IsADirectory(_))));

        let first = reader.readdir(2).unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].name(), "a");
        let rest = reader.readdir(-1).unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].name(), "c");
        assert!(matches!(reader.readdir(1), Err(EmbedError::EndOfDirectory)));
        assert!(reader.readdir(0).unwrap().is_empty());

        assert!(reader.seek(SeekFrom::Current(10)).is_err());
        assert_eq!(reader.seek(SeekFrom::Start(0)).unwrap(), 0);
        assert_eq!(reader.readdir(0).unwrap().len(), 3);
    }

    #[test]
    fn test_readdir_on_file() {
        let mut reader = plain_reader();
        assert!(matches!(reader.readdir(-1), Err(EmbedError::NotADirectory(_))));
    }

    #[test]
    fn test_closed_handle() {
        let mut reader = compressed_reader();
        let mut buf = [0u8; 8];
        reader.read(&mut buf).unwrap();
        reader.close().unwrap();
        assert!(reader.is_closed());

        assert!(matches!(reader.stat(), Err(EmbedError::InvalidHandle(_))));
        assert!(matches!(reader.readdir(-1), Err(EmbedError::InvalidHandle(_))));
        assert!(matches!(reader.seek(SeekFrom::Start(0)), Err(EmbedError::InvalidHandle(_))));
        assert!(matches!(reader.read(&mut buf), Err(EmbedError::InvalidHandle(_))));
        assert!(matches!(reader.close(), Err(EmbedError::InvalidHandle(_))));
    }
}
