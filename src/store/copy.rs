use crate::error::Result;
use crate::store::fs::EmbeddedFs;
use crate::store::walk::WalkControl;
use filetime::FileTime;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Directory permissions derived from a file mode: read bits also grant
/// execute, so `0o644` becomes `0o755`
pub fn dir_mode(mode: u32) -> u32 {
    let mode = mode & 0o777;
    ((mode & 0o444) >> 2) | mode
}

fn target_for(target: &Path, path: &str) -> PathBuf {
    let relative = path.trim_start_matches('/');
    if relative.is_empty() {
        target.to_path_buf()
    } else {
        target.join(relative)
    }
}

fn create_dirs(path: &Path, mode: u32) -> io::Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;
    builder.create(path)
}

fn set_permissions(path: &Path, mode: u32) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    }
    #[cfg(not(unix))]
    let _ = (path, mode);
    Ok(())
}

impl EmbeddedFs {
    /// Materialize the whole tree under `target`
    ///
    /// Files get `mode & 0o777` and their recorded modification time;
    /// directories get [`dir_mode`]. The first failure aborts the copy and
    /// leaves whatever was already written in place.
    pub fn copy<P: AsRef<Path>>(&self, target: P, mode: u32) -> Result<()> {
        let target = target.as_ref();
        let file_mode = mode & 0o777;
        let dir_mode = dir_mode(mode);
        let mut copied = 0usize;

        self.walk("/", |path, info| {
            let info = info?;
            let target_path = target_for(target, path);

            if info.is_dir() {
                create_dirs(&target_path, dir_mode)?;
                return Ok(WalkControl::Continue);
            }

            let mut file = self.open(path)?;
            if let Some(parent) = target_path.parent() {
                create_dirs(parent, dir_mode)?;
            }

            let mut out = BufWriter::new(fs::File::create(&target_path)?);
            io::copy(&mut file, &mut out)?;
            out.flush()?;
            drop(out);
            file.close()?;

            let mtime = FileTime::from_unix_time(info.mod_time(), 0);
            filetime::set_file_times(&target_path, mtime, mtime)?;
            set_permissions(&target_path, file_mode)?;

            debug!(path, target = %target_path.display(), "copied file");
            copied += 1;
            Ok(WalkControl::Continue)
        })?;

        info!(target = %target.display(), files = copied, "copied embedded tree");
        Ok(())
    }
}
