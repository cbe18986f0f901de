//! Replace-on-write file handle
//!
//! Content goes to a temporary file created next to the destination and is
//! renamed over it only on [`AtomicFile::commit`]. Dropping the handle before
//! commit removes the temporary file, so readers see either the previous file
//! or the complete new one.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::{EdgeManageError, Result};

pub struct AtomicFile {
    temp: NamedTempFile,
    dest: PathBuf,
}

impl AtomicFile {
    /// Open a temporary file in the destination's directory
    pub fn create(dest: impl AsRef<Path>) -> Result<Self> {
        let dest = dest.as_ref().to_path_buf();
        let dir = match dest.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let temp = tempfile::Builder::new()
            .prefix(".tmp-")
            .tempfile_in(&dir)
            .map_err(|e| EdgeManageError::persistence(&dest, e))?;

        Ok(Self { temp, dest })
    }

    /// Write the whole buffer
    pub fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        self.temp
            .write_all(buf)
            .map_err(|e| EdgeManageError::persistence(&self.dest, e))
    }

    /// Flush, fsync and rename over the destination
    pub fn commit(mut self) -> Result<()> {
        let dest = self.dest;
        self.temp
            .flush()
            .and_then(|_| self.temp.as_file().sync_all())
            .map_err(|e| EdgeManageError::persistence(&dest, e))?;

        self.temp
            .persist(&dest)
            .map_err(|e| EdgeManageError::persistence(&dest, e.error))?;

        Ok(())
    }

    pub fn destination(&self) -> &Path {
        &self.dest
    }
}

impl Write for AtomicFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.temp.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.temp.flush()
    }
}

/// Atomically replace `dest` with `contents`
pub fn write_atomic(dest: impl AsRef<Path>, contents: &[u8]) -> Result<()> {
    let mut file = AtomicFile::create(dest)?;
    file.write_all(contents)?;
    file.commit()
}
