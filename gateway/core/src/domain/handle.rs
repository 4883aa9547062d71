// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Open file handles returned by read and write operations.
//!
//! Each handle owns one `std::fs::File` and performs positional I/O on the
//! blocking pool. Calls on the same handle are serialized in arrival order by
//! a fair async mutex, so a transport that pipelines requests for one file
//! never sees them reordered.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug)]
struct Inner {
    file: Arc<File>,
    path: PathBuf,
    order: Mutex<()>,
}

impl Inner {
    fn new(file: File, path: PathBuf) -> Self {
        Self {
            file: Arc::new(file),
            path,
            order: Mutex::new(()),
        }
    }
}

/// Read handle.
#[derive(Debug)]
pub struct FileReader {
    inner: Inner,
}

impl FileReader {
    pub(crate) fn new(file: File, path: PathBuf) -> Self {
        Self {
            inner: Inner::new(file, path),
        }
    }

    /// Absolute path this handle was opened at.
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Read up to `len` bytes at `offset`. An empty result means end of file.
    pub async fn read_at(&self, offset: u64, len: usize) -> io::Result<Vec<u8>> {
        let _turn = self.inner.order.lock().await;
        let file = Arc::clone(&self.inner.file);
        tokio::task::spawn_blocking(move || {
            let mut buf = vec![0u8; len];
            let mut filled = 0;
            while filled < len {
                let n = positional_read(&file, &mut buf[filled..], offset + filled as u64)?;
                if n == 0 {
                    break;
                }
                filled += n;
            }
            buf.truncate(filled);
            Ok(buf)
        })
        .await
        .map_err(join_error)?
    }

    /// Read the whole file from the start.
    pub async fn read_to_end(&self) -> io::Result<Vec<u8>> {
        const CHUNK: usize = 64 * 1024;
        let mut out = Vec::new();
        loop {
            let chunk = self.read_at(out.len() as u64, CHUNK).await?;
            if chunk.is_empty() {
                return Ok(out);
            }
            out.extend_from_slice(&chunk);
        }
    }
}

/// Write handle. The file was created or truncated when the handle was
/// opened.
#[derive(Debug)]
pub struct FileWriter {
    inner: Inner,
}

impl FileWriter {
    pub(crate) fn new(file: File, path: PathBuf) -> Self {
        Self {
            inner: Inner::new(file, path),
        }
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Write all of `data` at `offset`, returning the byte count.
    pub async fn write_at(&self, offset: u64, data: Vec<u8>) -> io::Result<usize> {
        let _turn = self.inner.order.lock().await;
        let file = Arc::clone(&self.inner.file);
        tokio::task::spawn_blocking(move || {
            let mut written = 0;
            while written < data.len() {
                let n = positional_write(&file, &data[written..], offset + written as u64)?;
                if n == 0 {
                    return Err(io::Error::new(io::ErrorKind::WriteZero, "failed to write whole buffer"));
                }
                written += n;
            }
            Ok(written)
        })
        .await
        .map_err(join_error)?
    }

    /// Flush file contents to disk.
    pub async fn sync(&self) -> io::Result<()> {
        let _turn = self.inner.order.lock().await;
        let file = Arc::clone(&self.inner.file);
        tokio::task::spawn_blocking(move || file.sync_all())
            .await
            .map_err(join_error)?
    }
}

#[cfg(unix)]
fn positional_read(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    use std::os::unix::fs::FileExt;
    file.read_at(buf, offset)
}

#[cfg(windows)]
fn positional_read(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    use std::os::windows::fs::FileExt;
    file.seek_read(buf, offset)
}

#[cfg(unix)]
fn positional_write(file: &File, buf: &[u8], offset: u64) -> io::Result<usize> {
    use std::os::unix::fs::FileExt;
    file.write_at(buf, offset)
}

#[cfg(windows)]
fn positional_write(file: &File, buf: &[u8], offset: u64) -> io::Result<usize> {
    use std::os::windows::fs::FileExt;
    file.seek_write(buf, offset)
}

pub(crate) fn join_error(err: tokio::task::JoinError) -> io::Error {
    io::Error::other(format!("blocking task failed: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_positional_write_then_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.bin");
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .unwrap();
        let writer = FileWriter::new(file, path.clone());
        writer.write_at(0, b"hello".to_vec()).await.unwrap();
        writer.write_at(5, b" world".to_vec()).await.unwrap();
        writer.sync().await.unwrap();

        let reader = FileReader::new(std::fs::File::open(&path).unwrap(), path.clone());
        assert_eq!(reader.read_at(6, 5).await.unwrap(), b"world");
        assert_eq!(reader.read_at(100, 5).await.unwrap(), b"");
        assert_eq!(reader.read_to_end().await.unwrap(), b"hello world");
    }
}
