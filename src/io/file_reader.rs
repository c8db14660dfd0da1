use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use super::RangeReader;
use crate::error::IoError;

/// Local-file implementation of RangeReader.
///
/// The file size is read once on creation. Each read opens its own handle so
/// concurrent fetch tasks never contend on a shared cursor.
#[derive(Debug, Clone)]
pub struct FileRangeReader {
    path: PathBuf,
    size: u64,
    identifier: String,
}

impl FileRangeReader {
    /// Open a reader for `path`, failing if the file does not exist.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, IoError> {
        let path = path.as_ref().to_path_buf();
        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|e| map_io_error(&path, e))?;

        if !metadata.is_file() {
            return Err(IoError::File(format!("{} is not a file", path.display())));
        }

        let identifier = path.display().to_string();
        Ok(Self {
            path,
            size: metadata.len(),
            identifier,
        })
    }

    /// Path of the underlying file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl RangeReader for FileRangeReader {
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        if offset + len as u64 > self.size {
            return Err(IoError::RangeOutOfBounds {
                offset,
                requested: len as u64,
                size: self.size,
            });
        }

        if len == 0 {
            return Ok(Bytes::new());
        }

        let mut file = tokio::fs::File::open(&self.path)
            .await
            .map_err(|e| map_io_error(&self.path, e))?;
        file.seek(SeekFrom::Start(offset))
            .await
            .map_err(|e| map_io_error(&self.path, e))?;

        let mut buf = vec![0u8; len];
        file.read_exact(&mut buf)
            .await
            .map_err(|e| map_io_error(&self.path, e))?;

        Ok(Bytes::from(buf))
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}

fn map_io_error(path: &Path, err: std::io::Error) -> IoError {
    if err.kind() == std::io::ErrorKind::NotFound {
        IoError::NotFound(path.display().to_string())
    } else {
        IoError::File(format!("{}: {}", path.display(), err))
    }
}
