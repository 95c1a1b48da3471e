use bytes::{Bytes, BytesMut};
use std::io;
use std::ops::Range;
use std::path::Path;
use tempfile::NamedTempFile;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt, SeekFrom};

/// Where downloaded bytes are held until they are sanitized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagingTarget {
    Memory,
    TempFile,
}

/// Scoped temporary file. The file is removed when the value is dropped.
#[derive(Debug)]
pub struct SpooledFile {
    file: NamedTempFile,
    len: u64,
}

impl SpooledFile {
    /// Create an empty temporary file in `dir`, or the system temp dir.
    pub fn new_in(dir: Option<&Path>) -> io::Result<Self> {
        let file = match dir {
            Some(dir) => tempfile::Builder::new()
                .prefix("cleanroom-")
                .suffix(".spool")
                .tempfile_in(dir)?,
            None => tempfile::Builder::new()
                .prefix("cleanroom-")
                .suffix(".spool")
                .tempfile()?,
        };
        Ok(Self { file, len: 0 })
    }

    /// Write a complete buffer to a new temporary file.
    pub async fn from_bytes(dir: Option<&Path>, data: &[u8]) -> io::Result<Self> {
        let mut spooled = Self::new_in(dir)?;
        spooled.append(data).await?;
        Ok(spooled)
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub async fn append(&mut self, data: &[u8]) -> io::Result<()> {
        let mut file = tokio::fs::OpenOptions::new()
            .append(true)
            .open(self.file.path())
            .await?;
        file.write_all(data).await?;
        file.flush().await?;
        self.len += data.len() as u64;
        Ok(())
    }

    pub async fn read_range(&self, range: Range<u64>) -> io::Result<Bytes> {
        check_range(&range, self.len)?;
        let mut file = tokio::fs::File::open(self.file.path()).await?;
        file.seek(SeekFrom::Start(range.start)).await?;
        let mut buf = vec![0u8; (range.end - range.start) as usize];
        file.read_exact(&mut buf).await?;
        Ok(Bytes::from(buf))
    }

    /// Blocking read of the whole file; for use on the blocking pool.
    pub fn read_all(&self) -> io::Result<Vec<u8>> {
        std::fs::read(self.file.path())
    }
}

/// Bytes held between download and upload.
#[derive(Debug)]
pub enum StagedContent {
    Memory(Bytes),
    Spooled(SpooledFile),
}

impl StagedContent {
    pub fn len(&self) -> u64 {
        match self {
            StagedContent::Memory(bytes) => bytes.len() as u64,
            StagedContent::Spooled(file) => file.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_spooled(&self) -> bool {
        matches!(self, StagedContent::Spooled(_))
    }

    pub async fn read_range(&self, range: Range<u64>) -> io::Result<Bytes> {
        match self {
            StagedContent::Memory(bytes) => {
                check_range(&range, bytes.len() as u64)?;
                Ok(bytes.slice(range.start as usize..range.end as usize))
            }
            StagedContent::Spooled(file) => file.read_range(range).await,
        }
    }

    /// Whole content as one buffer. Blocks on file I/O for spooled content.
    pub fn to_bytes(&self) -> io::Result<Bytes> {
        match self {
            StagedContent::Memory(bytes) => Ok(bytes.clone()),
            StagedContent::Spooled(file) => file.read_all().map(Bytes::from),
        }
    }
}

fn check_range(range: &Range<u64>, len: u64) -> io::Result<()> {
    if range.start > range.end || range.end > len {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("range {}..{} outside staged content of {} bytes", range.start, range.end, len),
        ));
    }
    Ok(())
}

/// Staging buffer being filled by a download.
pub(crate) enum StagingBuffer {
    Memory(BytesMut),
    Spooled(SpooledFile),
}

impl StagingBuffer {
    pub(crate) fn new(target: StagingTarget, capacity: u64, dir: Option<&Path>) -> io::Result<Self> {
        match target {
            StagingTarget::Memory => Ok(StagingBuffer::Memory(BytesMut::with_capacity(
                usize::try_from(capacity).unwrap_or(0),
            ))),
            StagingTarget::TempFile => Ok(StagingBuffer::Spooled(SpooledFile::new_in(dir)?)),
        }
    }

    pub(crate) async fn append(&mut self, chunk: &[u8]) -> io::Result<()> {
        match self {
            StagingBuffer::Memory(buf) => {
                buf.extend_from_slice(chunk);
                Ok(())
            }
            StagingBuffer::Spooled(file) => file.append(chunk).await,
        }
    }

    pub(crate) fn finish(self) -> StagedContent {
        match self {
            StagingBuffer::Memory(buf) => StagedContent::Memory(buf.freeze()),
            StagingBuffer::Spooled(file) => StagedContent::Spooled(file),
        }
    }
}
