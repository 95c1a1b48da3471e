use std::ops::Range;
use thiserror::Error;

/// Chunk size for objects up to [`LARGE_OBJECT_THRESHOLD`].
pub const SMALL_CHUNK_SIZE: u64 = 5 * 1024 * 1024;
/// Chunk size for objects above [`LARGE_OBJECT_THRESHOLD`].
pub const LARGE_CHUNK_SIZE: u64 = 10 * 1024 * 1024;
pub const LARGE_OBJECT_THRESHOLD: u64 = 25 * 1024 * 1024;

/// Chunk size used for an object of `total_size` bytes.
pub fn chunk_size_for(total_size: u64) -> u64 {
    if total_size > LARGE_OBJECT_THRESHOLD {
        LARGE_CHUNK_SIZE
    } else {
        SMALL_CHUNK_SIZE
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    InProgress,
    Finished,
    Aborted,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("Transfer session is {0:?}, no further chunks accepted")]
    NotInProgress(SessionState),

    #[error("Chunk {index} has {actual} bytes, expected {expected}")]
    ChunkLengthMismatch { index: u64, expected: u64, actual: u64 },
}

/// Progress of one chunked download or upload.
///
/// The session only does bookkeeping; callers fetch or send the range it hands
/// out and report back how many bytes moved.
#[derive(Debug, Clone)]
pub struct TransferSession {
    total_size: u64,
    chunk_size: u64,
    current_chunk: u64,
    bytes_transferred: u64,
    state: SessionState,
}

impl TransferSession {
    pub fn new(total_size: u64) -> Self {
        Self::with_chunk_size(total_size, chunk_size_for(total_size))
    }

    /// Session with an explicit chunk size. A zero chunk size is treated as one byte.
    pub fn with_chunk_size(total_size: u64, chunk_size: u64) -> Self {
        let state = if total_size == 0 {
            SessionState::Finished
        } else {
            SessionState::InProgress
        };

        Self {
            total_size,
            chunk_size: chunk_size.max(1),
            current_chunk: 0,
            bytes_transferred: 0,
            state,
        }
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    pub fn current_chunk(&self) -> u64 {
        self.current_chunk
    }

    pub fn bytes_transferred(&self) -> u64 {
        self.bytes_transferred
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_finished(&self) -> bool {
        self.state == SessionState::Finished
    }

    /// Number of chunks the whole transfer takes.
    pub fn chunk_count(&self) -> u64 {
        self.total_size.div_ceil(self.chunk_size)
    }

    /// Byte range of the next chunk, or `None` once the session is no longer in progress.
    pub fn next_range(&self) -> Option<Range<u64>> {
        if self.state != SessionState::InProgress {
            return None;
        }
        let start = self.bytes_transferred;
        let end = (start + self.chunk_size).min(self.total_size);
        Some(start..end)
    }

    /// Record that the chunk from [`next_range`](Self::next_range) moved `len` bytes.
    ///
    /// A length other than the range length aborts the session.
    pub fn record_chunk(&mut self, len: u64) -> Result<(), SessionError> {
        let range = self
            .next_range()
            .ok_or(SessionError::NotInProgress(self.state))?;
        let expected = range.end - range.start;

        if len != expected {
            self.state = SessionState::Aborted;
            return Err(SessionError::ChunkLengthMismatch {
                index: self.current_chunk,
                expected,
                actual: len,
            });
        }

        self.bytes_transferred += len;
        self.current_chunk += 1;
        if self.bytes_transferred == self.total_size {
            self.state = SessionState::Finished;
        }
        Ok(())
    }

    /// Stop the session. A finished session stays finished.
    pub fn abort(&mut self) {
        if self.state == SessionState::InProgress {
            self.state = SessionState::Aborted;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MB: u64 = 1_000_000;

    #[test]
    fn test_chunk_size_table() {
        assert_eq!(chunk_size_for(10 * MB), 5_242_880);
        assert_eq!(chunk_size_for(30 * MB), 10_485_760);
        assert_eq!(chunk_size_for(LARGE_OBJECT_THRESHOLD), SMALL_CHUNK_SIZE);
        assert_eq!(chunk_size_for(LARGE_OBJECT_THRESHOLD + 1), LARGE_CHUNK_SIZE);
        assert_eq!(chunk_size_for(0), SMALL_CHUNK_SIZE);
    }

    #[test]
    fn test_session_walks_all_chunks() {
        let total = 12 * 1024 * 1024;
        let mut session = TransferSession::new(total);
        assert_eq!(session.chunk_count(), 3);

        let mut ranges = Vec::new();
        while let Some(range) = session.next_range() {
            session.record_chunk(range.end - range.start).unwrap();
            ranges.push(range);
        }

        assert_eq!(
            ranges,
            vec![
                0..SMALL_CHUNK_SIZE,
                SMALL_CHUNK_SIZE..2 * SMALL_CHUNK_SIZE,
                2 * SMALL_CHUNK_SIZE..total,
            ]
        );
        assert_eq!(session.current_chunk(), 3);
        assert_eq!(session.bytes_transferred(), total);
        assert!(session.is_finished());
    }

    #[test]
    fn test_chunk_size_constant_for_session() {
        let mut session = TransferSession::new(30 * MB);
        let size = session.chunk_size();
        session.record_chunk(size).unwrap();
        assert_eq!(session.chunk_size(), size);
        assert_eq!(session.next_range(), Some(size..2 * size));
    }

    #[test]
    fn test_length_mismatch_aborts() {
        let mut session = TransferSession::with_chunk_size(100, 40);
        session.record_chunk(40).unwrap();

        let err = session.record_chunk(39).unwrap_err();
        assert_eq!(
            err,
            SessionError::ChunkLengthMismatch {
                index: 1,
                expected: 40,
                actual: 39
            }
        );
        assert_eq!(session.state(), SessionState::Aborted);
        assert_eq!(session.next_range(), None);
        assert_eq!(session.bytes_transferred(), 40);
    }

    #[test]
    fn test_no_chunks_after_finish() {
        let mut session = TransferSession::with_chunk_size(10, 10);
        session.record_chunk(10).unwrap();
        assert_eq!(
            session.record_chunk(0),
            Err(SessionError::NotInProgress(SessionState::Finished))
        );

        session.abort();
        assert!(session.is_finished());
    }

    #[test]
    fn test_empty_object_is_finished() {
        let session = TransferSession::new(0);
        assert!(session.is_finished());
        assert_eq!(session.chunk_count(), 0);
        assert_eq!(session.next_range(), None);
    }

    #[test]
    fn test_abort_in_progress() {
        let mut session = TransferSession::new(1);
        session.abort();
        assert_eq!(session.state(), SessionState::Aborted);
        assert_eq!(session.next_range(), None);
    }
}
