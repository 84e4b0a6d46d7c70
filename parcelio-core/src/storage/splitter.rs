use super::ByteStream;
use crate::error::{ParcelError, Result};
use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;

/// Regroups an arbitrary byte stream into fixed-size chunks.
///
/// Every chunk except the last is exactly `chunk_size` bytes. An empty
/// stream yields no chunks.
pub struct ChunkSplitter {
    stream: ByteStream,
    chunk_size: usize,
    buffer: BytesMut,
    finished: bool,
    total_bytes: u64,
}

impl ChunkSplitter {
    pub fn new(stream: ByteStream, chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(ParcelError::Config("chunk_size must be positive".to_string()));
        }

        Ok(Self {
            stream,
            chunk_size,
            buffer: BytesMut::with_capacity(chunk_size),
            finished: false,
            total_bytes: 0,
        })
    }

    /// Bytes read from the source so far.
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        while !self.finished && self.buffer.len() < self.chunk_size {
            match self.stream.next().await {
                Some(Ok(data)) => {
                    self.total_bytes += data.len() as u64;
                    self.buffer.extend_from_slice(&data);
                }
                Some(Err(error)) => return Err(ParcelError::Io(error)),
                None => self.finished = true,
            }
        }

        if self.buffer.is_empty() {
            return Ok(None);
        }

        let take = self.chunk_size.min(self.buffer.len());
        Ok(Some(self.buffer.split_to(take).freeze()))
    }
}
