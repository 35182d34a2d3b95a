//! Copying sequential byte sources into module memory.
//!
//! One allocation sized to the whole payload is taken up front and each chunk
//! is written into it as it arrives, so the host never holds more than one
//! chunk of the payload at a time.

use std::io;
use std::path::Path;

use bytes::{Bytes, BytesMut};
use futures::stream::{self, BoxStream, Stream, StreamExt};
use tokio::io::AsyncReadExt;
use tracing::{debug, trace, warn};

use crate::{Allocation, Bridge, Error, Result};

/// Chunk size used by the provided [`Blob`] implementations.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// A payload of known size that can be read once as a stream of chunks.
pub trait Blob {
    type Stream: Stream<Item = io::Result<Bytes>>;

    /// Total number of bytes the stream will produce.
    fn size(&self) -> u64;

    fn stream(self) -> Self::Stream;
}

impl Blob for Bytes {
    type Stream = stream::Iter<std::vec::IntoIter<io::Result<Bytes>>>;

    fn size(&self) -> u64 {
        self.len() as u64
    }

    fn stream(self) -> Self::Stream {
        let chunks: Vec<io::Result<Bytes>> = (0..self.len())
            .step_by(DEFAULT_CHUNK_SIZE)
            .map(|start| Ok(self.slice(start..self.len().min(start + DEFAULT_CHUNK_SIZE))))
            .collect();
        stream::iter(chunks)
    }
}

/// A file read in fixed-size chunks.
#[derive(Debug)]
pub struct FileBlob {
    file: tokio::fs::File,
    size: u64,
    chunk_size: usize,
}

impl FileBlob {
    pub async fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = tokio::fs::File::open(path).await?;
        let size = file.metadata().await?.len();
        Ok(Self {
            file,
            size,
            chunk_size: DEFAULT_CHUNK_SIZE,
        })
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }
}

impl Blob for FileBlob {
    type Stream = BoxStream<'static, io::Result<Bytes>>;

    fn size(&self) -> u64 {
        self.size
    }

    fn stream(self) -> Self::Stream {
        let chunk_size = self.chunk_size;
        stream::try_unfold(self.file, move |mut file| async move {
            let mut buf = BytesMut::with_capacity(chunk_size);
            let read = file.read_buf(&mut buf).await?;
            Ok::<_, io::Error>((read > 0).then(|| (buf.freeze(), file)))
        })
        .boxed()
    }
}

/// Write position inside an ingestion allocation.
#[derive(Debug)]
struct Cursor {
    offset: u32,
    size: u32,
    written: u32,
}

impl Cursor {
    fn new(allocation: &Allocation) -> Self {
        Self {
            offset: allocation.offset(),
            size: allocation.size(),
            written: 0,
        }
    }

    fn position(&self) -> u64 {
        u64::from(self.offset) + u64::from(self.written)
    }

    /// Claims `len` more bytes and returns the absolute offset to write at.
    fn advance(&mut self, len: usize) -> Result<u32> {
        let remaining = self.size - self.written;
        match u32::try_from(len) {
            Ok(len) if len <= remaining => {
                let at = self.offset + self.written;
                self.written += len;
                Ok(at)
            }
            _ => Err(Error::StreamOverflow {
                cursor: self.position(),
                chunk: len as u64,
                offset: self.offset,
                size: self.size,
            }),
        }
    }

    fn finish(&self) -> Result<()> {
        if self.written < self.size {
            return Err(Error::StreamUnderflow {
                cursor: self.position(),
                offset: self.offset,
                size: self.size,
            });
        }
        Ok(())
    }
}

impl Bridge {
    /// Copies a whole blob into a fresh allocation.
    pub async fn ingest_from_blob<B: Blob>(&mut self, blob: B) -> Result<Allocation> {
        let size = blob.size();
        let size = u32::try_from(size).map_err(|_| Error::Allocation {
            size,
            align: 1,
            reason: "blob exceeds the 32-bit address space".to_string(),
        })?;
        self.ingest_from_stream(size, blob.stream()).await
    }

    /// Copies exactly `size` bytes from `source` into a fresh allocation.
    ///
    /// Chunks are written in order, each before the next is requested. On
    /// overflow, underflow or a source error the allocation is freed before
    /// the error is returned.
    #[tracing::instrument(level = "debug", skip(self, source))]
    pub async fn ingest_from_stream<S>(&mut self, size: u32, source: S) -> Result<Allocation>
    where
        S: Stream<Item = io::Result<Bytes>>,
    {
        let allocation = self.alloc_bytes(size)?;
        match self.fill(&allocation, source).await {
            Ok(()) => {
                debug!(offset = allocation.offset(), "ingested");
                Ok(allocation)
            }
            Err(err) => {
                let offset = allocation.offset();
                if let Err(free_err) = allocation.free(self) {
                    warn!(offset, error = %free_err, "failed to free allocation after ingestion error");
                }
                Err(err)
            }
        }
    }

    // Takes the source by value: it is dropped when this returns, on every path.
    async fn fill<S>(&mut self, allocation: &Allocation, source: S) -> Result<()>
    where
        S: Stream<Item = io::Result<Bytes>>,
    {
        futures::pin_mut!(source);
        let mut cursor = Cursor::new(allocation);

        while let Some(chunk) = source.next().await {
            let chunk = chunk?;
            if chunk.is_empty() {
                continue;
            }
            let at = cursor.advance(chunk.len())?;
            self.write_bytes(at, &chunk)?;
            trace!(at, len = chunk.len(), "chunk written");
        }

        cursor.finish()
    }
}
