// Host-side memory bridge for WebAssembly modules.
//
// The bridge instantiates one module, satisfies its `console_log` /
// `console_error` imports, and gives the host typed access to the module's
// linear memory: allocation handles backed by the module's own allocator,
// read-only views, writes, and chunked stream ingestion.

use std::future::Future;
use std::io;
use std::path::PathBuf;

pub mod allocation;
pub mod bridge;
pub mod config;
pub mod host;
pub mod ingest;
pub mod memory;

#[cfg(test)]
pub(crate) mod testing;

pub use allocation::Allocation;
pub use bridge::Bridge;
pub use config::{BridgeConfig, OptLevel};
pub use host::{LogLevel, LogSink, TracingSink};
pub use ingest::{Blob, FileBlob, DEFAULT_CHUNK_SIZE};
pub use memory::Words;

/// Result alias used by the bridge.
pub type Result<T> = core::result::Result<T, Error>;

/// Failures surfaced by the bridge. Nothing is retried or swallowed.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The module bytes could not be fetched.
    #[error("failed to fetch module: {0}")]
    Fetch(#[source] io::Error),
    /// The module bytes are not a valid module.
    #[error("failed to compile module: {0}")]
    Compile(String),
    /// The module could not be linked against the host imports.
    #[error("failed to instantiate module: {0}")]
    Instantiate(String),
    /// A required export is absent or has the wrong signature.
    #[error("module is missing export `{0}`")]
    MissingExport(String),
    /// The module's init export trapped.
    #[error("module init failed: {0}")]
    Init(String),
    /// The module's allocator could not satisfy the request.
    #[error("allocation of {size} bytes (align {align}) failed: {reason}")]
    Allocation {
        size: u64,
        align: u32,
        reason: String,
    },
    /// Alignment must be a non-zero power of two.
    #[error("invalid alignment {0}")]
    InvalidAlignment(u32),
    /// A chunk would write past the end of the ingestion allocation.
    #[error("stream too large: {cursor} + {chunk} > {offset} + {size}")]
    StreamOverflow {
        cursor: u64,
        chunk: u64,
        offset: u32,
        size: u32,
    },
    /// The source ended before the ingestion allocation was filled.
    #[error("stream too small: {cursor} < {offset} + {size}")]
    StreamUnderflow { cursor: u64, offset: u32, size: u32 },
    /// The byte source reported an error while producing a chunk.
    #[error("byte source failed: {0}")]
    Source(#[from] io::Error),
    /// A view or write falls outside the current linear memory.
    #[error("range {offset}+{len} is outside linear memory of {memory} bytes")]
    OutOfRange { offset: u64, len: u64, memory: u64 },
    /// Word views must start on a 4-byte boundary.
    #[error("word view offset {offset} is not 4-byte aligned")]
    Misaligned { offset: u32 },
    /// A module export trapped while being called.
    #[error("call to `{export}` failed: {message}")]
    Call { export: String, message: String },
}

impl Error {
    /// True for every way loading a module can fail.
    pub fn is_load_failure(&self) -> bool {
        matches!(
            self,
            Error::Fetch(_)
                | Error::Compile(_)
                | Error::Instantiate(_)
                | Error::MissingExport(_)
                | Error::Init(_)
        )
    }
}

/// Source of module bytecode.
pub trait ModuleSource {
    /// Fetches the raw module bytes.
    fn fetch(&self) -> impl Future<Output = io::Result<Vec<u8>>> + Send;
}

impl ModuleSource for [u8] {
    async fn fetch(&self) -> io::Result<Vec<u8>> {
        Ok(self.to_vec())
    }
}

impl ModuleSource for Vec<u8> {
    async fn fetch(&self) -> io::Result<Vec<u8>> {
        Ok(self.clone())
    }
}

/// Module bytes stored at a fixed path on disk.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl ModuleSource for FileSource {
    async fn fetch(&self) -> io::Result<Vec<u8>> {
        tokio::fs::read(&self.path).await
    }
}
