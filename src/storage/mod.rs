//! Storage access layer.
//!
//! This module handles:
//! - The filesystem capability the installer is written against
//! - A direct binding onto a host directory
//! - An indirect binding that proxies through a session to a filesystem service

mod local;
pub(crate) mod protocol;
mod server;
mod session;

pub use local::LocalStorage;
pub use protocol::{FsaRequest, FsaResponse};
pub use server::FsaServer;
pub use session::SessionStorage;

use crate::error::FsError;
use serde::{Deserialize, Serialize};

/// Result of a storage adapter call.
pub type FsResult<T> = std::result::Result<T, FsError>;

/// Opaque handle to an open file on a storage backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileHandle(i32);

impl FileHandle {
    pub const fn from_raw(raw: i32) -> Self {
        Self(raw)
    }

    pub const fn as_raw(&self) -> i32 {
        self.0
    }
}

/// How a file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpenMode {
    /// Read an existing file.
    Read,
    /// Create or truncate, then write.
    Write,
}

/// Filesystem capability against a named volume.
///
/// Every call blocks until the storage completes it. No call panics; every
/// failure is reported as an [`FsError`] so callers can tell
/// "already exists" and "not found" apart from real faults.
pub trait TitleStorage: Send {
    /// Create a directory. The parent must exist.
    fn make_dir(&mut self, path: &str) -> FsResult<()>;

    /// Open a file.
    fn open_file(&mut self, path: &str, mode: OpenMode) -> FsResult<FileHandle>;

    /// Read up to `buf.len()` bytes. Returns 0 at end of file.
    fn read_file(&mut self, handle: FileHandle, buf: &mut [u8]) -> FsResult<usize>;

    /// Write `data` in one call. Returns the number of bytes written.
    fn write_file(&mut self, handle: FileHandle, data: &[u8]) -> FsResult<usize>;

    /// Close a handle.
    fn close_file(&mut self, handle: FileHandle) -> FsResult<()>;

    /// Remove a file, or a directory together with everything in it.
    fn remove(&mut self, path: &str) -> FsResult<()>;

    /// Remove a single file or an empty directory.
    fn unlink(&mut self, path: &str) -> FsResult<()>;

    /// Get the name of this backend (for logging).
    fn name(&self) -> &'static str;
}
