//! Filesystem service answering [`SessionStorage`](super::SessionStorage) requests.

use super::protocol::{read_frame, write_frame, FsaRequest, FsaResponse};
use super::{FileHandle, TitleStorage};
use crate::config::FS_STATUS_OK;
use crate::error::Result;
use log::{debug, info, warn};
use std::collections::HashSet;
use std::io::{Read, Write};
use std::net::TcpListener;

/// Largest chunk returned for one read request.
const MAX_READ_CHUNK: u32 = 1024 * 1024;

/// Serves filesystem sessions against a backing storage.
///
/// Sessions are handled one at a time, in order of arrival.
pub struct FsaServer<S: TitleStorage> {
    storage: S,
    /// Handles opened by the current session.
    open: HashSet<FileHandle>,
}

impl<S: TitleStorage> FsaServer<S> {
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            open: HashSet::new(),
        }
    }

    pub fn into_inner(self) -> S {
        self.storage
    }

    /// Accept sessions forever.
    pub fn serve_listener(&mut self, listener: &TcpListener) -> Result<()> {
        for stream in listener.incoming() {
            let mut stream = stream?;
            let peer = stream
                .peer_addr()
                .map(|a| a.to_string())
                .unwrap_or_else(|_| "unknown".to_string());
            info!("session opened from {}", peer);
            if let Err(e) = self.serve(&mut stream) {
                warn!("session from {} ended with error: {}", peer, e);
            } else {
                info!("session from {} closed", peer);
            }
        }
        Ok(())
    }

    /// Serve one session until the client hangs up.
    ///
    /// Handles the client left open are closed when the session ends.
    pub fn serve<T: Read + Write>(&mut self, stream: &mut T) -> Result<()> {
        let result = self.serve_requests(stream);
        self.close_leftovers();
        result
    }

    fn serve_requests<T: Read + Write>(&mut self, stream: &mut T) -> Result<()> {
        while let Some(request) = read_frame::<_, FsaRequest>(stream)? {
            let response = self.handle(request);
            write_frame(stream, &response)?;
        }
        Ok(())
    }

    fn close_leftovers(&mut self) {
        for handle in self.open.drain() {
            warn!("closing handle {} left open by client", handle.as_raw());
            if let Err(e) = self.storage.close_file(handle) {
                warn!("close of handle {} failed: {}", handle.as_raw(), e);
            }
        }
    }

    /// Execute one request against the backing storage.
    pub fn handle(&mut self, request: FsaRequest<'_>) -> FsaResponse {
        debug!("{:?}", RequestSummary(&request));
        let storage = &mut self.storage;

        match request {
            FsaRequest::MakeDir { path } => status(storage.make_dir(&path)),
            FsaRequest::OpenFile { path, mode } => match storage.open_file(&path, mode) {
                Ok(handle) => {
                    self.open.insert(handle);
                    FsaResponse::Opened(handle)
                }
                Err(e) => FsaResponse::Status(e.code()),
            },
            FsaRequest::ReadFile { handle, len } => {
                let mut buf = vec![0u8; len.min(MAX_READ_CHUNK) as usize];
                match storage.read_file(handle, &mut buf) {
                    Ok(n) => {
                        buf.truncate(n);
                        FsaResponse::Data(buf)
                    }
                    Err(e) => FsaResponse::Status(e.code()),
                }
            }
            FsaRequest::WriteFile { handle, data } => match storage.write_file(handle, &data) {
                Ok(n) => FsaResponse::Written(u32::try_from(n).unwrap_or(u32::MAX)),
                Err(e) => FsaResponse::Status(e.code()),
            },
            FsaRequest::CloseFile { handle } => {
                self.open.remove(&handle);
                status(storage.close_file(handle))
            }
            FsaRequest::Remove { path } => status(storage.remove(&path)),
            FsaRequest::Unlink { path } => status(storage.unlink(&path)),
        }
    }
}

fn status(result: super::FsResult<()>) -> FsaResponse {
    FsaResponse::Status(match result {
        Ok(()) => FS_STATUS_OK,
        Err(e) => e.code(),
    })
}

/// Debug view of a request that omits write payloads.
struct RequestSummary<'a>(&'a FsaRequest<'a>);

impl std::fmt::Debug for RequestSummary<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            FsaRequest::WriteFile { handle, data } => {
                write!(f, "WriteFile {{ handle: {}, len: {} }}", handle.as_raw(), data.len())
            }
            other => write!(f, "{:?}", other),
        }
    }
}
