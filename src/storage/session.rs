//! Indirect storage binding through a session to a filesystem service.

use super::protocol::{frame_len, read_frame, write_frame, FsaRequest, FsaResponse};
use super::{FileHandle, FsResult, OpenMode, TitleStorage};
use crate::config::GENERIC_FAILURE_CODE;
use crate::error::{FsError, Result};
use log::{error, info};
use std::borrow::Cow;
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};

/// Storage backend that proxies every call to an [`FsaServer`](super::FsaServer).
///
/// The session is a single shared resource; calls are strictly
/// request/response. After a transport failure the session is marked broken
/// and every later call fails without touching the stream. A request too
/// large to frame is refused locally and leaves the session usable.
pub struct SessionStorage<T: Read + Write> {
    stream: T,
    broken: bool,
}

impl SessionStorage<TcpStream> {
    /// Open a TCP session to a filesystem service.
    pub fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        if let Ok(peer) = stream.peer_addr() {
            info!("storage session connected to {}", peer);
        }
        Ok(Self::new(stream))
    }
}

impl<T: Read + Write> SessionStorage<T> {
    pub fn new(stream: T) -> Self {
        Self {
            stream,
            broken: false,
        }
    }

    pub fn is_broken(&self) -> bool {
        self.broken
    }

    pub fn into_inner(self) -> T {
        self.stream
    }

    fn call(&mut self, request: &FsaRequest<'_>) -> FsResult<FsaResponse> {
        if self.broken {
            return Err(FsError::Other(GENERIC_FAILURE_CODE));
        }
        if let Err(e) = frame_len(request) {
            error!("storage request refused: {}", e);
            return Err(FsError::Other(GENERIC_FAILURE_CODE));
        }

        let response = write_frame(&mut self.stream, request)
            .and_then(|()| read_frame::<_, FsaResponse>(&mut self.stream));
        match response {
            Ok(Some(response)) => Ok(response),
            Ok(None) => {
                error!("storage session closed by server");
                self.broken = true;
                Err(FsError::Other(GENERIC_FAILURE_CODE))
            }
            Err(e) => {
                error!("storage session failed: {}", e);
                self.broken = true;
                Err(FsError::Other(GENERIC_FAILURE_CODE))
            }
        }
    }

    fn call_status(&mut self, request: &FsaRequest<'_>) -> FsResult<()> {
        match self.call(request)? {
            FsaResponse::Status(code) => match FsError::from_code(code) {
                None => Ok(()),
                Some(e) => Err(e),
            },
            other => Err(unexpected(other)),
        }
    }
}

fn failure(code: i32) -> FsError {
    FsError::from_code(code).unwrap_or(FsError::Other(GENERIC_FAILURE_CODE))
}

fn unexpected(response: FsaResponse) -> FsError {
    match response {
        FsaResponse::Status(code) => failure(code),
        _ => {
            error!("unexpected response from storage service");
            FsError::Other(GENERIC_FAILURE_CODE)
        }
    }
}

impl<T: Read + Write + Send> TitleStorage for SessionStorage<T> {
    fn make_dir(&mut self, path: &str) -> FsResult<()> {
        self.call_status(&FsaRequest::MakeDir {
            path: path.to_string(),
        })
    }

    fn open_file(&mut self, path: &str, mode: OpenMode) -> FsResult<FileHandle> {
        let request = FsaRequest::OpenFile {
            path: path.to_string(),
            mode,
        };
        match self.call(&request)? {
            FsaResponse::Opened(handle) => Ok(handle),
            other => Err(unexpected(other)),
        }
    }

    fn read_file(&mut self, handle: FileHandle, buf: &mut [u8]) -> FsResult<usize> {
        let len = u32::try_from(buf.len()).unwrap_or(u32::MAX);
        match self.call(&FsaRequest::ReadFile { handle, len })? {
            FsaResponse::Data(data) if data.len() <= buf.len() => {
                buf[..data.len()].copy_from_slice(&data);
                Ok(data.len())
            }
            other => Err(unexpected(other)),
        }
    }

    fn write_file(&mut self, handle: FileHandle, data: &[u8]) -> FsResult<usize> {
        let request = FsaRequest::WriteFile {
            handle,
            data: Cow::Borrowed(data),
        };
        match self.call(&request)? {
            FsaResponse::Written(n) => Ok(n as usize),
            other => Err(unexpected(other)),
        }
    }

    fn close_file(&mut self, handle: FileHandle) -> FsResult<()> {
        self.call_status(&FsaRequest::CloseFile { handle })
    }

    fn remove(&mut self, path: &str) -> FsResult<()> {
        self.call_status(&FsaRequest::Remove {
            path: path.to_string(),
        })
    }

    fn unlink(&mut self, path: &str) -> FsResult<()> {
        self.call_status(&FsaRequest::Unlink {
            path: path.to_string(),
        })
    }

    fn name(&self) -> &'static str {
        "session"
    }
}
