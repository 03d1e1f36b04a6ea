//! Direct storage binding onto a host directory.

use super::{FileHandle, FsResult, OpenMode, TitleStorage};
use crate::config::{validate_volume, GENERIC_FAILURE_CODE};
use crate::error::{Error, FsError, Result};
use log::debug;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Storage backend that maps `<volume>/...` paths onto a host directory.
pub struct LocalStorage {
    /// Host directory standing in for the volume root.
    root: PathBuf,
    volume: String,
    files: HashMap<i32, (File, OpenMode)>,
    next_handle: i32,
}

impl LocalStorage {
    /// Format an empty volume: create the root with its `title` and
    /// `ticket` system directories.
    pub fn create(root: &Path, volume: &str) -> Result<Self> {
        validate_volume(volume)?;
        fs::create_dir_all(root.join("title"))?;
        fs::create_dir_all(root.join("ticket"))?;
        Self::open(root, volume)
    }

    /// Attach to an existing volume root.
    pub fn open(root: &Path, volume: &str) -> Result<Self> {
        validate_volume(volume)?;
        if !root.is_dir() {
            return Err(Error::VolumeNotFound(root.to_path_buf()));
        }

        Ok(Self {
            root: root.to_path_buf(),
            volume: volume.to_string(),
            files: HashMap::new(),
            next_handle: 1,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of handles currently open.
    pub fn open_handles(&self) -> usize {
        self.files.len()
    }

    /// Translate a volume path into a host path.
    fn resolve(&self, path: &str) -> FsResult<PathBuf> {
        let rest = path
            .strip_prefix(self.volume.as_str())
            .ok_or(FsError::Other(GENERIC_FAILURE_CODE))?;
        if !rest.is_empty() && !rest.starts_with('/') {
            return Err(FsError::Other(GENERIC_FAILURE_CODE));
        }

        let mut host = self.root.clone();
        for component in rest.split('/').filter(|c| !c.is_empty()) {
            if component == "." || component == ".." || component.contains('\\') {
                return Err(FsError::Other(GENERIC_FAILURE_CODE));
            }
            host.push(component);
        }
        Ok(host)
    }

    fn file(&mut self, handle: FileHandle) -> FsResult<&mut (File, OpenMode)> {
        self.files
            .get_mut(&handle.as_raw())
            .ok_or(FsError::Other(GENERIC_FAILURE_CODE))
    }
}

impl TitleStorage for LocalStorage {
    fn make_dir(&mut self, path: &str) -> FsResult<()> {
        let host = self.resolve(path)?;
        debug!("mkdir {}", host.display());
        fs::create_dir(&host)?;
        Ok(())
    }

    fn open_file(&mut self, path: &str, mode: OpenMode) -> FsResult<FileHandle> {
        let host = self.resolve(path)?;
        let file = match mode {
            OpenMode::Read => File::open(&host)?,
            OpenMode::Write => File::create(&host)?,
        };

        let handle = FileHandle::from_raw(self.next_handle);
        self.next_handle = self.next_handle.wrapping_add(1).max(1);
        self.files.insert(handle.as_raw(), (file, mode));
        debug!("open {} ({:?}) -> {}", host.display(), mode, handle.as_raw());
        Ok(handle)
    }

    fn read_file(&mut self, handle: FileHandle, buf: &mut [u8]) -> FsResult<usize> {
        let (file, _) = self.file(handle)?;
        Ok(file.read(buf)?)
    }

    fn write_file(&mut self, handle: FileHandle, data: &[u8]) -> FsResult<usize> {
        let (file, mode) = self.file(handle)?;
        if *mode != OpenMode::Write {
            return Err(FsError::Other(GENERIC_FAILURE_CODE));
        }
        file.write_all(data)?;
        Ok(data.len())
    }

    fn close_file(&mut self, handle: FileHandle) -> FsResult<()> {
        let (file, mode) = self
            .files
            .remove(&handle.as_raw())
            .ok_or(FsError::Other(GENERIC_FAILURE_CODE))?;
        if mode == OpenMode::Write {
            file.sync_all()?;
        }
        Ok(())
    }

    fn remove(&mut self, path: &str) -> FsResult<()> {
        let host = self.resolve(path)?;
        debug!("remove {}", host.display());
        let metadata = fs::symlink_metadata(&host)?;
        if metadata.is_dir() {
            fs::remove_dir_all(&host)?;
        } else {
            fs::remove_file(&host)?;
        }
        Ok(())
    }

    fn unlink(&mut self, path: &str) -> FsResult<()> {
        let host = self.resolve(path)?;
        debug!("unlink {}", host.display());
        let metadata = fs::symlink_metadata(&host)?;
        if metadata.is_dir() {
            fs::remove_dir(&host)?;
        } else {
            fs::remove_file(&host)?;
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "local"
    }
}
