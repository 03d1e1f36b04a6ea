//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tempfile::TempDir;
use title_installer::storage::{FileHandle, FsResult, LocalStorage, OpenMode};
use title_installer::{FsError, TitleId, TitleLayout, TitleStorage};
use walkdir::WalkDir;

pub const VOLUME: &str = "slc:";
pub const TITLE: TitleId = TitleId::from_parts(0x0001_0001, 0x4F48_4243);

pub const TICKET_FILE: &str = "ticket/00010001/4f484243.tik";
pub const TITLE_DIR: &str = "title/00010001/4f484243";

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Fresh, formatted volume in a temp dir.
pub fn volume() -> (TempDir, LocalStorage) {
    init_logging();
    let dir = TempDir::new().expect("Failed to create temp dir");
    let storage = LocalStorage::create(dir.path(), VOLUME).expect("Failed to format volume");
    (dir, storage)
}

pub fn layout() -> TitleLayout {
    TitleLayout::new(VOLUME, TITLE).expect("Failed to build layout")
}

/// Content blobs with distinct, index-dependent bytes.
pub fn contents(count: usize) -> Vec<Vec<u8>> {
    (0..count)
        .map(|i| (0..100 + i * 13).map(|x| (x * 7 + i) as u8).collect())
        .collect()
}

/// All regular files under `root`, relative and sorted.
pub fn files_under(root: &Path) -> Vec<String> {
    let mut files: Vec<String> = WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            e.path()
                .strip_prefix(root)
                .unwrap()
                .to_string_lossy()
                .replace('\\', "/")
        })
        .collect();
    files.sort();
    files
}

pub fn read(root: &Path, rel: &str) -> Vec<u8> {
    fs::read(root.join(rel)).unwrap_or_else(|e| panic!("Failed to read {}: {}", rel, e))
}

/// Adapter operation kinds a fault can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    MakeDir,
    Open,
    Read,
    Write,
    Close,
    Remove,
    Unlink,
}

/// What an injected fault does.
#[derive(Debug, Clone, Copy)]
pub enum Fault {
    /// Fail the call with this status.
    Fail(FsError),
    /// Write one byte less than asked for and report it.
    ShortWrite,
    /// Write half the data but report success.
    SilentTruncate,
}

struct Rule {
    op: Op,
    suffix: String,
    /// Matching calls to let through before the fault fires.
    skip: usize,
    fault: Fault,
}

/// Wraps a storage, records every call and injects faults by path suffix.
pub struct FaultyStorage<S: TitleStorage> {
    inner: S,
    rules: Vec<Rule>,
    handles: HashMap<FileHandle, String>,
    /// `"<op> <path>"` for every call, in order.
    pub log: Vec<String>,
}

impl<S: TitleStorage> FaultyStorage<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            rules: Vec::new(),
            handles: HashMap::new(),
            log: Vec::new(),
        }
    }

    pub fn inject(self, op: Op, suffix: &str, fault: Fault) -> Self {
        self.inject_after(op, suffix, 0, fault)
    }

    /// Like [`inject`](Self::inject), but only after `skip` matching calls.
    pub fn inject_after(mut self, op: Op, suffix: &str, skip: usize, fault: Fault) -> Self {
        self.rules.push(Rule {
            op,
            suffix: suffix.to_string(),
            skip,
            fault,
        });
        self
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    /// Number of handles opened through this wrapper and not yet closed.
    pub fn open_handles(&self) -> usize {
        self.handles.len()
    }

    fn fault(&mut self, op: Op, path: &str) -> Option<Fault> {
        self.log.push(format!("{:?} {}", op, path));
        let rule = self
            .rules
            .iter_mut()
            .find(|r| r.op == op && path.ends_with(&r.suffix))?;
        if rule.skip > 0 {
            rule.skip -= 1;
            return None;
        }
        Some(rule.fault)
    }

    fn handle_path(&self, handle: FileHandle) -> String {
        self.handles.get(&handle).cloned().unwrap_or_default()
    }
}

impl<S: TitleStorage> TitleStorage for FaultyStorage<S> {
    fn make_dir(&mut self, path: &str) -> FsResult<()> {
        match self.fault(Op::MakeDir, path) {
            Some(Fault::Fail(e)) => Err(e),
            _ => self.inner.make_dir(path),
        }
    }

    fn open_file(&mut self, path: &str, mode: OpenMode) -> FsResult<FileHandle> {
        if let Some(Fault::Fail(e)) = self.fault(Op::Open, path) {
            return Err(e);
        }
        let handle = self.inner.open_file(path, mode)?;
        self.handles.insert(handle, path.to_string());
        Ok(handle)
    }

    fn read_file(&mut self, handle: FileHandle, buf: &mut [u8]) -> FsResult<usize> {
        let path = self.handle_path(handle);
        match self.fault(Op::Read, &path) {
            Some(Fault::Fail(e)) => Err(e),
            _ => self.inner.read_file(handle, buf),
        }
    }

    fn write_file(&mut self, handle: FileHandle, data: &[u8]) -> FsResult<usize> {
        let path = self.handle_path(handle);
        match self.fault(Op::Write, &path) {
            Some(Fault::Fail(e)) => Err(e),
            Some(Fault::ShortWrite) => {
                let short = data.len().saturating_sub(1);
                self.inner.write_file(handle, &data[..short])
            }
            Some(Fault::SilentTruncate) => {
                self.inner.write_file(handle, &data[..data.len() / 2])?;
                Ok(data.len())
            }
            None => self.inner.write_file(handle, data),
        }
    }

    fn close_file(&mut self, handle: FileHandle) -> FsResult<()> {
        let path = self.handles.remove(&handle).unwrap_or_default();
        match self.fault(Op::Close, &path) {
            Some(Fault::Fail(e)) => {
                // The handle is released either way.
                let _ = self.inner.close_file(handle);
                Err(e)
            }
            _ => self.inner.close_file(handle),
        }
    }

    fn remove(&mut self, path: &str) -> FsResult<()> {
        match self.fault(Op::Remove, path) {
            Some(Fault::Fail(e)) => Err(e),
            _ => self.inner.remove(path),
        }
    }

    fn unlink(&mut self, path: &str) -> FsResult<()> {
        match self.fault(Op::Unlink, path) {
            Some(Fault::Fail(e)) => Err(e),
            _ => self.inner.unlink(path),
        }
    }

    fn name(&self) -> &'static str {
        "faulty"
    }
}
