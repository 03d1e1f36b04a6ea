//! Staged install and uninstall of one title.
//!
//! Install runs TICKET, TITLEDIR, TMD and CONTENT in order, plus FINAL and
//! FINAL_DATA when verification is on. A failure stops at once; nothing is
//! retried. At most one file handle is open at a time and it is closed on
//! every exit path.

use crate::config::{
    InstallerConfig, RollbackPolicy, GENERIC_FAILURE_CODE, MAX_CONTENTS, VERIFY_MISMATCH_CODE,
};
use crate::error::{FsError, Result};
use crate::status::{status_code, InstallFailure, Stage};
use crate::storage::{FsResult, OpenMode, TitleStorage};
use crate::title::{FsPath, TitleLayout};
use log::{debug, error, info, warn};

/// Chunk size used when reading files back for verification.
const VERIFY_CHUNK: usize = 64 * 1024;

/// Outcome of an install or uninstall.
pub type InstallResult<T = ()> = std::result::Result<T, InstallFailure>;

/// Drives a [`TitleStorage`] through the install and uninstall sequences.
pub struct Installer<'a, S: TitleStorage + ?Sized> {
    storage: &'a mut S,
    layout: TitleLayout,
    rollback: RollbackPolicy,
    verify: bool,
}

impl<'a, S: TitleStorage + ?Sized> Installer<'a, S> {
    /// Create an installer with rollback and verification off.
    pub fn new(storage: &'a mut S, layout: TitleLayout) -> Self {
        Self {
            storage,
            layout,
            rollback: RollbackPolicy::Disabled,
            verify: false,
        }
    }

    /// Create an installer from a validated configuration.
    pub fn from_config(storage: &'a mut S, config: &InstallerConfig) -> Result<Self> {
        config.validate()?;
        let layout = TitleLayout::new(&config.volume, config.title_id)?;
        Ok(Self::new(storage, layout)
            .with_rollback(config.rollback)
            .with_verify(config.verify))
    }

    pub fn with_rollback(mut self, policy: RollbackPolicy) -> Self {
        self.rollback = policy;
        self
    }

    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    pub fn layout(&self) -> &TitleLayout {
        &self.layout
    }

    /// Install a title from its ticket, TMD and content blobs.
    ///
    /// Content item `i` is stored as `<i:08x>.app`. On failure, items after
    /// the failing one are never written. Rollback, when enabled, only runs
    /// once storage has been touched.
    pub fn install<C: AsRef<[u8]>>(
        &mut self,
        ticket: &[u8],
        tmd: &[u8],
        contents: &[C],
    ) -> InstallResult {
        info!(
            "Starting install of {} via {} storage",
            self.layout.title_id(),
            self.storage.name()
        );

        let result = self.run_install(ticket, tmd, contents);
        match &result {
            Ok(()) => info!("Install succeeded"),
            Err(failure) => {
                error!("Install failed: {}", failure);
                // INIT failures happen before any storage call.
                if failure.stage != Stage::Init {
                    self.roll_back();
                }
            }
        }
        result
    }

    /// Same as [`install`](Self::install), returning the packed status code.
    pub fn install_status<C: AsRef<[u8]>>(
        &mut self,
        ticket: &[u8],
        tmd: &[u8],
        contents: &[C],
    ) -> i32 {
        status_code(&self.install(ticket, tmd, contents))
    }

    /// Remove the ticket and the whole title tree.
    ///
    /// Ticket removal is best effort. A title that is not installed counts
    /// as success.
    pub fn uninstall(&mut self) -> InstallResult {
        let layout = &self.layout;
        info!("Uninstalling {}", layout.title_id());

        debug!("{} stage", Stage::DeleteTik);
        match self.storage.unlink(layout.ticket_path().as_str()) {
            Ok(()) => {}
            Err(FsError::NotFound) => info!("No ticket at {}", layout.ticket_path()),
            Err(e) => warn!("Could not delete ticket {}: {}", layout.ticket_path(), e),
        }

        debug!("{} stage", Stage::DeleteTitle);
        let result = match self.storage.remove(layout.title_path().as_str()) {
            Ok(()) => Ok(()),
            Err(FsError::NotFound) => {
                info!("Title directory {} not present", layout.title_path());
                Ok(())
            }
            Err(e) => Err(InstallFailure::from_fs(Stage::DeleteTitle, e)),
        };

        match &result {
            Ok(()) => info!("Uninstall succeeded"),
            Err(failure) => error!("Uninstall failed: {}", failure),
        }
        result
    }

    /// Same as [`uninstall`](Self::uninstall), returning the packed status code.
    pub fn uninstall_status(&mut self) -> i32 {
        status_code(&self.uninstall())
    }

    fn run_install<C: AsRef<[u8]>>(
        &mut self,
        ticket: &[u8],
        tmd: &[u8],
        contents: &[C],
    ) -> InstallResult {
        let storage = &mut *self.storage;
        let layout = &self.layout;

        if contents.len() > MAX_CONTENTS {
            error!(
                "{} content items exceed the limit of {}",
                contents.len(),
                MAX_CONTENTS
            );
            return Err(InstallFailure::new(Stage::Init, GENERIC_FAILURE_CODE));
        }

        info!("Writing ticket...");
        write_ticket(storage, layout, ticket).map_err(|e| fail(Stage::Ticket, e))?;

        info!("Creating title directory...");
        create_title_dirs(storage, layout).map_err(|e| fail(Stage::TitleDir, e))?;

        info!("Writing TMD...");
        write_whole(storage, layout.tmd_path(), tmd).map_err(|e| fail(Stage::Tmd, e))?;

        info!("Writing {} content item(s)...", contents.len());
        for (index, item) in contents.iter().enumerate() {
            let path = content_path(layout, index)?;
            write_whole(storage, &path, item.as_ref()).map_err(|e| fail(Stage::Content, e))?;
        }

        if self.verify {
            info!("Verifying installed files...");
            verify_files(storage, layout, ticket, tmd, contents)?;

            ensure_dir(storage, layout.data_dir()).map_err(|e| fail(Stage::FinalData, e))?;
        }

        Ok(())
    }

    fn roll_back(&mut self) {
        match self.rollback {
            RollbackPolicy::Disabled => {
                debug!("Rollback disabled, leaving partial install in place");
            }
            RollbackPolicy::RemoveAll => {
                warn!("Removing title and ticket after failed install");
                for path in [self.layout.title_path(), self.layout.ticket_path()] {
                    match self.storage.remove(path.as_str()) {
                        Ok(()) | Err(FsError::NotFound) => {}
                        Err(e) => warn!("Rollback could not remove {}: {}", path, e),
                    }
                }
            }
        }
    }
}

fn fail(stage: Stage, err: FsError) -> InstallFailure {
    InstallFailure::from_fs(stage, err)
}

/// Pass through every result except the tolerated failure.
fn tolerate(result: FsResult<()>, tolerated: FsError) -> FsResult<()> {
    match result {
        Err(e) if e == tolerated => Ok(()),
        other => other,
    }
}

fn content_path(layout: &TitleLayout, index: usize) -> InstallResult<FsPath> {
    u32::try_from(index)
        .ok()
        .and_then(|index| layout.content_path(index).ok())
        .ok_or(InstallFailure::new(Stage::Content, GENERIC_FAILURE_CODE))
}

fn write_ticket<S: TitleStorage + ?Sized>(
    storage: &mut S,
    layout: &TitleLayout,
    ticket: &[u8],
) -> FsResult<()> {
    tolerate(
        storage.unlink(layout.ticket_path().as_str()),
        FsError::NotFound,
    )?;
    tolerate(
        storage.make_dir(layout.ticket_folder().as_str()),
        FsError::AlreadyExists,
    )?;
    write_whole(storage, layout.ticket_path(), ticket)
}

/// Create the title tree, keeping an existing `data` directory.
fn create_title_dirs<S: TitleStorage + ?Sized>(
    storage: &mut S,
    layout: &TitleLayout,
) -> FsResult<()> {
    tolerate(
        storage.make_dir(layout.type_path().as_str()),
        FsError::AlreadyExists,
    )?;

    match storage.make_dir(layout.title_path().as_str()) {
        Ok(()) => {}
        Err(FsError::AlreadyExists) => {
            info!("Title directory already exists, deleting content...");
            tolerate(
                storage.remove(layout.content_dir().as_str()),
                FsError::NotFound,
            )?;
        }
        Err(e) => return Err(e),
    }

    if let Err(e) = tolerate(
        storage.make_dir(layout.data_dir().as_str()),
        FsError::AlreadyExists,
    ) {
        error!("Failed to create the data directory: {}", e);
        return Err(e);
    }

    // Absent at this point, so no tolerance.
    storage.make_dir(layout.content_dir().as_str())
}

/// Open, write `data` in one call, close.
fn write_whole<S: TitleStorage + ?Sized>(
    storage: &mut S,
    path: &FsPath,
    data: &[u8],
) -> FsResult<()> {
    debug!("Writing {} ({} bytes)", path, data.len());
    let handle = storage.open_file(path.as_str(), OpenMode::Write)?;

    let outcome = match storage.write_file(handle, data) {
        Ok(n) if n == data.len() => Ok(()),
        Ok(n) => Err(FsError::ShortWrite {
            expected: data.len(),
            written: n,
        }),
        Err(e) => Err(e),
    };

    match outcome {
        Ok(()) => storage.close_file(handle),
        Err(e) => {
            error!("Write to {} failed: {}", path, e);
            if let Err(close_err) = storage.close_file(handle) {
                warn!("Close of {} failed: {}", path, close_err);
            }
            Err(e)
        }
    }
}

/// Make sure a directory exists, recreating it if it went missing.
fn ensure_dir<S: TitleStorage + ?Sized>(storage: &mut S, path: &FsPath) -> FsResult<()> {
    match storage.make_dir(path.as_str()) {
        Err(FsError::AlreadyExists) => Ok(()),
        Ok(()) => {
            warn!("{} was missing after install and has been recreated", path);
            Ok(())
        }
        Err(e) => Err(e),
    }
}

fn verify_files<S: TitleStorage + ?Sized, C: AsRef<[u8]>>(
    storage: &mut S,
    layout: &TitleLayout,
    ticket: &[u8],
    tmd: &[u8],
    contents: &[C],
) -> InstallResult {
    let final_fail = |e| fail(Stage::Final, e);

    verify_file(storage, layout.ticket_path(), ticket).map_err(final_fail)?;
    verify_file(storage, layout.tmd_path(), tmd).map_err(final_fail)?;
    for (index, item) in contents.iter().enumerate() {
        let path = content_path(layout, index).map_err(|f| InstallFailure::new(Stage::Final, f.code))?;
        verify_file(storage, &path, item.as_ref()).map_err(final_fail)?;
    }
    Ok(())
}

/// Read a file back and compare it with `expected`.
fn verify_file<S: TitleStorage + ?Sized>(
    storage: &mut S,
    path: &FsPath,
    expected: &[u8],
) -> FsResult<()> {
    let handle = storage.open_file(path.as_str(), OpenMode::Read)?;

    let mut actual = Vec::with_capacity(expected.len());
    let mut chunk = vec![0u8; VERIFY_CHUNK];
    let outcome = loop {
        match storage.read_file(handle, &mut chunk) {
            Ok(0) => break Ok(()),
            Ok(n) => {
                actual.extend_from_slice(&chunk[..n]);
                // Longer than expected is already a mismatch.
                if actual.len() > expected.len() {
                    break Ok(());
                }
            }
            Err(e) => break Err(e),
        }
    };

    let outcome = outcome.and_then(|()| {
        if actual == expected {
            Ok(())
        } else {
            error!(
                "{} does not match: {} bytes read, {} expected",
                path,
                actual.len(),
                expected.len()
            );
            Err(FsError::Other(VERIFY_MISMATCH_CODE))
        }
    });

    match outcome {
        Ok(()) => storage.close_file(handle),
        Err(e) => {
            if let Err(close_err) = storage.close_file(handle) {
                warn!("Close of {} failed: {}", path, close_err);
            }
            Err(e)
        }
    }
}
