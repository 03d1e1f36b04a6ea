//! Title Installer
//!
//! Installs a title into a console's internal storage, and removes it again,
//! by writing its ticket, title metadata (TMD) and content blobs into the
//! conventional directory layout keyed by the 64-bit title id.
//!
//! # Features
//!
//! - **Staged install**: TICKET, TITLEDIR, TMD and CONTENT run in order and stop on
//!   the first fatal error
//! - **Idempotent reinstall**: an existing installation is replaced while its `data`
//!   directory is kept
//! - **Packed status codes**: the failing stage and the storage error fit in one `i32`
//! - **Two storage backends**: a host directory, or a session to a remote filesystem
//!   service
//!
//! # Layout
//!
//! ```text
//! <volume>/ticket/<hi>/<lo>.tik
//! <volume>/title/<hi>/<lo>/content/title.tmd
//! <volume>/title/<hi>/<lo>/content/<index>.app
//! <volume>/title/<hi>/<lo>/data/
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use title_installer::storage::LocalStorage;
//! use title_installer::{Installer, TitleId, TitleLayout};
//! use std::path::Path;
//!
//! let mut storage = LocalStorage::open(Path::new("./slc"), "slc:").unwrap();
//! let layout = TitleLayout::new("slc:", TitleId::new(0x0001_0001_4F48_4243)).unwrap();
//!
//! let contents = vec![std::fs::read("00000000.app").unwrap()];
//! let status = Installer::new(&mut storage, layout).install_status(
//!     &std::fs::read("title.tik").unwrap(),
//!     &std::fs::read("title.tmd").unwrap(),
//!     &contents,
//! );
//! assert_eq!(status, 0);
//! ```

pub mod config;
pub mod error;
pub mod installer;
pub mod status;
pub mod storage;
pub mod title;

pub use config::{InstallerConfig, RollbackPolicy};
pub use error::{Error, FsError, Result};
pub use installer::{InstallResult, Installer};
pub use status::{status_code, InstallFailure, Stage};
pub use storage::TitleStorage;
pub use title::{FsPath, TitleId, TitleLayout};
