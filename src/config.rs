//! Configuration constants and types for the title installer.

use crate::error::{Error, Result};
use crate::title::TitleId;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default system volume holding the title and ticket trees.
pub const DEFAULT_VOLUME: &str = "slc:";

/// Default title identifier (type `00010001`, unique id `4f484243`).
pub const DEFAULT_TITLE_ID: u64 = 0x0001_0001_4F48_4243;

/// Status returned by the filesystem service on success.
pub const FS_STATUS_OK: i32 = 0;

/// Status for "target already exists".
pub const FS_STATUS_EXISTS: i32 = -0x30016;

/// Status for "target not found".
pub const FS_STATUS_NOT_FOUND: i32 = -0x30017;

/// Generic failure code. Also the sentinel that replaces out-of-range codes.
pub const GENERIC_FAILURE_CODE: i32 = -0x800;

/// Code reported when verification reads back different bytes.
pub const VERIFY_MISMATCH_CODE: i32 = -0x801;

/// Codes more negative than this are replaced by [`GENERIC_FAILURE_CODE`].
pub const MIN_ENCODABLE_CODE: i32 = -0x99999;

/// Multiplier placing the stage number above the underlying code.
pub const STAGE_SHIFT: i32 = 0x100000;

/// Longest accepted volume name.
pub const MAX_VOLUME_LEN: usize = 16;

/// Longest path template: `/title/<hi>/<lo>/content/<index>.app`.
pub const LONGEST_TEMPLATE_LEN: usize =
    "/title/".len() + 8 + "/".len() + 8 + "/content/".len() + 8 + ".app".len();

/// Maximum length of any path handed to a storage backend.
pub const MAX_PATH_LEN: usize = MAX_VOLUME_LEN + LONGEST_TEMPLATE_LEN;

/// Most content items a single install accepts.
pub const MAX_CONTENTS: usize = u16::MAX as usize;

/// Largest frame accepted on a storage session.
pub const MAX_FRAME_LEN: u32 = 512 * 1024 * 1024;

/// What to do with partially written title data when an install fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackPolicy {
    /// Leave everything written so far in place.
    #[default]
    Disabled,
    /// Remove the whole title tree and the ticket.
    ///
    /// This also deletes the `data` directory of an earlier installation.
    RemoveAll,
}

/// Configuration for an installer run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallerConfig {
    /// Title to install or uninstall.
    pub title_id: TitleId,

    /// Volume prefix for every derived path.
    pub volume: String,

    /// Failure cleanup policy.
    pub rollback: RollbackPolicy,

    /// Read every written file back after install.
    pub verify: bool,
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            title_id: TitleId::new(DEFAULT_TITLE_ID),
            volume: DEFAULT_VOLUME.to_string(),
            rollback: RollbackPolicy::default(),
            verify: false,
        }
    }
}

impl InstallerConfig {
    /// Load a configuration from a JSON file. Missing fields take defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validate_volume(&self.volume)
    }
}

/// Check that a volume name can prefix every derived path.
pub fn validate_volume(volume: &str) -> Result<()> {
    if volume.is_empty() {
        return Err(Error::InvalidVolume("volume must not be empty".to_string()));
    }
    if volume.contains('/') {
        return Err(Error::InvalidVolume(format!(
            "volume must not contain '/': {}",
            volume
        )));
    }
    if volume.len() > MAX_VOLUME_LEN {
        return Err(Error::InvalidVolume(format!(
            "volume longer than {} bytes: {}",
            MAX_VOLUME_LEN, volume
        )));
    }
    Ok(())
}
