//! Install stages and the packed status code handed to callers.
//!
//! Internally a failure is an [`InstallFailure`] carrying the stage and the
//! adapter's raw code. Callers that expect a single integer get it from
//! [`InstallFailure::to_status_code`]:
//!
//! ```text
//! status = clamp(code) - stage * 0x100000      (0 on success)
//! stage  = (-status) / 0x100000
//! code   = status + stage * 0x100000
//! ```

use crate::config::{GENERIC_FAILURE_CODE, MIN_ENCODABLE_CODE, STAGE_SHIFT};
use crate::error::FsError;
use std::fmt;
use thiserror::Error;

/// How far an install or uninstall progressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Stage {
    Init = 1,
    Ticket = 2,
    TitleDir = 3,
    Tmd = 4,
    Content = 5,
    Final = 6,
    FinalData = 7,
    DeleteTik = 8,
    DeleteTitle = 9,
}

impl Stage {
    pub const ALL: [Stage; 9] = [
        Stage::Init,
        Stage::Ticket,
        Stage::TitleDir,
        Stage::Tmd,
        Stage::Content,
        Stage::Final,
        Stage::FinalData,
        Stage::DeleteTik,
        Stage::DeleteTitle,
    ];

    pub fn number(self) -> i32 {
        self as i32
    }

    pub fn from_number(n: i32) -> Option<Self> {
        Self::ALL.iter().copied().find(|s| s.number() == n)
    }

    pub fn name(self) -> &'static str {
        match self {
            Stage::Init => "INIT",
            Stage::Ticket => "TICKET",
            Stage::TitleDir => "TITLEDIR",
            Stage::Tmd => "TMD",
            Stage::Content => "CONTENT",
            Stage::Final => "FINAL",
            Stage::FinalData => "FINAL_DATA",
            Stage::DeleteTik => "DELETE_TIK",
            Stage::DeleteTitle => "DELETE_TITLE",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A failed install or uninstall: where it stopped and why.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("{stage} stage failed with code {}", signed_hex(.code))]
pub struct InstallFailure {
    pub stage: Stage,
    /// Underlying adapter code, always negative.
    pub code: i32,
}

impl InstallFailure {
    pub fn new(stage: Stage, code: i32) -> Self {
        Self { stage, code }
    }

    pub fn from_fs(stage: Stage, err: FsError) -> Self {
        Self::new(stage, err.code())
    }

    /// Code as it appears in the packed status (after clamping).
    pub fn clamped_code(&self) -> i32 {
        if self.code < MIN_ENCODABLE_CODE {
            GENERIC_FAILURE_CODE
        } else {
            self.code
        }
    }

    /// Pack stage and code into one integer.
    ///
    /// A non-negative underlying code packs to `0`.
    pub fn to_status_code(&self) -> i32 {
        let code = self.clamped_code();
        if code >= 0 {
            return 0;
        }
        code - self.stage.number() * STAGE_SHIFT
    }

    /// Recover stage and code from a packed status.
    ///
    /// Returns `None` for success and for integers that do not decode to a
    /// known stage.
    pub fn from_status_code(status: i32) -> Option<Self> {
        if status >= 0 {
            return None;
        }
        let stage_number = i32::try_from(-(status as i64) / STAGE_SHIFT as i64).ok()?;
        let stage = Stage::from_number(stage_number)?;
        let code = status + stage_number * STAGE_SHIFT;
        if code >= 0 {
            return None;
        }
        Some(Self::new(stage, code))
    }
}

fn signed_hex(code: &i32) -> String {
    if *code < 0 {
        format!("-{:#x}", -(*code as i64))
    } else {
        format!("{:#x}", code)
    }
}

/// Packed status for a whole operation result: `0` on success.
pub fn status_code(result: &Result<(), InstallFailure>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(failure) => failure.to_status_code(),
    }
}
