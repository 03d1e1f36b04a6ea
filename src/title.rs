//! Title identifiers and the storage layout derived from them.

use crate::config::{validate_volume, MAX_PATH_LEN};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A 64-bit title identifier.
///
/// The high half is the title type, the low half the unique id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TitleId(u64);

impl TitleId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn from_parts(hi: u32, lo: u32) -> Self {
        Self(((hi as u64) << 32) | lo as u64)
    }

    pub const fn raw(&self) -> u64 {
        self.0
    }

    /// Title type (top 32 bits).
    pub const fn hi(&self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Unique id (bottom 32 bits).
    pub const fn lo(&self) -> u32 {
        (self.0 & 0xFFFF_FFFF) as u32
    }
}

impl FromStr for TitleId {
    type Err = Error;

    /// Accepts `000100014f484243`, `0x000100014f484243` or `00010001-4f484243`.
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);

        if let Some((hi, lo)) = digits.split_once('-') {
            let hi = parse_half(hi, s)?;
            let lo = parse_half(lo, s)?;
            return Ok(Self::from_parts(hi, lo));
        }

        if digits.is_empty() || digits.len() > 16 {
            return Err(Error::InvalidTitleId(s.to_string()));
        }
        u64::from_str_radix(digits, 16)
            .map(Self)
            .map_err(|_| Error::InvalidTitleId(s.to_string()))
    }
}

fn parse_half(half: &str, original: &str) -> Result<u32> {
    if half.is_empty() || half.len() > 8 {
        return Err(Error::InvalidTitleId(original.to_string()));
    }
    u32::from_str_radix(half, 16).map_err(|_| Error::InvalidTitleId(original.to_string()))
}

impl fmt::Display for TitleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl TryFrom<String> for TitleId {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<TitleId> for String {
    fn from(id: TitleId) -> Self {
        id.to_string()
    }
}

/// A storage path of bounded length.
///
/// Construction fails instead of truncating when the path is too long.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FsPath(String);

impl FsPath {
    pub fn new(path: impl Into<String>) -> Result<Self> {
        let path = path.into();
        if path.len() > MAX_PATH_LEN {
            return Err(Error::PathTooLong {
                len: path.len(),
                max: MAX_PATH_LEN,
                path,
            });
        }
        Ok(Self(path))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for FsPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FsPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Every path an install or uninstall touches for one title.
#[derive(Debug, Clone)]
pub struct TitleLayout {
    volume: String,
    title_id: TitleId,
    title_path: FsPath,
    type_path: FsPath,
    ticket_path: FsPath,
    ticket_folder: FsPath,
    content_dir: FsPath,
    data_dir: FsPath,
    tmd_path: FsPath,
}

impl TitleLayout {
    pub fn new(volume: &str, title_id: TitleId) -> Result<Self> {
        validate_volume(volume)?;

        let (hi, lo) = (title_id.hi(), title_id.lo());
        let title_path = FsPath::new(format!("{}/title/{:08x}/{:08x}", volume, hi, lo))?;

        Ok(Self {
            volume: volume.to_string(),
            title_id,
            type_path: FsPath::new(format!("{}/title/{:08x}", volume, hi))?,
            ticket_path: FsPath::new(format!("{}/ticket/{:08x}/{:08x}.tik", volume, hi, lo))?,
            ticket_folder: FsPath::new(format!("{}/ticket/{:08x}", volume, hi))?,
            content_dir: FsPath::new(format!("{}/content", title_path))?,
            data_dir: FsPath::new(format!("{}/data", title_path))?,
            tmd_path: FsPath::new(format!("{}/content/title.tmd", title_path))?,
            title_path,
        })
    }

    pub fn volume(&self) -> &str {
        &self.volume
    }

    pub fn title_id(&self) -> TitleId {
        self.title_id
    }

    /// `<volume>/title/<hi>/<lo>`
    pub fn title_path(&self) -> &FsPath {
        &self.title_path
    }

    /// `<volume>/title/<hi>`, the title-type parent directory.
    pub fn type_path(&self) -> &FsPath {
        &self.type_path
    }

    /// `<volume>/ticket/<hi>/<lo>.tik`
    pub fn ticket_path(&self) -> &FsPath {
        &self.ticket_path
    }

    /// `<volume>/ticket/<hi>`
    pub fn ticket_folder(&self) -> &FsPath {
        &self.ticket_folder
    }

    pub fn content_dir(&self) -> &FsPath {
        &self.content_dir
    }

    pub fn data_dir(&self) -> &FsPath {
        &self.data_dir
    }

    pub fn tmd_path(&self) -> &FsPath {
        &self.tmd_path
    }

    /// `<title_path>/content/<index:08x>.app`
    pub fn content_path(&self, index: u32) -> Result<FsPath> {
        FsPath::new(format!("{}/{:08x}.app", self.content_dir, index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_halves() {
        let id = TitleId::new(0x0001_0001_4F48_4243);
        assert_eq!(id.hi(), 0x0001_0001);
        assert_eq!(id.lo(), 0x4F48_4243);
        assert_eq!(TitleId::from_parts(0x0001_0001, 0x4F48_4243), id);
    }

    #[test]
    fn test_parse_forms() {
        let expected = TitleId::new(0x0001_0001_4F48_4243);
        assert_eq!("000100014f484243".parse::<TitleId>().unwrap(), expected);
        assert_eq!("0x000100014F484243".parse::<TitleId>().unwrap(), expected);
        assert_eq!("00010001-4f484243".parse::<TitleId>().unwrap(), expected);
        assert_eq!(expected.to_string(), "000100014f484243");
    }

    #[test]
    fn test_parse_invalid() {
        assert!("".parse::<TitleId>().is_err());
        assert!("xyz".parse::<TitleId>().is_err());
        assert!("00010001000100010".parse::<TitleId>().is_err());
        assert!("000100010-1".parse::<TitleId>().is_err());
        assert!("-4f484243".parse::<TitleId>().is_err());
    }

    #[test]
    fn test_layout_paths() {
        let layout = TitleLayout::new("slc:", TitleId::new(0x0001_0001_4F48_4243)).unwrap();
        assert_eq!(layout.title_path().as_str(), "slc:/title/00010001/4f484243");
        assert_eq!(layout.type_path().as_str(), "slc:/title/00010001");
        assert_eq!(
            layout.ticket_path().as_str(),
            "slc:/ticket/00010001/4f484243.tik"
        );
        assert_eq!(layout.ticket_folder().as_str(), "slc:/ticket/00010001");
        assert_eq!(
            layout.tmd_path().as_str(),
            "slc:/title/00010001/4f484243/content/title.tmd"
        );
        assert_eq!(
            layout.data_dir().as_str(),
            "slc:/title/00010001/4f484243/data"
        );
        assert_eq!(
            layout.content_path(0x1f).unwrap().as_str(),
            "slc:/title/00010001/4f484243/content/0000001f.app"
        );
    }

    #[test]
    fn test_longest_path_fits() {
        let volume = "v".repeat(crate::config::MAX_VOLUME_LEN);
        let layout = TitleLayout::new(&volume, TitleId::new(u64::MAX)).unwrap();
        let path = layout.content_path(u32::MAX).unwrap();
        assert_eq!(path.as_str().len(), MAX_PATH_LEN);
    }

    #[test]
    fn test_path_too_long_rejected() {
        let long = "x".repeat(MAX_PATH_LEN + 1);
        assert!(matches!(
            FsPath::new(long),
            Err(Error::PathTooLong { .. })
        ));
    }
}
