//! File ids and request locators.
//!
//! A [`FileId`] renders as `"<vid>,<key><cookie>"`: the key and cookie are
//! laid out big-endian (8 + 4 bytes), leading zero bytes of the key are
//! dropped (at least one key byte is kept), and the result is hex encoded.
//! `3,01637037d6` is volume 3, key `0x01`, cookie `0x637037d6`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypesError;
use crate::{Cookie, NeedleKey, VolumeId};

/// Hex digits taken by the cookie at the end of the key/cookie string.
const COOKIE_HEX_LEN: usize = 8;

/// Longest possible key/cookie string (8 key bytes + 4 cookie bytes).
const MAX_KEY_COOKIE_HEX_LEN: usize = 24;

/// External address of one needle: `(VolumeId, NeedleKey, Cookie)`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FileId {
    /// Volume holding the needle.
    pub volume_id: VolumeId,
    /// Needle key within the volume.
    pub key: NeedleKey,
    /// Capability that must match on delete.
    pub cookie: Cookie,
}

impl FileId {
    /// Assemble a file id from its parts.
    pub fn new(volume_id: VolumeId, key: NeedleKey, cookie: Cookie) -> Self {
        Self {
            volume_id,
            key,
            cookie,
        }
    }

    /// Parse the `<key><cookie>` hex string that follows the comma.
    pub fn parse_key_cookie(s: &str) -> Result<(NeedleKey, Cookie), TypesError> {
        let invalid = |reason| TypesError::InvalidFileId {
            input: s.to_string(),
            reason,
        };

        if s.len() <= COOKIE_HEX_LEN {
            return Err(invalid("key hash is too short"));
        }
        if s.len() > MAX_KEY_COOKIE_HEX_LEN {
            return Err(invalid("key hash is too long"));
        }
        if !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(invalid("key hash is not hex"));
        }

        let split = s.len() - COOKIE_HEX_LEN;
        let key = u64::from_str_radix(&s[..split], 16).map_err(|_| invalid("bad key"))?;
        let cookie = u32::from_str_radix(&s[split..], 16).map_err(|_| invalid("bad cookie"))?;
        Ok((NeedleKey(key), Cookie(cookie)))
    }

    /// Render only the `<key><cookie>` part.
    pub fn key_cookie(&self) -> String {
        let mut bytes = [0u8; 12];
        bytes[..8].copy_from_slice(&self.key.0.to_be_bytes());
        bytes[8..].copy_from_slice(&self.cookie.0.to_be_bytes());

        let first_nonzero = bytes[..7].iter().take_while(|b| **b == 0).count();
        hex::encode(&bytes[first_nonzero..])
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.volume_id, self.key_cookie())
    }
}

impl fmt::Debug for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileId({self})")
    }
}

impl FromStr for FileId {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (vid, key_cookie) = s
            .split_once(',')
            .ok_or_else(|| TypesError::InvalidFileId {
                input: s.to_string(),
                reason: "missing comma",
            })?;
        let volume_id = vid.parse::<VolumeId>()?;
        let (key, cookie) = Self::parse_key_cookie(key_cookie)?;
        Ok(Self::new(volume_id, key, cookie))
    }
}

impl TryFrom<String> for FileId {
    type Error = TypesError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FileId> for String {
    fn from(value: FileId) -> Self {
        value.to_string()
    }
}

/// A needle address as it appears in a request path.
///
/// Three shapes are accepted:
///
/// - `/3,01637037d6` and `/3,01637037d6.jpg`
/// - `/3/01637037d6` and `/3/01637037d6.jpg`
/// - `/3/01637037d6/my_preferred_name.jpg`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
    /// Volume id text, not yet validated.
    pub volume: String,
    /// Key/cookie text with any extension removed.
    pub fid: String,
    /// File name carried in the path, if any.
    pub filename: Option<String>,
    /// Extension including the dot (`.jpg`), if any.
    pub ext: Option<String>,
}

impl Locator {
    /// Split a request path into its locator parts.
    pub fn from_path(path: &str) -> Result<Self, TypesError> {
        let trimmed = path.strip_prefix('/').unwrap_or(path);
        let parts: Vec<&str> = trimmed.split('/').collect();

        let locator = match parts.as_slice() {
            [vid, fid, filename] => Self {
                volume: (*vid).to_string(),
                fid: (*fid).to_string(),
                filename: Some((*filename).to_string()).filter(|f| !f.is_empty()),
                ext: extension(filename),
            },
            [vid, fid] => {
                let (fid, ext) = split_extension(fid);
                Self {
                    volume: (*vid).to_string(),
                    fid: fid.to_string(),
                    filename: None,
                    ext,
                }
            }
            [single] => {
                let (vid, fid) = single
                    .split_once(',')
                    .ok_or_else(|| TypesError::InvalidLocator(path.to_string()))?;
                let (fid, ext) = split_extension(fid);
                Self {
                    volume: vid.to_string(),
                    fid: fid.to_string(),
                    filename: None,
                    ext,
                }
            }
            _ => return Err(TypesError::InvalidLocator(path.to_string())),
        };

        if locator.volume.is_empty() || locator.fid.is_empty() {
            return Err(TypesError::InvalidLocator(path.to_string()));
        }
        Ok(locator)
    }

    /// Parse the volume part.
    pub fn volume_id(&self) -> Result<VolumeId, TypesError> {
        self.volume.parse()
    }

    /// Parse the full file id.
    pub fn file_id(&self) -> Result<FileId, TypesError> {
        let volume_id = self.volume_id()?;
        let (key, cookie) = FileId::parse_key_cookie(&self.fid)?;
        Ok(FileId::new(volume_id, key, cookie))
    }
}

fn split_extension(fid: &str) -> (&str, Option<String>) {
    match fid.rfind('.') {
        Some(dot) => (&fid[..dot], Some(fid[dot..].to_string())),
        None => (fid, None),
    }
}

fn extension(filename: &str) -> Option<String> {
    filename.rfind('.').map(|dot| filename[dot..].to_string())
}
