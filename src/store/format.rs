//! On-disk format of the persistence store
//!
//! ```text
//! {"format":"livedoc-store","version":1,"length":123,"checksum":"<sha-256 hex>"}
//! { ...tables as JSON... }
//! ```
//!
//! The first line is a header describing the body that follows it. A store
//! passes its structural check only if the header parses, names a known
//! format and version, and the body has the recorded length and checksum
//! and deserializes into [`Tables`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io::{self, Write as _};
use std::path::Path;

pub const FORMAT_TAG: &str = "livedoc-store";
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShadowRow {
    pub content: String,
    pub is_dirty: bool,
    pub updated_at: DateTime<Utc>,
}

/// Typed preference value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum PreferenceValue {
    String(String),
    Number(f64),
    Bool(bool),
    Json(serde_json::Value),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRow {
    pub name: String,
    pub last_opened: DateTime<Utc>,
}

/// Every table of the store, keyed by primary key
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Tables {
    #[serde(default)]
    pub shadow_files: BTreeMap<String, ShadowRow>,
    #[serde(default)]
    pub app_state: BTreeMap<String, String>,
    #[serde(default)]
    pub preferences: BTreeMap<String, PreferenceValue>,
    #[serde(default)]
    pub projects: BTreeMap<String, ProjectRow>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Header {
    format: String,
    version: u32,
    length: usize,
    checksum: String,
}

#[derive(Debug)]
pub enum FormatError {
    Io(io::Error),
    MissingHeader,
    Header(serde_json::Error),
    UnknownFormat(String),
    UnsupportedVersion(u32),
    LengthMismatch { expected: usize, found: usize },
    ChecksumMismatch,
    Body(serde_json::Error),
}

impl std::fmt::Display for FormatError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "IO error: {}", e),
            Self::MissingHeader => write!(f, "store header missing"),
            Self::Header(e) => write!(f, "malformed store header: {}", e),
            Self::UnknownFormat(tag) => write!(f, "unknown store format {:?}", tag),
            Self::UnsupportedVersion(version) => write!(
                f,
                "store version {} is not supported (max: {})",
                version, FORMAT_VERSION
            ),
            Self::LengthMismatch { expected, found } => write!(
                f,
                "store body is {} bytes, header says {}",
                found, expected
            ),
            Self::ChecksumMismatch => write!(f, "store checksum mismatch"),
            Self::Body(e) => write!(f, "malformed store body: {}", e),
        }
    }
}

impl std::error::Error for FormatError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Header(e) | Self::Body(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for FormatError {
    fn from(e: io::Error) -> Self {
        FormatError::Io(e)
    }
}

fn checksum(body: &[u8]) -> String {
    hex::encode(Sha256::digest(body))
}

pub fn encode(tables: &Tables) -> Result<Vec<u8>, FormatError> {
    let body = serde_json::to_vec_pretty(tables).map_err(FormatError::Body)?;
    let header = Header {
        format: FORMAT_TAG.to_string(),
        version: FORMAT_VERSION,
        length: body.len(),
        checksum: checksum(&body),
    };
    let mut bytes = serde_json::to_vec(&header).map_err(FormatError::Header)?;
    bytes.push(b'\n');
    bytes.extend_from_slice(&body);
    Ok(bytes)
}

pub fn decode(bytes: &[u8]) -> Result<Tables, FormatError> {
    let newline = bytes
        .iter()
        .position(|&b| b == b'\n')
        .ok_or(FormatError::MissingHeader)?;
    let (header, body) = (&bytes[..newline], &bytes[newline + 1..]);

    let header: Header = serde_json::from_slice(header).map_err(FormatError::Header)?;
    if header.format != FORMAT_TAG {
        return Err(FormatError::UnknownFormat(header.format));
    }
    if header.version == 0 || header.version > FORMAT_VERSION {
        return Err(FormatError::UnsupportedVersion(header.version));
    }
    if header.length != body.len() {
        return Err(FormatError::LengthMismatch {
            expected: header.length,
            found: body.len(),
        });
    }
    if header.checksum != checksum(body) {
        return Err(FormatError::ChecksumMismatch);
    }
    serde_json::from_slice(body).map_err(FormatError::Body)
}

/// Structural check of a store file
pub fn verify_file(path: &Path) -> Result<Tables, FormatError> {
    let bytes = std::fs::read(path)?;
    decode(&bytes)
}

/// Replace `path` with `bytes` without ever leaving a partial file behind
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut temp_name = path.as_os_str().to_owned();
    temp_name.push(".tmp");
    let temp_path = std::path::PathBuf::from(temp_name);
    {
        let mut file = std::fs::File::create(&temp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    std::fs::rename(&temp_path, path)
}
