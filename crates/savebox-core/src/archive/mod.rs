// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Storage backends.
//!
//! An [`Archive`] turns canonical field bytes into a [`LocationToken`] and
//! back. The serializer never looks inside a token; it stores it in the
//! meta-data document and hands it back on read.
//!
//! Backends keep their own physical-layout document
//! (`ArchiveMetaData-<prefix>.json`) next to the meta-data document, so the
//! semantic model and the on-disk layout can evolve separately.

mod binary;
mod memory;

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::SerializerConfig;
use crate::error::SaveboxError;
use crate::type_desc::TypeDescriptor;

pub use binary::{BinaryArchive, Checksum};
pub use memory::MemoryArchive;

/// Version written into every archive meta-data document.
pub const ARCHIVE_FORMAT_VERSION: u32 = 1;

/// File name of the archive meta-data document for `prefix`.
pub fn archive_meta_data_file_name(prefix: &str) -> String {
    format!("ArchiveMetaData-{prefix}.json")
}

/// Full path of the archive meta-data document.
pub fn archive_meta_data_path(directory: &Path, prefix: &str) -> PathBuf {
    directory.join(archive_meta_data_file_name(prefix))
}

/// Where the bytes of one (field, savepoint) pair live.
///
/// Every backend uses the same shape: a file name relative to the archive
/// directory, a byte offset, and a byte length. The memory backend uses a
/// synthetic file name per field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocationToken {
    file: String,
    offset: u64,
    length: u64,
}

impl LocationToken {
    /// Creates a token.
    pub fn new(file: impl Into<String>, offset: u64, length: u64) -> Self {
        Self {
            file: file.into(),
            offset,
            length,
        }
    }

    /// File name, relative to the archive directory.
    pub fn file(&self) -> &str {
        &self.file
    }

    /// Byte offset of the entry.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Byte length of the entry.
    pub fn length(&self) -> u64 {
        self.length
    }
}

impl fmt::Display for LocationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}+{}", self.file, self.offset, self.length)
    }
}

/// How a serializer or archive was opened. Fixed for the lifetime of the handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpenMode {
    /// Existing documents are loaded; nothing is modified.
    Read,
    /// Any previous document set for the prefix is discarded.
    Write,
    /// Existing documents are loaded if present and extended.
    Append,
}

impl OpenMode {
    /// Lowercase name used in logs and errors.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Append => "append",
        }
    }

    /// `true` for Write and Append.
    pub const fn is_writable(self) -> bool {
        !matches!(self, Self::Read)
    }
}

impl fmt::Display for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Backend selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveKind {
    /// Flat binary files next to the meta-data document.
    #[default]
    Binary,
    /// Process memory only.
    Memory,
}

impl ArchiveKind {
    /// Lowercase name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Binary => "binary",
            Self::Memory => "memory",
        }
    }
}

impl fmt::Display for ArchiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Rejects prefixes that cannot name a document set.
///
/// A prefix becomes the leading component of every file name, so it may not
/// contain a path separator, NUL, or `.`. Without a `.` in the prefix, the
/// first `.` of a data file name marks where the prefix ends, and two
/// prefixes sharing a directory never claim the same file.
pub fn validate_prefix(prefix: &str) -> Result<(), SaveboxError> {
    if prefix.is_empty() || prefix.contains(['/', '\\', '\0', '.']) {
        return Err(SaveboxError::InvalidName(prefix.to_owned()));
    }
    Ok(())
}

/// Physical file layout of the binary backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileLayout {
    /// One file per field: `<prefix>.<field>.dat`.
    #[default]
    PerField,
    /// One shared file: `<prefix>.dat`.
    Single,
}

impl FileLayout {
    /// Data file that receives the bytes of `field`.
    pub fn file_name(self, prefix: &str, field: &str) -> String {
        match self {
            Self::PerField => format!("{prefix}.{field}.dat"),
            Self::Single => format!("{prefix}.dat"),
        }
    }
}

/// Storage backend.
///
/// `put` appends; it never overwrites an earlier entry, so every token handed
/// out stays valid for the lifetime of the archive. Implementations are not
/// internally synchronized.
pub trait Archive: fmt::Debug {
    /// Backend kind.
    fn kind(&self) -> ArchiveKind;

    /// Mode the archive was opened in.
    fn mode(&self) -> OpenMode;

    /// Stores the canonical bytes of one write of `field`.
    ///
    /// # Errors
    ///
    /// [`SaveboxError::InvalidMode`] in Read mode,
    /// [`SaveboxError::SizeMismatch`] if `bytes` is not
    /// `ty.num_bytes()` long, [`SaveboxError::Io`] on filesystem failure.
    fn put(
        &mut self,
        field: &str,
        bytes: &[u8],
        ty: &TypeDescriptor,
    ) -> Result<LocationToken, SaveboxError>;

    /// Retrieves the bytes behind `token`.
    ///
    /// # Errors
    ///
    /// [`SaveboxError::Format`] if the token is unknown to the archive or
    /// its length disagrees with `ty`, [`SaveboxError::ChecksumMismatch`]
    /// if the stored bytes were altered, [`SaveboxError::Io`] on filesystem
    /// failure.
    fn get(&self, token: &LocationToken, ty: &TypeDescriptor) -> Result<Vec<u8>, SaveboxError>;

    /// Persists the archive's own layout document. No-op in Read mode.
    fn flush(&mut self) -> Result<(), SaveboxError>;

    /// Number of stored entries.
    fn num_entries(&self) -> usize;
}

/// Opens the backend `kind` for `(directory, prefix)`.
///
/// In Read and Append mode an existing archive meta-data document must have
/// been written by the same kind of backend.
pub fn open_archive(
    kind: ArchiveKind,
    mode: OpenMode,
    directory: &Path,
    prefix: &str,
    config: &SerializerConfig,
) -> Result<Box<dyn Archive>, SaveboxError> {
    if mode != OpenMode::Write {
        if let Some(recorded) = recorded_kind(&archive_meta_data_path(directory, prefix))? {
            if recorded != kind {
                return Err(SaveboxError::Format(format!(
                    "archive for `{prefix}` was written by the {recorded} backend, not {kind}"
                )));
            }
        }
    }
    Ok(match kind {
        ArchiveKind::Binary => Box::new(BinaryArchive::open(
            mode,
            directory,
            prefix,
            config.layout,
            config.verify_checksums,
        )?),
        ArchiveKind::Memory => Box::new(MemoryArchive::open(mode, prefix)?),
    })
}

fn recorded_kind(path: &Path) -> Result<Option<ArchiveKind>, SaveboxError> {
    #[derive(Deserialize)]
    struct KindOnly {
        kind: ArchiveKind,
    }

    match fs::read(path) {
        Ok(bytes) => Ok(Some(serde_json::from_slice::<KindOnly>(&bytes)?.kind)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(SaveboxError::Io(err)),
    }
}

/// Rejects `bytes` that do not match the packed size of `ty`.
fn check_put_len(bytes: &[u8], ty: &TypeDescriptor) -> Result<(), SaveboxError> {
    if bytes.len() == ty.num_bytes() {
        Ok(())
    } else {
        Err(SaveboxError::SizeMismatch {
            expected: ty.num_bytes(),
            actual: bytes.len(),
        })
    }
}

/// Rejects a token whose length does not match the packed size of `ty`.
fn check_token_len(token: &LocationToken, ty: &TypeDescriptor) -> Result<(), SaveboxError> {
    if token.length() == ty.num_bytes() as u64 {
        Ok(())
    } else {
        Err(SaveboxError::Format(format!(
            "{token} holds {} bytes, {ty} needs {}",
            token.length(),
            ty.num_bytes()
        )))
    }
}
