// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Error type shared by every savebox layer.
//!
//! Each variant renders with a bracketed code prefix so log lines and test
//! failures can be grepped by kind without matching on prose.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by type construction, the codec, archives, and the serializer.
#[derive(Debug, Error)]
pub enum SaveboxError {
    /// Element kind, byte size, or a dimension is not a valid type descriptor.
    #[error("[INVALID_TYPE] {0}")]
    InvalidType(String),

    /// An annotation key already holds a value of a different type.
    #[error("[TYPE_MISMATCH] key `{key}` holds {existing}, cannot store {requested}")]
    TypeMismatch {
        /// Annotation key.
        key: String,
        /// Type name of the stored value.
        existing: &'static str,
        /// Type name of the rejected value.
        requested: &'static str,
    },

    /// Element width of a view differs from the registered byte size, or a
    /// packed buffer has the wrong length.
    #[error("[SIZE_MISMATCH] expected {expected} bytes, got {actual}")]
    SizeMismatch {
        /// Byte count required by the registered type.
        expected: usize,
        /// Byte count supplied by the caller.
        actual: usize,
    },

    /// The field was never registered.
    #[error("[FIELD_NOT_FOUND] field `{0}` is not registered")]
    FieldNotFound(String),

    /// No data exists for the field at this savepoint.
    #[error("[SAVEPOINT_NOT_FOUND] field `{field}` was not written at savepoint {savepoint}")]
    SavepointNotFound {
        /// Field name.
        field: String,
        /// Display form of the savepoint.
        savepoint: String,
    },

    /// The (field, savepoint) pair already has stored data.
    #[error("[DUPLICATE_WRITE] field `{field}` already written at savepoint {savepoint}")]
    DuplicateWrite {
        /// Field name.
        field: String,
        /// Display form of the savepoint.
        savepoint: String,
    },

    /// View dimensions disagree with the registered field dimensions.
    #[error("[SHAPE_MISMATCH] field `{field}` has dims {expected:?}, view has {actual:?}")]
    ShapeMismatch {
        /// Field name.
        field: String,
        /// Registered dimensions.
        expected: Vec<usize>,
        /// Dimensions of the caller's view.
        actual: Vec<usize>,
    },

    /// Read mode was requested but the meta-data document does not exist.
    #[error("[META_DATA_NOT_FOUND] {}", .0.display())]
    MetaDataNotFound(PathBuf),

    /// Read mode was requested but the archive meta-data document does not exist.
    #[error("[ARCHIVE_META_DATA_NOT_FOUND] {}", .0.display())]
    ArchiveMetaDataNotFound(PathBuf),

    /// Underlying filesystem failure.
    #[error("[IO] {0}")]
    Io(#[from] io::Error),

    /// A persisted document or stored entry is malformed or inconsistent.
    #[error("[FORMAT] {0}")]
    Format(String),

    /// Stored bytes do not hash to the checksum recorded at write time.
    #[error("[CHECKSUM_MISMATCH] {file} @ {offset}: expected {expected}, computed {computed}")]
    ChecksumMismatch {
        /// Data file name.
        file: String,
        /// Byte offset of the entry.
        offset: u64,
        /// Recorded checksum (hex).
        expected: String,
        /// Checksum of the bytes read (hex).
        computed: String,
    },

    /// A field is already registered with a different type or annotation value.
    #[error("[FIELD_CONFLICT] field `{field}`: {reason}")]
    FieldConflict {
        /// Field name.
        field: String,
        /// What differs.
        reason: String,
    },

    /// The open mode forbids this operation.
    #[error("[INVALID_MODE] {operation} is not permitted in {mode} mode")]
    InvalidMode {
        /// Operation name.
        operation: &'static str,
        /// Display form of the open mode.
        mode: &'static str,
    },

    /// A field name is empty or cannot be used as part of a file name.
    #[error("[INVALID_NAME] {0:?}")]
    InvalidName(String),

    /// Strided view parameters are inconsistent or exceed the backing buffer.
    #[error("[INVALID_VIEW] {0}")]
    InvalidView(String),
}

impl From<serde_json::Error> for SaveboxError {
    fn from(err: serde_json::Error) -> Self {
        Self::Format(err.to_string())
    }
}
