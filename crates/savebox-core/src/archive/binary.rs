// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Flat-file binary backend.
//!
//! Each `put` appends the canonical bytes to a data file and records
//! `{offset, length, checksum}` in the archive meta-data document. Reads seek
//! straight to the recorded offset. Entries are never rewritten; offsets
//! within a file are strictly increasing.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::{debug, info, warn};

use super::{
    archive_meta_data_path, check_put_len, check_token_len, validate_prefix, Archive,
    ArchiveKind, FileLayout, LocationToken, OpenMode, ARCHIVE_FORMAT_VERSION,
};
use crate::error::SaveboxError;
use crate::type_desc::TypeDescriptor;

/// BLAKE3 digest of one stored entry, rendered as lowercase hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Checksum(pub [u8; 32]);

impl Checksum {
    /// Digest of `bytes`.
    pub fn of(bytes: &[u8]) -> Self {
        Self(*blake3::hash(bytes).as_bytes())
    }

    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl Serialize for Checksum {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for Checksum {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        let mut out = [0u8; 32];
        hex::decode_to_slice(&text, &mut out).map_err(serde::de::Error::custom)?;
        Ok(Self(out))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct EntryRecord {
    offset: u64,
    length: u64,
    checksum: Checksum,
}

#[derive(Serialize, Deserialize)]
struct ArchiveDocument {
    kind: ArchiveKind,
    format_version: u32,
    prefix: String,
    layout: FileLayout,
    #[serde(default)]
    files: BTreeMap<String, Vec<EntryRecord>>,
}

/// Backend storing entries in flat files under one directory.
#[derive(Debug)]
pub struct BinaryArchive {
    mode: OpenMode,
    directory: PathBuf,
    prefix: String,
    layout: FileLayout,
    verify_checksums: bool,
    files: BTreeMap<String, Vec<EntryRecord>>,
    dirty: bool,
}

impl BinaryArchive {
    /// Opens the backend for `(directory, prefix)`.
    ///
    /// - Read: the archive meta-data document must exist.
    /// - Write: creates `directory`, deletes the data files and the document
    ///   of any previous archive with this prefix.
    /// - Append: creates `directory`, loads the document if present. Without
    ///   one, the first flush writes it even if nothing was stored.
    ///
    /// An existing document's layout wins over `layout`.
    ///
    /// # Errors
    ///
    /// [`SaveboxError::InvalidName`] for a prefix rejected by
    /// [`validate_prefix`], [`SaveboxError::ArchiveMetaDataNotFound`] in Read
    /// mode without a document, [`SaveboxError::Format`] for a malformed document.
    pub fn open(
        mode: OpenMode,
        directory: &Path,
        prefix: &str,
        layout: FileLayout,
        verify_checksums: bool,
    ) -> Result<Self, SaveboxError> {
        validate_prefix(prefix)?;
        let doc_path = archive_meta_data_path(directory, prefix);
        let mut archive = Self {
            mode,
            directory: directory.to_path_buf(),
            prefix: prefix.to_owned(),
            layout,
            verify_checksums,
            files: BTreeMap::new(),
            dirty: mode == OpenMode::Write,
        };
        match mode {
            OpenMode::Read => {
                let doc = load_document(&doc_path)?
                    .ok_or_else(|| SaveboxError::ArchiveMetaDataNotFound(doc_path.clone()))?;
                archive.adopt(doc)?;
            }
            OpenMode::Append => {
                fs::create_dir_all(directory)?;
                match load_document(&doc_path)? {
                    Some(doc) => archive.adopt(doc)?,
                    None => archive.dirty = true,
                }
            }
            OpenMode::Write => {
                fs::create_dir_all(directory)?;
                if let Some(doc) = load_document(&doc_path)? {
                    warn!(
                        prefix,
                        files = doc.files.len(),
                        "discarding previous binary archive"
                    );
                    for file in doc.files.keys() {
                        remove_if_present(&directory.join(file))?;
                    }
                    remove_if_present(&doc_path)?;
                }
            }
        }
        debug!(
            prefix,
            mode = mode.name(),
            entries = archive.num_entries(),
            "opened binary archive"
        );
        Ok(archive)
    }

    /// Layout in effect.
    pub fn layout(&self) -> FileLayout {
        self.layout
    }

    /// Archive directory.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn adopt(&mut self, doc: ArchiveDocument) -> Result<(), SaveboxError> {
        if doc.kind != ArchiveKind::Binary {
            return Err(SaveboxError::Format(format!(
                "archive document was written by the {} backend",
                doc.kind
            )));
        }
        if doc.format_version != ARCHIVE_FORMAT_VERSION {
            return Err(SaveboxError::Format(format!(
                "unsupported archive format version {}",
                doc.format_version
            )));
        }
        if doc.prefix != self.prefix {
            return Err(SaveboxError::Format(format!(
                "archive document belongs to prefix `{}`, not `{}`",
                doc.prefix, self.prefix
            )));
        }
        for (file, entries) in &doc.files {
            if entries.windows(2).any(|w| w[0].offset >= w[1].offset) {
                return Err(SaveboxError::Format(format!(
                    "entries of `{file}` are not in offset order"
                )));
            }
        }
        if doc.layout != self.layout {
            debug!(
                requested = ?self.layout,
                recorded = ?doc.layout,
                "using recorded archive layout"
            );
        }
        self.layout = doc.layout;
        self.files = doc.files;
        Ok(())
    }

    fn entry(&self, token: &LocationToken) -> Result<&EntryRecord, SaveboxError> {
        let unknown = || SaveboxError::Format(format!("archive has no entry {token}"));
        let entries = self.files.get(token.file()).ok_or_else(unknown)?;
        let ix = entries
            .binary_search_by_key(&token.offset(), |e| e.offset)
            .map_err(|_| unknown())?;
        let entry = &entries[ix];
        if entry.length != token.length() {
            return Err(SaveboxError::Format(format!(
                "{token} disagrees with the recorded length {}",
                entry.length
            )));
        }
        Ok(entry)
    }

    fn open_for_append(&self, file: &str) -> io::Result<File> {
        let path = self.directory.join(file);
        // A Write-mode archive owns every file it touches; stale bytes left
        // by an archive whose document is gone must not survive.
        if self.mode == OpenMode::Write && !self.files.contains_key(file) {
            return OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(path);
        }
        OpenOptions::new().append(true).create(true).open(path)
    }
}

impl Archive for BinaryArchive {
    fn kind(&self) -> ArchiveKind {
        ArchiveKind::Binary
    }

    fn mode(&self) -> OpenMode {
        self.mode
    }

    fn put(
        &mut self,
        field: &str,
        bytes: &[u8],
        ty: &TypeDescriptor,
    ) -> Result<LocationToken, SaveboxError> {
        if !self.mode.is_writable() {
            return Err(SaveboxError::InvalidMode {
                operation: "put",
                mode: self.mode.name(),
            });
        }
        validate_field_name(field)?;
        check_put_len(bytes, ty)?;

        let file_name = self.layout.file_name(&self.prefix, field);
        let mut file = self.open_for_append(&file_name)?;
        let offset = file.seek(SeekFrom::End(0))?;
        file.write_all(bytes)?;

        let record = EntryRecord {
            offset,
            length: bytes.len() as u64,
            checksum: Checksum::of(bytes),
        };
        debug!(field, file = %file_name, offset, length = record.length, "stored entry");
        self.files.entry(file_name.clone()).or_default().push(record);
        self.dirty = true;
        Ok(LocationToken::new(file_name, offset, bytes.len() as u64))
    }

    fn get(&self, token: &LocationToken, ty: &TypeDescriptor) -> Result<Vec<u8>, SaveboxError> {
        check_token_len(token, ty)?;
        let entry = self.entry(token)?;

        let mut file = File::open(self.directory.join(token.file()))?;
        file.seek(SeekFrom::Start(token.offset()))?;
        let mut bytes = vec![0u8; token.length() as usize];
        file.read_exact(&mut bytes).map_err(|err| {
            if err.kind() == io::ErrorKind::UnexpectedEof {
                SaveboxError::Format(format!("{token} extends past the end of the file"))
            } else {
                SaveboxError::Io(err)
            }
        })?;

        if self.verify_checksums {
            let computed = Checksum::of(&bytes);
            if computed != entry.checksum {
                return Err(SaveboxError::ChecksumMismatch {
                    file: token.file().to_owned(),
                    offset: token.offset(),
                    expected: entry.checksum.to_string(),
                    computed: computed.to_string(),
                });
            }
        }
        Ok(bytes)
    }

    fn flush(&mut self) -> Result<(), SaveboxError> {
        if !self.mode.is_writable() || !self.dirty {
            return Ok(());
        }
        let doc = ArchiveDocument {
            kind: ArchiveKind::Binary,
            format_version: ARCHIVE_FORMAT_VERSION,
            prefix: self.prefix.clone(),
            layout: self.layout,
            files: self.files.clone(),
        };
        let path = archive_meta_data_path(&self.directory, &self.prefix);
        fs::write(&path, serde_json::to_vec_pretty(&doc)?)?;
        self.dirty = false;
        info!(path = %path.display(), entries = self.num_entries(), "flushed archive meta-data");
        Ok(())
    }

    fn num_entries(&self) -> usize {
        self.files.values().map(Vec::len).sum()
    }
}

fn load_document(path: &Path) -> Result<Option<ArchiveDocument>, SaveboxError> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(SaveboxError::Io(err)),
    }
}

fn remove_if_present(path: &Path) -> Result<(), SaveboxError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(SaveboxError::Io(err)),
    }
}

/// Field names become part of a file name.
fn validate_field_name(field: &str) -> Result<(), SaveboxError> {
    if field.is_empty() || field.contains(['/', '\\', '\0']) || field == "." || field == ".." {
        return Err(SaveboxError::InvalidName(field.to_owned()));
    }
    Ok(())
}
