// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! In-process backend.
//!
//! Keeps one growing byte buffer per field and hands out the same
//! `{file, offset, length}` tokens the binary backend does. Nothing survives
//! the process, so Read mode has nothing to open.

use std::collections::BTreeMap;

use super::{check_put_len, check_token_len, Archive, ArchiveKind, LocationToken, OpenMode};
use crate::error::SaveboxError;
use crate::type_desc::TypeDescriptor;

/// Backend holding every entry in memory.
#[derive(Debug)]
pub struct MemoryArchive {
    mode: OpenMode,
    prefix: String,
    buffers: BTreeMap<String, Vec<u8>>,
    entries: usize,
}

impl MemoryArchive {
    /// Opens an empty memory archive.
    ///
    /// # Errors
    ///
    /// [`SaveboxError::InvalidMode`] for [`OpenMode::Read`].
    pub fn open(mode: OpenMode, prefix: &str) -> Result<Self, SaveboxError> {
        if mode == OpenMode::Read {
            return Err(SaveboxError::InvalidMode {
                operation: "open memory archive",
                mode: mode.name(),
            });
        }
        Ok(Self {
            mode,
            prefix: prefix.to_owned(),
            buffers: BTreeMap::new(),
            entries: 0,
        })
    }

    /// Total bytes held.
    pub fn num_bytes(&self) -> usize {
        self.buffers.values().map(Vec::len).sum()
    }
}

impl Archive for MemoryArchive {
    fn kind(&self) -> ArchiveKind {
        ArchiveKind::Memory
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
        check_put_len(bytes, ty)?;
        let file = format!("{}.{field}.mem", self.prefix);
        let buffer = self.buffers.entry(file.clone()).or_default();
        let offset = buffer.len() as u64;
        buffer.extend_from_slice(bytes);
        self.entries += 1;
        Ok(LocationToken::new(file, offset, bytes.len() as u64))
    }

    fn get(&self, token: &LocationToken, ty: &TypeDescriptor) -> Result<Vec<u8>, SaveboxError> {
        check_token_len(token, ty)?;
        let unknown = || SaveboxError::Format(format!("archive has no entry {token}"));
        let buffer = self.buffers.get(token.file()).ok_or_else(unknown)?;
        let start = token.offset() as usize;
        let end = start
            .checked_add(token.length() as usize)
            .ok_or_else(unknown)?;
        buffer.get(start..end).map(<[u8]>::to_vec).ok_or_else(unknown)
    }

    fn flush(&mut self) -> Result<(), SaveboxError> {
        Ok(())
    }

    fn num_entries(&self) -> usize {
        self.entries
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::type_desc::ElementKind;

    #[test]
    fn read_mode_is_rejected() {
        assert!(matches!(
            MemoryArchive::open(OpenMode::Read, "run"),
            Err(SaveboxError::InvalidMode { .. })
        ));
    }

    #[test]
    fn entries_append_per_field() {
        let td = TypeDescriptor::new(ElementKind::Int16, [2]).unwrap();
        let mut archive = MemoryArchive::open(OpenMode::Write, "run").unwrap();
        let a = archive.put("u", &[1, 0, 2, 0], &td).unwrap();
        let b = archive.put("u", &[3, 0, 4, 0], &td).unwrap();
        let c = archive.put("v", &[5, 0, 6, 0], &td).unwrap();
        assert_eq!(b.offset(), 4);
        assert_eq!(c.offset(), 0);
        assert_eq!(archive.get(&a, &td).unwrap(), vec![1, 0, 2, 0]);
        assert_eq!(archive.get(&c, &td).unwrap(), vec![5, 0, 6, 0]);
        assert_eq!(archive.num_entries(), 3);
        assert_eq!(archive.num_bytes(), 12);
    }

    #[test]
    fn out_of_range_token_is_a_format_error() {
        let td = TypeDescriptor::new(ElementKind::UInt8, [2]).unwrap();
        let mut archive = MemoryArchive::open(OpenMode::Append, "run").unwrap();
        archive.put("u", &[1, 2], &td).unwrap();
        let bogus = LocationToken::new("run.u.mem", 1, 2);
        assert!(matches!(archive.get(&bogus, &td), Err(SaveboxError::Format(_))));
    }
}
