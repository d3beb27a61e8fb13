// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Serializer configuration.

use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::archive::{ArchiveKind, FileLayout};
use crate::error::SaveboxError;
use crate::switch::SerializationSwitch;

/// Knobs applied when a serializer opens its archive.
///
/// Every field has a default, so a JSON config file only needs the keys it
/// changes: `{"layout": "single"}` is a complete config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SerializerConfig {
    /// Storage backend.
    pub archive: ArchiveKind,
    /// File layout of the binary backend. An existing archive keeps the
    /// layout it was written with.
    pub layout: FileLayout,
    /// Verify the stored checksum of every entry on read.
    pub verify_checksums: bool,
    /// Enable/disable gate consulted by `write` and `read`.
    #[serde(skip)]
    pub switch: SerializationSwitch,
}

impl Default for SerializerConfig {
    fn default() -> Self {
        Self {
            archive: ArchiveKind::default(),
            layout: FileLayout::default(),
            verify_checksums: true,
            switch: SerializationSwitch::default(),
        }
    }
}

impl SerializerConfig {
    /// Loads a JSON config file. Returns `Ok(None)` if `path` does not exist.
    pub fn load(path: &Path) -> Result<Option<Self>, SaveboxError> {
        match fs::read(path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(SaveboxError::Io(err)),
        }
    }

    /// Writes this config as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<(), SaveboxError> {
        fs::write(path, serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }

    /// Replaces the backend.
    pub fn with_archive(mut self, archive: ArchiveKind) -> Self {
        self.archive = archive;
        self
    }

    /// Replaces the binary file layout.
    pub fn with_layout(mut self, layout: FileLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Replaces the enable/disable gate.
    pub fn with_switch(mut self, switch: SerializationSwitch) -> Self {
        self.switch = switch;
        self
    }
}
