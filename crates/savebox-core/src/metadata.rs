// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The meta-data model: field registry, savepoint registry, and the
//! (field, savepoint) → location-token table, plus its JSON document.
//!
//! # Invariants
//!
//! - Field names are unique; enumeration follows registration order.
//! - Savepoints are unique by full identity (name and annotations) and are
//!   never removed; enumeration follows registration order.
//! - Every recorded token names a registered field and sits under a
//!   registered savepoint.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::archive::LocationToken;
use crate::error::SaveboxError;
use crate::field::FieldMetaInfo;
use crate::meta_value::MetaInfoMap;
use crate::savepoint::Savepoint;

/// Version written to and accepted from meta-data documents.
pub const META_DATA_FORMAT_VERSION: u32 = 1;

/// File name of the meta-data document for `prefix`.
pub fn meta_data_file_name(prefix: &str) -> String {
    format!("MetaData-{prefix}.json")
}

/// Path of the meta-data document for `prefix` inside `directory`.
pub fn meta_data_path(directory: &Path, prefix: &str) -> PathBuf {
    directory.join(meta_data_file_name(prefix))
}

/// A registered savepoint together with the fields stored at it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct SavepointEntry {
    #[serde(flatten)]
    savepoint: Savepoint,
    #[serde(default)]
    fields: BTreeMap<String, LocationToken>,
}

#[derive(Serialize)]
struct DocumentOut<'a> {
    format_version: u32,
    prefix: &'a str,
    global_meta_info: &'a MetaInfoMap,
    fields: &'a [FieldMetaInfo],
    savepoints: &'a [SavepointEntry],
}

#[derive(Deserialize)]
struct DocumentIn {
    format_version: u32,
    prefix: String,
    #[serde(default)]
    global_meta_info: MetaInfoMap,
    #[serde(default)]
    fields: Vec<FieldMetaInfo>,
    #[serde(default)]
    savepoints: Vec<SavepointEntry>,
}

/// In-memory meta-data of one (directory, prefix).
#[derive(Debug, Clone, Default)]
pub struct MetaDataModel {
    prefix: String,
    global_meta_info: MetaInfoMap,
    fields: Vec<FieldMetaInfo>,
    field_index: FxHashMap<String, usize>,
    savepoints: Vec<SavepointEntry>,
    savepoints_by_name: FxHashMap<String, Vec<usize>>,
}

impl PartialEq for MetaDataModel {
    fn eq(&self, other: &Self) -> bool {
        self.prefix == other.prefix
            && self.global_meta_info == other.global_meta_info
            && self.fields == other.fields
            && self.savepoints == other.savepoints
    }
}

impl MetaDataModel {
    /// Creates an empty model for `prefix`.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Self::default()
        }
    }

    /// Filename prefix this model belongs to.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Global annotations.
    pub fn global_meta_info(&self) -> &MetaInfoMap {
        &self.global_meta_info
    }

    /// Mutable global annotations.
    pub fn global_meta_info_mut(&mut self) -> &mut MetaInfoMap {
        &mut self.global_meta_info
    }

    // ── Fields ──────────────────────────────────────────────────────────

    /// Registers a field.
    ///
    /// Returns `Ok(true)` for a new field and `Ok(false)` when the name was
    /// already registered with the same type descriptor; in that case any
    /// annotations not yet present are added.
    ///
    /// # Errors
    ///
    /// [`SaveboxError::FieldConflict`] if the existing entry has a different
    /// type descriptor or a different value under a shared annotation key.
    pub fn add_field(&mut self, info: FieldMetaInfo) -> Result<bool, SaveboxError> {
        if let Some(&ix) = self.field_index.get(info.name()) {
            self.fields[ix].absorb(&info)?;
            return Ok(false);
        }
        self.field_index.insert(info.name().to_owned(), self.fields.len());
        self.fields.push(info);
        Ok(true)
    }

    /// Looks up a field by name.
    pub fn field(&self, name: &str) -> Option<&FieldMetaInfo> {
        self.field_index.get(name).map(|&ix| &self.fields[ix])
    }

    /// Mutable access to a field's annotations.
    pub fn field_meta_info_mut(&mut self, name: &str) -> Option<&mut MetaInfoMap> {
        let ix = *self.field_index.get(name)?;
        Some(self.fields[ix].meta_info_mut())
    }

    /// Returns `true` if `name` is registered.
    pub fn has_field(&self, name: &str) -> bool {
        self.field_index.contains_key(name)
    }

    /// Registered fields in registration order.
    pub fn fields(&self) -> &[FieldMetaInfo] {
        &self.fields
    }

    /// Registered field names in registration order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> + Clone + '_ {
        self.fields.iter().map(FieldMetaInfo::name)
    }

    // ── Savepoints ──────────────────────────────────────────────────────

    /// Registers a savepoint. Returns `false` (and changes nothing) if an
    /// identical savepoint is already registered.
    pub fn add_savepoint(&mut self, savepoint: Savepoint) -> bool {
        if self.savepoint_index(&savepoint).is_some() {
            return false;
        }
        self.push_savepoint(savepoint);
        true
    }

    fn push_savepoint(&mut self, savepoint: Savepoint) -> usize {
        let ix = self.savepoints.len();
        self.savepoints_by_name
            .entry(savepoint.name().to_owned())
            .or_default()
            .push(ix);
        self.savepoints.push(SavepointEntry {
            savepoint,
            fields: BTreeMap::new(),
        });
        ix
    }

    fn savepoint_index(&self, savepoint: &Savepoint) -> Option<usize> {
        self.savepoints_by_name
            .get(savepoint.name())?
            .iter()
            .copied()
            .find(|&ix| self.savepoints[ix].savepoint == *savepoint)
    }

    /// Returns `true` if an identical savepoint is registered.
    pub fn has_savepoint(&self, savepoint: &Savepoint) -> bool {
        self.savepoint_index(savepoint).is_some()
    }

    /// Number of registered savepoints.
    pub fn num_savepoints(&self) -> usize {
        self.savepoints.len()
    }

    /// Registered savepoints in registration order.
    pub fn savepoints(&self) -> impl ExactSizeIterator<Item = &Savepoint> + Clone + '_ {
        self.savepoints.iter().map(|entry| &entry.savepoint)
    }

    /// Savepoints at which `field` has stored data, in registration order.
    ///
    /// The iterator is lazy and can be cloned to restart it.
    pub fn savepoints_of_field<'a>(
        &'a self,
        field: &'a str,
    ) -> impl Iterator<Item = &'a Savepoint> + Clone + 'a {
        self.savepoints
            .iter()
            .filter(move |entry| entry.fields.contains_key(field))
            .map(|entry| &entry.savepoint)
    }

    /// Names of the fields stored at `savepoint`, in name order, or `None`
    /// if the savepoint is not registered.
    pub fn fields_at_savepoint(
        &self,
        savepoint: &Savepoint,
    ) -> Option<impl Iterator<Item = &str> + Clone + '_> {
        let ix = self.savepoint_index(savepoint)?;
        Some(self.savepoints[ix].fields.keys().map(String::as_str))
    }

    // ── Location tokens ─────────────────────────────────────────────────

    /// Token recorded for `(field, savepoint)`, if any.
    pub fn token(&self, field: &str, savepoint: &Savepoint) -> Option<&LocationToken> {
        let ix = self.savepoint_index(savepoint)?;
        self.savepoints[ix].fields.get(field)
    }

    /// Returns `true` if data has been recorded for `(field, savepoint)`.
    pub fn contains(&self, field: &str, savepoint: &Savepoint) -> bool {
        self.token(field, savepoint).is_some()
    }

    /// Checks that `(field, savepoint)` could be recorded without writing
    /// anything.
    pub fn check_recordable(&self, field: &str, savepoint: &Savepoint) -> Result<(), SaveboxError> {
        if !self.has_field(field) {
            return Err(SaveboxError::FieldNotFound(field.to_owned()));
        }
        if self.contains(field, savepoint) {
            return Err(SaveboxError::DuplicateWrite {
                field: field.to_owned(),
                savepoint: savepoint.to_string(),
            });
        }
        Ok(())
    }

    /// Records the archive token for `(field, savepoint)`, registering the
    /// savepoint if it is new.
    ///
    /// # Errors
    ///
    /// [`SaveboxError::FieldNotFound`] for an unregistered field and
    /// [`SaveboxError::DuplicateWrite`] if a token already exists.
    pub fn record(
        &mut self,
        field: &str,
        savepoint: &Savepoint,
        token: LocationToken,
    ) -> Result<(), SaveboxError> {
        self.check_recordable(field, savepoint)?;
        let ix = match self.savepoint_index(savepoint) {
            Some(ix) => ix,
            None => self.push_savepoint(savepoint.clone()),
        };
        self.savepoints[ix].fields.insert(field.to_owned(), token);
        Ok(())
    }

    /// Iterates every recorded token with its field and savepoint.
    pub fn tokens(&self) -> impl Iterator<Item = (&str, &Savepoint, &LocationToken)> + '_ {
        self.savepoints.iter().flat_map(|entry| {
            entry
                .fields
                .iter()
                .map(move |(field, token)| (field.as_str(), &entry.savepoint, token))
        })
    }

    // ── Document ────────────────────────────────────────────────────────

    /// Renders the model as a pretty-printed JSON document.
    pub fn to_json(&self) -> Result<Vec<u8>, SaveboxError> {
        let doc = DocumentOut {
            format_version: META_DATA_FORMAT_VERSION,
            prefix: &self.prefix,
            global_meta_info: &self.global_meta_info,
            fields: &self.fields,
            savepoints: &self.savepoints,
        };
        Ok(serde_json::to_vec_pretty(&doc)?)
    }

    /// Parses and validates a JSON document.
    ///
    /// # Errors
    ///
    /// [`SaveboxError::Format`] for malformed JSON, an unknown format
    /// version, duplicate fields or savepoints, or tokens naming
    /// unregistered fields.
    pub fn from_json(bytes: &[u8]) -> Result<Self, SaveboxError> {
        let doc: DocumentIn = serde_json::from_slice(bytes)?;
        if doc.format_version != META_DATA_FORMAT_VERSION {
            return Err(SaveboxError::Format(format!(
                "unsupported meta-data format version {}",
                doc.format_version
            )));
        }
        let mut model = Self::new(doc.prefix);
        model.global_meta_info = doc.global_meta_info;
        for field in doc.fields {
            if field.name().is_empty() {
                return Err(SaveboxError::Format("field with empty name".into()));
            }
            if model.has_field(field.name()) {
                return Err(SaveboxError::Format(format!(
                    "field `{}` listed twice",
                    field.name()
                )));
            }
            model.add_field(field)?;
        }
        for entry in doc.savepoints {
            if model.has_savepoint(&entry.savepoint) {
                return Err(SaveboxError::Format(format!(
                    "savepoint {} listed twice",
                    entry.savepoint
                )));
            }
            if let Some(unknown) = entry.fields.keys().find(|name| !model.has_field(name)) {
                return Err(SaveboxError::Format(format!(
                    "savepoint {} references unregistered field `{unknown}`",
                    entry.savepoint
                )));
            }
            let ix = model.push_savepoint(entry.savepoint);
            model.savepoints[ix].fields = entry.fields;
        }
        Ok(model)
    }

    /// Writes the document to `path`, replacing any previous content.
    pub fn save(&self, path: &Path) -> Result<(), SaveboxError> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Loads the document at `path`.
    ///
    /// # Errors
    ///
    /// [`SaveboxError::MetaDataNotFound`] if the file does not exist.
    pub fn load(path: &Path) -> Result<Self, SaveboxError> {
        match fs::read(path) {
            Ok(bytes) => Self::from_json(&bytes),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                Err(SaveboxError::MetaDataNotFound(path.to_path_buf()))
            }
            Err(err) => Err(SaveboxError::Io(err)),
        }
    }
}
