// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The serializer: one meta-data model plus one archive, scoped to a
//! directory and a filename prefix.
//!
//! # Lifecycle
//!
//! `open` loads or initializes the documents; the handle is then ready until
//! [`Serializer::close`] consumes it. Dropping a serializer without `close`
//! or [`Serializer::update_meta_data`] leaves the on-disk documents as they
//! were at the last flush.
//!
//! # Write path
//!
//! `write` checks, in order: the enable switch, the open mode, field
//! registration, element size, dimensions, and duplicate (field, savepoint)
//! pairs. Only then are bytes packed, stored, and the token recorded, so a
//! failed write leaves no trace in the archive or the model.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument, warn};

use crate::archive::{open_archive, validate_prefix, Archive, OpenMode};
use crate::codec::{self, StridedView, StridedViewMut};
use crate::config::SerializerConfig;
use crate::error::SaveboxError;
use crate::field::FieldMetaInfo;
use crate::meta_value::MetaInfoMap;
use crate::metadata::{meta_data_path, MetaDataModel};
use crate::savepoint::Savepoint;
use crate::type_desc::Scalar;

/// Reads and writes multi-dimensional fields at savepoints.
///
/// Not internally synchronized; wrap it in a mutex to share across threads.
#[derive(Debug)]
pub struct Serializer {
    mode: OpenMode,
    directory: PathBuf,
    prefix: String,
    config: SerializerConfig,
    meta_data: MetaDataModel,
    archive: Box<dyn Archive>,
}

impl Serializer {
    /// Opens a serializer with the default configuration.
    pub fn open(
        mode: OpenMode,
        directory: impl Into<PathBuf>,
        prefix: &str,
    ) -> Result<Self, SaveboxError> {
        Self::open_with(mode, directory, prefix, SerializerConfig::default())
    }

    /// Opens a serializer.
    ///
    /// - Read: loads `MetaData-<prefix>.json` and opens the archive read-only.
    /// - Write: creates `directory` and discards any earlier document set
    ///   for `prefix`.
    /// - Append: creates `directory`; loads the documents if present and
    ///   starts empty otherwise.
    ///
    /// # Errors
    ///
    /// [`SaveboxError::InvalidName`] for an empty prefix or one containing a
    /// path separator or `.`, [`SaveboxError::MetaDataNotFound`] in Read mode
    /// without a meta-data document, [`SaveboxError::ArchiveMetaDataNotFound`]
    /// in Read mode without an archive document, [`SaveboxError::Format`]
    /// for malformed or mismatched documents.
    pub fn open_with(
        mode: OpenMode,
        directory: impl Into<PathBuf>,
        prefix: &str,
        config: SerializerConfig,
    ) -> Result<Self, SaveboxError> {
        let directory = directory.into();
        validate_prefix(prefix)?;
        let path = meta_data_path(&directory, prefix);

        let meta_data = match mode {
            OpenMode::Read => MetaDataModel::load(&path)?,
            OpenMode::Append => {
                fs::create_dir_all(&directory)?;
                match MetaDataModel::load(&path) {
                    Ok(model) => model,
                    Err(SaveboxError::MetaDataNotFound(_)) => MetaDataModel::new(prefix),
                    Err(err) => return Err(err),
                }
            }
            OpenMode::Write => {
                fs::create_dir_all(&directory)?;
                match fs::remove_file(&path) {
                    Ok(()) => warn!(path = %path.display(), "discarding previous meta-data"),
                    Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                    Err(err) => return Err(err.into()),
                }
                MetaDataModel::new(prefix)
            }
        };
        if meta_data.prefix() != prefix {
            return Err(SaveboxError::Format(format!(
                "{} belongs to prefix `{}`",
                path.display(),
                meta_data.prefix()
            )));
        }

        let archive = open_archive(config.archive, mode, &directory, prefix, &config)?;
        info!(
            mode = mode.name(),
            directory = %directory.display(),
            prefix,
            archive = config.archive.name(),
            fields = meta_data.fields().len(),
            savepoints = meta_data.num_savepoints(),
            "opened serializer"
        );
        Ok(Self {
            mode,
            directory,
            prefix: prefix.to_owned(),
            config,
            meta_data,
            archive,
        })
    }

    /// Mode fixed at open time.
    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    /// Directory holding the documents and data files.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Filename prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Configuration in effect.
    pub fn config(&self) -> &SerializerConfig {
        &self.config
    }

    /// The underlying meta-data model.
    pub fn meta_data(&self) -> &MetaDataModel {
        &self.meta_data
    }

    /// The underlying archive.
    pub fn archive(&self) -> &dyn Archive {
        self.archive.as_ref()
    }

    // ── Global meta-info ────────────────────────────────────────────────

    /// Global annotations.
    pub fn global_meta_info(&self) -> &MetaInfoMap {
        self.meta_data.global_meta_info()
    }

    /// Mutable global annotations.
    pub fn global_meta_info_mut(&mut self) -> &mut MetaInfoMap {
        self.meta_data.global_meta_info_mut()
    }

    // ── Fields ──────────────────────────────────────────────────────────

    /// Registers a field. See [`MetaDataModel::add_field`].
    pub fn add_field(&mut self, info: FieldMetaInfo) -> Result<bool, SaveboxError> {
        let name = info.name().to_owned();
        let added = self.meta_data.add_field(info)?;
        debug!(field = %name, added, "registered field");
        Ok(added)
    }

    /// Registered field names in registration order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> + Clone + '_ {
        self.meta_data.field_names()
    }

    /// Meta-info of a registered field.
    pub fn field_meta_info(&self, name: &str) -> Option<&FieldMetaInfo> {
        self.meta_data.field(name)
    }

    /// Mutable annotations of a registered field.
    pub fn field_meta_info_mut(&mut self, name: &str) -> Option<&mut MetaInfoMap> {
        self.meta_data.field_meta_info_mut(name)
    }

    /// Returns `true` if `name` is registered.
    pub fn has_field(&self, name: &str) -> bool {
        self.meta_data.has_field(name)
    }

    // ── Savepoints ──────────────────────────────────────────────────────

    /// Registers a savepoint. Returns `false` if it was already registered.
    pub fn add_savepoint(&mut self, savepoint: Savepoint) -> bool {
        self.meta_data.add_savepoint(savepoint)
    }

    /// Registered savepoints in registration order.
    pub fn savepoints(&self) -> impl ExactSizeIterator<Item = &Savepoint> + Clone + '_ {
        self.meta_data.savepoints()
    }

    /// Returns `true` if an identical savepoint is registered.
    pub fn has_savepoint(&self, savepoint: &Savepoint) -> bool {
        self.meta_data.has_savepoint(savepoint)
    }

    /// Savepoints at which `field` has stored data.
    pub fn savepoints_of_field<'a>(
        &'a self,
        field: &'a str,
    ) -> impl Iterator<Item = &'a Savepoint> + Clone + 'a {
        self.meta_data.savepoints_of_field(field)
    }

    /// Fields stored at `savepoint`, or `None` for an unknown savepoint.
    pub fn fields_at_savepoint(
        &self,
        savepoint: &Savepoint,
    ) -> Option<impl Iterator<Item = &str> + Clone + '_> {
        self.meta_data.fields_at_savepoint(savepoint)
    }

    // ── Data ────────────────────────────────────────────────────────────

    /// Stores the array described by `view` as `field` at `savepoint`.
    ///
    /// Registers `savepoint` if it is new. A no-op returning `Ok(())` while
    /// the serialization switch is off.
    ///
    /// # Errors
    ///
    /// [`SaveboxError::InvalidMode`] in Read mode,
    /// [`SaveboxError::FieldNotFound`], [`SaveboxError::SizeMismatch`] if
    /// the element size differs from the registered one,
    /// [`SaveboxError::ShapeMismatch`], [`SaveboxError::DuplicateWrite`], and
    /// archive failures.
    #[instrument(skip(self, savepoint, view), fields(savepoint = %savepoint))]
    pub fn write(
        &mut self,
        field: &str,
        savepoint: &Savepoint,
        view: &StridedView<'_>,
    ) -> Result<(), SaveboxError> {
        if !self.config.switch.is_enabled() {
            warn!("serialization disabled, write skipped");
            return Ok(());
        }
        if !self.mode.is_writable() {
            return Err(SaveboxError::InvalidMode {
                operation: "write",
                mode: self.mode.name(),
            });
        }
        let info = self
            .meta_data
            .field(field)
            .ok_or_else(|| SaveboxError::FieldNotFound(field.to_owned()))?;
        check_view(info, view.elem_size(), view.dims())?;
        self.meta_data.check_recordable(field, savepoint)?;
        let ty = info.type_descriptor().clone();

        let bytes = codec::pack(view);
        let token = self.archive.put(field, &bytes, &ty)?;
        debug!(token = %token, "wrote field");
        self.meta_data.record(field, savepoint, token)
    }

    /// Loads `field` at `savepoint` into `view`.
    ///
    /// Permitted in every mode. A no-op returning `Ok(())` while the
    /// serialization switch is off; `view` is left untouched.
    ///
    /// # Errors
    ///
    /// [`SaveboxError::FieldNotFound`], [`SaveboxError::SizeMismatch`],
    /// [`SaveboxError::ShapeMismatch`], [`SaveboxError::SavepointNotFound`]
    /// if nothing was written for the pair, and archive failures.
    #[instrument(skip(self, savepoint, view), fields(savepoint = %savepoint))]
    pub fn read(
        &self,
        field: &str,
        savepoint: &Savepoint,
        view: &mut StridedViewMut<'_>,
    ) -> Result<(), SaveboxError> {
        if !self.config.switch.is_enabled() {
            warn!("serialization disabled, read skipped");
            return Ok(());
        }
        let info = self
            .meta_data
            .field(field)
            .ok_or_else(|| SaveboxError::FieldNotFound(field.to_owned()))?;
        check_view(info, view.elem_size(), view.dims())?;
        let token =
            self.meta_data
                .token(field, savepoint)
                .ok_or_else(|| SaveboxError::SavepointNotFound {
                    field: field.to_owned(),
                    savepoint: savepoint.to_string(),
                })?;
        let bytes = self.archive.get(token, info.type_descriptor())?;
        debug!(token = %token, "read field");
        codec::unpack(&bytes, view)
    }

    /// Writes a contiguous row-major slice with the registered dimensions.
    ///
    /// # Errors
    ///
    /// As [`write`](Self::write), plus [`SaveboxError::InvalidType`] if `T`
    /// is not the registered element kind and [`SaveboxError::InvalidView`]
    /// if `data` is too short.
    pub fn write_slice<T: Scalar>(
        &mut self,
        field: &str,
        savepoint: &Savepoint,
        data: &[T],
    ) -> Result<(), SaveboxError> {
        let dims = self.typed_dims::<T>(field)?;
        let view = StridedView::contiguous(data, dims)?;
        self.write(field, savepoint, &view)
    }

    /// Reads into a contiguous row-major slice with the registered dimensions.
    ///
    /// # Errors
    ///
    /// As [`read`](Self::read), plus the kind and length checks of
    /// [`write_slice`](Self::write_slice).
    pub fn read_slice<T: Scalar>(
        &self,
        field: &str,
        savepoint: &Savepoint,
        data: &mut [T],
    ) -> Result<(), SaveboxError> {
        let dims = self.typed_dims::<T>(field)?;
        let mut view = StridedViewMut::contiguous(data, dims)?;
        self.read(field, savepoint, &mut view)
    }

    fn typed_dims<T: Scalar>(&self, field: &str) -> Result<Vec<usize>, SaveboxError> {
        let info = self
            .meta_data
            .field(field)
            .ok_or_else(|| SaveboxError::FieldNotFound(field.to_owned()))?;
        if info.kind() != T::KIND {
            return Err(SaveboxError::InvalidType(format!(
                "field `{field}` holds {}, not {}",
                info.kind(),
                T::KIND
            )));
        }
        Ok(info.dims().to_vec())
    }

    // ── Persistence ─────────────────────────────────────────────────────

    /// Writes the archive document and the meta-data document.
    ///
    /// A logged no-op in Read mode.
    #[instrument(skip(self), fields(prefix = %self.prefix))]
    pub fn update_meta_data(&mut self) -> Result<(), SaveboxError> {
        if !self.mode.is_writable() {
            debug!("read-only serializer, nothing to flush");
            return Ok(());
        }
        self.archive.flush()?;
        let path = meta_data_path(&self.directory, &self.prefix);
        self.meta_data.save(&path)?;
        info!(
            path = %path.display(),
            fields = self.meta_data.fields().len(),
            savepoints = self.meta_data.num_savepoints(),
            "flushed meta-data"
        );
        Ok(())
    }

    /// Flushes (Write and Append mode) and releases the serializer.
    pub fn close(mut self) -> Result<(), SaveboxError> {
        self.update_meta_data()
    }
}

impl fmt::Display for Serializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Serializer {{ mode: {}, directory: {}, prefix: {}, fields: {}, savepoints: {} }}",
            self.mode,
            self.directory.display(),
            self.prefix,
            self.meta_data.fields().len(),
            self.meta_data.num_savepoints()
        )
    }
}

fn check_view(info: &FieldMetaInfo, elem_size: usize, dims: &[usize]) -> Result<(), SaveboxError> {
    if elem_size != info.byte_size() {
        return Err(SaveboxError::SizeMismatch {
            expected: info.byte_size(),
            actual: elem_size,
        });
    }
    if dims != info.dims() {
        return Err(SaveboxError::ShapeMismatch {
            field: info.name().to_owned(),
            expected: info.dims().to_vec(),
            actual: dims.to_vec(),
        });
    }
    Ok(())
}
