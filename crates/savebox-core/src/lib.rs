// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! savebox-core: persist multi-dimensional fields at named savepoints.
//!
//! A [`Serializer`] owns a [`MetaDataModel`] (global annotations, field
//! registry, savepoint registry, and the location of every stored array) and
//! an [`Archive`] backend that holds the bytes. Arrays enter and leave
//! through strided views, so callers can hand over padded or transposed
//! buffers without copying them into a contiguous layout first.
//!
//! # On disk
//!
//! For directory `dir` and prefix `p` the binary backend writes:
//!
//! - `dir/MetaData-p.json`: the semantic document.
//! - `dir/ArchiveMetaData-p.json`: the physical layout, with a BLAKE3
//!   checksum per entry.
//! - `dir/p.<field>.dat` (or a single `dir/p.dat`): raw bytes in row-major
//!   order, host byte order.
//!
//! # Example
//!
//! ```
//! use savebox_core::{ElementKind, FieldMetaInfo, OpenMode, Savepoint, Serializer};
//!
//! # fn main() -> Result<(), savebox_core::SaveboxError> {
//! let dir = tempfile::tempdir()?;
//! let mut ser = Serializer::open(OpenMode::Write, dir.path(), "run")?;
//! ser.add_field(FieldMetaInfo::with_kind("u", ElementKind::Float64, [3])?)?;
//!
//! let step = Savepoint::new("step").with("cycle", 0_i32)?;
//! ser.write_slice("u", &step, &[1.0_f64, 2.0, 3.0])?;
//! ser.close()?;
//!
//! let ser = Serializer::open(OpenMode::Read, dir.path(), "run")?;
//! let mut u = [0.0_f64; 3];
//! ser.read_slice("u", &step, &mut u)?;
//! assert_eq!(u, [1.0, 2.0, 3.0]);
//! # Ok(())
//! # }
//! ```
#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms, unused_must_use)]
#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::cargo,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::dbg_macro,
    clippy::print_stdout,
    clippy::print_stderr
)]
#![allow(
    clippy::must_use_candidate,
    clippy::return_self_not_must_use,
    clippy::unreadable_literal,
    clippy::missing_const_for_fn,
    clippy::redundant_pub_crate,
    clippy::module_name_repetitions,
    clippy::use_self
)]

/// Storage backends and location tokens.
pub mod archive;
/// Strided-array packing and unpacking.
pub mod codec;
mod config;
mod error;
mod field;
mod meta_value;
/// Meta-data model and its JSON document.
pub mod metadata;
mod savepoint;
mod serializer;
mod switch;
mod type_desc;

pub use archive::{
    open_archive, validate_prefix, Archive, ArchiveKind, BinaryArchive, Checksum, FileLayout,
    LocationToken, MemoryArchive, OpenMode,
};
pub use codec::{pack, pack_into, unpack, StridedView, StridedViewMut};
pub use config::SerializerConfig;
pub use error::SaveboxError;
pub use field::FieldMetaInfo;
pub use meta_value::{MetaInfoMap, MetaValue};
pub use metadata::MetaDataModel;
pub use savepoint::Savepoint;
pub use serializer::Serializer;
pub use switch::{
    disable_serialization, enable_serialization, serialization_enabled, SerializationSwitch,
};
pub use type_desc::{ElementKind, Scalar, TypeDescriptor};
