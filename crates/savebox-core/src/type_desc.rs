// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Element kinds and array type descriptors.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::SaveboxError;

/// Scalar kind of one array element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    /// Boolean stored as one byte.
    Bool,
    /// `i8`.
    Int8,
    /// `i16`.
    Int16,
    /// `i32`.
    Int32,
    /// `i64`.
    Int64,
    /// `u8`.
    #[serde(rename = "uint8")]
    UInt8,
    /// `u16`.
    #[serde(rename = "uint16")]
    UInt16,
    /// `u32`.
    #[serde(rename = "uint32")]
    UInt32,
    /// `u64`.
    #[serde(rename = "uint64")]
    UInt64,
    /// `f32`.
    Float32,
    /// `f64`.
    Float64,
    /// Fixed-width byte string; the width is carried by the descriptor.
    String,
}

impl ElementKind {
    /// Byte width of the kind, or `None` for the variable-width `String`.
    pub const fn fixed_size(self) -> Option<usize> {
        match self {
            Self::Bool | Self::Int8 | Self::UInt8 => Some(1),
            Self::Int16 | Self::UInt16 => Some(2),
            Self::Int32 | Self::UInt32 | Self::Float32 => Some(4),
            Self::Int64 | Self::UInt64 | Self::Float64 => Some(8),
            Self::String => None,
        }
    }

    /// Stable lowercase name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int8 => "int8",
            Self::Int16 => "int16",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::UInt8 => "uint8",
            Self::UInt16 => "uint16",
            Self::UInt32 => "uint32",
            Self::UInt64 => "uint64",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
            Self::String => "string",
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Plain-old-data Rust types with a matching [`ElementKind`].
pub trait Scalar: bytemuck::Pod {
    /// Element kind this type is stored as.
    const KIND: ElementKind;
}

macro_rules! impl_scalar {
    ($($ty:ty => $kind:ident),* $(,)?) => {
        $(impl Scalar for $ty {
            const KIND: ElementKind = ElementKind::$kind;
        })*
    };
}

impl_scalar! {
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    u8 => UInt8,
    u16 => UInt16,
    u32 => UInt32,
    u64 => UInt64,
    f32 => Float32,
    f64 => Float64,
}

/// Element kind, element byte size, and dimensions of a field.
///
/// Always valid: the byte size agrees with the kind, every dimension is
/// positive, and [`num_bytes`](Self::num_bytes) fits in `usize`. Rank 0
/// (empty `dims`) describes a single element.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawTypeDescriptor")]
pub struct TypeDescriptor {
    kind: ElementKind,
    byte_size: usize,
    dims: Vec<usize>,
}

#[derive(Deserialize)]
struct RawTypeDescriptor {
    kind: ElementKind,
    byte_size: usize,
    dims: Vec<usize>,
}

impl TryFrom<RawTypeDescriptor> for TypeDescriptor {
    type Error = SaveboxError;

    fn try_from(raw: RawTypeDescriptor) -> Result<Self, Self::Error> {
        Self::with_byte_size(raw.kind, raw.byte_size, raw.dims)
    }
}

impl TypeDescriptor {
    /// Descriptor for a fixed-width kind.
    ///
    /// # Errors
    ///
    /// [`SaveboxError::InvalidType`] for `String` (use
    /// [`with_byte_size`](Self::with_byte_size)) or a zero dimension.
    pub fn new(kind: ElementKind, dims: impl Into<Vec<usize>>) -> Result<Self, SaveboxError> {
        let byte_size = kind.fixed_size().ok_or_else(|| {
            SaveboxError::InvalidType("string elements need an explicit byte size".into())
        })?;
        Self::with_byte_size(kind, byte_size, dims)
    }

    /// Descriptor with an explicit element byte size.
    ///
    /// # Errors
    ///
    /// [`SaveboxError::InvalidType`] if `byte_size` disagrees with a
    /// fixed-width kind, is zero, any dimension is zero, or the packed size
    /// does not fit in `usize`.
    pub fn with_byte_size(
        kind: ElementKind,
        byte_size: usize,
        dims: impl Into<Vec<usize>>,
    ) -> Result<Self, SaveboxError> {
        let dims = dims.into();
        match kind.fixed_size() {
            Some(size) if size != byte_size => {
                return Err(SaveboxError::InvalidType(format!(
                    "{kind} is {size} bytes wide, not {byte_size}"
                )));
            }
            None if byte_size == 0 => {
                return Err(SaveboxError::InvalidType(
                    "string elements must be at least one byte".into(),
                ));
            }
            _ => {}
        }
        if let Some(axis) = dims.iter().position(|&d| d == 0) {
            return Err(SaveboxError::InvalidType(format!(
                "dimension {axis} of {dims:?} is zero"
            )));
        }
        if dims
            .iter()
            .try_fold(byte_size, |acc, &d| acc.checked_mul(d))
            .is_none()
        {
            return Err(SaveboxError::InvalidType(format!(
                "{dims:?} elements of {byte_size} bytes overflow usize"
            )));
        }
        Ok(Self {
            kind,
            byte_size,
            dims,
        })
    }

    /// Descriptor for the Rust scalar type `T`.
    pub fn of<T: Scalar>(dims: impl Into<Vec<usize>>) -> Result<Self, SaveboxError> {
        Self::new(T::KIND, dims)
    }

    /// Element kind.
    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    /// Bytes per element.
    pub fn byte_size(&self) -> usize {
        self.byte_size
    }

    /// Number of dimensions.
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Extent of each dimension, slowest-varying first.
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Total element count (1 for rank 0).
    pub fn num_elements(&self) -> usize {
        self.dims.iter().product()
    }

    /// Size of the packed, canonical byte representation.
    pub fn num_bytes(&self) -> usize {
        self.num_elements() * self.byte_size
    }

    /// Row-major byte strides of a padding-free layout.
    pub fn contiguous_strides(&self) -> Vec<usize> {
        row_major_strides(&self.dims, self.byte_size)
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if self.kind == ElementKind::String {
            write!(f, "({})", self.byte_size)?;
        }
        write!(f, "{:?}", self.dims)
    }
}

/// Row-major strides for `dims`, scaled by `unit` (bytes or 1 for elements).
pub(crate) fn row_major_strides(dims: &[usize], unit: usize) -> Vec<usize> {
    let mut strides = vec![unit; dims.len()];
    for i in (0..dims.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * dims[i + 1];
    }
    strides
}
