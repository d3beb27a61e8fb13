// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Strided-array codec.
//!
//! Converts between a caller's in-memory layout and the canonical archive
//! layout: row-major (last dimension fastest), no padding. A view is a byte
//! buffer plus an origin offset, per-dimension byte strides, extents, and an
//! element byte size. Element `index` lives at
//! `origin + Σ index[i] * strides[i]`.
//!
//! The codec copies raw bytes. It never interprets element values or swaps
//! byte order. Strides may be smaller than the natural row-major stride; the
//! resulting views alias and the copy does whatever those offsets imply.
//!
//! All bounds are checked when the view is built, so `pack` and `unpack`
//! never fail halfway through a copy.

use bytemuck::Pod;

use crate::error::SaveboxError;
use crate::type_desc::row_major_strides;

/// Shape part shared by both view flavours.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Layout {
    origin: usize,
    elem_size: usize,
    dims: Vec<usize>,
    strides: Vec<usize>,
}

impl Layout {
    fn new(
        buffer_len: usize,
        origin: usize,
        elem_size: usize,
        dims: Vec<usize>,
        strides: Vec<usize>,
    ) -> Result<Self, SaveboxError> {
        if elem_size == 0 {
            return Err(SaveboxError::InvalidView("element size is zero".into()));
        }
        if dims.len() != strides.len() {
            return Err(SaveboxError::InvalidView(format!(
                "{} dims but {} strides",
                dims.len(),
                strides.len()
            )));
        }
        if let Some(axis) = dims.iter().position(|&d| d == 0) {
            return Err(SaveboxError::InvalidView(format!("dimension {axis} is zero")));
        }
        if let Some(axis) = strides.iter().position(|&s| s == 0) {
            return Err(SaveboxError::InvalidView(format!("stride {axis} is zero")));
        }
        let overflow = || SaveboxError::InvalidView("view extent overflows usize".into());
        let mut last = origin;
        for (&d, &s) in dims.iter().zip(&strides) {
            let reach = (d - 1).checked_mul(s).ok_or_else(overflow)?;
            last = last.checked_add(reach).ok_or_else(overflow)?;
        }
        let end = last.checked_add(elem_size).ok_or_else(overflow)?;
        if end > buffer_len {
            return Err(SaveboxError::InvalidView(format!(
                "view reaches byte {end} of a {buffer_len}-byte buffer"
            )));
        }
        Ok(Self {
            origin,
            elem_size,
            dims,
            strides,
        })
    }

    fn num_elements(&self) -> usize {
        self.dims.iter().product()
    }

    fn packed_len(&self) -> usize {
        self.num_elements() * self.elem_size
    }

    /// Calls `f(byte_offset, run_len)` for each maximal run of contiguous
    /// bytes in canonical order. When the innermost stride equals the
    /// element size a whole row is one run.
    fn for_each_run(&self, mut f: impl FnMut(usize, usize)) {
        let rank = self.dims.len();
        if rank == 0 {
            f(self.origin, self.elem_size);
            return;
        }
        let inner = rank - 1;
        let inner_dim = self.dims[inner];
        let inner_stride = self.strides[inner];
        let row_is_run = inner_stride == self.elem_size;

        let mut index = vec![0usize; inner];
        loop {
            let row_base = self.origin
                + index
                    .iter()
                    .zip(&self.strides)
                    .map(|(&i, &s)| i * s)
                    .sum::<usize>();
            if row_is_run {
                f(row_base, inner_dim * self.elem_size);
            } else {
                for k in 0..inner_dim {
                    f(row_base + k * inner_stride, self.elem_size);
                }
            }

            // Odometer over the outer dimensions.
            let mut axis = inner;
            loop {
                if axis == 0 {
                    return;
                }
                axis -= 1;
                index[axis] += 1;
                if index[axis] < self.dims[axis] {
                    break;
                }
                index[axis] = 0;
            }
        }
    }
}

fn elements_to_bytes(strides: &[usize], elem_size: usize) -> Result<Vec<usize>, SaveboxError> {
    strides
        .iter()
        .map(|&s| {
            s.checked_mul(elem_size)
                .ok_or_else(|| SaveboxError::InvalidView("stride overflows usize".into()))
        })
        .collect()
}

/// Read-only strided view, the source of a write.
#[derive(Debug, Clone)]
pub struct StridedView<'a> {
    data: &'a [u8],
    layout: Layout,
}

impl<'a> StridedView<'a> {
    /// Builds a view over raw bytes with byte strides.
    ///
    /// # Errors
    ///
    /// [`SaveboxError::InvalidView`] if ranks differ, a stride, dimension, or
    /// the element size is zero, or the addressed extent exceeds `data`.
    pub fn new(
        data: &'a [u8],
        origin: usize,
        elem_size: usize,
        dims: impl Into<Vec<usize>>,
        byte_strides: impl Into<Vec<usize>>,
    ) -> Result<Self, SaveboxError> {
        let layout = Layout::new(
            data.len(),
            origin,
            elem_size,
            dims.into(),
            byte_strides.into(),
        )?;
        Ok(Self { data, layout })
    }

    /// Builds a view over a typed slice with strides counted in elements of `T`.
    pub fn from_slice<T: Pod>(
        data: &'a [T],
        dims: impl Into<Vec<usize>>,
        strides: &[usize],
    ) -> Result<Self, SaveboxError> {
        let size = std::mem::size_of::<T>();
        Self::new(
            bytemuck::cast_slice(data),
            0,
            size,
            dims,
            elements_to_bytes(strides, size)?,
        )
    }

    /// Builds a padding-free row-major view over a typed slice.
    pub fn contiguous<T: Pod>(
        data: &'a [T],
        dims: impl Into<Vec<usize>>,
    ) -> Result<Self, SaveboxError> {
        let dims = dims.into();
        let strides = row_major_strides(&dims, 1);
        Self::from_slice(data, dims, &strides)
    }

    /// Bytes per element.
    pub fn elem_size(&self) -> usize {
        self.layout.elem_size
    }

    /// Extents.
    pub fn dims(&self) -> &[usize] {
        &self.layout.dims
    }

    /// Byte strides.
    pub fn strides(&self) -> &[usize] {
        &self.layout.strides
    }

    /// Length of the packed representation.
    pub fn packed_len(&self) -> usize {
        self.layout.packed_len()
    }
}

/// Writable strided view, the destination of a read.
#[derive(Debug)]
pub struct StridedViewMut<'a> {
    data: &'a mut [u8],
    layout: Layout,
}

impl<'a> StridedViewMut<'a> {
    /// Builds a view over raw bytes with byte strides.
    ///
    /// # Errors
    ///
    /// Same conditions as [`StridedView::new`].
    pub fn new(
        data: &'a mut [u8],
        origin: usize,
        elem_size: usize,
        dims: impl Into<Vec<usize>>,
        byte_strides: impl Into<Vec<usize>>,
    ) -> Result<Self, SaveboxError> {
        let layout = Layout::new(
            data.len(),
            origin,
            elem_size,
            dims.into(),
            byte_strides.into(),
        )?;
        Ok(Self { data, layout })
    }

    /// Builds a view over a typed slice with strides counted in elements of `T`.
    pub fn from_slice<T: Pod>(
        data: &'a mut [T],
        dims: impl Into<Vec<usize>>,
        strides: &[usize],
    ) -> Result<Self, SaveboxError> {
        let size = std::mem::size_of::<T>();
        let byte_strides = elements_to_bytes(strides, size)?;
        Self::new(bytemuck::cast_slice_mut(data), 0, size, dims, byte_strides)
    }

    /// Builds a padding-free row-major view over a typed slice.
    pub fn contiguous<T: Pod>(
        data: &'a mut [T],
        dims: impl Into<Vec<usize>>,
    ) -> Result<Self, SaveboxError> {
        let dims = dims.into();
        let strides = row_major_strides(&dims, 1);
        Self::from_slice(data, dims, &strides)
    }

    /// Bytes per element.
    pub fn elem_size(&self) -> usize {
        self.layout.elem_size
    }

    /// Extents.
    pub fn dims(&self) -> &[usize] {
        &self.layout.dims
    }

    /// Byte strides.
    pub fn strides(&self) -> &[usize] {
        &self.layout.strides
    }

    /// Length of the packed representation.
    pub fn packed_len(&self) -> usize {
        self.layout.packed_len()
    }

    /// Read-only view of the same layout.
    pub fn as_view(&self) -> StridedView<'_> {
        StridedView {
            data: &*self.data,
            layout: self.layout.clone(),
        }
    }
}

/// Packs `view` into a new canonical buffer.
pub fn pack(view: &StridedView<'_>) -> Vec<u8> {
    let mut out = Vec::with_capacity(view.packed_len());
    pack_into(view, &mut out);
    out
}

/// Appends the canonical bytes of `view` to `out`.
pub fn pack_into(view: &StridedView<'_>, out: &mut Vec<u8>) {
    out.reserve(view.packed_len());
    view.layout.for_each_run(|offset, len| {
        out.extend_from_slice(&view.data[offset..offset + len]);
    });
}

/// Scatters canonical `bytes` into `view`.
///
/// # Errors
///
/// [`SaveboxError::SizeMismatch`] if `bytes` is not exactly the packed
/// length of the view. Nothing is written in that case.
pub fn unpack(bytes: &[u8], view: &mut StridedViewMut<'_>) -> Result<(), SaveboxError> {
    let expected = view.packed_len();
    if bytes.len() != expected {
        return Err(SaveboxError::SizeMismatch {
            expected,
            actual: bytes.len(),
        });
    }
    let data = &mut *view.data;
    let mut cursor = 0;
    view.layout.for_each_run(|offset, len| {
        data[offset..offset + len].copy_from_slice(&bytes[cursor..cursor + len]);
        cursor += len;
    });
    Ok(())
}
