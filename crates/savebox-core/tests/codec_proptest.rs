// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>

#![allow(missing_docs, clippy::unwrap_used)]
use proptest::prelude::*;

use savebox_core::{pack, unpack, StridedView, StridedViewMut};

/// Dims, element size, and per-dimension padding (in elements) for a view
/// whose strides are the row-major strides of the padded extents.
fn layout() -> impl Strategy<Value = (Vec<usize>, usize, Vec<usize>)> {
    (1usize..=4)
        .prop_flat_map(|rank| {
            (
                prop::collection::vec(1usize..=5, rank),
                prop::sample::select(vec![1usize, 2, 4, 8]),
                prop::collection::vec(0usize..=3, rank),
            )
        })
}

fn padded_strides(dims: &[usize], pad: &[usize], elem: usize) -> (Vec<usize>, usize) {
    let mut strides = vec![0; dims.len()];
    let mut acc = elem;
    for i in (0..dims.len()).rev() {
        strides[i] = acc;
        acc *= dims[i] + pad[i];
    }
    (strides, acc)
}

/// Canonical-order element offsets of a strided view, computed directly.
fn element_offsets(dims: &[usize], strides: &[usize], origin: usize) -> Vec<usize> {
    let mut out = vec![origin];
    for (&d, &s) in dims.iter().zip(strides) {
        out = out
            .iter()
            .flat_map(|&base| (0..d).map(move |i| base + i * s))
            .collect();
    }
    out
}

proptest! {
    #[test]
    fn pack_then_unpack_restores_payload_and_keeps_padding(
        (dims, elem, pad) in layout(),
        origin in 0usize..=7,
        seed in any::<u8>(),
    ) {
        let (strides, extent) = padded_strides(&dims, &pad, elem);
        let len = origin + extent;
        let source: Vec<u8> = (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect();

        let view = StridedView::new(&source, origin, elem, dims.clone(), strides.clone()).unwrap();
        let packed = pack(&view);
        let count: usize = dims.iter().product();
        prop_assert_eq!(packed.len(), count * elem);

        let offsets = element_offsets(&dims, &strides, origin);
        for (n, &off) in offsets.iter().enumerate() {
            prop_assert_eq!(&packed[n * elem..(n + 1) * elem], &source[off..off + elem]);
        }

        let mut dest = vec![0xEE_u8; len];
        let mut out = StridedViewMut::new(&mut dest, origin, elem, dims.clone(), strides.clone()).unwrap();
        unpack(&packed, &mut out).unwrap();

        let mut touched = vec![false; len];
        for &off in &offsets {
            touched[off..off + elem].iter_mut().for_each(|t| *t = true);
        }
        for ((&got, &src), &hit) in dest.iter().zip(&source).zip(&touched) {
            prop_assert_eq!(got, if hit { src } else { 0xEE });
        }
    }

    #[test]
    fn views_past_the_buffer_are_rejected(
        (dims, elem, pad) in layout(),
        short_by in 1usize..=8,
    ) {
        let (strides, extent) = padded_strides(&dims, &pad, elem);
        let last = dims.iter().zip(&strides).map(|(&d, &s)| (d - 1) * s).sum::<usize>() + elem;
        prop_assume!(last >= short_by);
        let buf = vec![0u8; last - short_by];
        prop_assert!(extent >= last);
        prop_assert!(StridedView::new(&buf, 0, elem, dims, strides).is_err());
    }
}
