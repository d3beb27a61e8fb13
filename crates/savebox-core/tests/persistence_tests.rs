// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>

#![allow(missing_docs, clippy::unwrap_used, clippy::panic, clippy::float_cmp)]
//! Write, close, reopen, read: the documents on disk carry everything a later
//! process needs.

use std::fs;

use savebox_core::{
    ElementKind, FieldMetaInfo, FileLayout, MetaValue, OpenMode, SaveboxError, Savepoint,
    Serializer, SerializerConfig, StridedView, StridedViewMut,
};
use tempfile::TempDir;

fn step(cycle: i32) -> Savepoint {
    Savepoint::new(format!("step{cycle}"))
        .with("cycle", cycle)
        .unwrap()
}

fn u_at(cycle: i32) -> Vec<f64> {
    (0..10).map(|i| f64::from(cycle) * 100.0 + f64::from(i)).collect()
}

fn v_at(cycle: i32) -> Vec<i32> {
    (0..16).map(|i| cycle * 1000 + i).collect()
}

fn write_run(dir: &TempDir, config: SerializerConfig) {
    let mut ser = Serializer::open_with(OpenMode::Write, dir.path(), "run", config).unwrap();
    ser.global_meta_info_mut().insert("code", "demo").unwrap();
    ser.add_field(
        FieldMetaInfo::with_kind("u", ElementKind::Float64, [10])
            .unwrap()
            .with("units", "m/s")
            .unwrap(),
    )
    .unwrap();
    ser.add_field(FieldMetaInfo::with_kind("v", ElementKind::Int32, [4, 4]).unwrap())
        .unwrap();
    for cycle in 0..3 {
        ser.write_slice("u", &step(cycle), &u_at(cycle)).unwrap();
        ser.write_slice("v", &step(cycle), &v_at(cycle)).unwrap();
    }
    ser.close().unwrap();
}

// ── 1. Round trip across a reopen ───────────────────────────────────────

#[test]
fn documents_round_trip_through_read_mode() {
    let dir = TempDir::new().unwrap();
    write_run(&dir, SerializerConfig::default());

    assert!(dir.path().join("MetaData-run.json").exists());
    assert!(dir.path().join("ArchiveMetaData-run.json").exists());
    assert!(dir.path().join("run.u.dat").exists());
    assert!(dir.path().join("run.v.dat").exists());

    let ser = Serializer::open(OpenMode::Read, dir.path(), "run").unwrap();
    assert_eq!(
        ser.global_meta_info().get("code"),
        Some(&MetaValue::from("demo"))
    );
    assert_eq!(ser.field_names().collect::<Vec<_>>(), vec!["u", "v"]);
    let u = ser.field_meta_info("u").unwrap();
    assert_eq!(u.dims(), &[10]);
    assert_eq!(u.meta_info().get("units").and_then(MetaValue::as_str), Some("m/s"));

    let names: Vec<_> = ser.savepoints().map(Savepoint::name).collect();
    assert_eq!(names, vec!["step0", "step1", "step2"]);

    for cycle in 0..3 {
        let mut u = vec![0.0_f64; 10];
        ser.read_slice("u", &step(cycle), &mut u).unwrap();
        assert_eq!(u, u_at(cycle));

        let mut v = vec![0_i32; 16];
        ser.read_slice("v", &step(cycle), &mut v).unwrap();
        assert_eq!(v, v_at(cycle));
    }
}

#[test]
fn read_mode_rejects_writes() {
    let dir = TempDir::new().unwrap();
    write_run(&dir, SerializerConfig::default());

    let mut ser = Serializer::open(OpenMode::Read, dir.path(), "run").unwrap();
    let err = ser.write_slice("u", &step(9), &u_at(9)).unwrap_err();
    assert!(matches!(
        err,
        SaveboxError::InvalidMode {
            operation: "write",
            ..
        }
    ));
    // Read mode never rewrites the documents.
    ser.update_meta_data().unwrap();
}

#[test]
fn missing_documents_fail_read_mode() {
    let dir = TempDir::new().unwrap();
    let err = Serializer::open(OpenMode::Read, dir.path(), "run").unwrap_err();
    assert!(matches!(err, SaveboxError::MetaDataNotFound(_)));

    write_run(&dir, SerializerConfig::default());
    fs::remove_file(dir.path().join("ArchiveMetaData-run.json")).unwrap();
    let err = Serializer::open(OpenMode::Read, dir.path(), "run").unwrap_err();
    assert!(matches!(err, SaveboxError::ArchiveMetaDataNotFound(_)));
}

// ── 2. Strided views ────────────────────────────────────────────────────

#[test]
fn padded_rows_pack_only_the_payload() {
    // Logical [2, 3, 4] float32 array stored with rows padded to 6 elements.
    let dir = TempDir::new().unwrap();
    let mut ser = Serializer::open(OpenMode::Write, dir.path(), "pad").unwrap();
    ser.add_field(FieldMetaInfo::with_kind("w", ElementKind::Float32, [2, 3, 4]).unwrap())
        .unwrap();

    let mut padded = vec![-1.0_f32; 2 * 3 * 6];
    let mut next = 0.0_f32;
    for i in 0..2 {
        for j in 0..3 {
            for k in 0..4 {
                padded[i * 18 + j * 6 + k] = next;
                next += 1.0;
            }
        }
    }
    let sp = Savepoint::new("s");
    let view = StridedView::from_slice(&padded, [2, 3, 4], &[18, 6, 1]).unwrap();
    ser.write("w", &sp, &view).unwrap();
    ser.close().unwrap();

    let bytes = fs::read(dir.path().join("pad.w.dat")).unwrap();
    assert_eq!(bytes.len(), 24 * 4);
    let packed: Vec<f32> = bytemuck::pod_collect_to_vec(&bytes);
    assert_eq!(packed, (0..24_u8).map(f32::from).collect::<Vec<_>>());

    // Read back into a differently padded buffer.
    let ser = Serializer::open(OpenMode::Read, dir.path(), "pad").unwrap();
    let mut out = vec![7.0_f32; 2 * 4 * 5];
    let mut view = StridedViewMut::from_slice(&mut out, [2, 3, 4], &[20, 5, 1]).unwrap();
    ser.read("w", &sp, &mut view).unwrap();
    assert_eq!(out[5 + 2], 6.0);
    assert_eq!(out[20 + 2 * 5 + 3], 23.0);
    assert_eq!(out[4], 7.0);
    assert_eq!(out[3 * 5], 7.0);
}

// ── 3. Append ───────────────────────────────────────────────────────────

#[test]
fn append_extends_without_disturbing_earlier_tokens() {
    let dir = TempDir::new().unwrap();
    write_run(&dir, SerializerConfig::default());

    let mut ser = Serializer::open(OpenMode::Append, dir.path(), "run").unwrap();
    assert_eq!(ser.savepoints().len(), 3);
    ser.write_slice("u", &step(3), &u_at(3)).unwrap();
    assert!(matches!(
        ser.write_slice("u", &step(1), &u_at(1)),
        Err(SaveboxError::DuplicateWrite { .. })
    ));
    ser.close().unwrap();

    let ser = Serializer::open(OpenMode::Read, dir.path(), "run").unwrap();
    for cycle in 0..4 {
        let mut u = vec![0.0_f64; 10];
        ser.read_slice("u", &step(cycle), &mut u).unwrap();
        assert_eq!(u, u_at(cycle));
    }
    assert_eq!(ser.savepoints_of_field("v").count(), 3);
    assert_eq!(ser.savepoints_of_field("u").count(), 4);
}

#[test]
fn append_into_empty_directory_starts_fresh() {
    let dir = TempDir::new().unwrap();
    let nested = dir.path().join("a").join("b");
    let mut ser = Serializer::open(OpenMode::Append, &nested, "run").unwrap();
    assert_eq!(ser.field_names().count(), 0);
    ser.add_field(FieldMetaInfo::with_kind("x", ElementKind::UInt8, [3]).unwrap())
        .unwrap();
    ser.write_slice("x", &Savepoint::new("s"), &[1_u8, 2, 3]).unwrap();
    ser.close().unwrap();
    assert!(nested.join("MetaData-run.json").exists());
}

#[test]
fn append_session_without_writes_reopens_in_read_mode() {
    let dir = TempDir::new().unwrap();
    let mut ser = Serializer::open(OpenMode::Append, dir.path(), "run").unwrap();
    ser.add_field(FieldMetaInfo::with_kind("x", ElementKind::UInt8, [3]).unwrap())
        .unwrap();
    ser.close().unwrap();
    assert!(dir.path().join("ArchiveMetaData-run.json").exists());

    let ser = Serializer::open(OpenMode::Read, dir.path(), "run").unwrap();
    assert_eq!(ser.field_names().collect::<Vec<_>>(), vec!["x"]);
    assert_eq!(ser.archive().num_entries(), 0);
}

#[test]
fn write_mode_discards_previous_run() {
    let dir = TempDir::new().unwrap();
    write_run(&dir, SerializerConfig::default());

    let ser = Serializer::open(OpenMode::Write, dir.path(), "run").unwrap();
    assert_eq!(ser.field_names().count(), 0);
    assert_eq!(ser.savepoints().len(), 0);
    assert!(!dir.path().join("MetaData-run.json").exists());
    assert!(!dir.path().join("run.u.dat").exists());
}

#[test]
fn dropping_without_close_does_not_flush() {
    let dir = TempDir::new().unwrap();
    {
        let mut ser = Serializer::open(OpenMode::Write, dir.path(), "run").unwrap();
        ser.add_field(FieldMetaInfo::with_kind("x", ElementKind::Int8, [1]).unwrap())
            .unwrap();
    }
    assert!(!dir.path().join("MetaData-run.json").exists());
}

// ── 4. Layout and integrity ─────────────────────────────────────────────

#[test]
fn single_file_layout_round_trips() {
    let dir = TempDir::new().unwrap();
    write_run(
        &dir,
        SerializerConfig::default().with_layout(FileLayout::Single),
    );
    assert!(dir.path().join("run.dat").exists());
    assert!(!dir.path().join("run.u.dat").exists());

    let ser = Serializer::open(OpenMode::Read, dir.path(), "run").unwrap();
    let mut v = vec![0_i32; 16];
    ser.read_slice("v", &step(2), &mut v).unwrap();
    assert_eq!(v, v_at(2));
}

#[test]
fn tampered_data_is_detected() {
    let dir = TempDir::new().unwrap();
    write_run(&dir, SerializerConfig::default());

    let path = dir.path().join("run.u.dat");
    let mut bytes = fs::read(&path).unwrap();
    bytes[0] ^= 0xFF;
    fs::write(&path, bytes).unwrap();

    let ser = Serializer::open(OpenMode::Read, dir.path(), "run").unwrap();
    let mut u = vec![0.0_f64; 10];
    assert!(matches!(
        ser.read_slice("u", &step(0), &mut u),
        Err(SaveboxError::ChecksumMismatch { .. })
    ));
    // Other entries of the same file are unaffected.
    ser.read_slice("u", &step(1), &mut u).unwrap();
    assert_eq!(u, u_at(1));
}

#[test]
fn prefixes_sharing_a_directory_do_not_clobber_each_other() {
    let dir = TempDir::new().unwrap();
    let sp = Savepoint::new("s");

    let mut run = Serializer::open(OpenMode::Write, dir.path(), "run").unwrap();
    run.add_field(FieldMetaInfo::with_kind("a_b", ElementKind::UInt8, [4]).unwrap())
        .unwrap();
    run.write_slice("a_b", &sp, &[1_u8, 2, 3, 4]).unwrap();
    run.close().unwrap();

    let mut other = Serializer::open(OpenMode::Write, dir.path(), "run_a").unwrap();
    other
        .add_field(FieldMetaInfo::with_kind("b", ElementKind::UInt8, [2]).unwrap())
        .unwrap();
    other.write_slice("b", &sp, &[9_u8, 9]).unwrap();
    other.close().unwrap();

    let run = Serializer::open(OpenMode::Read, dir.path(), "run").unwrap();
    let mut out = [0_u8; 4];
    run.read_slice("a_b", &sp, &mut out).unwrap();
    assert_eq!(out, [1, 2, 3, 4]);

    assert!(matches!(
        Serializer::open(OpenMode::Write, dir.path(), "run.a"),
        Err(SaveboxError::InvalidName(_))
    ));
}

#[test]
fn non_finite_annotations_never_reach_the_document() {
    let dir = TempDir::new().unwrap();
    let mut ser = Serializer::open(OpenMode::Write, dir.path(), "run").unwrap();
    assert!(matches!(
        ser.global_meta_info_mut().insert("dt", f64::NAN),
        Err(SaveboxError::InvalidType(_))
    ));
    ser.global_meta_info_mut().insert("dt", 0.5_f64).unwrap();
    ser.add_field(FieldMetaInfo::with_kind("x", ElementKind::Int8, [1]).unwrap())
        .unwrap();
    ser.write_slice("x", &Savepoint::new("s"), &[7_i8]).unwrap();
    ser.close().unwrap();

    let ser = Serializer::open(OpenMode::Read, dir.path(), "run").unwrap();
    assert_eq!(
        ser.global_meta_info().get("dt").and_then(MetaValue::as_f64),
        Some(0.5)
    );
}

#[test]
fn config_file_selects_layout() {
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("savebox.json");
    fs::write(&config_path, r#"{"layout": "single"}"#).unwrap();
    let config = SerializerConfig::load(&config_path).unwrap().unwrap();

    let data_dir = dir.path().join("data");
    let mut ser = Serializer::open_with(OpenMode::Write, &data_dir, "cfg", config).unwrap();
    ser.add_field(FieldMetaInfo::with_kind("x", ElementKind::Int64, Vec::new()).unwrap())
        .unwrap();
    ser.write_slice("x", &Savepoint::new("s"), &[42_i64]).unwrap();
    ser.close().unwrap();
    assert_eq!(fs::read(data_dir.join("cfg.dat")).unwrap(), 42_i64.to_ne_bytes());
}
