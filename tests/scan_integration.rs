//! Purpose: End-to-end scan behavior over generated db721 files.
//! Exports: Integration tests only (no runtime exports).
//! Role: Exercise the public `api` surface the way the CLI and ABI use it.
//! Invariants: Every file is built by the shared fixture writer in a temp dir.

#[path = "../src/core/fixture.rs"]
mod fixture;

use std::thread;

use db721::api::{
    CursorResult, DataType, ErrorKind, Row, ScanHandle, ScanOptions, Value, close_scan,
    describe_schema, fetch_next, open_scan, open_scan_with, read_descriptor, rescan,
};
use fixture::{FixtureColumn, FixtureFile, assemble, farm, write_raw};

fn drain(handle: &mut ScanHandle) -> Vec<Row> {
    let mut rows = Vec::new();
    while let CursorResult::Row(row) = fetch_next(handle).expect("fetch") {
        rows.push(row);
    }
    rows
}

fn bool_column_file(dir: &std::path::Path) -> std::path::PathBuf {
    let metadata = r#"{"Table": "Flags", "Columns": {"flag": {"type": "bool", "block_stats": {"0": {"num": 2}}, "num_blocks": 1, "start_offset": 0}}, "Max Values Per Block": 4}"#;
    write_raw(dir, "flags.db721", &assemble(&[0u8; 8], metadata))
}

#[test]
fn farm_scan_yields_paired_rows() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = farm().write_to(dir.path(), "farm.db721");

    let mut handle = open_scan(&path).expect("open");
    let rows = drain(&mut handle);
    assert_eq!(rows.len(), 3);
    assert_eq!(
        rows[0].values,
        vec![Value::Int(10), Value::Str("Cornfield Acres".to_string())]
    );
    assert_eq!(
        rows[2].values,
        vec![Value::Int(30), Value::Str("Windy Ridge".to_string())]
    );
    assert_eq!(fetch_next(&mut handle).expect("end"), CursorResult::EndOfScan);
    close_scan(&mut handle);
}

#[test]
fn schema_follows_key_order_not_offsets() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = FixtureFile::new("Chickens", 3)
        .column("identifier", FixtureColumn::Int(vec![1, 2, 3, 4]))
        .column("farm_name", FixtureColumn::strs(&["a", "b", "c", "d"]))
        .column("weight_g", FixtureColumn::Float(vec![1.0, 2.0, 3.0, 4.0]))
        .reverse_data_order()
        .write_to(dir.path(), "chickens.db721");

    let schema = describe_schema(&path).expect("schema");
    assert_eq!(
        schema,
        vec![
            ("identifier".to_string(), DataType::Int),
            ("farm_name".to_string(), DataType::Str),
            ("weight_g".to_string(), DataType::Float),
        ]
    );

    let descriptor = read_descriptor(&path).expect("descriptor");
    for column in &descriptor.columns {
        let end = column.start_offset + column.num_records() * u64::from(column.element_width());
        assert!(end <= descriptor.file_size);
    }

    let mut handle = open_scan(&path).expect("open");
    let rows = drain(&mut handle);
    assert_eq!(
        rows[3].values,
        vec![Value::Int(4), Value::Str("d".to_string()), Value::Float(4.0)]
    );
}

#[test]
fn rows_span_multiple_blocks() {
    let dir = tempfile::tempdir().expect("tempdir");
    let ids = (0..1000).collect::<Vec<i32>>();
    let weights = ids.iter().map(|id| *id as f32 * 0.25).collect::<Vec<_>>();
    let path = FixtureFile::new("Big", 64)
        .column("id", FixtureColumn::Int(ids))
        .column("weight", FixtureColumn::Float(weights))
        .write_to(dir.path(), "big.db721");

    let descriptor = read_descriptor(&path).expect("descriptor");
    assert_eq!(descriptor.num_rows(), 1000);
    assert_eq!(descriptor.columns[0].num_blocks, 16);
    assert_eq!(descriptor.columns[0].block_stats[15].num, 1000 - 15 * 64);

    let mut handle = open_scan(&path).expect("open");
    let rows = drain(&mut handle);
    assert_eq!(rows.len(), 1000);
    for (idx, row) in rows.iter().enumerate() {
        assert_eq!(
            row.values,
            vec![Value::Int(idx as i32), Value::Float(idx as f32 * 0.25)]
        );
    }
}

#[test]
fn rescan_reproduces_the_sequence() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = farm().write_to(dir.path(), "farm.db721");
    let mut handle = open_scan(&path).expect("open");

    let first = drain(&mut handle);
    rescan(&mut handle).expect("rescan");
    let second = drain(&mut handle);
    assert_eq!(first, second);

    fetch_next(&mut handle).expect("end");
    rescan(&mut handle).expect("rescan again");
    match fetch_next(&mut handle).expect("first row") {
        CursorResult::Row(row) => assert_eq!(row, first[0]),
        CursorResult::EndOfScan => panic!("expected a row after rescan"),
    }
}

#[test]
fn concurrent_scans_are_independent() {
    let dir = tempfile::tempdir().expect("tempdir");
    let values = (0..257).collect::<Vec<i32>>();
    let names = values.iter().map(|v| format!("farm-{v}")).collect::<Vec<_>>();
    let name_refs = names.iter().map(String::as_str).collect::<Vec<_>>();
    let path = FixtureFile::new("T", 16)
        .column("n", FixtureColumn::Int(values))
        .column("name", FixtureColumn::strs(&name_refs))
        .write_to(dir.path(), "t.db721");

    let workers = (0..4)
        .map(|_| {
            let path = path.clone();
            thread::spawn(move || {
                let mut handle = open_scan(&path).expect("open");
                let rows = drain(&mut handle);
                close_scan(&mut handle);
                rows
            })
        })
        .collect::<Vec<_>>();
    let results = workers
        .into_iter()
        .map(|worker| worker.join().expect("join"))
        .collect::<Vec<_>>();

    assert_eq!(results[0].len(), 257);
    for rows in &results[1..] {
        assert_eq!(rows, &results[0]);
    }
}

#[test]
fn handles_can_move_between_threads() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = farm().write_to(dir.path(), "farm.db721");
    let mut handle = open_scan(&path).expect("open");
    fetch_next(&mut handle).expect("first");

    let remaining = thread::spawn(move || drain(&mut handle))
        .join()
        .expect("join");
    assert_eq!(remaining.len(), 2);
}

#[test]
fn oversized_metadata_length_is_truncated_read() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut bytes = farm().build();
    let len = bytes.len();
    bytes[len - 4..].copy_from_slice(&((len as u32) + 100).to_le_bytes());
    let path = write_raw(dir.path(), "bad.db721", &bytes);

    let err = describe_schema(&path).expect_err("schema");
    assert_eq!(err.kind(), ErrorKind::TruncatedRead);
    let err = open_scan(&path).expect_err("scan");
    assert_eq!(err.kind(), ErrorKind::TruncatedRead);
}

#[test]
fn truncated_column_data_fails_the_open() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (data, metadata) = farm().parts();
    let path = write_raw(
        dir.path(),
        "short.db721",
        &assemble(&data[..data.len() - 10], &metadata),
    );
    let err = open_scan(&path).expect_err("short");
    assert_eq!(err.kind(), ErrorKind::TruncatedRead);
    assert_eq!(err.column(), Some("farm_name"));
    assert_eq!(err.path(), Some(path.as_path()));
}

#[test]
fn unsupported_type_fails_schema_and_scan() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = bool_column_file(dir.path());
    assert_eq!(
        describe_schema(&path).expect_err("schema").kind(),
        ErrorKind::UnsupportedType
    );
    assert_eq!(
        open_scan(&path).expect_err("scan").kind(),
        ErrorKind::UnsupportedType
    );
}

#[test]
fn projection_yields_requested_columns_only() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = farm().write_to(dir.path(), "farm.db721");
    let options = ScanOptions::new().with_columns(["farm_name"]);
    let mut handle = open_scan_with(&path, &options).expect("open");
    assert_eq!(handle.schema(), vec![("farm_name".to_string(), DataType::Str)]);

    let rows = drain(&mut handle);
    let names = rows
        .iter()
        .map(|row| row.values.clone())
        .collect::<Vec<_>>();
    assert_eq!(
        names,
        vec![
            vec![Value::Str("Cornfield Acres".to_string())],
            vec![Value::Str("Dew Drop Farm".to_string())],
            vec![Value::Str("Windy Ridge".to_string())],
        ]
    );
}

#[test]
fn closed_handle_rejects_fetch_and_rescan() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = farm().write_to(dir.path(), "farm.db721");
    let mut handle = open_scan(&path).expect("open");
    close_scan(&mut handle);
    close_scan(&mut handle);
    assert_eq!(fetch_next(&mut handle).expect_err("fetch").kind(), ErrorKind::Usage);
    assert_eq!(rescan(&mut handle).expect_err("rescan").kind(), ErrorKind::Usage);
}

#[test]
fn max_tokens_option_bounds_metadata() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = farm().write_to(dir.path(), "farm.db721");
    let err = open_scan_with(&path, &ScanOptions::new().with_max_tokens(10)).expect_err("limit");
    assert_eq!(err.kind(), ErrorKind::Parse);
    assert!(err.hint().is_some());
    open_scan_with(&path, &ScanOptions::new().with_max_tokens(1000)).expect("fits");
}
