//! Purpose: C ABI bridge for non-Rust callers (libdb721).
//! Exports: C-callable scan lifecycle, schema description, and buffer/error helpers.
//! Role: Stable ABI surface over `crate::api`.
//! Invariants: JSON bytes out; opaque handles; explicit free functions.
//! Invariants: Error kinds map 1:1 with `to_exit_code` values.
//! Notes: `db721_scan_next` returns 1 for a row, 0 at end of scan, -1 on error.
#![allow(clippy::result_large_err)]
#![allow(non_camel_case_types)]

use crate::api::{
    CursorResult, ScanHandle, ScanOptions, open_scan_with, read_descriptor_with, to_exit_code,
};
use crate::core::error::{Error, ErrorKind};
use crate::core::meta::ParseOptions;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::path::PathBuf;
use std::ptr;

#[repr(C)]
pub struct db721_scan {
    handle: ScanHandle,
}

#[repr(C)]
pub struct db721_buf {
    data: *mut u8,
    len: usize,
}

#[repr(C)]
pub struct db721_error {
    kind: i32,
    message: *mut c_char,
    path: *mut c_char,
    column: *mut c_char,
    field: *mut c_char,
    hint: *mut c_char,
    offset: u64,
    expected_len: u64,
    row: u64,
    has_offset: u8,
    has_expected_len: u8,
    has_row: u8,
}

#[unsafe(no_mangle)]
pub extern "C" fn db721_scan_open(
    path: *const c_char,
    out_scan: *mut *mut db721_scan,
    out_err: *mut *mut db721_error,
) -> i32 {
    db721_scan_open_columns(path, ptr::null(), 0, 0, out_scan, out_err)
}

/// Opens a scan over `columns` (all columns when `columns` is null).
/// `max_tokens` of 0 keeps the default metadata token limit.
#[unsafe(no_mangle)]
pub extern "C" fn db721_scan_open_columns(
    path: *const c_char,
    columns: *const *const c_char,
    columns_len: usize,
    max_tokens: usize,
    out_scan: *mut *mut db721_scan,
    out_err: *mut *mut db721_error,
) -> i32 {
    if out_scan.is_null() {
        return fail(
            out_err,
            Error::new(ErrorKind::Usage).with_message("out_scan is null"),
        );
    }
    let path = match parse_path(path) {
        Ok(path) => path,
        Err(err) => return fail(out_err, err),
    };
    let mut options = ScanOptions::new().with_parse(parse_options(max_tokens));
    if !columns.is_null() {
        match parse_strings(columns, columns_len) {
            Ok(names) => options = options.with_columns(names),
            Err(err) => return fail(out_err, err),
        }
    }
    let handle = match open_scan_with(&path, &options) {
        Ok(handle) => handle,
        Err(err) => return fail(out_err, err),
    };
    let scan = Box::new(db721_scan { handle });
    unsafe {
        *out_scan = Box::into_raw(scan);
    }
    0
}

/// Writes the next row as a JSON array into `out_row`.
#[unsafe(no_mangle)]
pub extern "C" fn db721_scan_next(
    scan: *mut db721_scan,
    out_row: *mut db721_buf,
    out_err: *mut *mut db721_error,
) -> i32 {
    let scan = match borrow_scan(scan, out_err) {
        Ok(scan) => scan,
        Err(code) => return code,
    };
    if out_row.is_null() {
        return fail(
            out_err,
            Error::new(ErrorKind::Usage).with_message("out_row is null"),
        );
    }
    match scan.handle.next() {
        Ok(CursorResult::Row(row)) => match write_json_buf(out_row, &row) {
            Ok(()) => 1,
            Err(err) => fail(out_err, err),
        },
        Ok(CursorResult::EndOfScan) => 0,
        Err(err) => fail(out_err, err),
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn db721_scan_rescan(scan: *mut db721_scan, out_err: *mut *mut db721_error) -> i32 {
    let scan = match borrow_scan(scan, out_err) {
        Ok(scan) => scan,
        Err(code) => return code,
    };
    match scan.handle.restart() {
        Ok(()) => 0,
        Err(err) => fail(out_err, err),
    }
}

/// Closes the scan and frees the handle.
#[unsafe(no_mangle)]
pub extern "C" fn db721_scan_free(scan: *mut db721_scan) {
    if scan.is_null() {
        return;
    }
    unsafe {
        let mut scan = Box::from_raw(scan);
        scan.handle.close();
    }
}

/// Writes `{"table", "max_values_per_block", "num_rows", "columns": [{"name", "type"}]}`.
#[unsafe(no_mangle)]
pub extern "C" fn db721_describe_schema(
    path: *const c_char,
    out_json: *mut db721_buf,
    out_err: *mut *mut db721_error,
) -> i32 {
    if out_json.is_null() {
        return fail(
            out_err,
            Error::new(ErrorKind::Usage).with_message("out_json is null"),
        );
    }
    let path = match parse_path(path) {
        Ok(path) => path,
        Err(err) => return fail(out_err, err),
    };
    let descriptor = match read_descriptor_with(&path, &ParseOptions::default()) {
        Ok(descriptor) => descriptor,
        Err(err) => return fail(out_err, err),
    };
    let columns = descriptor
        .columns
        .iter()
        .map(|column| serde_json::json!({ "name": column.name, "type": column.data_type }))
        .collect::<Vec<_>>();
    let json = serde_json::json!({
        "table": descriptor.table_name,
        "max_values_per_block": descriptor.max_values_per_block,
        "num_rows": descriptor.num_rows(),
        "columns": columns,
    });
    match write_json_buf(out_json, &json) {
        Ok(()) => 0,
        Err(err) => fail(out_err, err),
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn db721_buf_free(buf: *mut db721_buf) {
    if buf.is_null() {
        return;
    }
    unsafe {
        let buf = &mut *buf;
        if !buf.data.is_null() && buf.len != 0 {
            drop(Vec::from_raw_parts(buf.data, buf.len, buf.len));
        }
        buf.data = ptr::null_mut();
        buf.len = 0;
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn db721_error_free(err: *mut db721_error) {
    if err.is_null() {
        return;
    }
    unsafe {
        let err = Box::from_raw(err);
        for text in [err.message, err.path, err.column, err.field, err.hint] {
            if !text.is_null() {
                drop(CString::from_raw(text));
            }
        }
    }
}

fn borrow_scan<'a>(
    scan: *mut db721_scan,
    out_err: *mut *mut db721_error,
) -> Result<&'a mut db721_scan, i32> {
    if scan.is_null() {
        return Err(fail(
            out_err,
            Error::new(ErrorKind::Usage).with_message("scan is null"),
        ));
    }
    unsafe { Ok(&mut *scan) }
}

fn parse_path(input: *const c_char) -> Result<PathBuf, Error> {
    if input.is_null() {
        return Err(Error::new(ErrorKind::Usage).with_message("path is null"));
    }
    let raw = unsafe { CStr::from_ptr(input) }
        .to_str()
        .map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message("path is not valid UTF-8")
                .with_source(err)
        })?;
    Ok(PathBuf::from(raw))
}

fn parse_strings(items: *const *const c_char, len: usize) -> Result<Vec<String>, Error> {
    let slice = unsafe { std::slice::from_raw_parts(items, len) };
    let mut out = Vec::with_capacity(len);
    for item in slice {
        if item.is_null() {
            return Err(Error::new(ErrorKind::Usage).with_message("columns contains null"));
        }
        let value = unsafe { CStr::from_ptr(*item) }
            .to_str()
            .map_err(|_| Error::new(ErrorKind::Usage).with_message("columns invalid UTF-8"))?
            .to_string();
        out.push(value);
    }
    Ok(out)
}

fn parse_options(max_tokens: usize) -> ParseOptions {
    if max_tokens == 0 {
        ParseOptions::default()
    } else {
        ParseOptions::new().with_max_tokens(max_tokens)
    }
}

fn write_json_buf(out: *mut db721_buf, value: &impl serde::Serialize) -> Result<(), Error> {
    let json_bytes = serde_json::to_vec(value).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("failed to serialize json")
            .with_source(err)
    })?;
    unsafe {
        let buf = &mut *out;
        let mut data = json_bytes.into_boxed_slice();
        buf.len = data.len();
        buf.data = data.as_mut_ptr();
        std::mem::forget(data);
    }
    Ok(())
}

fn fail(out_err: *mut *mut db721_error, err: Error) -> i32 {
    tracing::debug!(error = %err, "abi call failed");
    if out_err.is_null() {
        return -1;
    }
    let error = Box::new(db721_error {
        kind: to_exit_code(err.kind()),
        message: to_c_string(err.message().unwrap_or("")),
        path: err
            .path()
            .map(|path| to_c_string(path.to_string_lossy().as_ref()))
            .unwrap_or(ptr::null_mut()),
        column: err.column().map(to_c_string).unwrap_or(ptr::null_mut()),
        field: err.field().map(to_c_string).unwrap_or(ptr::null_mut()),
        hint: err.hint().map(to_c_string).unwrap_or(ptr::null_mut()),
        offset: err.offset().unwrap_or(0),
        expected_len: err.expected_len().unwrap_or(0),
        row: err.row().unwrap_or(0),
        has_offset: u8::from(err.offset().is_some()),
        has_expected_len: u8::from(err.expected_len().is_some()),
        has_row: u8::from(err.row().is_some()),
    });
    unsafe {
        *out_err = Box::into_raw(error);
    }
    -1
}

fn to_c_string(input: &str) -> *mut c_char {
    CString::new(input)
        .map(|s| s.into_raw())
        .unwrap_or(ptr::null_mut())
}
