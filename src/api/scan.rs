//! Purpose: Open, advance, restart, and close scans over a db721 file.
//! Exports: `ScanHandle`, `ScanOptions`, and the free-function scan lifecycle.
//! Role: Stable boundary for the CLI and C ABI; every scan owns its own state.
//! Invariants: Setup errors (resolve or load) abort the open; no partial handle is returned.
//! Invariants: Projected columns keep descriptor order whatever order they were requested in.
#![allow(clippy::result_large_err)]

use std::path::{Path, PathBuf};

use crate::core::column::load_column;
use crate::core::cursor::{CursorResult, ScanCursor};
use crate::core::error::{Error, ErrorKind};
use crate::core::format::DataType;
use crate::core::meta::ParseOptions;
use crate::core::range::RangeReader;
use crate::core::schema::{FileDescriptor, resolve_from_reader};

pub type ApiResult<T> = Result<T, Error>;

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ScanOptions {
    /// Column names to decode; `None` decodes every column.
    pub columns: Option<Vec<String>>,
    pub parse: ParseOptions,
}

impl ScanOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_parse(mut self, parse: ParseOptions) -> Self {
        self.parse = parse;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.parse = self.parse.with_max_tokens(max_tokens);
        self
    }
}

#[derive(Debug)]
pub struct ScanHandle {
    path: PathBuf,
    cursor: ScanCursor,
}

impl ScanHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn descriptor(&self) -> &FileDescriptor {
        self.cursor.descriptor()
    }

    /// Names and types of the columns each row carries.
    pub fn schema(&self) -> Vec<(String, DataType)> {
        let descriptor = self.cursor.descriptor();
        self.cursor
            .columns()
            .into_iter()
            .filter_map(|name| descriptor.column(name))
            .map(|column| (column.name.clone(), column.data_type))
            .collect()
    }

    pub fn num_rows(&self) -> u64 {
        self.cursor.num_rows()
    }

    pub fn row_index(&self) -> u64 {
        self.cursor.row_index()
    }

    pub fn is_closed(&self) -> bool {
        self.cursor.is_closed()
    }

    pub fn next(&mut self) -> ApiResult<CursorResult> {
        self.cursor
            .next()
            .map_err(|err| err.or_path(&self.path))
    }

    pub fn restart(&mut self) -> ApiResult<()> {
        self.cursor.restart()?;
        tracing::debug!(path = %self.path.display(), "scan restarted");
        Ok(())
    }

    pub fn close(&mut self) {
        if self.cursor.is_closed() {
            return;
        }
        let rows_read = self.cursor.row_index();
        self.cursor.close();
        tracing::debug!(path = %self.path.display(), rows_read, "scan closed");
    }
}

pub fn open_scan(path: impl AsRef<Path>) -> ApiResult<ScanHandle> {
    open_scan_with(path, &ScanOptions::default())
}

pub fn open_scan_with(path: impl AsRef<Path>, options: &ScanOptions) -> ApiResult<ScanHandle> {
    let path = path.as_ref();
    let mut reader = RangeReader::open(path)?;
    let descriptor = resolve_from_reader(&mut reader, &options.parse)?;
    let selected = project(&descriptor, options.columns.as_deref())
        .map_err(|err| err.with_path(path))?;

    let mut buffers = Vec::with_capacity(selected.len());
    for index in selected {
        let buffer = load_column(&mut reader, &descriptor.columns[index])
            .map_err(|err| err.or_path(path))?;
        buffers.push(buffer);
    }

    tracing::debug!(
        path = %path.display(),
        table = %descriptor.table_name,
        rows = descriptor.num_rows(),
        columns = buffers.len(),
        "scan opened"
    );
    Ok(ScanHandle {
        path: path.to_path_buf(),
        cursor: ScanCursor::open(descriptor, buffers),
    })
}

pub fn fetch_next(handle: &mut ScanHandle) -> ApiResult<CursorResult> {
    handle.next()
}

pub fn rescan(handle: &mut ScanHandle) -> ApiResult<()> {
    handle.restart()
}

pub fn close_scan(handle: &mut ScanHandle) {
    handle.close();
}

pub fn describe_schema(path: impl AsRef<Path>) -> ApiResult<Vec<(String, DataType)>> {
    Ok(read_descriptor(path)?.schema())
}

pub fn read_descriptor(path: impl AsRef<Path>) -> ApiResult<FileDescriptor> {
    read_descriptor_with(path, &ParseOptions::default())
}

pub fn read_descriptor_with(
    path: impl AsRef<Path>,
    options: &ParseOptions,
) -> ApiResult<FileDescriptor> {
    let mut reader = RangeReader::open(path)?;
    resolve_from_reader(&mut reader, options)
}

/// Descriptor indices of the requested columns, in descriptor order.
fn project(descriptor: &FileDescriptor, requested: Option<&[String]>) -> ApiResult<Vec<usize>> {
    let Some(requested) = requested else {
        return Ok((0..descriptor.columns.len()).collect());
    };
    if requested.is_empty() {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("column projection is empty")
            .with_hint("Pass at least one column name, or omit the projection to scan all columns."));
    }
    for name in requested {
        if descriptor.column_index(name).is_none() {
            let known = descriptor
                .columns
                .iter()
                .map(|column| column.name.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            return Err(Error::new(ErrorKind::Usage)
                .with_message(format!("unknown column {name:?}"))
                .with_column(name.as_str())
                .with_hint(format!("Known columns: {known}.")));
        }
    }
    Ok(descriptor
        .columns
        .iter()
        .enumerate()
        .filter(|(_, column)| requested.iter().any(|name| *name == column.name))
        .map(|(index, _)| index)
        .collect())
}
