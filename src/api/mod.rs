//! Purpose: Define the public Rust API boundary for reading db721 files.
//! Exports: Scan lifecycle, schema description, and the types they return.
//! Role: Public, additive-only surface used by the CLI and the C ABI.
//! Invariants: Each `ScanHandle` owns its descriptor and buffers; nothing is shared between scans.

mod scan;

pub use crate::core::cursor::{CursorResult, Row, Value};
#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::format::DataType;
pub use crate::core::meta::{DEFAULT_MAX_TOKENS, ParseOptions};
pub use crate::core::schema::{BlockStats, ColumnDescriptor, FileDescriptor, StatValue};
pub use scan::{
    ApiResult, ScanHandle, ScanOptions, close_scan, describe_schema, fetch_next, open_scan,
    open_scan_with, read_descriptor, read_descriptor_with, rescan,
};
