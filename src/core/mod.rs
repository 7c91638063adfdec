// Core modules: byte ranges, metadata parsing, schema resolution, and row decoding.
pub mod column;
pub mod cursor;
pub mod error;
#[cfg(test)]
pub(crate) mod fixture;
pub mod format;
pub mod meta;
pub mod range;
pub mod schema;
