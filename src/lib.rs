//! Purpose: Library crate for reading db721 columnar files, shared by the `db721` CLI and the C ABI.
//! Exports: `api` (stable scan surface), `abi` (C entry points), `core` (format internals).
//! Role: Backs the binary and foreign callers; `api` is the supported Rust entry point.
//! Invariants: No process-wide mutable state; every scan carries its own context.
pub mod abi;
pub mod api;
pub mod core;
