//! Purpose: Library crate for reading DynGroup (`.dg` / `.dgz`) containers.
//! Exports: `api` (stable read pipeline surface), `core` (format, decoding, errors), `notice`.
//! Role: Backs the `dgread` CLI and any embedding host that needs the value tree.
//! Invariants: A read either returns a complete `Record` or an `Error`; never a partial tree.
//! Invariants: Core modules prefer explicit inputs/outputs over hidden state.
pub mod api;
pub mod core;
pub mod notice;
