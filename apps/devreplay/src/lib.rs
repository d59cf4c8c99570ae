//! DevReplay core library.
//!
//! Lints source files against a catalog of recorded before/after rewrites
//! (`.devreplay.json`) and serves the results over the Language Server
//! Protocol.
//!
//! High-level modules:
//! - `catalog`: Rule catalog loading and in-place severity persistence.
//! - `matcher`: The `Matcher` seam and the placeholder pattern matcher.
//! - `lint`: Invoker, target expansion, and batch lint for the CLI.
//! - `severity`: Severity levels and adjustment directives.
//! - `documents`: Open-document store with incremental edits.
//! - `diagnostics`: Findings to protocol diagnostics.
//! - `fix`: Code actions, fix-all, and batch fixing.
//! - `server`: The language server backend.
//! - `config`: Discovery and effective configuration resolution.
//! - `cli` / `output`: Argument parsing and human/JSON printers.
pub mod catalog;
pub mod cli;
pub mod config;
pub mod diagnostics;
pub mod documents;
pub mod error;
pub mod fix;
pub mod lint;
pub mod matcher;
pub mod models;
pub mod output;
pub mod server;
pub mod severity;
