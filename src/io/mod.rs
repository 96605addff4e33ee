//! I/O utilities for minions-rs.
//!
//! Loads context files (memory-mapped when large, or from stdin) and writes
//! run output.

pub mod reader;

pub use reader::{ContextReader, STDIN_PATH, read_context, write_file};
