//! # traceline-core
//!
//! The backend of a stacktrace facility: given raw instruction-pointer
//! addresses captured from a running process, produce human-readable
//! stack-frame descriptions: a demangled symbol name, a source file, and
//! a line number.
//!
//! The crate discovers the binary images mapped into the process, parses
//! their 64-bit Mach-O containers into section and symbol tables, and
//! interprets the DWARF 5 `.debug_line` section (in the binary or its
//! companion `.dSYM` bundle) to map addresses to source locations.
//!
//! ## Module Structure
//!
//! - **`resolver`**: the top-level entry point annotating frame entries
//! - **`image`**: the loaded-image registry (dyld-backed on macOS)
//! - **`object`**: object-file opening, Mach-O parsing, section/symbol tables
//! - **`debug`**: DWARF 5 line-table discovery and interpretation
//! - **`bytes`** / **`mem`**: the byte cursor and the caller-supplied allocator
//! - **`demangle`**: C++ and Rust symbol demangling
//!
//! ## Why unsafe code is needed
//!
//! This crate reads on-disk records straight out of memory-mapped files and
//! asks the loader about mapped images. Record loads from the mapping and
//! the dyld calls are inherently `unsafe`; they are wrapped in the safe
//! cursor and registry abstractions here.

#![allow(unsafe_code)] // Required for mapped-record reads and loader queries

pub mod bytes;
pub mod debug;
pub mod demangle;
pub mod error;
pub mod image;
pub mod mem;
pub mod object;
pub mod resolver;

// Re-export commonly used types
pub use bytes::{Bytes, StrRange};
pub use debug::SourceLoc;
pub use demangle::demangle_symbol;
pub use error::{Result, TracelineError};
pub use image::{Image, ImageRegistry};
pub use mem::{MemBox, MemHashMap, MemVec, MemoryContext, SortedMap};
pub use object::{ObjectFile, ObjectKind, ObjectReader, Section, SectionTable, Symbol, SymbolTable};
pub use resolver::{resolve_entries, FrameEntry, Resolver};
