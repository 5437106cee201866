//! # Error Types
//!
//! General error handling for the object reader.
//!
//! We use `thiserror` to automatically generate `Error` trait implementations
//! and nice error messages.
//!
//! Most of these errors never reach a caller of [`crate::Resolver`]: per the
//! degradation policy, a frame that cannot be enriched is passed through
//! unchanged, and a debug-info unit that cannot be parsed yields no source
//! locations. The variants exist so that internal parsing code can propagate
//! failures with `?` up to the boundary where they are converted into a skip.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for object-reader operations.
#[derive(Error, Debug)]
pub enum TracelineError
{
    /// A byte-cursor read ran past the end of its `[base, limit)` range.
    ///
    /// Truncated or corrupted inputs produce this; the surrounding table or
    /// unit is skipped rather than aborting the resolve.
    #[error("read out of range at offset {offset} (cursor size {size})")]
    OutOfRange
    {
        /// Absolute offset into the mapped file at which the read started
        offset: usize,
        /// Remaining bytes in the cursor at that point
        size: usize,
    },

    /// The file is smaller than the minimum any supported container needs.
    #[error("object file too small: {}", .path.display())]
    FileTooSmall
    {
        path: PathBuf,
    },

    /// The leading magic number matches no supported container format.
    #[error("unrecognized container magic 0x{0:08x}")]
    UnknownFormat(u32),

    /// A DWARF line-number unit violated the format in a way we do not
    /// recover from within that unit.
    #[error("malformed line-number unit: {0}")]
    MalformedUnit(&'static str),

    /// A variable-length integer kept its continuation bit set past the
    /// widest value we decode.
    #[error("LEB128 value exceeds 64 bits")]
    LebOverflow,

    /// I/O error (open, metadata, mmap).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience type alias for `Result<T, TracelineError>`
pub type Result<T> = std::result::Result<T, TracelineError>;
