//! # Object Reader
//!
//! The reader owns every open object file, keyed by path. `open` is the
//! sole entry point: it deduplicates by path, memory-maps the file
//! read-only and private, identifies the container by its magic number,
//! and caches the result. All failures are non-fatal: the caller gets
//! `None` and skips the frame.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use memmap2::MmapOptions;

use crate::error::{Result, TracelineError};
use crate::mem::{mem_hash_map, MemHashMap, MemoryContext};
use crate::object::file::{ObjectFile, ObjectKind};
use crate::object::macho::MACHO64_MAGIC;

/// Smallest size any supported container can be; the Mach-O header plus
/// one load command already exceeds it.
const MIN_OBJECT_SIZE: u64 = 64;

/// Deduplicating cache of open object files.
pub struct ObjectReader
{
    mem: MemoryContext,
    files: MemHashMap<std::path::PathBuf, Arc<ObjectFile>>,
}

impl ObjectReader
{
    pub fn new(mem: MemoryContext) -> Self
    {
        let files = mem_hash_map(&mem);
        Self { mem, files }
    }

    pub fn memory(&self) -> &MemoryContext
    {
        &self.mem
    }

    /// Number of distinct files currently held open.
    pub fn open_count(&self) -> usize
    {
        self.files.len()
    }

    /// Open `path`, or return the already-open file for it.
    ///
    /// Returns `None` (and holds no descriptor or mapping) when the file
    /// cannot be opened, is smaller than any supported container, or has
    /// an unrecognized magic number.
    pub fn open(&mut self, path: &Path) -> Option<Arc<ObjectFile>>
    {
        if let Some(existing) = self.files.get(path) {
            return Some(existing.clone());
        }
        match self.try_open(path) {
            Ok(object) => {
                self.files.insert(path.to_path_buf(), object.clone());
                Some(object)
            }
            Err(err) => {
                tracing::debug!(path = %path.display(), %err, "cannot read object file");
                None
            }
        }
    }

    fn try_open(&self, path: &Path) -> Result<Arc<ObjectFile>>
    {
        let file = File::open(path)?;
        let size = file.metadata()?.len();
        if size < MIN_OBJECT_SIZE {
            return Err(TracelineError::FileTooSmall {
                path: path.to_path_buf(),
            });
        }

        // Read-only and private: the mapping never observes or makes
        // writes. Both the handle and the mapping drop (close, unmap) on
        // every failure path past this point.
        let map = unsafe { MmapOptions::new().map_copy_read_only(&file) }?;

        let magic = u32::from_le_bytes([map[0], map[1], map[2], map[3]]);
        if magic != MACHO64_MAGIC {
            return Err(TracelineError::UnknownFormat(magic));
        }

        #[allow(clippy::arc_with_non_send_sync)]
        let object = Arc::new(ObjectFile::new(
            self.mem.clone(),
            path.to_path_buf(),
            file,
            map,
            ObjectKind::MachO64,
        ));
        Ok(object)
    }
}

impl std::fmt::Debug for ObjectReader
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        f.debug_struct("ObjectReader").field("open", &self.files.len()).finish()
    }
}
