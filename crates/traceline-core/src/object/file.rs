//! # Object Files
//!
//! An [`ObjectFile`] is the exclusive owner of an opened binary: the file
//! handle, the read-only private mapping, and the path it was opened from.
//! It is a byte view over its entire mapped contents, and it lazily builds
//! the section, symbol, and debug-info views the resolver asks for, each at
//! most once, on first request.
//!
//! Dropping the file releases the mapping and the handle along every path;
//! cursors and tables derived from a file never outlive the reader that
//! owns it.

use std::borrow::Cow;
use std::cell::RefCell;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use memmap2::Mmap;
use once_cell::sync::OnceCell;

use crate::bytes::{Bytes, StrRange};
use crate::debug::{DwarfDebugInfo, SourceLoc};
use crate::mem::MemoryContext;
use crate::object::macho;
use crate::object::reader::ObjectReader;
use crate::object::section::{Section, SectionTable};
use crate::object::symbol::SymbolTable;

/// Container format of an opened file, dispatched on the magic number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind
{
    /// 64-bit Mach-O (`0xFEEDFACF`)
    MachO64,
}

/// An opened, memory-mapped object file with lazily built tables.
pub struct ObjectFile
{
    mem: MemoryContext,
    path: PathBuf,
    kind: ObjectKind,
    // Unmapped before the handle closes; both released on drop.
    map: Mmap,
    #[allow(dead_code)]
    file: File,
    sections: OnceCell<SectionTable>,
    symbols: OnceCell<SymbolTable>,
    debug: OnceCell<RefCell<DwarfDebugInfo>>,
}

impl ObjectFile
{
    pub(crate) fn new(mem: MemoryContext, path: PathBuf, file: File, map: Mmap, kind: ObjectKind) -> Self
    {
        Self {
            mem,
            path,
            kind,
            map,
            file,
            sections: OnceCell::new(),
            symbols: OnceCell::new(),
            debug: OnceCell::new(),
        }
    }

    pub fn path(&self) -> &Path
    {
        &self.path
    }

    pub fn kind(&self) -> ObjectKind
    {
        self.kind
    }

    /// The entire mapped contents.
    pub fn data(&self) -> &[u8]
    {
        &self.map
    }

    /// Cursor over the entire mapped contents.
    pub fn bytes(&self) -> Bytes<'_>
    {
        Bytes::new(&self.map)
    }

    /// Resolve a stored name range against the mapping.
    pub fn name_at(&self, range: StrRange) -> Cow<'_, str>
    {
        String::from_utf8_lossy(range.resolve(&self.map))
    }

    /// The file bytes backing a section, clamped to the mapping.
    pub fn section_content(&self, section: &Section) -> Bytes<'_>
    {
        let start = section.binary_offset as usize;
        let end = start.saturating_add(section.binary_size as usize);
        Bytes::window(&self.map, start..end)
    }

    /// This file's section table; built on first request.
    pub fn section_table(&self) -> &SectionTable
    {
        self.sections.get_or_init(|| {
            let built = match self.kind {
                ObjectKind::MachO64 => macho::build_section_table(&self.mem, self.bytes()),
            };
            match built {
                Ok(table) => table,
                Err(err) => {
                    tracing::warn!(path = %self.path.display(), %err, "failed to parse section table");
                    SectionTable::new_in(&self.mem)
                }
            }
        })
    }

    /// This file's symbol table; built on first request.
    pub fn symbol_table(&self) -> &SymbolTable
    {
        self.symbols.get_or_init(|| {
            let built = match self.kind {
                ObjectKind::MachO64 => macho::build_symbol_table(&self.mem, self.bytes()),
            };
            match built {
                Ok(table) => table,
                Err(err) => {
                    tracing::warn!(path = %self.path.display(), %err, "failed to parse symbol table");
                    SymbolTable::new_in(&self.mem)
                }
            }
        })
    }

    /// Exact-name section lookup.
    pub fn section_by_name(&self, name: &str) -> Option<&Section>
    {
        self.section_table().by_name(&self.map, name)
    }

    /// The image UUID from `LC_UUID`, if the file carries one.
    pub fn uuid(&self) -> Option<[u8; 16]>
    {
        match self.kind {
            ObjectKind::MachO64 => macho::read_uuid(self.bytes()),
        }
    }

    /// Map an (unslid) address to a source location via this file's debug
    /// info, discovering and parsing it lazily on first query.
    ///
    /// `reader` is needed because discovery may open a companion `.dSYM`
    /// file through the same deduplicating cache.
    pub fn source_loc_at_addr(self: &Arc<Self>, reader: &mut ObjectReader, addr: u64) -> SourceLoc
    {
        let info = self
            .debug
            .get_or_init(|| RefCell::new(DwarfDebugInfo::discover(reader, self)));
        info.borrow_mut().source_loc_at_addr(addr)
    }
}

impl std::fmt::Debug for ObjectFile
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        f.debug_struct("ObjectFile")
            .field("path", &self.path)
            .field("kind", &self.kind)
            .field("size", &self.map.len())
            .finish_non_exhaustive()
    }
}
