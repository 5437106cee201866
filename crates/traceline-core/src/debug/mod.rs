//! # Debug-Info Discovery and Queries
//!
//! Where the line tables live and how they are found. For a Mach-O binary
//! the DWARF data may sit in the binary itself or in a companion `.dSYM`
//! bundle next to it; both are probed, each match contributing one
//! [`line::DebugTable`] over its `__debug_line` / `__debug_line_str` (or
//! ELF-convention `.debug_line` / `.debug_line_str`) section pair. Parsing
//! is deferred until the first address query.

pub mod dwarf;
pub(crate) mod line;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::mem::MemVec;
use crate::object::file::{ObjectFile, ObjectKind};
use crate::object::reader::ObjectReader;

use line::DebugTable;

/// A resolved source position for an address.
///
/// The directory and file components are kept separate, as the line table
/// records them; callers wanting a full path join them. Empty means "no
/// location found".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceLoc
{
    pub addr: u64,
    pub dir: String,
    pub file: String,
    pub line: i64,
}

impl SourceLoc
{
    pub fn is_empty(&self) -> bool
    {
        self.addr == 0 && self.line == 0
    }
}

impl fmt::Display for SourceLoc
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        if self.is_empty() {
            write!(f, "(unknown source location)")
        } else {
            write!(f, "{}/{}:{}", self.dir, self.file, self.line)
        }
    }
}

/// The debug tables discovered for one object file.
pub(crate) struct DwarfDebugInfo
{
    tables: MemVec<DebugTable>,
}

impl DwarfDebugInfo
{
    /// Probe the binary and its companion debug file for line tables.
    pub(crate) fn discover(reader: &mut ObjectReader, file: &Arc<ObjectFile>) -> Self
    {
        let mem = reader.memory().clone();
        let mut tables = MemVec::new_in(mem.clone());

        // Files to search, starting with the binary itself.
        let mut candidates: MemVec<PathBuf> = MemVec::new_in(mem.clone());
        candidates.push(file.path().to_path_buf());

        // Mach-O binaries may keep their DWARF data in a sibling bundle:
        // "foo.dSYM/Contents/Resources/DWARF/foo".
        // TODO: verify the dSYM's LC_UUID matches the binary's before
        // trusting its tables.
        if file.kind() == ObjectKind::MachO64 {
            if let (Some(dir), Some(name)) = (file.path().parent(), file.path().file_name()) {
                let mut bundle = name.to_os_string();
                bundle.push(".dSYM");
                let companion = dir
                    .join(bundle)
                    .join("Contents")
                    .join("Resources")
                    .join("DWARF")
                    .join(name);
                if companion.is_file() {
                    candidates.push(companion);
                }
            }
        }

        for path in candidates.iter() {
            let object = if path.as_path() == file.path() {
                file.clone()
            } else {
                match reader.open(path) {
                    Some(object) => object,
                    None => continue,
                }
            };
            let Some((line_data, line_strs)) = find_line_sections(&object) else {
                continue;
            };
            tables.push(DebugTable::new(&mem, &object, line_data, line_strs));
        }

        tracing::debug!(path = %file.path().display(), tables = tables.len(), "discovered line tables");
        Self { tables }
    }

    /// First non-empty answer across the discovered tables.
    pub(crate) fn source_loc_at_addr(&mut self, addr: u64) -> SourceLoc
    {
        for table in self.tables.iter_mut() {
            let loc = table.source_loc_at_addr(addr);
            if !loc.is_empty() {
                return loc;
            }
        }
        SourceLoc::default()
    }
}

/// The byte ranges of a file's line-data and line-string sections, trying
/// the Mach-O leading-underscore names first, then the ELF spellings.
fn find_line_sections(object: &ObjectFile) -> Option<(std::ops::Range<usize>, std::ops::Range<usize>)>
{
    for (line_name, strs_name) in [("__debug_line", "__debug_line_str"), (".debug_line", ".debug_line_str")] {
        let (Some(line), Some(strs)) = (object.section_by_name(line_name), object.section_by_name(strs_name)) else {
            continue;
        };
        return Some((object.section_content(line).range(), object.section_content(strs).range()));
    }
    None
}
