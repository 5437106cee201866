//! # Mach-O 64 Parsing
//!
//! Record layouts and the load-command walk for Apple's 64-bit container
//! format. Only three command kinds matter to symbolication:
//! `LC_SEGMENT_64` (sections), `LC_SYMTAB` (symbols + string table), and
//! `LC_UUID` (recorded for companion-file matching). Everything else is
//! skipped by advancing `cmdsize` bytes.

use std::mem::size_of;

use crate::bytes::{Bytes, Pod, StrRange};
use crate::error::Result;
use crate::mem::MemoryContext;
use crate::object::section::{Section, SectionTable};
use crate::object::symbol::{Symbol, SymbolTable};

/// Magic number of a little-endian 64-bit Mach-O file.
pub const MACHO64_MAGIC: u32 = 0xfeed_facf;

const LC_SYMTAB: u32 = 0x02;
const LC_SEGMENT_64: u32 = 0x19;
const LC_UUID: u32 = 0x1b;

/// 32-byte file header.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct MachHeader64
{
    pub magic: u32,
    pub cputype: i32,
    pub cpusubtype: i32,
    pub filetype: u32,
    pub ncmds: u32,
    pub sizeofcmds: u32,
    pub flags: u32,
    pub reserved: u32,
}

/// Common prefix of every load command.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct LoadCommand
{
    pub cmd: u32,
    pub cmdsize: u32,
}

/// 72-byte `LC_SEGMENT_64` header; `nsects` 80-byte section records follow.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct SegmentCommand64
{
    pub cmd: u32,
    pub cmdsize: u32,
    pub segname: [u8; 16],
    pub vmaddr: u64,
    pub vmsize: u64,
    pub fileoff: u64,
    pub filesize: u64,
    pub maxprot: i32,
    pub initprot: i32,
    pub nsects: u32,
    pub flags: u32,
}

/// 80-byte section record inside an `LC_SEGMENT_64`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Section64
{
    pub sectname: [u8; 16],
    pub segname: [u8; 16],
    pub addr: u64,
    pub size: u64,
    pub offset: u32,
    pub align: u32,
    pub reloff: u32,
    pub nreloc: u32,
    pub flags: u32,
    pub reserved1: u32,
    pub reserved2: u32,
    pub reserved3: u32,
}

/// `LC_SYMTAB`: locations of the symbol and string tables.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct SymtabCommand
{
    pub cmd: u32,
    pub cmdsize: u32,
    pub symoff: u32,
    pub nsyms: u32,
    pub stroff: u32,
    pub strsize: u32,
}

/// `LC_UUID`: the build UUID of the image.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct UuidCommand
{
    pub cmd: u32,
    pub cmdsize: u32,
    pub uuid: [u8; 16],
}

/// 16-byte symbol-table record (`nlist_64`).
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Nlist64
{
    pub n_strx: u32,
    pub n_type: u8,
    pub n_sect: u8,
    pub n_desc: u16,
    pub n_value: u64,
}

impl Nlist64
{
    /// Stab: symbolic-debugging entry for a function's entry point.
    pub const N_FUN: u8 = 0x24;
    /// Symbol defined in the section numbered `n_sect`.
    pub const N_SECT: u8 = 0x0a;
    /// Indirect symbol.
    pub const N_INDR: u8 = 0x0e;

    pub fn symbol_type(&self) -> u8
    {
        self.n_type & 0xee
    }

    pub fn is_stab(&self) -> bool
    {
        self.n_type & 0xe0 != 0
    }

    pub fn is_ext(&self) -> bool
    {
        self.n_type & 0x01 != 0
    }
}

unsafe impl Pod for MachHeader64 {}
unsafe impl Pod for LoadCommand {}
unsafe impl Pod for SegmentCommand64 {}
unsafe impl Pod for Section64 {}
unsafe impl Pod for SymtabCommand {}
unsafe impl Pod for UuidCommand {}
unsafe impl Pod for Nlist64 {}

const _: () = assert!(size_of::<MachHeader64>() == 32);
const _: () = assert!(size_of::<LoadCommand>() == 8);
const _: () = assert!(size_of::<SegmentCommand64>() == 72);
const _: () = assert!(size_of::<Section64>() == 80);
const _: () = assert!(size_of::<SymtabCommand>() == 24);
const _: () = assert!(size_of::<Nlist64>() == 16);

/// Walk the load-command stream, handing each command's truncated cursor
/// and header to `visit`. The cursor covers exactly `cmdsize` bytes.
fn each_load_command<'a>(file: Bytes<'a>, mut visit: impl FnMut(Bytes<'a>, LoadCommand) -> Result<()>) -> Result<()>
{
    let (header, rest) = file.get::<MachHeader64>()?;
    let mut cur = rest.truncate(header.sizeofcmds as usize);
    while !cur.is_empty() {
        let (cmd, _) = cur.get::<LoadCommand>()?;
        if (cmd.cmdsize as usize) < size_of::<LoadCommand>() {
            // A zero or runt cmdsize would loop forever; stop the walk.
            break;
        }
        visit(cur.truncate(cmd.cmdsize as usize), cmd)?;
        cur = cur.slice(cmd.cmdsize as usize)?;
    }
    Ok(())
}

/// Project every `LC_SEGMENT_64` section record into a section table.
pub fn build_section_table(mem: &MemoryContext, file: Bytes<'_>) -> Result<SectionTable>
{
    let mut table = SectionTable::new_in(mem);
    each_load_command(file, |cmd_bytes, cmd| {
        if cmd.cmd != LC_SEGMENT_64 {
            return Ok(());
        }
        let (segment, mut records) = cmd_bytes.get::<SegmentCommand64>()?;
        for _ in 0..segment.nsects {
            // The name is the leading 16-byte field of the record we are
            // about to consume; trim trailing NULs within those 16 bytes
            // only, so a full-width name comes through whole.
            let name = records.fixed_str(0, 16)?;
            let name = StrRange {
                start: records.offset(),
                len: name.len(),
            };
            let (section, rest) = records.get::<Section64>()?;
            records = rest;
            table.add(Section {
                name,
                virt_addr: section.addr,
                virt_size: section.size,
                binary_offset: u64::from(section.offset),
                binary_size: section.size,
            });
        }
        Ok(())
    })?;
    Ok(table)
}

/// Classify every `LC_SYMTAB` record into a symbol table.
///
/// Records with an empty name or a zero address are skipped, as are all
/// types other than `N_FUN`, `N_SECT`, and `N_INDR`. A record whose string
/// offset falls outside the string table is skipped rather than failing
/// the whole table.
pub fn build_symbol_table(mem: &MemoryContext, file: Bytes<'_>) -> Result<SymbolTable>
{
    let mut table = SymbolTable::new_in(mem);
    each_load_command(file, |cmd_bytes, cmd| {
        if cmd.cmd != LC_SYMTAB {
            return Ok(());
        }
        let (symtab, _) = cmd_bytes.get::<SymtabCommand>()?;
        let mut records = file.slice_n(symtab.symoff as usize, symtab.nsyms as usize * size_of::<Nlist64>())?;
        let strings = file.slice_n(symtab.stroff as usize, symtab.strsize as usize)?;
        while !records.is_empty() {
            let (record, rest) = records.get::<Nlist64>()?;
            records = rest;
            let Ok(name) = strings.cstr_range(record.n_strx as usize) else {
                continue;
            };
            if record.n_value == 0 || name.is_empty() {
                continue;
            }
            match record.symbol_type() {
                Nlist64::N_FUN | Nlist64::N_SECT | Nlist64::N_INDR => table.add(Symbol {
                    addr: record.n_value,
                    name,
                    section: u32::from(record.n_sect),
                }),
                _ => {}
            }
        }
        Ok(())
    })?;
    Ok(table)
}

/// The image UUID from `LC_UUID`, if present.
pub fn read_uuid(file: Bytes<'_>) -> Option<[u8; 16]>
{
    let mut uuid = None;
    let walked = each_load_command(file, |cmd_bytes, cmd| {
        if cmd.cmd == LC_UUID && uuid.is_none() {
            let (record, _) = cmd_bytes.get::<UuidCommand>()?;
            uuid = Some(record.uuid);
        }
        Ok(())
    });
    walked.ok()?;
    uuid
}
