//! Shared fixture builders: little-endian scribbling, LEB128 encoders, and
//! synthetic Mach-O / line-number-unit construction.

#![allow(dead_code)]

pub fn u16le(value: u16) -> [u8; 2]
{
    value.to_le_bytes()
}

pub fn u32le(value: u32) -> [u8; 4]
{
    value.to_le_bytes()
}

pub fn u64le(value: u64) -> [u8; 8]
{
    value.to_le_bytes()
}

pub fn encode_uleb(mut value: u64) -> Vec<u8>
{
    let mut out = Vec::new();
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if value == 0 {
            break;
        }
    }
    out
}

pub fn encode_sleb(mut value: i64) -> Vec<u8>
{
    let mut out = Vec::new();
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        let sign_clear = byte & 0x40 == 0;
        let done = (value == 0 && sign_clear) || (value == -1 && !sign_clear);
        out.push(if done { byte } else { byte | 0x80 });
        if done {
            break;
        }
    }
    out
}

/// A section to place in a synthetic Mach-O file. The builder appends the
/// content blob to the file and points the section record at it.
pub struct SectionSpec
{
    pub name: &'static [u8],
    pub addr: u64,
    pub content: Vec<u8>,
}

/// A symbol record for the synthetic `LC_SYMTAB`.
pub struct SymbolSpec
{
    pub name: &'static str,
    pub addr: u64,
    pub n_type: u8,
    pub n_sect: u8,
}

/// Assemble a minimal but well-formed 64-bit Mach-O image: one
/// `LC_SEGMENT_64` carrying the given sections and one `LC_SYMTAB`.
pub fn build_macho(sections: &[SectionSpec], symbols: &[SymbolSpec]) -> Vec<u8>
{
    const HEADER_SIZE: usize = 32;
    const SEGMENT_SIZE: usize = 72;
    const SECTION_SIZE: usize = 80;
    const SYMTAB_SIZE: usize = 24;
    const NLIST_SIZE: usize = 16;

    let seg_cmdsize = SEGMENT_SIZE + SECTION_SIZE * sections.len();
    let sizeofcmds = seg_cmdsize + SYMTAB_SIZE;
    let symoff = HEADER_SIZE + sizeofcmds;
    let stroff = symoff + NLIST_SIZE * symbols.len();

    // String table: index 0 is the empty name.
    let mut strtab = vec![0u8];
    let strx: Vec<u32> = symbols
        .iter()
        .map(|symbol| {
            let offset = strtab.len() as u32;
            strtab.extend_from_slice(symbol.name.as_bytes());
            strtab.push(0);
            offset
        })
        .collect();

    // Section contents follow the string table.
    let mut content_offset = stroff + strtab.len();
    let content_offsets: Vec<u32> = sections
        .iter()
        .map(|section| {
            let offset = content_offset as u32;
            content_offset += section.content.len();
            offset
        })
        .collect();

    let mut out = Vec::new();

    // mach_header_64
    out.extend(u32le(0xfeed_facf));
    out.extend(u32le(0x0100_000c)); // cputype: arm64
    out.extend(u32le(0));
    out.extend(u32le(2)); // filetype: executable
    out.extend(u32le(2)); // ncmds
    out.extend(u32le(sizeofcmds as u32));
    out.extend(u32le(0));
    out.extend(u32le(0));

    // LC_SEGMENT_64
    out.extend(u32le(0x19));
    out.extend(u32le(seg_cmdsize as u32));
    out.extend(pad16(b"__TEXT"));
    out.extend(u64le(0)); // vmaddr
    out.extend(u64le(0)); // vmsize
    out.extend(u64le(0)); // fileoff
    out.extend(u64le(0)); // filesize
    out.extend(u32le(0)); // maxprot
    out.extend(u32le(0)); // initprot
    out.extend(u32le(sections.len() as u32));
    out.extend(u32le(0)); // flags

    for (section, &offset) in sections.iter().zip(&content_offsets) {
        out.extend(pad16(section.name));
        out.extend(pad16(b"__TEXT"));
        out.extend(u64le(section.addr));
        out.extend(u64le(section.content.len() as u64));
        out.extend(u32le(offset));
        out.extend(u32le(0)); // align
        out.extend(u32le(0)); // reloff
        out.extend(u32le(0)); // nreloc
        out.extend(u32le(0)); // flags
        out.extend(u32le(0));
        out.extend(u32le(0));
        out.extend(u32le(0));
    }

    // LC_SYMTAB
    out.extend(u32le(0x02));
    out.extend(u32le(SYMTAB_SIZE as u32));
    out.extend(u32le(symoff as u32));
    out.extend(u32le(symbols.len() as u32));
    out.extend(u32le(stroff as u32));
    out.extend(u32le(strtab.len() as u32));

    assert_eq!(out.len(), symoff);
    for (symbol, &strx) in symbols.iter().zip(&strx) {
        out.extend(u32le(strx));
        out.push(symbol.n_type);
        out.push(symbol.n_sect);
        out.extend(u16le(0)); // n_desc
        out.extend(u64le(symbol.addr));
    }

    assert_eq!(out.len(), stroff);
    out.extend_from_slice(&strtab);
    for section in sections {
        out.extend_from_slice(&section.content);
    }
    out
}

fn pad16(name: &[u8]) -> [u8; 16]
{
    assert!(name.len() <= 16);
    let mut out = [0u8; 16];
    out[..name.len()].copy_from_slice(name);
    out
}

/// One DWARF 5 line-number unit, assembled field by field with the
/// header-length and unit-length values computed from the parts.
pub struct UnitBuilder
{
    pub version: u16,
    pub addr_size: u8,
    pub min_insn_length: u8,
    pub max_ops_per_insn: u8,
    pub default_is_stmt: u8,
    pub line_base: i8,
    pub line_range: u8,
    pub opcode_base: u8,
    pub use_64bit_length: bool,
    /// `DW_LNCT_path` offsets into the line-string section, one per directory
    pub dirs: Vec<u32>,
    /// `(path offset, directory index)` per file entry
    pub files: Vec<(u32, u8)>,
    pub program: Vec<u8>,
}

impl Default for UnitBuilder
{
    fn default() -> Self
    {
        Self {
            version: 5,
            addr_size: 8,
            min_insn_length: 1,
            max_ops_per_insn: 1,
            default_is_stmt: 1,
            line_base: -5,
            line_range: 14,
            opcode_base: 13,
            use_64bit_length: false,
            dirs: Vec::new(),
            files: Vec::new(),
            program: Vec::new(),
        }
    }
}

impl UnitBuilder
{
    pub fn build(&self) -> Vec<u8>
    {
        const DW_LNCT_PATH: u64 = 1;
        const DW_LNCT_DIRECTORY_INDEX: u64 = 2;
        const DW_FORM_UDATA: u64 = 0x0f;
        const DW_FORM_LINE_STRP: u64 = 0x1f;
        // Operand counts for the twelve standard opcodes.
        const STD_LENS: [u8; 12] = [0, 1, 1, 1, 1, 0, 0, 0, 1, 0, 0, 1];

        // Everything covered by header_length: geometry through file entries.
        let mut tail = Vec::new();
        tail.push(self.min_insn_length);
        tail.push(self.max_ops_per_insn);
        tail.push(self.default_is_stmt);
        tail.push(self.line_base as u8);
        tail.push(self.line_range);
        tail.push(self.opcode_base);
        for opcode in 1..self.opcode_base {
            tail.push(STD_LENS.get(opcode as usize - 1).copied().unwrap_or(0));
        }

        // In 64-bit mode every line_strp offset widens to eight bytes.
        let push_strp = |tail: &mut Vec<u8>, offset: u32| {
            if self.use_64bit_length {
                tail.extend(u64le(u64::from(offset)));
            } else {
                tail.extend(u32le(offset));
            }
        };

        tail.push(1); // directory entry format count
        tail.extend(encode_uleb(DW_LNCT_PATH));
        tail.extend(encode_uleb(DW_FORM_LINE_STRP));
        tail.extend(encode_uleb(self.dirs.len() as u64));
        for &offset in &self.dirs {
            push_strp(&mut tail, offset);
        }

        tail.push(2); // file entry format count
        tail.extend(encode_uleb(DW_LNCT_PATH));
        tail.extend(encode_uleb(DW_FORM_LINE_STRP));
        tail.extend(encode_uleb(DW_LNCT_DIRECTORY_INDEX));
        tail.extend(encode_uleb(DW_FORM_UDATA));
        tail.extend(encode_uleb(self.files.len() as u64));
        for &(offset, dir_index) in &self.files {
            push_strp(&mut tail, offset);
            tail.extend(encode_uleb(u64::from(dir_index)));
        }

        // Fields after the initial-length field.
        let mut body = Vec::new();
        body.extend(u16le(self.version));
        body.push(self.addr_size);
        body.push(0); // segment selector size
        if self.use_64bit_length {
            body.extend(u64le(tail.len() as u64));
        } else {
            body.extend(u32le(tail.len() as u32));
        }
        body.extend_from_slice(&tail);
        body.extend_from_slice(&self.program);

        let mut out = Vec::new();
        if self.use_64bit_length {
            out.extend(u32le(0xffff_ffff));
            out.extend(u64le(body.len() as u64));
        } else {
            out.extend(u32le(body.len() as u32));
        }
        out.extend_from_slice(&body);
        out
    }
}

/// Program-opcode scribbling helpers.
pub mod ops
{
    use super::{encode_sleb, encode_uleb, u16le, u64le};

    pub fn set_address(addr: u64) -> Vec<u8>
    {
        let mut out = vec![0x00, 0x09, 0x02];
        out.extend(u64le(addr));
        out
    }

    pub fn end_sequence() -> Vec<u8>
    {
        vec![0x00, 0x01, 0x01]
    }

    pub fn copy() -> Vec<u8>
    {
        vec![0x01]
    }

    pub fn advance_pc(advance: u64) -> Vec<u8>
    {
        let mut out = vec![0x02];
        out.extend(encode_uleb(advance));
        out
    }

    pub fn advance_line(delta: i64) -> Vec<u8>
    {
        let mut out = vec![0x03];
        out.extend(encode_sleb(delta));
        out
    }

    pub fn set_file(file: u64) -> Vec<u8>
    {
        let mut out = vec![0x04];
        out.extend(encode_uleb(file));
        out
    }

    pub fn fixed_advance_pc(advance: u16) -> Vec<u8>
    {
        let mut out = vec![0x09];
        out.extend(u16le(advance));
        out
    }

    pub fn special(opcode: u8) -> Vec<u8>
    {
        vec![opcode]
    }
}

/// Concatenate program fragments.
pub fn program(parts: &[Vec<u8>]) -> Vec<u8>
{
    parts.iter().flatten().copied().collect()
}
