//! # DWARF 5 Line-Table Vocabulary
//!
//! Constants and small records for the line-number program header
//! (DWARF 5 §6.2.4): directory/file entry content types and forms, the
//! standard and extended opcode numbers, and the parsed header itself.

use smallvec::SmallVec;

use crate::bytes::{Bytes, StrRange};
use crate::error::{Result, TracelineError};

/// `DW_LNCT_*`: what a directory/file entry value describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType
{
    Path,
    DirIndex,
    Timestamp,
    Size,
    Md5,
    Other(u64),
}

impl ContentType
{
    pub fn from_code(code: u64) -> Self
    {
        match code {
            1 => Self::Path,
            2 => Self::DirIndex,
            3 => Self::Timestamp,
            4 => Self::Size,
            5 => Self::Md5,
            other => Self::Other(other),
        }
    }
}

/// `DW_FORM_*` codes the header decoder understands (§7.5.6).
pub mod form
{
    pub const UDATA: u64 = 0x0f;
    pub const LINE_STRP: u64 = 0x1f;
}

/// Standard opcodes (`DW_LNS_*`, §6.2.5.2).
pub mod standard
{
    pub const COPY: u8 = 1;
    pub const ADVANCE_PC: u8 = 2;
    pub const ADVANCE_LINE: u8 = 3;
    pub const SET_FILE: u8 = 4;
    pub const SET_COLUMN: u8 = 5;
    pub const NEGATE_STMT: u8 = 6;
    pub const SET_BASIC_BLOCK: u8 = 7;
    pub const CONST_ADD_PC: u8 = 8;
    pub const FIXED_ADVANCE_PC: u8 = 9;
    pub const SET_PROLOGUE_END: u8 = 10;
    pub const SET_EPILOGUE_BEGIN: u8 = 11;
    pub const SET_ISA: u8 = 12;
}

/// Extended opcodes (`DW_LNE_*`, §6.2.5.3).
pub mod extended
{
    pub const END_SEQUENCE: u8 = 1;
    pub const SET_ADDRESS: u8 = 2;
    pub const SET_DISCRIMINATOR: u8 = 3;
}

/// One `(content type, form)` pair from an entry-format description.
#[derive(Debug, Clone, Copy)]
pub struct EntryFormat
{
    pub content: ContentType,
    pub form: u64,
}

/// One decoded value of a directory or file entry.
#[derive(Debug, Clone, Copy)]
pub struct EntryValue
{
    pub content: ContentType,
    pub form: u64,
    pub num: u64,
    pub text: StrRange,
}

/// A directory or file entry: one value per format pair. Producers emit
/// at most a handful of values; four stay inline.
#[derive(Debug, Clone, Default)]
pub struct EntryData
{
    values: SmallVec<[EntryValue; 4]>,
}

impl EntryData
{
    /// Decode one value of form `fmt.form` from `cur`, remembering its
    /// content and form tags.
    ///
    /// Only `DW_FORM_udata` and `DW_FORM_line_strp` occur in the headers
    /// this reader consumes; any other form makes the unit undecodable.
    pub fn read_value<'a>(
        &mut self,
        cur: Bytes<'a>,
        fmt: EntryFormat,
        is_64bit: bool,
        line_strs: Bytes<'_>,
    ) -> Result<Bytes<'a>>
    {
        let mut value = EntryValue {
            content: fmt.content,
            form: fmt.form,
            num: 0,
            text: StrRange::default(),
        };
        let rest = match fmt.form {
            form::UDATA => {
                let (num, rest) = cur.uleb()?;
                value.num = num;
                rest
            }
            form::LINE_STRP => {
                let (offset, rest) = if is_64bit {
                    cur.read_u64()?
                } else {
                    let (offset, rest) = cur.read_u32()?;
                    (u64::from(offset), rest)
                };
                value.num = offset;
                value.text = line_strs.cstr_range(offset as usize)?;
                rest
            }
            _ => return Err(TracelineError::MalformedUnit("unsupported form in entry format")),
        };
        self.values.push(value);
        Ok(rest)
    }

    /// The `DW_LNCT_path` string of this entry, if present.
    pub fn path(&self) -> Option<StrRange>
    {
        self.values
            .iter()
            .find(|value| value.content == ContentType::Path)
            .map(|value| value.text)
    }

    /// The `DW_LNCT_directory_index` of this entry; 0 when absent.
    pub fn dir_index(&self) -> u64
    {
        self.values
            .iter()
            .find(|value| value.content == ContentType::DirIndex)
            .map(|value| value.num)
            .unwrap_or(0)
    }
}

/// Parsed line-number program header (§6.2.4).
#[derive(Debug, Clone)]
pub struct LineHeader
{
    /// Bytes the unit occupies after its initial-length field
    pub unit_length: u64,
    /// Whether the initial length was the 64-bit escape form
    pub is_64bit: bool,
    pub version: u16,
    pub addr_size: u8,
    pub seg_selector_size: u8,
    pub min_insn_length: u8,
    pub max_ops_per_insn: u8,
    pub default_is_stmt: bool,
    pub line_base: i8,
    pub line_range: u8,
    pub opcode_base: u8,
    /// Operand counts for standard opcodes `1..opcode_base`, stored at
    /// `opcode − 1`
    std_opcode_lens: [u8; 32],
}

impl LineHeader
{
    pub(crate) fn new() -> Self
    {
        Self {
            unit_length: 0,
            is_64bit: false,
            version: 0,
            addr_size: 0,
            seg_selector_size: 0,
            min_insn_length: 0,
            max_ops_per_insn: 0,
            default_is_stmt: false,
            line_base: 0,
            line_range: 0,
            opcode_base: 0,
            std_opcode_lens: [0; 32],
        }
    }

    pub(crate) fn set_std_opcode_len(&mut self, opcode: u8, operands: u8)
    {
        if (1..=32).contains(&opcode) {
            self.std_opcode_lens[opcode as usize - 1] = operands;
        }
    }

    /// Operand count declared for a standard opcode; 0 for anything out of
    /// the declared range.
    pub fn std_opcode_len(&self, opcode: u8) -> u8
    {
        if opcode == 0 || opcode >= self.opcode_base || opcode > 32 {
            return 0;
        }
        self.std_opcode_lens[opcode as usize - 1]
    }
}
