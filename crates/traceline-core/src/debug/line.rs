//! # Line-Number Program Interpretation
//!
//! A `.debug_line` section is a sequence of units, each a header followed
//! by a state-machine program (DWARF 5 §6.2). [`LineMachine`] parses one
//! unit's header and executes its program row by row; [`DebugTable`] owns
//! the section pair, caches emitted rows in an ordered map, and drives a
//! machine only as far as each query needs. The program is linear and may
//! be long, so rows are materialized until the cache holds a key past the
//! queried address, and no further.

use std::ops::Range;
use std::sync::{Arc, Weak};

use smallvec::SmallVec;

use crate::bytes::{Bytes, StrRange};
use crate::debug::dwarf::{extended, standard, ContentType, EntryData, EntryFormat, LineHeader};
use crate::debug::SourceLoc;
use crate::error::{Result, TracelineError};
use crate::mem::{MemVec, MemoryContext, SortedMap};
use crate::object::file::ObjectFile;

/// One row of the line table: an address and the source position that
/// covers it. Names are ranges into the owning file's mapping.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct LocRow
{
    pub addr: u64,
    pub dir: StrRange,
    pub file: StrRange,
    pub line: i64,
}

/// State-machine registers in their initial state (§6.2.2, table 6.4).
///
/// `line` is signed: special opcodes apply `line_base`-relative deltas that
/// can drive it below zero mid-sequence.
#[allow(dead_code)]
struct Registers
{
    addr: u64,
    op_index: u64,
    file: u64,
    line: i64,
    column: u64,
    is_stmt: bool,
    basic_block: bool,
    end_seq: bool,
    prologue_end: bool,
    epilogue_begin: bool,
    isa: u64,
    discriminator: u64,
}

impl Registers
{
    fn initial(default_is_stmt: bool) -> Self
    {
        Self {
            addr: 0,
            op_index: 0,
            file: 1,
            line: 1,
            column: 0,
            is_stmt: default_is_stmt,
            basic_block: false,
            end_seq: false,
            prologue_end: false,
            epilogue_begin: false,
            isa: 0,
            discriminator: 0,
        }
    }
}

/// Interpreter over a single line-number unit.
pub(crate) struct LineMachine
{
    header: LineHeader,
    directories: MemVec<EntryData>,
    file_names: MemVec<EntryData>,
    /// Remaining instruction stream, as a range of the file mapping
    insn: Range<usize>,
    /// Where a subsequent unit in the same section would begin
    pub(crate) next_unit: Range<usize>,
    regs: Registers,
}

impl LineMachine
{
    /// Parse the unit at the head of `unit`.
    ///
    /// Fails only when the initial-length field itself is unreadable (the
    /// section is exhausted). A unit whose header is malformed past that
    /// point comes back with an empty instruction stream: it yields no
    /// rows, and `next_unit` still lets the caller continue with whatever
    /// follows it.
    pub(crate) fn parse(mem: &MemoryContext, data: &[u8], unit: Range<usize>, line_strs: Range<usize>)
        -> Result<Self>
    {
        let cur = Bytes::window(data, unit);
        let (first, cur) = cur.read_u32()?;
        let (length, cur, is_64bit) = if first == 0xffff_ffff {
            // 64-bit initial-length escape: the real length follows.
            let (length, cur) = cur.read_u64()?;
            (length, cur, true)
        } else {
            (u64::from(first), cur, false)
        };

        // The unit occupies `length` bytes from this point; what follows is
        // where the next unit would begin.
        let take = usize::try_from(length).unwrap_or(usize::MAX).min(cur.len());
        let next_unit = (cur.offset() + take)..cur.range().end;
        let body = cur.truncate(take);

        let mut machine = Self {
            header: LineHeader::new(),
            directories: MemVec::new_in(mem.clone()),
            file_names: MemVec::new_in(mem.clone()),
            insn: 0..0,
            next_unit,
            regs: Registers::initial(false),
        };
        machine.header.unit_length = length;
        machine.header.is_64bit = is_64bit;

        if let Err(err) = machine.parse_body(data, body, line_strs) {
            tracing::debug!(%err, "skipping undecodable line-number unit");
            machine.insn = 0..0;
        }
        Ok(machine)
    }

    fn parse_body(&mut self, data: &[u8], body: Bytes<'_>, line_strs: Range<usize>) -> Result<()>
    {
        let strs = Bytes::window(data, line_strs);

        let (version, cur) = body.read_u16()?;
        self.header.version = version;
        if version != 5 {
            return Err(TracelineError::MalformedUnit("unsupported line-table version"));
        }
        let (addr_size, cur) = cur.read_u8()?;
        let (seg_selector_size, cur) = cur.read_u8()?;
        let (header_length, cur) = if self.header.is_64bit {
            cur.read_u64()?
        } else {
            let (value, cur) = cur.read_u32()?;
            (u64::from(value), cur)
        };
        // The first state-machine instruction sits `header_length` bytes
        // past this point; the entry tables must end exactly there.
        let header_length =
            usize::try_from(header_length).map_err(|_| TracelineError::MalformedUnit("header length overflow"))?;
        let program_start = cur.slice(header_length)?;

        let (min_insn_length, cur) = cur.read_u8()?;
        let (max_ops_per_insn, cur) = cur.read_u8()?;
        let (default_is_stmt, cur) = cur.read_u8()?;
        let (line_base, cur) = cur.read_i8()?;
        let (line_range, cur) = cur.read_u8()?;
        let (opcode_base, mut cur) = cur.read_u8()?;
        if max_ops_per_insn == 0 || line_range == 0 || opcode_base == 0 {
            return Err(TracelineError::MalformedUnit("degenerate header geometry"));
        }

        self.header.addr_size = addr_size;
        self.header.seg_selector_size = seg_selector_size;
        self.header.min_insn_length = min_insn_length;
        self.header.max_ops_per_insn = max_ops_per_insn;
        self.header.default_is_stmt = default_is_stmt != 0;
        self.header.line_base = line_base;
        self.header.line_range = line_range;
        self.header.opcode_base = opcode_base;

        for opcode in 1..opcode_base {
            let (operands, rest) = cur.read_u8()?;
            cur = rest;
            self.header.set_std_opcode_len(opcode, operands);
        }

        let (dir_formats, cur) = read_entry_formats(cur)?;
        let (dir_count, mut cur) = cur.uleb()?;
        for _ in 0..dir_count {
            let mut entry = EntryData::default();
            for fmt in &dir_formats {
                cur = entry.read_value(cur, *fmt, self.header.is_64bit, strs)?;
            }
            self.directories.push(entry);
        }

        let (file_formats, cur) = read_entry_formats(cur)?;
        let (file_count, mut cur) = cur.uleb()?;
        for _ in 0..file_count {
            let mut entry = EntryData::default();
            for fmt in &file_formats {
                cur = entry.read_value(cur, *fmt, self.header.is_64bit, strs)?;
            }
            self.file_names.push(entry);
        }

        if cur.offset() != program_start.offset() {
            return Err(TracelineError::MalformedUnit("entry tables did not end at the program start"));
        }
        self.insn = cur.range();
        self.reset();
        Ok(())
    }

    /// Put the registers back to the table-6.4 initial state.
    fn reset(&mut self)
    {
        self.regs = Registers::initial(self.header.default_is_stmt);
    }

    /// §6.2.5.1: shared address/op-index advance, used by special opcodes,
    /// `DW_LNS_advance_pc`, and `DW_LNS_const_add_pc`.
    fn advance_addr(&mut self, op_advance: u64)
    {
        let max_ops = u64::from(self.header.max_ops_per_insn);
        let total = self.regs.op_index.wrapping_add(op_advance);
        self.regs.addr = self
            .regs
            .addr
            .wrapping_add(u64::from(self.header.min_insn_length).wrapping_mul(total / max_ops));
        self.regs.op_index = total % max_ops;
    }

    /// A row for the current register state. File and directory indexes
    /// follow the zero-based DWARF 5 convention; an index past the parsed
    /// tables yields empty names rather than failing the unit.
    fn emit_row(&self) -> LocRow
    {
        let file_entry = self.file_names.get(self.regs.file as usize);
        let dir_index = file_entry.map(EntryData::dir_index).unwrap_or(0);
        LocRow {
            addr: self.regs.addr,
            dir: self
                .directories
                .get(dir_index as usize)
                .and_then(EntryData::path)
                .unwrap_or_default(),
            file: file_entry.and_then(EntryData::path).unwrap_or_default(),
            line: self.regs.line,
        }
    }

    /// Run until the next row is emitted. `Ok(None)` means the unit's
    /// instruction stream is exhausted.
    pub(crate) fn next_row(&mut self, data: &[u8]) -> Result<Option<LocRow>>
    {
        loop {
            if self.insn.is_empty() {
                return Ok(None);
            }
            if let Some(row) = self.step(data)? {
                return Ok(Some(row));
            }
        }
    }

    /// Execute one opcode.
    fn step(&mut self, data: &[u8]) -> Result<Option<LocRow>>
    {
        let cur = Bytes::window(data, self.insn.clone());
        let (op, cur) = cur.read_u8()?;

        if op == 0 {
            return self.step_extended(cur);
        }
        if op < self.header.opcode_base {
            return self.step_standard(op, cur);
        }

        // §6.2.5.1 special opcode: advance address and line, emit.
        let adjusted = op - self.header.opcode_base;
        let op_advance = u64::from(adjusted / self.header.line_range);
        self.advance_addr(op_advance);
        self.regs.line = self
            .regs
            .line
            .wrapping_add(i64::from(self.header.line_base) + i64::from(adjusted % self.header.line_range));
        let row = self.emit_row();
        self.regs.basic_block = false;
        self.regs.prologue_end = false;
        self.regs.epilogue_begin = false;
        self.regs.discriminator = 0;
        self.insn = cur.range();
        Ok(Some(row))
    }

    /// §6.2.5.3 extended opcodes: `[0x00] [size] [opcode + operands]`.
    fn step_extended(&mut self, cur: Bytes<'_>) -> Result<Option<LocRow>>
    {
        let (size, cur) = cur.uleb()?;
        let size = usize::try_from(size).map_err(|_| TracelineError::MalformedUnit("extended opcode size overflow"))?;
        // `size` frames the opcode byte and its operands; whatever we do
        // with this opcode, execution resumes after the frame.
        let after = cur.slice(size)?;
        let (ext, cur) = cur.read_u8()?;
        self.insn = after.range();

        match ext {
            extended::END_SEQUENCE => {
                self.regs.end_seq = true;
                let row = self.emit_row();
                // Reset in case another sequence follows in this unit.
                self.reset();
                Ok(Some(row))
            }
            extended::SET_ADDRESS => {
                self.regs.addr = if self.header.addr_size == 8 {
                    cur.u64(0)?
                } else {
                    u64::from(cur.u32(0)?)
                };
                Ok(None)
            }
            extended::SET_DISCRIMINATOR => {
                let (value, _) = cur.uleb()?;
                self.regs.discriminator = value;
                Ok(None)
            }
            // Unknown extended opcodes are framed by `size`; skip them.
            _ => Ok(None),
        }
    }

    /// §6.2.5.2 standard opcodes.
    fn step_standard(&mut self, op: u8, cur: Bytes<'_>) -> Result<Option<LocRow>>
    {
        match op {
            standard::COPY => {
                let row = self.emit_row();
                self.regs.discriminator = 0;
                self.regs.basic_block = false;
                self.regs.prologue_end = false;
                self.regs.epilogue_begin = false;
                self.insn = cur.range();
                Ok(Some(row))
            }
            standard::ADVANCE_PC => {
                let (advance, cur) = cur.uleb()?;
                self.advance_addr(advance);
                self.insn = cur.range();
                Ok(None)
            }
            standard::ADVANCE_LINE => {
                let (delta, cur) = cur.sleb()?;
                self.regs.line = self.regs.line.wrapping_add(delta);
                self.insn = cur.range();
                Ok(None)
            }
            standard::SET_FILE => {
                let (value, cur) = cur.uleb()?;
                self.regs.file = value;
                self.insn = cur.range();
                Ok(None)
            }
            standard::SET_COLUMN => {
                let (value, cur) = cur.uleb()?;
                self.regs.column = value;
                self.insn = cur.range();
                Ok(None)
            }
            standard::NEGATE_STMT => {
                self.regs.is_stmt = !self.regs.is_stmt;
                self.insn = cur.range();
                Ok(None)
            }
            standard::SET_BASIC_BLOCK => {
                self.regs.basic_block = true;
                self.insn = cur.range();
                Ok(None)
            }
            standard::CONST_ADD_PC => {
                // Advance as special opcode 255 would, without emitting.
                let advance = u64::from((255 - self.header.opcode_base) / self.header.line_range);
                self.advance_addr(advance);
                self.insn = cur.range();
                Ok(None)
            }
            standard::FIXED_ADVANCE_PC => {
                // The one operand that is not LEB-encoded.
                let (value, cur) = cur.read_u16()?;
                self.regs.addr = self.regs.addr.wrapping_add(u64::from(value));
                self.insn = cur.range();
                Ok(None)
            }
            standard::SET_PROLOGUE_END => {
                self.regs.prologue_end = true;
                self.insn = cur.range();
                Ok(None)
            }
            standard::SET_EPILOGUE_BEGIN => {
                self.regs.epilogue_begin = true;
                self.insn = cur.range();
                Ok(None)
            }
            standard::SET_ISA => {
                let (value, cur) = cur.uleb()?;
                self.regs.isa = value;
                self.insn = cur.range();
                Ok(None)
            }
            _ => {
                // A standard opcode this reader does not model: the header
                // declares its operand count, so skip exactly those ULEBs.
                let mut cur = cur;
                for _ in 0..self.header.std_opcode_len(op) {
                    let (_, rest) = cur.uleb()?;
                    cur = rest;
                }
                self.insn = cur.range();
                Ok(None)
            }
        }
    }
}

fn read_entry_formats(cur: Bytes<'_>) -> Result<(SmallVec<[EntryFormat; 4]>, Bytes<'_>)>
{
    let (count, mut cur) = cur.read_u8()?;
    let mut formats = SmallVec::new();
    for _ in 0..count {
        let (content, rest) = cur.uleb()?;
        let (form_code, rest) = rest.uleb()?;
        cur = rest;
        formats.push(EntryFormat {
            content: ContentType::from_code(content),
            form: form_code,
        });
    }
    Ok((formats, cur))
}

/// One `.debug_line` / `.debug_line_str` section pair, with the lazily
/// filled address → row cache.
pub(crate) struct DebugTable
{
    mem: MemoryContext,
    file: Weak<ObjectFile>,
    /// Units not yet handed to a machine
    line_data: Range<usize>,
    line_strs: Range<usize>,
    locs: SortedMap<u64, LocRow>,
    machine: Option<LineMachine>,
}

impl DebugTable
{
    pub(crate) fn new(mem: &MemoryContext, file: &Arc<ObjectFile>, line_data: Range<usize>, line_strs: Range<usize>)
        -> Self
    {
        let mut locs = SortedMap::new_in(mem);
        // Low sentinel; the high one is added once every unit has run.
        locs.insert(0, LocRow::default());
        Self {
            mem: mem.clone(),
            file: Arc::downgrade(file),
            line_data,
            line_strs,
            locs,
            machine: None,
        }
    }

    /// The row covering `addr`, materializing only as much of the section
    /// as the cache needs to bracket the query.
    pub(crate) fn source_loc_at_addr(&mut self, addr: u64) -> SourceLoc
    {
        let Some(file) = self.file.upgrade() else {
            return SourceLoc::default();
        };
        let data = file.data();

        while !self.locs.has_key_above(&addr) {
            if self.machine.is_none() {
                if self.line_data.is_empty() {
                    // All units done: cap the cache so floor lookups past
                    // the last row are total.
                    self.locs.insert(u64::MAX, LocRow::default());
                    break;
                }
                match LineMachine::parse(&self.mem, data, self.line_data.clone(), self.line_strs.clone()) {
                    Ok(machine) => {
                        self.line_data = if machine.next_unit.start > self.line_data.start {
                            machine.next_unit.clone()
                        } else {
                            // A unit that does not advance would never end.
                            self.line_data.end..self.line_data.end
                        };
                        self.machine = Some(machine);
                    }
                    Err(err) => {
                        tracing::debug!(%err, "line-number section exhausted mid-unit");
                        self.line_data = self.line_data.end..self.line_data.end;
                        continue;
                    }
                }
            }
            if let Some(machine) = self.machine.as_mut() {
                match machine.next_row(data) {
                    Ok(Some(row)) => {
                        self.locs.insert(row.addr, row);
                    }
                    Ok(None) => {
                        self.machine = None;
                    }
                    Err(err) => {
                        tracing::debug!(%err, "abandoning corrupt line-number unit");
                        self.machine = None;
                    }
                }
            }
        }

        match self.locs.floor(&addr) {
            Some((_, row)) => SourceLoc {
                addr: row.addr,
                dir: file.name_at(row.dir).into_owned(),
                file: file.name_at(row.file).into_owned(),
                line: row.line,
            },
            None => SourceLoc::default(),
        }
    }
}
