//! # Frame Resolution
//!
//! The top-level entry point: given stack-frame entries carrying raw
//! return addresses, annotate each with a demangled symbol name and, when
//! the binary's line table covers it, a source file and line.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use traceline_core::{FrameEntry, MemoryContext, Resolver};
//!
//! let mut entries = vec![FrameEntry::new(0x0000_0001_0000_1234)];
//! let mut resolver = Resolver::new(MemoryContext::system());
//! resolver.resolve(&mut entries);
//! for entry in &entries {
//!     println!("{entry}");
//! }
//! ```
//!
//! Every step degrades rather than fails: an address no image covers, a
//! file that cannot be opened, or a symbol table miss each leave that
//! entry exactly as it arrived.

use std::fmt;
use std::path::Path;

use crate::demangle::demangle_symbol;
use crate::image::ImageRegistry;
use crate::mem::MemoryContext;
use crate::object::reader::ObjectReader;

/// One stack frame being annotated.
///
/// The resolver writes `symbol`, `file`, and `line` for entries it can
/// enrich; `addr` is the raw (slid) address the unwinder captured.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameEntry
{
    pub addr: u64,
    pub symbol: String,
    pub file: String,
    pub line: u32,
}

impl FrameEntry
{
    #[must_use]
    pub fn new(addr: u64) -> Self
    {
        Self {
            addr,
            ..Self::default()
        }
    }
}

impl fmt::Display for FrameEntry
{
    /// One line per frame, with whatever was resolved:
    ///
    /// ```text
    /// 0xaaaabbbbcccc
    /// 0xaaaabbbbcccc: ns::DemangledName(int)
    /// 0xaaaabbbbcccc: ns::DemangledName(int): foo.cc:42
    /// ```
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        // 64-bit addresses are 16 nibbles wide, but usually <= 0x7fff_ffff_ffff.
        write!(f, "0x{:012x}", self.addr)?;
        if !self.symbol.is_empty() {
            write!(f, ": {}", self.symbol)?;
        }
        if self.line != 0 {
            write!(f, ": {}:{}", self.file, self.line)?;
        }
        Ok(())
    }
}

/// Annotates frame entries against the images loaded into this process.
pub struct Resolver
{
    images: ImageRegistry,
    reader: ObjectReader,
}

impl Resolver
{
    /// A resolver over the images the platform loader reports.
    #[must_use]
    pub fn new(mem: MemoryContext) -> Self
    {
        let images = ImageRegistry::from_loaded_images(&mem);
        Self::with_images(mem, images)
    }

    /// A resolver over an explicit registry. Lets tests (and callers that
    /// snapshot images themselves) bypass the platform loader.
    #[must_use]
    pub fn with_images(mem: MemoryContext, images: ImageRegistry) -> Self
    {
        Self {
            images,
            reader: ObjectReader::new(mem),
        }
    }

    pub fn images(&self) -> &ImageRegistry
    {
        &self.images
    }

    /// Annotate every entry with a nonzero address.
    pub fn resolve(&mut self, entries: &mut [FrameEntry])
    {
        for entry in entries {
            if entry.addr == 0 {
                continue;
            }
            self.resolve_entry(entry);
        }
    }

    fn resolve_entry(&mut self, entry: &mut FrameEntry)
    {
        let Some(image) = self.images.at_address(entry.addr) else {
            return;
        };
        // The unwinder hands out slid addresses; the on-disk tables use
        // unslid ones.
        let unslid = entry.addr.wrapping_sub(image.slide as u64);
        let name = image.name.clone();

        let Some(object) = self.reader.open(Path::new(&name)) else {
            return;
        };
        let Some(&symbol) = object.symbol_table().at_address(unslid) else {
            return;
        };
        if symbol.is_empty() {
            return;
        }

        let raw = object.name_at(symbol.name);
        entry.symbol = demangle_symbol(&raw);

        let loc = object.source_loc_at_addr(&mut self.reader, unslid);
        if !loc.is_empty() {
            entry.file = loc.file;
            entry.line = loc.line as u32;
        }
    }
}

/// One-shot convenience over [`Resolver`].
pub fn resolve_entries(entries: &mut [FrameEntry], mem: &MemoryContext)
{
    Resolver::new(mem.clone()).resolve(entries);
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_display_address_only()
    {
        let entry = FrameEntry::new(0x1000);
        assert_eq!(entry.to_string(), "0x000000001000");
    }

    #[test]
    fn test_display_with_symbol_and_location()
    {
        let entry = FrameEntry {
            addr: 0xaaaa_bbbb_cccc,
            symbol: "foo(int)".to_string(),
            file: "foo.cc".to_string(),
            line: 42,
        };
        assert_eq!(entry.to_string(), "0xaaaabbbbcccc: foo(int): foo.cc:42");
    }

    #[test]
    fn test_zero_address_untouched()
    {
        let mem = MemoryContext::system();
        let mut entries = vec![FrameEntry::default()];
        let mut resolver = Resolver::with_images(mem.clone(), ImageRegistry::new(&mem));
        resolver.resolve(&mut entries);
        assert_eq!(entries[0], FrameEntry::default());
    }

    #[test]
    fn test_uncovered_address_untouched()
    {
        let mem = MemoryContext::system();
        let mut entries = vec![FrameEntry::new(0xdead_beef)];
        let mut resolver = Resolver::with_images(mem.clone(), ImageRegistry::new(&mem));
        resolver.resolve(&mut entries);
        assert_eq!(entries[0], FrameEntry::new(0xdead_beef));
    }
}
