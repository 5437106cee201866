//! Container-level behavior: open gating, deduplication, and the section
//! and symbol projections of synthetic Mach-O files.

mod common;

use std::fs;
use std::sync::Arc;

use common::{build_macho, SectionSpec, SymbolSpec};
use tempfile::TempDir;
use traceline_core::{MemoryContext, ObjectKind, ObjectReader};

fn write_file(dir: &TempDir, name: &str, bytes: &[u8]) -> std::path::PathBuf
{
    let path = dir.path().join(name);
    fs::write(&path, bytes).unwrap();
    path
}

fn text_section(addr: u64, size: usize) -> SectionSpec
{
    SectionSpec {
        name: b"__text",
        addr,
        content: vec![0x90; size],
    }
}

#[test]
fn test_open_rejects_small_file()
{
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "empty", &[0u8; 32]);

    let mut reader = ObjectReader::new(MemoryContext::system());
    assert!(reader.open(&path).is_none());
    assert_eq!(reader.open_count(), 0);
}

#[test]
fn test_open_rejects_missing_file()
{
    let dir = TempDir::new().unwrap();
    let mut reader = ObjectReader::new(MemoryContext::system());
    assert!(reader.open(&dir.path().join("nonexistent")).is_none());
}

#[test]
fn test_open_rejects_unknown_magic()
{
    let dir = TempDir::new().unwrap();
    let mut bytes = vec![0xde, 0xad, 0xbe, 0xef];
    bytes.resize(128, 0);
    let path = write_file(&dir, "notmacho", &bytes);

    let mut reader = ObjectReader::new(MemoryContext::system());
    assert!(reader.open(&path).is_none());
    assert_eq!(reader.open_count(), 0);
}

#[test]
fn test_open_deduplicates_by_path()
{
    let dir = TempDir::new().unwrap();
    let image = build_macho(&[text_section(0x1000, 64)], &[]);
    let path = write_file(&dir, "libfoo", &image);

    let mut reader = ObjectReader::new(MemoryContext::system());
    let first = reader.open(&path).unwrap();
    let second = reader.open(&path).unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(reader.open_count(), 1);
    assert_eq!(first.kind(), ObjectKind::MachO64);
}

#[test]
fn test_section_projection_and_lookups()
{
    let dir = TempDir::new().unwrap();
    let image = build_macho(
        &[
            text_section(0x1000, 0x40),
            SectionSpec {
                name: b"__cstring",
                addr: 0x2000,
                content: vec![0; 0x10],
            },
        ],
        &[],
    );
    let path = write_file(&dir, "app", &image);

    let mut reader = ObjectReader::new(MemoryContext::system());
    let object = reader.open(&path).unwrap();
    let table = object.section_table();

    assert_eq!(table.len(), 2);
    // 1-based index with a null slot at zero.
    assert!(table.at_index(0).is_none());
    let text = table.at_index(1).unwrap();
    assert_eq!(object.name_at(text.name), "__text");
    assert_eq!(text.virt_addr, 0x1000);
    assert_eq!(text.virt_size, 0x40);

    // Address floor lookup.
    assert_eq!(table.at_address(0x1020).map(|s| s.virt_addr), Some(0x1000));
    assert_eq!(table.at_address(0x2000).map(|s| s.virt_addr), Some(0x2000));
    assert!(table.at_address(0x0fff).is_none());

    // Name lookup, and the content window it leads to.
    let cstring = object.section_by_name("__cstring").unwrap();
    assert_eq!(cstring.virt_addr, 0x2000);
    assert_eq!(object.section_content(cstring).len(), 0x10);
    assert!(object.section_by_name("__nope").is_none());
}

#[test]
fn test_full_width_section_name_survives()
{
    let dir = TempDir::new().unwrap();
    let image = build_macho(
        &[SectionSpec {
            name: b"abcdefghijklmnop",
            addr: 0x3000,
            content: vec![0; 8],
        }],
        &[],
    );
    let path = write_file(&dir, "wide", &image);

    let mut reader = ObjectReader::new(MemoryContext::system());
    let object = reader.open(&path).unwrap();

    // Sixteen non-NUL bytes surface as a sixteen-character name.
    let section = object.section_by_name("abcdefghijklmnop").unwrap();
    assert_eq!(object.name_at(section.name).len(), 16);
}

#[test]
fn test_symbol_classification()
{
    let dir = TempDir::new().unwrap();
    let image = build_macho(
        &[text_section(0x1000, 0x100)],
        &[
            // Defined symbol in a section (external bit set).
            SymbolSpec {
                name: "_main",
                addr: 0x1000,
                n_type: 0x0f,
                n_sect: 1,
            },
            // Function stab.
            SymbolSpec {
                name: "_helper",
                addr: 0x1040,
                n_type: 0x24,
                n_sect: 1,
            },
            // Absolute symbol: not one of the kept types.
            SymbolSpec {
                name: "_absolute",
                addr: 0x1080,
                n_type: 0x02,
                n_sect: 0,
            },
            // Zero address: skipped.
            SymbolSpec {
                name: "_undefined",
                addr: 0,
                n_type: 0x0f,
                n_sect: 1,
            },
            // Empty name: skipped.
            SymbolSpec {
                name: "",
                addr: 0x10c0,
                n_type: 0x0f,
                n_sect: 1,
            },
        ],
    );
    let path = write_file(&dir, "classify", &image);

    let mut reader = ObjectReader::new(MemoryContext::system());
    let object = reader.open(&path).unwrap();
    let table = object.symbol_table();

    assert_eq!(table.len(), 2);

    let main = table.at_address(0x1000).unwrap();
    assert_eq!(object.name_at(main.name), "_main");
    // The containing symbol answers for every address up to the next one.
    let mid = table.at_address(0x103f).unwrap();
    assert_eq!(object.name_at(mid.name), "_main");
    let helper = table.at_address(0x1040).unwrap();
    assert_eq!(object.name_at(helper.name), "_helper");

    // Below every symbol: the empty sentinel.
    assert!(table.at_address(0x0fff).unwrap().is_empty());

    // Section linkage through the record's 1-based index.
    let section = object.section_table().at_index(main.section).unwrap();
    assert_eq!(object.name_at(section.name), "__text");

    // Reverse index.
    assert_eq!(table.address_of(object.data(), "_helper"), Some(0x1040));
}

#[test]
fn test_uuid_absent_on_minimal_image()
{
    let dir = TempDir::new().unwrap();
    let image = build_macho(&[text_section(0x1000, 16)], &[]);
    let path = write_file(&dir, "nouuid", &image);

    let mut reader = ObjectReader::new(MemoryContext::system());
    let object = reader.open(&path).unwrap();
    assert!(object.uuid().is_none());
}
