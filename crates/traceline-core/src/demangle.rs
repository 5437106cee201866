//! Symbol demangling utilities.
//!
//! Symbol-table names arrive mangled; the resolver presents them demangled
//! when a demangler accepts them and verbatim when none does. Rust symbols
//! (v0 `_R…` and legacy `_ZN…17h…E`) are tried first with the strict Rust
//! demangler, then anything Itanium-shaped is handed to the C++ demangler.
//! Mach-O adds one extra leading underscore to every name; both demanglers
//! are given the stripped spelling as well.

use cpp_demangle::{DemangleOptions, Symbol};
use rustc_demangle::try_demangle;

/// Demangle a raw symbol-table name, falling back to the name verbatim.
///
/// Demangling failure is never an error: a frame with an unmangled C
/// symbol, or a mangling scheme we do not speak, keeps the raw name.
pub fn demangle_symbol(raw: &str) -> String
{
    if let Ok(demangled) = try_demangle(raw) {
        return demangled.to_string();
    }

    if let Some(demangled) = demangle_cpp(raw) {
        return demangled;
    }
    // The Mach-O symbol table prefixes every name with `_`.
    if let Some(stripped) = raw.strip_prefix('_') {
        if let Some(demangled) = demangle_cpp(stripped) {
            return demangled;
        }
    }

    raw.to_string()
}

fn demangle_cpp(name: &str) -> Option<String>
{
    if !name.starts_with("_Z") {
        return None;
    }
    let symbol = Symbol::new(name).ok()?;
    symbol.demangle(&DemangleOptions::default()).ok()
}
