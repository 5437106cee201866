//! # Loaded-Image Registry
//!
//! An [`Image`] describes one binary module (executable or shared library)
//! mapped into the process: the path the loader reports, the address it was
//! loaded at, and the ASLR slide separating its link-time layout from its
//! runtime placement. Addresses coming out of an unwinder are slid;
//! subtracting the slide yields the address used by the module's on-disk
//! symbol and debug tables.
//!
//! The registry keeps images in insertion order and answers "which image
//! covers this address" with a floor lookup over a sentinel-guarded address
//! index, so the query is total even on an empty registry.

use crate::mem::{MemVec, MemoryContext, SortedMap};

/// A binary module mapped into the process address space.
#[derive(Debug, Clone)]
pub struct Image
{
    /// Path to the backing binary, as reported by the loader
    pub name: String,
    /// Virtual address the module is loaded at
    pub load_address: u64,
    /// ASLR displacement; `runtime address − slide` is the on-disk address
    pub slide: i64,
    /// Whether this is the main executable
    pub is_main: bool,
}

/// Registry of currently loaded images.
pub struct ImageRegistry
{
    images: MemVec<Image>,
    by_addr: SortedMap<u64, Option<usize>>,
}

impl ImageRegistry
{
    /// Create an empty registry.
    pub fn new(mem: &MemoryContext) -> Self
    {
        let mut by_addr = SortedMap::new_in(mem);
        // Low sentinel: addresses below every image resolve to nothing.
        by_addr.insert(0, None);
        Self {
            images: MemVec::new_in(mem.clone()),
            by_addr,
        }
    }

    /// Enumerate the images currently mapped into this process.
    ///
    /// On platforms without a loader-enumeration API this returns an empty
    /// registry, and resolution degrades to leaving frames unannotated.
    pub fn from_loaded_images(mem: &MemoryContext) -> Self
    {
        let mut registry = Self::new(mem);
        populate(&mut registry);
        registry
    }

    pub fn add(&mut self, image: Image)
    {
        let slot = self.images.len();
        let addr = image.load_address;
        self.images.push(image);
        self.by_addr.insert(addr, Some(slot));
    }

    /// The image with the greatest load address `<= addr`, if any.
    pub fn at_address(&self, addr: u64) -> Option<&Image>
    {
        let (_, slot) = self.by_addr.floor(&addr)?;
        slot.map(|index| &self.images[index])
    }

    /// Exact-name lookup.
    pub fn by_name(&self, name: &str) -> Option<&Image>
    {
        self.images.iter().find(|image| image.name == name)
    }

    /// The image flagged as the main executable, if any.
    pub fn main_program(&self) -> Option<&Image>
    {
        // Linear search; the main program is usually the first image.
        self.images.iter().find(|image| image.is_main)
    }

    pub fn len(&self) -> usize
    {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.images.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Image>
    {
        self.images.iter()
    }
}

#[cfg(target_os = "macos")]
fn populate(registry: &mut ImageRegistry)
{
    use std::ffi::CStr;

    let count = unsafe { libc::_dyld_image_count() };
    for index in 0..count {
        let name_ptr = unsafe { libc::_dyld_get_image_name(index) };
        let header = unsafe { libc::_dyld_get_image_header(index) };
        if name_ptr.is_null() || header.is_null() {
            continue;
        }
        let name = unsafe { CStr::from_ptr(name_ptr) }.to_string_lossy().into_owned();
        let slide = unsafe { libc::_dyld_get_image_vmaddr_slide(index) };
        registry.add(Image {
            name,
            load_address: header as u64,
            slide: slide as i64,
            // The first dyld image is the main program.
            is_main: index == 0,
        });
    }
    tracing::debug!(images = registry.len(), "enumerated loaded images");
}

#[cfg(not(target_os = "macos"))]
fn populate(_registry: &mut ImageRegistry)
{
    tracing::debug!("no loader enumeration on this platform; image registry left empty");
}
