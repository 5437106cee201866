//! # Caller-Supplied Allocation
//!
//! Every container the reader builds routes its storage through a
//! [`MemoryContext`], a cloneable handle over the byte-level
//! `(alloc, dealloc)` pair supplied by the caller of the resolver. The
//! context implements the [`Allocator`] trait, so the containers carry
//! their allocator directly and no table needs a back-reference to the
//! reader that created it.
//!
//! The byte pair is expected to behave like `malloc`/`free` with respect to
//! alignment: returned blocks must be aligned for any fundamental type.
//! Requests with stricter alignment than that are refused rather than
//! handed a misaligned block.

use std::alloc::Layout;
use std::fmt;
use std::ptr::NonNull;
use std::sync::Arc;

use allocator_api2::alloc::{AllocError, Allocator};

/// Alignment the caller's byte allocator is assumed to provide, matching
/// the guarantee of `malloc` on 64-bit platforms.
const ASSUMED_ALIGN: usize = 16;

type AllocHook = Box<dyn Fn(usize) -> *mut u8>;
type DeallocHook = Box<dyn Fn(*mut u8, usize)>;

struct Hooks
{
    alloc: AllocHook,
    dealloc: DeallocHook,
}

/// Handle wrapping a caller-supplied byte-level allocator pair.
///
/// Cloning the context clones the handle, not the hooks; all clones route
/// to the same pair. Containers built by the reader
/// ([`MemVec`], [`MemHashMap`], [`SortedMap`]) take a clone at
/// construction and use it for every allocation they make.
#[derive(Clone)]
pub struct MemoryContext
{
    hooks: Arc<Hooks>,
}

impl MemoryContext
{
    /// Wrap an `(alloc-bytes, dealloc-bytes)` pair.
    ///
    /// `alloc` receives a size in bytes and returns a pointer (null on
    /// failure); `dealloc` receives the pointer and the same size.
    pub fn new<A, D>(alloc: A, dealloc: D) -> Self
    where
        A: Fn(usize) -> *mut u8 + 'static,
        D: Fn(*mut u8, usize) + 'static,
    {
        Self {
            hooks: Arc::new(Hooks {
                alloc: Box::new(alloc),
                dealloc: Box::new(dealloc),
            }),
        }
    }

    /// A context backed by the process allocator, for callers that do not
    /// bring their own pair.
    pub fn system() -> Self
    {
        Self::new(
            |size| match Layout::from_size_align(size.max(1), ASSUMED_ALIGN) {
                Ok(layout) => unsafe { std::alloc::alloc(layout) },
                Err(_) => std::ptr::null_mut(),
            },
            |ptr, size| {
                if let Ok(layout) = Layout::from_size_align(size.max(1), ASSUMED_ALIGN) {
                    unsafe { std::alloc::dealloc(ptr, layout) };
                }
            },
        )
    }

    /// Allocate `n` bytes through the caller's pair. Null on failure.
    pub fn alloc_bytes(&self, n: usize) -> *mut u8
    {
        (self.hooks.alloc)(n)
    }

    /// Return `n` bytes previously obtained from [`Self::alloc_bytes`].
    ///
    /// # Safety
    ///
    /// `ptr` must have come from `alloc_bytes(n)` on a clone of this
    /// context and must not be used afterwards.
    pub unsafe fn dealloc_bytes(&self, ptr: *mut u8, n: usize)
    {
        (self.hooks.dealloc)(ptr, n)
    }

    /// Construct a `T` on memory from the pair; dropping the box destroys
    /// the value and returns the memory the same way.
    pub fn make_box<T>(&self, value: T) -> MemBox<T>
    {
        MemBox::new_in(value, self.clone())
    }
}

impl Default for MemoryContext
{
    fn default() -> Self
    {
        Self::system()
    }
}

impl fmt::Debug for MemoryContext
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("MemoryContext").finish_non_exhaustive()
    }
}

unsafe impl Allocator for MemoryContext
{
    fn allocate(&self, layout: Layout) -> std::result::Result<NonNull<[u8]>, AllocError>
    {
        if layout.align() > ASSUMED_ALIGN {
            return Err(AllocError);
        }
        if layout.size() == 0 {
            // Zero-size allocations never touch the pair.
            let dangling = NonNull::new(layout.align() as *mut u8).ok_or(AllocError)?;
            return Ok(NonNull::slice_from_raw_parts(dangling, 0));
        }
        let ptr = self.alloc_bytes(layout.size());
        NonNull::new(ptr)
            .map(|ptr| NonNull::slice_from_raw_parts(ptr, layout.size()))
            .ok_or(AllocError)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout)
    {
        if layout.size() == 0 {
            return;
        }
        self.dealloc_bytes(ptr.as_ptr(), layout.size());
    }
}

/// Growable sequence backed by the caller's allocator.
pub type MemVec<T> = allocator_api2::vec::Vec<T, MemoryContext>;

/// Owning handle backed by the caller's allocator.
pub type MemBox<T> = allocator_api2::boxed::Box<T, MemoryContext>;

/// Hash map backed by the caller's allocator.
pub type MemHashMap<K, V> = hashbrown::HashMap<K, V, hashbrown::hash_map::DefaultHashBuilder, MemoryContext>;

/// Create an empty [`MemHashMap`] on the given context.
pub fn mem_hash_map<K, V>(mem: &MemoryContext) -> MemHashMap<K, V>
{
    MemHashMap::with_hasher_in(hashbrown::hash_map::DefaultHashBuilder::default(), mem.clone())
}

/// Ordered map over a sorted vector, used for every "greatest key not
/// exceeding x" lookup in the reader.
///
/// Callers insert explicit low/high sentinel entries where the protocol
/// calls for them, so [`SortedMap::floor`] is total over the queried range.
/// Inserts are first-writer-wins: a key that is already present is left
/// untouched and the insert reports `false`.
pub struct SortedMap<K, V>
{
    entries: MemVec<(K, V)>,
}

impl<K: Ord, V> SortedMap<K, V>
{
    pub fn new_in(mem: &MemoryContext) -> Self
    {
        Self {
            entries: MemVec::new_in(mem.clone()),
        }
    }

    pub fn len(&self) -> usize
    {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.entries.is_empty()
    }

    /// Insert `key → value` unless `key` is already present.
    pub fn insert(&mut self, key: K, value: V) -> bool
    {
        match self.entries.binary_search_by(|(existing, _)| existing.cmp(&key)) {
            Ok(_) => false,
            Err(slot) => {
                self.entries.insert(slot, (key, value));
                true
            }
        }
    }

    pub fn get(&self, key: &K) -> Option<&V>
    {
        self.entries
            .binary_search_by(|(existing, _)| existing.cmp(key))
            .ok()
            .map(|slot| &self.entries[slot].1)
    }

    pub fn contains_key(&self, key: &K) -> bool
    {
        self.get(key).is_some()
    }

    /// Greatest entry whose key is `<= key`, if any.
    pub fn floor(&self, key: &K) -> Option<(&K, &V)>
    {
        let upper = self.entries.partition_point(|(existing, _)| existing <= key);
        if upper == 0 {
            return None;
        }
        let (k, v) = &self.entries[upper - 1];
        Some((k, v))
    }

    /// Whether any key strictly greater than `key` is present.
    pub fn has_key_above(&self, key: &K) -> bool
    {
        self.entries.partition_point(|(existing, _)| existing <= key) < self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)>
    {
        self.entries.iter().map(|(k, v)| (k, v))
    }
}
