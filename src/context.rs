//! Allocator context with size-class bookkeeping and ownership table.
//!
//! This module provides the [`Bibop`] and [`BibopBuilder`] types. A context
//! owns one record per size class (a free-page list, a full-page list and
//! the canonical object size) plus a two-level ownership table that answers
//! whether a given page belongs to this context.

use std::io::{Error, ErrorKind, Result};
use std::ptr::NonNull;

use log::{debug, trace};

use crate::page::{FIRST_OBJECT_OFFSET, PAGE_MASK, PAGE_SIZE, PageHeader};
use crate::page_list::PageList;
use crate::provider::{HeapPageProvider, PageProvider};

/// Default maximum allocation size (exclusive).
const DEFAULT_MAX_SIZE: usize = 256;

/// Default size-class granularity: canonical sizes are multiples of this.
const DEFAULT_GRANULARITY: usize = 16;

/// Default first dimension of the ownership table.
const DEFAULT_TOP_SIZE: usize = 64;

/// Default second dimension of the ownership table.
const DEFAULT_SUB_SIZE: usize = 64;

/// Builder for creating a [`Bibop`] context with custom configuration.
///
/// # Example
///
/// ```rust
/// use bibop_pool::BibopBuilder;
///
/// let pool = BibopBuilder::new()
///     .max_size(64)
///     .granularity(16)
///     .build();
/// ```
pub struct BibopBuilder {
    max_size: usize,
    granularity: usize,
    top_size: usize,
    sub_size: usize,
    provider: Box<dyn PageProvider>,
}

impl Default for BibopBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BibopBuilder {
    /// Creates a new builder with default settings.
    ///
    /// Default settings:
    /// - Max size: 256 bytes (exclusive)
    /// - Granularity: 16 bytes
    /// - Ownership table: 64 x 64 (4096 pages)
    /// - Provider: [`HeapPageProvider`]
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_size: DEFAULT_MAX_SIZE,
            granularity: DEFAULT_GRANULARITY,
            top_size: DEFAULT_TOP_SIZE,
            sub_size: DEFAULT_SUB_SIZE,
            provider: Box::new(HeapPageProvider::new()),
        }
    }

    /// Sets the maximum allocation size (exclusive).
    ///
    /// Requests of `max_size` bytes or more are rejected; callers needing
    /// larger objects must use a different allocator.
    #[must_use]
    pub const fn max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    /// Sets the size-class granularity.
    ///
    /// Canonical object sizes are multiples of this value, so nearby request
    /// sizes coalesce onto shared pages. Must be at least 2 bytes (a freed
    /// slot stores a 16-bit offset in its own storage).
    #[must_use]
    pub const fn granularity(mut self, granularity: usize) -> Self {
        self.granularity = granularity;
        self
    }

    /// Sets the dimensions of the two-level ownership table.
    ///
    /// The table bounds the number of pages the context can ever own to
    /// `top_size * sub_size`; allocation fails with an out-of-pages error
    /// once it is full.
    #[must_use]
    pub const fn table_size(mut self, top_size: usize, sub_size: usize) -> Self {
        self.top_size = top_size;
        self.sub_size = sub_size;
        self
    }

    /// Sets a custom page provider for the context.
    #[must_use]
    pub fn provider(mut self, provider: Box<dyn PageProvider>) -> Self {
        self.provider = provider;
        self
    }

    /// Builds the allocator context with the configured settings.
    ///
    /// The maximum size, the canonical size of every class and the ownership
    /// table dimensions are fixed for the context's lifetime.
    ///
    /// # Panics
    ///
    /// Panics if the configuration is unusable: a zero `max_size`, a
    /// granularity below 2, table dimensions of zero or beyond `u16` range,
    /// or a largest canonical size that does not fit in a page.
    #[must_use]
    pub fn build(self) -> Bibop {
        assert!(self.max_size > 0, "max_size must be positive");
        assert!(self.granularity >= 2, "granularity must be at least 2");
        assert!(
            self.top_size > 0 && self.top_size <= usize::from(u16::MAX),
            "top_size out of range"
        );
        assert!(
            self.sub_size > 0 && self.sub_size <= usize::from(u16::MAX),
            "sub_size out of range"
        );

        let num_classes = (self.max_size - 1).max(1).div_ceil(self.granularity);
        let largest = num_classes * self.granularity;
        assert!(
            largest <= PAGE_SIZE - FIRST_OBJECT_OFFSET as usize,
            "largest canonical size {largest} does not fit in a page"
        );

        #[allow(clippy::cast_possible_truncation)]
        let classes = (1..=num_classes)
            .map(|i| SizeClass {
                free: PageList::new(),
                full: PageList::new(),
                obj_size: (i * self.granularity) as u16,
            })
            .collect();

        Bibop {
            classes,
            max_size: self.max_size,
            granularity: self.granularity,
            table: (0..self.top_size).map(|_| None).collect(),
            sub_size: self.sub_size,
            next_slot: 0,
            live_pages: 0,
            provider: self.provider,
        }
    }
}

/// Per-class bookkeeping record.
///
/// Every live page of the class appears in exactly one of the two lists,
/// never both, never duplicated.
struct SizeClass {
    /// Pages with spare capacity.
    free: PageList,

    /// Pages with no capacity left.
    full: PageList,

    /// Canonical object size served by this class.
    obj_size: u16,
}

/// A BiBoP small-object allocator context.
///
/// Each context is an independent value: it owns its size-class records and
/// every page reachable through them, and multiple contexts may coexist. The
/// context is single-threaded by design; concurrent callers must supply
/// external mutual exclusion.
///
/// Allocation and deallocation are synchronous, non-blocking and O(1).
/// Pages that become fully empty are not returned to the provider
/// automatically; all live pages are released when the context is dropped.
///
/// # Example
///
/// ```rust
/// use bibop_pool::BibopBuilder;
///
/// # fn main() -> std::io::Result<()> {
/// let mut pool = BibopBuilder::new().max_size(64).build();
///
/// let ptr = pool.allocate(24)?; // served from the 32-byte class
/// // SAFETY: ptr came from this context and is not used afterwards
/// unsafe { pool.deallocate(ptr) };
/// # Ok(())
/// # }
/// ```
pub struct Bibop {
    /// Size-class records; a request maps to its class in O(1).
    classes: Vec<SizeClass>,

    /// Maximum allocation size (exclusive).
    max_size: usize,

    /// Canonical sizes are multiples of this.
    granularity: usize,

    /// Two-level ownership table: `table[top][sub]` holds the page stamped
    /// with those coordinates iff it is live and owned by this context.
    /// Rows are allocated lazily.
    table: Vec<Option<Box<[Option<NonNull<PageHeader>>]>>>,

    /// Second dimension of the ownership table.
    sub_size: usize,

    /// Next unused flat slot in the ownership table.
    next_slot: usize,

    /// Number of pages currently owned by this context.
    live_pages: usize,

    /// The environment supplying fresh pages.
    provider: Box<dyn PageProvider>,
}

impl Bibop {
    /// Creates a new context with default settings.
    ///
    /// This is equivalent to `BibopBuilder::new().build()`.
    #[must_use]
    pub fn new() -> Self {
        BibopBuilder::new().build()
    }

    /// Returns the maximum allocation size (exclusive).
    #[must_use]
    pub const fn max_size(&self) -> usize {
        self.max_size
    }

    /// Returns the number of pages currently owned by this context.
    #[must_use]
    pub const fn live_pages(&self) -> usize {
        self.live_pages
    }

    /// Returns the canonical object size a request of `size` bytes would be
    /// served with, or `None` if the request would be rejected.
    ///
    /// Canonical sizes are monotonically non-decreasing in the request size
    /// and never smaller than it.
    #[must_use]
    pub fn canonical_size(&self, size: usize) -> Option<usize> {
        if size >= self.max_size {
            return None;
        }
        Some(usize::from(self.classes[self.class_index(size)].obj_size))
    }

    /// Allocates an uninitialized object of at least `size` bytes.
    ///
    /// The object has exactly the canonical size of the request's class. The
    /// most recently touched page of the class is reused first; a fresh page
    /// is requested from the provider only when no page has spare capacity.
    ///
    /// On failure no context state is mutated, and the caller may retry
    /// after other objects are freed.
    ///
    /// # Errors
    ///
    /// - `ErrorKind::InvalidInput` if `size >= max_size`; this context
    ///   cannot serve the request at all
    /// - `ErrorKind::OutOfMemory` if no page has capacity and none could be
    ///   obtained from the provider (or the ownership table is full)
    pub fn allocate(&mut self, size: usize) -> Result<NonNull<u8>> {
        if size >= self.max_size {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                format!("size {size} exceeds the class limit {}", self.max_size),
            ));
        }

        let class_index = self.class_index(size);
        if self.classes[class_index].free.is_empty() {
            self.grow_class(class_index)?;
        }

        Ok(self.carve_from_class(class_index))
    }

    /// Carves one object from the head page of a class's free list.
    ///
    /// The class must have at least one page with spare capacity.
    fn carve_from_class(&mut self, class_index: usize) -> NonNull<u8> {
        let class = &mut self.classes[class_index];
        let page_ptr = class.free.front().unwrap();
        // SAFETY: pages on the free list are live and owned by this context
        let page = unsafe { &mut *page_ptr.as_ptr() };
        debug_assert!(!page.is_exhausted());

        // SAFETY: the page sits at the start of a live provider page and has
        // spare capacity
        let ptr = unsafe { page.carve() };

        if page.is_exhausted() {
            let popped = class.free.pop_front().unwrap();
            debug_assert_eq!(popped, page_ptr);
            // SAFETY: the page was just unlinked from the free list
            unsafe { class.full.push_front(popped) };
            trace!(
                "page {page_ptr:p} moved to the full list (class size {})",
                class.obj_size
            );
        }

        ptr
    }

    /// Returns an object to its owning page.
    ///
    /// The slot is pushed onto the page's internal free list, and the page
    /// is promoted from the full list back to the free list if this was its
    /// first spare slot. No ownership check is performed on this path;
    /// defensive callers must use [`owns`](Self::owns) beforehand.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    /// - `ptr` was returned by [`allocate`](Self::allocate) on this context
    /// - `ptr` has not already been deallocated
    /// - the object is not referenced afterwards
    pub unsafe fn deallocate(&mut self, ptr: NonNull<u8>) {
        // SAFETY: ptr points into a live page per the caller's contract
        let page_ptr = unsafe { PageHeader::locate(ptr) };
        // SAFETY: the recovered page is owned by this context
        let page = unsafe { &mut *page_ptr.as_ptr() };

        let was_full = page.is_exhausted();
        // SAFETY: the slot was carved from this page and is no longer in use
        unsafe { page.push_slot(ptr) };

        if was_full {
            let class = &mut self.classes[class_of_canonical(page.size, self.granularity)];
            // SAFETY: an exhausted page is linked on its class's full list
            unsafe {
                class.full.remove(page_ptr);
                class.free.push_front(page_ptr);
            }
            trace!(
                "page {page_ptr:p} moved back to the free list (class size {})",
                class.obj_size
            );
        }
    }

    /// Returns `true` iff `page` is live and owned by this context.
    ///
    /// O(1) and side-effect free: the page's stamped coordinates are bounds
    /// checked and looked up in the ownership table, which is the sole
    /// authority for the ownership predicate. This check is meant for
    /// defensive use before [`deallocate`](Self::deallocate); it is never
    /// consulted on the allocation or deallocation fast paths.
    ///
    /// # Safety
    ///
    /// `page` must point to memory readable for at least the header size.
    /// Pages of other contexts and never-owned-but-readable candidates are
    /// fine and report `false`.
    #[must_use]
    pub unsafe fn owns(&self, page: NonNull<PageHeader>) -> bool {
        // SAFETY: page is readable for the header per the caller's contract
        let header = unsafe { page.as_ref() };
        let top = usize::from(header.top_index);
        let sub = usize::from(header.sub_index);

        top < self.table.len()
            && sub < self.sub_size
            && matches!(&self.table[top], Some(row) if row[sub] == Some(page))
    }

    /// Maps a request size to its class index.
    fn class_index(&self, size: usize) -> usize {
        size.max(1).div_ceil(self.granularity) - 1
    }

    /// Acquires a fresh page for the class and links it on the free list.
    ///
    /// The ownership-table slot is reserved before asking the provider, so a
    /// declared failure leaves the context unchanged.
    fn grow_class(&mut self, class_index: usize) -> Result<()> {
        if self.next_slot >= self.table.len() * self.sub_size {
            return Err(Error::new(
                ErrorKind::OutOfMemory,
                "ownership table is full",
            ));
        }
        let top = self.next_slot / self.sub_size;
        let sub = self.next_slot % self.sub_size;

        let obj_size = self.classes[class_index].obj_size;
        let page_ptr = self
            .provider
            .acquire_page(obj_size)
            .ok_or_else(|| Error::new(ErrorKind::OutOfMemory, "no page available"))?;
        debug_assert_eq!(page_ptr.as_ptr() as usize & PAGE_MASK, 0);

        // SAFETY: the provider returned a live, freshly stamped page
        let page = unsafe { &mut *page_ptr.as_ptr() };
        debug_assert_eq!(page.size, obj_size);
        #[allow(clippy::cast_possible_truncation)]
        {
            page.top_index = top as u16;
            page.sub_index = sub as u16;
        }

        let sub_size = self.sub_size;
        let row = self.table[top].get_or_insert_with(|| vec![None; sub_size].into());
        debug_assert!(row[sub].is_none());
        row[sub] = Some(page_ptr);
        self.next_slot += 1;
        self.live_pages += 1;

        // SAFETY: a fresh page is unlinked
        unsafe { self.classes[class_index].free.push_front(page_ptr) };
        debug!("registered page {page_ptr:p} for class size {obj_size} at ({top}, {sub})");
        Ok(())
    }

    #[cfg(test)]
    fn list_lens(&self, size: usize) -> (usize, usize) {
        let class = &self.classes[self.class_index(size)];
        (class.free.len(), class.full.len())
    }
}

impl Default for Bibop {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Bibop {
    fn drop(&mut self) {
        // Hand every live page back to the provider.
        for row in self.table.iter().flatten() {
            for &page in row.iter() {
                if let Some(page) = page {
                    // SAFETY: the page came from this provider and no object
                    // in it can outlive the context
                    unsafe { self.provider.release_page(page) };
                }
            }
        }
    }
}

/// Maps a canonical object size back to its class index.
fn class_of_canonical(obj_size: u16, granularity: usize) -> usize {
    usize::from(obj_size) / granularity - 1
}
