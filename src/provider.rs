//! Page provider trait and default heap-backed implementation.
//!
//! This module provides the [`PageProvider`] trait that defines the interface
//! for the environment supplying fresh pages to an allocator context, and
//! [`HeapPageProvider`] which backs pages with the standard library's global
//! allocator.

use std::alloc::{Layout, alloc_zeroed, dealloc};
use std::ptr::NonNull;

use crate::page::{PAGE_SIZE, PageHeader};

/// Trait for the environment supplying pages to an allocator context.
///
/// Implementations hand out zeroed, alignment-guaranteed pages on demand and
/// may optionally reclaim emptied ones. The default implementation backs
/// pages with the standard library's global allocator; other backends might
/// carve pages from an mmap region or a static arena.
///
/// # Safety
///
/// Implementations must ensure:
/// - `acquire_page` returns a [`PAGE_SIZE`]-byte block aligned to
///   [`PAGE_SIZE`], zeroed, with its header stamped via [`PageHeader::init`]
/// - the page remains valid until `release_page` is called for it
///
/// # Example
///
/// ```rust
/// use std::ptr::NonNull;
/// use bibop_pool::{PageHeader, PageProvider};
///
/// struct MyProvider;
///
/// impl PageProvider for MyProvider {
///     fn acquire_page(&mut self, obj_size: u16) -> Option<NonNull<PageHeader>> {
///         // Custom page acquisition logic
///         # unimplemented!()
///     }
/// }
/// ```
pub trait PageProvider {
    /// Acquires a freshly zeroed page stamped for the given size class.
    ///
    /// The returned page has `inc_off` at the first usable offset, an empty
    /// internal free list, and `obj_size` as its canonical object size.
    ///
    /// Returns `None` if no page can be obtained; the allocator surfaces
    /// this as an out-of-pages failure.
    fn acquire_page(&mut self, obj_size: u16) -> Option<NonNull<PageHeader>>;

    /// Reclaims a page previously returned by `acquire_page`.
    ///
    /// The default implementation is a no-op: providers that never take
    /// pages back (a static arena, for instance) need not override it.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    /// - `page` was returned by a previous call to `acquire_page` on this
    ///   provider
    /// - no live object in the page is referenced afterwards
    /// - the page is not released twice
    unsafe fn release_page(&mut self, page: NonNull<PageHeader>) {
        let _ = page;
    }
}

/// Default page provider backed by the standard library's global allocator.
///
/// Pages are allocated zeroed with a `PAGE_SIZE`/`PAGE_SIZE` layout, which
/// guarantees the alignment that address masking relies on, and are returned
/// to the global allocator on release.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeapPageProvider;

impl HeapPageProvider {
    /// Creates a new heap page provider.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    const fn layout() -> Layout {
        match Layout::from_size_align(PAGE_SIZE, PAGE_SIZE) {
            Ok(layout) => layout,
            Err(_) => unreachable!(),
        }
    }
}

impl PageProvider for HeapPageProvider {
    fn acquire_page(&mut self, obj_size: u16) -> Option<NonNull<PageHeader>> {
        // SAFETY: the layout has non-zero size and power-of-two alignment
        let block = NonNull::new(unsafe { alloc_zeroed(Self::layout()) })?;
        // SAFETY: block is a zeroed, PAGE_SIZE-aligned PAGE_SIZE-byte region
        Some(unsafe { PageHeader::init(block, obj_size) })
    }

    unsafe fn release_page(&mut self, page: NonNull<PageHeader>) {
        // SAFETY: page was allocated by acquire_page with the same layout
        unsafe { dealloc(page.as_ptr().cast(), Self::layout()) };
    }
}
