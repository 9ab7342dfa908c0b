//! Page layout and per-page carving primitives.
//!
//! Every page is a 4096-byte, 4096-byte-aligned block holding a [`PageHeader`]
//! at offset zero followed by object storage for a single size class. Objects
//! are carved first from a bump cursor and, once the bump region is exhausted,
//! from an internal free list threaded through the freed slots' own bytes.

use std::ptr::NonNull;

/// Size of every page in bytes. Pages are also aligned to this value.
pub const PAGE_SIZE: usize = 4096;

/// Mask selecting the in-page offset bits of an address.
pub const PAGE_MASK: usize = PAGE_SIZE - 1;

/// Offset of the first object slot in a page.
///
/// The header occupies the start of the page; object storage begins at the
/// header size rounded up to 16 bytes.
#[allow(clippy::cast_possible_truncation)]
pub const FIRST_OBJECT_OFFSET: u16 = ((size_of::<PageHeader>() + 15) & !15) as u16;

/// Header stored at the start of every page.
///
/// The `next`/`prev` fields are intrusive links for whichever page list
/// (free or full) currently holds the page. Offsets rather than pointers are
/// used for the in-page cursors to keep the header small.
///
/// A page's start address is always a multiple of [`PAGE_SIZE`], so the
/// owning page of any object can be recovered with [`PageHeader::locate`].
#[repr(C)]
#[derive(Debug)]
pub struct PageHeader {
    pub(crate) next: Option<NonNull<PageHeader>>,
    pub(crate) prev: Option<NonNull<PageHeader>>,
    /// Bump-allocation cursor. Zero means the bump region is exhausted.
    pub(crate) inc_off: u16,
    /// Head offset of the page's internal free list. Zero means empty.
    pub(crate) free_off: u16,
    /// First coordinate of this page in the ownership table.
    pub(crate) top_index: u16,
    /// Second coordinate of this page in the ownership table.
    pub(crate) sub_index: u16,
    /// Canonical object size of the page's size class.
    pub(crate) size: u16,
}

impl PageHeader {
    /// Writes a fresh header into a zeroed, page-aligned block and returns it.
    ///
    /// The bump cursor starts at [`FIRST_OBJECT_OFFSET`] and the internal
    /// free list starts empty. Page providers use this to stamp the pages
    /// they hand out.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    /// - `block` points to at least [`PAGE_SIZE`] writable bytes
    /// - `block` is aligned to [`PAGE_SIZE`]
    /// - `obj_size` does not exceed `PAGE_SIZE - FIRST_OBJECT_OFFSET`
    pub unsafe fn init(block: NonNull<u8>, obj_size: u16) -> NonNull<Self> {
        debug_assert_eq!(block.as_ptr() as usize & PAGE_MASK, 0);
        let header = block.cast::<Self>();
        // SAFETY: block is valid for PAGE_SIZE writes and suitably aligned
        unsafe {
            header.as_ptr().write(Self {
                next: None,
                prev: None,
                inc_off: FIRST_OBJECT_OFFSET,
                free_off: 0,
                top_index: 0,
                sub_index: 0,
                size: obj_size,
            });
        }
        header
    }

    /// Recovers the owning page of an object pointer by clearing the low
    /// address bits.
    ///
    /// # Safety
    ///
    /// `ptr` must point into a live page produced by a page provider. Passing
    /// any other pointer is undefined behavior, not a reported error.
    #[inline]
    pub unsafe fn locate(ptr: NonNull<u8>) -> NonNull<Self> {
        let addr = ptr.as_ptr() as usize & !PAGE_MASK;
        NonNull::new(addr as *mut Self).unwrap()
    }

    /// Returns the canonical object size served by this page.
    #[inline]
    #[must_use]
    pub const fn object_size(&self) -> u16 {
        self.size
    }

    /// Returns `true` if the page has neither bump capacity nor free-list
    /// entries left.
    #[inline]
    pub(crate) const fn is_exhausted(&self) -> bool {
        self.inc_off == 0 && self.free_off == 0
    }

    /// Returns the base address of the page this header sits in.
    #[inline]
    fn base(&mut self) -> *mut u8 {
        std::ptr::from_mut(self).cast::<u8>()
    }

    /// Carves one object slot from the page.
    ///
    /// Prefers the bump cursor; once it is exhausted, pops the head of the
    /// internal free list. Freed slots store the offset of the next freed
    /// slot in their own first bytes.
    ///
    /// # Safety
    ///
    /// The header must sit at the start of a live page and the page must not
    /// be exhausted.
    #[allow(clippy::cast_possible_truncation)]
    pub(crate) unsafe fn carve(&mut self) -> NonNull<u8> {
        let base = self.base();
        if self.inc_off != 0 {
            // SAFETY: inc_off is a valid in-page offset
            let ptr = unsafe { base.add(self.inc_off as usize) };
            let new_off = self.inc_off + self.size;
            // Keep the cursor only while at least one more full object fits
            // before the page boundary.
            self.inc_off = if PAGE_SIZE as u16 - new_off > self.size {
                new_off
            } else {
                0
            };
            NonNull::new(ptr).unwrap()
        } else {
            debug_assert_ne!(self.free_off, 0, "carve called on an exhausted page");
            // SAFETY: free_off is a valid in-page offset of a freed slot
            let ptr = unsafe { base.add(self.free_off as usize) };
            // SAFETY: the slot's first bytes hold the next free offset
            self.free_off = unsafe { ptr.cast::<u16>().read_unaligned() };
            NonNull::new(ptr).unwrap()
        }
    }

    /// Pushes a freed slot onto the page's internal free list.
    ///
    /// # Safety
    ///
    /// `ptr` must point to a slot previously carved from this page and not
    /// currently on the free list.
    #[allow(clippy::cast_possible_truncation)]
    pub(crate) unsafe fn push_slot(&mut self, ptr: NonNull<u8>) {
        let offset = (ptr.as_ptr() as usize - self.base() as usize) as u16;
        debug_assert!(offset >= FIRST_OBJECT_OFFSET);
        // SAFETY: the slot is at least two bytes and no longer in use
        unsafe { ptr.as_ptr().cast::<u16>().write_unaligned(self.free_off) };
        self.free_off = offset;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::alloc::{Layout, alloc_zeroed, dealloc};

    struct TestPage {
        header: NonNull<PageHeader>,
    }

    impl TestPage {
        fn new(obj_size: u16) -> Self {
            let layout = Layout::from_size_align(PAGE_SIZE, PAGE_SIZE).unwrap();
            let block = NonNull::new(unsafe { alloc_zeroed(layout) }).unwrap();
            let header = unsafe { PageHeader::init(block, obj_size) };
            Self { header }
        }

        fn header(&mut self) -> &mut PageHeader {
            unsafe { self.header.as_mut() }
        }
    }

    impl Drop for TestPage {
        fn drop(&mut self) {
            let layout = Layout::from_size_align(PAGE_SIZE, PAGE_SIZE).unwrap();
            unsafe { dealloc(self.header.as_ptr().cast(), layout) };
        }
    }

    #[test]
    fn test_init_stamps_header() {
        let mut page = TestPage::new(16);
        let header = page.header();
        assert_eq!(header.object_size(), 16);
        assert_eq!(header.inc_off, FIRST_OBJECT_OFFSET);
        assert_eq!(header.free_off, 0);
        assert!(header.next.is_none());
        assert!(header.prev.is_none());
        assert!(!header.is_exhausted());
    }

    #[test]
    fn test_first_object_offset_covers_header() {
        assert!(FIRST_OBJECT_OFFSET as usize >= size_of::<PageHeader>());
        assert_eq!(FIRST_OBJECT_OFFSET % 16, 0);
    }

    #[test]
    fn test_locate_recovers_page() {
        let mut page = TestPage::new(16);
        let header_ptr = page.header;
        let ptr = unsafe { page.header().carve() };
        assert_eq!(unsafe { PageHeader::locate(ptr) }, header_ptr);

        // Any offset within the page maps back to the same header.
        let deep = NonNull::new(unsafe { ptr.as_ptr().add(7) }).unwrap();
        assert_eq!(unsafe { PageHeader::locate(deep) }, header_ptr);
    }

    #[test]
    fn test_bump_carve_ascending() {
        let mut page = TestPage::new(16);
        let base = page.header.as_ptr() as usize;
        for i in 0..8 {
            let ptr = unsafe { page.header().carve() };
            let offset = ptr.as_ptr() as usize - base;
            assert_eq!(offset, FIRST_OBJECT_OFFSET as usize + i * 16);
        }
    }

    #[test]
    fn test_bump_exhaustion_at_page_boundary() {
        let mut page = TestPage::new(16);
        let capacity = (PAGE_SIZE - FIRST_OBJECT_OFFSET as usize) / 16;
        let mut carved = 0;
        while !page.header().is_exhausted() {
            let ptr = unsafe { page.header().carve() };
            let offset = ptr.as_ptr() as usize - page.header.as_ptr() as usize;
            assert!(offset + 16 <= PAGE_SIZE);
            carved += 1;
        }
        // The cursor stops one slot short of the boundary when the remainder
        // cannot hold another full object.
        assert!(carved <= capacity);
        assert!(carved >= capacity - 1);
        assert_eq!(page.header().inc_off, 0);
    }

    #[test]
    fn test_free_list_lifo_recycling() {
        let mut page = TestPage::new(32);
        let a = unsafe { page.header().carve() };
        let _b = unsafe { page.header().carve() };
        let c = unsafe { page.header().carve() };

        unsafe {
            page.header().push_slot(a);
            page.header().push_slot(c);
        }

        // Exhaust the bump region so carving falls back to the free list.
        while page.header().inc_off != 0 {
            unsafe { page.header().carve() };
        }

        // Most-recently-freed first; b is still live.
        assert_eq!(unsafe { page.header().carve() }, c);
        assert_eq!(unsafe { page.header().carve() }, a);
        assert!(page.header().is_exhausted());
    }

    #[test]
    fn test_exhausted_after_bump_and_free_list_drained() {
        let mut page = TestPage::new(64);
        let first = unsafe { page.header().carve() };
        while page.header().inc_off != 0 {
            unsafe { page.header().carve() };
        }
        assert!(page.header().is_exhausted());

        unsafe { page.header().push_slot(first) };
        assert!(!page.header().is_exhausted());

        assert_eq!(unsafe { page.header().carve() }, first);
        assert!(page.header().is_exhausted());
    }
}
