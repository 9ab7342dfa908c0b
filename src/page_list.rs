//! Intrusive doubly-linked list of pages.
//!
//! The links live in the [`PageHeader`] itself, so a page can be unlinked in
//! O(1) without searching. Each size class keeps two of these lists: one for
//! pages with spare capacity and one for full pages.

use std::ptr::NonNull;

use crate::page::PageHeader;

/// An intrusive doubly-linked list of pages.
///
/// The list does not own its pages - they are owned by the allocator context
/// and backed by the page provider. The list only maintains a head pointer
/// and a length.
///
/// # Safety
///
/// Callers must ensure that:
/// - Pages are not released while linked in a list
/// - A page is linked in at most one list at a time
/// - Page pointers remain valid for the lifetime of the list
#[derive(Debug, Default)]
pub(crate) struct PageList {
    head: Option<NonNull<PageHeader>>,
    len: usize,
}

impl PageList {
    /// Creates a new empty page list.
    pub(crate) const fn new() -> Self {
        Self { head: None, len: 0 }
    }

    /// Returns the number of pages in the list.
    pub(crate) const fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the list is empty.
    pub(crate) const fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Returns the head of the list without removing it.
    pub(crate) const fn front(&self) -> Option<NonNull<PageHeader>> {
        self.head
    }

    /// Pushes a page to the front of the list.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    /// - `page` points to a valid, unlinked page header
    /// - `page` is not already in any list
    pub(crate) unsafe fn push_front(&mut self, page: NonNull<PageHeader>) {
        // SAFETY: caller guarantees page is valid and unlinked
        let page_ref = unsafe { &mut *page.as_ptr() };
        debug_assert!(
            page_ref.prev.is_none() && page_ref.next.is_none(),
            "page is already linked"
        );

        page_ref.prev = None;
        page_ref.next = self.head;

        if let Some(old_head) = self.head {
            // SAFETY: head is valid if present
            unsafe {
                (*old_head.as_ptr()).prev = Some(page);
            }
        }

        self.head = Some(page);
        self.len += 1;
    }

    /// Pops the page at the front of the list.
    ///
    /// Returns `None` if the list is empty.
    pub(crate) fn pop_front(&mut self) -> Option<NonNull<PageHeader>> {
        let head = self.head?;

        // SAFETY: head is valid if present
        unsafe {
            let head_ref = &mut *head.as_ptr();
            self.head = head_ref.next;

            if let Some(new_head) = self.head {
                (*new_head.as_ptr()).prev = None;
            }

            head_ref.prev = None;
            head_ref.next = None;
        }

        self.len -= 1;
        Some(head)
    }

    /// Removes a specific page from the list, fixing up both neighbors.
    ///
    /// O(1) because the page stores its own prev/next links.
    ///
    /// # Safety
    ///
    /// The caller must ensure `page` points to a valid page header that is
    /// currently in this list.
    pub(crate) unsafe fn remove(&mut self, page: NonNull<PageHeader>) {
        // SAFETY: caller guarantees page is valid and in this list
        let page_ref = unsafe { &mut *page.as_ptr() };

        match (page_ref.prev, page_ref.next) {
            (Some(prev), Some(next)) => {
                // SAFETY: neighbors are valid if present
                unsafe {
                    (*prev.as_ptr()).next = Some(next);
                    (*next.as_ptr()).prev = Some(prev);
                }
            }
            (None, Some(next)) => {
                debug_assert_eq!(self.head, Some(page));
                // SAFETY: next is valid if present
                unsafe {
                    (*next.as_ptr()).prev = None;
                }
                self.head = Some(next);
            }
            (Some(prev), None) => {
                // SAFETY: prev is valid if present
                unsafe {
                    (*prev.as_ptr()).next = None;
                }
            }
            (None, None) => {
                debug_assert_eq!(self.head, Some(page));
                self.head = None;
            }
        }

        page_ref.prev = None;
        page_ref.next = None;
        self.len -= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_page(size: u16) -> PageHeader {
        PageHeader {
            next: None,
            prev: None,
            inc_off: 0,
            free_off: 0,
            top_index: 0,
            sub_index: 0,
            size,
        }
    }

    #[test]
    fn test_empty_list() {
        let list = PageList::new();
        assert!(list.is_empty());
        assert_eq!(list.len(), 0);
        assert!(list.front().is_none());
    }

    #[test]
    fn test_push_pop_single() {
        let mut list = PageList::new();
        let mut page = dummy_page(16);
        let ptr = NonNull::new(&raw mut page).unwrap();

        unsafe { list.push_front(ptr) };
        assert_eq!(list.len(), 1);
        assert_eq!(list.front(), Some(ptr));

        assert_eq!(list.pop_front(), Some(ptr));
        assert!(list.is_empty());
        assert!(page.next.is_none());
        assert!(page.prev.is_none());
    }

    #[test]
    fn test_push_pop_lifo() {
        let mut list = PageList::new();
        let mut pages = [dummy_page(16), dummy_page(32), dummy_page(48)];
        let ptrs: Vec<_> = pages
            .iter_mut()
            .map(|p| NonNull::new(std::ptr::from_mut(p)).unwrap())
            .collect();

        unsafe {
            list.push_front(ptrs[0]);
            list.push_front(ptrs[1]);
            list.push_front(ptrs[2]);
        }

        assert_eq!(list.len(), 3);
        assert_eq!(list.pop_front(), Some(ptrs[2]));
        assert_eq!(list.pop_front(), Some(ptrs[1]));
        assert_eq!(list.pop_front(), Some(ptrs[0]));
        assert!(list.is_empty());
    }

    #[test]
    fn test_remove_middle_fixes_both_neighbors() {
        let mut list = PageList::new();
        let mut pages = [dummy_page(16), dummy_page(16), dummy_page(16)];
        let ptrs: Vec<_> = pages
            .iter_mut()
            .map(|p| NonNull::new(std::ptr::from_mut(p)).unwrap())
            .collect();

        unsafe {
            list.push_front(ptrs[0]);
            list.push_front(ptrs[1]);
            list.push_front(ptrs[2]);

            list.remove(ptrs[1]);
        }

        assert_eq!(list.len(), 2);
        assert!(pages[1].next.is_none());
        assert!(pages[1].prev.is_none());
        // Remaining order: 2 -> 0
        assert_eq!(list.pop_front(), Some(ptrs[2]));
        assert_eq!(list.pop_front(), Some(ptrs[0]));
    }

    #[test]
    fn test_remove_head() {
        let mut list = PageList::new();
        let mut pages = [dummy_page(16), dummy_page(16)];
        let ptr0 = NonNull::new(&raw mut pages[0]).unwrap();
        let ptr1 = NonNull::new(&raw mut pages[1]).unwrap();

        unsafe {
            list.push_front(ptr0);
            list.push_front(ptr1);
            list.remove(ptr1);
        }

        assert_eq!(list.len(), 1);
        assert_eq!(list.front(), Some(ptr0));
        assert!(pages[0].prev.is_none());
    }

    #[test]
    fn test_remove_tail() {
        let mut list = PageList::new();
        let mut pages = [dummy_page(16), dummy_page(16)];
        let ptr0 = NonNull::new(&raw mut pages[0]).unwrap();
        let ptr1 = NonNull::new(&raw mut pages[1]).unwrap();

        unsafe {
            list.push_front(ptr0);
            list.push_front(ptr1);
            list.remove(ptr0);
        }

        assert_eq!(list.len(), 1);
        assert_eq!(list.pop_front(), Some(ptr1));
        assert!(list.is_empty());
    }

    #[test]
    fn test_remove_only_element() {
        let mut list = PageList::new();
        let mut page = dummy_page(16);
        let ptr = NonNull::new(&raw mut page).unwrap();

        unsafe {
            list.push_front(ptr);
            list.remove(ptr);
        }

        assert!(list.is_empty());
        assert!(list.front().is_none());
    }
}
