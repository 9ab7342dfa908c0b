//! # bibop-pool
//!
//! A small-object allocator built on the "Big Bag of Pages" (BiBoP)
//! technique: fixed-size 4096-byte pages are each dedicated to exactly one
//! object size class, eliminating per-object header overhead and giving
//! deterministic, O(1) allocation and deallocation.
//!
//! ## Features
//!
//! - **Size-Class Pages**: request sizes are rounded to pre-computed
//!   canonical sizes and served from pages shared by the whole class
//! - **Bump-then-Recycle Carving**: fresh pages hand out slots in address
//!   order; freed slots are recycled most-recently-freed first
//! - **O(1) Ownership Check**: a two-level table answers whether a page
//!   belongs to a given context, for defensive callers
//! - **Pluggable Page Providers**: pages can come from the heap (default),
//!   an mmap region, or a static arena via the [`PageProvider`] trait
//! - **Explicit Contexts**: no global state; independent contexts coexist
//!
//! The crate is single-threaded by design. Every operation is synchronous
//! and non-blocking; concurrent callers must supply external mutual
//! exclusion.
//!
//! ## Example
//!
//! ```rust
//! use bibop_pool::BibopBuilder;
//!
//! # fn main() -> std::io::Result<()> {
//! // Objects up to 63 bytes, canonical sizes in 16-byte steps.
//! let mut pool = BibopBuilder::new().max_size(64).build();
//!
//! // Served from the 32-byte class; at least 24 bytes are usable.
//! let ptr = pool.allocate(24)?;
//! assert!(pool.canonical_size(24) == Some(32));
//!
//! // SAFETY: ptr came from this context and is not used afterwards.
//! unsafe { pool.deallocate(ptr) };
//! # Ok(())
//! # }
//! ```
//!
//! Requests of `max_size` bytes or more fail with
//! [`std::io::ErrorKind::InvalidInput`]; a context whose provider and
//! ownership table are both exhausted fails with
//! [`std::io::ErrorKind::OutOfMemory`]. Both are ordinary errors and the
//! caller may retry after freeing objects.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(unsafe_op_in_unsafe_fn)]

mod context;
mod page;
mod page_list;
mod provider;

pub use context::{Bibop, BibopBuilder};
pub use page::{FIRST_OBJECT_OFFSET, PAGE_MASK, PAGE_SIZE, PageHeader};
pub use provider::{HeapPageProvider, PageProvider};
