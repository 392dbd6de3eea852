//! Bump allocator that owns the transient bytes of one unpack operation.
//!
//! Entry bytes are copied out of the archive source into a [`DecodeArena`]
//! before decoding, so decoded descriptors (whose strings alias those bytes)
//! are self-contained and can outlive the source buffer. Nothing is freed
//! individually; the whole arena is released when it is dropped at the end
//! of the unpack.
//!
//! The arena is deliberately `!Sync`: it belongs to a single unpack call on
//! a single thread. Cross-thread state in the archive lives elsewhere (the
//! directories and the shader cache).

use std::cell::RefCell;

use crate::format::DATA_PTR_ALIGN;

const DEFAULT_PAGE_SIZE: usize = 4 * 1024;

#[inline]
fn align_up(len: usize) -> usize {
    (len + DATA_PTR_ALIGN - 1) & !(DATA_PTR_ALIGN - 1)
}

/// One page of arena storage. Backed by `u64` words so every allocation
/// start is 8-aligned; the word boxes never move once created.
struct Page {
    storage: Box<[u64]>,
    used: usize,
}

impl Page {
    fn new(min_bytes: usize) -> Self {
        let bytes = min_bytes.max(DEFAULT_PAGE_SIZE);
        let words = (bytes + DATA_PTR_ALIGN - 1) / DATA_PTR_ALIGN;
        Self {
            storage: vec![0u64; words].into_boxed_slice(),
            used: 0,
        }
    }

    fn capacity(&self) -> usize {
        self.storage.len() * DATA_PTR_ALIGN
    }
}

/// Page-list bump allocator for decoded strings and entry data.
pub struct DecodeArena {
    pages: RefCell<Vec<Page>>,
}

impl std::fmt::Debug for DecodeArena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let pages = self.pages.borrow();
        f.debug_struct("DecodeArena")
            .field("pages", &pages.len())
            .field("used", &pages.iter().map(|p| p.used).sum::<usize>())
            .finish()
    }
}

impl Default for DecodeArena {
    fn default() -> Self {
        Self::new()
    }
}

impl DecodeArena {
    /// Creates an empty arena. No pages are allocated until the first copy.
    pub fn new() -> Self {
        Self {
            pages: RefCell::new(Vec::new()),
        }
    }

    /// Reserves `len` bytes at an 8-aligned offset and returns a pointer to
    /// the start of the reservation.
    fn alloc_raw(&self, len: usize) -> *mut u8 {
        let mut pages = self.pages.borrow_mut();
        let aligned_len = align_up(len);

        let needs_page = match pages.last() {
            Some(page) => page.capacity() - page.used < aligned_len,
            None => true,
        };
        if needs_page {
            pages.push(Page::new(aligned_len));
        }

        // The cursor only ever advances in 8-byte steps, so `used` is always
        // aligned and reservations never overlap.
        let page = pages.last_mut().expect("page list cannot be empty here");
        let offset = page.used;
        page.used += aligned_len;

        // SAFETY: offset + len fits in the page, checked above.
        #[allow(unsafe_code)]
        let ptr = unsafe { (page.storage.as_mut_ptr() as *mut u8).add(offset) };
        ptr
    }

    /// Copies `src` into the arena and returns a slice that lives as long
    /// as the arena itself.
    pub fn copy_bytes<'arena>(&'arena self, src: &[u8]) -> &'arena [u8] {
        if src.is_empty() {
            return &[];
        }
        let dst = self.alloc_raw(src.len());

        // SAFETY: `dst` addresses `src.len()` reserved bytes inside a boxed
        // page. Pages are only ever appended to the list, box storage never
        // moves, reservations never overlap, and the region is not written
        // again after this copy, so handing out a shared slice tied to the
        // arena's lifetime is sound.
        #[allow(unsafe_code)]
        let copied = unsafe {
            std::ptr::copy_nonoverlapping(src.as_ptr(), dst, src.len());
            std::slice::from_raw_parts(dst, src.len())
        };
        copied
    }

    /// Copies `s` into the arena and returns an arena-owned `&str`.
    pub fn alloc_str<'arena>(&'arena self, s: &str) -> &'arena str {
        let bytes = self.copy_bytes(s.as_bytes());

        // SAFETY: the bytes are a verbatim copy of a valid `&str`.
        #[allow(unsafe_code)]
        let copied = unsafe { std::str::from_utf8_unchecked(bytes) };
        copied
    }

    /// Total bytes reserved, including alignment padding.
    pub fn allocated_bytes(&self) -> usize {
        self.pages.borrow().iter().map(|p| p.used).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copies_are_aligned_and_stable() {
        let arena = DecodeArena::new();
        let a = arena.copy_bytes(&[1, 2, 3]);
        let b = arena.copy_bytes(&[4, 5, 6, 7, 8, 9, 10, 11, 12]);

        assert_eq!(a.as_ptr() as usize % DATA_PTR_ALIGN, 0);
        assert_eq!(b.as_ptr() as usize % DATA_PTR_ALIGN, 0);
        assert_eq!(a, &[1, 2, 3]);
        assert_eq!(b, &[4, 5, 6, 7, 8, 9, 10, 11, 12]);
    }

    #[test]
    fn survives_page_overflow() {
        let arena = DecodeArena::new();
        let mut slices = Vec::new();
        let payload: Vec<u8> = (0..=255).collect();
        // Well past the default page size.
        for _ in 0..64 {
            slices.push(arena.copy_bytes(&payload));
        }
        for s in &slices {
            assert_eq!(*s, payload.as_slice());
        }
        assert!(arena.allocated_bytes() >= 64 * payload.len());
    }

    #[test]
    fn strings_round_trip() {
        let arena = DecodeArena::new();
        let s = arena.alloc_str("PointLightPass");
        assert_eq!(s, "PointLightPass");
        let empty = arena.alloc_str("");
        assert_eq!(empty, "");
    }
}
