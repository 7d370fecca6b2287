use std::alloc::{self, Layout};
use std::mem;
use std::ptr;

use log::debug;

use crate::config::{ALIGN_PATTERN, PAD_PATTERN, PoolConfig, UNALLOCATED_PATTERN};
use crate::error::PoolError;
use crate::layout::{PTR_SIZE, PageLayout};

/// One contiguous host allocation subdivided into same-sized blocks. The
/// page owns its storage and releases it on drop; block bookkeeping lives in
/// the pool that built it.
pub(crate) struct Page {
    ptr: *mut u8,
    layout: Layout,
}

impl Page {
    /// Allocate and build one page: write the page-link pointer, stamp the
    /// alignment filler and pad guards, stamp every object region with the
    /// unallocated pattern and thread it onto `free_head`.
    ///
    /// On failure the free list is untouched and no storage is retained.
    pub(crate) fn build(
        page: &PageLayout,
        config: &PoolConfig,
        prev_page: *mut u8,
        free_head: &mut *mut u8,
    ) -> Result<Page, PoolError> {
        let align = mem::align_of::<*mut u8>().max(config.alignment.max(1));
        let layout = Layout::from_size_align(page.page_size, align).expect("invalid page layout");

        let ptr = unsafe { alloc::alloc_zeroed(layout) };
        if ptr.is_null() {
            return Err(PoolError::OutOfMemory);
        }

        unsafe {
            // Page link; the page base is pointer-aligned by construction.
            (ptr as *mut *mut u8).write(prev_page);

            let mut cursor = ptr.add(PTR_SIZE);

            if page.left_align > 0 {
                ptr::write_bytes(cursor, ALIGN_PATTERN, page.left_align);
                cursor = cursor.add(page.left_align);
            }

            for i in 0..page.objects_per_page {
                // Header content is populated lazily at allocation time.
                cursor = cursor.add(page.header_size);

                if page.pad_bytes > 0 {
                    ptr::write_bytes(cursor, PAD_PATTERN, page.pad_bytes);
                    cursor = cursor.add(page.pad_bytes);
                }

                ptr::write_bytes(cursor, UNALLOCATED_PATTERN, page.object_size);

                // The object region doubles as the free-list node.
                (cursor as *mut *mut u8).write_unaligned(*free_head);
                *free_head = cursor;
                cursor = cursor.add(page.object_size);

                if page.pad_bytes > 0 {
                    ptr::write_bytes(cursor, PAD_PATTERN, page.pad_bytes);
                    cursor = cursor.add(page.pad_bytes);
                }

                if page.inter_align > 0 && i + 1 < page.objects_per_page {
                    ptr::write_bytes(cursor, ALIGN_PATTERN, page.inter_align);
                    cursor = cursor.add(page.inter_align);
                }
            }

            debug_assert!(
                cursor as usize <= ptr as usize + page.page_size,
                "page build overran the allocation"
            );
        }

        debug!(
            "built page at {:p}: {} objects of {} bytes, {} bytes total",
            ptr, page.objects_per_page, page.object_size, page.page_size
        );

        Ok(Page { ptr, layout })
    }

    #[inline]
    pub(crate) fn base(&self) -> *mut u8 {
        self.ptr
    }

    /// Does `ptr` fall within `[base, base + page_size)`?
    #[inline]
    pub(crate) fn contains(&self, ptr: *const u8) -> bool {
        let addr = ptr as usize;
        let base = self.ptr as usize;

        addr >= base && addr < base + self.layout.size()
    }

    /// Rewrite the page-link pointer, used when neighbouring pages are
    /// reclaimed.
    #[inline]
    pub(crate) fn set_link(&self, prev_page: *mut u8) {
        unsafe { (self.ptr as *mut *mut u8).write(prev_page) };
    }
}

impl Drop for Page {
    fn drop(&mut self) {
        unsafe { alloc::dealloc(self.ptr, self.layout) };
    }
}
