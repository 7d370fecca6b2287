//! Allocator core: owns the page list and the free list, implements
//! allocate/free with double-free, boundary and corruption validation, and
//! empty-page reclamation.

use std::alloc::{self, Layout};
use std::ptr;
use std::slice;

use log::{debug, warn};

use crate::config::{ALLOCATED_PATTERN, FREED_PATTERN, HeaderKind, PoolConfig};
use crate::error::PoolError;
use crate::header;
use crate::layout::{PTR_SIZE, PageLayout};
use crate::stats::PoolStats;

mod page;

use page::Page;

/// Next pointer stored in the object region of a free block. Object regions
/// are not guaranteed pointer-aligned, so access is always unaligned.
#[inline]
unsafe fn read_next(block: *const u8) -> *mut u8 {
    unsafe { (block as *const *mut u8).read_unaligned() }
}

#[inline]
unsafe fn write_next(block: *mut u8, next: *mut u8) {
    unsafe { (block as *mut *mut u8).write_unaligned(next) };
}

/// Fixed-size object allocator.
///
/// Pre-carves pages into same-sized blocks and serves them off an intrusive
/// free list with LIFO discipline. Every `free` validates the pointer
/// against the free list (double free), the page boundaries and the pad
/// guard bytes before accepting it back.
///
/// Not thread-safe; callers needing concurrency must serialize access
/// externally.
pub struct ObjectPool {
    /// Owned pages, oldest first; the last entry is the head of the
    /// intrusive page list threaded through the page-link slots.
    pages: Vec<Page>,
    /// Head of the intrusive free list, most recently freed block first.
    free_list: *mut u8,
    layout: PageLayout,
    config: PoolConfig,
    stats: PoolStats,
}

impl ObjectPool {
    /// Create a pool serving blocks of exactly `object_size` bytes.
    ///
    /// Outside bypass mode the first page is built eagerly, so an
    /// out-of-memory condition surfaces here rather than on first use.
    ///
    /// # Panics
    ///
    /// Panics if the configuration is invalid or if `object_size` cannot
    /// hold a free-list node (smaller than a pointer) outside bypass mode.
    pub fn new(object_size: usize, config: PoolConfig) -> Result<Self, PoolError> {
        config.validate();
        if !config.bypass {
            assert!(
                object_size >= PTR_SIZE,
                "object_size must be at least {PTR_SIZE} bytes to hold a free-list node"
            );
        }

        let layout = PageLayout::new(object_size, &config);

        let mut pool = Self {
            pages: Vec::new(),
            free_list: ptr::null_mut(),
            layout,
            config,
            stats: PoolStats {
                object_size,
                page_size: layout.page_size,
                ..Default::default()
            },
        };

        if !pool.config.bypass {
            pool.build_page()?;
        }

        Ok(pool)
    }

    /// Hand out one block of exactly `object_size` usable bytes.
    pub fn allocate(&mut self) -> Result<*mut u8, PoolError> {
        self.allocate_with_label(None)
    }

    /// Like [`allocate`](Self::allocate), recording `label` in the block's
    /// side record when the pool uses [`HeaderKind::External`].
    pub fn allocate_with_label(&mut self, label: Option<&str>) -> Result<*mut u8, PoolError> {
        if self.config.bypass {
            let object = unsafe { alloc::alloc(self.bypass_layout()) };
            if object.is_null() {
                return Err(PoolError::OutOfMemory);
            }

            self.stats.allocations += 1;
            self.stats.objects_in_use += 1;
            self.stats.most_objects = self.stats.most_objects.max(self.stats.objects_in_use);

            return Ok(object);
        }

        if self.free_list.is_null() {
            if self.config.max_pages > 0 && self.stats.pages_in_use >= self.config.max_pages {
                return Err(PoolError::PageLimitReached);
            }

            self.build_page()?;
        }

        let object = self.free_list;
        self.free_list = unsafe { read_next(object) };

        // Overwrite the unallocated stamp so corruption checks only ever
        // rely on the pad bytes.
        unsafe { ptr::write_bytes(object, ALLOCATED_PATTERN, self.layout.object_size) };

        self.stats.allocations += 1;
        self.stats.objects_in_use += 1;
        self.stats.free_objects -= 1;
        self.stats.most_objects = self.stats.most_objects.max(self.stats.objects_in_use);

        let alloc_num = self.stats.allocations as u32;
        if self.config.header != HeaderKind::None {
            header::write(
                self.config.header,
                self.header_slice_mut(object),
                alloc_num,
                label,
            );
        }

        Ok(object)
    }

    /// Return a block to the pool. A null pointer is a no-op.
    ///
    /// The pointer is validated in order: already on the free list
    /// ([`PoolError::DoubleFree`]), outside every owned page
    /// ([`PoolError::BadBoundary`]), pad guard bytes damaged
    /// ([`PoolError::CorruptedBlock`]). A rejected block keeps its lifecycle
    /// state so the caller can run diagnostics on it.
    ///
    /// In bypass mode no validation is possible; the pointer must have come
    /// from [`allocate`](Self::allocate) on this pool.
    pub fn free(&mut self, object: *mut u8) -> Result<(), PoolError> {
        if object.is_null() {
            return Ok(());
        }

        if self.config.bypass {
            unsafe { alloc::dealloc(object, self.bypass_layout()) };

            self.stats.deallocations += 1;
            self.stats.objects_in_use -= 1;

            return Ok(());
        }

        if self.on_free_list(object) {
            warn!("rejected free of {:p}: {}", object, PoolError::DoubleFree);
            return Err(PoolError::DoubleFree);
        }

        if !self.pages.iter().any(|page| page.contains(object)) {
            warn!("rejected free of {:p}: {}", object, PoolError::BadBoundary);
            return Err(PoolError::BadBoundary);
        }

        if self.pads_corrupted(object) {
            warn!(
                "rejected free of {:p}: {}",
                object,
                PoolError::CorruptedBlock
            );
            return Err(PoolError::CorruptedBlock);
        }

        unsafe {
            ptr::write_bytes(object, FREED_PATTERN, self.layout.object_size);
            write_next(object, self.free_list);
        }
        self.free_list = object;

        if self.config.header != HeaderKind::None {
            header::clear(self.config.header, self.header_slice_mut(object));
        }

        self.stats.deallocations += 1;
        self.stats.free_objects += 1;
        self.stats.objects_in_use -= 1;

        Ok(())
    }

    /// Release every page whose blocks are all free. Returns the number of
    /// pages released; pages with even a single in-use block are untouched.
    pub fn free_empty_pages(&mut self) -> usize {
        let mut freed = 0;
        let mut index = 0;

        while index < self.pages.len() {
            if self.page_is_empty(&self.pages[index]) {
                // Unlink the page's blocks before the storage goes away.
                let base = self.pages[index].base();
                self.unlink_free_blocks_in(base);

                let page = self.pages.remove(index);
                debug!("reclaimed empty page at {:p}", page.base());
                drop(page);

                self.stats.pages_in_use -= 1;
                self.stats.free_objects -= self.config.objects_per_page;
                freed += 1;
            } else {
                index += 1;
            }
        }

        if freed > 0 {
            self.relink_pages();
        }

        freed
    }

    /// Invoke `callback(block, object_size)` for every block currently in
    /// use, newest page first. Returns the number of blocks visited.
    pub fn dump_memory_in_use<F>(&self, mut callback: F) -> usize
    where
        F: FnMut(*const u8, usize),
    {
        let mut count = 0;

        self.walk_blocks(|object| {
            if !self.on_free_list(object) {
                count += 1;
                callback(object, self.layout.object_size);
            }
        });

        count
    }

    /// Invoke `callback(block, object_size)` for every block whose pad guard
    /// bytes are damaged. Returns the number of corrupted blocks found.
    pub fn validate_pages<F>(&self, mut callback: F) -> usize
    where
        F: FnMut(*const u8, usize),
    {
        let mut corrupted = 0;

        self.walk_blocks(|object| {
            if self.pads_corrupted(object) {
                corrupted += 1;
                callback(object, self.layout.object_size);
            }
        });

        corrupted
    }

    /// Copy of the current counters.
    #[inline]
    pub fn stats(&self) -> PoolStats {
        self.stats
    }

    /// Copy of the configuration.
    #[inline]
    pub fn config(&self) -> PoolConfig {
        self.config
    }

    /// Read-only head of the free list; null when no block is free.
    #[inline]
    pub fn free_list(&self) -> *const u8 {
        self.free_list
    }

    /// Read-only head of the page list, newest page first; null in bypass
    /// mode or after every page was reclaimed.
    #[inline]
    pub fn page_list(&self) -> *const u8 {
        self.pages
            .last()
            .map_or(ptr::null(), |page| page.base() as *const u8)
    }

    /// Toggle the client-side debug gate. The pool's own validation is
    /// always active.
    #[inline]
    pub fn set_debug_state(&mut self, state: bool) {
        self.config.debug_on = state;
    }

    fn build_page(&mut self) -> Result<(), PoolError> {
        let prev_head = self.page_list() as *mut u8;

        let mut free_head = self.free_list;
        let page = Page::build(&self.layout, &self.config, prev_head, &mut free_head)?;

        self.free_list = free_head;
        self.pages.push(page);
        self.stats.pages_in_use += 1;
        self.stats.free_objects += self.config.objects_per_page;

        Ok(())
    }

    fn bypass_layout(&self) -> Layout {
        Layout::from_size_align(
            self.layout.object_size.max(1),
            self.config.alignment.max(1),
        )
        .expect("invalid object layout")
    }

    /// Linear scan of the free list; compares addresses only.
    fn on_free_list(&self, object: *const u8) -> bool {
        let mut current = self.free_list as *const u8;

        while !current.is_null() {
            if current == object {
                return true;
            }
            current = unsafe { read_next(current) };
        }

        false
    }

    /// Are the guard bytes on either side of `object` intact?
    fn pads_corrupted(&self, object: *const u8) -> bool {
        if self.layout.pad_bytes == 0 {
            return false;
        }

        let (left, right) = unsafe {
            (
                slice::from_raw_parts(object.sub(self.layout.pad_bytes), self.layout.pad_bytes),
                slice::from_raw_parts(
                    object.add(self.layout.object_size),
                    self.layout.pad_bytes,
                ),
            )
        };

        let damaged = |byte: &u8| *byte != crate::config::PAD_PATTERN;
        left.iter().any(damaged) || right.iter().any(damaged)
    }

    fn page_is_empty(&self, page: &Page) -> bool {
        (0..self.layout.objects_per_page).all(|i| {
            let object = unsafe { page.base().add(self.layout.object_offset(i)) };
            self.on_free_list(object)
        })
    }

    /// Drop every free-list entry pointing into the page at `base`,
    /// preserving the order of the survivors.
    fn unlink_free_blocks_in(&mut self, base: *mut u8) {
        let start = base as usize;
        let end = start + self.layout.page_size;

        let mut head: *mut u8 = ptr::null_mut();
        let mut tail: *mut u8 = ptr::null_mut();
        let mut current = self.free_list;

        while !current.is_null() {
            let next = unsafe { read_next(current) };
            let addr = current as usize;

            if !(start..end).contains(&addr) {
                if head.is_null() {
                    head = current;
                } else {
                    unsafe { write_next(tail, current) };
                }
                tail = current;
            }

            current = next;
        }

        if !tail.is_null() {
            unsafe { write_next(tail, ptr::null_mut()) };
        }
        self.free_list = head;
    }

    /// Rewrite every page-link slot so the intrusive page list matches the
    /// surviving pages, newest first.
    fn relink_pages(&mut self) {
        let mut prev: *mut u8 = ptr::null_mut();

        for page in &self.pages {
            page.set_link(prev);
            prev = page.base();
        }
    }

    /// Visit every block's object region, newest page first, in block order.
    fn walk_blocks<F>(&self, mut visit: F)
    where
        F: FnMut(*const u8),
    {
        for page in self.pages.iter().rev() {
            for i in 0..self.layout.objects_per_page {
                visit(unsafe { page.base().add(self.layout.object_offset(i)) });
            }
        }
    }

    fn header_slice_mut(&mut self, object: *mut u8) -> &mut [u8] {
        let size = self.layout.header_size;
        unsafe {
            slice::from_raw_parts_mut(object.sub(self.layout.pad_bytes + size), size)
        }
    }
}

impl Drop for ObjectPool {
    fn drop(&mut self) {
        // Best effort: side records of blocks never freed would otherwise
        // leak. Freed blocks already had theirs detached.
        if self.config.header == HeaderKind::External {
            for page in &self.pages {
                for i in 0..self.layout.objects_per_page {
                    let bytes = unsafe {
                        slice::from_raw_parts_mut(
                            page.base().add(self.layout.header_offset(i)),
                            self.layout.header_size,
                        )
                    };
                    header::take_external(bytes);
                }
            }
        }
        // Page storage is released by each Page's Drop.
    }
}
