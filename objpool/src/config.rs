//! Pool configuration: immutable-after-construction parameters describing
//! padding, alignment, header style and page limits.

use std::mem;

/// Stamped across an object region when its page is built, before the block
/// is ever handed out.
pub const UNALLOCATED_PATTERN: u8 = 0xAA;

/// Stamped across an object region when the block is handed to a client.
pub const ALLOCATED_PATTERN: u8 = 0xBB;

/// Stamped across an object region when the block is returned to the pool.
pub const FREED_PATTERN: u8 = 0xCC;

/// Guard byte flanking every object; any deviation signals corruption.
pub const PAD_PATTERN: u8 = 0xDD;

/// Filler for left- and inter-block alignment regions.
pub const ALIGN_PATTERN: u8 = 0xEE;

pub const DEFAULT_OBJECTS_PER_PAGE: usize = 4;

/// Per-block metadata variant. The associated size is the number of bytes
/// the header occupies in front of each block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeaderKind {
    /// No per-block metadata.
    #[default]
    None,
    /// Allocation number (u32) plus an in-use flag byte.
    Basic,
    /// Caller-sized opaque prefix, a use counter (u16) that survives frees,
    /// then the basic fields.
    Extended { additional: usize },
    /// One pointer to a heap side record carrying an optional debug label.
    External,
}

impl HeaderKind {
    /// Header size in bytes for this variant.
    #[inline]
    pub const fn size(&self) -> usize {
        // alloc number u32, use counter u16, in-use flag one byte
        match *self {
            HeaderKind::None => 0,
            HeaderKind::Basic => mem::size_of::<u32>() + 1,
            HeaderKind::Extended { additional } => {
                additional + mem::size_of::<u16>() + mem::size_of::<u32>() + 1
            }
            HeaderKind::External => mem::size_of::<*mut u8>(),
        }
    }
}

/// Configuration of an [`ObjectPool`](crate::ObjectPool). Fixed once the
/// pool is constructed; only `debug_on` can be toggled afterwards.
#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    /// Forward every allocate/free 1:1 to the host allocator, with no pages,
    /// free list or debug features.
    pub bypass: bool,
    /// Blocks carved out of each page.
    pub objects_per_page: usize,
    /// Page cap; 0 means unlimited.
    pub max_pages: usize,
    /// Guard bytes placed on both sides of every object.
    pub pad_bytes: usize,
    /// 0 disables alignment; otherwise a power of two that every object's
    /// first byte is a multiple of.
    pub alignment: usize,
    /// Per-block metadata variant.
    pub header: HeaderKind,
    /// Gates optional diagnostic call sites on the client side; every check
    /// the pool performs itself is always active.
    pub debug_on: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            bypass: false,
            objects_per_page: DEFAULT_OBJECTS_PER_PAGE,
            max_pages: 0,
            pad_bytes: 0,
            alignment: 0,
            header: HeaderKind::None,
            debug_on: false,
        }
    }
}

impl PoolConfig {
    /// Panics on parameters the pool cannot represent.
    pub(crate) fn validate(&self) {
        assert!(
            self.objects_per_page > 0,
            "objects_per_page must be greater than 0"
        );
        assert!(
            self.alignment == 0 || self.alignment.is_power_of_two(),
            "alignment must be 0 or a power of two, got {}",
            self.alignment
        );
    }
}
