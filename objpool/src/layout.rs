//! Page and block layout engine.
//!
//! A page is one contiguous host allocation:
//!
//! ```text
//! [page link][left align][header][pad][object][pad][inter align] ... [pad][object][pad]
//!             \__________ block 0 __________________/
//! ```
//!
//! Blocks repeat with a uniform stride; the inter-block alignment gap is
//! folded into the stride and the final block carries no trailing gap.

use std::mem;

use crate::config::PoolConfig;

/// Size of the page-link slot at the start of every page.
pub const PTR_SIZE: usize = mem::size_of::<*mut u8>();

/// Smallest non-negative `p` such that `offset + p` is a multiple of
/// `alignment`. Returns 0 when `alignment` is 0 or `offset` is already
/// aligned; never returns `alignment` itself.
#[inline]
pub const fn padding_for(offset: usize, alignment: usize) -> usize {
    if alignment == 0 {
        return 0;
    }

    let rem = offset % alignment;
    if rem == 0 { 0 } else { alignment - rem }
}

/// Byte offsets for one page, computed once at pool construction.
#[derive(Debug, Clone, Copy)]
pub struct PageLayout {
    /// Bytes per object.
    pub object_size: usize,
    /// Bytes per block header.
    pub header_size: usize,
    /// Guard bytes on each side of an object.
    pub pad_bytes: usize,
    /// Blocks per page.
    pub objects_per_page: usize,
    /// Filler after the page link, before the first block.
    pub left_align: usize,
    /// Filler after each non-last block.
    pub inter_align: usize,
    /// Distance between consecutive object regions.
    pub block_stride: usize,
    /// Total bytes per page.
    pub page_size: usize,
}

impl PageLayout {
    pub fn new(object_size: usize, config: &PoolConfig) -> Self {
        let header_size = config.header.size();
        let pad_bytes = config.pad_bytes;
        let objects_per_page = config.objects_per_page;

        let left_align = padding_for(PTR_SIZE + header_size + pad_bytes, config.alignment);

        let block_core = header_size + 2 * pad_bytes + object_size;
        let inter_align = padding_for(block_core, config.alignment);
        let block_stride = block_core + inter_align;

        // The final block needs no trailing alignment gap.
        let page_size = PTR_SIZE + left_align + block_stride * objects_per_page - inter_align;

        Self {
            object_size,
            header_size,
            pad_bytes,
            objects_per_page,
            left_align,
            inter_align,
            block_stride,
            page_size,
        }
    }

    /// Offset of the object region of block `index` from the page base.
    #[inline]
    pub const fn object_offset(&self, index: usize) -> usize {
        PTR_SIZE + self.left_align + self.header_size + self.pad_bytes + index * self.block_stride
    }

    /// Offset of the header of block `index` from the page base.
    #[inline]
    pub const fn header_offset(&self, index: usize) -> usize {
        self.object_offset(index) - self.pad_bytes - self.header_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HeaderKind;

    #[test]
    fn test_padding_for() {
        assert_eq!(padding_for(0, 8), 0);
        assert_eq!(padding_for(8, 8), 0);
        assert_eq!(padding_for(9, 8), 7);
        assert_eq!(padding_for(15, 8), 1);
        assert_eq!(padding_for(15, 0), 0);
        assert_eq!(padding_for(3, 4), 1);
    }

    #[test]
    fn test_layout_without_alignment() {
        let config = PoolConfig {
            objects_per_page: 4,
            pad_bytes: 2,
            header: HeaderKind::Basic,
            ..Default::default()
        };
        let layout = PageLayout::new(16, &config);

        assert_eq!(layout.left_align, 0);
        assert_eq!(layout.inter_align, 0);
        // header 5 + pads 4 + object 16
        assert_eq!(layout.block_stride, 25);
        assert_eq!(layout.page_size, PTR_SIZE + 4 * 25);
        assert_eq!(layout.object_offset(0), PTR_SIZE + 5 + 2);
        assert_eq!(layout.object_offset(1), layout.object_offset(0) + 25);
        assert_eq!(layout.header_offset(0), PTR_SIZE);
    }

    #[test]
    fn test_layout_with_alignment() {
        let config = PoolConfig {
            objects_per_page: 4,
            pad_bytes: 2,
            alignment: 8,
            header: HeaderKind::Basic,
            ..Default::default()
        };
        let layout = PageLayout::new(16, &config);

        // ptr(8) + header(5) + pad(2) = 15 -> one filler byte
        assert_eq!(layout.left_align, 1);
        // core 5 + 4 + 16 = 25 -> seven filler bytes
        assert_eq!(layout.inter_align, 7);
        assert_eq!(layout.block_stride, 32);
        assert_eq!(layout.page_size, 8 + 1 + 32 * 4 - 7);

        // Every object region starts on the alignment boundary.
        for i in 0..4 {
            assert_eq!(layout.object_offset(i) % 8, 0, "object {i} misaligned");
        }
    }

    #[test]
    fn test_single_object_page_has_no_trailing_gap() {
        let config = PoolConfig {
            objects_per_page: 1,
            alignment: 16,
            ..Default::default()
        };
        let layout = PageLayout::new(24, &config);

        assert_eq!(
            layout.page_size,
            PTR_SIZE + layout.left_align + layout.header_size + 2 * layout.pad_bytes + 24
        );
    }

    #[test]
    fn test_external_header_layout() {
        let config = PoolConfig {
            objects_per_page: 2,
            pad_bytes: 3,
            header: HeaderKind::External,
            ..Default::default()
        };
        let layout = PageLayout::new(32, &config);

        assert_eq!(layout.header_size, PTR_SIZE);
        // Only the right pad separates an object from the next block's header.
        assert_eq!(layout.header_offset(1) - layout.object_offset(0), 32 + 3);
    }
}
