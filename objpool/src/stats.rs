use std::fmt;

use humanize_bytes::humanize_bytes_decimal;

/// Counters mutated by every allocation-affecting operation. Purely
/// observational; outside bypass mode the pool maintains
/// `objects_in_use + free_objects == pages_in_use * objects_per_page`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Bytes per object, fixed for the pool's lifetime.
    pub object_size: usize,
    /// Total bytes per page, computed once at construction.
    pub page_size: usize,
    /// Blocks currently handed to clients.
    pub objects_in_use: usize,
    /// Blocks on the free list.
    pub free_objects: usize,
    /// Pages currently owned by the pool.
    pub pages_in_use: usize,
    /// Allocation sequence number; monotonically increasing, never reused.
    pub allocations: usize,
    /// Completed frees.
    pub deallocations: usize,
    /// High-water mark of concurrently in-use objects.
    pub most_objects: usize,
}

impl fmt::Display for PoolStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} in use, {} free, {} pages of {} ({} objects), peak {}, {} allocs / {} frees",
            self.objects_in_use,
            self.free_objects,
            self.pages_in_use,
            humanize_bytes_decimal!(self.page_size),
            humanize_bytes_decimal!(self.object_size),
            self.most_objects,
            self.allocations,
            self.deallocations,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_mentions_every_counter() {
        let stats = PoolStats {
            object_size: 32,
            page_size: 1024,
            objects_in_use: 3,
            free_objects: 5,
            pages_in_use: 2,
            allocations: 7,
            deallocations: 4,
            most_objects: 6,
        };

        let rendered = stats.to_string();
        assert!(rendered.contains("3 in use"));
        assert!(rendered.contains("5 free"));
        assert!(rendered.contains("2 pages"));
        assert!(rendered.contains("peak 6"));
        assert!(rendered.contains("7 allocs / 4 frees"));
    }
}
