use std::error::Error;
use std::fmt;

/// Failure modes of the pool. Every check is performed eagerly at the point
/// of violation; a failed allocation or free leaves the pool unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolError {
    /// The host allocator could not supply storage for a new page.
    OutOfMemory,
    /// The free list is empty and the configured page cap is already reached.
    PageLimitReached,
    /// The pointer passed to `free` is already on the free list.
    DoubleFree,
    /// The pointer passed to `free` does not fall inside any owned page.
    BadBoundary,
    /// The pad bytes flanking the object no longer hold the guard pattern.
    CorruptedBlock,
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            PoolError::OutOfMemory => "no system memory available",
            PoolError::PageLimitReached => "maximum pages limit reached",
            PoolError::DoubleFree => "object has already been freed",
            PoolError::BadBoundary => "object is outside every page owned by this pool",
            PoolError::CorruptedBlock => "pad bytes around the object are corrupted",
        };

        f.write_str(msg)
    }
}

impl Error for PoolError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_are_distinct() {
        let errors = [
            PoolError::OutOfMemory,
            PoolError::PageLimitReached,
            PoolError::DoubleFree,
            PoolError::BadBoundary,
            PoolError::CorruptedBlock,
        ];

        for (i, a) in errors.iter().enumerate() {
            for b in errors.iter().skip(i + 1) {
                assert_ne!(a.to_string(), b.to_string());
            }
        }
    }
}
