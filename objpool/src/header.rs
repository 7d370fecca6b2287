//! Per-block metadata codec.
//!
//! Headers live in the bytes directly in front of each block and use a fixed
//! little-endian byte schema, so the layout is identical on every target:
//!
//! - Basic:    `[alloc_num: u32 LE][in_use: u8]`
//! - Extended: `[caller bytes][use_count: u16 LE][alloc_num: u32 LE][in_use: u8]`
//! - External: one native pointer to a heap [`ExternalHeader`] side record.
//!
//! The use counter of an Extended header increments on every allocation of
//! the block and is never reset. External side records are owned by the pool
//! and dropped when the block is freed.

use byteorder::{ByteOrder, LittleEndian};

use crate::config::HeaderKind;
use crate::layout::PTR_SIZE;

/// Heap side record referenced by an External header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalHeader {
    pub in_use: bool,
    pub alloc_num: u32,
    pub label: Option<String>,
}

/// Populate the header of a freshly allocated block. `header` must be
/// exactly `kind.size()` bytes.
pub(crate) fn write(kind: HeaderKind, header: &mut [u8], alloc_num: u32, label: Option<&str>) {
    debug_assert_eq!(header.len(), kind.size(), "header slice size mismatch");

    match kind {
        HeaderKind::None => {}
        HeaderKind::Basic => {
            LittleEndian::write_u32(&mut header[0..4], alloc_num);
            header[4] = 1;
        }
        HeaderKind::Extended { additional } => {
            // Caller bytes in [0, additional) stay untouched.
            let base = additional;
            let count = LittleEndian::read_u16(&header[base..base + 2]);
            LittleEndian::write_u16(&mut header[base..base + 2], count.wrapping_add(1));
            LittleEndian::write_u32(&mut header[base + 2..base + 6], alloc_num);
            header[base + 6] = 1;
        }
        HeaderKind::External => {
            let record = Box::new(ExternalHeader {
                in_use: true,
                alloc_num,
                label: label.map(str::to_owned),
            });

            let addr = Box::into_raw(record) as usize;
            header[..PTR_SIZE].copy_from_slice(&addr.to_ne_bytes());
        }
    }
}

/// Reset the header of a block being freed. The Extended use counter
/// survives; an External side record is dropped.
pub(crate) fn clear(kind: HeaderKind, header: &mut [u8]) {
    debug_assert_eq!(header.len(), kind.size(), "header slice size mismatch");

    match kind {
        HeaderKind::None => {}
        HeaderKind::Basic => {
            LittleEndian::write_u32(&mut header[0..4], 0);
            header[4] = 0;
        }
        HeaderKind::Extended { additional } => {
            let base = additional;
            LittleEndian::write_u32(&mut header[base + 2..base + 6], 0);
            header[base + 6] = 0;
        }
        HeaderKind::External => {
            take_external(header);
        }
    }
}

/// Detach and return the side record of an External header, leaving the
/// pointer slot null. Returns `None` if no record is attached.
pub(crate) fn take_external(header: &mut [u8]) -> Option<Box<ExternalHeader>> {
    let mut bytes = [0u8; PTR_SIZE];
    bytes.copy_from_slice(&header[..PTR_SIZE]);

    let addr = usize::from_ne_bytes(bytes);
    if addr == 0 {
        return None;
    }

    header[..PTR_SIZE].fill(0);

    // The slot held a pointer produced by Box::into_raw in `write`.
    Some(unsafe { Box::from_raw(addr as *mut ExternalHeader) })
}

/// Read the side record of an External header without detaching it.
pub(crate) fn peek_external(header: &[u8]) -> Option<&ExternalHeader> {
    let mut bytes = [0u8; PTR_SIZE];
    bytes.copy_from_slice(&header[..PTR_SIZE]);

    let addr = usize::from_ne_bytes(bytes);
    if addr == 0 {
        return None;
    }

    Some(unsafe { &*(addr as *const ExternalHeader) })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_write_and_clear() {
        let kind = HeaderKind::Basic;
        let mut header = vec![0u8; kind.size()];

        write(kind, &mut header, 7, None);
        assert_eq!(LittleEndian::read_u32(&header[0..4]), 7);
        assert_eq!(header[4], 1);

        clear(kind, &mut header);
        assert_eq!(header, vec![0u8; kind.size()]);
    }

    #[test]
    fn test_extended_use_counter_survives_clear() {
        let kind = HeaderKind::Extended { additional: 3 };
        let mut header = vec![0u8; kind.size()];

        write(kind, &mut header, 1, None);
        write(kind, &mut header, 2, None);
        clear(kind, &mut header);
        write(kind, &mut header, 3, None);

        assert_eq!(LittleEndian::read_u16(&header[3..5]), 3);
        assert_eq!(LittleEndian::read_u32(&header[5..9]), 3);
        assert_eq!(header[9], 1);
    }

    #[test]
    fn test_extended_caller_bytes_untouched() {
        let kind = HeaderKind::Extended { additional: 4 };
        let mut header = vec![0u8; kind.size()];
        header[..4].copy_from_slice(b"mark");

        write(kind, &mut header, 9, None);
        clear(kind, &mut header);

        assert_eq!(&header[..4], b"mark");
    }

    #[test]
    fn test_external_record_round_trip() {
        let kind = HeaderKind::External;
        let mut header = vec![0u8; kind.size()];

        write(kind, &mut header, 42, Some("player entity"));

        let record = peek_external(&header).unwrap();
        assert!(record.in_use);
        assert_eq!(record.alloc_num, 42);
        assert_eq!(record.label.as_deref(), Some("player entity"));

        let taken = take_external(&mut header).unwrap();
        assert_eq!(taken.alloc_num, 42);
        assert!(peek_external(&header).is_none());
        assert_eq!(header, vec![0u8; kind.size()]);
    }

    #[test]
    fn test_external_clear_drops_record() {
        let kind = HeaderKind::External;
        let mut header = vec![0u8; kind.size()];

        write(kind, &mut header, 1, Some("short lived"));
        clear(kind, &mut header);

        assert!(peek_external(&header).is_none());
        // Clearing an already-empty slot is a no-op.
        clear(kind, &mut header);
    }
}
