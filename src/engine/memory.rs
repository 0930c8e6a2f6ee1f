// src/engine/memory.rs
//
// Buffer allocation and peak-memory estimation.
//
// Every plane the engine produces is allocated through these helpers so that an
// out-of-memory condition surfaces as IconError::AllocationFailure instead of an
// abort, and so that operations can report how much they will hold at peak
// (old pair + new pair, see `estimate_operation_peak`).

use crate::engine::mask::MaskType;
use crate::engine::raster::{line_size, PixelType};
use crate::error::{IconError, Result};

/// Allocate a buffer of `len` bytes, every byte set to `value`.
pub fn alloc_filled(what: &'static str, len: usize, value: u8) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|e| IconError::allocation_failure(what, len, e))?;
    buf.resize(len, value);
    Ok(buf)
}

/// Allocate a zero-filled buffer of `len` bytes.
#[inline]
pub fn alloc_zeroed(what: &'static str, len: usize) -> Result<Vec<u8>> {
    alloc_filled(what, len, 0)
}

/// Fallible deep copy of a byte slice.
pub fn try_clone_bytes(what: &'static str, src: &[u8]) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(src.len())
        .map_err(|e| IconError::allocation_failure(what, src.len(), e))?;
    buf.extend_from_slice(src);
    Ok(buf)
}

/// Bytes held by a raster plane of the given geometry.
pub fn raster_bytes(width: u32, height: u32, pixel_type: PixelType) -> u64 {
    line_size(width, pixel_type.bits()) as u64 * height as u64
}

/// Bytes held by a mask plane of the given geometry (0 for plane-less kinds).
pub fn mask_bytes(width: u32, height: u32, mask_type: MaskType) -> u64 {
    match mask_type.plane_bits() {
        Some(bits) => line_size(width, bits) as u64 * height as u64,
        None => 0,
    }
}

/// Peak bytes held while an operation replaces a `src` pair with a `dst` pair.
///
/// Both pairs are alive at the same time until the swap, never more.
pub fn estimate_operation_peak(
    pixel_type: PixelType,
    mask_type: MaskType,
    src: (u32, u32),
    dst: (u32, u32),
) -> u64 {
    let old = raster_bytes(src.0, src.1, pixel_type) + mask_bytes(src.0, src.1, mask_type);
    let new = raster_bytes(dst.0, dst.1, pixel_type) + mask_bytes(dst.0, dst.1, mask_type);
    old.saturating_add(new)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_filled_sets_every_byte() {
        let buf = alloc_filled("test", 17, 0xAB).unwrap();
        assert_eq!(buf.len(), 17);
        assert!(buf.iter().all(|&b| b == 0xAB));
    }

    #[test]
    fn test_alloc_reports_failure_instead_of_aborting() {
        let err = alloc_zeroed("huge", usize::MAX).unwrap_err();
        assert!(matches!(err, IconError::AllocationFailure { bytes, .. } if bytes == usize::MAX));
    }

    #[test]
    fn test_estimate_counts_both_pairs() {
        // 8x8 rgb24: 24 bytes per line; and-mask: 4 bytes per line
        let one_pair = 8 * 24 + 8 * 4;
        let peak =
            estimate_operation_peak(PixelType::Rgb24, MaskType::And, (8, 8), (8, 8));
        assert_eq!(peak, 2 * one_pair);
    }

    #[test]
    fn test_plane_less_masks_cost_nothing() {
        assert_eq!(mask_bytes(100, 100, MaskType::None), 0);
        assert_eq!(mask_bytes(100, 100, MaskType::ColorKey), 0);
        assert_eq!(mask_bytes(100, 100, MaskType::Alpha), 100 * 100);
    }
}
