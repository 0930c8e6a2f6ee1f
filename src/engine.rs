// src/engine.rs
//
// The core of icon-engine. An icon is a raster plus a mask that:
// 1. Always describe the same width/height
// 2. Move together through every geometric transform
// 3. Are replaced as a pair, never edited half-way
//
// This file is a facade that delegates to the decomposed modules in engine/

// =============================================================================
// SIZE LIMITS
// =============================================================================

/// Maximum allowed icon dimension (width or height).
/// Applies to every new plane, whatever limit policy is configured.
pub const MAX_DIMENSION: u32 = 32768;

/// Maximum allowed total pixels (width * height).
/// 100 megapixels = 400MB as Rgb32. Beyond this is likely a mistake.
pub const MAX_PIXELS: u64 = 100_000_000;

// =============================================================================
// MODULE DECOMPOSITION
// =============================================================================

mod alpha;
mod batch;
mod geometry;
mod icon;
mod interop;
mod limits;
mod mask;
mod memory;
mod pipeline;
mod raster;
mod resample;
mod stats;

pub use alpha::{premultiply, AlphaSource};
pub use batch::{process_batch, process_batch_with_concurrency, MAX_CONCURRENCY};
pub use geometry::{extract, mirror, rotate, transform, Planes};
pub use icon::{create_empty_icon, Icon, IconHandle};
pub use limits::{IconLimits, LimitPolicy, ENV_MAX_DIMENSION, ENV_MAX_PIXELS, ENV_POLICY};
pub use mask::{
    convert_mask, AutoMasking, MaskBuffer, MaskConversion, MaskType, ALPHA_THRESHOLD, OPAQUE,
    TRANSPARENT,
};
pub use memory::{estimate_operation_peak, mask_bytes, raster_bytes};
pub use pipeline::{
    apply_ops, apply_ops_tracked, optimize_ops, validate_operation_sequence, TrackedIcon,
    ENV_DEBUG_OPS,
};
pub use raster::{line_size, PaletteEntry, PixelType, RasterBuffer, LINE_ALIGN};
pub use resample::stretch;
pub use stats::{compute as compute_stats, ChannelStats};
