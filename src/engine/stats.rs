// src/engine/stats.rs
//
// Histogram-derived per-channel statistics of a raster.

use crate::engine::raster::{PixelType, RasterBuffer};

/// Statistics of one channel. Values are raw: palette indices for indexed
/// rasters, 16-bit gray for `Gray16`, 8-bit R/G/B for direct colour.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChannelStats {
    pub count: u64,
    pub sum: f64,
    pub sum2: f64,
    pub mean: f64,
    /// Population variance
    pub variance: f64,
    pub std_dev: f64,
    pub range_lo: u32,
    pub range_hi: u32,
}

impl ChannelStats {
    fn from_histogram(hist: &[u64]) -> Self {
        let mut stats = ChannelStats::default();
        let mut lo = None;
        for (value, &n) in hist.iter().enumerate() {
            if n == 0 {
                continue;
            }
            let v = value as f64;
            stats.count += n;
            stats.sum += v * n as f64;
            stats.sum2 += v * v * n as f64;
            lo.get_or_insert(value as u32);
            stats.range_hi = value as u32;
        }
        if stats.count == 0 {
            return stats;
        }
        stats.range_lo = lo.unwrap_or(0);
        let n = stats.count as f64;
        stats.mean = stats.sum / n;
        stats.variance = (stats.sum2 / n - stats.mean * stats.mean).max(0.0);
        stats.std_dev = stats.variance.sqrt();
        stats
    }
}

/// One entry per channel: `[R, G, B]` for direct colour, a single entry otherwise.
pub fn compute(raster: &RasterBuffer) -> Vec<ChannelStats> {
    let pixel_type = raster.pixel_type();
    let channels = pixel_type.channels();
    let bins = match pixel_type {
        PixelType::Rgb24 | PixelType::Rgb32 => 256,
        other => other.max_value() as usize + 1,
    };
    let mut hists = vec![vec![0u64; bins]; channels];

    let (w, h) = raster.dimensions();
    for y in 0..h {
        for x in 0..w {
            let v = raster.get_pixel(x, y);
            if channels == 3 {
                hists[0][(v >> 16) as usize & 0xFF] += 1;
                hists[1][(v >> 8) as usize & 0xFF] += 1;
                hists[2][v as usize & 0xFF] += 1;
            } else {
                hists[0][v as usize] += 1;
            }
        }
    }
    hists.iter().map(|h| ChannelStats::from_histogram(h)).collect()
}
