// src/engine/alpha.rs
//
// Alpha premultiplication of the raster by an external alpha buffer.

use crate::engine::geometry::Planes;
use crate::engine::mask::{MaskBuffer, MaskType};
use crate::engine::raster::{pack_rgb, PixelType, RasterBuffer};
use crate::error::{IconError, Result};
use image::GrayImage;

/// Where the per-pixel alpha comes from.
#[derive(Clone, Copy, Debug)]
pub enum AlphaSource<'a> {
    /// Same alpha for every pixel
    Constant(u8),
    /// One 8-bit alpha per pixel; must match the icon's size
    Plane(&'a GrayImage),
}

impl AlphaSource<'_> {
    #[inline]
    fn at(&self, x: u32, y: u32) -> u8 {
        match self {
            AlphaSource::Constant(a) => *a,
            AlphaSource::Plane(plane) => plane.get_pixel(x, y)[0],
        }
    }
}

/// `round(c * a / 255)`, clamped to `max`.
#[inline]
fn scale(c: u32, a: u8, max: u32) -> u32 {
    ((c * a as u32 + 127) / 255).min(max)
}

/// Scale every colour channel by `alpha / 255`.
///
/// Indexed rasters are promoted to `Rgb24` first since scaled colours are
/// generally not in the palette. An `Alpha` mask is scaled the same way;
/// colour-keyed pixels that are transparent keep the key value.
pub fn premultiply(raster: &RasterBuffer, mask: &MaskBuffer, alpha: AlphaSource<'_>) -> Result<Planes> {
    let (w, h) = raster.dimensions();
    if let AlphaSource::Plane(plane) = alpha {
        if plane.dimensions() != (w, h) {
            return Err(IconError::dimension_mismatch("alpha buffer", (w, h), plane.dimensions()));
        }
    }

    let promote = raster.pixel_type().is_indexed();
    let mut out = if promote {
        RasterBuffer::new(w, h, PixelType::Rgb24)?
    } else {
        raster.try_clone()?
    };
    let mut out_mask = mask.try_clone()?;
    if promote && mask.mask_type() == MaskType::ColorKey {
        out_mask.set_mask_color(raster.color_of(mask.mask_index()));
    }
    let keyed = mask.mask_type() == MaskType::ColorKey;

    for y in 0..h {
        for x in 0..w {
            let a = alpha.at(x, y);
            let value = if keyed && mask.is_transparent(raster, x, y) {
                if promote {
                    pack_rgb(raster.color_at(x, y))
                } else {
                    raster.get_pixel(x, y)
                }
            } else if out.pixel_type() == PixelType::Gray16 {
                scale(raster.get_pixel(x, y), a, 0xFFFF)
            } else {
                let c = raster.color_at(x, y);
                pack_rgb(image::Rgb([
                    scale(c[0] as u32, a, 255) as u8,
                    scale(c[1] as u32, a, 255) as u8,
                    scale(c[2] as u32, a, 255) as u8,
                ]))
            };
            out.set_pixel(x, y, value);

            if mask.mask_type() == MaskType::Alpha {
                let m = mask.opacity(raster, x, y);
                out_mask.set_opacity(x, y, scale(m as u32, a, 255) as u8);
            }
        }
    }
    Ok((out, out_mask))
}
