// src/engine/resample.rs
//
// Stretch (resize) of a (raster, mask) pair.
//
// Policy per axis: an axis that grows is sampled nearest-neighbour, an axis
// that shrinks is area-averaged. Indexed and colour-keyed rasters are always
// nearest so no new colours appear. 1-bit masks take a majority vote over the
// covered area; alpha masks are interpolated (bilinear up, box down).

use crate::engine::geometry::Planes;
use crate::engine::limits::IconLimits;
use crate::engine::mask::{MaskBuffer, MaskType, ALPHA_THRESHOLD, OPAQUE, TRANSPARENT};
use crate::engine::memory;
use crate::engine::raster::{PixelType, RasterBuffer};
use crate::error::{IconError, Result};
use fast_image_resize::{self as fir, ResizeOptions};

/// Resize both planes to `width` x `height`.
pub fn stretch(
    raster: &RasterBuffer,
    mask: &MaskBuffer,
    width: u32,
    height: u32,
    limits: &IconLimits,
) -> Result<Planes> {
    if width == 0 || height == 0 {
        return Err(IconError::invalid_dimension(width as i64, height as i64));
    }
    limits.enforce(width, height)?;
    if raster.dimensions() == (width, height) {
        return Ok((raster.try_clone()?, mask.try_clone()?));
    }

    let nearest_only = raster.pixel_type().is_indexed() || mask.mask_type() == MaskType::ColorKey;
    let out = if nearest_only {
        stretch_nearest(raster, width, height)?
    } else {
        stretch_direct(raster, width, height)?
    };
    let out_mask = stretch_mask(raster, mask, width, height)?;
    Ok((out, out_mask))
}

/// Centre-sampled source index for destination index `d`.
#[inline]
fn nearest_index(d: u32, src: u32, dst: u32) -> u32 {
    let s = ((2 * d as u64 + 1) * src as u64) / (2 * dst as u64);
    (s as u32).min(src - 1)
}

/// Source range `[start, end)` that destination index `d` covers on one axis.
#[inline]
fn axis_span(d: u32, src: u32, dst: u32) -> (u32, u32) {
    if dst >= src {
        let s = nearest_index(d, src, dst);
        return (s, s + 1);
    }
    let start = (d as u64 * src as u64 / dst as u64) as u32;
    let end = ((d as u64 + 1) * src as u64).div_ceil(dst as u64) as u32;
    (start, end.clamp(start + 1, src))
}

fn stretch_nearest(raster: &RasterBuffer, width: u32, height: u32) -> Result<RasterBuffer> {
    let (sw, sh) = raster.dimensions();
    let mut out = raster.blank_like(width, height)?;
    let xs: Vec<u32> = (0..width).map(|dx| nearest_index(dx, sw, width)).collect();
    for dy in 0..height {
        let sy = nearest_index(dy, sh, height);
        for (dx, &sx) in xs.iter().enumerate() {
            out.set_pixel(dx as u32, dy, raster.get_pixel(sx, sy));
        }
    }
    Ok(out)
}

/// Direct-colour rasters: nearest on growing axes, then box on shrinking ones.
fn stretch_direct(raster: &RasterBuffer, width: u32, height: u32) -> Result<RasterBuffer> {
    let (sw, sh) = raster.dimensions();
    let grown = (width.max(sw), height.max(sh));
    let staged;
    let src = if grown != (sw, sh) {
        staged = stretch_nearest(raster, grown.0, grown.1)?;
        if grown == (width, height) {
            return Ok(staged);
        }
        &staged
    } else {
        raster
    };

    let (packed, pixel_type) = pack_direct(src)?;
    let resized = fir_resize(
        &packed,
        src.dimensions(),
        (width, height),
        pixel_type,
        fir::ResizeAlg::Convolution(fir::FilterType::Box),
    )?;
    unpack_direct(src, &resized, width, height)
}

/// Tightly packed pixels in the layout fir expects.
fn pack_direct(raster: &RasterBuffer) -> Result<(Vec<u8>, fir::PixelType)> {
    let (w, h) = raster.dimensions();
    let (pixel_type, size) = match raster.pixel_type() {
        PixelType::Gray16 => (fir::PixelType::U16, 2),
        PixelType::Rgb24 | PixelType::Rgb32 => (fir::PixelType::U8x3, 3),
        other => {
            return Err(IconError::resize_failed(
                (w, h),
                (w, h),
                format!("{} rasters are not resampled by area", other.name()),
            ))
        }
    };
    let mut out = memory::alloc_zeroed("resample source", w as usize * h as usize * size)?;
    let mut i = 0;
    for y in 0..h {
        let row = raster.row(y);
        match raster.pixel_type() {
            PixelType::Rgb24 => {
                let n = w as usize * 3;
                out[i..i + n].copy_from_slice(&row[..n]);
                i += n;
            }
            PixelType::Rgb32 => {
                for px in row[..w as usize * 4].chunks_exact(4) {
                    out[i..i + 3].copy_from_slice(&px[..3]);
                    i += 3;
                }
            }
            _ => {
                for x in 0..w {
                    let v = raster.get_pixel(x, y) as u16;
                    out[i..i + 2].copy_from_slice(&v.to_ne_bytes());
                    i += 2;
                }
            }
        }
    }
    Ok((out, pixel_type))
}

fn unpack_direct(template: &RasterBuffer, pixels: &[u8], width: u32, height: u32) -> Result<RasterBuffer> {
    let mut out = template.blank_like(width, height)?;
    let size = match template.pixel_type() {
        PixelType::Gray16 => 2,
        _ => 3,
    };
    for (i, px) in pixels.chunks_exact(size).enumerate() {
        let x = (i % width as usize) as u32;
        let y = (i / width as usize) as u32;
        let value = if size == 2 {
            u16::from_ne_bytes([px[0], px[1]]) as u32
        } else {
            (px[0] as u32) << 16 | (px[1] as u32) << 8 | px[2] as u32
        };
        out.set_pixel(x, y, value);
    }
    Ok(out)
}

fn fir_resize(
    pixels: &[u8],
    src: (u32, u32),
    dst: (u32, u32),
    pixel_type: fir::PixelType,
    alg: fir::ResizeAlg,
) -> Result<Vec<u8>> {
    let mut src_image = fir::images::Image::new(src.0, src.1, pixel_type);
    let buffer = src_image.buffer_mut();
    if buffer.len() != pixels.len() {
        return Err(IconError::resize_failed(
            src,
            dst,
            format!(
                "fir source buffer mismatch. expected {} bytes, got {} bytes",
                buffer.len(),
                pixels.len()
            ),
        ));
    }
    buffer.copy_from_slice(pixels);

    let mut dst_image = fir::images::Image::new(dst.0, dst.1, pixel_type);
    let mut resizer = fir::Resizer::new();
    resizer
        .resize(&src_image, &mut dst_image, &ResizeOptions::new().resize_alg(alg))
        .map_err(|e| IconError::resize_failed(src, dst, format!("fir resize error: {e:?}")))?;
    Ok(dst_image.into_vec())
}

fn stretch_mask(raster: &RasterBuffer, mask: &MaskBuffer, width: u32, height: u32) -> Result<MaskBuffer> {
    match mask.mask_type() {
        MaskType::None | MaskType::ColorKey => mask.blank_like(width, height, OPAQUE),
        MaskType::And | MaskType::Xor => stretch_bits(raster, mask, width, height),
        MaskType::Alpha => stretch_alpha(mask, width, height),
    }
}

/// Majority vote over each destination pixel's source area; ties stay opaque.
fn stretch_bits(raster: &RasterBuffer, mask: &MaskBuffer, width: u32, height: u32) -> Result<MaskBuffer> {
    let (sw, sh) = mask.dimensions();
    let mut out = mask.blank_like(width, height, OPAQUE)?;
    let xs: Vec<(u32, u32)> = (0..width).map(|dx| axis_span(dx, sw, width)).collect();
    for dy in 0..height {
        let (y0, y1) = axis_span(dy, sh, height);
        for (dx, &(x0, x1)) in xs.iter().enumerate() {
            let total = (y1 - y0) as u64 * (x1 - x0) as u64;
            let transparent = (y0..y1)
                .flat_map(|sy| (x0..x1).map(move |sx| (sx, sy)))
                .filter(|&(sx, sy)| mask.opacity(raster, sx, sy) < ALPHA_THRESHOLD)
                .count() as u64;
            if transparent * 2 > total {
                out.set_opacity(dx as u32, dy, TRANSPARENT);
            }
        }
    }
    Ok(out)
}

/// Bilinear on growing axes, then box on shrinking ones.
fn stretch_alpha(mask: &MaskBuffer, width: u32, height: u32) -> Result<MaskBuffer> {
    let (sw, sh) = mask.dimensions();
    let line = mask.line_size();
    let mut pixels = memory::alloc_zeroed("resample mask", sw as usize * sh as usize)?;
    for (y, row) in pixels.chunks_exact_mut(sw as usize).enumerate() {
        row.copy_from_slice(&mask.data()[y * line..y * line + sw as usize]);
    }

    let mut cur = (sw, sh);
    let grown = (width.max(sw), height.max(sh));
    if grown != cur {
        pixels = fir_resize(
            &pixels,
            cur,
            grown,
            fir::PixelType::U8,
            fir::ResizeAlg::Convolution(fir::FilterType::Bilinear),
        )?;
        cur = grown;
    }
    if cur != (width, height) {
        pixels = fir_resize(
            &pixels,
            cur,
            (width, height),
            fir::PixelType::U8,
            fir::ResizeAlg::Convolution(fir::FilterType::Box),
        )?;
    }

    let mut out = mask.blank_like(width, height, TRANSPARENT)?;
    let out_line = out.line_size();
    let data = out.data_mut();
    for (y, row) in pixels.chunks_exact(width as usize).enumerate() {
        data[y * out_line..y * out_line + width as usize].copy_from_slice(row);
    }
    Ok(out)
}
