// src/engine/geometry.rs
//
// Geometric transforms over a (raster, mask) pair.
//
// Every transform here is expressed as one destination -> source coordinate
// map, and `remap` applies that single map to both planes. A transparent source
// pixel therefore always lands on a transparent destination pixel.

use crate::engine::limits::IconLimits;
use crate::engine::mask::{MaskBuffer, MaskType, TRANSPARENT};
use crate::engine::raster::RasterBuffer;
use crate::error::{IconError, Result};

/// A raster and its mask, always the same size.
pub type Planes = (RasterBuffer, MaskBuffer);

/// Matrix entries and inverse entries this close to an integer are snapped.
/// Near zero the tolerance is relative to the largest entry.
const SNAP_EPSILON: f64 = 1e-9;
/// Matrices whose determinant, after scaling the largest entry to 1, is
/// below this are treated as singular.
const SINGULAR_EPSILON: f64 = 1e-12;

#[inline]
fn snap(v: f64, scale: f64) -> f64 {
    let r = v.round();
    let tolerance = if r == 0.0 {
        SNAP_EPSILON * scale
    } else {
        SNAP_EPSILON
    };
    if (v - r).abs() < tolerance {
        r
    } else {
        v
    }
}

#[inline]
fn max_abs(m: [f64; 4]) -> f64 {
    m.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()))
}

/// Canvas size along one axis for a transformed extent.
///
/// Off-grid extents get an odd size so the canvas centre is a pixel centre
/// and the source centre is always sampled.
fn canvas_size(extent: f64) -> f64 {
    let n = (extent - SNAP_EPSILON).ceil().clamp(1.0, u32::MAX as f64);
    let on_grid = (extent - extent.round()).abs() <= SNAP_EPSILON;
    if !on_grid && n % 2.0 == 0.0 && n < u32::MAX as f64 {
        n + 1.0
    } else {
        n
    }
}

/// Build a `width` x `height` pair where pixel `(dx, dy)` copies source pixel
/// `map(dx, dy)`, or becomes background/transparent when the map yields `None`.
///
/// Uncovered raster pixels take the colour key for `ColorKey` masks and 0
/// otherwise. A `None` mask is promoted to `And` if anything was uncovered.
pub(crate) fn remap<F>(
    raster: &RasterBuffer,
    mask: &MaskBuffer,
    width: u32,
    height: u32,
    map: F,
) -> Result<Planes>
where
    F: Fn(u32, u32) -> Option<(u32, u32)>,
{
    let kind = mask.mask_type();
    let background = if kind == MaskType::ColorKey {
        mask.key_value(raster)
    } else {
        0
    };

    let mut out = raster.blank_like(width, height)?;
    if background != 0 {
        out.fill(background);
    }
    let mut out_mask = mask.blank_like(width, height, TRANSPARENT)?;

    let mut uncovered = false;
    for dy in 0..height {
        for dx in 0..width {
            match map(dx, dy) {
                Some((sx, sy)) => {
                    out.set_pixel(dx, dy, raster.get_pixel(sx, sy));
                    out_mask.copy_plane_pixel(mask, sx, sy, dx, dy);
                }
                None => uncovered = true,
            }
        }
    }

    if kind == MaskType::None && uncovered {
        let mut promoted = MaskBuffer::opaque(width, height, MaskType::And)?;
        promoted.copy_settings_from(mask);
        for dy in 0..height {
            for dx in 0..width {
                if map(dx, dy).is_none() {
                    promoted.set_opacity(dx, dy, TRANSPARENT);
                }
            }
        }
        out_mask = promoted;
    }

    Ok((out, out_mask))
}

/// Inverse mapping for a 2x2 linear map applied about the canvas.
///
/// Works in y-up coordinates: source pixel `(x, y)` covers
/// `[x, x+1] x [h-y-1, h-y]`. The output canvas is the bounding box of the
/// transformed source rectangle, centred on the rounded-up pixel grid.
#[derive(Clone, Copy, Debug)]
pub(crate) struct AffinePlan {
    inv: [f64; 4],
    half_w: f64,
    half_h: f64,
    src_w: u32,
    src_h: u32,
    pub width: u32,
    pub height: u32,
}

impl AffinePlan {
    pub fn new(src_w: u32, src_h: u32, a: f64, b: f64, c: f64, d: f64) -> Result<Self> {
        if ![a, b, c, d].iter().all(|v| v.is_finite()) {
            return Err(IconError::singular_transform(a, b, c, d));
        }
        let scale = max_abs([a, b, c, d]);
        if scale == 0.0 {
            return Err(IconError::singular_transform(a, b, c, d));
        }
        let [sa, sb, sc, sd] = [a, b, c, d].map(|v| snap(v, scale));
        // Work on the matrix scaled to a largest entry of 1 so the
        // singularity test does not depend on the overall scale.
        let [na, nb, nc, nd] = [sa, sb, sc, sd].map(|v| v / scale);
        let det = na * nd - nb * nc;
        if det.abs() < SINGULAR_EPSILON {
            return Err(IconError::singular_transform(a, b, c, d));
        }
        let raw = [nd, -nb, -nc, na].map(|v| v / det / scale);
        if !raw.iter().all(|v| v.is_finite()) {
            return Err(IconError::singular_transform(a, b, c, d));
        }
        let inv_scale = max_abs(raw);
        let inv = raw.map(|v| snap(v, inv_scale));

        let (w, h) = (src_w as f64, src_h as f64);
        let corners = [(0.0, 0.0), (w, 0.0), (0.0, h), (w, h)];
        let (mut min_x, mut max_x) = (f64::INFINITY, f64::NEG_INFINITY);
        let (mut min_y, mut max_y) = (f64::INFINITY, f64::NEG_INFINITY);
        for (x, y) in corners {
            let tx = sa * x + sb * y;
            let ty = sc * x + sd * y;
            min_x = min_x.min(tx);
            max_x = max_x.max(tx);
            min_y = min_y.min(ty);
            max_y = max_y.max(ty);
        }
        let extent_x = max_x - min_x;
        let extent_y = max_y - min_y;
        let out_w = canvas_size(extent_x);
        let out_h = canvas_size(extent_y);

        Ok(Self {
            inv,
            half_w: out_w / 2.0,
            half_h: out_h / 2.0,
            src_w,
            src_h,
            width: out_w as u32,
            height: out_h as u32,
        })
    }

    /// Source pixel under destination pixel `(dx, dy)`, if any.
    #[inline]
    pub fn source(&self, dx: u32, dy: u32) -> Option<(u32, u32)> {
        // Offsets from the canvas centre, which maps onto the source centre.
        let x = dx as f64 + 0.5 - self.half_w;
        let y = self.half_h - dy as f64 - 0.5;
        let [ia, ib, ic, id] = self.inv;
        let (w, h) = (self.src_w as f64, self.src_h as f64);
        let sx = (w / 2.0 + ia * x + ib * y).floor();
        let sy = (h / 2.0 - (ic * x + id * y)).floor();
        if sx >= 0.0 && sy >= 0.0 && sx < self.src_w as f64 && sy < self.src_h as f64 {
            Some((sx as u32, sy as u32))
        } else {
            None
        }
    }
}

/// Apply `x' = a*x + b*y`, `y' = c*x + d*y` (y up) to both planes.
///
/// Fails with `SingularTransform` when the matrix has no inverse.
pub fn transform(
    raster: &RasterBuffer,
    mask: &MaskBuffer,
    matrix: [f64; 4],
    limits: &IconLimits,
) -> Result<Planes> {
    let [a, b, c, d] = matrix;
    let plan = AffinePlan::new(raster.width(), raster.height(), a, b, c, d)?;
    limits.enforce(plan.width, plan.height)?;
    remap(raster, mask, plan.width, plan.height, |dx, dy| plan.source(dx, dy))
}

/// Normalise to [0, 360).
pub(crate) fn normalize_degrees(degrees: f64) -> f64 {
    let n = degrees.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs
    if n >= 360.0 {
        0.0
    } else {
        n
    }
}

/// Matrix for a counter-clockwise rotation by `degrees`.
pub(crate) fn rotation_matrix(degrees: f64) -> [f64; 4] {
    let rad = normalize_degrees(degrees).to_radians();
    let (sin, cos) = rad.sin_cos();
    [cos, -sin, sin, cos]
}

/// Rotate counter-clockwise about the centre; the canvas grows to the rotated
/// bounding box. Multiples of 360 return an exact copy.
pub fn rotate(
    raster: &RasterBuffer,
    mask: &MaskBuffer,
    degrees: f64,
    limits: &IconLimits,
) -> Result<Planes> {
    if !degrees.is_finite() {
        return Err(IconError::invalid_argument(
            "degrees",
            degrees.to_string(),
            "rotation angle must be finite",
        ));
    }
    if normalize_degrees(degrees) == 0.0 {
        return Ok((raster.try_clone()?, mask.try_clone()?));
    }
    transform(raster, mask, rotation_matrix(degrees), limits)
}

/// Copy the `width` x `height` region at `(x, y)`; parts outside the source
/// come back transparent. Never fails on out-of-range coordinates.
pub fn extract(
    raster: &RasterBuffer,
    mask: &MaskBuffer,
    x: i64,
    y: i64,
    width: u32,
    height: u32,
    limits: &IconLimits,
) -> Result<Planes> {
    if width == 0 || height == 0 {
        return Err(IconError::invalid_dimension(width as i64, height as i64));
    }
    limits.enforce(width, height)?;
    let (src_w, src_h) = (raster.width() as i64, raster.height() as i64);
    remap(raster, mask, width, height, |dx, dy| {
        let sx = x.saturating_add(dx as i64);
        let sy = y.saturating_add(dy as i64);
        if (0..src_w).contains(&sx) && (0..src_h).contains(&sy) {
            Some((sx as u32, sy as u32))
        } else {
            None
        }
    })
}

/// Flip top-to-bottom (`vertical`) or left-to-right.
pub fn mirror(raster: &RasterBuffer, mask: &MaskBuffer, vertical: bool) -> Result<Planes> {
    let (w, h) = raster.dimensions();
    if !vertical {
        return remap(raster, mask, w, h, |dx, dy| Some((w - 1 - dx, dy)));
    }

    // Whole scanlines move, each plane with its own stride.
    let mut out = raster.try_clone()?;
    let mut out_mask = mask.try_clone()?;
    for y in 0..h {
        out.row_mut(h - 1 - y).copy_from_slice(raster.row(y));
    }
    let line = mask.line_size();
    if line > 0 {
        let src = mask.data();
        let dst = out_mask.data_mut();
        for y in 0..h as usize {
            let to = (h as usize - 1 - y) * line;
            dst[to..to + line].copy_from_slice(&src[y * line..(y + 1) * line]);
        }
    }
    Ok((out, out_mask))
}
