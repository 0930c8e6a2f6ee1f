// src/engine/icon.rs
//
// Icon: one raster plus one mask, always the same size.
//
// Size-changing operations build the complete new pair first and swap it in
// only when everything succeeded, so a failed call leaves the icon untouched.

use crate::engine::alpha::{self, AlphaSource};
use crate::engine::geometry::{self, Planes};
use crate::engine::limits::IconLimits;
use crate::engine::mask::{self, AutoMasking, MaskBuffer, MaskConversion, MaskType, TRANSPARENT};
use crate::engine::memory;
use crate::engine::pipeline;
use crate::engine::raster::{PaletteEntry, PixelType, RasterBuffer};
use crate::engine::resample;
use crate::engine::stats::{self, ChannelStats};
use crate::error::{IconError, Result};
use crate::ops::Operation;

/// Legacy two-plane form used by icon/cursor containers.
///
/// `and_mask` is a `Mono` raster where 1 marks a transparent pixel;
/// `xor_mask` has the icon's pixel type and palette, 0 where transparent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IconHandle {
    pub xor_mask: RasterBuffer,
    pub and_mask: RasterBuffer,
}

/// Create a zero-filled, fully opaque icon.
pub fn create_empty_icon(
    width: i64,
    height: i64,
    pixel_type: PixelType,
    mask_type: MaskType,
) -> Result<Icon> {
    Icon::empty_with_limits(width, height, pixel_type, mask_type, IconLimits::default())
}

#[derive(Debug)]
pub struct Icon {
    raster: RasterBuffer,
    mask: MaskBuffer,
    stats: Option<Vec<ChannelStats>>,
    limits: IconLimits,
}

impl PartialEq for Icon {
    /// Pixel data and mask only; the stats cache and limits are not content.
    fn eq(&self, other: &Self) -> bool {
        self.raster == other.raster && self.mask == other.mask
    }
}

impl Icon {
    pub fn new(width: u32, height: u32, pixel_type: PixelType, mask_type: MaskType) -> Result<Self> {
        create_empty_icon(width as i64, height as i64, pixel_type, mask_type)
    }

    pub fn empty_with_limits(
        width: i64,
        height: i64,
        pixel_type: PixelType,
        mask_type: MaskType,
        limits: IconLimits,
    ) -> Result<Self> {
        if width <= 0 || height <= 0 || width > u32::MAX as i64 || height > u32::MAX as i64 {
            return Err(IconError::invalid_dimension(width, height));
        }
        let (w, h) = (width as u32, height as u32);
        limits.enforce(w, h)?;
        let raster = RasterBuffer::new(w, h, pixel_type)?;
        let mut mask = MaskBuffer::opaque(w, h, mask_type)?;
        mask.avoid_zero_key(&raster);
        Ok(Self {
            raster,
            mask,
            stats: None,
            limits,
        })
    }

    /// Assemble an icon from decoded planes.
    pub fn from_parts(raster: RasterBuffer, mask: MaskBuffer) -> Result<Self> {
        if raster.dimensions() != mask.dimensions() {
            return Err(IconError::dimension_mismatch("mask", raster.dimensions(), mask.dimensions()));
        }
        let (w, h) = raster.dimensions();
        if w == 0 || h == 0 {
            return Err(IconError::invalid_dimension(w as i64, h as i64));
        }
        IconLimits::default().enforce(w, h)?;
        Ok(Self {
            raster,
            mask,
            stats: None,
            limits: IconLimits::default(),
        })
    }

    pub fn into_parts(self) -> Planes {
        (self.raster, self.mask)
    }

    pub fn with_limits(mut self, limits: IconLimits) -> Self {
        self.limits = limits;
        self
    }

    #[inline]
    pub fn limits(&self) -> &IconLimits {
        &self.limits
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.raster.width()
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.raster.height()
    }

    #[inline]
    pub fn dimensions(&self) -> (u32, u32) {
        self.raster.dimensions()
    }

    #[inline]
    pub fn pixel_type(&self) -> PixelType {
        self.raster.pixel_type()
    }

    #[inline]
    pub fn raster(&self) -> &RasterBuffer {
        &self.raster
    }

    #[inline]
    pub fn mask_buffer(&self) -> &MaskBuffer {
        &self.mask
    }

    #[inline]
    pub fn palette(&self) -> &[PaletteEntry] {
        self.raster.palette()
    }

    /// Bytes held at peak if this icon were resized to `target`.
    pub fn estimate_peak(&self, target: (u32, u32)) -> u64 {
        memory::estimate_operation_peak(
            self.pixel_type(),
            self.mask.mask_type(),
            self.dimensions(),
            target,
        )
    }

    fn derive(&self, planes: Planes) -> Self {
        Self {
            raster: planes.0,
            mask: planes.1,
            stats: None,
            limits: self.limits.clone(),
        }
    }

    fn swap_planes(&mut self, stage: &str, planes: Planes) {
        let before = self.dimensions();
        let (raster, mask) = planes;
        self.raster = raster;
        self.mask = mask;
        self.stats = None;
        pipeline::log_op(stage, before, self.dimensions());
    }

    fn raster_changed(&mut self) {
        self.stats = None;
        self.mask.regenerate(&self.raster);
    }

    // Geometry

    /// Deep copy, including the stats cache.
    pub fn dup(&self) -> Result<Self> {
        Ok(Self {
            raster: self.raster.try_clone()?,
            mask: self.mask.try_clone()?,
            stats: self.stats.clone(),
            limits: self.limits.clone(),
        })
    }

    /// New icon holding the given region; outside parts are transparent.
    pub fn extract(&self, x: i64, y: i64, width: u32, height: u32) -> Result<Self> {
        let planes = geometry::extract(&self.raster, &self.mask, x, y, width, height, &self.limits)?;
        Ok(self.derive(planes))
    }

    pub fn stretch(&mut self, width: u32, height: u32) -> Result<()> {
        let planes = resample::stretch(&self.raster, &self.mask, width, height, &self.limits)?;
        self.swap_planes("stretch", planes);
        Ok(())
    }

    /// Counter-clockwise, about the centre; the canvas grows to fit.
    pub fn rotate(&mut self, degrees: f64) -> Result<()> {
        let planes = geometry::rotate(&self.raster, &self.mask, degrees, &self.limits)?;
        self.swap_planes("rotate", planes);
        Ok(())
    }

    pub fn transform(&mut self, a: f64, b: f64, c: f64, d: f64) -> Result<()> {
        let planes = geometry::transform(&self.raster, &self.mask, [a, b, c, d], &self.limits)?;
        self.swap_planes("transform", planes);
        Ok(())
    }

    pub fn mirror(&mut self, vertical: bool) -> Result<()> {
        let planes = geometry::mirror(&self.raster, &self.mask, vertical)?;
        self.swap_planes("mirror", planes);
        Ok(())
    }

    pub fn premultiply_alpha(&mut self, alpha: AlphaSource<'_>) -> Result<()> {
        let planes = alpha::premultiply(&self.raster, &self.mask, alpha)?;
        self.swap_planes("premultiply", planes);
        self.mask.regenerate(&self.raster);
        Ok(())
    }

    /// Zero the raster and make the mask fully opaque, keeping size and type.
    ///
    /// Works on the existing buffers. A colour key that would match the
    /// zeroed pixels is moved off 0.
    pub fn make_empty(&mut self) -> Result<()> {
        let dims = self.dimensions();
        self.raster.data_mut().fill(0);
        self.mask.fill_opacity(mask::OPAQUE);
        self.mask.avoid_zero_key(&self.raster);
        self.stats = None;
        pipeline::log_op("make_empty", dims, dims);
        Ok(())
    }

    // Dual-mask bridge

    /// Split into the AND/XOR pair. Does not modify the icon.
    pub fn split(&self) -> Result<IconHandle> {
        let (w, h) = self.dimensions();
        let and_mask = self.bitmap()?;
        let mut xor_mask = self.raster.try_clone()?;
        for y in 0..h {
            for x in 0..w {
                if and_mask.get_pixel(x, y) != 0 {
                    xor_mask.set_pixel(x, y, 0);
                }
            }
        }
        Ok(IconHandle { xor_mask, and_mask })
    }

    /// Rebuild raster and mask from an AND/XOR pair.
    ///
    /// The raster adopts `xor_mask`'s type and palette with transparent pixels
    /// zeroed. 1-bit mask kinds are kept. Alpha and colour-key masks are kept
    /// when the AND plane agrees with the current transparency; a colour key
    /// additionally needs no visible pixel to equal the key, and its hidden
    /// pixels are written with the key instead of 0. Anything else becomes an
    /// AND mask.
    pub fn combine(&mut self, xor_mask: &RasterBuffer, and_mask: &RasterBuffer) -> Result<()> {
        let dims = self.dimensions();
        if xor_mask.dimensions() != dims {
            return Err(IconError::dimension_mismatch("xor mask", dims, xor_mask.dimensions()));
        }
        if and_mask.dimensions() != dims {
            return Err(IconError::dimension_mismatch("and mask", dims, and_mask.dimensions()));
        }
        let (w, h) = dims;
        let hidden = |x: u32, y: u32| and_mask.get_pixel(x, y) != 0;

        let mut any_hidden = false;
        let mut agrees = true;
        for y in 0..h {
            for x in 0..w {
                let t = hidden(x, y);
                any_hidden |= t;
                if t != self.mask.is_transparent(&self.raster, x, y) {
                    agrees = false;
                }
            }
        }

        let keep_key = self.mask.mask_type() == MaskType::ColorKey && agrees && {
            let key = self.mask.key_value(xor_mask);
            (0..h).all(|y| (0..w).all(|x| hidden(x, y) || xor_mask.get_pixel(x, y) != key))
        };
        let fill = if keep_key { self.mask.key_value(xor_mask) } else { 0 };

        let mut raster = xor_mask.try_clone()?;
        if any_hidden {
            for y in 0..h {
                for x in 0..w {
                    if hidden(x, y) {
                        raster.set_pixel(x, y, fill);
                    }
                }
            }
        }

        let mask = match self.mask.mask_type() {
            MaskType::None if !any_hidden => self.mask.try_clone()?,
            MaskType::Alpha if agrees => self.mask.try_clone()?,
            MaskType::ColorKey if keep_key => self.mask.try_clone()?,
            kind => {
                let kind = if matches!(kind, MaskType::And | MaskType::Xor) {
                    kind
                } else {
                    MaskType::And
                };
                let mut mask = MaskBuffer::opaque(w, h, kind)?;
                mask.copy_settings_from(&self.mask);
                for y in 0..h {
                    for x in 0..w {
                        if hidden(x, y) {
                            mask.set_opacity(x, y, TRANSPARENT);
                        }
                    }
                }
                mask
            }
        };
        self.swap_planes("combine", (raster, mask));
        Ok(())
    }

    /// The mask's AND plane as a `Mono` raster (1 = transparent).
    pub fn bitmap(&self) -> Result<RasterBuffer> {
        let (w, h) = self.dimensions();
        let plane = self.mask.and_plane(&self.raster)?;
        RasterBuffer::from_raw(w, h, PixelType::Mono, plane, None)
    }

    // Pixels

    pub fn pixel(&self, x: u32, y: u32) -> Option<u32> {
        self.raster.checked_pixel(x, y)
    }

    /// Set one raw pixel value, then refresh stats and auto mask.
    pub fn set_pixel(&mut self, x: u32, y: u32, value: u32) -> Result<()> {
        if x >= self.width() || y >= self.height() {
            return Err(IconError::invalid_argument(
                "pixel",
                format!("({x}, {y})"),
                format!("outside the {}x{} icon", self.width(), self.height()),
            ));
        }
        self.raster.set_pixel(x, y, value);
        self.raster_changed();
        Ok(())
    }

    /// Edit a copy of the raster and swap it in; the size must not change.
    pub fn update_raster<F>(&mut self, f: F) -> Result<()>
    where
        F: FnOnce(&mut RasterBuffer),
    {
        let mut raster = self.raster.try_clone()?;
        f(&mut raster);
        self.set_raster(raster)
    }

    pub fn set_raster(&mut self, raster: RasterBuffer) -> Result<()> {
        if raster.dimensions() != self.dimensions() {
            return Err(IconError::dimension_mismatch("raster", self.dimensions(), raster.dimensions()));
        }
        self.raster = raster;
        self.raster_changed();
        Ok(())
    }

    // Mask properties

    #[inline]
    pub fn mask_type(&self) -> MaskType {
        self.mask.mask_type()
    }

    /// Convert without touching the icon.
    pub fn convert_mask(&self, target: MaskType) -> Result<MaskConversion> {
        mask::convert_mask(&self.raster, &self.mask, target)
    }

    /// Convert the mask in place. Returns the lossy-conversion warning, if any.
    pub fn set_mask_type(&mut self, target: MaskType) -> Result<Option<IconError>> {
        let MaskConversion {
            mask,
            raster,
            warning,
        } = self.convert_mask(target)?;
        let raster = match raster {
            Some(r) => r,
            None => self.raster.try_clone()?,
        };
        self.swap_planes("convert_mask", (raster, mask));
        Ok(warning)
    }

    /// Raw mask plane bytes (empty for plane-less kinds).
    #[inline]
    pub fn mask(&self) -> &[u8] {
        self.mask.data()
    }

    /// Replace the mask plane; the length must match the current kind and size.
    pub fn set_mask(&mut self, data: Vec<u8>) -> Result<()> {
        let (w, h) = self.dimensions();
        let mut mask = MaskBuffer::from_raw(w, h, self.mask.mask_type(), data)?;
        mask.copy_settings_from(&self.mask);
        self.mask = mask;
        Ok(())
    }

    /// Write `alpha` into every mask pixel of the inclusive rectangle
    /// `(x1, y1)..=(x2, y2)`.
    ///
    /// Corners may come in any order and are clipped to the icon; a rectangle
    /// entirely outside is a no-op. 1-bit kinds store the thresholded value.
    /// `None` and `ColorKey` masks have no plane to write into, so they are
    /// converted to `Alpha` first unless the write would change nothing.
    pub fn fill_alpha(&mut self, alpha: u8, x1: i64, y1: i64, x2: i64, y2: i64) -> Result<()> {
        let (w, h) = self.dimensions();
        let (left, right) = (x1.min(x2), x1.max(x2));
        let (top, bottom) = (y1.min(y2), y1.max(y2));
        if right < 0 || bottom < 0 || left >= w as i64 || top >= h as i64 {
            return Ok(());
        }
        let (left, right) = (left.max(0) as u32, right.min(w as i64 - 1) as u32);
        let (top, bottom) = (top.max(0) as u32, bottom.min(h as i64 - 1) as u32);

        let mut out = if self.mask.mask_type().has_plane() {
            self.mask.try_clone()?
        } else {
            let unchanged = (top..=bottom).all(|y| {
                (left..=right).all(|x| self.mask.opacity(&self.raster, x, y) == alpha)
            });
            if unchanged {
                return Ok(());
            }
            mask::convert_mask(&self.raster, &self.mask, MaskType::Alpha)?.mask
        };
        for y in top..=bottom {
            for x in left..=right {
                out.set_opacity(x, y, alpha);
            }
        }
        self.mask = out;
        pipeline::log_op("fill_alpha", (w, h), (w, h));
        Ok(())
    }

    #[inline]
    pub fn mask_color(&self) -> PaletteEntry {
        self.mask.mask_color()
    }

    pub fn set_mask_color(&mut self, color: PaletteEntry) {
        self.mask.set_mask_color(color);
        self.mask.regenerate(&self.raster);
    }

    #[inline]
    pub fn mask_index(&self) -> u32 {
        self.mask.mask_index()
    }

    pub fn set_mask_index(&mut self, index: u32) {
        self.mask.set_mask_index(index);
        self.mask.regenerate(&self.raster);
    }

    #[inline]
    pub fn auto_masking(&self) -> AutoMasking {
        self.mask.auto_masking()
    }

    pub fn set_auto_masking(&mut self, mode: AutoMasking) {
        self.mask.set_auto_masking(mode);
        self.mask.regenerate(&self.raster);
    }

    // Statistics

    /// Per-channel statistics, computed on first use after a raster change.
    pub fn stats(&mut self) -> &[ChannelStats] {
        let raster = &self.raster;
        self.stats.get_or_insert_with(|| stats::compute(raster))
    }

    #[inline]
    pub fn stats_cached(&self) -> bool {
        self.stats.is_some()
    }

    // Pipeline

    /// Run `ops` on a copy and swap the result in only if all of them succeed.
    pub fn apply(&mut self, ops: &[Operation]) -> Result<()> {
        let result = pipeline::apply_ops(self, ops)?;
        let planes = (result.raster, result.mask);
        self.swap_planes("apply", planes);
        Ok(())
    }
}
