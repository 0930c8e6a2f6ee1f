// src/engine/mask.rs
//
// Mask buffer and the mask model: how transparency is stored (kind), how it is
// read back as a per-pixel opacity, and how one kind converts into another.
//
// Opacity is the common currency: 0 = fully transparent, 255 = fully opaque.
// Every kind can be read as opacity; converting is "read opacity, write it
// into the target kind", plus a key search when the target is a colour key.

use crate::engine::memory;
use crate::engine::raster::{bit_get, bit_set, line_size, PaletteEntry, RasterBuffer};
use crate::error::{IconError, Result};
use image::Rgb;
use std::collections::HashSet;

/// Opacity values below this threshold count as transparent.
pub const ALPHA_THRESHOLD: u8 = 128;
pub const OPAQUE: u8 = 255;
pub const TRANSPARENT: u8 = 0;

/// Key colour given to direct-colour `ColorKey` icons created empty.
const EMPTY_KEY_COLOR: PaletteEntry = Rgb([0xFF, 0x00, 0xFF]);

/// Transparency representation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MaskType {
    /// No plane, every pixel opaque
    None,
    /// 1 bpp, bit set = transparent
    And,
    /// 1 bpp, bit set = opaque (the pixel's XOR colour is shown)
    Xor,
    /// No plane, pixels equal to the key are transparent
    ColorKey,
    /// 8 bpp opacity
    Alpha,
}

impl MaskType {
    /// Bits per pixel of the stored plane, if the kind stores one.
    pub fn plane_bits(self) -> Option<u32> {
        match self {
            MaskType::And | MaskType::Xor => Some(1),
            MaskType::Alpha => Some(8),
            MaskType::None | MaskType::ColorKey => None,
        }
    }

    #[inline]
    pub fn has_plane(self) -> bool {
        self.plane_bits().is_some()
    }

    pub fn name(self) -> &'static str {
        match self {
            MaskType::None => "none",
            MaskType::And => "and",
            MaskType::Xor => "xor",
            MaskType::ColorKey => "color-key",
            MaskType::Alpha => "alpha",
        }
    }
}

/// When and how the mask is rebuilt after the raster changes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum AutoMasking {
    /// Raster edits never touch the mask
    #[default]
    Off,
    /// Pixels whose colour equals `mask_color` become transparent
    MaskColor,
    /// Pixels whose palette index equals `mask_index` become transparent
    MaskIndex,
    /// The top-left pixel's value is the key
    Auto,
}

/// Per-pixel transparency for one raster.
///
/// `width`/`height` always equal the owning raster's; `Icon` enforces this.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MaskBuffer {
    width: u32,
    height: u32,
    mask_type: MaskType,
    line_size: usize,
    data: Vec<u8>,
    mask_color: PaletteEntry,
    mask_index: u32,
    auto_masking: AutoMasking,
}

impl MaskBuffer {
    /// Mask of the given kind with every pixel opaque.
    pub fn opaque(width: u32, height: u32, mask_type: MaskType) -> Result<Self> {
        Self::filled(width, height, mask_type, OPAQUE)
    }

    /// Mask of the given kind with every pixel transparent. Plane-less kinds
    /// cannot express this and come back opaque.
    pub fn transparent(width: u32, height: u32, mask_type: MaskType) -> Result<Self> {
        Self::filled(width, height, mask_type, TRANSPARENT)
    }

    fn filled(width: u32, height: u32, mask_type: MaskType, opacity: u8) -> Result<Self> {
        let line = mask_type.plane_bits().map_or(0, |bits| line_size(width, bits));
        let data = memory::alloc_zeroed("mask", line * height as usize)?;
        let mut mask = Self {
            width,
            height,
            mask_type,
            line_size: line,
            data,
            mask_color: Rgb([0, 0, 0]),
            mask_index: 0,
            auto_masking: AutoMasking::Off,
        };
        if mask.plane_value(opacity) {
            mask.fill_opacity(opacity);
        }
        Ok(mask)
    }

    /// Wrap an existing plane. `data` must use the 4-byte aligned stride.
    pub fn from_raw(width: u32, height: u32, mask_type: MaskType, data: Vec<u8>) -> Result<Self> {
        let line = mask_type.plane_bits().map_or(0, |bits| line_size(width, bits));
        let expected = line * height as usize;
        if data.len() != expected {
            return Err(IconError::invalid_argument(
                "mask data",
                format!("{} bytes", data.len()),
                format!("{width}x{height} {} mask needs {expected} bytes", mask_type.name()),
            ));
        }
        Ok(Self {
            width,
            height,
            mask_type,
            line_size: line,
            data,
            mask_color: Rgb([0, 0, 0]),
            mask_index: 0,
            auto_masking: AutoMasking::Off,
        })
    }

    /// Same kind and key settings at a new size, filled with `opacity`.
    pub fn blank_like(&self, width: u32, height: u32, opacity: u8) -> Result<Self> {
        let mut mask = Self::filled(width, height, self.mask_type, opacity)?;
        mask.copy_settings_from(self);
        Ok(mask)
    }

    /// Fallible deep copy.
    pub fn try_clone(&self) -> Result<Self> {
        Ok(Self {
            data: memory::try_clone_bytes("mask", &self.data)?,
            ..*self
        })
    }

    pub(crate) fn copy_settings_from(&mut self, other: &MaskBuffer) {
        self.mask_color = other.mask_color;
        self.mask_index = other.mask_index;
        self.auto_masking = other.auto_masking;
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[inline]
    pub fn mask_type(&self) -> MaskType {
        self.mask_type
    }

    #[inline]
    pub fn line_size(&self) -> usize {
        self.line_size
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub(crate) fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    #[inline]
    pub fn mask_color(&self) -> PaletteEntry {
        self.mask_color
    }

    pub fn set_mask_color(&mut self, color: PaletteEntry) {
        self.mask_color = color;
    }

    #[inline]
    pub fn mask_index(&self) -> u32 {
        self.mask_index
    }

    pub fn set_mask_index(&mut self, index: u32) {
        self.mask_index = index;
    }

    #[inline]
    pub fn auto_masking(&self) -> AutoMasking {
        self.auto_masking
    }

    pub fn set_auto_masking(&mut self, mode: AutoMasking) {
        self.auto_masking = mode;
    }

    /// Raw value that marks a transparent pixel under `ColorKey`.
    pub fn key_value(&self, raster: &RasterBuffer) -> u32 {
        if raster.pixel_type().is_indexed() {
            self.mask_index
        } else {
            raster.value_for_color(self.mask_color)
        }
    }

    /// Move a colour key off 0 so a zero-filled raster reads as opaque.
    ///
    /// Indexed rasters switch to slot 1; direct colour switches to magenta.
    /// Other kinds and keys that are already non-zero are left alone.
    pub(crate) fn avoid_zero_key(&mut self, raster: &RasterBuffer) {
        if self.mask_type != MaskType::ColorKey || self.key_value(raster) != 0 {
            return;
        }
        if raster.pixel_type().is_indexed() {
            self.mask_index = 1;
            if let Some(&color) = raster.palette().get(1) {
                self.mask_color = color;
            }
        } else {
            self.mask_color = EMPTY_KEY_COLOR;
        }
    }

    /// Opacity of one pixel (0 = transparent, 255 = opaque).
    ///
    /// `raster` is only consulted by `ColorKey` masks.
    pub fn opacity(&self, raster: &RasterBuffer, x: u32, y: u32) -> u8 {
        match self.mask_type {
            MaskType::None => OPAQUE,
            MaskType::And => {
                if bit_get(&self.data, self.line_size, x, y) {
                    TRANSPARENT
                } else {
                    OPAQUE
                }
            }
            MaskType::Xor => {
                if bit_get(&self.data, self.line_size, x, y) {
                    OPAQUE
                } else {
                    TRANSPARENT
                }
            }
            MaskType::Alpha => self.data[y as usize * self.line_size + x as usize],
            MaskType::ColorKey => {
                if raster.get_pixel(x, y) == self.key_value(raster) {
                    TRANSPARENT
                } else {
                    OPAQUE
                }
            }
        }
    }

    #[inline]
    pub fn is_transparent(&self, raster: &RasterBuffer, x: u32, y: u32) -> bool {
        self.opacity(raster, x, y) < ALPHA_THRESHOLD
    }

    /// Store an opacity; plane-less kinds ignore the call.
    pub fn set_opacity(&mut self, x: u32, y: u32, opacity: u8) {
        match self.mask_type {
            MaskType::And => bit_set(
                &mut self.data,
                self.line_size,
                x,
                y,
                opacity < ALPHA_THRESHOLD,
            ),
            MaskType::Xor => bit_set(
                &mut self.data,
                self.line_size,
                x,
                y,
                opacity >= ALPHA_THRESHOLD,
            ),
            MaskType::Alpha => self.data[y as usize * self.line_size + x as usize] = opacity,
            MaskType::None | MaskType::ColorKey => {}
        }
    }

    /// Copy the stored plane value of one pixel from another mask of the same kind.
    #[inline]
    pub(crate) fn copy_plane_pixel(&mut self, src: &MaskBuffer, sx: u32, sy: u32, dx: u32, dy: u32) {
        match self.mask_type {
            MaskType::And | MaskType::Xor => {
                let on = bit_get(&src.data, src.line_size, sx, sy);
                bit_set(&mut self.data, self.line_size, dx, dy, on);
            }
            MaskType::Alpha => {
                self.data[dy as usize * self.line_size + dx as usize] =
                    src.data[sy as usize * src.line_size + sx as usize];
            }
            MaskType::None | MaskType::ColorKey => {}
        }
    }

    /// Whether `opacity` needs writing into a freshly zeroed plane.
    fn plane_value(&self, opacity: u8) -> bool {
        match self.mask_type {
            MaskType::And => opacity < ALPHA_THRESHOLD,
            MaskType::Xor => opacity >= ALPHA_THRESHOLD,
            MaskType::Alpha => opacity != 0,
            MaskType::None | MaskType::ColorKey => false,
        }
    }

    /// Set every pixel, leaving row padding zeroed.
    pub(crate) fn fill_opacity(&mut self, opacity: u8) {
        self.data.fill(0);
        if !self.plane_value(opacity) {
            return;
        }
        for y in 0..self.height {
            for x in 0..self.width {
                self.set_opacity(x, y, opacity);
            }
        }
    }

    /// True when at least one pixel is not fully opaque.
    pub fn has_transparency(&self, raster: &RasterBuffer) -> bool {
        if self.mask_type == MaskType::None {
            return false;
        }
        (0..self.height).any(|y| (0..self.width).any(|x| self.opacity(raster, x, y) != OPAQUE))
    }

    /// 1-bit AND plane (bit set = transparent) of the current mask.
    pub fn and_plane(&self, raster: &RasterBuffer) -> Result<Vec<u8>> {
        if self.mask_type == MaskType::And {
            return memory::try_clone_bytes("and plane", &self.data);
        }
        let line = line_size(self.width, 1);
        let mut plane = memory::alloc_zeroed("and plane", line * self.height as usize)?;
        for y in 0..self.height {
            for x in 0..self.width {
                if self.is_transparent(raster, x, y) {
                    bit_set(&mut plane, line, x, y, true);
                }
            }
        }
        Ok(plane)
    }

    /// Rebuild the plane from the raster according to the auto masking mode.
    ///
    /// No-op when auto masking is off or the kind keeps no plane.
    pub fn regenerate(&mut self, raster: &RasterBuffer) {
        if self.auto_masking == AutoMasking::Off || !self.mask_type.has_plane() {
            return;
        }
        if raster.width() == 0 || raster.height() == 0 {
            return;
        }
        let indexed = raster.pixel_type().is_indexed();
        let key = match self.auto_masking {
            AutoMasking::Off => return,
            AutoMasking::MaskIndex if indexed => KeyMatch::Value(self.mask_index),
            AutoMasking::MaskIndex | AutoMasking::MaskColor => {
                if indexed {
                    KeyMatch::Color(self.mask_color)
                } else {
                    KeyMatch::Value(raster.value_for_color(self.mask_color))
                }
            }
            AutoMasking::Auto => KeyMatch::Value(raster.get_pixel(0, 0)),
        };
        for y in 0..self.height {
            for x in 0..self.width {
                let hit = match key {
                    KeyMatch::Value(v) => raster.get_pixel(x, y) == v,
                    KeyMatch::Color(c) => raster.color_at(x, y) == c,
                };
                self.set_opacity(x, y, if hit { TRANSPARENT } else { OPAQUE });
            }
        }
    }
}

#[derive(Clone, Copy)]
enum KeyMatch {
    Value(u32),
    Color(PaletteEntry),
}

/// Result of `convert_mask`.
///
/// `raster` is set when the conversion had to rewrite pixels (colour key
/// targets); `warning` carries an `UnsupportedMaskConversion` when the
/// documented lossy rule was applied.
#[derive(Debug)]
pub struct MaskConversion {
    pub mask: MaskBuffer,
    pub raster: Option<RasterBuffer>,
    pub warning: Option<IconError>,
}

/// Convert `mask` (belonging to `raster`) into `target`.
///
/// - 1-bit -> alpha maps transparent/opaque to 0/255 exactly
/// - alpha -> 1-bit thresholds at 128 (alpha < 128 is transparent)
/// - colour key -> any plane re-scans the raster for the key
/// - any -> colour key picks an unused palette slot or colour, rewrites the
///   transparent pixels to it, and warns when no unused key exists
pub fn convert_mask(
    raster: &RasterBuffer,
    mask: &MaskBuffer,
    target: MaskType,
) -> Result<MaskConversion> {
    let from = mask.mask_type();
    if from == target {
        return Ok(MaskConversion {
            mask: mask.try_clone()?,
            raster: None,
            warning: None,
        });
    }

    let (w, h) = mask.dimensions();
    let partial_alpha = from == MaskType::Alpha
        && mask.data.iter().enumerate().any(|(i, &a)| {
            (i % mask.line_size) < w as usize && a != OPAQUE && a != TRANSPARENT
        });

    match target {
        MaskType::None => {
            let mut out = MaskBuffer::opaque(w, h, MaskType::None)?;
            out.copy_settings_from(mask);
            let warning = mask.has_transparency(raster).then(|| {
                IconError::unsupported_mask_conversion(
                    from.name(),
                    target.name(),
                    "transparent pixels become opaque",
                )
            });
            Ok(MaskConversion {
                mask: out,
                raster: None,
                warning,
            })
        }
        MaskType::And | MaskType::Xor | MaskType::Alpha => {
            let mut out = MaskBuffer::transparent(w, h, target)?;
            out.copy_settings_from(mask);
            for y in 0..h {
                for x in 0..w {
                    out.set_opacity(x, y, mask.opacity(raster, x, y));
                }
            }
            let warning = (partial_alpha && target != MaskType::Alpha).then(|| {
                IconError::unsupported_mask_conversion(
                    from.name(),
                    target.name(),
                    "partial alpha thresholded at 128",
                )
            });
            Ok(MaskConversion {
                mask: out,
                raster: None,
                warning,
            })
        }
        MaskType::ColorKey => convert_to_color_key(raster, mask, partial_alpha),
    }
}

fn convert_to_color_key(
    raster: &RasterBuffer,
    mask: &MaskBuffer,
    partial_alpha: bool,
) -> Result<MaskConversion> {
    let (w, h) = mask.dimensions();
    let mut out_raster = raster.try_clone()?;
    let mut out = MaskBuffer::opaque(w, h, MaskType::ColorKey)?;
    out.copy_settings_from(mask);

    let transparent: Vec<bool> = (0..h)
        .flat_map(|y| (0..w).map(move |x| (x, y)))
        .map(|(x, y)| mask.is_transparent(raster, x, y))
        .collect();

    let key = pick_key(&mut out_raster, mask, &transparent)?;
    if out_raster.pixel_type().is_indexed() {
        out.mask_index = key.value;
    }
    out.mask_color = key.color;

    let key_value = out.key_value(&out_raster);
    for y in 0..h {
        for x in 0..w {
            if transparent[(y * w + x) as usize] {
                out_raster.set_pixel(x, y, key_value);
            }
        }
    }

    let warning = if !key.unique {
        Some(IconError::unsupported_mask_conversion(
            mask.mask_type().name(),
            MaskType::ColorKey.name(),
            "no unused key available; opaque pixels matching the key become transparent",
        ))
    } else if partial_alpha {
        Some(IconError::unsupported_mask_conversion(
            MaskType::Alpha.name(),
            MaskType::ColorKey.name(),
            "partial alpha thresholded at 128",
        ))
    } else {
        None
    };

    Ok(MaskConversion {
        mask: out,
        raster: Some(out_raster),
        warning,
    })
}

struct PickedKey {
    value: u32,
    color: PaletteEntry,
    unique: bool,
}

/// Find a key value no opaque pixel uses; may append a palette entry.
fn pick_key(raster: &mut RasterBuffer, mask: &MaskBuffer, transparent: &[bool]) -> Result<PickedKey> {
    let (w, h) = raster.dimensions();
    let opaque_values = || {
        (0..h)
            .flat_map(move |y| (0..w).map(move |x| (x, y)))
            .filter(|&(x, y)| !transparent[(y * w + x) as usize])
    };

    if raster.pixel_type().is_indexed() {
        let mut used = vec![false; raster.pixel_type().palette_capacity()];
        for (x, y) in opaque_values() {
            used[raster.get_pixel(x, y) as usize] = true;
        }
        let pal_len = raster.palette().len() as u32;
        let preferred = mask.mask_index;
        let free = if preferred < pal_len && !used[preferred as usize] {
            Some(preferred)
        } else {
            (0..pal_len).find(|&i| !used[i as usize])
        };
        if let Some(idx) = free {
            let color = raster.palette()[idx as usize];
            return Ok(PickedKey {
                value: idx,
                color,
                unique: true,
            });
        }
        if raster.palette().len() < raster.pixel_type().palette_capacity() {
            let mut palette = raster.palette().to_vec();
            palette.push(mask.mask_color);
            raster.set_palette(palette)?;
            return Ok(PickedKey {
                value: pal_len,
                color: mask.mask_color,
                unique: true,
            });
        }
        let idx = preferred.min(pal_len.saturating_sub(1));
        return Ok(PickedKey {
            value: idx,
            color: raster.palette()[idx as usize],
            unique: false,
        });
    }

    let used: HashSet<u32> = opaque_values().map(|(x, y)| raster.get_pixel(x, y)).collect();
    let preferred = raster.value_for_color(mask.mask_color);
    let candidate = if !used.contains(&preferred) {
        Some(preferred)
    } else if raster.pixel_type() == crate::engine::raster::PixelType::Gray16 {
        // only multiples of 257 survive the colour round trip
        (0..=255u32).map(|k| k * 257).find(|v| !used.contains(v))
    } else {
        (0..=raster.pixel_type().max_value()).find(|v| !used.contains(v))
    };
    Ok(match candidate {
        Some(value) => PickedKey {
            value,
            color: raster.color_of(value),
            unique: true,
        },
        None => PickedKey {
            value: preferred,
            color: raster.color_of(preferred),
            unique: false,
        },
    })
}
