// src/engine/raster.rs
//
// Raster buffer: a width x height pixel grid at a fixed bit depth, every
// scanline padded to a 4-byte boundary. Rows are stored top-down.

use crate::engine::memory;
use crate::error::{IconError, Result};
use image::Rgb;

/// Palette entry type shared with the `image` crate.
pub type PaletteEntry = Rgb<u8>;

/// Scanline alignment in bytes.
pub const LINE_ALIGN: usize = 4;

/// Bytes per scanline for `width` pixels of `bits` each, rounded up to LINE_ALIGN.
#[inline]
pub fn line_size(width: u32, bits: u32) -> usize {
    (width as usize * bits as usize).div_ceil(LINE_ALIGN * 8) * LINE_ALIGN
}

/// Pixel layout of a raster plane.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PixelType {
    /// 1 bpp, palette-indexed (bit 7 is the leftmost pixel)
    Mono,
    /// 4 bpp, palette-indexed (high nibble is the leftmost pixel)
    Nibble,
    /// 8 bpp, palette-indexed
    Byte,
    /// 16 bpp grayscale, little-endian
    Gray16,
    /// 24 bpp, R, G, B
    Rgb24,
    /// 32 bpp, R, G, B, unused pad byte
    Rgb32,
}

impl PixelType {
    pub fn bits(self) -> u32 {
        match self {
            PixelType::Mono => 1,
            PixelType::Nibble => 4,
            PixelType::Byte => 8,
            PixelType::Gray16 => 16,
            PixelType::Rgb24 => 24,
            PixelType::Rgb32 => 32,
        }
    }

    pub fn from_bits(bits: u32) -> Result<Self> {
        match bits {
            1 => Ok(PixelType::Mono),
            4 => Ok(PixelType::Nibble),
            8 => Ok(PixelType::Byte),
            16 => Ok(PixelType::Gray16),
            24 => Ok(PixelType::Rgb24),
            32 => Ok(PixelType::Rgb32),
            other => Err(IconError::invalid_argument(
                "pixel type",
                other.to_string(),
                "supported depths are 1, 4, 8, 16, 24 and 32 bits",
            )),
        }
    }

    #[inline]
    pub fn is_indexed(self) -> bool {
        matches!(self, PixelType::Mono | PixelType::Nibble | PixelType::Byte)
    }

    /// Maximum palette size (0 for direct-colour types).
    pub fn palette_capacity(self) -> usize {
        if self.is_indexed() {
            1 << self.bits()
        } else {
            0
        }
    }

    /// Number of independent channels a pixel value carries.
    pub fn channels(self) -> usize {
        match self {
            PixelType::Rgb24 | PixelType::Rgb32 => 3,
            _ => 1,
        }
    }

    /// Largest raw pixel value.
    pub fn max_value(self) -> u32 {
        match self {
            PixelType::Rgb24 | PixelType::Rgb32 => 0x00FF_FFFF,
            other => (1u32 << other.bits()) - 1,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PixelType::Mono => "mono",
            PixelType::Nibble => "nibble",
            PixelType::Byte => "byte",
            PixelType::Gray16 => "gray16",
            PixelType::Rgb24 => "rgb24",
            PixelType::Rgb32 => "rgb32",
        }
    }

    /// Gray ramp used when an indexed raster is created without a palette.
    pub fn default_palette(self) -> Vec<PaletteEntry> {
        let n = self.palette_capacity();
        if n < 2 {
            return Vec::new();
        }
        (0..n)
            .map(|i| {
                let v = (i * 255 / (n - 1)) as u8;
                Rgb([v, v, v])
            })
            .collect()
    }
}

#[inline]
pub(crate) fn pack_rgb(c: PaletteEntry) -> u32 {
    ((c[0] as u32) << 16) | ((c[1] as u32) << 8) | c[2] as u32
}

#[inline]
pub(crate) fn unpack_rgb(v: u32) -> PaletteEntry {
    Rgb([(v >> 16) as u8, (v >> 8) as u8, v as u8])
}

#[inline]
pub(crate) fn luma(c: PaletteEntry) -> u32 {
    (c[0] as u32 * 299 + c[1] as u32 * 587 + c[2] as u32 * 114 + 500) / 1000
}

// 1-bit plane helpers, shared with the mask planes.

#[inline]
pub(crate) fn bit_get(data: &[u8], line: usize, x: u32, y: u32) -> bool {
    let byte = data[y as usize * line + (x as usize >> 3)];
    byte & (0x80 >> (x & 7)) != 0
}

#[inline]
pub(crate) fn bit_set(data: &mut [u8], line: usize, x: u32, y: u32, on: bool) {
    let idx = y as usize * line + (x as usize >> 3);
    let bit = 0x80u8 >> (x & 7);
    if on {
        data[idx] |= bit;
    } else {
        data[idx] &= !bit;
    }
}

/// A pixel grid plus palette.
///
/// Invariants: `data.len() == line_size * height`; the palette is non-empty iff
/// the pixel type is indexed, and never longer than `2^bits`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RasterBuffer {
    width: u32,
    height: u32,
    pixel_type: PixelType,
    line_size: usize,
    data: Vec<u8>,
    palette: Vec<PaletteEntry>,
}

impl RasterBuffer {
    /// Zero-filled raster with the default palette for indexed types.
    pub fn new(width: u32, height: u32, pixel_type: PixelType) -> Result<Self> {
        let line_size = line_size(width, pixel_type.bits());
        let data = memory::alloc_zeroed("raster", line_size * height as usize)?;
        Ok(Self {
            width,
            height,
            pixel_type,
            line_size,
            data,
            palette: pixel_type.default_palette(),
        })
    }

    /// Wrap already-decoded scanlines. `data` must use the 4-byte aligned stride.
    pub fn from_raw(
        width: u32,
        height: u32,
        pixel_type: PixelType,
        data: Vec<u8>,
        palette: Option<Vec<PaletteEntry>>,
    ) -> Result<Self> {
        let line_size = line_size(width, pixel_type.bits());
        let expected = line_size * height as usize;
        if data.len() != expected {
            return Err(IconError::invalid_argument(
                "raster data",
                format!("{} bytes", data.len()),
                format!("{width}x{height} {} needs {expected} bytes", pixel_type.name()),
            ));
        }
        let palette = match palette {
            Some(p) => {
                check_palette(pixel_type, &p)?;
                p
            }
            None => pixel_type.default_palette(),
        };
        Ok(Self {
            width,
            height,
            pixel_type,
            line_size,
            data,
            palette,
        })
    }

    /// Zero-filled raster of the same type and palette, at a new size.
    pub fn blank_like(&self, width: u32, height: u32) -> Result<Self> {
        let line_size = line_size(width, self.pixel_type.bits());
        let data = memory::alloc_zeroed("raster", line_size * height as usize)?;
        Ok(Self {
            width,
            height,
            pixel_type: self.pixel_type,
            line_size,
            data,
            palette: self.palette.clone(),
        })
    }

    /// Fallible deep copy.
    pub fn try_clone(&self) -> Result<Self> {
        Ok(Self {
            data: memory::try_clone_bytes("raster", &self.data)?,
            palette: self.palette.clone(),
            ..*self
        })
    }

    pub fn set_palette(&mut self, palette: Vec<PaletteEntry>) -> Result<()> {
        check_palette(self.pixel_type, &palette)?;
        self.palette = palette;
        Ok(())
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
    pub fn pixel_type(&self) -> PixelType {
        self.pixel_type
    }

    #[inline]
    pub fn line_size(&self) -> usize {
        self.line_size
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Mutable scanline bytes. Callers going through `Icon` should prefer
    /// `Icon::update_raster` so caches and auto masking stay in sync.
    #[inline]
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    #[inline]
    pub fn palette(&self) -> &[PaletteEntry] {
        &self.palette
    }

    #[inline]
    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.line_size;
        &self.data[start..start + self.line_size]
    }

    #[inline]
    pub fn row_mut(&mut self, y: u32) -> &mut [u8] {
        let start = y as usize * self.line_size;
        &mut self.data[start..start + self.line_size]
    }

    pub fn into_raw(self) -> Vec<u8> {
        self.data
    }

    /// Raw pixel value, or `None` outside the raster.
    #[inline]
    pub fn checked_pixel(&self, x: u32, y: u32) -> Option<u32> {
        (x < self.width && y < self.height).then(|| self.get_pixel(x, y))
    }

    /// Raw pixel value: palette index, 16-bit gray, or 0xRRGGBB.
    ///
    /// # Panics
    ///
    /// Panics when `(x, y)` is outside the raster. Use `checked_pixel` for
    /// coordinates that are not known to be in bounds.
    pub fn get_pixel(&self, x: u32, y: u32) -> u32 {
        assert!(x < self.width && y < self.height, "pixel ({x}, {y}) out of bounds");
        let row = self.row(y);
        let x = x as usize;
        match self.pixel_type {
            PixelType::Mono => ((row[x >> 3] >> (7 - (x & 7))) & 1) as u32,
            PixelType::Nibble => {
                let b = row[x >> 1];
                (if x & 1 == 0 { b >> 4 } else { b & 0x0F }) as u32
            }
            PixelType::Byte => row[x] as u32,
            PixelType::Gray16 => u16::from_le_bytes([row[x * 2], row[x * 2 + 1]]) as u32,
            PixelType::Rgb24 => {
                let p = &row[x * 3..x * 3 + 3];
                pack_rgb(Rgb([p[0], p[1], p[2]]))
            }
            PixelType::Rgb32 => {
                let p = &row[x * 4..x * 4 + 3];
                pack_rgb(Rgb([p[0], p[1], p[2]]))
            }
        }
    }

    /// Store a raw pixel value; bits beyond the depth are dropped.
    ///
    /// # Panics
    ///
    /// Panics when `(x, y)` is outside the raster. `Icon::set_pixel` checks
    /// the coordinates and returns an error instead.
    pub fn set_pixel(&mut self, x: u32, y: u32, value: u32) {
        assert!(x < self.width && y < self.height, "pixel ({x}, {y}) out of bounds");
        let pixel_type = self.pixel_type;
        let row = self.row_mut(y);
        let x = x as usize;
        match pixel_type {
            PixelType::Mono => {
                let bit = 0x80u8 >> (x & 7);
                if value & 1 != 0 {
                    row[x >> 3] |= bit;
                } else {
                    row[x >> 3] &= !bit;
                }
            }
            PixelType::Nibble => {
                let v = (value & 0x0F) as u8;
                let b = &mut row[x >> 1];
                *b = if x & 1 == 0 {
                    (*b & 0x0F) | (v << 4)
                } else {
                    (*b & 0xF0) | v
                };
            }
            PixelType::Byte => row[x] = value as u8,
            PixelType::Gray16 => {
                row[x * 2..x * 2 + 2].copy_from_slice(&(value as u16).to_le_bytes());
            }
            PixelType::Rgb24 => {
                let c = unpack_rgb(value);
                row[x * 3..x * 3 + 3].copy_from_slice(&c.0);
            }
            PixelType::Rgb32 => {
                let c = unpack_rgb(value);
                row[x * 4..x * 4 + 3].copy_from_slice(&c.0);
                row[x * 4 + 3] = 0;
            }
        }
    }

    /// Palette-resolved colour of a pixel.
    pub fn color_at(&self, x: u32, y: u32) -> PaletteEntry {
        let v = self.get_pixel(x, y);
        self.color_of(v)
    }

    /// Colour a raw value stands for in this raster.
    pub fn color_of(&self, value: u32) -> PaletteEntry {
        match self.pixel_type {
            t if t.is_indexed() => self
                .palette
                .get(value as usize)
                .copied()
                .unwrap_or(Rgb([0, 0, 0])),
            PixelType::Gray16 => {
                let g = (value >> 8) as u8;
                Rgb([g, g, g])
            }
            _ => unpack_rgb(value),
        }
    }

    /// Raw value that best represents `color` (nearest palette entry for indexed types).
    pub fn value_for_color(&self, color: PaletteEntry) -> u32 {
        match self.pixel_type {
            t if t.is_indexed() => nearest_palette_index(&self.palette, color),
            PixelType::Gray16 => luma(color) * 257,
            _ => pack_rgb(color),
        }
    }

    /// Set every pixel to `value`.
    pub fn fill(&mut self, value: u32) {
        if value == 0 {
            self.data.fill(0);
            return;
        }
        for y in 0..self.height {
            for x in 0..self.width {
                self.set_pixel(x, y, value);
            }
        }
    }
}

fn check_palette(pixel_type: PixelType, palette: &[PaletteEntry]) -> Result<()> {
    let cap = pixel_type.palette_capacity();
    if cap == 0 && !palette.is_empty() {
        return Err(IconError::invalid_argument(
            "palette",
            format!("{} entries", palette.len()),
            format!("{} rasters carry no palette", pixel_type.name()),
        ));
    }
    if cap > 0 && (palette.is_empty() || palette.len() > cap) {
        return Err(IconError::invalid_argument(
            "palette",
            format!("{} entries", palette.len()),
            format!("{} rasters need 1..={cap} entries", pixel_type.name()),
        ));
    }
    Ok(())
}

pub(crate) fn nearest_palette_index(palette: &[PaletteEntry], color: PaletteEntry) -> u32 {
    let mut best = 0usize;
    let mut best_dist = u32::MAX;
    for (i, p) in palette.iter().enumerate() {
        let d: u32 = (0..3)
            .map(|c| {
                let diff = p[c] as i32 - color[c] as i32;
                (diff * diff) as u32
            })
            .sum();
        if d < best_dist {
            best = i;
            best_dist = d;
            if d == 0 {
                break;
            }
        }
    }
    best as u32
}
