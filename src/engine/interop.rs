// src/engine/interop.rs
//
// Conversion between icons and `image` crate buffers.

use crate::engine::icon::Icon;
use crate::engine::mask::{MaskBuffer, MaskType};
use crate::engine::raster::{pack_rgb, PixelType, RasterBuffer};
use crate::error::{IconError, Result};
use image::{Rgb, Rgba, RgbaImage};

impl Icon {
    /// Composite raster and mask into straight (non-premultiplied) RGBA.
    pub fn to_rgba_image(&self) -> RgbaImage {
        let raster = self.raster();
        let mask = self.mask_buffer();
        RgbaImage::from_fn(self.width(), self.height(), |x, y| {
            let Rgb([r, g, b]) = raster.color_at(x, y);
            Rgba([r, g, b, mask.opacity(raster, x, y)])
        })
    }

    /// Build an `Rgb24` icon whose mask comes from the alpha channel.
    ///
    /// Non-alpha targets follow the usual conversion rules (alpha < 128 is
    /// transparent); the lossy-conversion warning is not reported here.
    pub fn from_rgba_image(image: &RgbaImage, mask_type: MaskType) -> Result<Self> {
        let (w, h) = image.dimensions();
        if w == 0 || h == 0 {
            return Err(IconError::invalid_dimension(w as i64, h as i64));
        }
        let mut raster = RasterBuffer::new(w, h, PixelType::Rgb24)?;
        let mut mask = MaskBuffer::opaque(w, h, MaskType::Alpha)?;
        for (x, y, px) in image.enumerate_pixels() {
            let Rgba([r, g, b, a]) = *px;
            raster.set_pixel(x, y, pack_rgb(Rgb([r, g, b])));
            mask.set_opacity(x, y, a);
        }
        let mut icon = Icon::from_parts(raster, mask)?;
        if mask_type != MaskType::Alpha {
            icon.set_mask_type(mask_type)?;
        }
        Ok(icon)
    }
}
