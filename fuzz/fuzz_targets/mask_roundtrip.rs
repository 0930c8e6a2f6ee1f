#![no_main]

use arbitrary::Arbitrary;
use icon_engine::engine::{Icon, MaskType, PixelType, RasterBuffer};
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
struct Input {
    width: u8,
    height: u8,
    pixels: Vec<u32>,
    hidden: Vec<bool>,
    target: u8,
}

const MASK_TYPES: [MaskType; 5] = [
    MaskType::None,
    MaskType::And,
    MaskType::Xor,
    MaskType::ColorKey,
    MaskType::Alpha,
];

fuzz_target!(|input: Input| {
    let width = input.width as u32 % 32 + 1;
    let height = input.height as u32 % 32 + 1;
    let n = (width * height) as usize;

    let (Ok(mut xor), Ok(mut and)) = (
        RasterBuffer::new(width, height, PixelType::Rgb24),
        RasterBuffer::new(width, height, PixelType::Mono),
    ) else {
        return;
    };
    for i in 0..n {
        let (x, y) = ((i as u32) % width, (i as u32) / width);
        xor.set_pixel(x, y, input.pixels.get(i).copied().unwrap_or(0) & 0xFF_FFFF);
        and.set_pixel(x, y, input.hidden.get(i).copied().unwrap_or(false) as u32);
    }

    let Ok(mut icon) = Icon::new(width, height, PixelType::Rgb24, MaskType::And) else {
        return;
    };
    if icon.combine(&xor, &and).is_err() {
        return;
    }

    // Any conversion keeps the size, and the split of a combined pair returns
    // the same AND plane.
    let handle = icon.split().expect("split of a valid icon");
    assert_eq!(handle.and_mask, and);

    let target = MASK_TYPES[input.target as usize % MASK_TYPES.len()];
    if icon.set_mask_type(target).is_ok() {
        assert_eq!(icon.raster().dimensions(), icon.mask_buffer().dimensions());
        assert_eq!(icon.mask_type(), target);
    }
});
