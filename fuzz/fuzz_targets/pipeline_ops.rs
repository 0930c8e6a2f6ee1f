#![no_main]

use arbitrary::{Arbitrary, Unstructured};
use icon_engine::engine::{apply_ops, Icon, IconLimits, MaskType, PixelType};
use icon_engine::ops::{AlphaOperand, Operation};
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
struct OperationSeed {
    kind: u8,
    a: i32,
    b: i32,
    c: i32,
    d: i32,
}

const PIXEL_TYPES: [PixelType; 6] = [
    PixelType::Mono,
    PixelType::Nibble,
    PixelType::Byte,
    PixelType::Gray16,
    PixelType::Rgb24,
    PixelType::Rgb32,
];

const MASK_TYPES: [MaskType; 5] = [
    MaskType::None,
    MaskType::And,
    MaskType::Xor,
    MaskType::ColorKey,
    MaskType::Alpha,
];

fn build_icon(data: &[u8]) -> Option<Icon> {
    let width = data.first().copied().unwrap_or(0) as u32 % 48 + 1;
    let height = data.get(1).copied().unwrap_or(0) as u32 % 48 + 1;
    let pixel_type = PIXEL_TYPES[data.get(2).copied().unwrap_or(0) as usize % PIXEL_TYPES.len()];
    let mask_type = MASK_TYPES[data.get(3).copied().unwrap_or(0) as usize % MASK_TYPES.len()];

    let mut icon = Icon::new(width, height, pixel_type, mask_type).ok()?;
    let max = pixel_type.max_value();
    icon.update_raster(|r| {
        for y in 0..height {
            for x in 0..width {
                let i = (y * width + x) as usize;
                let v = u32::from_le_bytes([
                    data[i % data.len()],
                    data[(i + 1) % data.len()],
                    data[(i + 2) % data.len()],
                    0,
                ]);
                r.set_pixel(x, y, v % (max + 1));
            }
        }
    })
    .ok()?;
    Some(icon.with_limits(IconLimits::strict()))
}

fn seeds_to_ops(seeds: Vec<OperationSeed>) -> Vec<Operation> {
    seeds
        .into_iter()
        .take(16)
        .map(|seed| match seed.kind % 8 {
            0 => Operation::Stretch {
                width: seed.a.clamp(1, 256) as u32,
                height: seed.b.clamp(1, 256) as u32,
            },
            1 => Operation::Extract {
                x: seed.a as i64,
                y: seed.b as i64,
                width: seed.c.clamp(1, 256) as u32,
                height: seed.d.clamp(1, 256) as u32,
            },
            2 => Operation::Rotate {
                degrees: seed.a as f64 / 16.0,
            },
            3 => Operation::Transform {
                a: seed.a as f64 / 1024.0,
                b: seed.b as f64 / 1024.0,
                c: seed.c as f64 / 1024.0,
                d: seed.d as f64 / 1024.0,
            },
            4 => Operation::Mirror {
                vertical: seed.a & 1 == 1,
            },
            5 => Operation::ConvertMask {
                target: MASK_TYPES[seed.b.unsigned_abs() as usize % MASK_TYPES.len()],
            },
            6 => Operation::Premultiply {
                alpha: AlphaOperand::Constant(seed.c as u8),
            },
            _ => Operation::MakeEmpty,
        })
        .collect()
}

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }

    let mut unstructured = Unstructured::new(data);
    let seeds: Vec<OperationSeed> = match Vec::arbitrary(&mut unstructured) {
        Ok(v) => v,
        Err(_) => return,
    };

    let ops = seeds_to_ops(seeds);
    let Some(icon) = build_icon(data) else {
        return;
    };
    // Errors are expected for singular matrices and limit violations; only
    // panics and plane disagreement are findings.
    if let Ok(out) = apply_ops(&icon, &ops) {
        assert_eq!(out.raster().dimensions(), out.mask_buffer().dimensions());
    }
});
