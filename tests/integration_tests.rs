// tests/integration_tests.rs
//
// End-to-end tests for icon-engine: public API, pipelines, batches and
// interop with the `image` crate.

use icon_engine::engine::{
    apply_ops, apply_ops_tracked, compute_stats, create_empty_icon, line_size, process_batch,
    process_batch_with_concurrency, validate_operation_sequence, AlphaSource, AutoMasking, Icon,
    IconLimits, LimitPolicy, MaskType, PixelType, RasterBuffer,
};
use icon_engine::error::IconError;
use icon_engine::ops::{AlphaOperand, Operation};
use image::{GrayImage, Luma, Rgb, Rgba, RgbaImage};

const RED: u32 = 0xFF0000;

fn solid(width: u32, height: u32, value: u32, mask_type: MaskType) -> Icon {
    let mut icon = create_empty_icon(width as i64, height as i64, PixelType::Rgb24, mask_type).unwrap();
    icon.update_raster(|r| r.fill(value)).unwrap();
    icon
}

fn count_transparent(icon: &Icon) -> usize {
    let mut n = 0;
    for y in 0..icon.height() {
        for x in 0..icon.width() {
            if icon.mask_buffer().is_transparent(icon.raster(), x, y) {
                n += 1;
            }
        }
    }
    n
}

mod construction_tests {
    use super::*;

    #[test]
    fn test_create_empty_icon_3x3_rgb24_and() {
        let icon = create_empty_icon(3, 3, PixelType::Rgb24, MaskType::And).unwrap();
        assert_eq!(icon.dimensions(), (3, 3));
        assert_eq!(icon.raster().line_size(), 12);
        assert_eq!(icon.mask_buffer().line_size(), 4);
        assert!(icon.raster().data().iter().all(|&b| b == 0));
        assert_eq!(count_transparent(&icon), 0);
    }

    #[test]
    fn test_line_sizes_are_four_byte_aligned() {
        assert_eq!(line_size(1, 1), 4);
        assert_eq!(line_size(33, 1), 8);
        assert_eq!(line_size(3, 24), 12);
        assert_eq!(line_size(5, 16), 12);
        for pixel_type in [PixelType::Mono, PixelType::Nibble, PixelType::Byte, PixelType::Rgb32] {
            let raster = RasterBuffer::new(7, 2, pixel_type).unwrap();
            assert_eq!(raster.line_size() % 4, 0);
            assert_eq!(raster.data().len(), raster.line_size() * 2);
        }
    }

    #[test]
    fn test_from_parts_rejects_size_disagreement() {
        let raster = RasterBuffer::new(4, 4, PixelType::Byte).unwrap();
        let mask = icon_engine::engine::MaskBuffer::opaque(4, 3, MaskType::And).unwrap();
        let err = Icon::from_parts(raster, mask).unwrap_err();
        assert!(matches!(err, IconError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_parts_round_trip() {
        let icon = solid(3, 2, RED, MaskType::Xor);
        let (raster, mask) = icon.dup().unwrap().into_parts();
        assert_eq!(raster.pixel_type(), PixelType::from_bits(24).unwrap());
        assert!(PixelType::from_bits(12).is_err());
        let rebuilt = Icon::from_parts(raster.clone(), mask).unwrap();
        assert_eq!(rebuilt, icon);
        assert_eq!(raster.into_raw().len(), 12 * 2);
    }
}

mod geometry_tests {
    use super::*;

    #[test]
    fn test_stretch_2x2_red_to_4x4() {
        let mut icon = solid(2, 2, RED, MaskType::And);
        icon.stretch(4, 4).unwrap();
        assert_eq!(icon.dimensions(), (4, 4));
        for y in 0..4 {
            for x in 0..4 {
                assert_eq!(icon.pixel(x, y), Some(RED));
            }
        }
        assert_eq!(count_transparent(&icon), 0);
    }

    #[test]
    fn test_shrink_averages_direct_colour() {
        let mut icon = Icon::new(2, 1, PixelType::Rgb24, MaskType::None).unwrap();
        icon.set_pixel(0, 0, 0x000000).unwrap();
        icon.set_pixel(1, 0, 0xC8C8C8).unwrap();
        icon.stretch(1, 1).unwrap();
        assert_eq!(icon.pixel(0, 0), Some(0x646464));
    }

    #[test]
    fn test_rotate_90_moves_corner() {
        let mut icon = Icon::new(3, 2, PixelType::Byte, MaskType::And).unwrap();
        // top-right goes to top-left under a counter-clockwise quarter turn
        icon.set_pixel(2, 0, 200).unwrap();
        icon.rotate(90.0).unwrap();
        assert_eq!(icon.dimensions(), (2, 3));
        assert_eq!(icon.pixel(0, 0), Some(200));
    }

    #[test]
    fn test_rotate_45_uncovers_corners() {
        let mut icon = solid(10, 10, RED, MaskType::None);
        icon.rotate(45.0).unwrap();
        assert_eq!(icon.dimensions(), (15, 15));
        assert_eq!(icon.mask_type(), MaskType::And);
        assert!(icon.mask_buffer().is_transparent(icon.raster(), 0, 0));
        assert!(!icon.mask_buffer().is_transparent(icon.raster(), 7, 7));
        assert_eq!(icon.pixel(7, 7), Some(RED));
    }

    #[test]
    fn test_transform_shear_grows_width() {
        let mut icon = solid(4, 4, RED, MaskType::Alpha);
        icon.transform(1.0, 1.0, 0.0, 1.0).unwrap();
        assert_eq!(icon.dimensions(), (8, 4));
        assert!(count_transparent(&icon) > 0);
    }

    #[test]
    fn test_extract_keeps_original() {
        let icon = solid(4, 4, RED, MaskType::And);
        let part = icon.extract(2, 2, 4, 4).unwrap();
        assert_eq!(part.dimensions(), (4, 4));
        assert_eq!(count_transparent(&part), 12);
        assert_eq!(icon.dimensions(), (4, 4));
        assert_eq!(count_transparent(&icon), 0);
    }

    #[test]
    fn test_color_key_background_after_rotate() {
        let mut icon = solid(6, 6, RED, MaskType::And);
        icon.set_mask_type(MaskType::ColorKey).unwrap();
        let key = icon.mask_buffer().key_value(icon.raster());
        assert_ne!(key, RED);
        icon.rotate(30.0).unwrap();
        assert_eq!(icon.pixel(0, 0), Some(key));
        assert!(icon.mask_buffer().is_transparent(icon.raster(), 0, 0));
    }
}

mod mask_tests {
    use super::*;

    #[test]
    fn test_split_combine_round_trip() {
        let mut icon = solid(5, 5, 0x123456, MaskType::And);
        let mut data = icon.mask().to_vec();
        data[0] = 0b1000_0000;
        icon.set_mask(data).unwrap();

        let handle = icon.split().unwrap();
        assert_eq!(handle.and_mask.pixel_type(), PixelType::Mono);
        assert_eq!(handle.and_mask.get_pixel(0, 0), 1);
        assert_eq!(handle.xor_mask.get_pixel(0, 0), 0);

        let mut rebuilt = Icon::new(5, 5, PixelType::Rgb24, MaskType::And).unwrap();
        rebuilt.combine(&handle.xor_mask, &handle.and_mask).unwrap();
        assert_eq!(rebuilt.split().unwrap(), handle);
    }

    #[test]
    fn test_alpha_survives_split_combine() {
        let mut icon = solid(4, 1, RED, MaskType::Alpha);
        icon.set_mask(vec![255, 200, 90, 0]).unwrap();
        let handle = icon.split().unwrap();
        let before = icon.dup().unwrap();
        icon.combine(&handle.xor_mask, &handle.and_mask).unwrap();
        assert_eq!(icon.mask_type(), MaskType::Alpha);
        assert_eq!(icon.mask(), before.mask());
    }

    #[test]
    fn test_auto_masking_follows_raster() {
        let mut icon = solid(3, 3, 0x00FF00, MaskType::And);
        icon.set_pixel(1, 1, RED).unwrap();
        icon.set_auto_masking(AutoMasking::Auto);
        assert_eq!(count_transparent(&icon), 8);

        icon.set_mask_color(Rgb([255, 0, 0]));
        icon.set_auto_masking(AutoMasking::MaskColor);
        assert_eq!(count_transparent(&icon), 1);
        assert!(icon.mask_buffer().is_transparent(icon.raster(), 1, 1));

        icon.set_pixel(0, 0, RED).unwrap();
        assert_eq!(count_transparent(&icon), 2);
    }

    #[test]
    fn test_mask_index_on_indexed_icon() {
        let mut icon = Icon::new(2, 2, PixelType::Nibble, MaskType::Xor).unwrap();
        icon.set_pixel(1, 0, 5).unwrap();
        icon.set_mask_index(5);
        icon.set_auto_masking(AutoMasking::MaskIndex);
        assert_eq!(count_transparent(&icon), 1);
        assert_eq!(icon.mask_index(), 5);
    }
}

mod pipeline_tests {
    use super::*;

    #[test]
    fn test_pipeline_matches_manual_calls() {
        let icon = solid(8, 4, RED, MaskType::And);
        let ops = vec![
            Operation::Rotate { degrees: 90.0 },
            Operation::Mirror { vertical: false },
            Operation::Stretch {
                width: 16,
                height: 16,
            },
        ];
        let piped = apply_ops(&icon, &ops).unwrap();

        let mut manual = icon.dup().unwrap();
        manual.rotate(90.0).unwrap();
        manual.mirror(false).unwrap();
        manual.stretch(16, 16).unwrap();
        assert_eq!(piped, manual);
    }

    #[test]
    fn test_pipeline_reports_lossy_warnings() {
        let mut icon = solid(2, 1, RED, MaskType::Alpha);
        icon.set_mask(vec![255, 64, 0, 0]).unwrap();
        let tracked = apply_ops_tracked(
            &icon,
            &[
                Operation::ConvertMask {
                    target: MaskType::And,
                },
                Operation::Stretch {
                    width: 4,
                    height: 2,
                },
            ],
        )
        .unwrap();
        assert_eq!(tracked.warnings.len(), 1);
        assert!(tracked.warnings[0].is_warning());
        assert_eq!(tracked.icon.mask_type(), MaskType::And);
    }

    #[test]
    fn test_pipeline_validation_catches_mismatched_alpha_plane() {
        let ops = vec![
            Operation::Stretch {
                width: 3,
                height: 3,
            },
            Operation::Premultiply {
                alpha: AlphaOperand::Plane(GrayImage::new(2, 2)),
            },
        ];
        let err = validate_operation_sequence((2, 2), &ops, &IconLimits::default()).unwrap_err();
        assert!(matches!(err, IconError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_failed_apply_leaves_icon_alone() {
        let mut icon = solid(4, 4, RED, MaskType::And);
        let before = icon.dup().unwrap();
        let err = icon
            .apply(&[
                Operation::Mirror { vertical: true },
                Operation::Transform {
                    a: 0.0,
                    b: 0.0,
                    c: 0.0,
                    d: 0.0,
                },
            ])
            .unwrap_err();
        assert!(matches!(err, IconError::SingularTransform { .. }));
        assert_eq!(icon, before);
    }

    #[test]
    fn test_limit_policy_from_name() {
        let limits = IconLimits::apply_policy(LimitPolicy::parse("strict").unwrap());
        let icon = solid(2, 2, RED, MaskType::And).with_limits(limits);
        let err = apply_ops(
            &icon,
            &[Operation::Stretch {
                width: 2048,
                height: 2,
            }],
        )
        .unwrap_err();
        assert!(matches!(err, IconError::DimensionExceedsLimit { .. }));
        assert!(LimitPolicy::parse("paranoid").is_err());
    }
}

mod batch_tests {
    use super::*;

    #[test]
    fn test_batch_results_in_input_order() {
        let icons: Vec<Icon> = (1..=6).map(|n| solid(n, n, RED, MaskType::And)).collect();
        let ops = [Operation::Rotate { degrees: 90.0 }];
        let results = process_batch(&icons, &ops);
        assert_eq!(results.len(), icons.len());
        for (icon, result) in icons.iter().zip(&results) {
            let out = result.as_ref().unwrap();
            assert_eq!(out.dimensions(), (icon.height(), icon.width()));
        }
    }

    #[test]
    fn test_batch_errors_stay_per_icon() {
        let icons = vec![
            solid(2, 2, RED, MaskType::And),
            solid(3, 3, RED, MaskType::And),
        ];
        let ops = [Operation::Premultiply {
            alpha: AlphaOperand::Plane(GrayImage::new(2, 2)),
        }];
        let results = process_batch_with_concurrency(&icons, &ops, 2).unwrap();
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(IconError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_batch_rejects_silly_concurrency() {
        let icons = vec![solid(1, 1, RED, MaskType::None)];
        assert!(process_batch_with_concurrency(&icons, &[], 1_000_000).is_err());
    }
}

mod alpha_and_stats_tests {
    use super::*;

    #[test]
    fn test_premultiply_constant_half() {
        let mut icon = solid(2, 2, 0xFF8000, MaskType::And);
        icon.premultiply_alpha(AlphaSource::Constant(128)).unwrap();
        assert_eq!(icon.pixel(0, 0), Some(0x804000));
    }

    #[test]
    fn test_premultiply_plane_per_pixel() {
        let mut icon = solid(2, 1, 0xFFFFFF, MaskType::None);
        let plane = GrayImage::from_fn(2, 1, |x, _| Luma([if x == 0 { 0 } else { 255 }]));
        icon.premultiply_alpha(AlphaSource::Plane(&plane)).unwrap();
        assert_eq!(icon.pixel(0, 0), Some(0));
        assert_eq!(icon.pixel(1, 0), Some(0xFFFFFF));
    }

    #[test]
    fn test_stats_cache_invalidated_by_edits() {
        let mut icon = Icon::new(2, 1, PixelType::Byte, MaskType::None).unwrap();
        icon.set_pixel(0, 0, 10).unwrap();
        icon.set_pixel(1, 0, 30).unwrap();
        assert!(!icon.stats_cached());
        let stats = icon.stats().to_vec();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].mean, 20.0);
        assert_eq!((stats[0].range_lo, stats[0].range_hi), (10, 30));
        assert!(icon.stats_cached());

        icon.set_pixel(1, 0, 10).unwrap();
        assert!(!icon.stats_cached());
        assert_eq!(icon.stats()[0].variance, 0.0);
        assert_eq!(compute_stats(icon.raster()), icon.stats().to_vec());
    }
}

mod interop_tests {
    use super::*;

    #[test]
    fn test_rgba_through_pipeline() {
        let img = RgbaImage::from_fn(4, 4, |x, y| {
            Rgba([255, 0, 0, if (x + y) % 2 == 0 { 255 } else { 0 }])
        });
        let icon = Icon::from_rgba_image(&img, MaskType::And).unwrap();
        assert_eq!(count_transparent(&icon), 8);

        let out = apply_ops(&icon, &[Operation::Mirror { vertical: false }]).unwrap();
        let rgba = out.to_rgba_image();
        assert_eq!(rgba.get_pixel(0, 0)[3], 0);
        assert_eq!(rgba.get_pixel(3, 0), &Rgba([255, 0, 0, 255]));
    }
}
