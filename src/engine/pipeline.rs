// src/engine/pipeline.rs
//
// Pipeline operations: apply_ops, optimize_ops, sequence validation

use crate::engine::geometry::{normalize_degrees, AffinePlan};
use crate::engine::icon::Icon;
use crate::engine::limits::IconLimits;
use crate::error::{IconError, Result};
use crate::ops::{AlphaOperand, Operation, OperationContract, OperationRequirement};

#[cfg(feature = "op-debug")]
use once_cell::sync::Lazy;
#[cfg(feature = "op-debug")]
use tracing::debug;

/// Env var that switches on operation logging (with the `op-debug` feature).
pub const ENV_DEBUG_OPS: &str = "ICON_ENGINE_DEBUG_OPS";

// Optional debug logging for applied operations and buffer swaps.
// Enabled only when feature "op-debug" is on AND env ICON_ENGINE_DEBUG_OPS is set.
#[cfg(feature = "op-debug")]
static OP_DEBUG_ENABLED: Lazy<bool> = Lazy::new(|| std::env::var(ENV_DEBUG_OPS).is_ok());

#[cfg(feature = "op-debug")]
pub(crate) fn log_op(stage: &str, before: (u32, u32), after: (u32, u32)) {
    if *OP_DEBUG_ENABLED {
        debug!(
            target: "icon_engine::ops",
            %stage,
            from_width = before.0,
            from_height = before.1,
            width = after.0,
            height = after.1,
            "apply"
        );
    }
}

#[cfg(not(feature = "op-debug"))]
#[inline(always)]
pub(crate) fn log_op(_stage: &str, _before: (u32, u32), _after: (u32, u32)) {}

/// Icon produced by a pipeline run plus the lossy-conversion warnings raised
/// along the way.
#[derive(Debug)]
pub struct TrackedIcon {
    pub icon: Icon,
    pub warnings: Vec<IconError>,
}

/// Size the icon will have after `op`, given its size before.
fn simulate_size(op: &Operation, dims: (u32, u32)) -> Result<(u32, u32)> {
    match op {
        Operation::Stretch { width, height } | Operation::Extract { width, height, .. } => {
            if *width == 0 || *height == 0 {
                return Err(IconError::invalid_dimension(*width as i64, *height as i64));
            }
            Ok((*width, *height))
        }
        Operation::Rotate { degrees } => {
            if !degrees.is_finite() {
                return Err(IconError::invalid_argument(
                    "degrees",
                    degrees.to_string(),
                    "rotation angle must be finite",
                ));
            }
            if normalize_degrees(*degrees) == 0.0 {
                return Ok(dims);
            }
            let [a, b, c, d] = crate::engine::geometry::rotation_matrix(*degrees);
            let plan = AffinePlan::new(dims.0, dims.1, a, b, c, d)?;
            Ok((plan.width, plan.height))
        }
        Operation::Transform { a, b, c, d } => {
            let plan = AffinePlan::new(dims.0, dims.1, *a, *b, *c, *d)?;
            Ok((plan.width, plan.height))
        }
        Operation::Mirror { .. }
        | Operation::ConvertMask { .. }
        | Operation::MakeEmpty
        | Operation::Premultiply { .. } => Ok(dims),
    }
}

fn check_contract(
    op: &Operation,
    contract: &OperationContract,
    before: (u32, u32),
    after: (u32, u32),
    limits: &IconLimits,
) -> Result<()> {
    if contract.requires.contains(OperationRequirement::WITHIN_LIMITS) {
        limits.enforce(after.0, after.1)?;
    }
    if contract.requires.contains(OperationRequirement::MATCHING_SIZE) {
        if let Operation::Premultiply {
            alpha: AlphaOperand::Plane(plane),
        } = op
        {
            if plane.dimensions() != before {
                return Err(IconError::dimension_mismatch("alpha buffer", before, plane.dimensions()));
            }
        }
    }
    Ok(())
}

/// Walk the sequence on sizes alone; fails before any pixel work is done.
pub fn validate_operation_sequence(dims: (u32, u32), ops: &[Operation], limits: &IconLimits) -> Result<()> {
    let mut dims = dims;
    for op in ops {
        let contract = op.contract();
        let next = simulate_size(op, dims)?;
        check_contract(op, &contract, dims, next, limits)?;
        dims = next;
    }
    Ok(())
}

#[inline]
fn is_right_angle(degrees: f64) -> bool {
    degrees.is_finite() && normalize_degrees(degrees) % 90.0 == 0.0
}

/// Optimize a sequence without changing its result.
///
/// - a stretch to the size the previous stretch produced is dropped
/// - a mirror followed by the same mirror cancels out
/// - consecutive right-angle rotations fold into one (or none)
pub fn optimize_ops(ops: &[Operation]) -> Vec<Operation> {
    if ops.len() < 2 {
        return ops.to_vec();
    }

    let mut optimized: Vec<Operation> = Vec::with_capacity(ops.len());
    for op in ops {
        let merged = match (optimized.last(), op) {
            (
                Some(Operation::Stretch { width: w1, height: h1 }),
                Operation::Stretch { width: w2, height: h2 },
            ) if (w1, h1) == (w2, h2) => None,
            (Some(Operation::Mirror { vertical: v1 }), Operation::Mirror { vertical: v2 })
                if v1 == v2 =>
            {
                optimized.pop();
                None
            }
            (Some(Operation::Rotate { degrees: d1 }), Operation::Rotate { degrees: d2 })
                if is_right_angle(*d1) && is_right_angle(*d2) =>
            {
                let sum = normalize_degrees(normalize_degrees(*d1) + normalize_degrees(*d2));
                optimized.pop();
                (sum != 0.0).then_some(Operation::Rotate { degrees: sum })
            }
            _ => Some(op.clone()),
        };
        if let Some(op) = merged {
            optimized.push(op);
        }
    }
    optimized
}

/// Apply `ops` to a copy of `icon`, collecting lossy-conversion warnings.
///
/// The input icon is never modified. Validation runs first on sizes alone, so
/// an impossible sequence fails before any buffer is allocated.
pub fn apply_ops_tracked(icon: &Icon, ops: &[Operation]) -> Result<TrackedIcon> {
    validate_operation_sequence(icon.dimensions(), ops, icon.limits())?;
    let optimized_ops = optimize_ops(ops);

    log_op("dup (materialize for ops)", icon.dimensions(), icon.dimensions());
    let mut out = icon.dup()?;
    let mut warnings = Vec::new();

    for op in &optimized_ops {
        let before = out.dimensions();
        match op {
            Operation::Stretch { width, height } => out.stretch(*width, *height)?,
            Operation::Rotate { degrees } => out.rotate(*degrees)?,
            Operation::Transform { a, b, c, d } => out.transform(*a, *b, *c, *d)?,
            Operation::Extract {
                x,
                y,
                width,
                height,
            } => out = out.extract(*x, *y, *width, *height)?,
            Operation::Mirror { vertical } => out.mirror(*vertical)?,
            Operation::ConvertMask { target } => {
                if let Some(warning) = out.set_mask_type(*target)? {
                    warnings.push(warning);
                }
            }
            Operation::MakeEmpty => out.make_empty()?,
            Operation::Premultiply { alpha } => out.premultiply_alpha(alpha.as_source())?,
        }
        log_op(op.contract().name, before, out.dimensions());
    }

    Ok(TrackedIcon {
        icon: out,
        warnings,
    })
}

/// Apply `ops` to a copy of `icon`.
pub fn apply_ops(icon: &Icon, ops: &[Operation]) -> Result<Icon> {
    apply_ops_tracked(icon, ops).map(|tracked| tracked.icon)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::mask::MaskType;
    use crate::engine::raster::PixelType;
    use image::GrayImage;

    fn icon(w: u32, h: u32) -> Icon {
        let mut icon = Icon::new(w, h, PixelType::Rgb24, MaskType::And).unwrap();
        icon.update_raster(|r| {
            for y in 0..h {
                for x in 0..w {
                    r.set_pixel(x, y, (x << 8) | y);
                }
            }
        })
        .unwrap();
        icon
    }

    #[test]
    fn test_optimize_drops_repeated_stretch() {
        let ops = vec![
            Operation::Stretch { width: 10, height: 10 },
            Operation::Stretch { width: 10, height: 10 },
            Operation::Mirror { vertical: false },
        ];
        assert_eq!(
            optimize_ops(&ops),
            vec![
                Operation::Stretch { width: 10, height: 10 },
                Operation::Mirror { vertical: false },
            ]
        );

        let ops = vec![
            Operation::Stretch { width: 10, height: 10 },
            Operation::Stretch { width: 20, height: 5 },
        ];
        assert_eq!(optimize_ops(&ops), ops);
    }

    #[test]
    fn test_chained_stretches_match_sequential() {
        let mut src = Icon::new(2, 1, PixelType::Rgb24, MaskType::And).unwrap();
        src.set_pixel(1, 0, 0xFF_FFFF).unwrap();
        let ops = [
            Operation::Stretch { width: 1, height: 1 },
            Operation::Stretch { width: 2, height: 1 },
        ];
        let piped = apply_ops(&src, &ops).unwrap();

        let mut sequential = src.dup().unwrap();
        sequential.stretch(1, 1).unwrap();
        sequential.stretch(2, 1).unwrap();
        assert_eq!(piped, sequential);
        assert_eq!(piped.pixel(0, 0), piped.pixel(1, 0));
        assert_ne!(piped.pixel(0, 0), Some(0));
    }

    #[test]
    fn test_optimize_cancels_mirror_pairs() {
        let ops = vec![
            Operation::Mirror { vertical: true },
            Operation::Mirror { vertical: true },
            Operation::Mirror { vertical: false },
        ];
        assert_eq!(optimize_ops(&ops), vec![Operation::Mirror { vertical: false }]);
    }

    #[test]
    fn test_optimize_folds_right_angles() {
        let ops = vec![
            Operation::Rotate { degrees: 90.0 },
            Operation::Rotate { degrees: -90.0 },
        ];
        assert!(optimize_ops(&ops).is_empty());

        let ops = vec![
            Operation::Rotate { degrees: 90.0 },
            Operation::Rotate { degrees: 180.0 },
        ];
        assert_eq!(optimize_ops(&ops), vec![Operation::Rotate { degrees: 270.0 }]);

        let ops = vec![
            Operation::Rotate { degrees: 90.0 },
            Operation::Rotate { degrees: 45.0 },
        ];
        assert_eq!(optimize_ops(&ops), ops);
    }

    #[test]
    fn test_folded_rotation_matches_sequential() {
        let src = icon(3, 2);
        let ops = vec![
            Operation::Rotate { degrees: 90.0 },
            Operation::Rotate { degrees: 90.0 },
        ];
        let folded = apply_ops(&src, &ops).unwrap();
        let mut sequential = src.dup().unwrap();
        sequential.rotate(90.0).unwrap();
        sequential.rotate(90.0).unwrap();
        assert_eq!(folded, sequential);
    }

    #[test]
    fn test_apply_ops_does_not_touch_input() {
        let src = icon(4, 4);
        let before = src.dup().unwrap();
        let out = apply_ops(
            &src,
            &[
                Operation::Stretch { width: 8, height: 2 },
                Operation::Rotate { degrees: 30.0 },
            ],
        )
        .unwrap();
        assert_eq!(src, before);
        assert_ne!(out.dimensions(), src.dimensions());
        assert_eq!(out.raster().dimensions(), out.mask_buffer().dimensions());
    }

    #[test]
    fn test_validation_fails_before_work() {
        let src = icon(4, 4).with_limits(IconLimits::custom().with_max_dimension(16));
        let err = apply_ops(
            &src,
            &[
                Operation::Stretch { width: 16, height: 16 },
                Operation::Rotate { degrees: 45.0 },
            ],
        )
        .unwrap_err();
        assert!(matches!(err, IconError::DimensionExceedsLimit { .. }));

        let err = apply_ops(&src, &[Operation::Transform { a: 0.0, b: 0.0, c: 0.0, d: 1.0 }])
            .unwrap_err();
        assert!(matches!(err, IconError::SingularTransform { .. }));
    }

    #[test]
    fn test_premultiply_plane_checked_against_simulated_size() {
        let src = icon(4, 4);
        let ok = [
            Operation::Stretch { width: 2, height: 2 },
            Operation::Premultiply {
                alpha: AlphaOperand::Plane(GrayImage::new(2, 2)),
            },
        ];
        assert!(apply_ops(&src, &ok).is_ok());

        let bad = [Operation::Premultiply {
            alpha: AlphaOperand::Plane(GrayImage::new(2, 2)),
        }];
        let err = apply_ops(&src, &bad).unwrap_err();
        assert!(matches!(err, IconError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_tracked_collects_warnings() {
        let mut src = Icon::new(2, 1, PixelType::Rgb24, MaskType::Alpha).unwrap();
        src.set_mask(vec![255, 60, 0, 0]).unwrap();
        let tracked =
            apply_ops_tracked(&src, &[Operation::ConvertMask { target: MaskType::And }]).unwrap();
        assert_eq!(tracked.warnings.len(), 1);
        assert!(tracked.warnings[0].is_warning());
        assert_eq!(tracked.icon.mask_type(), MaskType::And);
    }

    #[test]
    fn test_icon_apply_swaps_only_on_success() {
        let mut target = icon(3, 3);
        target.apply(&[Operation::Mirror { vertical: false }]).unwrap();
        assert_eq!(target.pixel(0, 0), Some(2 << 8));

        let before = target.dup().unwrap();
        let err = target.apply(&[
            Operation::Mirror { vertical: true },
            Operation::Extract { x: 0, y: 0, width: 0, height: 1 },
        ]);
        assert!(err.is_err());
        assert_eq!(target, before);
    }
}
