// src/ops.rs
//
// Lazy pipeline operations.
// These are cheap to create and store - the expensive work happens in apply_ops().

use crate::engine::{AlphaSource, MaskType};
use bitflags::bitflags;
use image::GrayImage;

/// Icon operations that can be queued and applied as one unit.
///
/// Each operation is self-contained: it owns its parameters, including any
/// alpha plane, so a list can be stored and replayed on many icons.
#[derive(Clone, Debug, PartialEq)]
pub enum Operation {
    /// Resize both planes to exactly `width` x `height`
    Stretch { width: u32, height: u32 },

    /// Rotate counter-clockwise by any angle, canvas grows to fit
    Rotate { degrees: f64 },

    /// General 2x2 linear map `x' = a*x + b*y`, `y' = c*x + d*y`
    Transform { a: f64, b: f64, c: f64, d: f64 },

    /// Copy a region; parts outside the icon become transparent
    Extract { x: i64, y: i64, width: u32, height: u32 },

    /// Flip top-to-bottom (`vertical`) or left-to-right
    Mirror { vertical: bool },

    /// Convert the mask kind (lossy conversions are reported as warnings)
    ConvertMask { target: MaskType },

    /// Zero the raster, make the mask opaque
    MakeEmpty,

    /// Multiply colour channels by alpha / 255
    Premultiply { alpha: AlphaOperand },
}

/// Owned alpha for `Operation::Premultiply`.
#[derive(Clone, Debug, PartialEq)]
pub enum AlphaOperand {
    Constant(u8),
    Plane(GrayImage),
}

impl AlphaOperand {
    pub fn as_source(&self) -> AlphaSource<'_> {
        match self {
            AlphaOperand::Constant(a) => AlphaSource::Constant(*a),
            AlphaOperand::Plane(plane) => AlphaSource::Plane(plane),
        }
    }
}

bitflags! {
    /// What an operation needs to hold before it runs.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct OperationRequirement: u32 {
        /// An operand's size must equal the icon's size at that point
        const MATCHING_SIZE = 1 << 0;
        /// The new size must pass the icon's limits
        const WITHIN_LIMITS = 1 << 1;
    }
}

bitflags! {
    /// What an operation changes.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct OperationEffect: u32 {
        const RESIZES = 1 << 0;
        const REWRITES_RASTER = 1 << 1;
        const REWRITES_MASK = 1 << 2;
        /// Destination pixels may have no source and come back transparent
        const MAY_UNCOVER = 1 << 3;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OperationContract {
    pub name: &'static str,
    pub requires: OperationRequirement,
    pub effects: OperationEffect,
}

impl Operation {
    pub fn contract(&self) -> OperationContract {
        use OperationEffect as E;
        use OperationRequirement as R;
        let geometry = E::RESIZES | E::REWRITES_RASTER | E::REWRITES_MASK;
        let (name, requires, effects) = match self {
            Operation::Stretch { .. } => ("stretch", R::WITHIN_LIMITS, geometry),
            Operation::Rotate { .. } => ("rotate", R::WITHIN_LIMITS, geometry | E::MAY_UNCOVER),
            Operation::Transform { .. } => {
                ("transform", R::WITHIN_LIMITS, geometry | E::MAY_UNCOVER)
            }
            Operation::Extract { .. } => ("extract", R::WITHIN_LIMITS, geometry | E::MAY_UNCOVER),
            Operation::Mirror { .. } => ("mirror", R::empty(), E::REWRITES_RASTER | E::REWRITES_MASK),
            Operation::ConvertMask { target } => {
                let effects = if *target == MaskType::ColorKey {
                    E::REWRITES_RASTER | E::REWRITES_MASK
                } else {
                    E::REWRITES_MASK
                };
                ("convert_mask", R::empty(), effects)
            }
            Operation::MakeEmpty => ("make_empty", R::empty(), E::REWRITES_RASTER | E::REWRITES_MASK),
            Operation::Premultiply { alpha } => {
                let requires = match alpha {
                    AlphaOperand::Plane(_) => R::MATCHING_SIZE,
                    AlphaOperand::Constant(_) => R::empty(),
                };
                ("premultiply", requires, E::REWRITES_RASTER | E::REWRITES_MASK)
            }
        };
        OperationContract {
            name,
            requires,
            effects,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geometry_contracts_resize() {
        for op in [
            Operation::Stretch { width: 1, height: 1 },
            Operation::Rotate { degrees: 10.0 },
            Operation::Extract { x: 0, y: 0, width: 1, height: 1 },
        ] {
            let contract = op.contract();
            assert!(contract.effects.contains(OperationEffect::RESIZES), "{}", contract.name);
            assert!(contract.requires.contains(OperationRequirement::WITHIN_LIMITS));
        }
        assert!(!Operation::Mirror { vertical: true }
            .contract()
            .effects
            .contains(OperationEffect::RESIZES));
    }

    #[test]
    fn test_color_key_conversion_rewrites_raster() {
        let to_key = Operation::ConvertMask { target: MaskType::ColorKey }.contract();
        assert!(to_key.effects.contains(OperationEffect::REWRITES_RASTER));
        let to_and = Operation::ConvertMask { target: MaskType::And }.contract();
        assert_eq!(to_and.effects, OperationEffect::REWRITES_MASK);
    }

    #[test]
    fn test_premultiply_plane_needs_matching_size() {
        let plane = Operation::Premultiply {
            alpha: AlphaOperand::Plane(GrayImage::new(2, 2)),
        };
        assert!(plane.contract().requires.contains(OperationRequirement::MATCHING_SIZE));
        let constant = Operation::Premultiply {
            alpha: AlphaOperand::Constant(9),
        };
        assert!(constant.contract().requires.is_empty());
    }
}
