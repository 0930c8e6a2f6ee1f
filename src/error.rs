// src/error.rs
//
// Unified error handling for icon-engine
// Uses thiserror for simple, type-safe error handling
//
// Error Taxonomy:
// - UserError: Invalid input, recoverable
// - ResourceLimit: Memory/dimension limits
// - LossyConversion: Warning only, the operation still completed
// - InternalBug: Library bugs (should not happen)

use std::borrow::Cow;
use std::collections::TryReserveError;
use thiserror::Error;

/// Error taxonomy for callers that need to decide how to react.
///
/// - UserError: Invalid input, recoverable by the caller
/// - ResourceLimit: Memory/dimension limits
/// - LossyConversion: reported alongside a successful result, never returned as `Err`
/// - InternalBug: Library bugs (should not happen)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCategory {
    /// Invalid input, recoverable by user
    UserError,
    /// Memory/dimension limits
    ResourceLimit,
    /// A mask conversion had to fall back to its documented lossy rule
    LossyConversion,
    /// Library bugs (should not happen)
    InternalBug,
}

/// icon-engine error types
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IconError {
    // Geometry Errors
    #[error("Invalid dimensions: width={width}, height={height}. Both must be positive")]
    InvalidDimension { width: i64, height: i64 },

    #[error("{what} is {actual_width}x{actual_height}, expected {expected_width}x{expected_height}")]
    DimensionMismatch {
        what: Cow<'static, str>,
        expected_width: u32,
        expected_height: u32,
        actual_width: u32,
        actual_height: u32,
    },

    #[error("Singular transform matrix [{a}, {b}; {c}, {d}] has no inverse")]
    SingularTransform { a: f64, b: f64, c: f64, d: f64 },

    // Mask Errors
    #[error("Mask conversion {from} -> {to} is lossy: {reason}")]
    UnsupportedMaskConversion {
        from: Cow<'static, str>,
        to: Cow<'static, str>,
        reason: Cow<'static, str>,
    },

    // Size Limit Errors
    #[error("Icon dimension {dimension} exceeds maximum {max}")]
    DimensionExceedsLimit { dimension: u32, max: u32 },

    #[error("Icon pixel count {pixels} exceeds maximum {max}")]
    PixelCountExceedsLimit { pixels: u64, max: u64 },

    #[error("Failed to allocate {bytes} bytes for {what}: {source}")]
    AllocationFailure {
        what: Cow<'static, str>,
        bytes: usize,
        #[source]
        source: TryReserveError,
    },

    // Configuration Errors
    #[error("Unknown limit policy: '{policy}'. Expected strict, lenient, custom or disabled")]
    InvalidLimitPolicy { policy: Cow<'static, str> },

    #[error("Invalid value for {name}: {value}. {reason}")]
    InvalidArgument {
        name: Cow<'static, str>,
        value: Cow<'static, str>,
        reason: Cow<'static, str>,
    },

    // Internal Errors
    #[error("Resize failed ({source_width}x{source_height} -> {target_width}x{target_height}): {message}")]
    ResizeFailed {
        source_width: u32,
        source_height: u32,
        target_width: u32,
        target_height: u32,
        message: Cow<'static, str>,
    },
}

// Constructor Helpers
impl IconError {
    pub fn invalid_dimension(width: i64, height: i64) -> Self {
        Self::InvalidDimension { width, height }
    }

    pub fn dimension_mismatch(
        what: impl Into<Cow<'static, str>>,
        expected: (u32, u32),
        actual: (u32, u32),
    ) -> Self {
        Self::DimensionMismatch {
            what: what.into(),
            expected_width: expected.0,
            expected_height: expected.1,
            actual_width: actual.0,
            actual_height: actual.1,
        }
    }

    pub fn singular_transform(a: f64, b: f64, c: f64, d: f64) -> Self {
        Self::SingularTransform { a, b, c, d }
    }

    pub fn unsupported_mask_conversion(
        from: impl Into<Cow<'static, str>>,
        to: impl Into<Cow<'static, str>>,
        reason: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::UnsupportedMaskConversion {
            from: from.into(),
            to: to.into(),
            reason: reason.into(),
        }
    }

    pub fn dimension_exceeds_limit(dimension: u32, max: u32) -> Self {
        Self::DimensionExceedsLimit { dimension, max }
    }

    pub fn pixel_count_exceeds_limit(pixels: u64, max: u64) -> Self {
        Self::PixelCountExceedsLimit { pixels, max }
    }

    pub fn allocation_failure(
        what: impl Into<Cow<'static, str>>,
        bytes: usize,
        source: TryReserveError,
    ) -> Self {
        Self::AllocationFailure {
            what: what.into(),
            bytes,
            source,
        }
    }

    pub fn invalid_limit_policy(policy: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidLimitPolicy {
            policy: policy.into(),
        }
    }

    pub fn invalid_argument(
        name: impl Into<Cow<'static, str>>,
        value: impl Into<Cow<'static, str>>,
        reason: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::InvalidArgument {
            name: name.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub fn resize_failed(
        source_dims: (u32, u32),
        target_dims: (u32, u32),
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::ResizeFailed {
            source_width: source_dims.0,
            source_height: source_dims.1,
            target_width: target_dims.0,
            target_height: target_dims.1,
            message: message.into(),
        }
    }

    /// Check if this error is recoverable (caller can fix it)
    ///
    /// Consistent with category(): UserError and ResourceLimit are recoverable,
    /// InternalBug is not. Lossy-conversion warnings never abort anything.
    pub fn is_recoverable(&self) -> bool {
        match self.category() {
            ErrorCategory::UserError
            | ErrorCategory::ResourceLimit
            | ErrorCategory::LossyConversion => true,
            ErrorCategory::InternalBug => false,
        }
    }

    /// True for kinds that are reported next to a successful result.
    pub fn is_warning(&self) -> bool {
        self.category() == ErrorCategory::LossyConversion
    }

    /// Get the error category for this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidDimension { .. }
            | Self::DimensionMismatch { .. }
            | Self::SingularTransform { .. }
            | Self::InvalidLimitPolicy { .. }
            | Self::InvalidArgument { .. } => ErrorCategory::UserError,

            Self::DimensionExceedsLimit { .. }
            | Self::PixelCountExceedsLimit { .. }
            | Self::AllocationFailure { .. } => ErrorCategory::ResourceLimit,

            Self::UnsupportedMaskConversion { .. } => ErrorCategory::LossyConversion,

            Self::ResizeFailed { .. } => ErrorCategory::InternalBug,
        }
    }
}

impl ErrorCategory {
    /// Get string representation of error category
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::UserError => "UserError",
            ErrorCategory::ResourceLimit => "ResourceLimit",
            ErrorCategory::LossyConversion => "LossyConversion",
            ErrorCategory::InternalBug => "InternalBug",
        }
    }

    /// Get the ICON_ENGINE_* error code string for this category
    pub fn code(&self) -> &'static str {
        match self {
            ErrorCategory::UserError => "ICON_ENGINE_USER_ERROR",
            ErrorCategory::ResourceLimit => "ICON_ENGINE_RESOURCE_LIMIT",
            ErrorCategory::LossyConversion => "ICON_ENGINE_LOSSY_CONVERSION",
            ErrorCategory::InternalBug => "ICON_ENGINE_INTERNAL_BUG",
        }
    }
}

// Result type alias
pub type Result<T> = std::result::Result<T, IconError>;
