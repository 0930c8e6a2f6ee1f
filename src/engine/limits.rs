// src/engine/limits.rs
//
// Size limit configuration and enforcement helpers.
//
// Limits are checked before any new plane is allocated, so an oversized
// stretch/rotate/transform request fails without touching the icon.

use crate::engine::{MAX_DIMENSION, MAX_PIXELS};
use crate::error::IconError;

const STRICT_MAX_DIMENSION: u32 = 1024; // icons and cursors, generous
const STRICT_MAX_PIXELS: u64 = 1024 * 1024;
const LENIENT_MAX_DIMENSION: u32 = 16384;
const LENIENT_MAX_PIXELS: u64 = 64_000_000; // below global MAX_PIXELS

/// Env var selecting the policy used by `IconLimits::from_env`.
pub const ENV_POLICY: &str = "ICON_ENGINE_LIMITS";
/// Env var overriding the per-side maximum.
pub const ENV_MAX_DIMENSION: &str = "ICON_ENGINE_MAX_DIMENSION";
/// Env var overriding the pixel count maximum.
pub const ENV_MAX_PIXELS: &str = "ICON_ENGINE_MAX_PIXELS";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LimitPolicy {
    Disabled,
    Strict,
    Lenient,
    Custom,
}

impl LimitPolicy {
    pub fn parse(value: &str) -> Result<Self, IconError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "disabled" | "off" | "none" => Ok(Self::Disabled),
            "strict" => Ok(Self::Strict),
            "lenient" => Ok(Self::Lenient),
            "custom" => Ok(Self::Custom),
            _ => Err(IconError::invalid_limit_policy(value.to_string())),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IconLimits {
    pub enabled: bool,
    pub policy: LimitPolicy,
    pub max_dimension: Option<u32>,
    pub max_pixels: Option<u64>,
}

impl Default for IconLimits {
    fn default() -> Self {
        Self::disabled()
    }
}

impl IconLimits {
    /// Only the crate-wide hard caps apply.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            policy: LimitPolicy::Disabled,
            max_dimension: None,
            max_pixels: None,
        }
    }

    pub fn strict() -> Self {
        Self {
            enabled: true,
            policy: LimitPolicy::Strict,
            max_dimension: Some(STRICT_MAX_DIMENSION),
            max_pixels: Some(STRICT_MAX_PIXELS),
        }
    }

    pub fn lenient() -> Self {
        Self {
            enabled: true,
            policy: LimitPolicy::Lenient,
            max_dimension: Some(LENIENT_MAX_DIMENSION),
            max_pixels: Some(LENIENT_MAX_PIXELS),
        }
    }

    pub fn custom() -> Self {
        Self {
            enabled: true,
            policy: LimitPolicy::Custom,
            max_dimension: None,
            max_pixels: None,
        }
    }

    pub fn apply_policy(policy: LimitPolicy) -> Self {
        match policy {
            LimitPolicy::Disabled => Self::disabled(),
            LimitPolicy::Strict => Self::strict(),
            LimitPolicy::Lenient => Self::lenient(),
            LimitPolicy::Custom => Self::custom(),
        }
    }

    pub fn with_max_dimension(mut self, max: u32) -> Self {
        self.enabled = true;
        self.max_dimension = Some(max);
        if self.policy == LimitPolicy::Disabled {
            self.policy = LimitPolicy::Custom;
        }
        self
    }

    pub fn with_max_pixels(mut self, max: u64) -> Self {
        self.enabled = true;
        self.max_pixels = Some(max);
        if self.policy == LimitPolicy::Disabled {
            self.policy = LimitPolicy::Custom;
        }
        self
    }

    /// Build limits from `ICON_ENGINE_LIMITS`, `ICON_ENGINE_MAX_DIMENSION` and
    /// `ICON_ENGINE_MAX_PIXELS`. Unset variables leave the defaults alone.
    pub fn from_env() -> Result<Self, IconError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, IconError> {
        let mut limits = match lookup(ENV_POLICY) {
            Some(raw) => Self::apply_policy(LimitPolicy::parse(&raw)?),
            None => Self::default(),
        };
        if let Some(raw) = lookup(ENV_MAX_DIMENSION) {
            let max = raw.trim().parse::<u32>().map_err(|_| {
                IconError::invalid_argument(ENV_MAX_DIMENSION, raw.clone(), "expected an integer")
            })?;
            limits = limits.with_max_dimension(max);
        }
        if let Some(raw) = lookup(ENV_MAX_PIXELS) {
            let max = raw.trim().parse::<u64>().map_err(|_| {
                IconError::invalid_argument(ENV_MAX_PIXELS, raw.clone(), "expected an integer")
            })?;
            limits = limits.with_max_pixels(max);
        }
        Ok(limits)
    }

    /// Check a requested plane size. Hard caps apply even when disabled.
    pub fn enforce(&self, width: u32, height: u32) -> Result<(), IconError> {
        let max_dim = match (self.enabled, self.max_dimension) {
            (true, Some(limit)) => limit.min(MAX_DIMENSION),
            _ => MAX_DIMENSION,
        };
        if width > max_dim {
            return Err(IconError::dimension_exceeds_limit(width, max_dim));
        }
        if height > max_dim {
            return Err(IconError::dimension_exceeds_limit(height, max_dim));
        }

        let max_pixels = match (self.enabled, self.max_pixels) {
            (true, Some(limit)) => limit.min(MAX_PIXELS),
            _ => MAX_PIXELS,
        };
        let pixels = width as u64 * height as u64;
        if pixels > max_pixels {
            return Err(IconError::pixel_count_exceeds_limit(pixels, max_pixels));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_disabled_still_enforces_hard_caps() {
        let limits = IconLimits::disabled();
        assert!(limits.enforce(MAX_DIMENSION, 1).is_ok());
        assert!(matches!(
            limits.enforce(MAX_DIMENSION + 1, 1),
            Err(IconError::DimensionExceedsLimit { .. })
        ));
        assert!(matches!(
            limits.enforce(20_000, 20_000),
            Err(IconError::PixelCountExceedsLimit { .. })
        ));
    }

    #[test]
    fn test_strict_policy_rejects_large_icons() {
        let limits = IconLimits::strict();
        assert!(limits.enforce(256, 256).is_ok());
        assert!(limits.enforce(2048, 16).is_err());
    }

    #[test]
    fn test_parse_policy() {
        assert_eq!(LimitPolicy::parse("STRICT").unwrap(), LimitPolicy::Strict);
        assert_eq!(LimitPolicy::parse(" lenient ").unwrap(), LimitPolicy::Lenient);
        assert_eq!(LimitPolicy::parse("off").unwrap(), LimitPolicy::Disabled);
        assert!(matches!(
            LimitPolicy::parse("paranoid"),
            Err(IconError::InvalidLimitPolicy { .. })
        ));
    }

    #[test]
    fn test_from_lookup_applies_overrides() {
        let limits = IconLimits::from_lookup(lookup_from(&[
            (ENV_POLICY, "lenient"),
            (ENV_MAX_DIMENSION, "64"),
        ]))
        .unwrap();
        assert_eq!(limits.policy, LimitPolicy::Lenient);
        assert_eq!(limits.max_dimension, Some(64));
        assert_eq!(limits.max_pixels, Some(LENIENT_MAX_PIXELS));
    }

    #[test]
    fn test_from_lookup_override_enables_custom() {
        let limits =
            IconLimits::from_lookup(lookup_from(&[(ENV_MAX_PIXELS, "100")])).unwrap();
        assert!(limits.enabled);
        assert_eq!(limits.policy, LimitPolicy::Custom);
        assert!(limits.enforce(10, 11).is_err());
    }

    #[test]
    fn test_from_lookup_rejects_garbage() {
        let err = IconLimits::from_lookup(lookup_from(&[(ENV_MAX_DIMENSION, "big")]))
            .unwrap_err();
        assert!(matches!(err, IconError::InvalidArgument { .. }));
    }
}
