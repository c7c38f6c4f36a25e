//! Allocation value objects: target percentages and drift bounds.

use std::fmt;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::error::ValidationError;

/// Largest target any single position (or the whole model) may carry.
pub const MAX_TARGET: Decimal = dec!(0.95);

/// Targets must be zero or a whole multiple of this increment.
pub const TARGET_INCREMENT: Decimal = dec!(0.005);

/// A position's target share of market value, as a fraction in `[0, 0.95]`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct TargetPercentage(Decimal);

impl TargetPercentage {
    pub const ZERO: TargetPercentage = TargetPercentage(Decimal::ZERO);

    pub fn new(value: Decimal) -> Result<Self, ValidationError> {
        if value < Decimal::ZERO || value > MAX_TARGET {
            return Err(ValidationError::TargetOutOfRange(value));
        }
        if !(value % TARGET_INCREMENT).is_zero() {
            return Err(ValidationError::TargetNotOnIncrement(value));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

impl fmt::Display for TargetPercentage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", (self.0 * dec!(100)).normalize())
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for TargetPercentage {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = <Decimal as serde::Deserialize>::deserialize(deserializer)?;
        TargetPercentage::new(value).map_err(serde::de::Error::custom)
    }
}

/// Tolerated deviation below (`low`) and above (`high`) a target, as fractions
/// of market value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DriftBounds {
    low: Decimal,
    high: Decimal,
}

impl DriftBounds {
    pub fn new(low: Decimal, high: Decimal) -> Result<Self, ValidationError> {
        for bound in [low, high] {
            if bound < Decimal::ZERO || bound > Decimal::ONE {
                return Err(ValidationError::DriftOutOfRange(bound));
            }
        }
        if low > high {
            return Err(ValidationError::DriftInverted { low, high });
        }
        Ok(Self { low, high })
    }

    /// Equal tolerance on both sides.
    pub fn symmetric(drift: Decimal) -> Result<Self, ValidationError> {
        Self::new(drift, drift)
    }

    pub fn low(&self) -> Decimal {
        self.low
    }

    pub fn high(&self) -> Decimal {
        self.high
    }

    /// Tolerated allocation interval around `target`. The lower edge is
    /// floored at zero since holdings cannot go negative.
    pub fn band(&self, target: TargetPercentage) -> (Decimal, Decimal) {
        let lower = (target.value() - self.low).max(Decimal::ZERO);
        (lower, target.value() + self.high)
    }

    /// Whether an actual allocation sits inside the band around `target`.
    pub fn contains(&self, target: TargetPercentage, actual: Decimal) -> bool {
        let (lower, upper) = self.band(target);
        actual >= lower && actual <= upper
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for DriftBounds {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(serde::Deserialize)]
        struct Raw {
            low: Decimal,
            high: Decimal,
        }
        let raw = Raw::deserialize(deserializer)?;
        DriftBounds::new(raw.low, raw.high).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accept_valid_targets() {
        for v in [dec!(0), dec!(0.005), dec!(0.6), dec!(0.95), dec!(0.125)] {
            assert_eq!(TargetPercentage::new(v).unwrap().value(), v);
        }
    }

    #[test]
    fn reject_negative_target() {
        assert_eq!(
            TargetPercentage::new(dec!(-0.01)),
            Err(ValidationError::TargetOutOfRange(dec!(-0.01)))
        );
    }

    #[test]
    fn reject_target_over_max() {
        assert!(TargetPercentage::new(dec!(0.955)).is_err());
        assert!(TargetPercentage::new(dec!(1)).is_err());
    }

    #[test]
    fn reject_target_off_increment() {
        assert_eq!(
            TargetPercentage::new(dec!(0.123)),
            Err(ValidationError::TargetNotOnIncrement(dec!(0.123)))
        );
        assert!(TargetPercentage::new(dec!(0.0001)).is_err());
    }

    #[test]
    fn target_display() {
        let t = TargetPercentage::new(dec!(0.125)).unwrap();
        assert_eq!(t.to_string(), "12.5%");
    }

    #[test]
    fn accept_valid_bounds() {
        let b = DriftBounds::new(dec!(0.02), dec!(0.05)).unwrap();
        assert_eq!(b.low(), dec!(0.02));
        assert_eq!(b.high(), dec!(0.05));
        assert!(DriftBounds::new(dec!(0), dec!(1)).is_ok());
        assert!(DriftBounds::symmetric(dec!(0.03)).is_ok());
    }

    #[test]
    fn reject_bounds_out_of_range() {
        assert!(DriftBounds::new(dec!(-0.01), dec!(0.05)).is_err());
        assert!(DriftBounds::new(dec!(0.01), dec!(1.01)).is_err());
    }

    #[test]
    fn reject_inverted_bounds() {
        assert_eq!(
            DriftBounds::new(dec!(0.05), dec!(0.02)),
            Err(ValidationError::DriftInverted {
                low: dec!(0.05),
                high: dec!(0.02)
            })
        );
    }

    #[test]
    fn band_floors_at_zero() {
        let t = TargetPercentage::new(dec!(0.02)).unwrap();
        let b = DriftBounds::new(dec!(0.05), dec!(0.05)).unwrap();
        assert_eq!(b.band(t), (dec!(0), dec!(0.07)));
        assert!(b.contains(t, dec!(0)));
        assert!(!b.contains(t, dec!(0.0701)));
    }
}
