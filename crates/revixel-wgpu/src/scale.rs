//! Rational scale factors
//!
//! Stage outputs are sized as exact fractions of their inputs ("2", "1/2")
//! rather than floats, so chained stages never accumulate rounding drift.

use std::fmt;
use std::str::FromStr;

/// A rational scale factor applied to surface dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScaleFactor {
    /// The numerator of the fraction
    pub numerator: u32,
    /// The denominator of the fraction
    pub denominator: u32,
}

impl ScaleFactor {
    /// Creates a new scale factor from numerator and denominator
    pub const fn new(numerator: u32, denominator: u32) -> Self {
        Self { numerator, denominator }
    }

    /// The identity factor (1/1)
    pub const UNITY: Self = Self::new(1, 1);

    /// Converts the scale factor to a floating-point value
    pub fn to_f64(&self) -> f64 {
        self.numerator as f64 / self.denominator as f64
    }

    /// Returns true if this scale factor equals 1.0 (no scaling)
    pub fn is_unity(&self) -> bool {
        self.numerator == self.denominator
    }

    /// Scales a pixel dimension, truncating and clamping to at least 1
    pub fn apply(&self, dimension: u32) -> u32 {
        ((dimension as u64 * self.numerator as u64) / self.denominator as u64).max(1) as u32
    }
}

impl FromStr for ScaleFactor {
    type Err = ScaleFactorParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some((numerator, denominator)) = s.split_once('/') {
            let numerator = numerator.parse::<u32>().map_err(|_| ScaleFactorParseError::InvalidNumerator)?;
            let denominator = denominator.parse::<u32>().map_err(|_| ScaleFactorParseError::InvalidDenominator)?;

            if denominator == 0 {
                return Err(ScaleFactorParseError::ZeroDenominator);
            }

            Ok(ScaleFactor::new(numerator, denominator))
        } else {
            // Whole numbers like "1", "2", etc.
            let numerator = s.parse::<u32>().map_err(|_| ScaleFactorParseError::InvalidNumerator)?;
            Ok(ScaleFactor::new(numerator, 1))
        }
    }
}

impl fmt::Display for ScaleFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.denominator == 1 {
            write!(f, "{}", self.numerator)
        } else {
            write!(f, "{}/{}", self.numerator, self.denominator)
        }
    }
}

/// Error types for scale factor parsing
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScaleFactorParseError {
    /// The numerator is not a valid integer
    #[error("invalid numerator")]
    InvalidNumerator,
    /// The denominator is not a valid integer
    #[error("invalid denominator")]
    InvalidDenominator,
    /// The denominator is zero (division by zero)
    #[error("denominator cannot be zero")]
    ZeroDenominator,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_factor_parsing() {
        // Whole numbers
        assert_eq!("1".parse::<ScaleFactor>().unwrap(), ScaleFactor::new(1, 1));
        assert_eq!("2".parse::<ScaleFactor>().unwrap(), ScaleFactor::new(2, 1));

        // Fractions
        assert_eq!("1/2".parse::<ScaleFactor>().unwrap(), ScaleFactor::new(1, 2));
        assert_eq!("3/4".parse::<ScaleFactor>().unwrap(), ScaleFactor::new(3, 4));

        // Edge cases
        assert!("0/1".parse::<ScaleFactor>().is_ok());
        assert_eq!("1/0".parse::<ScaleFactor>(), Err(ScaleFactorParseError::ZeroDenominator));
        assert!("invalid".parse::<ScaleFactor>().is_err());
    }

    #[test]
    fn test_apply() {
        assert_eq!(ScaleFactor::new(2, 1).apply(320), 640);
        assert_eq!(ScaleFactor::new(1, 2).apply(321), 160);
        // Never collapses to zero
        assert_eq!(ScaleFactor::new(1, 2).apply(1), 1);
        assert_eq!(ScaleFactor::UNITY.apply(123), 123);
    }

    #[test]
    fn test_display_round_trip() {
        for source in ["2", "1/2", "3/4"] {
            let parsed: ScaleFactor = source.parse().unwrap();
            assert_eq!(parsed.to_string(), source);
        }
    }
}
