//! Pixel resolutions and the named dimension triple used by pass conditions
//!
//! Every pipeline run carries three named resolutions: `NATIVE` (the input
//! image), `OUTPUT` (the declared target), and `MAIN` (the surface entering
//! the stage currently being assembled). Condition expressions reference
//! their axes as `NATIVE.w`, `OUTPUT.h` and so on.

use std::fmt;

/// A width/height pair in pixels
///
/// Invariant: both dimensions are positive. The constructor enforces this so
/// downstream code never has to re-check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl Resolution {
    /// Creates a resolution, rejecting zero dimensions
    pub fn new(width: u32, height: u32) -> Result<Self, InvalidResolution> {
        if width == 0 || height == 0 {
            return Err(InvalidResolution { width, height });
        }
        Ok(Self { width, height })
    }

    /// Returns the requested axis as a floating-point value
    pub fn axis(&self, axis: Axis) -> f64 {
        match axis {
            Axis::Width => self.width as f64,
            Axis::Height => self.height as f64,
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A resolution with a zero dimension
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid resolution {width}x{height}: dimensions must be positive")]
pub struct InvalidResolution {
    /// Offending width
    pub width: u32,
    /// Offending height
    pub height: u32,
}

/// One axis of a resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    /// The `.w` axis
    Width,
    /// The `.h` axis
    Height,
}

/// The named scope a condition expression may reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Original input resolution
    Native,
    /// Declared target resolution
    Output,
    /// Resolution of the surface entering the current stage
    Main,
}

/// The dimension triple pass conditions are evaluated against
///
/// Built once per stage during pipeline construction: `native` and `output`
/// are fixed for the whole run, `main` tracks the surface chained into the
/// stage being assembled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolutionContext {
    /// Original input resolution
    pub native: Resolution,
    /// Declared target resolution
    pub output: Resolution,
    /// Resolution entering the current stage
    pub main: Resolution,
}

impl ResolutionContext {
    /// Creates the context for the first stage, where `main` equals `native`
    pub fn at_native(native: Resolution, output: Resolution) -> Self {
        Self {
            native,
            output,
            main: native,
        }
    }

    /// Returns a copy with `main` replaced by the given resolution
    pub fn with_main(&self, main: Resolution) -> Self {
        Self { main, ..*self }
    }

    /// Resolves a named scalar reference such as `OUTPUT.w`
    pub fn resolve(&self, scope: Scope, axis: Axis) -> f64 {
        let resolution = match scope {
            Scope::Native => self.native,
            Scope::Output => self.output,
            Scope::Main => self.main,
        };
        resolution.axis(axis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_dimensions() {
        assert!(Resolution::new(0, 100).is_err());
        assert!(Resolution::new(100, 0).is_err());
        assert!(Resolution::new(1, 1).is_ok());
    }

    #[test]
    fn resolves_all_scopes() {
        let ctx = ResolutionContext {
            native: Resolution::new(100, 200).unwrap(),
            output: Resolution::new(300, 400).unwrap(),
            main: Resolution::new(500, 600).unwrap(),
        };

        assert_eq!(ctx.resolve(Scope::Native, Axis::Width), 100.0);
        assert_eq!(ctx.resolve(Scope::Native, Axis::Height), 200.0);
        assert_eq!(ctx.resolve(Scope::Output, Axis::Width), 300.0);
        assert_eq!(ctx.resolve(Scope::Output, Axis::Height), 400.0);
        assert_eq!(ctx.resolve(Scope::Main, Axis::Width), 500.0);
        assert_eq!(ctx.resolve(Scope::Main, Axis::Height), 600.0);
    }

    #[test]
    fn with_main_keeps_native_and_output() {
        let ctx = ResolutionContext::at_native(Resolution::new(64, 64).unwrap(), Resolution::new(128, 128).unwrap());
        let chained = ctx.with_main(Resolution::new(128, 128).unwrap());

        assert_eq!(chained.native, ctx.native);
        assert_eq!(chained.output, ctx.output);
        assert_eq!(chained.main.width, 128);
    }
}
