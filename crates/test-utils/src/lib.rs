//! Test support for the tile cache crates.
//!
//! Canned capability and DescribeCoverage documents live in [`fixtures`],
//! synthetic elevation grids and image bytes in [`generators`], and
//! throwaway GeoPackage paths in [`paths`]. Pull it in as a dev-dependency:
//!
//! ```ignore
//! use test_utils::{capabilities, TempContainer};
//! ```

pub mod fixtures;
pub mod generators;
pub mod paths;

pub use fixtures::*;
pub use generators::*;
pub use paths::*;

/// Macro for approximate floating-point equality assertions.
///
/// # Usage
///
/// ```ignore
/// use test_utils::assert_approx_eq;
///
/// assert_approx_eq!(1.0001_f64, 1.0_f64, 0.001_f64); // passes
/// assert_approx_eq!(1.1_f32, 1.0_f32, 0.001_f32);    // fails
/// ```
#[macro_export]
macro_rules! assert_approx_eq {
    ($left:expr, $right:expr, $epsilon:expr) => {{
        let left: f64 = $left as f64;
        let right: f64 = $right as f64;
        let epsilon: f64 = $epsilon as f64;
        let diff = (left - right).abs();
        if diff > epsilon {
            panic!(
                "assertion failed: `(left ≈ right)`\n  left: `{:?}`,\n right: `{:?}`,\n  diff: `{:?}` > epsilon `{:?}`",
                left, right, diff, epsilon
            );
        }
    }};
}

/// Approximate equality of two `(min_x, min_y, max_x, max_y)` sectors.
///
/// # Usage
///
/// ```ignore
/// use test_utils::assert_sector_approx_eq;
///
/// assert_sector_approx_eq!(bbox, (-180.0, -90.0, 180.0, 90.0), 1e-9);
/// ```
#[macro_export]
macro_rules! assert_sector_approx_eq {
    ($bbox:expr, ($min_x:expr, $min_y:expr, $max_x:expr, $max_y:expr), $epsilon:expr) => {{
        let bbox = $bbox;
        $crate::assert_approx_eq!(bbox.min_x, $min_x, $epsilon);
        $crate::assert_approx_eq!(bbox.min_y, $min_y, $epsilon);
        $crate::assert_approx_eq!(bbox.max_x, $max_x, $epsilon);
        $crate::assert_approx_eq!(bbox.max_y, $max_y, $epsilon);
    }};
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_assert_approx_eq_passes() {
        assert_approx_eq!(1.0001, 1.0, 0.001);
        assert_approx_eq!(0.0, 0.0, 0.0001);
        assert_approx_eq!(-5.5, -5.500001, 0.0001);
    }

    #[test]
    #[should_panic(expected = "assertion failed")]
    fn test_assert_approx_eq_fails() {
        assert_approx_eq!(1.1, 1.0, 0.001);
    }

    struct Sector {
        min_x: f64,
        min_y: f64,
        max_x: f64,
        max_y: f64,
    }

    #[test]
    fn test_assert_sector_approx_eq_passes() {
        let s = Sector {
            min_x: -180.0,
            min_y: -90.0000001,
            max_x: 180.0,
            max_y: 90.0,
        };
        assert_sector_approx_eq!(s, (-180.0, -90.0, 180.0, 90.0), 1e-6);
    }
}
