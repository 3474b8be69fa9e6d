//! Value interpreters for operation arguments.
//!
//! Every positional argument and flag value arrives as a raw string slice from
//! the [`grammar`](crate::grammar) parser. The functions here turn those slices
//! into typed values. They return `None` on a malformed value and leave the
//! error wording to the operation handler, which knows which operation and
//! which slot the value belongs to.
//!
//! ## Number-or-percent
//!
//! Size-like arguments (`resize`, `thumbnail`, `border`, overlay offsets) accept
//! either an absolute pixel count or a fraction of the relevant image
//! dimension. The distinction is purely syntactic: a literal containing a
//! decimal point is a fraction.
//!
//! ```text
//! "10"   → 10 px
//! "0"    → 0 px
//! "0.5"  → 50 % of the dimension
//! "0.0"  → 0 % of the dimension
//! "1.0"  → 100 % of the dimension
//! ```

use std::str::FromStr;

/// A size that is either absolute (pixels) or a fraction of a dimension.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumberOrPercent {
    pub magnitude: f64,
    pub is_percent: bool,
}

impl NumberOrPercent {
    pub fn absolute(magnitude: f64) -> Self {
        Self {
            magnitude,
            is_percent: false,
        }
    }

    pub fn percent(magnitude: f64) -> Self {
        Self {
            magnitude,
            is_percent: true,
        }
    }

    pub fn is_negative(self) -> bool {
        self.magnitude < 0.0
    }
}

/// Parse a number-or-percent literal. Non-finite values are rejected.
pub fn parse_number_or_percent(raw: &str) -> Option<NumberOrPercent> {
    let magnitude = f64::from_str(raw).ok().filter(|v| v.is_finite())?;
    Some(NumberOrPercent {
        magnitude,
        is_percent: raw.contains('.'),
    })
}

/// Base-10 integer.
pub fn parse_int(raw: &str) -> Option<i64> {
    raw.parse().ok()
}

/// Finite floating point value.
pub fn parse_float(raw: &str) -> Option<f32> {
    raw.parse::<f32>().ok().filter(|v| v.is_finite())
}

/// Parse every argument as an integer, silently dropping the ones that are
/// not numeric.
///
/// Used by operations with a variable number of trailing integer arguments,
/// where the arity check runs on what survives.
pub fn parse_ints_lenient<S: AsRef<str>>(raw: &[S]) -> Vec<i64> {
    raw.iter().filter_map(|r| parse_int(r.as_ref())).collect()
}

/// Exact match against a table of allowed names.
pub fn parse_enum<T: Copy>(raw: &str, allowed: &[(&str, T)]) -> Option<T> {
    allowed
        .iter()
        .find(|(name, _)| *name == raw)
        .map(|(_, value)| *value)
}

/// An `RRGGBBAA` color string, handed to the engine untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorValue(pub String);

impl ColorValue {
    /// Only presence is checked here; the engine owns the hex decoding.
    pub fn parse(raw: &str) -> Option<Self> {
        (!raw.is_empty()).then(|| Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
