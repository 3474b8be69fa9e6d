//! Pure calculation functions for engine geometry.
//!
//! All functions here are pure and testable without any I/O or images.

use super::params::{Anchor, Sides};
use crate::values::NumberOrPercent;

/// Resolve a number-or-percent against the dimension it is relative to.
///
/// Percent values scale `dimension`; absolute values are taken as-is. The
/// result is truncated, and negative values clamp to zero.
///
/// # Examples
/// ```
/// # use imgq::engine::calculations::resolve_length;
/// # use imgq::values::NumberOrPercent;
/// assert_eq!(resolve_length(200, NumberOrPercent::percent(0.5)), 100);
/// assert_eq!(resolve_length(200, NumberOrPercent::absolute(30.0)), 30);
/// ```
pub fn resolve_length(dimension: u32, value: NumberOrPercent) -> u32 {
    let px = if value.is_percent {
        f64::from(dimension) * value.magnitude
    } else {
        value.magnitude
    };
    px as u32
}

/// Like [`resolve_length`] but keeps the sign, for offsets.
pub fn resolve_offset(dimension: u32, value: NumberOrPercent) -> i64 {
    let px = if value.is_percent {
        f64::from(dimension) * value.magnitude
    } else {
        value.magnitude
    };
    px as i64
}

/// Border widths in pixels as `(top, right, bottom, left)`.
///
/// Top and bottom are relative to the height, left and right to the width.
pub fn resolve_sides(dimensions: (u32, u32), sides: &Sides) -> (u32, u32, u32, u32) {
    let (w, h) = dimensions;
    (
        resolve_length(h, sides.top),
        resolve_length(w, sides.right),
        resolve_length(h, sides.bottom),
        resolve_length(w, sides.left),
    )
}

/// Start coordinate of an overlay of size `tile` on a base of size `base`.
pub fn anchor_position(base: u32, tile: u32, anchor: Anchor) -> i64 {
    match anchor {
        Anchor::Start => 0,
        Anchor::Center => (i64::from(base) - i64::from(tile)) / 2,
        Anchor::End => i64::from(base) - i64::from(tile),
        Anchor::Offset(value) => resolve_offset(base, value),
    }
}

/// Every start coordinate at which the overlay is drawn along one axis.
///
/// Without `repeat` this is just `position`. With `repeat` the overlay is tiled
/// so that one copy sits at `position` and copies cover `0..base` entirely.
pub fn tile_positions(base: u32, tile: u32, position: i64, repeat: bool) -> Vec<i64> {
    if !repeat || tile == 0 {
        return vec![position];
    }
    let tile = i64::from(tile);
    let phase = position.rem_euclid(tile);
    let mut start = if phase == 0 { 0 } else { phase - tile };
    let mut positions = Vec::new();
    while start < i64::from(base) {
        positions.push(start);
        start += tile;
    }
    positions
}

/// Decode an `RRGGBBAA` (or opaque `RRGGBB`) hex color.
pub fn parse_hex_color(color: &str) -> Result<[u8; 4], String> {
    let digits = color.strip_prefix('#').unwrap_or(color);
    if !matches!(digits.len(), 6 | 8) || !digits.is_ascii() {
        return Err(format!("Invalid color {color}: expected RRGGBBAA hex"));
    }
    let channel = |i: usize| {
        u8::from_str_radix(&digits[i..i + 2], 16)
            .map_err(|_| format!("Invalid color {color}: expected RRGGBBAA hex"))
    };
    let alpha = if digits.len() == 8 { channel(6)? } else { 0xFF };
    Ok([channel(0)?, channel(2)?, channel(4)?, alpha])
}
