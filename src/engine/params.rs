//! Parameter types for engine operations.
//!
//! These types describe *what* to do to an image, already validated. They are
//! the interface between the [`operations`](crate::operations) registry, which
//! turns query values into them, and the [`ImageEngine`](super::ImageEngine),
//! which does the pixel work. Sizes stay as [`NumberOrPercent`] until the
//! engine knows the actual image dimensions.
//!
//! ## Types
//!
//! - [`Transform`]: one single-image operation with its arguments.
//! - [`Placement`]: where and how an overlay is composited.
//! - [`Canvas`]: a blank image to start from.
//! - [`OutputFormat`] / [`ResizeFilter`]: the engine's named enums, looked up
//!   by exact name.

use crate::values::NumberOrPercent;
use std::fmt;
use std::str::FromStr;

/// Encoders the engine can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Png,
    Jpeg,
    WebP,
    Tiff,
    Avif,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 5] = [
        OutputFormat::Png,
        OutputFormat::Jpeg,
        OutputFormat::WebP,
        OutputFormat::Tiff,
        OutputFormat::Avif,
    ];

    pub fn name(self) -> &'static str {
        match self {
            OutputFormat::Png => "PNG",
            OutputFormat::Jpeg => "JPEG",
            OutputFormat::WebP => "WEBP",
            OutputFormat::Tiff => "TIFF",
            OutputFormat::Avif => "AVIF",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            OutputFormat::Png => "image/png",
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::WebP => "image/webp",
            OutputFormat::Tiff => "image/tiff",
            OutputFormat::Avif => "image/avif",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Jpeg => "jpg",
            OutputFormat::WebP => "webp",
            OutputFormat::Tiff => "tiff",
            OutputFormat::Avif => "avif",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OutputFormat::ALL
            .into_iter()
            .find(|f| f.name() == s)
            .ok_or_else(|| format!("Unknown format: {s}"))
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Resampling kernels for `resize`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResizeFilter {
    Nearest,
    Triangle,
    CatmullRom,
    Gaussian,
    #[default]
    Lanczos3,
}

impl ResizeFilter {
    pub const ALL: [ResizeFilter; 5] = [
        ResizeFilter::Nearest,
        ResizeFilter::Triangle,
        ResizeFilter::CatmullRom,
        ResizeFilter::Gaussian,
        ResizeFilter::Lanczos3,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ResizeFilter::Nearest => "Nearest",
            ResizeFilter::Triangle => "Triangle",
            ResizeFilter::CatmullRom => "CatmullRom",
            ResizeFilter::Gaussian => "Gaussian",
            ResizeFilter::Lanczos3 => "Lanczos3",
        }
    }
}

impl FromStr for ResizeFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResizeFilter::ALL
            .into_iter()
            .find(|f| f.name() == s)
            .ok_or_else(|| format!("Unknown filter type: {s}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlipAxis {
    Horizontal,
    Vertical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    Deg90,
    Deg180,
    Deg270,
}

/// Border widths, clockwise from the top like a CSS margin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sides {
    pub top: NumberOrPercent,
    pub right: NumberOrPercent,
    pub bottom: NumberOrPercent,
    pub left: NumberOrPercent,
}

/// Target box for `resize` / `thumbnail`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extent {
    pub width: NumberOrPercent,
    pub height: NumberOrPercent,
}

/// Overlay position along one axis.
///
/// `Start`/`Center`/`End` are `left`/`center`/`right` horizontally and
/// `top`/`middle`/`bottom` vertically. An offset is measured from the start
/// edge, as a fraction of the base image when it is a percent.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Anchor {
    Start,
    #[default]
    Center,
    End,
    Offset(NumberOrPercent),
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Placement {
    pub x: Anchor,
    pub y: Anchor,
    pub hrepeat: bool,
    pub vrepeat: bool,
}

/// A blank starting image. `color` is an `RRGGBBAA` string; absent means
/// transparent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Canvas {
    pub width: u32,
    pub height: u32,
    pub color: Option<String>,
}

/// A validated single-image operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Transform {
    Blur {
        sigma: f32,
    },
    Brighten {
        delta: i32,
    },
    Contrast {
        factor: f32,
    },
    Crop {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },
    Flip(FlipAxis),
    Grayscale,
    Border {
        sides: Sides,
        color: Option<String>,
    },
    Resize {
        extent: Extent,
        exact: bool,
        filter: ResizeFilter,
    },
    Thumbnail {
        extent: Extent,
        exact: bool,
    },
    Sharpen {
        sigma: f32,
        threshold: i32,
    },
    Rotate(Rotation),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_names_are_exact() {
        assert_eq!("PNG".parse::<OutputFormat>(), Ok(OutputFormat::Png));
        assert_eq!("JPEG".parse::<OutputFormat>(), Ok(OutputFormat::Jpeg));
        assert!("png".parse::<OutputFormat>().is_err());
        assert!("GIF".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn every_format_roundtrips_by_name() {
        for format in OutputFormat::ALL {
            assert_eq!(format.name().parse::<OutputFormat>(), Ok(format));
            assert!(format.mime_type().starts_with("image/"));
        }
    }

    #[test]
    fn filter_lookup() {
        assert_eq!("CatmullRom".parse::<ResizeFilter>(), Ok(ResizeFilter::CatmullRom));
        assert_eq!(
            "lanczos3".parse::<ResizeFilter>(),
            Err("Unknown filter type: lanczos3".to_string())
        );
        assert_eq!(ResizeFilter::default(), ResizeFilter::Lanczos3);
    }

    #[test]
    fn placement_defaults_to_centered_without_repeat() {
        let p = Placement::default();
        assert_eq!(p.x, Anchor::Center);
        assert_eq!(p.y, Anchor::Center);
        assert!(!p.hrepeat && !p.vrepeat);
    }
}
