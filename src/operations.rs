//! Operation registry.
//!
//! Every query key the service understands is listed in [`REGISTRY`] together
//! with its maximum positional arity and its recognised flags. Keys not in the
//! registry are ignored by the pipeline.
//!
//! | op | args | flags |
//! |---|---|---|
//! | `blur` | sigma | |
//! | `brighten` | delta | |
//! | `contrast` | factor | |
//! | `crop` | w,h or x,y,w,h | |
//! | `flip` | `h` (default) or `v` | |
//! | `grayscale` | | |
//! | `border` | 1–4 sizes, CSS margin order | `color` |
//! | `resize` | w[,h] | `exact`, `filter` |
//! | `thumbnail` | w[,h] | `exact` |
//! | `sharpen` | sigma,threshold | |
//! | `rotate` | 90, 180 or 270 | |
//! | `overlay` | `(flags)` then an http(s) URL | `x`, `y`, `hrepeat`, `vrepeat` |
//!
//! A handler validates the parsed [`OperationSpec`] and produces a [`Step`]:
//! either a ready [`Transform`] for the engine, or an overlay that the
//! pipeline still has to resolve.

use crate::engine::{
    Anchor, Canvas, Extent, FlipAxis, ImageEngine, Placement, Rotation, Sides, Transform,
};
use crate::error::ValidationError;
use crate::grammar::{self, OperationSpec};
use crate::values::{
    ColorValue, NumberOrPercent, parse_enum, parse_float, parse_int, parse_ints_lenient,
    parse_number_or_percent,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Blur,
    Brighten,
    Contrast,
    Crop,
    Flip,
    Grayscale,
    Border,
    Resize,
    Thumbnail,
    Sharpen,
    Rotate,
    Overlay,
}

#[derive(Debug)]
pub struct OperationDef {
    pub name: &'static str,
    pub kind: OpKind,
    pub max_args: usize,
    pub flags: &'static [&'static str],
}

const fn op(
    name: &'static str,
    kind: OpKind,
    max_args: usize,
    flags: &'static [&'static str],
) -> OperationDef {
    OperationDef {
        name,
        kind,
        max_args,
        flags,
    }
}

/// Largest accepted blur/sharpen sigma.
pub const MAX_SIGMA: f32 = 1000.0;

pub static REGISTRY: [OperationDef; 12] = [
    op("blur", OpKind::Blur, 1, &[]),
    op("brighten", OpKind::Brighten, 1, &[]),
    op("contrast", OpKind::Contrast, 1, &[]),
    op("crop", OpKind::Crop, 4, &[]),
    op("flip", OpKind::Flip, 1, &[]),
    op("grayscale", OpKind::Grayscale, 0, &[]),
    op("border", OpKind::Border, 4, &["color"]),
    op("resize", OpKind::Resize, 2, &["exact", "filter"]),
    op("thumbnail", OpKind::Thumbnail, 2, &["exact"]),
    op("sharpen", OpKind::Sharpen, 2, &[]),
    op("rotate", OpKind::Rotate, 1, &[]),
    op("overlay", OpKind::Overlay, 1, &["x", "y", "hrepeat", "vrepeat"]),
];

/// Find the operation for a query key.
pub fn lookup(name: &str) -> Option<&'static OperationDef> {
    REGISTRY.iter().find(|def| def.name == name)
}

/// What a validated operation asks the pipeline to do.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Transform(Transform),
    /// Composite another image, still to be resolved from `url`.
    Overlay { url: String, placement: Placement },
}

impl OperationDef {
    /// Split the raw value into args and flags, rejecting unknown flags.
    pub fn parse(&self, raw: &str) -> Result<OperationSpec, ValidationError> {
        let spec = match self.kind {
            OpKind::Overlay => grammar::parse_overlay_value(self.name, raw)?,
            _ => grammar::parse_value(self.name, raw, self.max_args)?,
        };
        spec.flags.ensure_only(self.name, self.flags)?;
        Ok(spec)
    }

    /// Parse and validate the raw value into a [`Step`].
    ///
    /// `engine` is only consulted for its named enums (resize filters).
    pub fn plan(&self, raw: &str, engine: &dyn ImageEngine) -> Result<Step, ValidationError> {
        let spec = self.parse(raw)?;
        let transform = match self.kind {
            OpKind::Blur => Transform::Blur {
                sigma: required_sigma(&spec, 0)?,
            },
            OpKind::Brighten => Transform::Brighten {
                delta: required_i32(&spec, 0, "delta")?,
            },
            OpKind::Contrast => Transform::Contrast {
                factor: required_float(&spec, 0, "factor")?,
            },
            OpKind::Crop => crop(&spec)?,
            OpKind::Flip => flip(&spec)?,
            OpKind::Grayscale => Transform::Grayscale,
            OpKind::Border => border(&spec)?,
            OpKind::Resize => Transform::Resize {
                extent: extent(&spec)?,
                exact: spec.flags.switch(self.name, "exact")?,
                filter: match spec.flags.value(self.name, "filter")? {
                    Some(name) => engine.filter_by_name(name).ok_or_else(|| {
                        ValidationError::new(format!("Unknown filter type: {name}"))
                    })?,
                    None => Default::default(),
                },
            },
            OpKind::Thumbnail => Transform::Thumbnail {
                extent: extent(&spec)?,
                exact: spec.flags.switch(self.name, "exact")?,
            },
            OpKind::Sharpen => Transform::Sharpen {
                sigma: required_sigma(&spec, 0)?,
                threshold: required_i32(&spec, 1, "threshold")?,
            },
            OpKind::Rotate => rotate(&spec)?,
            OpKind::Overlay => return overlay(&spec),
        };
        Ok(Step::Transform(transform))
    }
}

/// Parse the `empty` parameter: `W,H(color=RRGGBBAA)`.
pub fn parse_canvas(raw: &str) -> Result<Canvas, ValidationError> {
    let spec = grammar::parse_value("empty", raw, 2)?;
    spec.flags.ensure_only("empty", &["color"])?;
    let width = required_u32(&spec, 0, "width")?;
    let height = required_u32(&spec, 1, "height")?;
    Ok(Canvas {
        width,
        height,
        color: color_flag(&spec)?,
    })
}

fn required<'s>(spec: &'s OperationSpec, index: usize, what: &str) -> Result<&'s str, ValidationError> {
    spec.arg(index)
        .ok_or_else(|| ValidationError::new(format!("Missing {what} for {}", spec.name)))
}

fn invalid(spec: &OperationSpec, what: &str, raw: &str) -> ValidationError {
    ValidationError::new(format!("Invalid {what} for {}: {raw}", spec.name))
}

fn required_float(spec: &OperationSpec, index: usize, what: &str) -> Result<f32, ValidationError> {
    let raw = required(spec, index, what)?;
    parse_float(raw).ok_or_else(|| invalid(spec, what, raw))
}

/// Blur radius: strictly positive and bounded, the kernel grows with it.
fn required_sigma(spec: &OperationSpec, index: usize) -> Result<f32, ValidationError> {
    let sigma = required_float(spec, index, "sigma")?;
    if !(sigma.is_normal() && sigma > 0.0 && sigma <= MAX_SIGMA) {
        return Err(ValidationError::new(format!(
            "sigma for {} must be greater than 0 and at most {MAX_SIGMA}",
            spec.name
        )));
    }
    Ok(sigma)
}

fn required_i32(spec: &OperationSpec, index: usize, what: &str) -> Result<i32, ValidationError> {
    let raw = required(spec, index, what)?;
    parse_int(raw)
        .and_then(|v| i32::try_from(v).ok())
        .ok_or_else(|| invalid(spec, what, raw))
}

fn required_u32(spec: &OperationSpec, index: usize, what: &str) -> Result<u32, ValidationError> {
    let raw = required(spec, index, what)?;
    parse_int(raw)
        .and_then(|v| u32::try_from(v).ok())
        .ok_or_else(|| invalid(spec, what, raw))
}

fn color_flag(spec: &OperationSpec) -> Result<Option<String>, ValidationError> {
    Ok(spec
        .flags
        .value(&spec.name, "color")?
        .and_then(ColorValue::parse)
        .map(|c| c.0))
}

/// Every positional arg as a non-negative number-or-percent.
fn lengths(spec: &OperationSpec, what: &str) -> Result<Vec<NumberOrPercent>, ValidationError> {
    spec.args
        .iter()
        .map(|raw| match parse_number_or_percent(raw) {
            Some(v) if v.is_negative() => Err(ValidationError::new(format!(
                "Negative {what} for {}: {raw}",
                spec.name
            ))),
            Some(v) => Ok(v),
            None => Err(invalid(spec, what, raw)),
        })
        .collect()
}

fn extent(spec: &OperationSpec) -> Result<Extent, ValidationError> {
    match lengths(spec, "size")?.as_slice() {
        &[width] => Ok(Extent {
            width,
            height: width,
        }),
        &[width, height] => Ok(Extent { width, height }),
        _ => Err(ValidationError::new(format!(
            "{} requires a width and optional height",
            spec.name
        ))),
    }
}

fn crop(spec: &OperationSpec) -> Result<Transform, ValidationError> {
    let values: Vec<u32> = parse_ints_lenient(&spec.args)
        .into_iter()
        .map(|v| {
            u32::try_from(v)
                .map_err(|_| ValidationError::new(format!("Invalid crop value: {v}")))
        })
        .collect::<Result<_, _>>()?;
    match values.as_slice() {
        &[width, height] => Ok(Transform::Crop {
            x: 0,
            y: 0,
            width,
            height,
        }),
        &[x, y, width, height] => Ok(Transform::Crop {
            x,
            y,
            width,
            height,
        }),
        _ => Err(ValidationError::new(
            "crop requires either width,height or x,y,width,height",
        )),
    }
}

fn flip(spec: &OperationSpec) -> Result<Transform, ValidationError> {
    const AXES: [(&str, FlipAxis); 2] = [("h", FlipAxis::Horizontal), ("v", FlipAxis::Vertical)];
    match spec.arg(0) {
        None => Ok(Transform::Flip(FlipAxis::Horizontal)),
        Some(raw) => parse_enum(raw, &AXES)
            .map(Transform::Flip)
            .ok_or_else(|| invalid(spec, "direction", raw)),
    }
}

/// CSS margin shorthand: top, right, bottom, left with the usual fallbacks.
fn border(spec: &OperationSpec) -> Result<Transform, ValidationError> {
    let sides = match lengths(spec, "border size")?.as_slice() {
        &[all] => Sides {
            top: all,
            right: all,
            bottom: all,
            left: all,
        },
        &[top, right] => Sides {
            top,
            right,
            bottom: top,
            left: right,
        },
        &[top, right, bottom] => Sides {
            top,
            right,
            bottom,
            left: right,
        },
        &[top, right, bottom, left] => Sides {
            top,
            right,
            bottom,
            left,
        },
        _ => return Err(ValidationError::new("border requires 1 to 4 values")),
    };
    Ok(Transform::Border {
        sides,
        color: color_flag(spec)?,
    })
}

fn rotate(spec: &OperationSpec) -> Result<Transform, ValidationError> {
    let raw = required(spec, 0, "degrees")?;
    match parse_int(raw) {
        Some(90) => Ok(Transform::Rotate(Rotation::Deg90)),
        Some(180) => Ok(Transform::Rotate(Rotation::Deg180)),
        Some(270) => Ok(Transform::Rotate(Rotation::Deg270)),
        _ => Err(ValidationError::new("Can only rotate 90, 180, or 270")),
    }
}

fn overlay(spec: &OperationSpec) -> Result<Step, ValidationError> {
    const X: [(&str, Anchor); 3] = [
        ("left", Anchor::Start),
        ("center", Anchor::Center),
        ("right", Anchor::End),
    ];
    const Y: [(&str, Anchor); 3] = [
        ("top", Anchor::Start),
        ("middle", Anchor::Center),
        ("bottom", Anchor::End),
    ];

    let url = spec.arg(0).unwrap_or_default();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(ValidationError::new(
            "overlay URL must start with http:// or https://",
        ));
    }

    let anchor = |key: &str, names: &[(&str, Anchor)]| -> Result<Anchor, ValidationError> {
        match spec.flags.value(&spec.name, key)? {
            None => Ok(Anchor::Center),
            Some(raw) => parse_enum(raw, names)
                .or_else(|| parse_number_or_percent(raw).map(Anchor::Offset))
                .ok_or_else(|| invalid(spec, key, raw)),
        }
    };

    Ok(Step::Overlay {
        url: url.to_string(),
        placement: Placement {
            x: anchor("x", &X)?,
            y: anchor("y", &Y)?,
            hrepeat: spec.flags.switch(&spec.name, "hrepeat")?,
            vrepeat: spec.flags.switch(&spec.name, "vrepeat")?,
        },
    })
}
