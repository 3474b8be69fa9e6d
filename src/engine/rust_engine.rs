//! Pure Rust image engine.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Fetch | `reqwest::blocking::Client`, body capped at [`MAX_FETCH_BYTES`] |
//! | Decode (JPEG, PNG, TIFF, WebP) | `image::load_from_memory_with_format` |
//! | blur / brighten / contrast | `DynamicImage::{blur, brighten, adjust_contrast}` |
//! | crop / flip / rotate / grayscale | `DynamicImage::{crop_imm, fliph, flipv, rotate*, grayscale}` |
//! | resize | `DynamicImage::{resize, resize_exact}` |
//! | thumbnail | `DynamicImage::{thumbnail, thumbnail_exact}` |
//! | sharpen | `DynamicImage::unsharpen` |
//! | border | `imageops::replace` onto a filled canvas |
//! | overlay | `imageops::replace` into a tiled row, `imageops::overlay` per row |
//! | Encode → AVIF | `image::codecs::avif::AvifEncoder` (rav1e, speed 6) |
//! | Encode → others | `DynamicImage::write_to` |
//!
//! Images live in a slab keyed by handle id. Each operation removes its input
//! from the slab, works on it without holding the lock, and inserts the result
//! under a fresh id.

use super::backend::{EngineError, ImageEngine, ImageHandle, Loaded, Response};
use super::calculations::{anchor_position, parse_hex_color, resolve_length, resolve_sides, tile_positions};
use super::params::{
    Canvas, Extent, FlipAxis, OutputFormat, Placement, ResizeFilter, Rotation, Sides, Transform,
};
use image::imageops::{self, FilterType};
use image::{DynamicImage, GenericImageView, ImageFormat, Rgba, RgbaImage};
use log::{debug, info};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::Duration;
use url::Url;

/// Largest width or height the engine will allocate.
pub const MAX_DIMENSION: u32 = 16_384;

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Largest upstream body the engine will buffer.
pub const MAX_FETCH_BYTES: u64 = 64 * 1024 * 1024;

/// Upstream headers that describe the original bytes, not the re-encoded ones.
const DROPPED_HEADERS: &[&str] = &[
    "content-length",
    "content-type",
    "content-encoding",
    "transfer-encoding",
    "etag",
];

struct Entry {
    image: DynamicImage,
    format: Option<OutputFormat>,
    headers: Vec<(String, String)>,
}

/// Engine backed by the `image` crate.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustEngine {
    client: reqwest::blocking::Client,
    images: Mutex<HashMap<u64, Entry>>,
    next_id: AtomicU64,
}

/// The process-wide engine, initialised on first use.
///
/// Concurrent first callers block on the same initialisation; later calls
/// return the cached engine (or the cached initialisation error).
pub fn shared_engine() -> Result<&'static RustEngine, EngineError> {
    static ENGINE: OnceLock<Result<RustEngine, String>> = OnceLock::new();
    ENGINE
        .get_or_init(|| {
            info!("Initializing image engine");
            RustEngine::new().map_err(|e| e.to_string())
        })
        .as_ref()
        .map_err(|e| EngineError::Unavailable(e.clone()))
}

impl RustEngine {
    pub fn new() -> Result<Self, EngineError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .user_agent(concat!("imgq/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| EngineError::Unavailable(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            images: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        })
    }

    /// Number of images currently held.
    pub fn live_images(&self) -> usize {
        self.slots().len()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<u64, Entry>> {
        self.images.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn insert(&self, entry: Entry) -> ImageHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.slots().insert(id, entry);
        ImageHandle::new(id)
    }

    fn take(&self, image: ImageHandle) -> Result<Entry, EngineError> {
        self.slots()
            .remove(&image.id())
            .ok_or(EngineError::UnknownHandle(image.id()))
    }
}

fn check_dimensions(width: u32, height: u32) -> Result<(), EngineError> {
    if width == 0 || height == 0 {
        return Err(EngineError::InvalidArgument(format!(
            "Image size {width}x{height} is empty"
        )));
    }
    if width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(EngineError::InvalidArgument(format!(
            "Image size {width}x{height} exceeds maximum of {MAX_DIMENSION}"
        )));
    }
    Ok(())
}

fn fill_color(color: Option<&str>) -> Result<Rgba<u8>, EngineError> {
    match color {
        Some(c) => parse_hex_color(c).map(Rgba).map_err(EngineError::InvalidArgument),
        None => Ok(Rgba([0, 0, 0, 0])),
    }
}

fn output_format(format: ImageFormat) -> Option<OutputFormat> {
    match format {
        ImageFormat::Png => Some(OutputFormat::Png),
        ImageFormat::Jpeg => Some(OutputFormat::Jpeg),
        ImageFormat::WebP => Some(OutputFormat::WebP),
        ImageFormat::Tiff => Some(OutputFormat::Tiff),
        ImageFormat::Avif => Some(OutputFormat::Avif),
        _ => None,
    }
}

fn image_format(format: OutputFormat) -> ImageFormat {
    match format {
        OutputFormat::Png => ImageFormat::Png,
        OutputFormat::Jpeg => ImageFormat::Jpeg,
        OutputFormat::WebP => ImageFormat::WebP,
        OutputFormat::Tiff => ImageFormat::Tiff,
        OutputFormat::Avif => ImageFormat::Avif,
    }
}

fn filter_type(filter: ResizeFilter) -> FilterType {
    match filter {
        ResizeFilter::Nearest => FilterType::Nearest,
        ResizeFilter::Triangle => FilterType::Triangle,
        ResizeFilter::CatmullRom => FilterType::CatmullRom,
        ResizeFilter::Gaussian => FilterType::Gaussian,
        ResizeFilter::Lanczos3 => FilterType::Lanczos3,
    }
}

fn passthrough_headers(headers: &reqwest::header::HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .filter(|(name, _)| !DROPPED_HEADERS.contains(&name.as_str()))
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}

/// Read a body of at most `limit` bytes. A declared length over the limit is
/// rejected before anything is read.
fn read_limited<R: Read>(
    reader: R,
    declared: Option<u64>,
    limit: u64,
    url: &Url,
) -> Result<Vec<u8>, EngineError> {
    let too_large =
        || EngineError::InvalidArgument(format!("{url}: body exceeds maximum of {limit} bytes"));
    if declared.is_some_and(|len| len > limit) {
        return Err(too_large());
    }
    let mut body = Vec::new();
    reader
        .take(limit + 1)
        .read_to_end(&mut body)
        .map_err(|e| EngineError::Fetch(format!("{url}: {e}")))?;
    if body.len() as u64 > limit {
        return Err(too_large());
    }
    Ok(body)
}

fn target_size(image: &DynamicImage, extent: &Extent) -> Result<(u32, u32), EngineError> {
    let width = resolve_length(image.width(), extent.width);
    let height = resolve_length(image.height(), extent.height);
    check_dimensions(width, height)?;
    Ok((width, height))
}

fn add_border(
    image: &DynamicImage,
    sides: &Sides,
    color: Option<&str>,
) -> Result<DynamicImage, EngineError> {
    let (w, h) = image.dimensions();
    let (top, right, bottom, left) = resolve_sides((w, h), sides);
    let fill = fill_color(color)?;
    let too_large = || EngineError::InvalidArgument("Border too large".to_string());
    let new_w = w
        .checked_add(left)
        .and_then(|v| v.checked_add(right))
        .ok_or_else(too_large)?;
    let new_h = h
        .checked_add(top)
        .and_then(|v| v.checked_add(bottom))
        .ok_or_else(too_large)?;
    check_dimensions(new_w, new_h)?;

    let mut canvas = RgbaImage::from_pixel(new_w, new_h, fill);
    imageops::replace(
        &mut canvas,
        &image.to_rgba8(),
        i64::from(left),
        i64::from(top),
    );
    Ok(DynamicImage::ImageRgba8(canvas))
}

fn apply(image: DynamicImage, op: &Transform) -> Result<DynamicImage, EngineError> {
    let out = match op {
        Transform::Blur { sigma } => image.blur(*sigma),
        Transform::Brighten { delta } => image.brighten(*delta),
        Transform::Contrast { factor } => image.adjust_contrast(*factor),
        Transform::Crop {
            x,
            y,
            width,
            height,
        } => {
            let cropped = image.crop_imm(*x, *y, *width, *height);
            if cropped.width() == 0 || cropped.height() == 0 {
                return Err(EngineError::InvalidArgument(
                    "Crop area is outside the image".to_string(),
                ));
            }
            cropped
        }
        Transform::Flip(FlipAxis::Horizontal) => image.fliph(),
        Transform::Flip(FlipAxis::Vertical) => image.flipv(),
        Transform::Grayscale => image.grayscale(),
        Transform::Border { sides, color } => add_border(&image, sides, color.as_deref())?,
        Transform::Resize {
            extent,
            exact,
            filter,
        } => {
            let (w, h) = target_size(&image, extent)?;
            if *exact {
                image.resize_exact(w, h, filter_type(*filter))
            } else {
                image.resize(w, h, filter_type(*filter))
            }
        }
        Transform::Thumbnail { extent, exact } => {
            let (w, h) = target_size(&image, extent)?;
            if *exact {
                image.thumbnail_exact(w, h)
            } else {
                image.thumbnail(w, h)
            }
        }
        Transform::Sharpen { sigma, threshold } => image.unsharpen(*sigma, *threshold),
        Transform::Rotate(Rotation::Deg90) => image.rotate90(),
        Transform::Rotate(Rotation::Deg180) => image.rotate180(),
        Transform::Rotate(Rotation::Deg270) => image.rotate270(),
    };
    Ok(out)
}

fn overlay_onto(base: &DynamicImage, top: &DynamicImage, placement: &Placement) -> DynamicImage {
    let mut canvas = base.to_rgba8();
    let top = top.to_rgba8();
    let (bw, bh) = canvas.dimensions();
    let (tw, th) = top.dimensions();
    let x = anchor_position(bw, tw, placement.x);
    let y = anchor_position(bh, th, placement.y);

    // Lay out one row of tiles, then stamp the row once per vertical position.
    let (row, row_x) = if placement.hrepeat {
        let mut row = RgbaImage::new(bw, th);
        for tx in tile_positions(bw, tw, x, true) {
            imageops::replace(&mut row, &top, tx, 0);
        }
        (row, 0)
    } else {
        (top, x)
    };
    for ty in tile_positions(bh, th, y, placement.vrepeat) {
        imageops::overlay(&mut canvas, &row, row_x, ty);
    }
    DynamicImage::ImageRgba8(canvas)
}

fn encode(image: &DynamicImage, format: OutputFormat) -> Result<Vec<u8>, EngineError> {
    let mut buf = Cursor::new(Vec::new());
    let result = match format {
        OutputFormat::Avif => {
            let encoder = image::codecs::avif::AvifEncoder::new_with_speed_quality(&mut buf, 6, 85);
            DynamicImage::ImageRgba8(image.to_rgba8()).write_with_encoder(encoder)
        }
        // No alpha channel in JPEG.
        OutputFormat::Jpeg => {
            DynamicImage::ImageRgb8(image.to_rgb8()).write_to(&mut buf, ImageFormat::Jpeg)
        }
        other => DynamicImage::ImageRgba8(image.to_rgba8()).write_to(&mut buf, image_format(other)),
    };
    result.map_err(|e| EngineError::Encode(format!("{format}: {e}")))?;
    Ok(buf.into_inner())
}

impl ImageEngine for RustEngine {
    fn load_url(&self, url: &Url) -> Result<Loaded, EngineError> {
        debug!("Fetching {url}");
        let resp = self
            .client
            .get(url.as_str())
            .send()
            .map_err(|e| EngineError::Fetch(format!("{url}: {e}")))?;
        let status = resp.status();

        if !status.is_success() {
            // Hand the upstream response back untouched.
            let headers = resp
                .headers()
                .iter()
                .filter_map(|(k, v)| {
                    v.to_str()
                        .ok()
                        .map(|v| (k.as_str().to_string(), v.to_string()))
                })
                .collect();
            let declared = resp.content_length();
            let body = read_limited(resp, declared, MAX_FETCH_BYTES, url)?;
            return Ok(Loaded::Response(Response {
                status: status.as_u16(),
                headers,
                body,
            }));
        }

        let headers = passthrough_headers(resp.headers());
        let declared = resp.content_length();
        let bytes = read_limited(resp, declared, MAX_FETCH_BYTES, url)?;
        let format = image::guess_format(&bytes)
            .map_err(|e| EngineError::Decode(format!("{url}: {e}")))?;
        let image = image::load_from_memory_with_format(&bytes, format)
            .map_err(|e| EngineError::Decode(format!("{url}: {e}")))?;

        Ok(Loaded::Image(self.insert(Entry {
            image,
            format: output_format(format),
            headers,
        })))
    }

    fn blank(&self, canvas: &Canvas) -> Result<ImageHandle, EngineError> {
        check_dimensions(canvas.width, canvas.height)?;
        let fill = fill_color(canvas.color.as_deref())?;
        let image = RgbaImage::from_pixel(canvas.width, canvas.height, fill);
        Ok(self.insert(Entry {
            image: DynamicImage::ImageRgba8(image),
            format: Some(OutputFormat::Png),
            headers: Vec::new(),
        }))
    }

    fn transform(&self, image: ImageHandle, op: &Transform) -> Result<ImageHandle, EngineError> {
        let entry = self.take(image)?;
        let image = apply(entry.image, op)?;
        Ok(self.insert(Entry { image, ..entry }))
    }

    fn composite(
        &self,
        base: ImageHandle,
        overlay: ImageHandle,
        placement: &Placement,
    ) -> Result<ImageHandle, EngineError> {
        let base = self.take(base);
        let top = self.take(overlay)?;
        let base = base?;
        let image = overlay_onto(&base.image, &top.image, placement);
        Ok(self.insert(Entry { image, ..base }))
    }

    fn build(
        &self,
        image: ImageHandle,
        format: Option<OutputFormat>,
    ) -> Result<Response, EngineError> {
        let entry = self.take(image)?;
        let format = format.or(entry.format).unwrap_or(OutputFormat::Jpeg);
        let body = encode(&entry.image, format)?;

        let mut headers = entry.headers;
        headers.push(("Content-Type".to_string(), format.mime_type().to_string()));
        headers.push((
            "ETag".to_string(),
            format!("\"{:x}\"", Sha256::digest(&body)),
        ));
        Ok(Response {
            status: 200,
            headers,
            body,
        })
    }

    fn release(&self, image: ImageHandle) -> Result<(), EngineError> {
        self.take(image).map(drop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::params::Anchor;
    use crate::values::NumberOrPercent;

    fn engine() -> RustEngine {
        RustEngine::new().unwrap()
    }

    fn canvas(width: u32, height: u32, color: Option<&str>) -> Canvas {
        Canvas {
            width,
            height,
            color: color.map(str::to_string),
        }
    }

    /// Build as PNG and decode again.
    fn decode(engine: &RustEngine, handle: ImageHandle) -> DynamicImage {
        let resp = engine.build(handle, Some(OutputFormat::Png)).unwrap();
        image::load_from_memory(&resp.body).unwrap()
    }

    fn abs(v: f64) -> NumberOrPercent {
        NumberOrPercent::absolute(v)
    }

    #[test]
    fn blank_canvas_has_size_and_color() {
        let engine = engine();
        let h = engine.blank(&canvas(4, 3, Some("ff000080"))).unwrap();
        let img = decode(&engine, h).to_rgba8();
        assert_eq!(img.dimensions(), (4, 3));
        assert_eq!(img.get_pixel(0, 0), &Rgba([255, 0, 0, 128]));
    }

    #[test]
    fn blank_defaults_to_transparent() {
        let engine = engine();
        let h = engine.blank(&canvas(2, 2, None)).unwrap();
        assert_eq!(decode(&engine, h).to_rgba8().get_pixel(1, 1)[3], 0);
    }

    #[test]
    fn blank_rejects_bad_color_as_invalid_argument() {
        let engine = engine();
        let result = engine.blank(&canvas(2, 2, Some("nope")));
        assert!(matches!(result, Err(EngineError::InvalidArgument(_))));
    }

    #[test]
    fn blank_rejects_oversized_canvas() {
        let engine = engine();
        let result = engine.blank(&canvas(MAX_DIMENSION + 1, 1, None));
        assert!(matches!(result, Err(EngineError::InvalidArgument(_))));
    }

    #[test]
    fn transform_consumes_input_handle() {
        let engine = engine();
        let h = engine.blank(&canvas(2, 2, None)).unwrap();
        let id = h.id();
        let h2 = engine.transform(h, &Transform::Grayscale).unwrap();
        assert_ne!(h2.id(), id);
        assert_eq!(engine.live_images(), 1);
        let stale = ImageHandle::new(id);
        assert!(matches!(
            engine.transform(stale, &Transform::Grayscale),
            Err(EngineError::UnknownHandle(_))
        ));
        engine.release(h2).unwrap();
        assert_eq!(engine.live_images(), 0);
    }

    #[test]
    fn failed_transform_still_consumes() {
        let engine = engine();
        let h = engine.blank(&canvas(10, 10, None)).unwrap();
        let op = Transform::Crop {
            x: 50,
            y: 50,
            width: 5,
            height: 5,
        };
        assert!(engine.transform(h, &op).is_err());
        assert_eq!(engine.live_images(), 0);
    }

    #[test]
    fn crop_and_rotate_dimensions() {
        let engine = engine();
        let h = engine.blank(&canvas(40, 30, None)).unwrap();
        let h = engine
            .transform(
                h,
                &Transform::Crop {
                    x: 1,
                    y: 2,
                    width: 10,
                    height: 20,
                },
            )
            .unwrap();
        let h = engine.transform(h, &Transform::Rotate(Rotation::Deg90)).unwrap();
        assert_eq!(decode(&engine, h).dimensions(), (20, 10));
    }

    #[test]
    fn border_grows_and_fills() {
        let engine = engine();
        let h = engine.blank(&canvas(10, 10, Some("00000000"))).unwrap();
        let op = Transform::Border {
            sides: Sides {
                top: abs(1.0),
                right: abs(2.0),
                bottom: abs(3.0),
                left: abs(4.0),
            },
            color: Some("00ff00ff".to_string()),
        };
        let h = engine.transform(h, &op).unwrap();
        let img = decode(&engine, h).to_rgba8();
        assert_eq!(img.dimensions(), (16, 14));
        assert_eq!(img.get_pixel(0, 0), &Rgba([0, 255, 0, 255]));
        assert_eq!(img.get_pixel(5, 2)[3], 0);
    }

    #[test]
    fn resize_exact_and_percent() {
        let engine = engine();
        let h = engine.blank(&canvas(100, 50, None)).unwrap();
        let op = Transform::Resize {
            extent: Extent {
                width: NumberOrPercent::percent(0.5),
                height: abs(40.0),
            },
            exact: true,
            filter: ResizeFilter::Nearest,
        };
        let h = engine.transform(h, &op).unwrap();
        assert_eq!(decode(&engine, h).dimensions(), (50, 40));
    }

    #[test]
    fn resize_preserves_aspect_by_default() {
        let engine = engine();
        let h = engine.blank(&canvas(100, 50, None)).unwrap();
        let op = Transform::Resize {
            extent: Extent {
                width: abs(50.0),
                height: abs(50.0),
            },
            exact: false,
            filter: ResizeFilter::default(),
        };
        let h = engine.transform(h, &op).unwrap();
        assert_eq!(decode(&engine, h).dimensions(), (50, 25));
    }

    #[test]
    fn thumbnail_to_zero_is_invalid() {
        let engine = engine();
        let h = engine.blank(&canvas(10, 10, None)).unwrap();
        let op = Transform::Thumbnail {
            extent: Extent {
                width: abs(0.0),
                height: abs(0.0),
            },
            exact: false,
        };
        assert!(matches!(
            engine.transform(h, &op),
            Err(EngineError::InvalidArgument(_))
        ));
    }

    #[test]
    fn overlay_places_at_anchor() {
        let engine = engine();
        let base = engine.blank(&canvas(10, 10, Some("000000ff"))).unwrap();
        let top = engine.blank(&canvas(2, 2, Some("ffffffff"))).unwrap();
        let placement = Placement {
            x: Anchor::End,
            y: Anchor::Start,
            ..Placement::default()
        };
        let h = engine.composite(base, top, &placement).unwrap();
        let img = decode(&engine, h).to_rgba8();
        assert_eq!(img.get_pixel(9, 0), &Rgba([255, 255, 255, 255]));
        assert_eq!(img.get_pixel(0, 0), &Rgba([0, 0, 0, 255]));
        assert_eq!(engine.live_images(), 0);
    }

    #[test]
    fn overlay_hrepeat_tiles_row() {
        let engine = engine();
        let base = engine.blank(&canvas(10, 4, Some("000000ff"))).unwrap();
        let top = engine.blank(&canvas(3, 1, Some("ffffffff"))).unwrap();
        let placement = Placement {
            x: Anchor::Start,
            y: Anchor::Start,
            hrepeat: true,
            vrepeat: false,
        };
        let h = engine.composite(base, top, &placement).unwrap();
        let img = decode(&engine, h).to_rgba8();
        for x in 0..10 {
            assert_eq!(img.get_pixel(x, 0)[0], 255, "column {x}");
        }
        assert_eq!(img.get_pixel(0, 1)[0], 0);
    }

    #[test]
    fn overlay_tiles_both_axes_from_offset() {
        let engine = engine();
        let base = engine.blank(&canvas(7, 5, Some("000000ff"))).unwrap();
        let top = engine.blank(&canvas(2, 2, Some("ffffff80"))).unwrap();
        let placement = Placement {
            x: Anchor::Offset(abs(1.0)),
            y: Anchor::Offset(abs(1.0)),
            hrepeat: true,
            vrepeat: true,
        };
        let h = engine.composite(base, top, &placement).unwrap();
        let img = decode(&engine, h).to_rgba8();
        let first = *img.get_pixel(0, 0);
        assert!(first[0] > 0 && first[0] < 255, "half-transparent tile blended");
        for (x, y, px) in img.enumerate_pixels() {
            assert_eq!(*px, first, "pixel {x},{y} covered exactly once");
        }
        assert_eq!(engine.live_images(), 0);
    }

    #[test]
    fn tiny_overlay_tiles_large_canvas() {
        let engine = engine();
        let base = engine.blank(&canvas(2048, 2048, None)).unwrap();
        let top = engine.blank(&canvas(1, 1, Some("ffffffff"))).unwrap();
        let placement = Placement {
            hrepeat: true,
            vrepeat: true,
            ..Placement::default()
        };
        let h = engine.composite(base, top, &placement).unwrap();
        let img = decode(&engine, h).to_rgba8();
        assert_eq!(img.get_pixel(0, 0), &Rgba([255, 255, 255, 255]));
        assert_eq!(img.get_pixel(2047, 2047), &Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn body_within_limit_is_read() {
        let url = Url::parse("https://cdn.test/a.png").unwrap();
        let body = read_limited(&b"12345678"[..], None, 8, &url).unwrap();
        assert_eq!(body, b"12345678");
    }

    #[test]
    fn body_over_limit_is_rejected() {
        let url = Url::parse("https://cdn.test/a.png").unwrap();
        assert!(matches!(
            read_limited(&b"123456789"[..], None, 8, &url),
            Err(EngineError::InvalidArgument(_))
        ));
    }

    #[test]
    fn declared_length_over_limit_is_rejected_unread() {
        let url = Url::parse("https://cdn.test/a.png").unwrap();
        let result = read_limited(std::io::repeat(0), Some(1 << 40), MAX_FETCH_BYTES, &url);
        assert!(matches!(result, Err(EngineError::InvalidArgument(_))));
    }

    #[test]
    fn undeclared_endless_body_stops_at_limit() {
        let url = Url::parse("https://cdn.test/a.png").unwrap();
        let result = read_limited(std::io::repeat(0), None, 1024, &url);
        assert!(matches!(result, Err(EngineError::InvalidArgument(_))));
    }

    #[test]
    fn build_defaults_to_source_format() {
        let engine = engine();
        let h = engine.blank(&canvas(2, 2, None)).unwrap();
        let resp = engine.build(h, None).unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(resp.header("content-type"), Some("image/png"));
        assert_eq!(image::guess_format(&resp.body).unwrap(), ImageFormat::Png);
        assert!(resp.header("etag").is_some_and(|e| e.starts_with('"')));
    }

    #[test]
    fn build_jpeg_drops_alpha() {
        let engine = engine();
        let h = engine.blank(&canvas(8, 8, Some("ff000080"))).unwrap();
        let resp = engine.build(h, Some(OutputFormat::Jpeg)).unwrap();
        assert_eq!(resp.header("content-type"), Some("image/jpeg"));
        assert_eq!(image::guess_format(&resp.body).unwrap(), ImageFormat::Jpeg);
    }

    #[test]
    fn build_webp() {
        let engine = engine();
        let h = engine.blank(&canvas(8, 8, None)).unwrap();
        let resp = engine.build(h, Some(OutputFormat::WebP)).unwrap();
        assert_eq!(image::guess_format(&resp.body).unwrap(), ImageFormat::WebP);
    }

    #[test]
    fn release_unknown_handle_errors() {
        let engine = engine();
        assert!(engine.release(ImageHandle::new(12345)).is_err());
    }

    #[test]
    fn shared_engine_is_a_singleton() {
        let a = shared_engine().unwrap() as *const RustEngine;
        let b = shared_engine().unwrap() as *const RustEngine;
        assert_eq!(a, b);
    }
}
