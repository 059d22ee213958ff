//! Logo sources and opacity compositing.
//!
//! A [`LogoSource`] is the raw uploaded image: encoded bytes plus an
//! identity assigned at upload. [`composite_logo`] turns a source and an
//! opacity factor into a [`ProcessedLogo`] by drawing it once onto an
//! offscreen surface with that opacity, then re-encoding it as PNG.
//!
//! Compositing never fails from the caller's point of view. If the source
//! cannot be decoded or no surface can be allocated, the original bytes are
//! handed back untouched and the opacity effect is skipped.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use image::{ImageFormat, RgbaImage};
use resvg::tiny_skia::{BlendMode, FilterQuality, Pixmap, PixmapPaint, Transform};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, LogoError};
use crate::render::raster;

const SVG_MIME: &str = "image/svg+xml";
const UNKNOWN_MIME: &str = "application/octet-stream";

static NEXT_LOGO_ID: AtomicU64 = AtomicU64::new(1);

// ============================================================================
// Identity
// ============================================================================

/// Process-unique identity of an uploaded logo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LogoId(u64);

impl LogoId {
    fn next() -> Self {
        Self(NEXT_LOGO_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for LogoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "logo#{}", self.0)
    }
}

/// The `(logo, opacity)` pair a processed logo was produced for.
///
/// Opacity is compared bitwise, so any change to the factor yields a new key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LogoKey {
    logo: LogoId,
    opacity_bits: u32,
}

impl LogoKey {
    pub fn new(logo: LogoId, opacity: f32) -> Self {
        Self {
            logo,
            opacity_bits: opacity.to_bits(),
        }
    }

    pub fn logo(&self) -> LogoId {
        self.logo
    }

    pub fn opacity(&self) -> f32 {
        f32::from_bits(self.opacity_bits)
    }
}

// ============================================================================
// LogoSource
// ============================================================================

/// A raw uploaded logo image.
///
/// Clones share the same bytes and the same [`LogoId`]; equality is identity,
/// so uploading the same file twice produces two distinct sources.
#[derive(Clone)]
pub struct LogoSource {
    id: LogoId,
    data: Arc<[u8]>,
    mime_type: &'static str,
}

impl LogoSource {
    /// Wraps encoded image bytes (PNG, JPEG, SVG, ...) as a new upload.
    pub fn new(data: impl Into<Arc<[u8]>>) -> Self {
        let data = data.into();
        Self {
            id: LogoId::next(),
            mime_type: sniff_mime(&data),
            data,
        }
    }

    /// Parses a `data:<mime>;base64,<payload>` URL.
    pub fn from_data_url(url: &str) -> Result<Self, ConfigError> {
        let rest = url.strip_prefix("data:").ok_or(ConfigError::InvalidDataUrl)?;
        let (header, payload) = rest.split_once(',').ok_or(ConfigError::InvalidDataUrl)?;
        if !header.ends_with(";base64") {
            return Err(ConfigError::InvalidDataUrl);
        }
        let bytes = BASE64.decode(payload.trim())?;
        Ok(Self::new(bytes))
    }

    pub fn id(&self) -> LogoId {
        self.id
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn mime_type(&self) -> &'static str {
        self.mime_type
    }

    pub fn to_data_url(&self) -> String {
        data_url(self.mime_type, &self.data)
    }
}

impl PartialEq for LogoSource {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for LogoSource {}

impl fmt::Debug for LogoSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogoSource")
            .field("id", &self.id)
            .field("mime_type", &self.mime_type)
            .field("len", &self.data.len())
            .finish()
    }
}

impl Serialize for LogoSource {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_data_url())
    }
}

impl<'de> Deserialize<'de> for LogoSource {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let url = String::deserialize(deserializer)?;
        Self::from_data_url(&url).map_err(serde::de::Error::custom)
    }
}

#[cfg(feature = "jsonschema")]
impl schemars::JsonSchema for LogoSource {
    fn schema_name() -> String {
        "LogoDataUrl".to_owned()
    }

    fn json_schema(generator: &mut schemars::r#gen::SchemaGenerator) -> schemars::schema::Schema {
        String::json_schema(generator)
    }
}

// ============================================================================
// ProcessedLogo
// ============================================================================

/// A logo ready to embed in a render.
///
/// Either a PNG with the opacity applied, or (after a degraded run) the
/// original upload unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedLogo {
    key: LogoKey,
    data: Arc<[u8]>,
    mime_type: &'static str,
    dimensions: Option<(u32, u32)>,
    composited: bool,
}

impl ProcessedLogo {
    /// Wraps the unprocessed source for `key`.
    pub fn passthrough(key: LogoKey, source: &LogoSource) -> Self {
        Self {
            key,
            data: Arc::clone(&source.data),
            mime_type: source.mime_type,
            dimensions: None,
            composited: false,
        }
    }

    /// The `(logo, opacity)` pair this result belongs to.
    pub fn key(&self) -> LogoKey {
        self.key
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn mime_type(&self) -> &'static str {
        self.mime_type
    }

    /// Pixel dimensions, known when compositing succeeded.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.dimensions
    }

    /// Returns false when the opacity step was skipped.
    pub fn is_composited(&self) -> bool {
        self.composited
    }

    pub fn to_data_url(&self) -> String {
        data_url(self.mime_type, &self.data)
    }

    /// Decodes the composited PNG back into pixels.
    pub fn decode(&self) -> Result<RgbaImage, LogoError> {
        decode_logo(&self.data)
    }
}

impl Serialize for ProcessedLogo {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_data_url())
    }
}

#[cfg(feature = "jsonschema")]
impl schemars::JsonSchema for ProcessedLogo {
    fn schema_name() -> String {
        "ProcessedLogoDataUrl".to_owned()
    }

    fn json_schema(generator: &mut schemars::r#gen::SchemaGenerator) -> schemars::schema::Schema {
        String::json_schema(generator)
    }
}

// ============================================================================
// Compositing
// ============================================================================

/// Applies `opacity` to `source`, falling back to the original bytes.
pub fn composite_logo(source: &LogoSource, opacity: f32) -> ProcessedLogo {
    let key = LogoKey::new(source.id(), opacity);

    let result = decode_logo(source.data()).and_then(|decoded| {
        let blended = apply_opacity(&decoded, opacity)?;
        let png = raster::encode_image(&blended, ImageFormat::Png, image::Rgba([0, 0, 0, 0]))
            .map_err(LogoError::Encode)?;
        Ok((png, blended.dimensions()))
    });

    match result {
        Ok((png, dimensions)) => {
            log::debug!(
                "{} composited at opacity {} ({}x{})",
                source.id(),
                opacity,
                dimensions.0,
                dimensions.1
            );
            ProcessedLogo {
                key,
                data: png.into(),
                mime_type: ImageFormat::Png.to_mime_type(),
                dimensions: Some(dimensions),
                composited: true,
            }
        }
        Err(err) => {
            log::warn!("{} left unprocessed: {}", source.id(), err);
            ProcessedLogo::passthrough(key, source)
        }
    }
}

/// Draws `source` once at the origin of a same-sized transparent surface
/// with a global alpha of `opacity`.
///
/// The surface clamps the factor to `[0, 1]` and ignores NaN.
pub fn apply_opacity(source: &RgbaImage, opacity: f32) -> Result<RgbaImage, LogoError> {
    let (width, height) = source.dimensions();
    let unavailable = || LogoError::SurfaceUnavailable { width, height };

    let src = raster::rgba_image_to_pixmap(source).ok_or_else(unavailable)?;
    let mut surface = Pixmap::new(width, height).ok_or_else(unavailable)?;

    let paint = PixmapPaint {
        opacity: surface_alpha(opacity),
        blend_mode: BlendMode::SourceOver,
        quality: FilterQuality::Nearest,
    };
    surface.draw_pixmap(0, 0, src.as_ref(), &paint, Transform::identity(), None);

    Ok(raster::pixmap_to_rgba_image(&surface))
}

fn surface_alpha(opacity: f32) -> f32 {
    if opacity.is_nan() {
        1.0
    } else {
        opacity.clamp(0.0, 1.0)
    }
}

/// Decodes raster formats with `image` and SVG documents with resvg at
/// their natural size.
fn decode_logo(data: &[u8]) -> Result<RgbaImage, LogoError> {
    match image::load_from_memory(data) {
        Ok(decoded) => Ok(decoded.to_rgba8()),
        Err(err) if !looks_like_svg(data) => Err(LogoError::Decode(err)),
        Err(_) => {
            let tree = raster::parse_svg(data).map_err(LogoError::Svg)?;
            raster::render_tree(&tree).ok_or_else(|| {
                let (width, height) = raster::natural_size(&tree);
                LogoError::SurfaceUnavailable { width, height }
            })
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn sniff_mime(data: &[u8]) -> &'static str {
    match image::guess_format(data) {
        Ok(format) => format.to_mime_type(),
        Err(_) if looks_like_svg(data) => SVG_MIME,
        Err(_) => UNKNOWN_MIME,
    }
}

fn looks_like_svg(data: &[u8]) -> bool {
    let head = &data[..data.len().min(512)];
    String::from_utf8_lossy(head).contains("<svg")
}

fn data_url(mime_type: &str, data: &[u8]) -> String {
    format!("data:{};base64,{}", mime_type, BASE64.encode(data))
}
