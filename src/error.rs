//! Error types.
//!
//! Nothing in the core is fatal: [`LogoError`] is absorbed by the logo
//! post-processor, and [`RenderError`] is recorded by the studio next to the
//! options that produced it.

use thiserror::Error;

use crate::config::ErrorCorrectionLevel;

/// Errors raised while building or importing a [`Configuration`](crate::Configuration).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown configuration field `{0}`")]
    UnknownField(String),

    #[error("invalid color `{value}` for `{field}`")]
    InvalidColor {
        field: &'static str,
        value: String,
        #[source]
        source: palette::rgb::FromHexError,
    },

    #[error("invalid number `{value}` for `{field}`")]
    InvalidNumber { field: &'static str, value: String },

    #[error("invalid value `{value}` for `{field}`")]
    InvalidChoice { field: &'static str, value: String },

    #[error("malformed logo data URL")]
    InvalidDataUrl,

    #[error("logo data URL is not valid base64")]
    Base64(#[from] base64::DecodeError),

    #[error("configuration JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failures inside logo compositing.
///
/// The post-processor never surfaces these; it falls back to the original
/// image and logs them instead.
#[derive(Debug, Error)]
pub enum LogoError {
    #[error("failed to decode logo: {0}")]
    Decode(#[source] image::ImageError),

    #[error("failed to parse SVG logo: {0}")]
    Svg(#[source] resvg::usvg::Error),

    #[error("no drawing surface available for a {width}x{height} logo")]
    SurfaceUnavailable { width: u32, height: u32 },

    #[error("failed to encode processed logo: {0}")]
    Encode(#[source] image::ImageError),
}

/// Failures of the rendering collaborator.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("payload too long for error correction level {level}")]
    DataTooLong { level: ErrorCorrectionLevel },

    #[error("failed to encode QR symbol: {0}")]
    Encode(#[source] qrcode::types::QrError),

    #[error("failed to parse rendered SVG: {0}")]
    Svg(#[source] resvg::usvg::Error),

    #[error("no drawing surface available for a {width}x{height} render")]
    SurfaceUnavailable { width: u32, height: u32 },

    #[error("failed to export rendered code: {0}")]
    Export(#[source] image::ImageError),

    #[error("nothing has been rendered yet")]
    NothingRendered,
}

/// Errors constructing a [`Studio`](crate::Studio).
#[derive(Debug, Error)]
pub enum StudioError {
    #[error("a tokio runtime is required for logo processing")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),
}
