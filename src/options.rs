//! Derivation of renderer-ready options.
//!
//! [`derive_options`] is a pure function of a configuration snapshot and the
//! processed logo produced for it. It resolves the eye color and eye radius
//! modes into their final shape and flattens everything else.

use serde::Serialize;

use crate::color::HexColor;
use crate::config::{Configuration, ErrorCorrectionLevel, LogoPaddingStyle, QrStyle};
use crate::logo::{LogoKey, ProcessedLogo};

// ============================================================================
// EyeSetting
// ============================================================================

/// A finder-pattern ("eye") setting: one value for the whole eye, or
/// separate values for the outer ring and the inner square.
///
/// Serializes as either the bare value or `{ "outer": .., "inner": .. }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "jsonschema", derive(schemars::JsonSchema))]
#[serde(untagged)]
pub enum EyeSetting<T> {
    Uniform(T),
    Split { outer: T, inner: T },
}

impl<T: Copy> EyeSetting<T> {
    pub fn outer(&self) -> T {
        match *self {
            Self::Uniform(value) => value,
            Self::Split { outer, .. } => outer,
        }
    }

    pub fn inner(&self) -> T {
        match *self {
            Self::Uniform(value) => value,
            Self::Split { inner, .. } => inner,
        }
    }

    pub fn is_split(&self) -> bool {
        matches!(self, Self::Split { .. })
    }
}

/// Resolved eye colors.
pub type EyeColor = EyeSetting<HexColor>;

/// Resolved eye corner radii, in pixels.
pub type EyeRadius = EyeSetting<u32>;

// ============================================================================
// RenderOptions
// ============================================================================

/// Everything the renderer needs, fully resolved.
///
/// Determined entirely by the configuration snapshot and processed logo it
/// was derived from.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "jsonschema", derive(schemars::JsonSchema))]
#[serde(rename_all = "camelCase")]
pub struct RenderOptions {
    pub value: String,
    pub size: u32,
    pub fg_color: HexColor,
    pub bg_color: HexColor,
    pub qr_style: QrStyle,
    pub eye_color: EyeColor,
    pub eye_radius: EyeRadius,

    /// The processed logo; `None` renders no logo and leaves the other logo
    /// fields inert.
    pub logo_image: Option<ProcessedLogo>,
    pub logo_width: u32,
    pub logo_height: u32,
    pub logo_opacity: f32,
    pub logo_padding: u32,
    pub logo_padding_style: LogoPaddingStyle,
    pub logo_padding_radius: u32,
    pub logo_background: bool,
    pub logo_background_color: HexColor,

    pub ec_level: ErrorCorrectionLevel,
    pub quiet_zone: u32,
}

impl RenderOptions {
    /// Serializes the options to a JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Serializes the options to a pretty-printed JSON string.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Derives render options from a configuration and its processed logo.
///
/// A processed logo is only used when it was produced for this
/// configuration's `(logo, opacity)` pair; anything else renders no logo.
pub fn derive_options(config: &Configuration, logo: Option<&ProcessedLogo>) -> RenderOptions {
    let eye_color = if config.use_advanced_eye_colors {
        EyeSetting::Split {
            outer: config.eye_color_outer,
            inner: config.eye_color_inner,
        }
    } else {
        EyeSetting::Uniform(config.eye_color)
    };

    let eye_radius = if config.use_advanced_eye_radius {
        EyeSetting::Split {
            outer: config.eye_radius_outer,
            inner: config.eye_radius_inner,
        }
    } else {
        EyeSetting::Uniform(config.eye_radius)
    };

    let logo_image = config.logo.as_ref().and_then(|source| {
        let key = LogoKey::new(source.id(), config.logo_opacity);
        logo.filter(|processed| processed.key() == key).cloned()
    });

    RenderOptions {
        value: config.payload.clone(),
        size: config.size,
        fg_color: config.foreground,
        bg_color: config.background,
        qr_style: config.qr_style,
        eye_color,
        eye_radius,
        logo_image,
        logo_width: config.logo_size,
        logo_height: config.logo_size,
        logo_opacity: config.logo_opacity,
        logo_padding: config.logo_padding,
        logo_padding_style: config.logo_padding_style,
        logo_padding_radius: config.logo_padding_radius,
        logo_background: config.logo_background,
        logo_background_color: config.logo_background_color,
        ec_level: config.error_correction_level,
        quiet_zone: config.quiet_zone,
    }
}

// ============================================================================
// Tests
// ============================================================================
