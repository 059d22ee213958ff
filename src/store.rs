//! Copy-on-write configuration store.
//!
//! The store owns the current [`Configuration`] as an immutable snapshot.
//! Every [`FieldUpdate`] produces a new snapshot; readers holding an older
//! `Arc` keep seeing a complete, consistent record.
//!
//! # Update rules
//!
//! - Uploading (or loading) a logo when none was set forces the error
//!   correction level to [`ErrorCorrectionLevel::H`] in the same update.
//!   Later updates may lower it again.
//! - Switching advanced eye colors (or radii) on seeds the outer and inner
//!   values from the single value.

use std::sync::Arc;

use crate::color::HexColor;
use crate::config::{Configuration, ErrorCorrectionLevel, LogoPaddingStyle, QrStyle};
use crate::error::ConfigError;
use crate::logo::LogoSource;

// ============================================================================
// FieldUpdate
// ============================================================================

/// A single field change emitted by a form control.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldUpdate {
    Payload(String),
    Foreground(HexColor),
    Background(HexColor),
    QrStyle(QrStyle),
    EyeColor(HexColor),
    EyeColorOuter(HexColor),
    EyeColorInner(HexColor),
    AdvancedEyeColors(bool),
    EyeRadius(u32),
    EyeRadiusOuter(u32),
    EyeRadiusInner(u32),
    AdvancedEyeRadius(bool),
    /// Upload (`Some`) or removal (`None`) of the logo.
    Logo(Option<LogoSource>),
    LogoSize(u32),
    LogoOpacity(f32),
    LogoPadding(u32),
    LogoPaddingStyle(LogoPaddingStyle),
    LogoPaddingRadius(u32),
    LogoBackground(bool),
    LogoBackgroundColor(HexColor),
    QuietZone(u32),
    ErrorCorrectionLevel(ErrorCorrectionLevel),
    Size(u32),
}

impl FieldUpdate {
    /// Parses a form event: a camelCase field name and its string value.
    ///
    /// Checkbox values are `"true"`/`"false"`; sliders send decimal numbers.
    /// Logo uploads carry a data URL, and an empty value removes the logo.
    pub fn parse(field: &str, value: &str) -> Result<Self, ConfigError> {
        let update = match field {
            "data" => Self::Payload(value.to_owned()),
            "foregroundColor" => Self::Foreground(color("foregroundColor", value)?),
            "backgroundColor" => Self::Background(color("backgroundColor", value)?),
            "qrStyle" => Self::QrStyle(choice("qrStyle", value)?),
            "eyeColor" => Self::EyeColor(color("eyeColor", value)?),
            "eyeColorOuter" => Self::EyeColorOuter(color("eyeColorOuter", value)?),
            "eyeColorInner" => Self::EyeColorInner(color("eyeColorInner", value)?),
            "useAdvancedEyeColors" => Self::AdvancedEyeColors(flag("useAdvancedEyeColors", value)?),
            "eyeRadius" => Self::EyeRadius(pixels("eyeRadius", value)?),
            "eyeRadiusOuter" => Self::EyeRadiusOuter(pixels("eyeRadiusOuter", value)?),
            "eyeRadiusInner" => Self::EyeRadiusInner(pixels("eyeRadiusInner", value)?),
            "useAdvancedEyeRadius" => Self::AdvancedEyeRadius(flag("useAdvancedEyeRadius", value)?),
            "logo" if value.is_empty() => Self::Logo(None),
            "logo" => Self::Logo(Some(LogoSource::from_data_url(value)?)),
            "logoSize" => Self::LogoSize(pixels("logoSize", value)?),
            "logoOpacity" => Self::LogoOpacity(factor("logoOpacity", value)?),
            "logoPadding" => Self::LogoPadding(pixels("logoPadding", value)?),
            "logoPaddingStyle" => Self::LogoPaddingStyle(choice("logoPaddingStyle", value)?),
            "logoPaddingRadius" => Self::LogoPaddingRadius(pixels("logoPaddingRadius", value)?),
            "logoBackground" => Self::LogoBackground(flag("logoBackground", value)?),
            "logoBackgroundColor" => {
                Self::LogoBackgroundColor(color("logoBackgroundColor", value)?)
            }
            "quietZone" => Self::QuietZone(pixels("quietZone", value)?),
            "errorCorrectionLevel" => {
                Self::ErrorCorrectionLevel(choice("errorCorrectionLevel", value)?)
            }
            "size" => Self::Size(pixels("size", value)?),
            other => return Err(ConfigError::UnknownField(other.to_owned())),
        };
        Ok(update)
    }

    /// Returns true if this update can change the processed logo.
    pub fn touches_logo(&self) -> bool {
        matches!(self, Self::Logo(_) | Self::LogoOpacity(_))
    }

    fn apply_to(self, config: &mut Configuration) {
        match self {
            Self::Payload(v) => config.payload = v,
            Self::Foreground(v) => config.foreground = v,
            Self::Background(v) => config.background = v,
            Self::QrStyle(v) => config.qr_style = v,
            Self::EyeColor(v) => config.eye_color = v,
            Self::EyeColorOuter(v) => config.eye_color_outer = v,
            Self::EyeColorInner(v) => config.eye_color_inner = v,
            Self::AdvancedEyeColors(on) => {
                if on && !config.use_advanced_eye_colors {
                    config.eye_color_outer = config.eye_color;
                    config.eye_color_inner = config.eye_color;
                }
                config.use_advanced_eye_colors = on;
            }
            Self::EyeRadius(v) => config.eye_radius = v,
            Self::EyeRadiusOuter(v) => config.eye_radius_outer = v,
            Self::EyeRadiusInner(v) => config.eye_radius_inner = v,
            Self::AdvancedEyeRadius(on) => {
                if on && !config.use_advanced_eye_radius {
                    config.eye_radius_outer = config.eye_radius;
                    config.eye_radius_inner = config.eye_radius;
                }
                config.use_advanced_eye_radius = on;
            }
            Self::Logo(logo) => {
                if logo.is_some() && config.logo.is_none() {
                    config.error_correction_level = ErrorCorrectionLevel::H;
                }
                config.logo = logo;
            }
            Self::LogoSize(v) => config.logo_size = v,
            Self::LogoOpacity(v) => config.logo_opacity = v,
            Self::LogoPadding(v) => config.logo_padding = v,
            Self::LogoPaddingStyle(v) => config.logo_padding_style = v,
            Self::LogoPaddingRadius(v) => config.logo_padding_radius = v,
            Self::LogoBackground(v) => config.logo_background = v,
            Self::LogoBackgroundColor(v) => config.logo_background_color = v,
            Self::QuietZone(v) => config.quiet_zone = v,
            Self::ErrorCorrectionLevel(v) => config.error_correction_level = v,
            Self::Size(v) => config.size = v,
        }
    }
}

fn color(field: &'static str, value: &str) -> Result<HexColor, ConfigError> {
    value.parse().map_err(|source| ConfigError::InvalidColor {
        field,
        value: value.to_owned(),
        source,
    })
}

fn choice<T: std::str::FromStr>(field: &'static str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidChoice {
        field,
        value: value.to_owned(),
    })
}

fn flag(field: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value {
        "true" | "on" | "1" => Ok(true),
        "false" | "off" | "0" => Ok(false),
        _ => Err(ConfigError::InvalidChoice {
            field,
            value: value.to_owned(),
        }),
    }
}

/// Slider values may arrive as decimals ("12.0"); pixels are whole numbers.
fn pixels(field: &'static str, value: &str) -> Result<u32, ConfigError> {
    let number = factor(field, value)?;
    if number < 0.0 || number > u32::MAX as f32 {
        return Err(ConfigError::InvalidNumber {
            field,
            value: value.to_owned(),
        });
    }
    Ok(number.round() as u32)
}

fn factor(field: &'static str, value: &str) -> Result<f32, ConfigError> {
    value
        .trim()
        .parse::<f32>()
        .ok()
        .filter(|n| n.is_finite())
        .ok_or_else(|| ConfigError::InvalidNumber {
            field,
            value: value.to_owned(),
        })
}

// ============================================================================
// ConfigStore
// ============================================================================

/// What a single update did.
#[derive(Debug, Clone)]
pub struct UpdateOutcome {
    /// The snapshot after the update.
    pub snapshot: Arc<Configuration>,
    /// True if any field changed value.
    pub changed: bool,
    /// True if the logo or its opacity changed.
    pub logo_inputs_changed: bool,
}

/// Holds the live configuration snapshot and its version.
///
/// The version increments on every update that changes a value and is
/// used as the configuration digest for change detection.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    current: Arc<Configuration>,
    version: u64,
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new(Configuration::default())
    }
}

impl ConfigStore {
    pub fn new(config: Configuration) -> Self {
        Self {
            current: Arc::new(config),
            version: 0,
        }
    }

    /// Returns the current snapshot.
    pub fn snapshot(&self) -> Arc<Configuration> {
        Arc::clone(&self.current)
    }

    /// Returns the current version number.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Applies one field update as a whole-value replacement.
    ///
    /// Updates that leave every field unchanged keep the current snapshot
    /// and version.
    pub fn apply(&mut self, update: FieldUpdate) -> UpdateOutcome {
        let mut next = Configuration::clone(&self.current);
        update.apply_to(&mut next);
        self.commit(next)
    }

    /// Replaces the whole configuration, for example after loading a file.
    ///
    /// A replacement that brings a logo where there was none forces the
    /// level to [`ErrorCorrectionLevel::H`], like an upload does. Only the
    /// configuration given to [`new`](Self::new) keeps its saved level.
    pub fn replace(&mut self, mut config: Configuration) -> UpdateOutcome {
        if self.current.logo.is_none() && config.logo.is_some() {
            config.error_correction_level = ErrorCorrectionLevel::H;
        }
        self.commit(config)
    }

    fn commit(&mut self, next: Configuration) -> UpdateOutcome {
        let opacity_changed =
            next.logo_opacity.to_bits() != self.current.logo_opacity.to_bits();
        let logo_inputs_changed = opacity_changed || next.logo != self.current.logo;
        let changed = opacity_changed || !same_values(&next, &self.current);

        if changed {
            self.current = Arc::new(next);
            self.version = self.version.wrapping_add(1);
        }

        UpdateOutcome {
            snapshot: self.snapshot(),
            changed,
            logo_inputs_changed: changed && logo_inputs_changed,
        }
    }
}

/// Field equality, ignoring the opacity (compared bitwise by the caller so
/// a NaN factor equals itself).
fn same_values(a: &Configuration, b: &Configuration) -> bool {
    let ignore_opacity = |config: &Configuration| Configuration {
        logo_opacity: 0.0,
        ..config.clone()
    };
    ignore_opacity(a) == ignore_opacity(b)
}

// ============================================================================
// Tests
// ============================================================================
