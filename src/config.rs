//! The user-facing QR configuration record.
//!
//! A [`Configuration`] captures every parameter the form exposes, in a
//! format that serializes to camelCase JSON so a saved design can be
//! reloaded later.
//!
//! # JSON Format
//!
//! ```json
//! {
//!   "data": "https://example.com/",
//!   "foregroundColor": "#0b1226",
//!   "backgroundColor": "#ffffff",
//!   "qrStyle": "dots",
//!   "useAdvancedEyeColors": true,
//!   "eyeColorOuter": "#ff0000",
//!   "eyeColorInner": "#0000ff",
//!   "logo": "data:image/png;base64,...",
//!   "logoOpacity": 0.6,
//!   "errorCorrectionLevel": "H"
//! }
//! ```
//!
//! Missing fields take their defaults.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::color::HexColor;
use crate::logo::LogoSource;

// ============================================================================
// Enumerations
// ============================================================================

/// Shape used for the data modules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "jsonschema", derive(schemars::JsonSchema))]
#[serde(rename_all = "lowercase")]
pub enum QrStyle {
    /// One square per module.
    #[default]
    Squares,
    /// One circle per module.
    Dots,
    /// Squares whose free corners are rounded, so runs of modules read as
    /// continuous shapes.
    Fluid,
}

impl FromStr for QrStyle {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "squares" => Ok(Self::Squares),
            "dots" => Ok(Self::Dots),
            "fluid" => Ok(Self::Fluid),
            _ => Err(()),
        }
    }
}

/// Shape of the cleared area behind the logo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "jsonschema", derive(schemars::JsonSchema))]
#[serde(rename_all = "lowercase")]
pub enum LogoPaddingStyle {
    #[default]
    Square,
    Circle,
}

impl FromStr for LogoPaddingStyle {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "square" => Ok(Self::Square),
            "circle" => Ok(Self::Circle),
            _ => Err(()),
        }
    }
}

/// QR error correction level, ordered by increasing redundancy.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[cfg_attr(feature = "jsonschema", derive(schemars::JsonSchema))]
pub enum ErrorCorrectionLevel {
    /// ~7% of codewords recoverable.
    L,
    /// ~15%.
    M,
    /// ~25%.
    #[default]
    Q,
    /// ~30%.
    H,
}

impl ErrorCorrectionLevel {
    pub const ALL: [Self; 4] = [Self::L, Self::M, Self::Q, Self::H];

    /// Approximate share of the symbol that can be damaged and still decode.
    pub fn recovery_percent(&self) -> u8 {
        match self {
            Self::L => 7,
            Self::M => 15,
            Self::Q => 25,
            Self::H => 30,
        }
    }
}

impl fmt::Display for ErrorCorrectionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let letter = match self {
            Self::L => "L",
            Self::M => "M",
            Self::Q => "Q",
            Self::H => "H",
        };
        f.write_str(letter)
    }
}

impl FromStr for ErrorCorrectionLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "L" | "l" => Ok(Self::L),
            "M" | "m" => Ok(Self::M),
            "Q" | "q" => Ok(Self::Q),
            "H" | "h" => Ok(Self::H),
            _ => Err(()),
        }
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Every rendering parameter a user can choose.
///
/// Values are not range-checked here: sliders bound them in the UI, and the
/// renderer tolerates anything else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "jsonschema", derive(schemars::JsonSchema))]
#[serde(rename_all = "camelCase", default)]
pub struct Configuration {
    /// Text or URI to encode.
    #[serde(rename = "data")]
    pub payload: String,

    #[serde(rename = "foregroundColor")]
    pub foreground: HexColor,

    #[serde(rename = "backgroundColor")]
    pub background: HexColor,

    pub qr_style: QrStyle,

    /// Single eye color, used when advanced eye colors are off.
    pub eye_color: HexColor,
    pub eye_color_outer: HexColor,
    pub eye_color_inner: HexColor,
    pub use_advanced_eye_colors: bool,

    /// Single eye corner radius in pixels, used when advanced radii are off.
    pub eye_radius: u32,
    pub eye_radius_outer: u32,
    pub eye_radius_inner: u32,
    pub use_advanced_eye_radius: bool,

    /// The uploaded logo, serialized as a data URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo: Option<LogoSource>,

    /// Logo edge length in pixels.
    pub logo_size: u32,

    /// Opacity applied to the logo before rendering.
    pub logo_opacity: f32,

    pub logo_padding: u32,
    pub logo_padding_style: LogoPaddingStyle,
    pub logo_padding_radius: u32,

    /// Fill the padding area with `logo_background_color` instead of the
    /// QR background.
    pub logo_background: bool,
    pub logo_background_color: HexColor,

    /// Blank border around the symbol, in pixels.
    pub quiet_zone: u32,

    pub error_correction_level: ErrorCorrectionLevel,

    /// Edge length of the symbol area in pixels, excluding the quiet zone.
    pub size: u32,
}

impl Default for Configuration {
    fn default() -> Self {
        let ink = HexColor::rgb(0x0b, 0x12, 0x26);
        Self {
            payload: "https://mindsecurity.org/".to_owned(),
            foreground: ink,
            background: HexColor::WHITE,
            qr_style: QrStyle::Squares,
            eye_color: ink,
            eye_color_outer: ink,
            eye_color_inner: ink,
            use_advanced_eye_colors: false,
            eye_radius: 0,
            eye_radius_outer: 0,
            eye_radius_inner: 0,
            use_advanced_eye_radius: false,
            logo: None,
            logo_size: 80,
            logo_opacity: 1.0,
            logo_padding: 0,
            logo_padding_style: LogoPaddingStyle::Square,
            logo_padding_radius: 0,
            logo_background: false,
            logo_background_color: HexColor::WHITE,
            quiet_zone: 10,
            error_correction_level: ErrorCorrectionLevel::Q,
            size: 400,
        }
    }
}

impl Configuration {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the payload.
    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = payload.into();
        self
    }

    /// Sets foreground and background colors.
    pub fn with_colors(mut self, foreground: HexColor, background: HexColor) -> Self {
        self.foreground = foreground;
        self.background = background;
        self
    }

    /// Sets the error correction level.
    pub fn with_error_correction(mut self, level: ErrorCorrectionLevel) -> Self {
        self.error_correction_level = level;
        self
    }

    /// Serializes the configuration to a JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Serializes the configuration to a pretty-printed JSON string.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserializes a configuration from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_are_ordered_by_redundancy() {
        assert!(ErrorCorrectionLevel::L < ErrorCorrectionLevel::M);
        assert!(ErrorCorrectionLevel::M < ErrorCorrectionLevel::Q);
        assert!(ErrorCorrectionLevel::Q < ErrorCorrectionLevel::H);

        let percents: Vec<_> = ErrorCorrectionLevel::ALL
            .iter()
            .map(|level| level.recovery_percent())
            .collect();
        assert_eq!(percents, [7, 15, 25, 30]);
    }

    #[test]
    fn json_uses_form_field_names() {
        let json = Configuration::default().to_json_pretty().unwrap();

        assert!(json.contains("\"data\""));
        assert!(json.contains("\"foregroundColor\": \"#0b1226\""));
        assert!(json.contains("\"backgroundColor\""));
        assert!(json.contains("\"qrStyle\": \"squares\""));
        assert!(json.contains("\"useAdvancedEyeColors\""));
        assert!(json.contains("\"quietZone\": 10"));
        assert!(json.contains("\"errorCorrectionLevel\": \"Q\""));
        // No logo: the field is omitted
        assert!(!json.contains("\"logo\""));
    }

    #[test]
    fn empty_json_gives_defaults() {
        let config = Configuration::from_json("{}").unwrap();
        assert_eq!(config, Configuration::default());
    }

    #[test]
    fn partial_json_overrides_fields() {
        let config = Configuration::from_json(
            r##"{"data":"hello","qrStyle":"fluid","logoPaddingStyle":"circle","errorCorrectionLevel":"L"}"##,
        )
        .unwrap();

        assert_eq!(config.payload, "hello");
        assert_eq!(config.qr_style, QrStyle::Fluid);
        assert_eq!(config.logo_padding_style, LogoPaddingStyle::Circle);
        assert_eq!(config.error_correction_level, ErrorCorrectionLevel::L);
        assert_eq!(config.size, 400);
    }

    #[test]
    fn logo_travels_as_data_url() {
        let mut config = Configuration::default();
        config.logo = Some(LogoSource::new(b"<svg xmlns=\"http://www.w3.org/2000/svg\"/>".to_vec()));

        let json = config.to_json().unwrap();
        assert!(json.contains("\"logo\":\"data:image/svg+xml;base64,"));

        let restored = Configuration::from_json(&json).unwrap();
        let logo = restored.logo.unwrap();
        assert_eq!(logo.data(), config.logo.as_ref().unwrap().data());
    }

    #[test]
    fn invalid_color_is_rejected() {
        assert!(Configuration::from_json(r#"{"foregroundColor":"nope"}"#).is_err());
    }

    #[test]
    fn enum_parsing_matches_form_values() {
        assert_eq!("dots".parse(), Ok(QrStyle::Dots));
        assert_eq!("circle".parse(), Ok(LogoPaddingStyle::Circle));
        assert_eq!("h".parse(), Ok(ErrorCorrectionLevel::H));
        assert!("rounded".parse::<QrStyle>().is_err());
    }
}
