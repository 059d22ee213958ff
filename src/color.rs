//! Hex color values.

use std::fmt;
use std::str::FromStr;

use palette::Srgb;
use palette::rgb::FromHexError;
use serde::{Deserialize, Serialize};

/// An opaque sRGB color, written as `#rrggbb`.
///
/// Parsing accepts the forms a color input produces: `#rrggbb`, `rrggbb`
/// and the short `#rgb` form. Output is always lowercase `#rrggbb`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HexColor(Srgb<u8>);

impl HexColor {
    pub const BLACK: Self = Self::rgb(0, 0, 0);
    pub const WHITE: Self = Self::rgb(255, 255, 255);

    pub const fn rgb(red: u8, green: u8, blue: u8) -> Self {
        Self(Srgb::new(red, green, blue))
    }

    /// Returns the `(r, g, b)` components.
    pub fn components(&self) -> (u8, u8, u8) {
        (self.0.red, self.0.green, self.0.blue)
    }

    /// Returns the color as an opaque `image` pixel.
    pub fn to_rgba(&self) -> image::Rgba<u8> {
        image::Rgba([self.0.red, self.0.green, self.0.blue, 255])
    }
}

impl fmt::Display for HexColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.0.red, self.0.green, self.0.blue)
    }
}

impl FromStr for HexColor {
    type Err = FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Srgb::<u8>::from_str(s.trim()).map(Self)
    }
}

impl TryFrom<String> for HexColor {
    type Error = FromHexError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<HexColor> for String {
    fn from(color: HexColor) -> Self {
        color.to_string()
    }
}

#[cfg(feature = "jsonschema")]
impl schemars::JsonSchema for HexColor {
    fn schema_name() -> String {
        "HexColor".to_owned()
    }

    fn json_schema(generator: &mut schemars::r#gen::SchemaGenerator) -> schemars::schema::Schema {
        String::json_schema(generator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_long_and_short_forms() {
        let long: HexColor = "#0B1226".parse().unwrap();
        assert_eq!(long.components(), (0x0b, 0x12, 0x26));

        let bare: HexColor = "ffffff".parse().unwrap();
        assert_eq!(bare, HexColor::WHITE);

        let short: HexColor = "#f00".parse().unwrap();
        assert_eq!(short, HexColor::rgb(255, 0, 0));
    }

    #[test]
    fn displays_lowercase_hex() {
        assert_eq!(HexColor::rgb(0x0b, 0x12, 0x26).to_string(), "#0b1226");
    }

    #[test]
    fn rejects_garbage() {
        assert!("#12345".parse::<HexColor>().is_err());
        assert!("blue".parse::<HexColor>().is_err());
    }

    #[test]
    fn serializes_as_string() {
        let json = serde_json::to_string(&HexColor::BLACK).unwrap();
        assert_eq!(json, "\"#000000\"");

        let back: HexColor = serde_json::from_str("\"#ABCDEF\"").unwrap();
        assert_eq!(back.to_string(), "#abcdef");
    }
}
