//! Rendering collaborator.
//!
//! A [`Renderer`] turns [`RenderOptions`] into a [`RenderedCode`]. The
//! default [`SvgRenderer`] encodes the payload with `qrcode` and describes
//! the styled symbol as an SVG document; [`RenderedCode`] rasterizes that
//! document with resvg when a bitmap is needed.

pub(crate) mod raster;
pub mod svg;

pub use svg::SvgRenderer;

use std::fmt;
use std::str::FromStr;

use image::{ImageFormat, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::color::HexColor;
use crate::error::RenderError;
use crate::options::RenderOptions;

// ============================================================================
// Renderer Trait
// ============================================================================

/// Produces a visual QR code from render options.
///
/// Re-invoked whenever the options change. Implementations must reject
/// payloads they cannot encode with an error rather than panic.
pub trait Renderer {
    fn render(&mut self, options: &RenderOptions) -> Result<RenderedCode, RenderError>;
}

impl<R: Renderer + ?Sized> Renderer for Box<R> {
    fn render(&mut self, options: &RenderOptions) -> Result<RenderedCode, RenderError> {
        (**self).render(options)
    }
}

// ============================================================================
// ExportFormat
// ============================================================================

/// File formats offered for download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Png,
    Jpeg,
    Svg,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpeg",
            Self::Svg => "svg",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Svg => "image/svg+xml",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "png" => Ok(Self::Png),
            "jpeg" | "jpg" => Ok(Self::Jpeg),
            "svg" => Ok(Self::Svg),
            _ => Err(()),
        }
    }
}

// ============================================================================
// RenderedCode
// ============================================================================

/// The rendered surface: an SVG document plus what is needed to export it.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedCode {
    svg: String,
    width: u32,
    height: u32,
    modules: usize,
    background: HexColor,
}

impl RenderedCode {
    pub fn new(svg: String, width: u32, height: u32, modules: usize, background: HexColor) -> Self {
        Self {
            svg,
            width,
            height,
            modules,
            background,
        }
    }

    /// The SVG document.
    pub fn svg(&self) -> &str {
        &self.svg
    }

    /// Pixel dimensions, quiet zone included.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Number of modules along one edge of the symbol.
    pub fn module_count(&self) -> usize {
        self.modules
    }

    /// Rasterizes the document at its pixel dimensions.
    pub fn rasterize(&self) -> Result<RgbaImage, RenderError> {
        let tree = raster::parse_svg(self.svg.as_bytes()).map_err(RenderError::Svg)?;
        raster::render_tree(&tree).ok_or(RenderError::SurfaceUnavailable {
            width: self.width,
            height: self.height,
        })
    }

    /// Encodes the rendered code for download.
    pub fn export(&self, format: ExportFormat) -> Result<Vec<u8>, RenderError> {
        let bytes = match format {
            ExportFormat::Svg => self.svg.clone().into_bytes(),
            ExportFormat::Png => {
                let pixels = self.rasterize()?;
                raster::encode_image(&pixels, ImageFormat::Png, self.background.to_rgba())
                    .map_err(RenderError::Export)?
            }
            ExportFormat::Jpeg => {
                let pixels = self.rasterize()?;
                raster::encode_image(&pixels, ImageFormat::Jpeg, self.background.to_rgba())
                    .map_err(RenderError::Export)?
            }
        };
        log::info!(
            "exported {}x{} code as {} ({} bytes)",
            self.width,
            self.height,
            format,
            bytes.len()
        );
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_format_parsing() {
        assert_eq!("PNG".parse(), Ok(ExportFormat::Png));
        assert_eq!("jpg".parse(), Ok(ExportFormat::Jpeg));
        assert_eq!("svg".parse(), Ok(ExportFormat::Svg));
        assert!("gif".parse::<ExportFormat>().is_err());
        assert_eq!(ExportFormat::Jpeg.mime_type(), "image/jpeg");
    }

    #[test]
    fn rasterize_reports_bad_documents() {
        let code = RenderedCode::new("<not-svg".into(), 10, 10, 21, HexColor::WHITE);
        assert!(matches!(code.rasterize(), Err(RenderError::Svg(_))));
        assert!(code.export(ExportFormat::Svg).is_ok());
    }
}
