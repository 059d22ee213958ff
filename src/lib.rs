//! qr-stylist: styled QR code composition
//!
//! This crate keeps a live QR code design (colors, module style, eye colors
//! and radii, logo placement, quiet zone, error correction) and turns it into
//! a rendered code that can be downloaded as PNG, JPEG or SVG. Uploaded logos
//! are composited at the chosen opacity off the main thread; results that
//! arrive after the logo or opacity changed are discarded.
//!
//! # Example
//!
//! ```
//! use qr_stylist::{Configuration, ExportFormat, Studio};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let studio = Studio::with_config(Configuration::default())?;
//!
//! // Form events arrive as camelCase field names and string values
//! studio.apply_event("qrStyle", "dots")?;
//! studio.apply_event("foregroundColor", "#1d3557")?;
//!
//! // Uploading a logo raises error correction to H
//! let logo = br##"<svg xmlns="http://www.w3.org/2000/svg" width="8" height="8"><circle cx="4" cy="4" r="4" fill="#e63946"/></svg>"##;
//! studio.upload_logo(logo.to_vec());
//! studio.apply_event("logoOpacity", "0.6")?;
//!
//! // Wait for the processed logo, then export
//! studio.settle().await;
//! let png = studio.download(ExportFormat::Png)?;
//! assert!(!png.is_empty());
//! # Ok(())
//! # }
//! ```
//!
//! # Deriving Options Directly
//!
//! [`derive_options`] is a pure function and can be used without a studio:
//!
//! ```
//! use qr_stylist::{Configuration, ErrorCorrectionLevel, HexColor, derive_options};
//!
//! let config = Configuration::default()
//!     .with_colors(HexColor::BLACK, HexColor::WHITE)
//!     .with_error_correction(ErrorCorrectionLevel::Q);
//!
//! let options = derive_options(&config, None);
//! assert!(options.logo_image.is_none());
//! let json = options.to_json().unwrap();
//! assert!(json.contains("\"fgColor\":\"#000000\""));
//! ```

mod color;
mod config;
mod error;
mod logo;
mod options;
mod processor;
mod render;
mod store;
mod studio;

pub use color::HexColor;
pub use config::{Configuration, ErrorCorrectionLevel, LogoPaddingStyle, QrStyle};
pub use error::{ConfigError, LogoError, RenderError, StudioError};
pub use logo::{LogoId, LogoKey, LogoSource, ProcessedLogo, apply_opacity, composite_logo};
pub use options::{EyeColor, EyeRadius, EyeSetting, RenderOptions, derive_options};
pub use processor::{LogoCompositor, LogoProcessor, LogoState, OpacityCompositor, ProcessingTicket};
pub use render::{ExportFormat, RenderedCode, Renderer, SvgRenderer};
pub use store::{ConfigStore, FieldUpdate, UpdateOutcome};
pub use studio::Studio;
