//! SVG rendering of a styled QR symbol.
//!
//! The document is laid out in pixels: the symbol occupies `size` pixels
//! per side, surrounded by `quiet_zone` pixels of background on every
//! edge. Data modules are drawn in the chosen [`QrStyle`], the three finder
//! patterns ("eyes") are drawn separately with their own colors and corner
//! radii, and the logo is centered on top.

use std::fmt::Write;

use qrcode::types::QrError;
use qrcode::{Color, EcLevel, QrCode};

use super::{RenderedCode, Renderer};
use crate::color::HexColor;
use crate::config::{ErrorCorrectionLevel, LogoPaddingStyle, QrStyle};
use crate::error::RenderError;
use crate::options::RenderOptions;

/// Edge length of a finder pattern, in modules.
const EYE_MODULES: usize = 7;

/// Renders [`RenderOptions`] into an SVG document.
#[derive(Debug, Clone, Copy, Default)]
pub struct SvgRenderer;

impl SvgRenderer {
    pub fn new() -> Self {
        Self
    }
}

impl Renderer for SvgRenderer {
    fn render(&mut self, options: &RenderOptions) -> Result<RenderedCode, RenderError> {
        let symbol = Symbol::encode(&options.value, options.ec_level)?;
        let canvas = options.size.saturating_add(options.quiet_zone.saturating_mul(2));
        let svg = build_document(&symbol, options, canvas);

        log::debug!(
            "rendered {}x{} symbol at level {} into a {}px canvas",
            symbol.width,
            symbol.width,
            options.ec_level,
            canvas
        );
        Ok(RenderedCode::new(svg, canvas, canvas, symbol.width, options.bg_color))
    }
}

impl From<ErrorCorrectionLevel> for EcLevel {
    fn from(level: ErrorCorrectionLevel) -> Self {
        match level {
            ErrorCorrectionLevel::L => EcLevel::L,
            ErrorCorrectionLevel::M => EcLevel::M,
            ErrorCorrectionLevel::Q => EcLevel::Q,
            ErrorCorrectionLevel::H => EcLevel::H,
        }
    }
}

// ============================================================================
// Symbol
// ============================================================================

/// The encoded module grid.
struct Symbol {
    width: usize,
    dark: Vec<bool>,
}

impl Symbol {
    fn encode(payload: &str, level: ErrorCorrectionLevel) -> Result<Self, RenderError> {
        let code = QrCode::with_error_correction_level(payload.as_bytes(), level.into())
            .map_err(|err| match err {
                QrError::DataTooLong => RenderError::DataTooLong { level },
                other => RenderError::Encode(other),
            })?;

        let dark = code
            .to_colors()
            .into_iter()
            .map(|color| color == Color::Dark)
            .collect();
        Ok(Self {
            width: code.width(),
            dark,
        })
    }

    /// Out-of-range coordinates read as light.
    fn is_dark(&self, x: isize, y: isize) -> bool {
        if x < 0 || y < 0 {
            return false;
        }
        let (x, y) = (x as usize, y as usize);
        x < self.width && y < self.width && self.dark[y * self.width + x]
    }

    fn in_eye(&self, x: usize, y: usize) -> bool {
        let far = self.width.saturating_sub(EYE_MODULES);
        (x < EYE_MODULES && y < EYE_MODULES)
            || (x >= far && y < EYE_MODULES)
            || (x < EYE_MODULES && y >= far)
    }

    fn eye_origins(&self) -> [(usize, usize); 3] {
        let far = self.width.saturating_sub(EYE_MODULES);
        [(0, 0), (far, 0), (0, far)]
    }
}

// ============================================================================
// Document
// ============================================================================

/// Pixel geometry shared by every drawing step.
struct Layout {
    offset: f64,
    cell: f64,
    center: f64,
}

fn build_document(symbol: &Symbol, options: &RenderOptions, canvas: u32) -> String {
    let layout = Layout {
        offset: f64::from(options.quiet_zone),
        cell: f64::from(options.size) / symbol.width.max(1) as f64,
        center: f64::from(canvas) / 2.0,
    };

    let mut svg = String::with_capacity(symbol.dark.len() * 48);
    let _ = write!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink" width="{canvas}" height="{canvas}" viewBox="0 0 {canvas} {canvas}">"#
    );
    let _ = write!(
        svg,
        r#"<rect width="{canvas}" height="{canvas}" fill="{}"/>"#,
        options.bg_color
    );

    write_modules(&mut svg, symbol, options.qr_style, &layout, options.fg_color);
    write_eyes(&mut svg, symbol, options, &layout);
    write_logo(&mut svg, options, &layout);

    svg.push_str("</svg>");
    svg
}

fn write_modules(svg: &mut String, symbol: &Symbol, style: QrStyle, layout: &Layout, fill: HexColor) {
    let cell = layout.cell;
    let mut path = String::new();

    for y in 0..symbol.width {
        for x in 0..symbol.width {
            let (ix, iy) = (x as isize, y as isize);
            if !symbol.is_dark(ix, iy) || symbol.in_eye(x, y) {
                continue;
            }
            let px = layout.offset + x as f64 * cell;
            let py = layout.offset + y as f64 * cell;

            match style {
                QrStyle::Squares => rounded_rect(&mut path, px, py, cell, cell, [0.0; 4]),
                QrStyle::Dots => circle(&mut path, px + cell / 2.0, py + cell / 2.0, cell / 2.0),
                QrStyle::Fluid => {
                    let up = symbol.is_dark(ix, iy - 1);
                    let down = symbol.is_dark(ix, iy + 1);
                    let left = symbol.is_dark(ix - 1, iy);
                    let right = symbol.is_dark(ix + 1, iy);
                    let round = |a: bool, b: bool| if a || b { 0.0 } else { cell / 2.0 };
                    rounded_rect(
                        &mut path,
                        px,
                        py,
                        cell,
                        cell,
                        [
                            round(up, left),
                            round(up, right),
                            round(down, right),
                            round(down, left),
                        ],
                    );
                }
            }
        }
    }

    if !path.is_empty() {
        let _ = write!(svg, r#"<path d="{path}" fill="{fill}"/>"#);
    }
}

fn write_eyes(svg: &mut String, symbol: &Symbol, options: &RenderOptions, layout: &Layout) {
    if symbol.width < EYE_MODULES {
        return;
    }
    let cell = layout.cell;
    let outer_radius = f64::from(options.eye_radius.outer());
    let inner_radius = f64::from(options.eye_radius.inner());

    for (ex, ey) in symbol.eye_origins() {
        let x = layout.offset + ex as f64 * cell;
        let y = layout.offset + ey as f64 * cell;

        // Ring: 7x7 square minus a 5x5 hole, filled even-odd
        let mut ring = String::new();
        let edge = 7.0 * cell;
        rounded_rect(&mut ring, x, y, edge, edge, [outer_radius; 4]);
        let hole = (outer_radius - cell).max(0.0);
        rounded_rect(&mut ring, x + cell, y + cell, 5.0 * cell, 5.0 * cell, [hole; 4]);
        let _ = write!(
            svg,
            r#"<path d="{ring}" fill="{}" fill-rule="evenodd"/>"#,
            options.eye_color.outer()
        );

        let mut pupil = String::new();
        rounded_rect(&mut pupil, x + 2.0 * cell, y + 2.0 * cell, 3.0 * cell, 3.0 * cell, [inner_radius; 4]);
        let _ = write!(svg, r#"<path d="{pupil}" fill="{}"/>"#, options.eye_color.inner());
    }
}

fn write_logo(svg: &mut String, options: &RenderOptions, layout: &Layout) {
    let Some(logo) = options.logo_image.as_ref() else {
        return;
    };
    let width = f64::from(options.logo_width);
    let height = f64::from(options.logo_height);
    let x = layout.center - width / 2.0;
    let y = layout.center - height / 2.0;

    if options.logo_padding > 0 || options.logo_background {
        let padding = f64::from(options.logo_padding);
        let fill = if options.logo_background {
            options.logo_background_color
        } else {
            options.bg_color
        };

        let mut area = String::new();
        match options.logo_padding_style {
            LogoPaddingStyle::Square => {
                let radius = f64::from(options.logo_padding_radius);
                rounded_rect(
                    &mut area,
                    x - padding,
                    y - padding,
                    width + 2.0 * padding,
                    height + 2.0 * padding,
                    [radius; 4],
                );
            }
            LogoPaddingStyle::Circle => {
                let radius = width.max(height) / 2.0 + padding;
                circle(&mut area, layout.center, layout.center, radius);
            }
        }
        let _ = write!(svg, r#"<path d="{area}" fill="{fill}"/>"#);
    }

    let _ = write!(
        svg,
        r#"<image x="{}" y="{}" width="{}" height="{}" preserveAspectRatio="xMidYMid meet" xlink:href="{}"/>"#,
        num(x),
        num(y),
        num(width),
        num(height),
        logo.to_data_url()
    );
}

// ============================================================================
// Path helpers
// ============================================================================

/// Appends a closed rectangle with per-corner radii, clockwise from the top
/// left: `[top_left, top_right, bottom_right, bottom_left]`.
///
/// Radii are clamped to half the shorter side.
fn rounded_rect(path: &mut String, x: f64, y: f64, width: f64, height: f64, radii: [f64; 4]) {
    let limit = (width.min(height) / 2.0).max(0.0);
    let [tl, tr, br, bl] = radii.map(|r| r.clamp(0.0, limit));
    let (right, bottom) = (x + width, y + height);

    let _ = write!(path, "M{} {}", num(x + tl), num(y));
    let _ = write!(path, "H{}", num(right - tr));
    arc(path, tr, right, y + tr);
    let _ = write!(path, "V{}", num(bottom - br));
    arc(path, br, right - br, bottom);
    let _ = write!(path, "H{}", num(x + bl));
    arc(path, bl, x, bottom - bl);
    let _ = write!(path, "V{}", num(y + tl));
    arc(path, tl, x + tl, y);
    path.push('Z');
}

fn arc(path: &mut String, radius: f64, x: f64, y: f64) {
    if radius > 0.0 {
        let r = num(radius);
        let _ = write!(path, "A{r} {r} 0 0 1 {} {}", num(x), num(y));
    }
}

fn circle(path: &mut String, cx: f64, cy: f64, radius: f64) {
    let r = num(radius);
    let _ = write!(
        path,
        "M{} {}A{r} {r} 0 1 0 {} {}A{r} {r} 0 1 0 {} {}Z",
        num(cx - radius),
        num(cy),
        num(cx + radius),
        num(cy),
        num(cx - radius),
        num(cy)
    );
}

/// Formats a coordinate with at most three decimals.
fn num(value: f64) -> String {
    let text = format!("{value:.3}");
    let text = text.trim_end_matches('0').trim_end_matches('.');
    match text {
        "" | "-" | "-0" => "0".to_owned(),
        _ => text.to_owned(),
    }
}

// ============================================================================
// Tests
// ============================================================================
