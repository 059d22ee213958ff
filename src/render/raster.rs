//! Rasterization utilities using resvg/tiny-skia.
//!
//! Shared by the logo post-processor (offscreen compositing surface) and the
//! renderer (SVG preview and PNG/JPEG export).

use std::io::Cursor;

use image::{ImageFormat, Rgba, RgbaImage};
use resvg::tiny_skia::{ColorU8, Pixmap, Transform};
use resvg::usvg::{Options, Tree};

// ============================================================================
// SVG Rendering
// ============================================================================

/// Parses an SVG document.
pub(crate) fn parse_svg(svg_data: &[u8]) -> Result<Tree, resvg::usvg::Error> {
    Tree::from_data(svg_data, &Options::default())
}

/// Returns the natural pixel size of a parsed SVG, rounded up.
pub(crate) fn natural_size(tree: &Tree) -> (u32, u32) {
    let size = tree.size();
    (size.width().ceil() as u32, size.height().ceil() as u32)
}

/// Renders a parsed SVG at its natural size.
///
/// Returns `None` when no pixmap of that size can be allocated.
pub(crate) fn render_tree(tree: &Tree) -> Option<RgbaImage> {
    let (width, height) = natural_size(tree);
    let mut pixmap = Pixmap::new(width, height)?;
    resvg::render(tree, Transform::identity(), &mut pixmap.as_mut());
    Some(pixmap_to_rgba_image(&pixmap))
}

// ============================================================================
// Pixmap Conversion
// ============================================================================

/// Converts an `image::RgbaImage` into a premultiplied tiny-skia pixmap.
///
/// Returns `None` for empty or oversized images.
pub(crate) fn rgba_image_to_pixmap(image: &RgbaImage) -> Option<Pixmap> {
    let mut pixmap = Pixmap::new(image.width(), image.height())?;
    for (dst, src) in pixmap.pixels_mut().iter_mut().zip(image.pixels()) {
        let [r, g, b, a] = src.0;
        *dst = ColorU8::from_rgba(r, g, b, a).premultiply();
    }
    Some(pixmap)
}

/// Converts a tiny-skia pixmap to an `image::RgbaImage`.
pub(crate) fn pixmap_to_rgba_image(pixmap: &Pixmap) -> RgbaImage {
    let mut img = RgbaImage::new(pixmap.width(), pixmap.height());

    for (dst, src) in img.pixels_mut().zip(pixmap.pixels()) {
        // tiny-skia stores premultiplied alpha
        let (r, g, b, a) = unpremultiply(src.red(), src.green(), src.blue(), src.alpha());
        *dst = Rgba([r, g, b, a]);
    }

    img
}

fn unpremultiply(r: u8, g: u8, b: u8, a: u8) -> (u8, u8, u8, u8) {
    if a == 0 {
        (0, 0, 0, 0)
    } else {
        let a_f = a as f32 / 255.0;
        (
            (r as f32 / a_f).round().min(255.0) as u8,
            (g as f32 / a_f).round().min(255.0) as u8,
            (b as f32 / a_f).round().min(255.0) as u8,
            a,
        )
    }
}

// ============================================================================
// Encoding
// ============================================================================

/// Encodes an image in the given format.
///
/// Formats without an alpha channel (JPEG) receive the image flattened onto
/// `matte`.
pub(crate) fn encode_image(
    image: &RgbaImage,
    format: ImageFormat,
    matte: Rgba<u8>,
) -> Result<Vec<u8>, image::ImageError> {
    let mut buffer = Cursor::new(Vec::new());
    match format {
        ImageFormat::Jpeg => {
            let flattened = flatten_onto(image, matte);
            flattened.write_to(&mut buffer, format)?;
        }
        _ => image.write_to(&mut buffer, format)?,
    }
    Ok(buffer.into_inner())
}

/// Composites `image` over an opaque `matte` color and drops the alpha channel.
fn flatten_onto(image: &RgbaImage, matte: Rgba<u8>) -> image::RgbImage {
    image::RgbImage::from_fn(image.width(), image.height(), |x, y| {
        let [r, g, b, a] = image.get_pixel(x, y).0;
        let alpha = a as f32 / 255.0;
        let mix = |s: u8, d: u8| (s as f32 * alpha + d as f32 * (1.0 - alpha)).round() as u8;
        image::Rgb([mix(r, matte[0]), mix(g, matte[1]), mix(b, matte[2])])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIMPLE_SVG: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="20" height="10"><rect width="20" height="10" fill="#00ff00"/></svg>"##;

    #[test]
    fn renders_svg_at_natural_size() {
        let tree = parse_svg(SIMPLE_SVG.as_bytes()).unwrap();
        assert_eq!(natural_size(&tree), (20, 10));

        let img = render_tree(&tree).unwrap();
        assert_eq!(img.dimensions(), (20, 10));
        assert_eq!(img.get_pixel(5, 5).0, [0, 255, 0, 255]);
    }

    #[test]
    fn pixmap_round_trip_keeps_translucent_colors() {
        let src = RgbaImage::from_pixel(3, 3, Rgba([200, 40, 10, 128]));
        let pixmap = rgba_image_to_pixmap(&src).unwrap();
        let back = pixmap_to_rgba_image(&pixmap);

        let [r, g, b, a] = back.get_pixel(1, 1).0;
        assert_eq!(a, 128);
        assert!(r.abs_diff(200) <= 2 && g.abs_diff(40) <= 2 && b.abs_diff(10) <= 2);
    }

    #[test]
    fn empty_image_has_no_pixmap() {
        assert!(rgba_image_to_pixmap(&RgbaImage::new(0, 4)).is_none());
    }

    #[test]
    fn jpeg_export_is_flattened_onto_matte() {
        let src = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 0]));
        let bytes = encode_image(&src, ImageFormat::Jpeg, Rgba([255, 255, 255, 255])).unwrap();

        let decoded = image::load_from_memory(&bytes).unwrap().to_rgb8();
        let [r, g, b] = decoded.get_pixel(2, 2).0;
        assert!(r > 245 && g > 245 && b > 245, "transparent pixels should become white");
    }
}
