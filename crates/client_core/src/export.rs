//! Report export: fits a rasterized report onto a single A4 portrait page
//! and writes a self-contained PDF embedding the image.
//!
//! The document is one fixed page with one uncompressed DeviceRGB image
//! XObject, so the writer assembles the objects directly; output is
//! deterministic for a given raster.

use image::RgbImage;
use shared::domain::SessionId;

pub const A4_WIDTH_PT: f32 = 595.28;
pub const A4_HEIGHT_PT: f32 = 841.89;
pub const TOP_MARGIN_PT: f32 = 24.0;

/// Placement of the raster on the page, in points. `y_top` is measured from
/// the top edge of the page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PagePlacement {
    pub x: f32,
    pub y_top: f32,
    pub width: f32,
    pub height: f32,
}

/// Scales a `width x height` raster to fit the A4 page while preserving its
/// aspect ratio, centered horizontally under a fixed top margin.
pub fn fit_on_page(pixel_width: u32, pixel_height: u32) -> PagePlacement {
    let w = pixel_width.max(1) as f32;
    let h = pixel_height.max(1) as f32;
    let ratio = (A4_WIDTH_PT / w).min(A4_HEIGHT_PT / h);

    let width = w * ratio;
    let height = h * ratio;
    PagePlacement {
        x: (A4_WIDTH_PT - width) / 2.0,
        y_top: TOP_MARGIN_PT,
        width,
        height,
    }
}

/// Download name for an exported report, keyed by a fragment of the session
/// identifier.
pub fn report_pdf_filename(session_id: &SessionId) -> String {
    format!("polyinsights-report-{}.pdf", session_id.fragment())
}

/// Drops the alpha channel from an RGBA capture. Returns `None` when the
/// byte length does not match the advertised dimensions.
pub fn rgba_to_rgb(width: u32, height: u32, rgba: &[u8]) -> Option<RgbImage> {
    let expected = (width as usize)
        .checked_mul(height as usize)?
        .checked_mul(4)?;
    if rgba.len() != expected {
        return None;
    }

    let mut rgb = Vec::with_capacity(expected / 4 * 3);
    for pixel in rgba.chunks_exact(4) {
        rgb.extend_from_slice(&pixel[..3]);
    }
    RgbImage::from_raw(width, height, rgb)
}

/// Writes a single-page A4 PDF with the raster placed per [`fit_on_page`].
pub fn render_report_pdf(image: &RgbImage) -> Vec<u8> {
    let placement = fit_on_page(image.width(), image.height());
    // PDF user space has its origin at the bottom-left corner.
    let y_bottom = A4_HEIGHT_PT - placement.y_top - placement.height;
    let content = format!(
        "q\n{w:.2} 0 0 {h:.2} {x:.2} {y:.2} cm\n/Im0 Do\nQ\n",
        w = placement.width,
        h = placement.height,
        x = placement.x,
        y = y_bottom,
    );
    let pixels: &[u8] = image.as_raw();

    let mut out: Vec<u8> = Vec::with_capacity(pixels.len() + 1024);
    let mut offsets = [0usize; 6];

    out.extend_from_slice(b"%PDF-1.4\n");

    offsets[1] = out.len();
    out.extend_from_slice(b"1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n");

    offsets[2] = out.len();
    out.extend_from_slice(b"2 0 obj\n<< /Type /Pages /Kids [3 0 R] /Count 1 >>\nendobj\n");

    offsets[3] = out.len();
    out.extend_from_slice(
        format!(
            "3 0 obj\n<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {A4_WIDTH_PT:.2} {A4_HEIGHT_PT:.2}] \
             /Resources << /XObject << /Im0 4 0 R >> >> /Contents 5 0 R >>\nendobj\n"
        )
        .as_bytes(),
    );

    offsets[4] = out.len();
    out.extend_from_slice(
        format!(
            "4 0 obj\n<< /Type /XObject /Subtype /Image /Width {} /Height {} \
             /ColorSpace /DeviceRGB /BitsPerComponent 8 /Length {} >>\nstream\n",
            image.width(),
            image.height(),
            pixels.len(),
        )
        .as_bytes(),
    );
    out.extend_from_slice(pixels);
    out.extend_from_slice(b"\nendstream\nendobj\n");

    offsets[5] = out.len();
    out.extend_from_slice(
        format!(
            "5 0 obj\n<< /Length {} >>\nstream\n{}endstream\nendobj\n",
            content.len(),
            content,
        )
        .as_bytes(),
    );

    let xref_offset = out.len();
    out.extend_from_slice(b"xref\n0 6\n0000000000 65535 f \n");
    for offset in &offsets[1..] {
        out.extend_from_slice(format!("{offset:010} 00000 n \n").as_bytes());
    }
    out.extend_from_slice(
        format!("trailer\n<< /Size 6 /Root 1 0 R >>\nstartxref\n{xref_offset}\n%%EOF\n").as_bytes(),
    );
    out
}
