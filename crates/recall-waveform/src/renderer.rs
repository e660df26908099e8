//! Rasterization of processed chunk amplitudes
//!
//! Pure mapping from pixel amplitudes to an [`RgbImage`]: the same inputs
//! always produce the same bytes, which is what lets the chunk cache treat an
//! image as a function of its key.
//!
//! Layers, bottom to top:
//! - white background
//! - black centerline at `height / 2`
//! - one pale yellow gridline per second, labelled `"12.00s"` near the bottom
//! - black strokes from the centerline to `center ∓ round(value * y_scale)`

use image::{Rgb, RgbImage};

use recall_core::{WaveformError, WaveformResult};

pub const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
pub const REFERENCE_LINE: Rgb<u8> = Rgb([0, 0, 0]);
pub const SCALE_LINE: Rgb<u8> = Rgb([226, 224, 131]);
pub const SCALE_TEXT: Rgb<u8> = Rgb([0, 0, 0]);
pub const WAVEFORM: Rgb<u8> = Rgb([0, 0, 0]);

/// Label offset from its gridline and from the bottom edge
const LABEL_MARGIN: u32 = 5;

const GLYPH_WIDTH: u32 = 3;
const GLYPH_HEIGHT: u32 = 5;
const GLYPH_ADVANCE: u32 = GLYPH_WIDTH + 1;

/// Draw one chunk
///
/// # Arguments
/// * `pixels` - One amplitude per column (columns past its end stay empty)
/// * `width`, `height` - Image size
/// * `y_scale` - Pixels per amplitude unit, see `recall_core::signal::pixel_scale`
/// * `start_seconds` - Time at column 0, used for the gridline labels
/// * `pixels_per_second` - Gridline spacing; 0 draws no gridlines
pub fn render_waveform_chunk(
    pixels: &[f64],
    width: u32,
    height: u32,
    y_scale: f64,
    start_seconds: f64,
    pixels_per_second: u32,
) -> WaveformResult<RgbImage> {
    if width == 0 {
        return Err(WaveformError::InvalidPixelWidth(width as usize));
    }
    if height == 0 {
        return Err(WaveformError::InvalidDisplayHeight(height));
    }

    let mut image = RgbImage::from_pixel(width, height, BACKGROUND);
    let center = height / 2;
    for x in 0..width {
        put(&mut image, x as i64, center as i64, REFERENCE_LINE);
    }

    draw_time_scale(&mut image, start_seconds, pixels_per_second);
    draw_waveform(&mut image, pixels, y_scale);

    Ok(image)
}

fn draw_time_scale(image: &mut RgbImage, start_seconds: f64, pixels_per_second: u32) {
    if pixels_per_second == 0 {
        return;
    }
    let (width, height) = image.dimensions();

    for x in (0..width).step_by(pixels_per_second as usize) {
        for y in 0..height {
            put(image, x as i64, y as i64, SCALE_LINE);
        }
        let seconds = start_seconds + x as f64 / pixels_per_second as f64;
        let label = format!("{:.2}s", seconds);
        draw_text(
            image,
            &label,
            (x + LABEL_MARGIN) as i64,
            height as i64 - LABEL_MARGIN as i64,
            SCALE_TEXT,
        );
    }
}

fn draw_waveform(image: &mut RgbImage, pixels: &[f64], y_scale: f64) {
    let (width, height) = image.dimensions();
    let center = (height / 2) as i64;

    for (x, &value) in pixels.iter().take(width as usize).enumerate() {
        let offset = (value * y_scale).round();
        if !offset.is_finite() {
            continue;
        }
        let offset = offset as i64;
        vertical_line(image, x as i64, center, center - offset, WAVEFORM);
        vertical_line(image, x as i64, center, center + offset, WAVEFORM);
    }
}

fn vertical_line(image: &mut RgbImage, x: i64, y0: i64, y1: i64, color: Rgb<u8>) {
    let last = image.height() as i64 - 1;
    let top = y0.min(y1).max(0);
    let bottom = y0.max(y1).min(last);
    for y in top..=bottom {
        put(image, x, y, color);
    }
}

/// Draw `text` with its baseline at `baseline`
fn draw_text(image: &mut RgbImage, text: &str, left: i64, baseline: i64, color: Rgb<u8>) {
    let top = baseline - GLYPH_HEIGHT as i64;
    for (i, ch) in text.chars().enumerate() {
        let Some(rows) = glyph(ch) else {
            continue;
        };
        let x0 = left + (i as u32 * GLYPH_ADVANCE) as i64;
        for (row, bits) in rows.iter().enumerate() {
            for col in 0..GLYPH_WIDTH {
                if bits & (0b100 >> col) != 0 {
                    put(image, x0 + col as i64, top + row as i64, color);
                }
            }
        }
    }
}

fn put(image: &mut RgbImage, x: i64, y: i64, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && (x as u64) < image.width() as u64 && (y as u64) < image.height() as u64 {
        image.put_pixel(x as u32, y as u32, color);
    }
}

/// 3x5 bitmaps, one `u8` per row, most significant of the low three bits on the left
fn glyph(ch: char) -> Option<[u8; GLYPH_HEIGHT as usize]> {
    let rows = match ch {
        '0' => [0b111, 0b101, 0b101, 0b101, 0b111],
        '1' => [0b010, 0b110, 0b010, 0b010, 0b111],
        '2' => [0b111, 0b001, 0b111, 0b100, 0b111],
        '3' => [0b111, 0b001, 0b111, 0b001, 0b111],
        '4' => [0b101, 0b101, 0b111, 0b001, 0b001],
        '5' => [0b111, 0b100, 0b111, 0b001, 0b111],
        '6' => [0b111, 0b100, 0b111, 0b101, 0b111],
        '7' => [0b111, 0b001, 0b010, 0b010, 0b010],
        '8' => [0b111, 0b101, 0b111, 0b101, 0b111],
        '9' => [0b111, 0b101, 0b111, 0b001, 0b111],
        '.' => [0b000, 0b000, 0b000, 0b000, 0b010],
        's' => [0b000, 0b011, 0b110, 0b011, 0b110],
        '-' => [0b000, 0b000, 0b111, 0b000, 0b000],
        _ => return None,
    };
    Some(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_empty_dimensions() {
        assert!(render_waveform_chunk(&[], 0, 10, 1.0, 0.0, 10).is_err());
        assert!(render_waveform_chunk(&[], 10, 0, 1.0, 0.0, 10).is_err());
    }

    #[test]
    fn test_layers() {
        let height = 100;
        let pixels = vec![0.5; 400];
        let image = render_waveform_chunk(&pixels, 400, height, 40.0, 0.0, 200).unwrap();
        assert_eq!(image.dimensions(), (400, 100));

        // Gridlines at every second
        assert_eq!(*image.get_pixel(0, 10), SCALE_LINE);
        assert_eq!(*image.get_pixel(200, 10), SCALE_LINE);

        // 0.5 * 40 = 20 px either side of the centerline
        assert_eq!(*image.get_pixel(50, 50), WAVEFORM);
        assert_eq!(*image.get_pixel(50, 30), WAVEFORM);
        assert_eq!(*image.get_pixel(50, 70), WAVEFORM);
        assert_eq!(*image.get_pixel(50, 29), BACKGROUND);
        assert_eq!(*image.get_pixel(50, 71), BACKGROUND);
    }

    #[test]
    fn test_centerline_without_samples() {
        let image = render_waveform_chunk(&[], 50, 21, 1.0, 0.0, 0).unwrap();
        for x in 0..50 {
            assert_eq!(*image.get_pixel(x, 10), REFERENCE_LINE);
            assert_eq!(*image.get_pixel(x, 9), BACKGROUND);
        }
    }

    #[test]
    fn test_strokes_clip_to_image() {
        let image = render_waveform_chunk(&[1.0e6, f64::NAN], 2, 20, 1.0, 0.0, 0).unwrap();
        for y in 0..20 {
            assert_eq!(*image.get_pixel(0, y), WAVEFORM);
        }
        assert_eq!(*image.get_pixel(1, 0), BACKGROUND);
    }

    #[test]
    fn test_labels_are_drawn() {
        let image = render_waveform_chunk(&[], 200, 60, 1.0, 10.0, 100).unwrap();
        // "10.00s" sits right of the gridline, just above the bottom margin
        let inked = (5..30)
            .flat_map(|x| (45..55).map(move |y| (x, y)))
            .filter(|&(x, y)| *image.get_pixel(x, y) == SCALE_TEXT)
            .count();
        assert!(inked > 10);
    }

    #[test]
    fn test_render_is_deterministic() {
        let pixels: Vec<f64> = (0..300).map(|i| (i as f64 * 0.1).sin().abs()).collect();
        let a = render_waveform_chunk(&pixels, 300, 80, 30.0, 20.0, 30).unwrap();
        let b = render_waveform_chunk(&pixels, 300, 80, 30.0, 20.0, 30).unwrap();
        assert_eq!(a.as_raw(), b.as_raw());
    }
}
