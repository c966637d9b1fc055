//! Decode, encode and pixel helpers shared by the image stages.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, ImageBuffer, ImageDecoder, ImageReader, Luma, RgbImage};
use imageproc::contrast::{self, ThresholdType};
use std::io::Cursor;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("Failed to load image: {0}")]
    Load(#[from] image::ImageError),
    #[error("Failed to read image bytes: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to encode processed image: {0}")]
    Encode(String),
}

/// Decode raw bytes, applying the EXIF orientation tag when present.
pub fn decode_oriented(bytes: &[u8]) -> Result<DynamicImage, PreprocessError> {
    let mut decoder = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()?
        .into_decoder()?;
    let orientation = decoder.orientation()?;
    let mut img = DynamicImage::from_decoder(decoder)?;
    img.apply_orientation(orientation);
    Ok(img)
}

/// Whether the bytes look like a raster format the decoder understands.
pub fn is_decodable(bytes: &[u8]) -> bool {
    image::guess_format(bytes).is_ok()
}

pub fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, PreprocessError> {
    let rgb = img.to_rgb8();
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality)
        .encode_image(&rgb)
        .map_err(|e| PreprocessError::Encode(e.to_string()))?;
    Ok(buf)
}

pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, PreprocessError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| PreprocessError::Encode(e.to_string()))?;
    Ok(buf)
}

/// Scale up so the width is at least `min_width`, preserving aspect ratio.
pub fn upscale_to_width(img: DynamicImage, min_width: u32, filter: FilterType) -> DynamicImage {
    let (w, h) = (img.width(), img.height());
    if w == 0 || w >= min_width {
        return img;
    }
    let scale = min_width as f64 / w as f64;
    let new_h = ((h as f64 * scale).round() as u32).max(1);
    img.resize_exact(min_width, new_h, filter)
}

pub fn upscale_gray(gray: &GrayImage, min_width: u32) -> GrayImage {
    if gray.width() == 0 || gray.width() >= min_width {
        return gray.clone();
    }
    let scale = min_width as f64 / gray.width() as f64;
    let new_h = ((gray.height() as f64 * scale).round() as u32).max(1);
    image::imageops::resize(gray, min_width, new_h, FilterType::CatmullRom)
}

pub fn mean_intensity(gray: &GrayImage) -> f64 {
    let n = gray.width() as u64 * gray.height() as u64;
    if n == 0 {
        return 0.0;
    }
    gray.pixels().map(|p| p[0] as u64).sum::<u64>() as f64 / n as f64
}

/// Flip a binarized image to dark text on a light background.
pub fn invert_if_dark(gray: &mut GrayImage) {
    if mean_intensity(gray) < 127.0 {
        image::imageops::invert(gray);
    }
}

/// Min/max contrast stretch to the full 0–255 range.
pub fn stretch_contrast(gray: &GrayImage) -> GrayImage {
    let (min_px, max_px) = gray
        .pixels()
        .fold((255u8, 0u8), |(mn, mx), p| (mn.min(p[0]), mx.max(p[0])));

    if max_px <= min_px {
        return gray.clone();
    }
    contrast::stretch_contrast(gray, min_px, max_px, 0, 255)
}

/// Global threshold at `level`: strictly brighter pixels become white.
pub fn threshold_at(gray: &GrayImage, level: u8) -> GrayImage {
    contrast::threshold(gray, level, ThresholdType::Binary)
}

// ── Colour enhancement ────────────────────────────────────────────────────────

fn luma(r: u8, g: u8, b: u8) -> f32 {
    0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32
}

/// Scale each channel's distance from the mean luminance by `factor`.
pub fn adjust_contrast(img: &RgbImage, factor: f32) -> RgbImage {
    let n = img.width() as u64 * img.height() as u64;
    if n == 0 {
        return img.clone();
    }
    let mean = img.pixels().map(|p| luma(p[0], p[1], p[2]) as f64).sum::<f64>() / n as f64;
    let mean = mean.round() as f32;
    let mut out = img.clone();
    for p in out.pixels_mut() {
        for c in p.0.iter_mut() {
            *c = (mean + factor * (*c as f32 - mean)).round().clamp(0.0, 255.0) as u8;
        }
    }
    out
}

const SMOOTH_KERNEL: [f32; 9] = [
    1.0 / 13.0, 1.0 / 13.0, 1.0 / 13.0,
    1.0 / 13.0, 5.0 / 13.0, 1.0 / 13.0,
    1.0 / 13.0, 1.0 / 13.0, 1.0 / 13.0,
];

/// Blend away from a smoothed copy; `factor` 1.0 is the identity.
/// Edge pixels are left untouched.
pub fn adjust_sharpness(img: &RgbImage, factor: f32) -> RgbImage {
    let (w, h) = img.dimensions();
    if w < 3 || h < 3 {
        return img.clone();
    }
    let smooth: RgbImage = image::imageops::filter3x3(img, &SMOOTH_KERNEL);
    let mut out = img.clone();
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let s = smooth.get_pixel(x, y);
            let p = out.get_pixel_mut(x, y);
            for c in 0..3 {
                let base = s[c] as f32;
                p[c] = (base + factor * (p[c] as f32 - base)).round().clamp(0.0, 255.0) as u8;
            }
        }
    }
    out
}

// ── Local histogram equalization ──────────────────────────────────────────────

/// Contrast-limited adaptive histogram equalization over a `tiles`×`tiles`
/// grid, bilinearly interpolating between neighbouring tile mappings.
pub fn clahe(gray: &GrayImage, clip_limit: f32, tiles: u32) -> GrayImage {
    let (w, h) = gray.dimensions();
    let tiles = tiles.max(1);
    if w < tiles || h < tiles {
        return gray.clone();
    }
    let tile_w = w.div_ceil(tiles);
    let tile_h = h.div_ceil(tiles);

    let mut luts = vec![[0u8; 256]; (tiles * tiles) as usize];
    for ty in 0..tiles {
        for tx in 0..tiles {
            let x0 = tx * tile_w;
            let y0 = ty * tile_h;
            let x1 = (x0 + tile_w).min(w);
            let y1 = (y0 + tile_h).min(h);
            let mut hist = [0u32; 256];
            for y in y0..y1 {
                for x in x0..x1 {
                    hist[gray.get_pixel(x, y)[0] as usize] += 1;
                }
            }
            let count = (x1.saturating_sub(x0) * y1.saturating_sub(y0)).max(1);
            luts[(ty * tiles + tx) as usize] = clipped_equalization(&mut hist, count, clip_limit);
        }
    }

    // Trailing tiles can be empty when `tiles` does not divide the size.
    let last_tx = (w - 1) / tile_w;
    let last_ty = (h - 1) / tile_h;

    // Interpolate between the four nearest tile centres.
    ImageBuffer::from_fn(w, h, |x, y| {
        let v = gray.get_pixel(x, y)[0] as usize;
        let fx = (x as f32 + 0.5) / tile_w as f32 - 0.5;
        let fy = (y as f32 + 0.5) / tile_h as f32 - 0.5;
        let tx0 = fx.floor().clamp(0.0, last_tx as f32) as u32;
        let ty0 = fy.floor().clamp(0.0, last_ty as f32) as u32;
        let tx1 = (tx0 + 1).min(last_tx);
        let ty1 = (ty0 + 1).min(last_ty);
        let ax = (fx - tx0 as f32).clamp(0.0, 1.0);
        let ay = (fy - ty0 as f32).clamp(0.0, 1.0);
        let at = |tx: u32, ty: u32| luts[(ty * tiles + tx) as usize][v] as f32;
        let top = at(tx0, ty0) * (1.0 - ax) + at(tx1, ty0) * ax;
        let bottom = at(tx0, ty1) * (1.0 - ax) + at(tx1, ty1) * ax;
        Luma([(top * (1.0 - ay) + bottom * ay).round().clamp(0.0, 255.0) as u8])
    })
}

fn clipped_equalization(hist: &mut [u32; 256], count: u32, clip_limit: f32) -> [u8; 256] {
    let limit = ((clip_limit * count as f32 / 256.0) as u32).max(1);
    let mut excess = 0u32;
    for bin in hist.iter_mut() {
        if *bin > limit {
            excess += *bin - limit;
            *bin = limit;
        }
    }
    let share = excess / 256;
    let remainder = (excess % 256) as usize;
    for (i, bin) in hist.iter_mut().enumerate() {
        *bin += share + u32::from(i < remainder);
    }

    let mut lut = [0u8; 256];
    let mut cdf = 0u32;
    for (i, bin) in hist.iter().enumerate() {
        cdf += bin;
        lut[i] = ((cdf as f32 * 255.0 / count as f32).round()).min(255.0) as u8;
    }
    lut
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn gradient_gray(width: u32, height: u32) -> GrayImage {
        ImageBuffer::from_fn(width, height, |x, _| Luma([(x * 255 / width) as u8]))
    }

    #[test]
    fn stretch_gradient_reaches_full_range() {
        let gray: GrayImage = ImageBuffer::from_fn(100, 1, |x, _| Luma([50 + x as u8]));
        let out = stretch_contrast(&gray);
        assert_eq!(out.pixels().map(|p| p[0]).min(), Some(0));
        assert_eq!(out.pixels().map(|p| p[0]).max(), Some(255));
    }

    #[test]
    fn stretch_uniform_image_is_unchanged() {
        let gray: GrayImage = ImageBuffer::from_fn(10, 10, |_, _| Luma([128]));
        assert_eq!(stretch_contrast(&gray), gray);
    }

    #[test]
    fn invert_if_dark_flips_dark_images_only() {
        let mut dark: GrayImage = ImageBuffer::from_fn(4, 4, |_, _| Luma([10]));
        invert_if_dark(&mut dark);
        assert_eq!(dark.get_pixel(0, 0)[0], 245);

        let mut light: GrayImage = ImageBuffer::from_fn(4, 4, |_, _| Luma([200]));
        invert_if_dark(&mut light);
        assert_eq!(light.get_pixel(0, 0)[0], 200);
    }

    #[test]
    fn contrast_factor_one_is_identity() {
        let img: RgbImage = ImageBuffer::from_fn(8, 8, |x, y| Rgb([(x * 30) as u8, (y * 30) as u8, 90]));
        assert_eq!(adjust_contrast(&img, 1.0), img);
    }

    #[test]
    fn contrast_pushes_values_away_from_mean() {
        let img: RgbImage =
            ImageBuffer::from_fn(2, 1, |x, _| if x == 0 { Rgb([100, 100, 100]) } else { Rgb([150, 150, 150]) });
        let out = adjust_contrast(&img, 1.3);
        assert!(out.get_pixel(0, 0)[0] < 100);
        assert!(out.get_pixel(1, 0)[0] > 150);
    }

    #[test]
    fn sharpness_factor_one_is_identity_and_keeps_size() {
        let img: RgbImage = ImageBuffer::from_fn(16, 12, |x, y| Rgb([(x * 15) as u8, (y * 20) as u8, 40]));
        let out = adjust_sharpness(&img, 1.0);
        assert_eq!(out.dimensions(), (16, 12));
        for (a, b) in out.pixels().zip(img.pixels()) {
            for c in 0..3 {
                assert!((a[c] as i32 - b[c] as i32).abs() <= 1);
            }
        }
    }

    #[test]
    fn upscale_preserves_aspect_ratio() {
        let img = DynamicImage::ImageLuma8(gradient_gray(400, 300));
        let out = upscale_to_width(img, 800, FilterType::Lanczos3);
        assert_eq!((out.width(), out.height()), (800, 600));

        let wide = DynamicImage::ImageLuma8(gradient_gray(1200, 10));
        assert_eq!(upscale_to_width(wide, 800, FilterType::Lanczos3).width(), 1200);
    }

    #[test]
    fn clahe_keeps_dimensions_and_spreads_low_contrast() {
        let gray: GrayImage = ImageBuffer::from_fn(64, 64, |x, _| Luma([100 + (x % 8) as u8]));
        let out = clahe(&gray, 2.0, 8);
        assert_eq!(out.dimensions(), (64, 64));
        let spread = |g: &GrayImage| {
            let (mn, mx) = g.pixels().fold((255u8, 0u8), |(a, b), p| (a.min(p[0]), b.max(p[0])));
            mx - mn
        };
        assert!(spread(&out) > spread(&gray));
    }

    #[test]
    fn clahe_uniform_image_stays_uniform_when_tiles_do_not_divide() {
        for (w, h) in [(10, 10), (400, 49)] {
            let gray: GrayImage = ImageBuffer::from_fn(w, h, |_, _| Luma([200]));
            let out = clahe(&gray, 2.0, 8);
            let first = out.get_pixel(0, 0)[0];
            assert!(out.pixels().all(|p| p[0] == first), "{w}x{h} edge pixels drifted");
        }
    }

    #[test]
    fn threshold_keeps_only_strictly_brighter_pixels() {
        let gray: GrayImage = ImageBuffer::from_fn(3, 1, |x, _| Luma([[99, 100, 101][x as usize]]));
        let out = threshold_at(&gray, 100);
        assert_eq!(out.as_raw(), &vec![0, 0, 255]);
    }

    #[test]
    fn jpeg_and_png_encoders_emit_magic_bytes() {
        let img = DynamicImage::ImageLuma8(gradient_gray(16, 16));
        assert_eq!(&encode_jpeg(&img, 90).unwrap()[..3], &[0xFF, 0xD8, 0xFF]);
        assert_eq!(&encode_png(&img).unwrap()[..4], b"\x89PNG");
    }

    #[test]
    fn decode_roundtrips_png() {
        let img = DynamicImage::ImageLuma8(gradient_gray(20, 10));
        let png = encode_png(&img).unwrap();
        assert!(is_decodable(&png));
        let decoded = decode_oriented(&png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (20, 10));
        assert!(decode_oriented(b"not an image").is_err());
    }
}
