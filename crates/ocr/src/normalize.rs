use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, Rgb, RgbImage};
use imageproc::edges::canny;
use imageproc::geometric_transformations::{warp_with, Interpolation};
use imageproc::hough::{detect_lines, LineDetectionOptions, PolarLine};
use receiptly_core::config::NormalizerConfig;
use receiptly_core::{Diagnostics, ImageFormat};
use tracing::{debug, warn};

use crate::imaging::{self, PreprocessError};

/// Prepares uploads for the document service: bounded size, upright,
/// enhanced for OCR.
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    config: NormalizerConfig,
}

impl Normalizer {
    pub fn new(config: NormalizerConfig) -> Self {
        Self { config }
    }

    /// Never fails: any internal error yields the input unchanged.
    pub fn normalize(&self, bytes: &[u8], diagnostics: Option<&Diagnostics>) -> Vec<u8> {
        if let Some(reason) = self.passthrough_reason(bytes) {
            debug!(reason, size = bytes.len(), "Skipping normalization");
            return bytes.to_vec();
        }

        match self.try_normalize(bytes) {
            Ok(Some(out)) => {
                if let Some(d) = diagnostics {
                    d.record("normalize", format_args!("{} -> {} bytes", bytes.len(), out.len()));
                }
                out
            }
            Ok(None) => {
                warn!(
                    size = bytes.len(),
                    max_bytes = self.config.max_bytes,
                    "Re-encode could not reach the size budget; keeping original"
                );
                bytes.to_vec()
            }
            Err(e) => {
                warn!(error = %e, "Normalization failed; keeping original");
                bytes.to_vec()
            }
        }
    }

    fn passthrough_reason(&self, bytes: &[u8]) -> Option<&'static str> {
        if bytes.is_empty() {
            Some("empty input")
        } else if ImageFormat::sniff(bytes).is_pdf() {
            Some("pdf")
        } else if bytes.len() as f64 > self.config.max_bytes as f64 * self.config.passthrough_ratio {
            Some("near size budget")
        } else {
            None
        }
    }

    fn try_normalize(&self, bytes: &[u8]) -> Result<Option<Vec<u8>>, PreprocessError> {
        let cfg = &self.config;
        let img = imaging::decode_oriented(bytes)?;
        let img = DynamicImage::ImageRgb8(img.to_rgb8());
        let rgb = imaging::upscale_to_width(img, cfg.min_width, FilterType::Lanczos3).to_rgb8();

        let rgb = imaging::adjust_contrast(&rgb, cfg.contrast);
        let rgb = imaging::adjust_sharpness(&rgb, cfg.sharpness);
        let rgb = if cfg.denoise_radius > 0 {
            imageproc::filter::median_filter(&rgb, cfg.denoise_radius, cfg.denoise_radius)
        } else {
            rgb
        };
        let rgb = if cfg.deskew { deskew(rgb, cfg) } else { rgb };

        let out = if cfg.binarize {
            let gray = image::imageops::grayscale(&rgb);
            let binary = imageproc::contrast::adaptive_threshold(&gray, cfg.binarize_block_radius);
            DynamicImage::ImageLuma8(binary)
        } else {
            DynamicImage::ImageRgb8(rgb)
        };

        self.encode_within_budget(&out)
    }

    /// Step JPEG quality down until the output fits. `None` when even the
    /// floor quality is over budget.
    fn encode_within_budget(&self, img: &DynamicImage) -> Result<Option<Vec<u8>>, PreprocessError> {
        let cfg = &self.config;
        let step = cfg.jpeg_quality_step.max(1);
        let mut quality = cfg.jpeg_quality_start.clamp(1, 100);
        loop {
            let encoded = imaging::encode_jpeg(img, quality)?;
            debug!(quality, size = encoded.len(), "Encoded normalized image");
            if encoded.len() <= cfg.max_bytes {
                return Ok(Some(encoded));
            }
            if quality <= cfg.jpeg_quality_floor || quality <= step {
                return Ok(None);
            }
            quality = (quality - step).max(cfg.jpeg_quality_floor);
        }
    }
}

// ── Deskew ────────────────────────────────────────────────────────────────────

/// Rotate text lines back to horizontal. Leaves the image untouched when no
/// lines are found or the skew is within tolerance.
fn deskew(rgb: RgbImage, cfg: &NormalizerConfig) -> RgbImage {
    let gray: GrayImage = image::imageops::grayscale(&rgb);
    let edges = canny(&gray, 50.0, 150.0);
    let lines = detect_lines(&edges, LineDetectionOptions { vote_threshold: 200, suppression_radius: 8 });

    let Some(angle) = median_skew(&lines, cfg.deskew_sample_lines) else {
        debug!("No text lines found for deskew");
        return rgb;
    };
    if !needs_rotation(angle, cfg.deskew_min_angle) {
        debug!(angle, "Skew within tolerance");
        return rgb;
    }
    debug!(angle, lines = lines.len(), "Deskewing");
    rotate_replicate(&rgb, angle)
}

/// Median skew in degrees over the first `sample` near-horizontal lines.
/// A Hough angle of 90° is a horizontal line; skew is the offset from it.
fn median_skew(lines: &[PolarLine], sample: usize) -> Option<f32> {
    let mut angles: Vec<f32> = lines
        .iter()
        .map(|l| l.angle_in_degrees as f32 - 90.0)
        .filter(|a| a.abs() <= 45.0)
        .take(sample)
        .collect();
    if angles.is_empty() {
        return None;
    }
    angles.sort_by(|a, b| a.total_cmp(b));
    let mid = angles.len() / 2;
    Some(if angles.len() % 2 == 0 { (angles[mid - 1] + angles[mid]) / 2.0 } else { angles[mid] })
}

fn needs_rotation(angle: f32, min_angle: f32) -> bool {
    angle.abs() > min_angle
}

/// Rotate counter-clockwise by `angle_deg` about the centre, sampling edge
/// pixels for anything that would fall outside the source.
fn rotate_replicate(rgb: &RgbImage, angle_deg: f32) -> RgbImage {
    let (w, h) = rgb.dimensions();
    let (cx, cy) = (w as f32 / 2.0, h as f32 / 2.0);
    let (sin, cos) = angle_deg.to_radians().sin_cos();
    let max_x = (w as f32 - 1.001).max(0.0);
    let max_y = (h as f32 - 1.001).max(0.0);
    warp_with(
        rgb,
        move |x, y| {
            let (dx, dy) = (x - cx, y - cy);
            let sx = cx + dx * cos - dy * sin;
            let sy = cy + dx * sin + dy * cos;
            (sx.clamp(0.0, max_x), sy.clamp(0.0, max_y))
        },
        Interpolation::Bilinear,
        Rgb([255, 255, 255]),
    )
}
