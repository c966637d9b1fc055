use image::imageops::FilterType;
use image::GrayImage;
use imageproc::contours::{find_contours, BorderType};
use imageproc::contrast::{adaptive_threshold, otsu_level};
use imageproc::distance_transform::Norm;
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;
use imageproc::geometry::{approximate_polygon_dp, arc_length};
use imageproc::morphology::{close, dilate};
use imageproc::point::Point as PixelPoint;
use receiptly_core::config::BoundaryConfig;
use receiptly_core::{
    BoundaryInfo, BoundaryMethod, BoundaryPolygon, CoordinateSpace, Diagnostics, PixelRect, Point,
};
use tracing::{debug, info};

use super::{BoundaryError, Detection};
use crate::imaging;

const CANNY_THRESHOLDS: [(f32, f32); 3] = [(30.0, 100.0), (50.0, 150.0), (75.0, 200.0)];
const BORDER_MARGIN: f64 = 2.0;
const BORDER_PENALTY: f64 = 0.3;

/// Contour-based receipt finder. Works on a downscaled grayscale copy and
/// maps the winning contour back to source pixels.
#[derive(Debug, Clone)]
pub struct GeometryDetector {
    config: BoundaryConfig,
}

#[derive(Debug, Clone)]
struct Candidate {
    points: Vec<PixelPoint<i32>>,
    score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BoundsCheck {
    Accept,
    /// Near-full-frame crop of a tightly framed photo.
    AcceptTight,
    Reject(&'static str),
}

impl GeometryDetector {
    pub fn new(config: BoundaryConfig) -> Self {
        Self { config }
    }

    /// Never fails: returns the original bytes without a polygon when no
    /// plausible receipt is found.
    pub fn detect(&self, bytes: &[u8], diagnostics: Option<&Diagnostics>) -> Detection {
        match self.try_detect(bytes, diagnostics) {
            Ok(Some(detection)) => detection,
            Ok(None) => Detection::unchanged(bytes),
            Err(e) => {
                debug!(error = %e, "Geometry boundary detection failed");
                Detection::unchanged(bytes)
            }
        }
    }

    fn try_detect(&self, bytes: &[u8], diagnostics: Option<&Diagnostics>) -> Result<Option<Detection>, BoundaryError> {
        let cfg = &self.config;
        let img = imaging::decode_oriented(bytes)?;
        let (width, height) = (img.width(), img.height());
        let gray = img.to_luma8();

        let longest = width.max(height).max(1);
        let scale = (cfg.analysis_max_side as f64 / longest as f64).min(1.0);
        let work = if scale < 1.0 {
            let w = ((width as f64 * scale).round() as u32).max(1);
            let h = ((height as f64 * scale).round() as u32).max(1);
            image::imageops::resize(&gray, w, h, FilterType::Triangle)
        } else {
            gray
        };

        let Some(best) = self.best_candidate(&work) else {
            debug!("No contour large enough for a receipt");
            return Ok(None);
        };
        if let Some(d) = diagnostics {
            d.record("boundary", format_args!("best contour score {:.3}", best.score));
        }
        if best.score < cfg.acceptance_threshold as f64 {
            debug!(score = best.score, threshold = cfg.acceptance_threshold, "Best contour below threshold");
            return Ok(None);
        }

        let polygon = self.source_polygon(&best.points, scale);
        let Some(rect) = polygon.to_pixel_rect(width, height) else {
            return Ok(None);
        };
        match self.check_bounds(rect, width, height) {
            BoundsCheck::Reject(reason) => {
                debug!(reason, ?rect, "Receipt bounds rejected");
                return Ok(None);
            }
            BoundsCheck::AcceptTight => info!(?rect, "Accepting tightly framed receipt"),
            BoundsCheck::Accept => {}
        }

        let padded = pad_rect(rect, cfg.padding, width, height);
        let cropped = img.crop_imm(padded.x, padded.y, padded.width, padded.height);
        let out = imaging::encode_jpeg(&cropped, cfg.jpeg_quality)?;
        info!(score = best.score, ?padded, "Cropped receipt by geometry");

        Ok(Some(Detection {
            bytes: out,
            boundary: Some(BoundaryInfo { polygon, method: BoundaryMethod::Geometry, page_count: None }),
        }))
    }

    fn best_candidate(&self, gray: &GrayImage) -> Option<Candidate> {
        let (w, h) = gray.dimensions();
        let image_area = w as f64 * h as f64;
        if image_area == 0.0 {
            return None;
        }

        candidate_masks(gray)
            .iter()
            .flat_map(|mask| find_contours::<i32>(mask))
            .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
            .filter(|c| c.points.len() >= 4)
            .filter_map(|c| {
                let area = shoelace_area(&c.points);
                if area / image_area < self.config.min_area_ratio {
                    return None;
                }
                let score = contour_score(&c.points, area, w, h);
                Some(Candidate { points: c.points, score })
            })
            .max_by(|a, b| a.score.total_cmp(&b.score))
    }

    /// Simplified contour in source pixels, or its bounding box when
    /// simplification degenerates.
    fn source_polygon(&self, points: &[PixelPoint<i32>], scale: f64) -> BoundaryPolygon {
        let epsilon = 0.02 * arc_length(points, true);
        let simplified = approximate_polygon_dp(points, epsilon, true);
        let to_source = |p: &PixelPoint<i32>| Point::new(p.x as f64 / scale, p.y as f64 / scale);
        let scaled: Vec<Point> = simplified.iter().map(to_source).collect();
        BoundaryPolygon::new(scaled, CoordinateSpace::Pixels).unwrap_or_else(|_| {
            let (x0, y0, x1, y1) = bounds(points);
            BoundaryPolygon::from_rect(
                x0 / scale,
                y0 / scale,
                (x1 - x0) / scale,
                (y1 - y0) / scale,
                CoordinateSpace::Pixels,
            )
        })
    }

    fn check_bounds(&self, rect: PixelRect, width: u32, height: u32) -> BoundsCheck {
        let cfg = &self.config;
        let ratio = rect.area() as f64 / (width as f64 * height as f64);
        if ratio < cfg.min_area_ratio {
            return BoundsCheck::Reject("covers too little of the image");
        }
        if ratio > cfg.max_area_ratio {
            return BoundsCheck::Reject("covers the whole image");
        }
        if rect.width < cfg.min_side || rect.height < cfg.min_side {
            return BoundsCheck::Reject("below minimum size");
        }
        let aspect = rect.width.max(rect.height) as f64 / rect.width.min(rect.height) as f64;
        if aspect > cfg.max_aspect {
            return BoundsCheck::Reject("extreme aspect ratio");
        }
        if ratio >= cfg.tight_frame_ratio {
            BoundsCheck::AcceptTight
        } else {
            BoundsCheck::Accept
        }
    }
}

// ── Candidate extraction ──────────────────────────────────────────────────────

/// Binary masks whose outer contours are receipt candidates: dilated Canny
/// edges at several thresholds, edges of an adaptive threshold, and a
/// brightness mask.
fn candidate_masks(gray: &GrayImage) -> Vec<GrayImage> {
    let blurred = gaussian_blur_f32(gray, 1.5);
    let mut masks: Vec<GrayImage> = CANNY_THRESHOLDS
        .iter()
        .map(|&(low, high)| dilate(&canny(&blurred, low, high), Norm::LInf, 2))
        .collect();

    let adaptive = adaptive_threshold(&blurred, 5);
    masks.push(dilate(&canny(&adaptive, 50.0, 150.0), Norm::LInf, 2));

    let level = otsu_level(&blurred);
    masks.push(close(&imaging::threshold_at(&blurred, level), Norm::LInf, 3));
    masks
}

// ── Scoring ───────────────────────────────────────────────────────────────────

fn contour_score(points: &[PixelPoint<i32>], area: f64, width: u32, height: u32) -> f64 {
    let (w, h) = (width as f64, height as f64);
    let (x0, y0, x1, y1) = bounds(points);
    let (bw, bh) = ((x1 - x0).max(1.0), (y1 - y0).max(1.0));

    let area_ratio = area / (w * h);
    let area_score = if area_ratio < 0.10 {
        area_ratio / 0.10
    } else if area_ratio <= 0.85 {
        1.0
    } else {
        ((1.0 - area_ratio) / 0.15).max(0.0)
    };

    let portrait = bh / bw;
    let aspect_score = if (1.2..=4.0).contains(&portrait) {
        1.0
    } else if (0.8..1.2).contains(&portrait) {
        0.6
    } else if portrait > 4.0 {
        0.5
    } else {
        0.3
    };

    let rectangularity = (area / (bw * bh)).min(1.0);

    let (cx, cy) = ((x0 + x1) / 2.0, (y0 + y1) / 2.0);
    let offset = ((cx - w / 2.0).powi(2) + (cy - h / 2.0).powi(2)).sqrt();
    let half_diagonal = (w * w + h * h).sqrt() / 2.0;
    let centeredness = (1.0 - offset / half_diagonal).clamp(0.0, 1.0);

    let touches_border = x0 <= BORDER_MARGIN
        || y0 <= BORDER_MARGIN
        || x1 >= w - 1.0 - BORDER_MARGIN
        || y1 >= h - 1.0 - BORDER_MARGIN;
    let penalty = if touches_border { BORDER_PENALTY } else { 0.0 };

    0.30 * area_score + 0.20 * aspect_score + 0.30 * rectangularity + 0.20 * centeredness - penalty
}

fn shoelace_area(points: &[PixelPoint<i32>]) -> f64 {
    let n = points.len();
    if n < 3 {
        return 0.0;
    }
    let twice: f64 = (0..n)
        .map(|i| {
            let (a, b) = (points[i], points[(i + 1) % n]);
            a.x as f64 * b.y as f64 - b.x as f64 * a.y as f64
        })
        .sum();
    twice.abs() / 2.0
}

fn bounds(points: &[PixelPoint<i32>]) -> (f64, f64, f64, f64) {
    points.iter().fold((f64::MAX, f64::MAX, f64::MIN, f64::MIN), |(x0, y0, x1, y1), p| {
        (x0.min(p.x as f64), y0.min(p.y as f64), x1.max(p.x as f64), y1.max(p.y as f64))
    })
}

fn pad_rect(rect: PixelRect, padding: u32, width: u32, height: u32) -> PixelRect {
    let x = rect.x.saturating_sub(padding);
    let y = rect.y.saturating_sub(padding);
    let right = (rect.x + rect.width + padding).min(width);
    let bottom = (rect.y + rect.height + padding).min(height);
    PixelRect { x, y, width: right - x, height: bottom - y }
}
