use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum PolygonError {
    #[error("a boundary polygon needs at least 3 points, got {0}")]
    TooFewPoints(usize),
    #[error("polygon coordinate is not a finite number")]
    NonFinite,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Whether polygon coordinates are fractions of the page or absolute pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinateSpace {
    Normalized,
    Pixels,
}

/// Ordered points delimiting the receipt inside a larger photo.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoundaryPolygon {
    points: Vec<Point>,
    space: CoordinateSpace,
}

impl BoundaryPolygon {
    pub fn new(points: Vec<Point>, space: CoordinateSpace) -> Result<Self, PolygonError> {
        if points.len() < 3 {
            return Err(PolygonError::TooFewPoints(points.len()));
        }
        if points.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
            return Err(PolygonError::NonFinite);
        }
        Ok(Self { points, space })
    }

    /// Axis-aligned rectangle, clockwise from the top-left corner.
    pub fn from_rect(x: f64, y: f64, width: f64, height: f64, space: CoordinateSpace) -> Self {
        Self {
            points: vec![
                Point::new(x, y),
                Point::new(x + width, y),
                Point::new(x + width, y + height),
                Point::new(x, y + height),
            ],
            space,
        }
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn space(&self) -> CoordinateSpace {
        self.space
    }

    /// `(min_x, min_y, max_x, max_y)` in the polygon's own coordinate space.
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        self.points.iter().fold(
            (f64::MAX, f64::MAX, f64::MIN, f64::MIN),
            |(x0, y0, x1, y1), p| (x0.min(p.x), y0.min(p.y), x1.max(p.x), y1.max(p.y)),
        )
    }

    /// Bounding rectangle in pixels of a `width`×`height` image, clamped to
    /// the image. `None` when nothing of the polygon lies inside it.
    pub fn to_pixel_rect(&self, width: u32, height: u32) -> Option<PixelRect> {
        let (sx, sy) = match self.space {
            CoordinateSpace::Normalized => (width as f64, height as f64),
            CoordinateSpace::Pixels => (1.0, 1.0),
        };
        let (min_x, min_y, max_x, max_y) = self.bounds();
        let clamp_x = |v: f64| v.clamp(0.0, width as f64) as u32;
        let clamp_y = |v: f64| v.clamp(0.0, height as f64) as u32;

        let x0 = clamp_x((min_x * sx).floor());
        let y0 = clamp_y((min_y * sy).floor());
        let x1 = clamp_x((max_x * sx).ceil());
        let y1 = clamp_y((max_y * sy).ceil());

        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some(PixelRect { x: x0, y: y0, width: x1 - x0, height: y1 - y0 })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryMethod {
    Geometry,
    CloudLayout,
}

/// How the receipt was located, reported back to the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoundaryInfo {
    pub polygon: BoundaryPolygon,
    pub method: BoundaryMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_count: Option<usize>,
}
