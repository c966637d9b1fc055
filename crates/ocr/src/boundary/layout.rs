use std::sync::Arc;

use receiptly_core::{
    BoundaryInfo, BoundaryMethod, BoundaryPolygon, CoordinateSpace, LayoutResult, LayoutService, Point,
};
use tracing::debug;

use super::{crop_to_polygon, BoundaryError, Detection};

/// Boundary from the document service's layout analysis.
#[derive(Debug, Clone)]
pub struct LayoutDetector {
    line_padding: f64,
    jpeg_quality: u8,
}

impl LayoutDetector {
    pub fn new(line_padding: f64, jpeg_quality: u8) -> Self {
        Self { line_padding, jpeg_quality }
    }

    pub async fn detect<L: LayoutService>(&self, service: &L, image: Arc<[u8]>) -> Result<Detection, BoundaryError> {
        let layout = service.analyze_layout(&image).await?;
        let polygon = polygon_from_layout(&layout, self.line_padding)?;
        debug!(points = polygon.points().len(), pages = layout.pages.len(), "Layout boundary");

        let quality = self.jpeg_quality;
        let crop_polygon = polygon.clone();
        let bytes = tokio::task::spawn_blocking(move || crop_to_polygon(&image, &crop_polygon, quality))
            .await
            .map_err(|e| BoundaryError::Worker(e.to_string()))??;

        Ok(Detection {
            bytes,
            boundary: Some(BoundaryInfo {
                polygon,
                method: BoundaryMethod::CloudLayout,
                page_count: Some(layout.pages.len()),
            }),
        })
    }
}

/// Normalized boundary of the first page: its explicit polygon, else the
/// padded box around every text line, else the whole page.
pub fn polygon_from_layout(layout: &LayoutResult, line_padding: f64) -> Result<BoundaryPolygon, BoundaryError> {
    let page = layout.pages.first().ok_or(BoundaryError::NoPage)?;
    let (w, h) = (page.width, page.height);
    if !(w > 0.0 && h > 0.0) {
        return Err(BoundaryError::NoPage);
    }

    if let Some(points) = page.polygon.as_ref().filter(|p| p.len() >= 3) {
        let normalized = points.iter().map(|p| Point::new(p.x / w, p.y / h)).collect();
        return Ok(BoundaryPolygon::new(normalized, CoordinateSpace::Normalized)?);
    }

    let line_points: Vec<&Point> = page.lines.iter().flat_map(|l| l.polygon.iter()).collect();
    if !line_points.is_empty() {
        let (x0, y0, x1, y1) = line_points.iter().fold(
            (f64::MAX, f64::MAX, f64::MIN, f64::MIN),
            |(x0, y0, x1, y1), p| (x0.min(p.x), y0.min(p.y), x1.max(p.x), y1.max(p.y)),
        );
        let (pad_x, pad_y) = (w * line_padding, h * line_padding);
        let x0 = (x0 - pad_x).clamp(0.0, w);
        let y0 = (y0 - pad_y).clamp(0.0, h);
        let x1 = (x1 + pad_x).clamp(0.0, w);
        let y1 = (y1 + pad_y).clamp(0.0, h);
        return Ok(BoundaryPolygon::from_rect(
            x0 / w,
            y0 / h,
            (x1 - x0) / w,
            (y1 - y0) / h,
            CoordinateSpace::Normalized,
        ));
    }

    Ok(BoundaryPolygon::from_rect(0.0, 0.0, 1.0, 1.0, CoordinateSpace::Normalized))
}

#[cfg(test)]
mod tests {
    use super::*;
    use receiptly_core::{LayoutLine, LayoutPage};

    fn page(polygon: Option<Vec<Point>>, lines: Vec<LayoutLine>) -> LayoutResult {
        LayoutResult { pages: vec![LayoutPage { width: 1000.0, height: 2000.0, polygon, lines }] }
    }

    fn line(x0: f64, y0: f64, x1: f64, y1: f64) -> LayoutLine {
        LayoutLine {
            content: "TOTAL 12.00".into(),
            polygon: vec![Point::new(x0, y0), Point::new(x1, y0), Point::new(x1, y1), Point::new(x0, y1)],
        }
    }

    #[test]
    fn page_polygon_has_priority() {
        let poly = vec![Point::new(100.0, 200.0), Point::new(900.0, 200.0), Point::new(900.0, 1800.0)];
        let result = polygon_from_layout(&page(Some(poly), vec![line(0.0, 0.0, 10.0, 10.0)]), 0.02).unwrap();
        assert_eq!(result.space(), CoordinateSpace::Normalized);
        assert_eq!(result.points()[0], Point::new(0.1, 0.1));
        assert_eq!(result.points().len(), 3);
    }

    #[test]
    fn text_lines_are_padded_and_clamped() {
        let layout = page(None, vec![line(200.0, 400.0, 800.0, 500.0), line(10.0, 1900.0, 600.0, 1990.0)]);
        let result = polygon_from_layout(&layout, 0.02).unwrap();
        let (x0, y0, x1, y1) = result.bounds();
        assert!((x0 - 0.0).abs() < 1e-9, "left edge clamps to 0, got {x0}");
        assert!((y0 - 0.18).abs() < 1e-9);
        assert!((x1 - 0.82).abs() < 1e-9);
        assert!((y1 - 1.0).abs() < 1e-9);
    }

    #[test]
    fn empty_page_uses_full_extent() {
        let result = polygon_from_layout(&page(None, vec![]), 0.02).unwrap();
        assert_eq!(result.bounds(), (0.0, 0.0, 1.0, 1.0));
    }

    #[test]
    fn no_pages_is_an_error() {
        assert!(matches!(polygon_from_layout(&LayoutResult::default(), 0.02), Err(BoundaryError::NoPage)));
    }
}
