//! Locating the receipt inside a larger photo and cropping to it.

pub mod crop;
pub mod geometry;
pub mod layout;

use std::sync::Arc;

use receiptly_core::config::{BoundaryConfig, BoundaryStrategy};
use receiptly_core::geometry::PolygonError;
use receiptly_core::{BoundaryInfo, Diagnostics, LayoutService, ServiceError};
use thiserror::Error;
use tracing::{info, warn};

use crate::imaging::PreprocessError;

pub use crop::crop_to_polygon;
pub use geometry::GeometryDetector;
pub use layout::{polygon_from_layout, LayoutDetector};

#[derive(Debug, Error)]
pub enum BoundaryError {
    #[error("Image preprocessing failed: {0}")]
    Preprocess(#[from] PreprocessError),
    #[error("Layout service failed: {0}")]
    Service(#[from] ServiceError),
    #[error("Layout result has no usable page")]
    NoPage,
    #[error("Invalid boundary polygon: {0}")]
    Polygon(#[from] PolygonError),
    #[error("Boundary polygon does not overlap the image")]
    EmptyCrop,
    #[error("Crop worker failed: {0}")]
    Worker(String),
}

/// Image bytes after boundary detection. `boundary` is `None` when the
/// original bytes are returned uncropped.
#[derive(Debug, Clone)]
pub struct Detection {
    pub bytes: Vec<u8>,
    pub boundary: Option<BoundaryInfo>,
}

impl Detection {
    pub fn unchanged(bytes: &[u8]) -> Self {
        Self { bytes: bytes.to_vec(), boundary: None }
    }
}

/// Runs the configured strategy; the cloud-layout strategy falls back to
/// geometry when the service fails. Never fails.
#[derive(Debug, Clone)]
pub struct BoundaryDetector {
    strategy: BoundaryStrategy,
    geometry: GeometryDetector,
    layout: LayoutDetector,
}

impl BoundaryDetector {
    pub fn new(config: BoundaryConfig) -> Self {
        Self {
            strategy: config.strategy,
            layout: LayoutDetector::new(config.layout_line_padding, config.jpeg_quality),
            geometry: GeometryDetector::new(config),
        }
    }

    pub async fn detect<L: LayoutService>(
        &self,
        service: &L,
        image: Arc<[u8]>,
        diagnostics: Option<&Diagnostics>,
    ) -> Detection {
        match self.strategy {
            BoundaryStrategy::Disabled => Detection::unchanged(&image),
            BoundaryStrategy::Geometry => self.detect_geometry(image, diagnostics).await,
            BoundaryStrategy::CloudLayout => {
                match self.layout.detect(service, image.clone()).await {
                    Ok(detection) => {
                        info!("Receipt boundary taken from cloud layout");
                        detection
                    }
                    Err(e) => {
                        warn!(error = %e, "Cloud layout detection failed; using geometry");
                        self.detect_geometry(image, diagnostics).await
                    }
                }
            }
        }
    }

    async fn detect_geometry(&self, image: Arc<[u8]>, diagnostics: Option<&Diagnostics>) -> Detection {
        let geometry = self.geometry.clone();
        let diagnostics = diagnostics.cloned();
        let input = image.clone();
        match tokio::task::spawn_blocking(move || geometry.detect(&input, diagnostics.as_ref())).await {
            Ok(detection) => detection,
            Err(e) => {
                warn!(error = %e, "Geometry detection worker failed; using original image");
                Detection::unchanged(&image)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, GrayImage, ImageBuffer, Luma};
    use receiptly_core::{BoundaryMethod, LayoutPage, LayoutResult, Point};

    struct FailingLayout;

    impl LayoutService for FailingLayout {
        async fn analyze_layout(&self, _image: &[u8]) -> Result<LayoutResult, ServiceError> {
            Err(ServiceError::Transport("connection refused".into()))
        }
    }

    struct FixedLayout;

    impl LayoutService for FixedLayout {
        async fn analyze_layout(&self, _image: &[u8]) -> Result<LayoutResult, ServiceError> {
            Ok(LayoutResult {
                pages: vec![LayoutPage {
                    width: 400.0,
                    height: 500.0,
                    polygon: Some(vec![
                        Point::new(100.0, 80.0),
                        Point::new(300.0, 80.0),
                        Point::new(300.0, 420.0),
                        Point::new(100.0, 420.0),
                    ]),
                    lines: vec![],
                }],
            })
        }
    }

    fn receipt_photo() -> Arc<[u8]> {
        let img: GrayImage = ImageBuffer::from_fn(400, 500, |x, y| {
            let inside = (100..300).contains(&x) && (80..420).contains(&y);
            Luma([if inside { 230 } else { 30 }])
        });
        crate::imaging::encode_png(&DynamicImage::ImageLuma8(img)).unwrap().into()
    }

    #[tokio::test]
    async fn layout_failure_falls_back_to_geometry() {
        let detector = BoundaryDetector::new(BoundaryConfig::default());
        let detection = detector.detect(&FailingLayout, receipt_photo(), None).await;
        let info = detection.boundary.expect("geometry should find the receipt");
        assert_eq!(info.method, BoundaryMethod::Geometry);
    }

    #[tokio::test]
    async fn layout_polygon_is_used_when_available() {
        let detector = BoundaryDetector::new(BoundaryConfig::default());
        let detection = detector.detect(&FixedLayout, receipt_photo(), None).await;
        let info = detection.boundary.unwrap();
        assert_eq!(info.method, BoundaryMethod::CloudLayout);
        assert_eq!(info.page_count, Some(1));
        let cropped = image::load_from_memory(&detection.bytes).unwrap();
        assert_eq!((cropped.width(), cropped.height()), (200, 340));
    }

    #[tokio::test]
    async fn disabled_strategy_returns_original() {
        let config = BoundaryConfig { strategy: BoundaryStrategy::Disabled, ..Default::default() };
        let photo = receipt_photo();
        let detection = BoundaryDetector::new(config).detect(&FixedLayout, photo.clone(), None).await;
        assert!(detection.boundary.is_none());
        assert_eq!(detection.bytes, photo.to_vec());
    }
}
