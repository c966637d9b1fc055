use receiptly_core::BoundaryPolygon;

use super::BoundaryError;
use crate::imaging;

/// Crop to the polygon's bounding rectangle (normalized points are mapped to
/// pixels first, then clamped to the image) and re-encode as JPEG.
pub fn crop_to_polygon(bytes: &[u8], polygon: &BoundaryPolygon, quality: u8) -> Result<Vec<u8>, BoundaryError> {
    let img = imaging::decode_oriented(bytes)?;
    let rect = polygon
        .to_pixel_rect(img.width(), img.height())
        .ok_or(BoundaryError::EmptyCrop)?;
    let cropped = img.crop_imm(rect.x, rect.y, rect.width, rect.height);
    Ok(imaging::encode_jpeg(&cropped, quality)?)
}
