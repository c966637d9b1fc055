//! Store location details from the top of the receipt.
//!
//! The header strip is prepared several ways, each preparation is OCR'd, and
//! the parse with the best weighted score is kept.

pub mod parse;
pub mod variants;

use image::{DynamicImage, GrayImage};
use receiptly_core::config::LocationConfig;
use receiptly_core::{Diagnostics, LocationCandidate, LocationStrategy};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::imaging::{self, PreprocessError};
use crate::recognizer::{OcrBackend, OcrError, PageSegMode};
use crate::store_name::StoreNameLadder;

pub use parse::{detect_country, extract_address, extract_phone, extract_postal_code, parse_location};
pub use variants::STRATEGIES;

#[derive(Debug, Error)]
pub enum LocationError {
    #[error("Image preprocessing failed: {0}")]
    Preprocess(#[from] PreprocessError),
    #[error("OCR failed: {0}")]
    Ocr(#[from] OcrError),
    #[error("No preprocessing strategy produced location data")]
    NothingExtracted,
}

pub struct LocationEngine<B> {
    backend: B,
    ladder: StoreNameLadder,
    config: LocationConfig,
}

impl<B: OcrBackend> LocationEngine<B> {
    pub fn new(backend: B, ladder: StoreNameLadder, config: LocationConfig) -> Self {
        Self { backend, ladder, config }
    }

    /// Best candidate across all preparations. A variant must score strictly
    /// above the current best, so a run where every parse is empty fails with
    /// [`LocationError::NothingExtracted`].
    pub fn extract(&self, bytes: &[u8], diagnostics: Option<&Diagnostics>) -> Result<LocationCandidate, LocationError> {
        let gray = imaging::decode_oriented(bytes)?.to_luma8();
        let header = header_strip(&gray, self.config.header_fraction);
        debug!(width = header.width(), height = header.height(), "Location header strip");

        let mut best: Option<(f32, LocationCandidate)> = None;
        for strategy in STRATEGIES {
            let candidate = match self.run_variant(strategy, &header) {
                Ok(candidate) => candidate,
                Err(e) => {
                    warn!(%strategy, error = %e, "Location variant failed");
                    continue;
                }
            };
            let score = candidate.confidence
                + if candidate.store_name.is_some() { self.config.store_name_bonus } else { 0.0 };
            if let Some(d) = diagnostics {
                d.record("location", format_args!("{strategy} scored {score:.2}"));
            }
            if score > best.as_ref().map_or(0.0, |(s, _)| *s) {
                best = Some((score, candidate));
            }
        }

        let (score, candidate) = best.ok_or(LocationError::NothingExtracted)?;
        info!(
            strategy = ?candidate.strategy_used,
            score,
            store = candidate.store_name.as_deref().unwrap_or(""),
            "Location extracted"
        );
        Ok(candidate)
    }

    fn run_variant(&self, strategy: LocationStrategy, header: &GrayImage) -> Result<LocationCandidate, LocationError> {
        let prepared = variants::prepare(strategy, header, &self.config);
        let png = imaging::encode_png(&DynamicImage::ImageLuma8(prepared))?;

        let block = self.backend.recognize(&png, PageSegMode::SingleBlock)?;
        let auto = self.backend.recognize(&png, PageSegMode::Auto)?;
        let best = if auto.text.chars().count() > block.text.chars().count() { auto } else { block };

        let mut candidate = parse_location(&best.text, &self.ladder, &self.config.weights);
        candidate.raw_text = best.text.chars().take(self.config.raw_text_limit).collect();
        candidate.strategy_used = Some(strategy);
        debug!(
            %strategy,
            confidence = candidate.confidence,
            word_confidence = ?best.mean_word_confidence(),
            "Location variant parsed"
        );
        Ok(candidate)
    }
}

/// Top `fraction` of the image, at least one row.
fn header_strip(gray: &GrayImage, fraction: f32) -> GrayImage {
    let rows = ((gray.height() as f32 * fraction) as u32).clamp(1, gray.height().max(1));
    image::imageops::crop_imm(gray, 0, 0, gray.width(), rows).to_image()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognizer::{MockRecognizer, OcrOutput};
    use image::{ImageBuffer, Luma};
    use receiptly_core::Country;
    use std::sync::Mutex;

    fn receipt_png() -> Vec<u8> {
        let img: GrayImage = ImageBuffer::from_fn(400, 800, |x, y| {
            Luma([if y % 40 < 8 && (40..360).contains(&x) { 30 } else { 220 }])
        });
        imaging::encode_png(&DynamicImage::ImageLuma8(img)).unwrap()
    }

    fn engine<B: OcrBackend>(backend: B) -> LocationEngine<B> {
        LocationEngine::new(backend, StoreNameLadder::default(), LocationConfig::default())
    }

    /// Returns a scripted text per call, in order.
    struct Scripted(Mutex<Vec<&'static str>>);

    impl OcrBackend for Scripted {
        fn recognize(&self, _image: &[u8], _mode: PageSegMode) -> Result<OcrOutput, OcrError> {
            let mut queue = self.0.lock().unwrap();
            let text = if queue.is_empty() { "" } else { queue.remove(0) };
            Ok(OcrOutput::from_text(text))
        }
    }

    #[test]
    fn header_fields_are_scored() {
        let text = "ACME MART\n12 Orchard Road\nSingapore S238801\nTel +65 6123 4567\nCashier: Mei";
        let c = engine(MockRecognizer::new(text)).extract(&receipt_png(), None).unwrap();
        assert_eq!(c.store_name.as_deref(), Some("Acme Mart"));
        assert_eq!(c.country, Some(Country::Singapore));
        assert_eq!(c.phone.as_deref(), Some("+6561234567"));
        assert_eq!(c.postal_code.as_deref(), Some("S238801"));
        assert_eq!(c.confidence, 1.0);
        assert_eq!(c.strategy_used, Some(LocationStrategy::Enhanced));
        assert_eq!(c.raw_text, text);
    }

    #[test]
    fn name_and_address_only_scores_point_five_five() {
        let text = "CORNER DELI\n45 Elm Street";
        let c = engine(MockRecognizer::new(text)).extract(&receipt_png(), None).unwrap();
        assert_eq!(c.confidence, 0.55);
        assert_eq!(c.address.as_deref(), Some("45 Elm Street"));
    }

    #[test]
    fn longer_segmentation_output_is_used() {
        let backend = MockRecognizer::new("").with_mode_text(PageSegMode::Auto, "CORNER DELI\n45 Elm Street");
        let c = engine(backend).extract(&receipt_png(), None).unwrap();
        assert_eq!(c.store_name.as_deref(), Some("Corner Deli"));
    }

    #[test]
    fn later_variant_must_strictly_beat_earlier() {
        // Enhanced: name only. Simple: name and address. High contrast: same as simple.
        let backend = Scripted(Mutex::new(vec![
            "CORNER DELI", "",
            "CORNER DELI\n45 Elm Street", "",
            "CORNER DELI\n45 Elm Street", "",
        ]));
        let c = engine(backend).extract(&receipt_png(), None).unwrap();
        assert_eq!(c.strategy_used, Some(LocationStrategy::Simple));
    }

    #[test]
    fn empty_ocr_everywhere_is_an_error() {
        let result = engine(MockRecognizer::new("")).extract(&receipt_png(), None);
        assert!(matches!(result, Err(LocationError::NothingExtracted)));
    }

    #[test]
    fn failing_engine_yields_nothing_extracted() {
        let result = engine(MockRecognizer::failing("tesseract missing")).extract(&receipt_png(), None);
        assert!(matches!(result, Err(LocationError::NothingExtracted)));
    }

    #[test]
    fn undecodable_input_is_a_preprocess_error() {
        let result = engine(MockRecognizer::new("ACME")).extract(b"not an image", None);
        assert!(matches!(result, Err(LocationError::Preprocess(_))));
    }

    #[test]
    fn raw_text_is_truncated_on_char_boundary() {
        let long = format!("CAFÉ ÉTOILE\n{}", "é".repeat(600));
        let backend = MockRecognizer::new(long);
        let c = engine(backend).extract(&receipt_png(), None).unwrap();
        assert_eq!(c.raw_text.chars().count(), 500);
    }

    #[test]
    fn header_strip_is_top_quarter() {
        let gray: GrayImage = ImageBuffer::new(100, 400);
        assert_eq!(header_strip(&gray, 0.25).height(), 100);
        let tiny: GrayImage = ImageBuffer::new(10, 2);
        assert_eq!(header_strip(&tiny, 0.25).height(), 1);
    }
}
