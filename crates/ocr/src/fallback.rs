use receiptly_core::config::StoreNameConfig;
use receiptly_core::ImageFormat;
use tracing::{debug, info, warn};

use crate::recognizer::{OcrBackend, PageSegMode};
use crate::store_name::{StoreNameLadder, StoreNameMatch};

/// Last-resort store name from whole-image OCR, used only when neither the
/// document service nor the location engine produced a usable name.
pub struct StoreNameFallbackExtractor<B> {
    backend: B,
    ladder: StoreNameLadder,
    min_text: usize,
}

impl<B: OcrBackend> StoreNameFallbackExtractor<B> {
    pub fn new(backend: B, config: StoreNameConfig) -> Self {
        let min_text = config.fallback_min_text;
        Self { backend, ladder: StoreNameLadder::new(config), min_text }
    }

    pub fn extract(&self, image: &[u8]) -> Option<StoreNameMatch> {
        if ImageFormat::sniff(image).is_pdf() {
            debug!("Skipping fallback OCR for PDF input");
            return None;
        }
        let output = match self.backend.recognize(image, PageSegMode::Auto) {
            Ok(output) => output,
            Err(e) => {
                warn!(error = %e, "Fallback OCR failed");
                return None;
            }
        };
        if output.text.trim().chars().count() < self.min_text {
            debug!(chars = output.text.trim().len(), "Fallback OCR text too short");
            return None;
        }

        let lines: Vec<&str> = output.text.lines().collect();
        let found = self.ladder.find(&lines);
        match &found {
            Some(m) => info!(name = %m.name, method = %m.method, confidence = m.confidence, "Fallback store name"),
            None => debug!("Fallback found no store name"),
        }
        found
    }
}
