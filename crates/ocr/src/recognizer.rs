use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("Image decode error: {0}")]
    ImageDecode(String),
    #[error("OCR engine error: {0}")]
    Engine(String),
    #[error("Tesseract not available; build with the `tesseract` feature")]
    NotAvailable,
}

/// Page layout assumption handed to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageSegMode {
    /// Fully automatic page segmentation.
    Auto,
    /// Treat the image as a single uniform block of text.
    SingleBlock,
}

impl PageSegMode {
    pub fn tesseract_value(self) -> &'static str {
        match self {
            PageSegMode::Auto => "3",
            PageSegMode::SingleBlock => "6",
        }
    }
}

/// A recognized word with its pixel box and engine confidence (0–100).
#[derive(Debug, Clone, PartialEq)]
pub struct WordBox {
    pub text: String,
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
    pub confidence: f32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OcrOutput {
    pub text: String,
    pub words: Option<Vec<WordBox>>,
}

impl OcrOutput {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self { text: text.into(), words: None }
    }

    pub fn mean_word_confidence(&self) -> Option<f32> {
        let words = self.words.as_ref().filter(|w| !w.is_empty())?;
        Some(words.iter().map(|w| w.confidence).sum::<f32>() / words.len() as f32)
    }
}

/// Abstraction over an OCR backend.
/// Implementations accept raw PNG/JPEG image bytes and return the recognized text.
pub trait OcrBackend: Send + Sync {
    fn recognize(&self, image_bytes: &[u8], mode: PageSegMode) -> Result<OcrOutput, OcrError>;
}

impl<T: OcrBackend + ?Sized> OcrBackend for Arc<T> {
    fn recognize(&self, image_bytes: &[u8], mode: PageSegMode) -> Result<OcrOutput, OcrError> {
        (**self).recognize(image_bytes, mode)
    }
}

/// Parse Tesseract TSV output into word boxes (level 5 rows with text).
pub fn words_from_tsv(tsv: &str) -> Vec<WordBox> {
    tsv.lines()
        .skip(1)
        .filter_map(|row| {
            let cols: Vec<&str> = row.split('\t').collect();
            if cols.len() < 12 || cols[0] != "5" {
                return None;
            }
            let text = cols[11].trim();
            if text.is_empty() {
                return None;
            }
            Some(WordBox {
                text: text.to_string(),
                left: cols[6].parse().ok()?,
                top: cols[7].parse().ok()?,
                width: cols[8].parse().ok()?,
                height: cols[9].parse().ok()?,
                confidence: cols[10].parse().ok()?,
            })
        })
        .collect()
}

// ── Mock backend (always available, used for tests) ───────────────────────────

/// Returns pre-set text, for unit testing the extraction stages
/// without requiring Tesseract to be installed.
pub struct MockRecognizer {
    pub text: String,
    mode_text: Vec<(PageSegMode, String)>,
    failure: Option<String>,
}

impl MockRecognizer {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), mode_text: Vec::new(), failure: None }
    }

    /// Return `text` instead of the default when called with `mode`.
    pub fn with_mode_text(mut self, mode: PageSegMode, text: impl Into<String>) -> Self {
        self.mode_text.push((mode, text.into()));
        self
    }

    /// A recognizer whose every call fails with an engine error.
    pub fn failing(message: impl Into<String>) -> Self {
        Self { text: String::new(), mode_text: Vec::new(), failure: Some(message.into()) }
    }
}

impl OcrBackend for MockRecognizer {
    fn recognize(&self, _image_bytes: &[u8], mode: PageSegMode) -> Result<OcrOutput, OcrError> {
        if let Some(msg) = &self.failure {
            return Err(OcrError::Engine(msg.clone()));
        }
        let text = self
            .mode_text
            .iter()
            .find(|(m, _)| *m == mode)
            .map(|(_, t)| t.clone())
            .unwrap_or_else(|| self.text.clone());
        Ok(OcrOutput::from_text(text))
    }
}

/// Backend for builds without an OCR engine; every call fails, so local
/// extraction degrades to the cloud result alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableRecognizer;

impl OcrBackend for UnavailableRecognizer {
    fn recognize(&self, _image_bytes: &[u8], _mode: PageSegMode) -> Result<OcrOutput, OcrError> {
        Err(OcrError::NotAvailable)
    }
}

// ── Tesseract backend (optional, gated behind `tesseract` feature) ─────────────

#[cfg(feature = "tesseract")]
pub mod tesseract_backend {
    use super::{words_from_tsv, OcrBackend, OcrError, OcrOutput, PageSegMode};
    use leptess::{LepTess, Variable};

    pub struct TesseractRecognizer {
        data_path: Option<String>,
        lang: String,
    }

    impl TesseractRecognizer {
        pub fn new(data_path: Option<String>, lang: &str) -> Self {
            Self { data_path, lang: lang.to_string() }
        }
    }

    impl OcrBackend for TesseractRecognizer {
        fn recognize(&self, image_bytes: &[u8], mode: PageSegMode) -> Result<OcrOutput, OcrError> {
            let mut lt = LepTess::new(self.data_path.as_deref(), &self.lang)
                .map_err(|e| OcrError::Engine(e.to_string()))?;
            lt.set_variable(Variable::TesseditPagesegMode, mode.tesseract_value())
                .map_err(|e| OcrError::Engine(e.to_string()))?;
            lt.set_image_from_mem(image_bytes)
                .map_err(|e| OcrError::ImageDecode(e.to_string()))?;
            let text = lt.get_utf8_text().map_err(|e| OcrError::Engine(e.to_string()))?;
            let words = lt.get_tsv_text(0).ok().map(|tsv| words_from_tsv(&tsv));
            Ok(OcrOutput { text, words })
        }
    }
}
