// ── Compiled regex cache ─────────────────────────────────────────────────────

macro_rules! re {
    ($name:ident, $pat:expr) => {
        fn $name() -> &'static Regex {
            static R: OnceLock<Regex> = OnceLock::new();
            R.get_or_init(|| Regex::new($pat).expect("invalid regex"))
        }
    };
}

pub mod boundary;
pub mod fallback;
pub mod imaging;
pub mod location;
pub mod normalize;
pub mod recognizer;
pub mod store_name;

pub use boundary::{BoundaryDetector, BoundaryError, Detection};
pub use fallback::StoreNameFallbackExtractor;
pub use imaging::PreprocessError;
pub use location::{LocationEngine, LocationError};
pub use normalize::Normalizer;
pub use recognizer::{MockRecognizer, OcrBackend, OcrError, OcrOutput, PageSegMode, UnavailableRecognizer};
pub use store_name::{StoreNameLadder, StoreNameMatch};

#[cfg(feature = "tesseract")]
pub use recognizer::tesseract_backend::TesseractRecognizer;
