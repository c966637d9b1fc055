use std::sync::Arc;

use receiptly_core::{
    BoundaryInfo, Diagnostics, DocumentService, ImageBuffer, LayoutService, LocationCandidate, ReceiptValidator,
    ReceiptFields, Settings, ValidationVerdict,
};
use receiptly_ocr::imaging::is_decodable;
use receiptly_ocr::{
    BoundaryDetector, Detection, LocationEngine, Normalizer, OcrBackend, StoreNameFallbackExtractor, StoreNameLadder,
};
use serde::Serialize;
use tracing::{info, warn, Instrument, Span};

use crate::error::AnalysisError;
use crate::fetch::ImageFetcher;
use crate::reconcile::FieldReconciler;

/// Everything learned about one receipt image.
#[derive(Debug, Clone, Serialize)]
pub struct ReceiptAnalysis {
    pub fields: ReceiptFields,
    pub location: Option<LocationCandidate>,
    pub validation: ValidationVerdict,
    pub boundary_info: Option<BoundaryInfo>,
}

/// Orchestrates: boundary → (normalize → cloud) ∥ location OCR → reconcile → validate.
pub struct ReceiptAnalyzer<C, R> {
    cloud: C,
    normalizer: Arc<Normalizer>,
    boundary: BoundaryDetector,
    location: Arc<LocationEngine<Arc<R>>>,
    fallback: Arc<StoreNameFallbackExtractor<Arc<R>>>,
    reconciler: FieldReconciler,
    validator: ReceiptValidator,
    fetcher: ImageFetcher,
}

impl<C, R> ReceiptAnalyzer<C, R>
where
    C: DocumentService + LayoutService,
    R: OcrBackend + 'static,
{
    pub fn new(settings: &Settings, cloud: C, recognizer: R) -> Result<Self, AnalysisError> {
        let recognizer = Arc::new(recognizer);
        let ladder = StoreNameLadder::new(settings.store_name.clone());
        Ok(Self {
            cloud,
            normalizer: Arc::new(Normalizer::new(settings.normalizer.clone())),
            boundary: BoundaryDetector::new(settings.boundary.clone()),
            location: Arc::new(LocationEngine::new(Arc::clone(&recognizer), ladder, settings.location.clone())),
            fallback: Arc::new(StoreNameFallbackExtractor::new(recognizer, settings.store_name.clone())),
            reconciler: FieldReconciler::new(settings.reconcile.clone()),
            validator: ReceiptValidator::new(settings.validation.min_confidence),
            fetcher: ImageFetcher::new(&settings.fetch)?,
        })
    }

    pub async fn analyze_url(&self, url: &str, diagnostics: Option<&Diagnostics>) -> Result<ReceiptAnalysis, AnalysisError> {
        let bytes = self.fetcher.fetch(url).await?;
        info!(url, bytes = bytes.len(), "Fetched receipt image");
        self.analyze_bytes(bytes, diagnostics).await
    }

    pub async fn analyze_bytes(
        &self,
        bytes: Vec<u8>,
        diagnostics: Option<&Diagnostics>,
    ) -> Result<ReceiptAnalysis, AnalysisError> {
        let span = diagnostics.map_or_else(Span::none, |d| d.span("analyze"));
        self.run(ImageBuffer::new(bytes), diagnostics).instrument(span).await
    }

    async fn run(&self, input: ImageBuffer, diagnostics: Option<&Diagnostics>) -> Result<ReceiptAnalysis, AnalysisError> {
        if input.is_empty() {
            return Err(AnalysisError::UnreadableInput("empty payload".into()));
        }
        let is_pdf = input.format().is_pdf();
        if !is_pdf && !is_decodable(input.bytes()) {
            return Err(AnalysisError::UnreadableInput(format!("unrecognised {} payload", input.format())));
        }
        info!(format = %input.format(), bytes = input.len(), "Analyzing receipt");

        let original: Arc<[u8]> = Arc::from(input.into_bytes());
        let detection = if is_pdf {
            Detection::unchanged(&original)
        } else {
            self.boundary.detect(&self.cloud, Arc::clone(&original), diagnostics).await
        };
        let boundary_info = detection.boundary;
        let cropped: Arc<[u8]> = Arc::from(detection.bytes);

        let cloud_stage = async {
            let payload = if is_pdf { cropped.to_vec() } else { self.normalize(&cropped, diagnostics).await };
            self.cloud.analyze_receipt(&payload).await
        };
        let location_stage = async {
            if is_pdf {
                return None;
            }
            self.extract_location(&cropped, diagnostics).await
        };
        let (cloud_result, location) = tokio::join!(cloud_stage, location_stage);
        let receipt = cloud_result?.ok_or(AnalysisError::NoReceiptData)?;

        let validation = self.validator.validate(&receipt.doc_type, receipt.confidence);
        let reconciler = self.reconciler.clone();
        let fallback = Arc::clone(&self.fallback);
        let location_for_fields = location.clone();
        let fields = tokio::task::spawn_blocking(move || {
            reconciler.reconcile(&receipt, location_for_fields.as_ref(), || {
                if is_pdf {
                    None
                } else {
                    fallback.extract(&original)
                }
            })
        })
        .await?;

        info!(
            merchant = %fields.merchant_name.value,
            valid = validation.is_valid,
            cropped = boundary_info.is_some(),
            "Receipt analyzed"
        );
        Ok(ReceiptAnalysis { fields, location, validation, boundary_info })
    }

    async fn normalize(&self, bytes: &Arc<[u8]>, diagnostics: Option<&Diagnostics>) -> Vec<u8> {
        let normalizer = Arc::clone(&self.normalizer);
        let input = Arc::clone(bytes);
        let diagnostics = diagnostics.cloned();
        match tokio::task::spawn_blocking(move || normalizer.normalize(&input, diagnostics.as_ref())).await {
            Ok(normalized) => normalized,
            Err(e) => {
                warn!(error = %e, "Normalizer worker failed; submitting unnormalized image");
                bytes.to_vec()
            }
        }
    }

    async fn extract_location(&self, bytes: &Arc<[u8]>, diagnostics: Option<&Diagnostics>) -> Option<LocationCandidate> {
        let engine = Arc::clone(&self.location);
        let input = Arc::clone(bytes);
        let diagnostics = diagnostics.cloned();
        match tokio::task::spawn_blocking(move || engine.extract(&input, diagnostics.as_ref())).await {
            Ok(Ok(candidate)) => Some(candidate),
            Ok(Err(e)) => {
                warn!(error = %e, "Location extraction failed");
                None
            }
            Err(e) => {
                warn!(error = %e, "Location worker failed");
                None
            }
        }
    }
}
