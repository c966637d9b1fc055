use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;

use crate::cloud::{CloudField, ReceiptItem};
use crate::location::{Country, LocationStrategy, StoreNameMethod};
use crate::money::Money;

/// Which stage last wrote a field. Ordered by precedence, highest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldSource {
    Cloud,
    LocalOcr,
    FallbackHeuristic,
    Placeholder,
}

/// A final merchant attribute together with its provenance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldValue {
    pub value: String,
    pub display_text: String,
    pub confidence: f32,
    pub source: FieldSource,
    pub requires_manual_review: bool,
}

impl FieldValue {
    pub fn new(value: impl Into<String>, confidence: f32, source: FieldSource) -> Self {
        let value = value.into();
        Self {
            display_text: value.clone(),
            value,
            confidence: confidence.clamp(0.0, 1.0),
            source,
            requires_manual_review: false,
        }
    }

    pub fn with_display_text(mut self, text: impl Into<String>) -> Self {
        self.display_text = text.into();
        self
    }

    pub fn flag_for_review(mut self) -> Self {
        self.requires_manual_review = true;
        self
    }

    pub fn placeholder(value: impl Into<String>) -> Self {
        Self::new(value, 0.0, FieldSource::Placeholder).flag_for_review()
    }
}

/// Which local heuristics fired, kept for downstream diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExtractionMetadata {
    pub location_strategy: Option<LocationStrategy>,
    pub location_confidence: Option<f32>,
    pub postal_code: Option<String>,
    pub country: Option<Country>,
    /// Tactic used when the whole-image fallback supplied the merchant name.
    pub fallback_method: Option<StoreNameMethod>,
}

/// The reconciled field set for one receipt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReceiptFields {
    pub merchant_name: FieldValue,
    pub merchant_address: Option<FieldValue>,
    pub merchant_phone: Option<FieldValue>,
    pub transaction_date: Option<CloudField<NaiveDate>>,
    pub transaction_time: Option<CloudField<NaiveTime>>,
    pub total: Option<CloudField<Money>>,
    pub subtotal: Option<CloudField<Money>>,
    pub tax: Option<CloudField<Money>>,
    pub items: Vec<ReceiptItem>,
    pub metadata: ExtractionMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sources_are_ordered_by_precedence() {
        assert!(FieldSource::Cloud < FieldSource::LocalOcr);
        assert!(FieldSource::LocalOcr < FieldSource::FallbackHeuristic);
        assert!(FieldSource::FallbackHeuristic < FieldSource::Placeholder);
    }

    #[test]
    fn placeholder_needs_review() {
        let f = FieldValue::placeholder("Unknown Store");
        assert_eq!(f.source, FieldSource::Placeholder);
        assert_eq!(f.confidence, 0.0);
        assert!(f.requires_manual_review);
        assert_eq!(f.display_text, "Unknown Store");
    }

    #[test]
    fn field_value_clamps_confidence() {
        assert_eq!(FieldValue::new("x", 1.4, FieldSource::Cloud).confidence, 1.0);
        assert_eq!(FieldValue::new("x", -0.2, FieldSource::Cloud).confidence, 0.0);
    }

    #[test]
    fn serializes_source_as_snake_case() {
        let f = FieldValue::new("Acme Mart", 0.6, FieldSource::LocalOcr);
        let json = serde_json::to_value(&f).unwrap();
        assert_eq!(json["source"], "local_ocr");
        assert_eq!(json["requires_manual_review"], false);
    }
}
