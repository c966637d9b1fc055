//! Field-by-field choice between the cloud result, local OCR, the
//! whole-image fallback and a placeholder.

use receiptly_core::config::ReconcileConfig;
use receiptly_core::{
    AnalyzedReceipt, CloudField, ExtractionMetadata, FieldSource, FieldValue, LocationCandidate, ReceiptFields,
    StoreNameMethod,
};
use receiptly_ocr::StoreNameMatch;
use tracing::{debug, info};

#[derive(Debug, Clone, Default)]
pub struct FieldReconciler {
    config: ReconcileConfig,
}

impl FieldReconciler {
    pub fn new(config: ReconcileConfig) -> Self {
        Self { config }
    }

    /// `fallback` runs at most once, and only when neither the cloud nor
    /// local OCR produced an acceptable merchant name.
    pub fn reconcile<F>(
        &self,
        cloud: &AnalyzedReceipt,
        location: Option<&LocationCandidate>,
        fallback: F,
    ) -> ReceiptFields
    where
        F: FnOnce() -> Option<StoreNameMatch>,
    {
        let (merchant_name, fallback_method) = self.merchant_name(cloud, location, fallback);
        let merchant_address = self.merchant_address(cloud, location);
        let merchant_phone = self.merchant_phone(cloud, location);

        let metadata = ExtractionMetadata {
            location_strategy: location.and_then(|l| l.strategy_used),
            location_confidence: location.map(|l| l.confidence),
            postal_code: location.and_then(|l| l.postal_code.clone()),
            country: location.and_then(|l| l.country),
            fallback_method,
        };
        info!(
            merchant = %merchant_name.value,
            source = ?merchant_name.source,
            review = merchant_name.requires_manual_review,
            "Merchant fields reconciled"
        );

        ReceiptFields {
            merchant_name,
            merchant_address,
            merchant_phone,
            transaction_date: cloud.transaction_date.clone(),
            transaction_time: cloud.transaction_time.clone(),
            total: cloud.total.clone(),
            subtotal: cloud.subtotal.clone(),
            tax: cloud.tax.clone(),
            items: cloud.items.clone(),
            metadata,
        }
    }

    fn merchant_name<F>(
        &self,
        cloud: &AnalyzedReceipt,
        location: Option<&LocationCandidate>,
        fallback: F,
    ) -> (FieldValue, Option<StoreNameMethod>)
    where
        F: FnOnce() -> Option<StoreNameMatch>,
    {
        let max_len = self.config.merchant_name_max_len;
        let mut name = cloud.merchant_name.as_ref().map(from_cloud);

        if let Some(loc) = location {
            if let Some(local) = loc.store_name.as_deref().filter(|n| self.is_valid_text(n, max_len)) {
                let confidence = loc.store_name_confidence.unwrap_or(loc.confidence);
                debug!(local, cloud = ?name.as_ref().map(|n| &n.value), "Local OCR merchant name wins");
                name = Some(FieldValue::new(local, confidence, FieldSource::LocalOcr));
            }
        }

        let acceptable = |v: &FieldValue| {
            v.value.trim().chars().count() >= self.config.min_name_len && self.is_valid_text(&v.value, max_len)
        };

        let mut fallback_method = None;
        if !name.as_ref().is_some_and(acceptable) {
            debug!("Merchant name missing or implausible; running fallback OCR");
            if let Some(found) = fallback().filter(|m| self.is_valid_text(&m.name, max_len)) {
                fallback_method = Some(found.method);
                name = Some(FieldValue::new(found.name, found.confidence, FieldSource::FallbackHeuristic));
            }
        }

        let value = match name {
            Some(v) if acceptable(&v) => v,
            Some(v) if !v.value.trim().is_empty() => v.flag_for_review(),
            _ => FieldValue::placeholder(self.config.placeholder_name.clone()),
        };
        (value, fallback_method)
    }

    fn merchant_address(&self, cloud: &AnalyzedReceipt, location: Option<&LocationCandidate>) -> Option<FieldValue> {
        let max_len = self.config.address_max_len;
        let local = location.and_then(|l| {
            l.address
                .as_deref()
                .filter(|a| self.is_valid_text(a, max_len))
                .map(|a| FieldValue::new(a, l.confidence, FieldSource::LocalOcr))
        });
        local.or_else(|| {
            cloud.merchant_address.as_ref().map(|f| {
                let value = from_cloud(f);
                if self.is_valid_text(&value.value, max_len) { value } else { value.flag_for_review() }
            })
        })
    }

    fn merchant_phone(&self, cloud: &AnalyzedReceipt, location: Option<&LocationCandidate>) -> Option<FieldValue> {
        let local = location.and_then(|l| {
            l.phone
                .as_deref()
                .filter(|p| self.is_valid_phone(p))
                .map(|p| FieldValue::new(p, l.confidence, FieldSource::LocalOcr))
        });
        local.or_else(|| {
            cloud.merchant_phone.as_ref().map(|f| {
                let value = from_cloud(f);
                if self.is_valid_phone(&value.value) { value } else { value.flag_for_review() }
            })
        })
    }

    /// Non-empty, within `max_len`, mostly letters, not mostly punctuation,
    /// with at least one real word.
    pub fn is_valid_text(&self, text: &str, max_len: usize) -> bool {
        let text = text.trim();
        let len = text.chars().count();
        if len == 0 || len > max_len {
            return false;
        }
        let letters = text.chars().filter(|c| c.is_alphabetic()).count();
        let special = text.chars().filter(|c| !c.is_alphanumeric() && !c.is_whitespace()).count();
        if (letters as f32 / len as f32) < self.config.min_letter_ratio {
            return false;
        }
        if (special as f32 / len as f32) >= self.config.max_special_ratio {
            return false;
        }
        text.split_whitespace().any(|w| w.chars().filter(|c| c.is_alphabetic()).count() >= 3)
    }

    pub fn is_valid_phone(&self, text: &str) -> bool {
        let text = text.trim();
        let digits = text.chars().filter(|c| c.is_ascii_digit()).count();
        !text.is_empty() && text.chars().count() <= self.config.phone_max_len && digits >= self.config.min_phone_digits
    }
}

fn from_cloud(field: &CloudField<String>) -> FieldValue {
    let value = FieldValue::new(field.value.trim(), field.confidence, FieldSource::Cloud);
    match &field.content {
        Some(content) => value.with_display_text(content.clone()),
        None => value,
    }
}
