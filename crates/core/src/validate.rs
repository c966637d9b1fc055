use serde::Serialize;

/// Outcome of classifying an analysed document as a usable receipt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationVerdict {
    pub is_valid: bool,
    pub confidence: f32,
    pub doc_type: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy)]
pub struct ReceiptValidator {
    min_confidence: f32,
}

impl Default for ReceiptValidator {
    fn default() -> Self {
        Self { min_confidence: 0.7 }
    }
}

impl ReceiptValidator {
    pub fn new(min_confidence: f32) -> Self {
        Self { min_confidence }
    }

    pub fn validate(&self, doc_type: &str, confidence: f32) -> ValidationVerdict {
        let (is_valid, message) = if !doc_type.to_lowercase().contains("receipt") {
            (false, format!("Document type '{doc_type}' is not a receipt"))
        } else if confidence < self.min_confidence {
            (
                false,
                format!(
                    "Low confidence ({:.2}%). Document may not be a clear receipt image",
                    confidence * 100.0
                ),
            )
        } else {
            (true, format!("Valid receipt detected with {:.2}% confidence", confidence * 100.0))
        };

        ValidationVerdict { is_valid, confidence, doc_type: doc_type.to_string(), message }
    }
}
